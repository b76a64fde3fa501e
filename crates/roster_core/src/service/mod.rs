//! Use-case services over the repository layer.

pub mod roster_service;

//! Team/Member domain model.
//!
//! # Responsibility
//! - Define the plain records persisted by the repository layer.
//! - Own the one sanctioned mutation path for the Team↔Member association.
//!
//! # Invariants
//! - `Member.team` is the source of truth for the relationship; the team's
//!   member collection is a derived view.
//! - The association never owns a back-pointer, so the graph has no cycles.

pub mod dto;
pub mod member;
pub mod team;
pub mod validation;

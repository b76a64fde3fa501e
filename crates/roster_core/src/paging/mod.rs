//! Pagination engine.
//!
//! # Responsibility
//! - Model page requests and page results.
//! - Run a windowed content query and an independent count query.
//!
//! # Invariants
//! - `total_pages = ceil(total_elements / size)`.
//! - Content and count run as separate statements and are not required to be
//!   mutually consistent under concurrent writers.

mod engine;
mod page;

pub use engine::fetch_page;
pub use page::{Page, PageRequest};

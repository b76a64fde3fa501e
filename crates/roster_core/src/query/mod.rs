//! Query builder: declarative specs rendered to parameterized SQL.
//!
//! # Responsibility
//! - Describe lookups, projections, joins, and bulk updates as data.
//! - Render them into SQL text plus positional bind values.
//!
//! # Invariants
//! - Unsupported shapes fail at render time with `QueryCompositionError`;
//!   nothing reaches storage in that case.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod render;
pub mod spec;

pub use render::{render_lock, render_select, render_update, RenderedQuery};
pub use spec::{
    Assignment, Direction, EntityGraph, Field, Join, JoinKind, JoinTarget, LockMode, Predicate,
    Projection, SelectSpec, Sort, UpdateSpec, Window,
};

/// A query spec whose shape the builder does not support.
///
/// This is a programming error in the caller, not a runtime fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCompositionError {
    shape: String,
}

impl QueryCompositionError {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
        }
    }

    /// Description of the rejected shape.
    pub fn shape(&self) -> &str {
        &self.shape
    }
}

impl Display for QueryCompositionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported query shape: {}", self.shape)
    }
}

impl Error for QueryCompositionError {}

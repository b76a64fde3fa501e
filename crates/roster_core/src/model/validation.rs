//! Write-path validation for model records.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected model state detected before any SQL runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `Member.username` is empty or whitespace only.
    BlankUsername,
    /// `Team.name` is empty or whitespace only.
    BlankTeamName,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankUsername => write!(f, "member username must not be blank"),
            Self::BlankTeamName => write!(f, "team name must not be blank"),
        }
    }
}

impl Error for ValidationError {}

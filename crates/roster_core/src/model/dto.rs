//! Read-only projections that are not entities.

use crate::model::member::MemberId;
use serde::{Deserialize, Serialize};

/// Member row joined with its team name.
///
/// Produced only by queries that join `members` to `teams`; never tracked and
/// never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: MemberId,
    pub username: String,
    pub team_name: String,
}

impl MemberDto {
    pub fn new(id: MemberId, username: impl Into<String>, team_name: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name: team_name.into(),
        }
    }
}

//! Team record and its member back-collection.
//!
//! # Invariants
//! - `members` holds each member key at most once.
//! - `members` is never persisted; it is filled by `Member::change_team` in
//!   memory and rebuilt from `members.team_id` when loaded.

use crate::model::member::MemberKey;
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Client-side instance identity, stable before and after the first persist.
pub type TeamKey = Uuid;

/// Storage-assigned team identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub i64);

impl Display for TeamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A team and the derived view of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    id: Option<TeamId>,
    key: TeamKey,
    pub name: String,
    // Back-collection stays out of diagnostics output.
    #[serde(skip)]
    members: Vec<MemberKey>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            key: Uuid::new_v4(),
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub(crate) fn hydrate(id: TeamId, key: TeamKey, name: String, members: Vec<MemberKey>) -> Self {
        Self {
            id: Some(id),
            key,
            name,
            members,
        }
    }

    /// `None` until the team has been saved.
    pub fn id(&self) -> Option<TeamId> {
        self.id
    }

    pub fn key(&self) -> TeamKey {
        self.key
    }

    /// Keys of members known to belong to this team.
    pub fn members(&self) -> &[MemberKey] {
        &self.members
    }

    pub fn contains_member(&self, key: MemberKey) -> bool {
        self.members.contains(&key)
    }

    /// Association payload carried by members of this team.
    pub fn reference(&self) -> TeamRef {
        TeamRef {
            id: self.id,
            key: self.key,
            name: self.name.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankTeamName);
        }
        Ok(())
    }

    /// Returns `false` when the key was already present.
    pub(crate) fn attach_member(&mut self, key: MemberKey) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.push(key);
        true
    }

    pub(crate) fn detach_member(&mut self, key: MemberKey) {
        self.members.retain(|current| *current != key);
    }

    pub(crate) fn assign_id(&mut self, id: TeamId) {
        self.id = Some(id);
    }
}

/// The team as seen from a member: identity and name, no back-collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: Option<TeamId>,
    pub key: TeamKey,
    pub name: String,
}

impl TeamRef {
    /// Identity comparison against a full team record.
    pub fn refers_to(&self, team: &Team) -> bool {
        if self.key == team.key {
            return true;
        }
        matches!((self.id, team.id), (Some(left), Some(right)) if left == right)
    }
}

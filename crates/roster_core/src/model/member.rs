//! Member record and its many-to-one association to `Team`.
//!
//! # Responsibility
//! - Hold member data plus the explicit state of its team association.
//! - Provide `change_team` as the only way to set the association.
//!
//! # Invariants
//! - After `change_team(team)`, the member points at `team` and `team`
//!   lists the member key exactly once.
//! - A `Lazy` association is only resolvable through the session recorded in
//!   it; reading it any other way is a `DetachedAccess`.

use crate::model::team::{Team, TeamId, TeamRef};
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Client-side instance identity, stable before and after the first persist.
pub type MemberKey = Uuid;

/// Identity of one open repository session (one transaction).
pub type SessionId = Uuid;

/// Storage-assigned member identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolution state of `Member.team`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamAssociation {
    /// The member has no team.
    None,
    /// Foreign key known, team row not loaded yet.
    Lazy { team_id: TeamId, session: SessionId },
    /// Team loaded (fetch join, entity graph, explicit resolve, or
    /// `change_team`).
    Loaded(TeamRef),
}

impl TeamAssociation {
    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            Self::None => None,
            Self::Lazy { team_id, .. } => Some(*team_id),
            Self::Loaded(team) => team.id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Lazy { .. })
    }
}

/// How an instance was obtained, which decides whether it may be saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityState {
    /// Built in memory and never persisted.
    #[default]
    Transient,
    /// Loaded or saved by a session and eligible for updates.
    Managed {
        session: SessionId,
        /// Persistence-context generation at load time; bulk updates bump it.
        generation: u64,
    },
    /// Read-only snapshot; never registered for change tracking.
    ReadOnly { session: SessionId },
}

/// Unresolved lazy association read outside its originating session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedAccess {
    pub member_id: Option<MemberId>,
    pub team_id: TeamId,
}

impl Display for DetachedAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.member_id {
            Some(member_id) => write!(
                f,
                "team {} of member {member_id} was not loaded and its session has ended",
                self.team_id
            ),
            None => write!(
                f,
                "team {} was not loaded and its session has ended",
                self.team_id
            ),
        }
    }
}

impl Error for DetachedAccess {}

/// A member with an optional association to one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    id: Option<MemberId>,
    key: MemberKey,
    pub username: String,
    pub age: u32,
    // Written as the team id only; the team side is never walked.
    #[serde(rename = "team_id", serialize_with = "serialize_team_id")]
    team: TeamAssociation,
    #[serde(skip)]
    version: i64,
    #[serde(skip)]
    state: EntityState,
}

impl Member {
    /// Creates a member with age `0` and no team.
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: u32) -> Self {
        Self {
            id: None,
            key: Uuid::new_v4(),
            username: username.into(),
            age,
            team: TeamAssociation::None,
            version: 0,
            state: EntityState::Transient,
        }
    }

    /// Creates a member and joins it to `team` through [`Member::change_team`].
    pub fn with_team(username: impl Into<String>, age: u32, team: &mut Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    pub(crate) fn hydrate(
        id: MemberId,
        key: MemberKey,
        username: String,
        age: u32,
        team: TeamAssociation,
        version: i64,
        state: EntityState,
    ) -> Self {
        Self {
            id: Some(id),
            key,
            username,
            age,
            team,
            version,
            state,
        }
    }

    /// `None` until the member has been saved.
    pub fn id(&self) -> Option<MemberId> {
        self.id
    }

    pub fn key(&self) -> MemberKey {
        self.key
    }

    /// Optimistic concurrency marker as last read from storage.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn team_association(&self) -> &TeamAssociation {
        &self.team
    }

    /// Foreign key value; readable without resolving the association.
    pub fn team_id(&self) -> Option<TeamId> {
        self.team.team_id()
    }

    /// Returns the loaded team, or `None` when the member has no team.
    ///
    /// A loaded `TeamRef` is a snapshot taken by `change_team` or by the
    /// query that loaded the member. Later renames of the team are not
    /// reflected until the member is reloaded. Saving a member whose team
    /// had no id yet rebinds the snapshot to the stored team.
    ///
    /// # Errors
    /// - `DetachedAccess` when the association is still lazy. Resolve it with
    ///   `Session::resolve_team` inside the session that loaded the member.
    pub fn team(&self) -> Result<Option<&TeamRef>, DetachedAccess> {
        match &self.team {
            TeamAssociation::None => Ok(None),
            TeamAssociation::Loaded(team) => Ok(Some(team)),
            TeamAssociation::Lazy { team_id, .. } => Err(DetachedAccess {
                member_id: self.id,
                team_id: *team_id,
            }),
        }
    }

    pub fn is_member_of(&self, team: &Team) -> bool {
        match &self.team {
            TeamAssociation::None => false,
            TeamAssociation::Lazy { team_id, .. } => team.id() == Some(*team_id),
            TeamAssociation::Loaded(current) => current.refers_to(team),
        }
    }

    /// Moves this member to `team`.
    ///
    /// Sets the association and records the member in the team's collection
    /// in one step. Calling it again with the same team changes nothing.
    ///
    /// The previous team's collection is not touched, since the member only
    /// holds a reference to it. Call [`Member::leave_team`] on the previous
    /// team as well to keep its collection in step.
    pub fn change_team(&mut self, team: &mut Team) {
        self.team = TeamAssociation::Loaded(team.reference());
        team.attach_member(self.key);
    }

    /// Clears the association if it points at `team` and drops the member
    /// from the team's collection.
    pub fn leave_team(&mut self, team: &mut Team) {
        if self.is_member_of(team) {
            self.team = TeamAssociation::None;
        }
        team.detach_member(self.key);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::BlankUsername);
        }
        Ok(())
    }

    pub(crate) fn assign_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub(crate) fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub(crate) fn resolve_team_with(&mut self, team: Option<TeamRef>) {
        self.team = match team {
            Some(team) => TeamAssociation::Loaded(team),
            None => TeamAssociation::None,
        };
    }
}

fn serialize_team_id<S>(team: &TeamAssociation, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    team.team_id().map(|id| id.0).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::{EntityState, Member, TeamAssociation};
    use crate::model::team::{Team, TeamId};
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn new_member_defaults_to_zero_age_and_no_team() {
        let member = Member::new("member1");
        assert_eq!(member.age, 0);
        assert_eq!(member.team().unwrap(), None);
        assert_eq!(member.state(), EntityState::Transient);
        assert!(member.id().is_none());
    }

    #[test]
    fn change_team_twice_keeps_single_back_reference() {
        let mut team = Team::new("teamA");
        let mut member = Member::with_age("member1", 10);

        member.change_team(&mut team);
        member.change_team(&mut team);

        assert!(member.is_member_of(&team));
        assert_eq!(member.team().unwrap().map(|t| t.key), Some(team.key()));
        assert_eq!(team.members(), &[member.key()]);
    }

    #[test]
    fn change_team_moves_association_to_new_team() {
        let mut team_a = Team::new("teamA");
        let mut team_b = Team::new("teamB");
        let mut member = Member::with_team("member1", 10, &mut team_a);

        member.change_team(&mut team_b);

        assert!(member.is_member_of(&team_b));
        assert!(!member.is_member_of(&team_a));
        assert!(team_b.contains_member(member.key()));
    }

    #[test]
    fn leave_team_clears_both_sides() {
        let mut team = Team::new("teamA");
        let mut member = Member::with_team("member1", 10, &mut team);

        member.leave_team(&mut team);

        assert_eq!(member.team().unwrap(), None);
        assert!(team.members().is_empty());
    }

    #[test]
    fn leave_other_team_keeps_current_association() {
        let mut team_a = Team::new("teamA");
        let mut team_b = Team::new("teamB");
        let mut member = Member::with_team("member1", 10, &mut team_a);

        member.leave_team(&mut team_b);

        assert!(member.is_member_of(&team_a));
    }

    #[test]
    fn change_team_leaves_previous_collection_until_left() {
        let mut team_a = Team::new("teamA");
        let mut team_b = Team::new("teamB");
        let mut member = Member::with_team("member1", 10, &mut team_a);

        member.change_team(&mut team_b);
        assert!(team_a.contains_member(member.key()));

        member.leave_team(&mut team_a);

        assert!(member.is_member_of(&team_b));
        assert!(team_a.members().is_empty());
        assert_eq!(team_b.members(), &[member.key()]);
    }

    #[test]
    fn lazy_association_is_detached_without_session() {
        let member = Member::hydrate(
            super::MemberId(7),
            Uuid::new_v4(),
            "member1".to_string(),
            10,
            TeamAssociation::Lazy {
                team_id: TeamId(3),
                session: Uuid::new_v4(),
            },
            0,
            EntityState::Transient,
        );

        assert_eq!(member.team_id(), Some(TeamId(3)));
        let err = member.team().unwrap_err();
        assert_eq!(err.team_id, TeamId(3));
        assert_eq!(err.member_id, Some(super::MemberId(7)));
    }

    #[test]
    fn blank_username_is_rejected() {
        let member = Member::new("   ");
        assert_eq!(member.validate(), Err(ValidationError::BlankUsername));
    }
}

//! Roster use-case service.
//!
//! # Responsibility
//! - Compose member and team repository calls into roster workflows.
//!
//! # Invariants
//! - Service APIs never bypass repository validation or persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::member::{Member, MemberId};
use crate::model::team::TeamId;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::member_repo::MemberRepository;
use crate::repo::team_repo::TeamRepository;
use log::info;

/// Roster workflows over one member and one team repository.
pub struct RosterService<M: MemberRepository, T: TeamRepository> {
    members: M,
    teams: T,
}

impl<M: MemberRepository, T: TeamRepository> RosterService<M, T> {
    pub fn new(members: M, teams: T) -> Self {
        Self { members, teams }
    }

    pub fn members(&self) -> &M {
        &self.members
    }

    pub fn teams(&self) -> &T {
        &self.teams
    }

    /// Creates and saves a member, optionally placing it on an existing team.
    ///
    /// # Errors
    /// - `NotFound` when `team` does not exist.
    /// - `Validation` for a blank username.
    pub fn enroll(
        &self,
        username: impl Into<String>,
        age: u32,
        team: Option<TeamId>,
    ) -> RepoResult<Member> {
        let mut member = Member::with_age(username, age);
        if let Some(team_id) = team {
            let mut team = self
                .teams
                .find_by_id(team_id)?
                .ok_or_else(|| team_not_found(team_id))?;
            member.change_team(&mut team);
        }
        self.members.save(&mut member)?;
        Ok(member)
    }

    /// Moves an existing member to another existing team.
    pub fn transfer(&self, member_id: MemberId, team_id: TeamId) -> RepoResult<Member> {
        let mut member = self
            .members
            .find_by_id(member_id)?
            .ok_or_else(|| RepoError::NotFound {
                entity: "member",
                key: member_id.to_string(),
            })?;
        let mut team = self
            .teams
            .find_by_id(team_id)?
            .ok_or_else(|| team_not_found(team_id))?;

        member.change_team(&mut team);
        self.members.save(&mut member)?;
        Ok(member)
    }

    /// Removes every member from the team, then deletes it.
    ///
    /// Returns how many members were released.
    pub fn disband_team(&self, team_id: TeamId) -> RepoResult<usize> {
        let mut team = self
            .teams
            .find_by_id(team_id)?
            .ok_or_else(|| team_not_found(team_id))?;

        let mut members = self.members.find_by_team(team_id)?;
        for member in &mut members {
            member.leave_team(&mut team);
            self.members.save(member)?;
        }
        self.teams.delete(&team)?;

        info!(
            "event=team_disband module=service status=ok team_id={} released={}",
            team_id,
            members.len()
        );
        Ok(members.len())
    }

    /// Ages every member at or above `threshold` by one year and refreshes
    /// the instances the caller still holds.
    ///
    /// Held instances that were never persisted are left untouched.
    pub fn age_up_from(&self, threshold: u32, held: &mut [Member]) -> RepoResult<usize> {
        let affected = self.members.bulk_age_plus(threshold)?;
        for member in held.iter_mut().filter(|member| member.id().is_some()) {
            self.members.refresh(member)?;
        }
        Ok(affected)
    }
}

fn team_not_found(team_id: TeamId) -> RepoError {
    RepoError::NotFound {
        entity: "team",
        key: team_id.to_string(),
    }
}

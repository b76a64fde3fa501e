//! Explicit session handle: one transaction plus its persistence context.
//!
//! # Responsibility
//! - Scope every repository call to one SQLite transaction.
//! - Decide whether lazy associations may still be resolved.
//! - Track the persistence-context generation bumped by bulk updates.
//!
//! # Invariants
//! - A lazy association resolves only through the session that loaded it.
//! - Dropping a session without `commit` rolls the transaction back.

use crate::model::member::{DetachedAccess, EntityState, Member, SessionId, TeamAssociation};
use crate::model::team::TeamRef;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::team_repo::load_team_ref;
use log::debug;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::Cell;
use uuid::Uuid;

/// One open transaction on one connection.
///
/// Not shareable across threads; each concurrent caller opens its own
/// connection and session.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
    id: SessionId,
    generation: Cell<u64>,
}

impl<'conn> Session<'conn> {
    /// Begins a deferred transaction on `conn`.
    pub fn begin(conn: &'conn mut Connection) -> RepoResult<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let id = Uuid::new_v4();
        debug!("event=session_begin module=repo status=ok session_id={id}");
        Ok(Self {
            tx,
            id,
            generation: Cell::new(0),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    /// Current persistence-context generation.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn commit(self) -> RepoResult<()> {
        let id = self.id;
        self.tx.commit()?;
        debug!("event=session_commit module=repo status=ok session_id={id}");
        Ok(())
    }

    pub fn rollback(self) -> RepoResult<()> {
        let id = self.id;
        self.tx.rollback()?;
        debug!("event=session_rollback module=repo status=ok session_id={id}");
        Ok(())
    }

    /// Returns `true` when `member` was loaded by this session before its
    /// latest bulk update, so its field values may be out of date.
    pub fn is_stale(&self, member: &Member) -> bool {
        matches!(
            member.state(),
            EntityState::Managed { session, generation }
                if session == self.id && generation < self.generation.get()
        )
    }

    /// Resolves the member's team, loading it on first access.
    ///
    /// # Errors
    /// - `DetachedAccess` when the member was loaded by another session.
    /// - `NotFound` when the referenced team row no longer exists.
    pub fn resolve_team<'m>(&self, member: &'m mut Member) -> RepoResult<Option<&'m TeamRef>> {
        if let TeamAssociation::Lazy { team_id, session } = *member.team_association() {
            if session != self.id {
                debug!(
                    "event=lazy_resolve module=repo status=error error_code=detached_access session_id={} team_id={}",
                    self.id, team_id
                );
                return Err(RepoError::DetachedAccess(DetachedAccess {
                    member_id: member.id(),
                    team_id,
                }));
            }

            let team = load_team_ref(self.conn(), team_id)?.ok_or_else(|| RepoError::NotFound {
                entity: "team",
                key: team_id.to_string(),
            })?;
            member.resolve_team_with(Some(team));
        }

        Ok(member.team()?)
    }

    /// Empties the persistence context: instances loaded so far become stale.
    pub(crate) fn clear_context(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    pub(crate) fn managed_state(&self) -> EntityState {
        EntityState::Managed {
            session: self.id,
            generation: self.generation.get(),
        }
    }

    pub(crate) fn read_only_state(&self) -> EntityState {
        EntityState::ReadOnly { session: self.id }
    }
}

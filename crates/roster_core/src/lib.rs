//! Core roster persistence for teams and members.
//! Repositories, query builder, paging, and fetch modes over SQLite.

pub mod db;
pub mod logging;
pub mod model;
pub mod paging;
pub mod query;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, open_db_with_options, DbError, DbOptions};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::dto::MemberDto;
pub use model::member::{
    DetachedAccess, EntityState, Member, MemberId, MemberKey, SessionId, TeamAssociation,
};
pub use model::team::{Team, TeamId, TeamKey, TeamRef};
pub use model::validation::ValidationError;
pub use paging::{Page, PageRequest};
pub use query::{Direction, Field, QueryCompositionError, Sort};
pub use repo::member_repo::{MemberRepository, SqliteMemberRepository};
pub use repo::session::Session;
pub use repo::team_repo::{SqliteTeamRepository, TeamRepository};
pub use repo::{RepoError, RepoResult};
pub use service::roster_service::RosterService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

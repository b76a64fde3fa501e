//! Member repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD plus the derived and explicit member lookups.
//! - Choose the fetch mode per operation: lazy team by default, eager for
//!   fetch joins and entity graphs, read-only or locked where requested.
//!
//! # Invariants
//! - `save` never persists a read-only snapshot or an instance made stale by
//!   a bulk update in the same session.
//! - `bulk_age_plus` is one statement; it does not bump `version` and it
//!   empties the session's persistence context.

use crate::model::dto::MemberDto;
use crate::model::member::{EntityState, Member, MemberId, TeamAssociation};
use crate::model::team::{TeamId, TeamKey, TeamRef};
use crate::paging::{fetch_page, Page, PageRequest};
use crate::query::{
    EntityGraph, Field, Join, JoinTarget, LockMode, Predicate, Projection, SelectSpec, UpdateSpec,
};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::session::Session;
use crate::repo::team_repo::load_team_ref_by_key;
use crate::repo::{ensure_tables, exec, parse_key};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use std::time::Instant;

/// Repository interface for member operations.
pub trait MemberRepository {
    /// Inserts a transient member or updates a persisted one.
    ///
    /// Updates are guarded by the member's `version`.
    fn save(&self, member: &mut Member) -> RepoResult<MemberId>;
    fn find_by_id(&self, id: MemberId) -> RepoResult<Option<Member>>;
    /// All members with their teams loaded in the same round trip.
    fn find_all(&self) -> RepoResult<Vec<Member>>;
    fn count(&self) -> RepoResult<u64>;
    fn delete(&self, member: &Member) -> RepoResult<()>;
    fn delete_by_id(&self, id: MemberId) -> RepoResult<()>;
    /// Reloads `member` from storage, replacing every field.
    fn refresh(&self, member: &mut Member) -> RepoResult<()>;
    fn find_by_team(&self, team_id: TeamId) -> RepoResult<Vec<Member>>;

    /// `username = ? AND age > ?`.
    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: u32,
    ) -> RepoResult<Vec<Member>>;
    /// `username = ? AND age = ?`.
    fn find_user(&self, username: &str, age: u32) -> RepoResult<Vec<Member>>;
    fn find_username_list(&self) -> RepoResult<Vec<String>>;
    /// Members that have a team, projected with the team name.
    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>>;
    /// Single member by username; `NotFound` when absent.
    fn find_members(&self, username: &str) -> RepoResult<Member>;
    /// Members whose username is in `names`. Empty input gives empty output.
    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Member>>;

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>>;
    /// # Errors
    /// - `NotFound` for zero matches, `NonUniqueResult` for several.
    fn find_member_by_username(&self, username: &str) -> RepoResult<Member>;
    /// # Errors
    /// - `NonUniqueResult` for several matches; zero matches is `Ok(None)`.
    fn find_optional_by_username(&self, username: &str) -> RepoResult<Option<Member>>;

    fn find_by_age(&self, age: u32, page: &PageRequest) -> RepoResult<Page<Member>>;
    /// Every member, paged; the count query counts usernames only.
    fn find_member_all_count_by(&self, page: &PageRequest) -> RepoResult<Page<Member>>;

    /// `age = age + 1` for every member with `age >= threshold`, as one
    /// statement. Returns the affected row count.
    ///
    /// Instances loaded earlier in this session are stale afterwards and
    /// `save` rejects them until they are refreshed.
    fn bulk_age_plus(&self, threshold: u32) -> RepoResult<usize>;

    /// Left fetch join on team.
    fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>>;
    /// Entity graph `{team}` over all members.
    fn find_member_entity_graph(&self) -> RepoResult<Vec<Member>>;
    fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Member>>;

    /// Read-only snapshot; never registered for change tracking.
    fn find_read_only_by_username(&self, username: &str) -> RepoResult<Member>;
    fn find_page_hint_by_username(
        &self,
        username: &str,
        page: &PageRequest,
    ) -> RepoResult<Page<Member>>;

    /// Takes the write lock over the matching rows for the rest of the
    /// session. Blocks competing writers; fails with `LockTimeout` when the
    /// lock is not granted within the connection's busy timeout.
    fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Member>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Tracked,
    ReadOnly,
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'s, 'conn> {
    session: &'s Session<'conn>,
}

impl<'s, 'conn> SqliteMemberRepository<'s, 'conn> {
    pub fn try_new(session: &'s Session<'conn>) -> RepoResult<Self> {
        ensure_tables(session.conn(), &["members", "teams"])?;
        Ok(Self { session })
    }

    fn load(&self, spec: &SelectSpec, mode: LoadMode) -> RepoResult<Vec<Member>> {
        let team_fetched = spec.fetches(JoinTarget::Team);
        exec::select(self.session.conn(), spec, |row| {
            parse_member_row(row, self.session, team_fetched, mode)
        })
    }

    fn load_page(
        &self,
        content: &SelectSpec,
        count: &SelectSpec,
        page: &PageRequest,
        mode: LoadMode,
    ) -> RepoResult<Page<Member>> {
        let team_fetched = content.fetches(JoinTarget::Team);
        fetch_page(self.session.conn(), content, count, page, |row| {
            parse_member_row(row, self.session, team_fetched, mode)
        })
    }

    fn insert(&self, member: &mut Member, team_id: Option<TeamId>) -> RepoResult<MemberId> {
        let conn = self.session.conn();
        conn.execute(
            "INSERT INTO members (member_key, username, age, team_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                member.key().to_string(),
                member.username.as_str(),
                member.age,
                team_id.map(|id| id.0),
            ],
        )?;

        let id = MemberId(conn.last_insert_rowid());
        member.assign_id(id);
        member.set_version(0);
        member.set_state(self.session.managed_state());
        Ok(id)
    }

    /// Rebinds a team reference taken before the team was saved to the
    /// stored row with the same key.
    ///
    /// # Errors
    /// - `TransientReference` when no team with `key` has been saved.
    fn bind_saved_team(&self, member: &mut Member, key: TeamKey) -> RepoResult<TeamId> {
        let team = load_team_ref_by_key(self.session.conn(), key)?;
        let Some(TeamRef { id: Some(id), .. }) = team else {
            return Err(RepoError::TransientReference { team: key });
        };
        debug!(
            "event=team_bind module=repo status=ok session_id={} team_id={}",
            self.session.id(),
            id
        );
        member.resolve_team_with(team);
        Ok(id)
    }

    fn update(
        &self,
        id: MemberId,
        member: &mut Member,
        team_id: Option<TeamId>,
    ) -> RepoResult<MemberId> {
        let conn = self.session.conn();
        let changed = conn.execute(
            "UPDATE members
             SET
                username = ?2,
                age = ?3,
                team_id = ?4,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE member_id = ?1
               AND version = ?5;",
            params![
                id.0,
                member.username.as_str(),
                member.age,
                team_id.map(|team| team.0),
                member.version(),
            ],
        )?;

        if changed == 0 {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM members WHERE member_id = ?1);",
                [id.0],
                |row| row.get(0),
            )?;
            if exists == 1 {
                return Err(RepoError::OptimisticLockConflict {
                    id,
                    expected_version: member.version(),
                });
            }
            return Err(RepoError::NotFound {
                entity: "member",
                key: id.to_string(),
            });
        }

        member.set_version(member.version() + 1);
        member.set_state(self.session.managed_state());
        Ok(id)
    }
}

impl MemberRepository for SqliteMemberRepository<'_, '_> {
    fn save(&self, member: &mut Member) -> RepoResult<MemberId> {
        member.validate()?;

        if let EntityState::ReadOnly { .. } = member.state() {
            return Err(RepoError::ReadOnlySnapshot(member.key()));
        }
        if self.session.is_stale(member) {
            return Err(RepoError::StaleEntity(member.key()));
        }

        let team_id = match member.team_association() {
            TeamAssociation::None => None,
            TeamAssociation::Lazy { team_id, .. } => Some(*team_id),
            TeamAssociation::Loaded(team) => match team.id {
                Some(id) => Some(id),
                None => {
                    let key = team.key;
                    Some(self.bind_saved_team(member, key)?)
                }
            },
        };

        match member.id() {
            None => self.insert(member, team_id),
            Some(id) => self.update(id, member, team_id),
        }
    }

    fn find_by_id(&self, id: MemberId) -> RepoResult<Option<Member>> {
        let spec = SelectSpec::members().filter(Predicate::eq(Field::MemberId, id.0));
        let mut members = self.load(&spec, LoadMode::Tracked)?;
        Ok(members.pop())
    }

    fn find_all(&self) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members().with_graph(&EntityGraph::team());
        self.load(&spec, LoadMode::Tracked)
    }

    fn count(&self) -> RepoResult<u64> {
        exec::count(
            self.session.conn(),
            &SelectSpec::members().count_of(Field::MemberId),
        )
    }

    fn delete(&self, member: &Member) -> RepoResult<()> {
        match member.id() {
            Some(id) => self.delete_by_id(id),
            None => Err(RepoError::NotFound {
                entity: "member",
                key: member.key().to_string(),
            }),
        }
    }

    fn delete_by_id(&self, id: MemberId) -> RepoResult<()> {
        let changed = self
            .session
            .conn()
            .execute("DELETE FROM members WHERE member_id = ?1;", [id.0])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "member",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    fn refresh(&self, member: &mut Member) -> RepoResult<()> {
        let id = member.id().ok_or_else(|| RepoError::NotFound {
            entity: "member",
            key: member.key().to_string(),
        })?;
        let fresh = self.find_by_id(id)?.ok_or_else(|| RepoError::NotFound {
            entity: "member",
            key: id.to_string(),
        })?;
        *member = fresh;
        Ok(())
    }

    fn find_by_team(&self, team_id: TeamId) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members().filter(Predicate::eq(Field::MemberTeamId, team_id.0));
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: u32,
    ) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members()
            .filter(Predicate::eq(Field::Username, username.to_string()))
            .filter(Predicate::greater_than(Field::Age, age));
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_user(&self, username: &str, age: u32) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members()
            .filter(Predicate::eq(Field::Username, username.to_string()))
            .filter(Predicate::eq(Field::Age, age));
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_username_list(&self) -> RepoResult<Vec<String>> {
        let spec = SelectSpec::members().project(Projection::Field(Field::Username));
        exec::select(self.session.conn(), &spec, |row| Ok(row.get("username")?))
    }

    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>> {
        let spec = SelectSpec::members()
            .project(Projection::MemberDto)
            .join(Join::inner(JoinTarget::Team));
        exec::select(self.session.conn(), &spec, |row| {
            Ok(MemberDto::new(
                MemberId(row.get("member_id")?),
                row.get::<_, String>("username")?,
                row.get::<_, String>("team_name")?,
            ))
        })
    }

    fn find_members(&self, username: &str) -> RepoResult<Member> {
        self.find_member_by_username(username)
    }

    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members()
            .filter(Predicate::is_in(Field::Username, names.iter().copied()));
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.load(&by_username(username), LoadMode::Tracked)
    }

    fn find_member_by_username(&self, username: &str) -> RepoResult<Member> {
        let members = self.load(&by_username(username), LoadMode::Tracked)?;
        expect_single(members, username)
    }

    fn find_optional_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        let members = self.load(&by_username(username), LoadMode::Tracked)?;
        expect_optional(members, username)
    }

    fn find_by_age(&self, age: u32, page: &PageRequest) -> RepoResult<Page<Member>> {
        let content = SelectSpec::members().filter(Predicate::eq(Field::Age, age));
        let count = content.count_of(Field::MemberId);
        self.load_page(&content, &count, page, LoadMode::Tracked)
    }

    fn find_member_all_count_by(&self, page: &PageRequest) -> RepoResult<Page<Member>> {
        let content = SelectSpec::members();
        let count = SelectSpec::members().count_of(Field::Username);
        self.load_page(&content, &count, page, LoadMode::Tracked)
    }

    fn bulk_age_plus(&self, threshold: u32) -> RepoResult<usize> {
        let started_at = Instant::now();
        let spec = UpdateSpec::increment(Field::Age, 1)
            .filter(Predicate::greater_or_equal(Field::Age, threshold));

        match exec::update(self.session.conn(), &spec) {
            Ok(affected) => {
                self.session.clear_context();
                info!(
                    "event=bulk_update module=repo status=ok statement=member_age_plus threshold={} affected={} duration_ms={}",
                    threshold,
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=bulk_update module=repo status=error statement=member_age_plus threshold={} duration_ms={} error={}",
                    threshold,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn find_member_fetch_join(&self) -> RepoResult<Vec<Member>> {
        let spec = SelectSpec::members().join(Join::fetch_left(JoinTarget::Team));
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_member_entity_graph(&self) -> RepoResult<Vec<Member>> {
        self.find_all()
    }

    fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        let spec = by_username(username).with_graph(&EntityGraph::team());
        self.load(&spec, LoadMode::Tracked)
    }

    fn find_read_only_by_username(&self, username: &str) -> RepoResult<Member> {
        let members = self.load(&by_username(username), LoadMode::ReadOnly)?;
        expect_single(members, username)
    }

    fn find_page_hint_by_username(
        &self,
        username: &str,
        page: &PageRequest,
    ) -> RepoResult<Page<Member>> {
        let content = by_username(username);
        let count = content.count_of(Field::MemberId);
        self.load_page(&content, &count, page, LoadMode::ReadOnly)
    }

    fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        let started_at = Instant::now();
        let spec = by_username(username).lock(LockMode::PessimisticWrite);

        match exec::lock(self.session.conn(), &spec) {
            Ok(rows) => debug!(
                "event=lock_acquire module=repo status=ok mode=pessimistic_write session_id={} rows={} wait_ms={}",
                self.session.id(),
                rows,
                started_at.elapsed().as_millis()
            ),
            Err(err) => {
                if matches!(err, RepoError::LockTimeout(_)) {
                    warn!(
                        "event=lock_acquire module=repo status=error error_code=lock_timeout mode=pessimistic_write session_id={} wait_ms={}",
                        self.session.id(),
                        started_at.elapsed().as_millis()
                    );
                }
                return Err(err);
            }
        }

        self.load(&spec, LoadMode::Tracked)
    }
}

fn by_username(username: &str) -> SelectSpec {
    SelectSpec::members().filter(Predicate::eq(Field::Username, username.to_string()))
}

fn expect_single(mut members: Vec<Member>, username: &str) -> RepoResult<Member> {
    match members.len() {
        0 => Err(RepoError::NotFound {
            entity: "member",
            key: format!("username={username}"),
        }),
        1 => Ok(members.remove(0)),
        count => Err(RepoError::NonUniqueResult {
            entity: "member",
            key: format!("username={username}"),
            count,
        }),
    }
}

fn expect_optional(members: Vec<Member>, username: &str) -> RepoResult<Option<Member>> {
    if members.is_empty() {
        return Ok(None);
    }
    expect_single(members, username).map(Some)
}

fn parse_member_row(
    row: &Row<'_>,
    session: &Session<'_>,
    team_fetched: bool,
    mode: LoadMode,
) -> RepoResult<Member> {
    let key_text: String = row.get("member_key")?;
    let key = parse_key(&key_text, "members.member_key")?;

    let team = match row.get::<_, Option<i64>>("team_id")? {
        None => TeamAssociation::None,
        Some(team_id) if team_fetched => {
            let fetched_key: Option<String> = row.get("fetched_team_key")?;
            let Some(fetched_key) = fetched_key else {
                return Err(RepoError::InvalidData(format!(
                    "member {key} references missing team {team_id}"
                )));
            };
            TeamAssociation::Loaded(TeamRef {
                id: Some(TeamId(row.get("fetched_team_id")?)),
                key: parse_key(&fetched_key, "teams.team_key")?,
                name: row.get("fetched_team_name")?,
            })
        }
        Some(team_id) => TeamAssociation::Lazy {
            team_id: TeamId(team_id),
            session: session.id(),
        },
    };

    let state = match mode {
        LoadMode::Tracked => session.managed_state(),
        LoadMode::ReadOnly => session.read_only_state(),
    };

    let age = match row.get_ref("age")? {
        rusqlite::types::ValueRef::Integer(value) => u32::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("age {value} out of range in members.age"))
        })?,
        other => {
            return Err(RepoError::InvalidData(format!(
                "non-integer age {:?} in members.age",
                Value::from(other)
            )))
        }
    };

    Ok(Member::hydrate(
        MemberId(row.get("member_id")?),
        key,
        row.get("username")?,
        age,
        team,
        row.get("version")?,
        state,
    ))
}

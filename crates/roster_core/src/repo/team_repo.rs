//! Team repository contract and SQLite implementation.
//!
//! # Invariants
//! - Deleting a team never touches its members; while any member still
//!   references it the store rejects the delete (`ConstraintViolation`).
//! - A loaded team's member collection is rebuilt from `members.team_id`.

use crate::model::member::MemberKey;
use crate::model::team::{Team, TeamId, TeamKey, TeamRef};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::session::Session;
use crate::repo::{ensure_tables, parse_key};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Repository interface for team operations.
pub trait TeamRepository {
    /// Inserts a new team or renames an existing one.
    fn save(&self, team: &mut Team) -> RepoResult<TeamId>;
    /// Loads one team with its member collection.
    fn find_by_id(&self, id: TeamId) -> RepoResult<Option<Team>>;
    /// Loads every team with its member collection, ordered by id.
    fn find_all(&self) -> RepoResult<Vec<Team>>;
    fn delete(&self, team: &Team) -> RepoResult<()>;
    fn delete_by_id(&self, id: TeamId) -> RepoResult<()>;
}

/// SQLite-backed team repository.
pub struct SqliteTeamRepository<'s, 'conn> {
    session: &'s Session<'conn>,
}

impl<'s, 'conn> SqliteTeamRepository<'s, 'conn> {
    pub fn try_new(session: &'s Session<'conn>) -> RepoResult<Self> {
        ensure_tables(session.conn(), &["teams", "members"])?;
        Ok(Self { session })
    }
}

impl TeamRepository for SqliteTeamRepository<'_, '_> {
    fn save(&self, team: &mut Team) -> RepoResult<TeamId> {
        team.validate()?;
        let conn = self.session.conn();

        match team.id() {
            None => {
                conn.execute(
                    "INSERT INTO teams (team_key, name) VALUES (?1, ?2);",
                    params![team.key().to_string(), team.name.as_str()],
                )?;
                let id = TeamId(conn.last_insert_rowid());
                team.assign_id(id);
                debug!("event=team_save module=repo status=ok op=insert team_id={id}");
                Ok(id)
            }
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE teams SET name = ?2 WHERE team_id = ?1;",
                    params![id.0, team.name.as_str()],
                )?;
                if changed == 0 {
                    return Err(RepoError::NotFound {
                        entity: "team",
                        key: id.to_string(),
                    });
                }
                Ok(id)
            }
        }
    }

    fn find_by_id(&self, id: TeamId) -> RepoResult<Option<Team>> {
        let conn = self.session.conn();
        let row = conn
            .query_row(
                "SELECT team_id, team_key, name FROM teams WHERE team_id = ?1;",
                [id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>("team_id")?,
                        row.get::<_, String>("team_key")?,
                        row.get::<_, String>("name")?,
                    ))
                },
            )
            .optional()?;

        let Some((team_id, key_text, name)) = row else {
            return Ok(None);
        };

        let mut members = load_member_keys(conn, Some(id))?;
        let keys = members.remove(&id).unwrap_or_default();
        Ok(Some(Team::hydrate(
            TeamId(team_id),
            parse_key(&key_text, "teams.team_key")?,
            name,
            keys,
        )))
    }

    fn find_all(&self) -> RepoResult<Vec<Team>> {
        let conn = self.session.conn();
        let mut members = load_member_keys(conn, None)?;

        let mut stmt =
            conn.prepare("SELECT team_id, team_key, name FROM teams ORDER BY team_id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut teams = Vec::new();
        while let Some(row) = rows.next()? {
            let id = TeamId(row.get("team_id")?);
            let key_text: String = row.get("team_key")?;
            teams.push(Team::hydrate(
                id,
                parse_key(&key_text, "teams.team_key")?,
                row.get("name")?,
                members.remove(&id).unwrap_or_default(),
            ));
        }
        Ok(teams)
    }

    fn delete(&self, team: &Team) -> RepoResult<()> {
        match team.id() {
            Some(id) => self.delete_by_id(id),
            None => Err(RepoError::NotFound {
                entity: "team",
                key: team.key().to_string(),
            }),
        }
    }

    fn delete_by_id(&self, id: TeamId) -> RepoResult<()> {
        let changed = match self
            .session
            .conn()
            .execute("DELETE FROM teams WHERE team_id = ?1;", [id.0])
        {
            Ok(changed) => changed,
            Err(err) => {
                let err = RepoError::from(err);
                if matches!(err, RepoError::ConstraintViolation(_)) {
                    warn!(
                        "event=team_delete module=repo status=error error_code=members_still_assigned team_id={id}"
                    );
                }
                return Err(err);
            }
        };

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "team",
                key: id.to_string(),
            });
        }
        Ok(())
    }
}

/// Loads the association payload for one team.
pub(crate) fn load_team_ref(conn: &Connection, id: TeamId) -> RepoResult<Option<TeamRef>> {
    let row = conn
        .query_row(
            "SELECT team_key, name FROM teams WHERE team_id = ?1;",
            [id.0],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((key_text, name)) => Ok(Some(TeamRef {
            id: Some(id),
            key: parse_key(&key_text, "teams.team_key")?,
            name,
        })),
        None => Ok(None),
    }
}

/// Loads the association payload of a team by its client-side key.
pub(crate) fn load_team_ref_by_key(conn: &Connection, key: TeamKey) -> RepoResult<Option<TeamRef>> {
    let team = conn
        .query_row(
            "SELECT team_id, name FROM teams WHERE team_key = ?1;",
            [key.to_string()],
            |row| {
                Ok(TeamRef {
                    id: Some(TeamId(row.get(0)?)),
                    key,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(team)
}

/// Member keys grouped by team, in one round trip.
fn load_member_keys(
    conn: &Connection,
    team: Option<TeamId>,
) -> RepoResult<HashMap<TeamId, Vec<MemberKey>>> {
    let mut stmt = conn.prepare(
        "SELECT team_id, member_key
         FROM members
         WHERE team_id IS NOT NULL
           AND (?1 IS NULL OR team_id = ?1)
         ORDER BY member_id ASC;",
    )?;
    let mut rows = stmt.query([team.map(|id| id.0)])?;
    let mut grouped: HashMap<TeamId, Vec<MemberKey>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let team_id = TeamId(row.get("team_id")?);
        let key_text: String = row.get("member_key")?;
        grouped
            .entry(team_id)
            .or_default()
            .push(parse_key(&key_text, "members.member_key")?);
    }
    Ok(grouped)
}

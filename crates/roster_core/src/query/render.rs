//! Renders query specifications into SQLite statements.
//!
//! # Invariants
//! - Every caller value is bound through a positional `?`; only column names
//!   from `Field` are spliced into SQL text.
//! - Select statements alias `members` as `m` and `teams` as `t`; update and
//!   lock statements use bare member columns.

use crate::query::spec::{
    Assignment, Direction, Field, JoinKind, JoinTarget, LockMode, Predicate, Projection,
    SelectSpec, Table, UpdateSpec, ValueKind,
};
use crate::query::QueryCompositionError;
use rusqlite::types::Value;

/// Column list of a member entity row.
pub const MEMBER_COLUMNS: &str = "m.member_id AS member_id, m.member_key AS member_key, \
    m.username AS username, m.age AS age, m.team_id AS team_id, m.version AS version";

/// Extra columns read when the team is fetched with the member.
pub const FETCHED_TEAM_COLUMNS: &str =
    "t.team_id AS fetched_team_id, t.team_key AS fetched_team_key, t.name AS fetched_team_name";

/// Statement text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

type RenderResult<T> = Result<T, QueryCompositionError>;

/// Renders a select statement.
pub fn render_select(spec: &SelectSpec) -> RenderResult<RenderedQuery> {
    check_joins(spec)?;
    let team_joined = spec.joins_to(JoinTarget::Team);
    let team_fetched = spec.fetches(JoinTarget::Team);

    if team_fetched && spec.projection != Projection::Entity {
        return Err(QueryCompositionError::new(
            "fetch join without the member entity in the select list",
        ));
    }
    if spec.lock != LockMode::None && spec.projection != Projection::Entity {
        return Err(QueryCompositionError::new(
            "pessimistic lock on a non-entity projection",
        ));
    }

    let select_list = match spec.projection {
        Projection::Entity if team_fetched => format!("{MEMBER_COLUMNS}, {FETCHED_TEAM_COLUMNS}"),
        Projection::Entity => MEMBER_COLUMNS.to_string(),
        Projection::Field(field) => {
            require_reachable(field, team_joined, "projection")?;
            format!("{} AS {}", field.qualified(), field.column())
        }
        Projection::MemberDto => {
            if !team_joined {
                return Err(QueryCompositionError::new(
                    "member dto projection without a join to team",
                ));
            }
            "m.member_id AS member_id, m.username AS username, t.name AS team_name".to_string()
        }
        Projection::Count(field) => {
            require_reachable(field, team_joined, "count")?;
            if !spec.order.is_empty() || spec.window.is_some() {
                return Err(QueryCompositionError::new(
                    "count projection with ordering or a window",
                ));
            }
            format!("COUNT({}) AS total", field.qualified())
        }
    };

    let mut sql = format!("SELECT {select_list} FROM members m");
    for join in &spec.joins {
        match (join.target, join.kind) {
            (JoinTarget::Team, JoinKind::Inner) => {
                sql.push_str(" INNER JOIN teams t ON t.team_id = m.team_id")
            }
            (JoinTarget::Team, JoinKind::Left) => {
                sql.push_str(" LEFT JOIN teams t ON t.team_id = m.team_id")
            }
        }
    }

    let mut params = Vec::new();
    push_where(&mut sql, &mut params, &spec.predicates, Some(team_joined))?;

    let mut order = Vec::with_capacity(spec.order.len() + 1);
    for sort in &spec.order {
        require_reachable(sort.field, team_joined, "order by")?;
        let direction = match sort.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        order.push(format!("{} {direction}", sort.field.qualified()));
    }
    // Stable page boundaries for windowed entity reads.
    if spec.window.is_some()
        && spec.projection == Projection::Entity
        && !spec.order.iter().any(|sort| sort.field == Field::MemberId)
    {
        order.push("m.member_id ASC".to_string());
    }
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    if let Some(window) = spec.window {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(to_sql_integer(window.limit)?));
        params.push(Value::Integer(to_sql_integer(window.offset)?));
    }

    Ok(RenderedQuery { sql, params })
}

/// Renders a single-statement bulk update.
pub fn render_update(spec: &UpdateSpec) -> RenderResult<RenderedQuery> {
    let (field, by) = match spec.assignment {
        Assignment::Increment { field, by } => (field, by),
    };
    if field.table() != Table::Members || field.kind() != ValueKind::Integer || field.is_identity()
    {
        return Err(QueryCompositionError::new(format!(
            "increment of {}",
            field.path()
        )));
    }

    let column = field.column();
    let mut sql = format!(
        "UPDATE members SET {column} = {column} + ?, updated_at = (strftime('%s', 'now') * 1000)"
    );
    let mut params = vec![Value::Integer(by)];
    push_where(&mut sql, &mut params, &spec.predicates, None)?;
    Ok(RenderedQuery { sql, params })
}

/// Renders the statement that takes the write lock for a locking select.
///
/// SQLite has no row locks; a no-op write over the same rows takes the
/// database write lock, which is then held until the transaction ends.
/// Returns `None` when the spec does not ask for a lock.
pub fn render_lock(spec: &SelectSpec) -> RenderResult<Option<RenderedQuery>> {
    match spec.lock {
        LockMode::None => Ok(None),
        LockMode::PessimisticWrite => {
            if spec.projection != Projection::Entity {
                return Err(QueryCompositionError::new(
                    "pessimistic lock on a non-entity projection",
                ));
            }
            let mut sql = String::from("UPDATE members SET version = version");
            let mut params = Vec::new();
            push_where(&mut sql, &mut params, &spec.predicates, None)?;
            Ok(Some(RenderedQuery { sql, params }))
        }
    }
}

fn check_joins(spec: &SelectSpec) -> RenderResult<()> {
    let team_joins = spec
        .joins
        .iter()
        .filter(|join| join.target == JoinTarget::Team)
        .count();
    if team_joins > 1 {
        return Err(QueryCompositionError::new("duplicate join to team"));
    }
    Ok(())
}

fn require_reachable(field: Field, team_joined: bool, clause: &str) -> RenderResult<()> {
    if field.table() == Table::Teams && !team_joined {
        return Err(QueryCompositionError::new(format!(
            "{clause} on {} without a join to team",
            field.path()
        )));
    }
    Ok(())
}

/// `team_joined = None` means a bare-column statement over `members` only.
fn push_where(
    sql: &mut String,
    params: &mut Vec<Value>,
    predicates: &[Predicate],
    team_joined: Option<bool>,
) -> RenderResult<()> {
    if predicates.is_empty() {
        return Ok(());
    }

    let mut clauses = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let field = predicate.field();
        let column = match team_joined {
            Some(joined) => {
                require_reachable(field, joined, "predicate")?;
                field.qualified()
            }
            None => {
                if field.table() != Table::Members {
                    return Err(QueryCompositionError::new(format!(
                        "predicate on {} in a members-only statement",
                        field.path()
                    )));
                }
                field.column()
            }
        };

        let clause = match predicate {
            Predicate::Eq(_, Value::Null) => format!("{column} IS NULL"),
            Predicate::Eq(_, value) => {
                check_value_kind(field, value)?;
                params.push(value.clone());
                format!("{column} = ?")
            }
            Predicate::GreaterThan(_, value) | Predicate::GreaterOrEqual(_, value) => {
                if field.kind() != ValueKind::Integer {
                    return Err(QueryCompositionError::new(format!(
                        "range predicate on text field {}",
                        field.path()
                    )));
                }
                check_value_kind(field, value)?;
                params.push(value.clone());
                if matches!(predicate, Predicate::GreaterThan(..)) {
                    format!("{column} > ?")
                } else {
                    format!("{column} >= ?")
                }
            }
            Predicate::In(_, values) => {
                if field.kind() != ValueKind::Text {
                    return Err(QueryCompositionError::new(format!(
                        "in predicate on non-text field {}",
                        field.path()
                    )));
                }
                if values.is_empty() {
                    "1 = 0".to_string()
                } else {
                    params.extend(values.iter().cloned().map(Value::Text));
                    let placeholders = vec!["?"; values.len()].join(", ");
                    format!("{column} IN ({placeholders})")
                }
            }
        };
        clauses.push(clause);
    }

    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
    Ok(())
}

fn check_value_kind(field: Field, value: &Value) -> RenderResult<()> {
    let matches = matches!(
        (field.kind(), value),
        (ValueKind::Integer, Value::Integer(_)) | (ValueKind::Text, Value::Text(_))
    );
    if !matches {
        return Err(QueryCompositionError::new(format!(
            "{} value for {:?} field {}",
            value_type_name(value),
            field.kind(),
            field.path()
        )));
    }
    Ok(())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}

fn to_sql_integer(value: u64) -> RenderResult<i64> {
    i64::try_from(value)
        .map_err(|_| QueryCompositionError::new(format!("window bound {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::{render_lock, render_select, render_update};
    use crate::query::spec::{
        EntityGraph, Field, Join, JoinTarget, LockMode, Predicate, Projection, SelectSpec, Sort,
        UpdateSpec,
    };
    use rusqlite::types::Value;

    #[test]
    fn equality_and_greater_than_combine_with_and() {
        let spec = SelectSpec::members()
            .filter(Predicate::eq(Field::Username, "AAA".to_string()))
            .filter(Predicate::greater_than(Field::Age, 15_i64));

        let rendered = render_select(&spec).unwrap();

        assert!(rendered
            .sql
            .ends_with("FROM members m WHERE m.username = ? AND m.age > ?"));
        assert_eq!(
            rendered.params,
            vec![Value::Text("AAA".to_string()), Value::Integer(15)]
        );
    }

    #[test]
    fn in_predicate_binds_each_value() {
        let spec = SelectSpec::members().filter(Predicate::is_in(Field::Username, ["a", "b"]));

        let rendered = render_select(&spec).unwrap();

        assert!(rendered.sql.ends_with("WHERE m.username IN (?, ?)"));
        assert_eq!(rendered.params.len(), 2);
    }

    #[test]
    fn empty_in_predicate_renders_always_false() {
        let spec =
            SelectSpec::members().filter(Predicate::is_in(Field::Username, Vec::<String>::new()));

        let rendered = render_select(&spec).unwrap();

        assert!(rendered.sql.ends_with("WHERE 1 = 0"));
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn null_equality_renders_is_null() {
        let spec = SelectSpec::members().filter(Predicate::Eq(Field::MemberTeamId, Value::Null));

        let rendered = render_select(&spec).unwrap();

        assert!(rendered.sql.ends_with("WHERE m.team_id IS NULL"));
    }

    #[test]
    fn field_projection_selects_single_column() {
        let spec = SelectSpec::members().project(Projection::Field(Field::Username));

        let rendered = render_select(&spec).unwrap();

        assert_eq!(rendered.sql, "SELECT m.username AS username FROM members m");
    }

    #[test]
    fn member_dto_requires_team_join() {
        let err = render_select(&SelectSpec::members().project(Projection::MemberDto)).unwrap_err();
        assert!(err.shape().contains("member dto"));

        let joined = SelectSpec::members()
            .project(Projection::MemberDto)
            .join(Join::inner(JoinTarget::Team));
        let rendered = render_select(&joined).unwrap();
        assert!(rendered.sql.contains("t.name AS team_name"));
        assert!(rendered
            .sql
            .contains("INNER JOIN teams t ON t.team_id = m.team_id"));
    }

    #[test]
    fn fetch_join_adds_team_columns() {
        let spec = SelectSpec::members().join(Join::fetch_left(JoinTarget::Team));

        let rendered = render_select(&spec).unwrap();

        assert!(rendered.sql.contains("t.name AS fetched_team_name"));
        assert!(rendered
            .sql
            .contains("LEFT JOIN teams t ON t.team_id = m.team_id"));
    }

    #[test]
    fn fetch_join_requires_entity_projection() {
        let spec = SelectSpec::members()
            .project(Projection::Field(Field::Username))
            .join(Join::fetch_left(JoinTarget::Team));

        let err = render_select(&spec).unwrap_err();

        assert!(err.shape().contains("fetch join"));
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let spec = SelectSpec::members()
            .join(Join::inner(JoinTarget::Team))
            .join(Join::fetch_left(JoinTarget::Team));

        assert!(render_select(&spec).is_err());
    }

    #[test]
    fn entity_graph_upgrades_existing_join() {
        let spec = SelectSpec::members()
            .join(Join::inner(JoinTarget::Team))
            .with_graph(&EntityGraph::team());

        assert_eq!(spec.joins.len(), 1);
        assert!(spec.fetches(JoinTarget::Team));
        let rendered = render_select(&spec).unwrap();
        assert!(rendered.sql.contains("INNER JOIN teams t"));
        assert!(rendered.sql.contains("fetched_team_key"));
    }

    #[test]
    fn team_predicate_without_join_is_rejected() {
        let spec =
            SelectSpec::members().filter(Predicate::eq(Field::TeamName, "teamA".to_string()));

        let err = render_select(&spec).unwrap_err();

        assert!(err.shape().contains("team.name"));
    }

    #[test]
    fn range_predicate_on_text_is_rejected() {
        let spec =
            SelectSpec::members().filter(Predicate::greater_than(Field::Username, "m".to_string()));

        assert!(render_select(&spec).is_err());
    }

    #[test]
    fn in_predicate_on_integer_is_rejected() {
        let spec = SelectSpec::members().filter(Predicate::is_in(Field::Age, ["10"]));

        assert!(render_select(&spec).is_err());
    }

    #[test]
    fn mismatched_value_kind_is_rejected() {
        let spec = SelectSpec::members().filter(Predicate::eq(Field::Age, "ten".to_string()));

        let err = render_select(&spec).unwrap_err();

        assert!(err.shape().contains("member.age"));
    }

    #[test]
    fn windowed_entity_select_orders_by_sort_then_id() {
        let spec = SelectSpec::members()
            .order_by(Sort::desc(Field::Username))
            .window(3, 6);

        let rendered = render_select(&spec).unwrap();

        assert!(rendered
            .sql
            .ends_with("ORDER BY m.username DESC, m.member_id ASC LIMIT ? OFFSET ?"));
        assert_eq!(
            &rendered.params[rendered.params.len() - 2..],
            &[Value::Integer(3), Value::Integer(6)]
        );
    }

    #[test]
    fn count_of_drops_fetch_order_and_window() {
        let content = SelectSpec::members()
            .filter(Predicate::eq(Field::Age, 10_i64))
            .join(Join::fetch_left(JoinTarget::Team))
            .order_by(Sort::asc(Field::Username))
            .window(3, 0);

        let rendered = render_select(&content.count_of(Field::Username)).unwrap();

        assert_eq!(
            rendered.sql,
            "SELECT COUNT(m.username) AS total FROM members m LEFT JOIN teams t ON t.team_id = m.team_id WHERE m.age = ?"
        );
    }

    #[test]
    fn windowed_count_is_rejected() {
        let mut spec = SelectSpec::members().count_of(Field::MemberId);
        spec.window = Some(crate::query::spec::Window {
            limit: 1,
            offset: 0,
        });

        assert!(render_select(&spec).is_err());
    }

    #[test]
    fn increment_update_uses_single_statement() {
        let spec = UpdateSpec::increment(Field::Age, 1)
            .filter(Predicate::greater_or_equal(Field::Age, 20_i64));

        let rendered = render_update(&spec).unwrap();

        assert!(rendered.sql.starts_with("UPDATE members SET age = age + ?"));
        assert!(rendered.sql.ends_with("WHERE age >= ?"));
        assert_eq!(rendered.params, vec![Value::Integer(1), Value::Integer(20)]);
    }

    #[test]
    fn increment_of_text_or_identity_is_rejected() {
        assert!(render_update(&UpdateSpec::increment(Field::Username, 1)).is_err());
        assert!(render_update(&UpdateSpec::increment(Field::MemberId, 1)).is_err());
        assert!(render_update(&UpdateSpec::increment(Field::TeamId, 1)).is_err());
    }

    #[test]
    fn update_with_team_predicate_is_rejected() {
        let spec = UpdateSpec::increment(Field::Age, 1)
            .filter(Predicate::eq(Field::TeamName, "teamA".to_string()));

        let err = render_update(&spec).unwrap_err();

        assert!(err.shape().contains("members-only"));
    }

    #[test]
    fn lock_renders_no_op_write_over_same_rows() {
        let spec = SelectSpec::members()
            .filter(Predicate::eq(Field::Username, "member1".to_string()))
            .lock(LockMode::PessimisticWrite);

        let lock = render_lock(&spec).unwrap().unwrap();

        assert_eq!(
            lock.sql,
            "UPDATE members SET version = version WHERE username = ?"
        );
        assert!(render_lock(&SelectSpec::members()).unwrap().is_none());
    }

    #[test]
    fn lock_on_projection_is_rejected() {
        let spec = SelectSpec::members()
            .project(Projection::Field(Field::Username))
            .lock(LockMode::PessimisticWrite);

        assert!(render_select(&spec).is_err());
        assert!(render_lock(&spec).is_err());
    }
}

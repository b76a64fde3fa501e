//! Declarative query specifications.
//!
//! A lookup is described by data (predicates, projection, joins, order,
//! window, lock) and rendered by `query::render`; nothing here parses method
//! names or query strings.

use rusqlite::types::Value;

/// Table a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Members,
    Teams,
}

/// Storage class a field accepts in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Text,
}

/// Queryable field of the member graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    MemberId,
    Username,
    Age,
    /// `members.team_id` foreign key; usable without a join.
    MemberTeamId,
    TeamId,
    TeamName,
}

impl Field {
    pub fn table(self) -> Table {
        match self {
            Self::MemberId | Self::Username | Self::Age | Self::MemberTeamId => Table::Members,
            Self::TeamId | Self::TeamName => Table::Teams,
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Self::Username | Self::TeamName => ValueKind::Text,
            Self::MemberId | Self::Age | Self::MemberTeamId | Self::TeamId => ValueKind::Integer,
        }
    }

    /// Identity and foreign-key columns; never a target of arithmetic.
    pub fn is_identity(self) -> bool {
        matches!(self, Self::MemberId | Self::MemberTeamId | Self::TeamId)
    }

    /// Bare column name.
    pub fn column(self) -> &'static str {
        match self {
            Self::MemberId => "member_id",
            Self::Username => "username",
            Self::Age => "age",
            Self::MemberTeamId | Self::TeamId => "team_id",
            Self::TeamName => "name",
        }
    }

    /// Column qualified with the select alias (`m` for members, `t` for teams).
    pub fn qualified(self) -> &'static str {
        match self {
            Self::MemberId => "m.member_id",
            Self::Username => "m.username",
            Self::Age => "m.age",
            Self::MemberTeamId => "m.team_id",
            Self::TeamId => "t.team_id",
            Self::TeamName => "t.name",
        }
    }

    /// Name used in error messages.
    pub fn path(self) -> &'static str {
        match self {
            Self::MemberId => "member.id",
            Self::Username => "member.username",
            Self::Age => "member.age",
            Self::MemberTeamId => "member.team_id",
            Self::TeamId => "team.id",
            Self::TeamName => "team.name",
        }
    }
}

/// One condition; a spec's predicates are combined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equality. `Value::Null` renders as `IS NULL`.
    Eq(Field, Value),
    GreaterThan(Field, Value),
    GreaterOrEqual(Field, Value),
    /// Membership in a caller-supplied set of strings.
    In(Field, Vec<String>),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::Eq(field, value.into())
    }

    pub fn greater_than(field: Field, value: impl Into<Value>) -> Self {
        Self::GreaterThan(field, value.into())
    }

    pub fn greater_or_equal(field: Field, value: impl Into<Value>) -> Self {
        Self::GreaterOrEqual(field, value.into())
    }

    pub fn is_in<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In(field, values.into_iter().map(Into::into).collect())
    }

    pub fn field(&self) -> Field {
        match self {
            Self::Eq(field, _)
            | Self::GreaterThan(field, _)
            | Self::GreaterOrEqual(field, _)
            | Self::In(field, _) => *field,
        }
    }
}

/// Shape of each result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Full member entity (plus fetched team columns under a fetch join).
    Entity,
    /// A single column.
    Field(Field),
    /// `MemberDto` (member id, username, team name); needs a team join.
    MemberDto,
    /// `COUNT(field)`.
    Count(Field),
}

/// Associations reachable from a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget {
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Explicit join; `fetch` loads the association in the same round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    pub target: JoinTarget,
    pub kind: JoinKind,
    pub fetch: bool,
}

impl Join {
    pub fn inner(target: JoinTarget) -> Self {
        Self {
            target,
            kind: JoinKind::Inner,
            fetch: false,
        }
    }

    pub fn left(target: JoinTarget) -> Self {
        Self {
            target,
            kind: JoinKind::Left,
            fetch: false,
        }
    }

    pub fn fetch_inner(target: JoinTarget) -> Self {
        Self {
            fetch: true,
            ..Self::inner(target)
        }
    }

    pub fn fetch_left(target: JoinTarget) -> Self {
        Self {
            fetch: true,
            ..Self::left(target)
        }
    }
}

/// Associations to resolve eagerly for one operation.
///
/// Unlike an explicit fetch join, applying a graph never fails on an existing
/// join; it upgrades that join to a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityGraph {
    attributes: Vec<JoinTarget>,
}

impl EntityGraph {
    pub fn of(attributes: &[JoinTarget]) -> Self {
        Self {
            attributes: attributes.to_vec(),
        }
    }

    pub fn team() -> Self {
        Self::of(&[JoinTarget::Team])
    }

    pub fn attributes(&self) -> &[JoinTarget] {
        &self.attributes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: Field,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

/// `LIMIT`/`OFFSET` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    None,
    /// Exclusive write lock held until the enclosing transaction ends.
    PessimisticWrite,
}

/// Select over `members m`, optionally joined to `teams t`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectSpec {
    pub projection: Projection,
    pub predicates: Vec<Predicate>,
    pub joins: Vec<Join>,
    pub order: Vec<Sort>,
    pub window: Option<Window>,
    pub lock: LockMode,
}

impl SelectSpec {
    /// Entity select over all members.
    pub fn members() -> Self {
        Self {
            projection: Projection::Entity,
            predicates: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            window: None,
            lock: LockMode::None,
        }
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_graph(mut self, graph: &EntityGraph) -> Self {
        for target in graph.attributes() {
            match self.joins.iter_mut().find(|join| join.target == *target) {
                Some(existing) => existing.fetch = true,
                None => self.joins.push(Join::fetch_left(*target)),
            }
        }
        self
    }

    pub fn order_by(mut self, sort: Sort) -> Self {
        self.order.push(sort);
        self
    }

    pub fn window(mut self, limit: u64, offset: u64) -> Self {
        self.window = Some(Window { limit, offset });
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = mode;
        self
    }

    pub fn joins_to(&self, target: JoinTarget) -> bool {
        self.joins.iter().any(|join| join.target == target)
    }

    pub fn fetches(&self, target: JoinTarget) -> bool {
        self.joins
            .iter()
            .any(|join| join.target == target && join.fetch)
    }

    /// Count over the same rows: keeps predicates and joins, drops fetches,
    /// ordering, window and lock.
    pub fn count_of(&self, field: Field) -> Self {
        Self {
            projection: Projection::Count(field),
            predicates: self.predicates.clone(),
            joins: self
                .joins
                .iter()
                .map(|join| Join {
                    fetch: false,
                    ..*join
                })
                .collect(),
            order: Vec::new(),
            window: None,
            lock: LockMode::None,
        }
    }
}

/// Right-hand side of a bulk `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// `field = field + by`
    Increment { field: Field, by: i64 },
}

/// Single-statement bulk update over `members`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub assignment: Assignment,
    pub predicates: Vec<Predicate>,
}

impl UpdateSpec {
    pub fn increment(field: Field, by: i64) -> Self {
        Self {
            assignment: Assignment::Increment { field, by },
            predicates: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }
}

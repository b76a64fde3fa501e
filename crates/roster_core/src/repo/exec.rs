//! Statement execution shared by repositories and the paging engine.

use crate::query::{
    render_lock, render_select, render_update, Projection, QueryCompositionError, SelectSpec,
    UpdateSpec,
};
use crate::repo::error::{RepoError, RepoResult};
use log::{trace, warn};
use rusqlite::{params_from_iter, Connection, Row};

/// Renders and runs a select, mapping every row with `map`.
pub(crate) fn select<T, F>(conn: &Connection, spec: &SelectSpec, mut map: F) -> RepoResult<Vec<T>>
where
    F: FnMut(&Row<'_>) -> RepoResult<T>,
{
    let rendered = composed(render_select(spec))?;
    trace!("event=sql_exec module=repo kind=select sql={}", rendered.sql);

    let mut stmt = conn.prepare(&rendered.sql)?;
    let mut rows = stmt.query(params_from_iter(rendered.params.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(map(row)?);
    }
    Ok(items)
}

/// Runs a count spec and returns its single value.
pub(crate) fn count(conn: &Connection, spec: &SelectSpec) -> RepoResult<u64> {
    if !matches!(spec.projection, Projection::Count(_)) {
        return composed(Err(QueryCompositionError::new(
            "count query without a count projection",
        )));
    }

    let rendered = composed(render_select(spec))?;
    trace!("event=sql_exec module=repo kind=count sql={}", rendered.sql);

    let total: i64 = conn.query_row(
        &rendered.sql,
        params_from_iter(rendered.params.iter()),
        |row| row.get("total"),
    )?;
    u64::try_from(total).map_err(|_| RepoError::InvalidData(format!("negative count {total}")))
}

/// Runs a bulk update and returns the number of affected rows.
pub(crate) fn update(conn: &Connection, spec: &UpdateSpec) -> RepoResult<usize> {
    let rendered = composed(render_update(spec))?;
    trace!("event=sql_exec module=repo kind=update sql={}", rendered.sql);
    Ok(conn.execute(&rendered.sql, params_from_iter(rendered.params.iter()))?)
}

/// Takes the write lock requested by `spec`, if any. Returns rows touched.
pub(crate) fn lock(conn: &Connection, spec: &SelectSpec) -> RepoResult<usize> {
    match composed(render_lock(spec))? {
        Some(rendered) => {
            trace!("event=sql_exec module=repo kind=lock sql={}", rendered.sql);
            Ok(conn.execute(&rendered.sql, params_from_iter(rendered.params.iter()))?)
        }
        None => Ok(0),
    }
}

fn composed<T>(result: Result<T, QueryCompositionError>) -> RepoResult<T> {
    result.map_err(|err| {
        warn!(
            "event=query_compose module=repo status=error error_code=query_composition shape={}",
            err.shape()
        );
        RepoError::QueryComposition(err)
    })
}

//! SELECT-prefix filter for caller-supplied statements.
//!
//! This is a textual check on the first keyword only. It blocks the plain
//! single-statement INSERT/UPDATE/DELETE/DDL case and nothing more: it is not
//! a SQL parser and not an injection defense. `select 1; drop table t` passes.

use futures::FutureExt;
use log::{debug, warn};

use crate::config::ConnectionConfig;
use crate::db::{with_session, Driver, Row};
use crate::error::{DbError, DbResult};

const ALLOWED_PREFIX: &str = "select";

/// Whether `statement`, trimmed and lowercased, starts with `select`.
pub fn is_select(statement: &str) -> bool {
    statement.trim().to_lowercase().starts_with(ALLOWED_PREFIX)
}

pub fn ensure_select(statement: &str) -> DbResult<()> {
    if is_select(statement) {
        Ok(())
    } else {
        Err(DbError::ReadOnlyViolation)
    }
}

/// Run `statement` exactly as given if it passes the prefix filter.
///
/// Rejected statements never open a connection.
pub async fn run_guarded(
    driver: &dyn Driver,
    config: &ConnectionConfig,
    statement: &str,
) -> DbResult<Vec<Row>> {
    if let Err(e) = ensure_select(statement) {
        warn!("Rejected non-SELECT statement");
        return Err(e);
    }

    let statement = statement.to_string();
    let rows = with_session(driver, config, move |session| {
        async move {
            session
                .fetch(&statement, &[])
                .await
                .map_err(DbError::into_execution)
        }
        .boxed()
    })
    .await?;
    debug!("Guarded query returned {} rows", rows.len());
    Ok(rows)
}

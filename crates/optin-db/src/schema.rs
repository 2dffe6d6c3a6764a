use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Create the token and related-record tables if they are missing.
///
/// `opt_in_related` has no foreign key to `opt_in_tokens`; deleting a token's
/// related rows is the session's job.
pub fn ensure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS opt_in_tokens (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            lastModified    INTEGER NOT NULL DEFAULT 0,
            token           TEXT NOT NULL UNIQUE,
            createdOn       INTEGER NOT NULL DEFAULT 0,
            confirmedOn     INTEGER NOT NULL DEFAULT 0,
            removeOn        INTEGER NOT NULL DEFAULT 0,
            email           TEXT NOT NULL DEFAULT '',
            emailSubject    TEXT NOT NULL DEFAULT '',
            emailText       TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_opt_in_tokens_remove_on
            ON opt_in_tokens(removeOn);

        CREATE TABLE IF NOT EXISTS opt_in_related (
            parentId        INTEGER NOT NULL,
            relatedTable    TEXT NOT NULL,
            relatedId       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_opt_in_related_parent
            ON opt_in_related(parentId);

        CREATE INDEX IF NOT EXISTS idx_opt_in_related_target
            ON opt_in_related(relatedTable, relatedId);
        ",
    )?;

    info!("Opt-in schema ready");
    Ok(())
}

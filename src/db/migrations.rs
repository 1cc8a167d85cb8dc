use anyhow::{bail, Result};
use rusqlite::Connection;
use tracing::info;

/// Newest schema this build understands.
const SCHEMA_VERSION: i64 = 1;

/// Walk the store forward from its recorded version to `SCHEMA_VERSION`,
/// one migration per step, each committed atomically. A store written by
/// a newer build is refused rather than guessed at.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut current = current_version(conn)?;

    if current > SCHEMA_VERSION {
        bail!(
            "Store schema version {current} is newer than supported version {SCHEMA_VERSION}; \
             upgrade voxmap to open this database"
        );
    }

    while current < SCHEMA_VERSION {
        let next = current + 1;
        let tx = conn.unchecked_transaction()?;
        apply_migration(&tx, next)?;
        tx.execute(
            "INSERT OR REPLACE INTO voxmap_meta (key, value) VALUES ('schema_version', ?1)",
            [next.to_string()],
        )?;
        tx.commit()?;
        info!("Migrated store schema v{current} -> v{next}");
        current = next;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> Result<i64> {
    use rusqlite::OptionalExtension;
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM voxmap_meta WHERE key = 'schema_version'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn apply_migration(_conn: &Connection, version: i64) -> Result<()> {
    match version {
        // v1 is created whole by schema::create_schema; nothing to replay
        1 => Ok(()),
        _ => bail!("No migration defined for schema version {version}"),
    }
}

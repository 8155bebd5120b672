//! Schema migrations tracked in `PRAGMA user_version`.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL), (2, schema::MIGRATION_V2_SQL)];

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the stored value is negative
/// or too large.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
///
/// # Errors
///
/// Returns an error if any migration fails. A failed migration leaves the
/// database at the last version that committed.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    migrate_to(conn, LATEST_SCHEMA_VERSION)
}

/// Apply pending migrations up to and including `target`.
///
/// Stopping short of the latest version yields a store whose enriched
/// queries fail, which is how degraded deployments are reproduced locally.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate_to(conn: &mut Connection, target: u32) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current || *version > target {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        tracing::debug!(version, "applied schema migration");
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate, migrate_to};
    use crate::db::schema;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            )",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        let applied = migrate(&mut conn)?;
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["users", "wishes", "comments", "wish_priorities"] {
            assert!(sqlite_object_exists(&conn, "table", table)?, "missing {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }

        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn partial_migration_omits_priorities() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate_to(&mut conn, 1)?, 1);
        assert!(sqlite_object_exists(&conn, "table", "wishes")?);
        assert!(!sqlite_object_exists(&conn, "table", "wish_priorities")?);
        Ok(())
    }

    #[test]
    fn migrate_upgrades_from_v1_and_keeps_rows() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate_to(&mut conn, 1)?;
        conn.execute(
            "INSERT INTO users (user_id, email, display_name, created_at_us)
             VALUES ('u1', 'a@example.com', 'Ana', 1)",
            [],
        )?;
        conn.execute(
            "INSERT INTO wishes (wish_id, group_id, category, title, created_by, created_at_us)
             VALUES ('w1', 'g1', 'movies', 'Dune', 'u1', 2)",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let titles: i64 = conn.query_row("SELECT COUNT(*) FROM wishes", [], |row| row.get(0))?;
        assert_eq!(titles, 1);
        conn.execute(
            "INSERT INTO wish_priorities (wish_id, user_id, value, created_at_us)
             VALUES ('w1', 'u1', 4, 3)",
            [],
        )?;
        Ok(())
    }

    #[test]
    fn duplicate_vote_violates_primary_key() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        conn.execute_batch(
            "INSERT INTO users (user_id, email, display_name, created_at_us)
                 VALUES ('u1', 'a@example.com', 'Ana', 1);
             INSERT INTO wishes (wish_id, group_id, category, title, created_by, created_at_us)
                 VALUES ('w1', 'g1', 'games', 'Hades', 'u1', 2);
             INSERT INTO wish_priorities (wish_id, user_id, value, created_at_us)
                 VALUES ('w1', 'u1', 3, 3);",
        )?;
        let second = conn.execute(
            "INSERT INTO wish_priorities (wish_id, user_id, value, created_at_us)
             VALUES ('w1', 'u1', 5, 4)",
            [],
        );
        assert!(second.is_err());
        Ok(())
    }
}

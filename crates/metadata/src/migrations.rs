//! Versioned schema migrations for dataset databases.
//!
//! Migrations are applied in version order, each in its own transaction
//! together with its history row. A database whose history is not a prefix
//! of [`MIGRATIONS`] is rejected instead of being modified.

use crate::error::{MetadataError, MetadataResult};
use crate::models::MigrationRow;
use sqlx::{Pool, Sqlite};
use time::OffsetDateTime;

/// One schema migration step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Table recording applied migrations.
pub const HISTORY_TABLE: &str = "__ldm_migrations";

/// Every migration, in application order. Versions are contiguous from 1.
/// Each step is a single SQL statement.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_sample",
        sql: r#"
CREATE TABLE "Sample" (
    "SampleID" INTEGER NOT NULL PRIMARY KEY,
    "DatasetID" TEXT NOT NULL,
    "SampleType" TEXT NOT NULL DEFAULT '',
    "Metadata" TEXT,
    "ImageCount" INTEGER NOT NULL DEFAULT 0
);
"#,
    },
    Migration {
        version: 2,
        name: "create_image",
        sql: r#"
CREATE TABLE "Image" (
    "ImageID" TEXT NOT NULL PRIMARY KEY,
    "SampleID" INTEGER NOT NULL REFERENCES "Sample" ("SampleID") ON DELETE CASCADE,
    "ImageNO" INTEGER NOT NULL DEFAULT 0,
    "ImageCode" TEXT,
    "OriginalFilename" TEXT,
    "ImageScheme" TEXT
);
"#,
    },
    Migration {
        version: 3,
        name: "index_image_sample",
        sql: r#"
CREATE INDEX "IX_Image_SampleID" ON "Image" ("SampleID");
"#,
    },
];

/// Schema version a fully migrated database is at.
pub const TARGET_VERSION: i64 = MIGRATIONS.len() as i64;

const CREATE_HISTORY_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "__ldm_migrations" (
    version INTEGER NOT NULL PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)
"#;

/// Read the migration history. A database without a history table has none.
pub async fn applied(pool: &Pool<Sqlite>) -> MetadataResult<Vec<MigrationRow>> {
    let has_history: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
    )
    .bind(HISTORY_TABLE)
    .fetch_one(pool)
    .await?;

    if !has_history {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, MigrationRow>(
        "SELECT version, name, applied_at FROM \"__ldm_migrations\" ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Current schema version (0 for an empty database).
pub async fn current_version(pool: &Pool<Sqlite>) -> MetadataResult<i64> {
    Ok(applied(pool).await?.last().map_or(0, |m| m.version))
}

/// Check that the recorded history is a prefix of [`MIGRATIONS`] and return
/// the steps still to apply.
fn pending(history: &[MigrationRow]) -> MetadataResult<&'static [Migration]> {
    if history.len() > MIGRATIONS.len() {
        return Err(MetadataError::IncompatibleSchema(format!(
            "database has {} migrations applied, this build knows {}",
            history.len(),
            MIGRATIONS.len()
        )));
    }
    for (recorded, known) in history.iter().zip(MIGRATIONS) {
        if recorded.version != known.version || recorded.name != known.name {
            return Err(MetadataError::IncompatibleSchema(format!(
                "migration history diverges at version {}: found '{}', expected '{}'",
                known.version, recorded.name, known.name
            )));
        }
    }
    Ok(&MIGRATIONS[history.len()..])
}

/// Apply every pending migration. Returns the number applied; an already
/// current database yields `Ok(0)`.
pub async fn run(pool: &Pool<Sqlite>) -> MetadataResult<usize> {
    sqlx::query(CREATE_HISTORY_SQL).execute(pool).await?;

    let history = applied(pool).await?;
    let pending = pending(&history)?;

    for migration in pending {
        apply(pool, migration)
            .await
            .map_err(|source| MetadataError::Migration {
                version: migration.version,
                name: migration.name.to_string(),
                source,
            })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    Ok(pending.len())
}

async fn apply(pool: &Pool<Sqlite>, migration: &Migration) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(migration.sql).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO \"__ldm_migrations\" (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::migrations;
use crate::repos::{ImageRepo, SampleRepo};
use async_trait::async_trait;
use ldm_core::DatasetId;
use ldm_core::config::{JournalMode, MetadataConfig};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

/// Combined metadata store trait for one dataset.
#[async_trait]
pub trait MetadataStore: SampleRepo + ImageRepo + Send + Sync {
    /// Apply pending schema migrations. Returns how many were applied.
    async fn migrate(&self) -> MetadataResult<usize>;

    /// Current schema version.
    async fn schema_version(&self) -> MetadataResult<i64>;

    /// Whether migrations are pending.
    async fn is_stale(&self) -> MetadataResult<bool> {
        Ok(self.schema_version().await? < migrations::TARGET_VERSION)
    }

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store for one dataset.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    dataset_id: DatasetId,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path`.
    ///
    /// Opening never migrates; callers decide when to run [`MetadataStore::migrate`].
    pub async fn open(
        dataset_id: DatasetId,
        path: impl AsRef<Path>,
        config: &MetadataConfig,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let journal_mode = match config.journal_mode {
            JournalMode::Wal => SqliteJournalMode::Wal,
            JournalMode::Delete => SqliteJournalMode::Delete,
        };

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(journal_mode)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Concurrent handles on one dataset wait for the writer instead of failing.
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            // One connection per handle; SQLite serializes writers across handles.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        tracing::debug!(dataset = %dataset_id, path = %path.display(), "Opened dataset database");

        Ok(Self { pool, dataset_id })
    }

    /// Dataset this store belongs to.
    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset_id
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<usize> {
        migrations::run(&self.pool).await
    }

    async fn schema_version(&self) -> MetadataResult<i64> {
        migrations::current_version(&self.pool).await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

/// Recount a sample's images and store the count with a fresh snapshot.
///
/// Runs on the caller's transaction so the change and the recount commit
/// together.
async fn sync_sample(
    conn: &mut SqliteConnection,
    sample_id: i64,
) -> MetadataResult<crate::models::SampleRow> {
    let mut sample = sqlx::query_as::<_, crate::models::SampleRow>(
        "SELECT * FROM \"Sample\" WHERE \"SampleID\" = ?",
    )
    .bind(sample_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| MetadataError::NotFound(format!("sample {sample_id}")))?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"Image\" WHERE \"SampleID\" = ?")
        .bind(sample_id)
        .fetch_one(&mut *conn)
        .await?;

    sample.image_count = count;
    sample.metadata = Some(crate::snapshot::recompute(&sample)?);

    sqlx::query("UPDATE \"Sample\" SET \"ImageCount\" = ?, \"Metadata\" = ? WHERE \"SampleID\" = ?")
        .bind(sample.image_count)
        .bind(&sample.metadata)
        .bind(sample_id)
        .execute(&mut *conn)
        .await?;

    Ok(sample)
}

const IMAGE_ENTRY_SELECT: &str = r#"
SELECT i."ImageID", i."SampleID", i."ImageNO", i."ImageCode", i."OriginalFilename",
       i."ImageScheme", s."DatasetID", s."SampleType", s."Metadata", s."ImageCount"
FROM "Image" i
JOIN "Sample" s ON s."SampleID" = i."SampleID"
"#;

// Implement the repository traits for SqliteStore. Every mutating
// transaction starts with a write so SQLite takes the write lock up front
// rather than upgrading a read snapshot.
mod sqlite_impl {
    use super::*;
    use crate::models::*;

    #[async_trait]
    impl SampleRepo for SqliteStore {
        async fn create_sample(&self, new: &NewSample) -> MetadataResult<SampleRow> {
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                "INSERT INTO \"Sample\" (\"SampleID\", \"DatasetID\", \"SampleType\", \"ImageCount\") VALUES (?, ?, ?, 0)",
            )
            .bind(new.sample_id)
            .bind(self.dataset_id.as_str())
            .bind(&new.sample_type)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    return Err(MetadataError::AlreadyExists(format!(
                        "sample {}",
                        new.sample_id
                    )));
                }
                return Err(e.into());
            }

            let sample = sync_sample(&mut *tx, new.sample_id).await?;
            tx.commit().await?;
            Ok(sample)
        }

        async fn get_sample(&self, sample_id: i64) -> MetadataResult<Option<SampleRow>> {
            let row = sqlx::query_as::<_, SampleRow>(
                "SELECT * FROM \"Sample\" WHERE \"SampleID\" = ?",
            )
            .bind(sample_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_samples(&self) -> MetadataResult<Vec<SampleRow>> {
            let rows =
                sqlx::query_as::<_, SampleRow>("SELECT * FROM \"Sample\" ORDER BY \"SampleID\"")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn delete_sample(&self, sample_id: i64) -> MetadataResult<DeletedSample> {
            let mut tx = self.pool.begin().await?;

            // Remove images explicitly first so the caller learns their ids;
            // the cascade on the foreign key would drop them silently.
            let images = sqlx::query_as::<_, ImageRow>(
                "DELETE FROM \"Image\" WHERE \"SampleID\" = ? RETURNING *",
            )
            .bind(sample_id)
            .fetch_all(&mut *tx)
            .await?;

            let sample = sqlx::query_as::<_, SampleRow>(
                "DELETE FROM \"Sample\" WHERE \"SampleID\" = ? RETURNING *",
            )
            .bind(sample_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(sample) = sample else {
                tx.rollback().await?;
                return Err(MetadataError::NotFound(format!("sample {sample_id}")));
            };

            tx.commit().await?;
            Ok(DeletedSample { sample, images })
        }
    }

    #[async_trait]
    impl ImageRepo for SqliteStore {
        async fn get_image(&self, image_id: &str) -> MetadataResult<Option<ImageRow>> {
            let row =
                sqlx::query_as::<_, ImageRow>("SELECT * FROM \"Image\" WHERE \"ImageID\" = ?")
                    .bind(image_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_images(&self, filter: &ImageFilter) -> MetadataResult<Vec<ImageEntry>> {
            let rows = match filter {
                ImageFilter::All => {
                    sqlx::query_as::<_, ImageEntryRow>(&format!(
                        "{IMAGE_ENTRY_SELECT} ORDER BY i.rowid"
                    ))
                    .fetch_all(&self.pool)
                    .await?
                }
                ImageFilter::BySample(sample_id) => {
                    sqlx::query_as::<_, ImageEntryRow>(&format!(
                        "{IMAGE_ENTRY_SELECT} WHERE i.\"SampleID\" = ? ORDER BY i.rowid"
                    ))
                    .bind(sample_id)
                    .fetch_all(&self.pool)
                    .await?
                }
                ImageFilter::ById(image_id) => {
                    sqlx::query_as::<_, ImageEntryRow>(&format!(
                        "{IMAGE_ENTRY_SELECT} WHERE i.\"ImageID\" = ?"
                    ))
                    .bind(image_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows.into_iter().map(ImageEntry::from).collect())
        }

        async fn insert_image(&self, image: &NewImage) -> MetadataResult<ImageEntry> {
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO "Image" (
                    "ImageID", "SampleID", "ImageNO", "ImageCode", "OriginalFilename", "ImageScheme"
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&image.image_id)
            .bind(image.sample_id)
            .bind(image.image_no)
            .bind(&image.image_code)
            .bind(&image.original_filename)
            .bind(&image.image_scheme)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    return Err(MetadataError::AlreadyExists(format!(
                        "image {}",
                        image.image_id
                    )));
                }
                if is_foreign_key_violation(&e) {
                    return Err(MetadataError::NotFound(format!(
                        "sample {}",
                        image.sample_id
                    )));
                }
                return Err(e.into());
            }

            let sample = sync_sample(&mut *tx, image.sample_id).await?;
            tx.commit().await?;

            Ok(ImageEntry {
                image: image.clone(),
                sample,
            })
        }

        async fn update_image(
            &self,
            image_id: &str,
            update: &ImageUpdate,
        ) -> MetadataResult<ImageEntry> {
            if self.get_image(image_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("image {image_id}")));
            }

            let result = sqlx::query(
                r#"
                UPDATE "Image"
                SET "ImageNO" = ?, "ImageCode" = ?, "OriginalFilename" = ?, "ImageScheme" = ?
                WHERE "ImageID" = ?
                "#,
            )
            .bind(update.image_no)
            .bind(&update.image_code)
            .bind(&update.original_filename)
            .bind(&update.image_scheme)
            .bind(image_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::ConcurrencyConflict(format!(
                    "image {image_id} was removed while being updated"
                )));
            }

            self.list_images(&ImageFilter::ById(image_id.to_string()))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    MetadataError::ConcurrencyConflict(format!(
                        "image {image_id} was removed after being updated"
                    ))
                })
        }

        async fn delete_image(&self, image_id: &str) -> MetadataResult<DeletedImage> {
            let mut tx = self.pool.begin().await?;

            let image = sqlx::query_as::<_, ImageRow>(
                "DELETE FROM \"Image\" WHERE \"ImageID\" = ? RETURNING *",
            )
            .bind(image_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(image) = image else {
                tx.rollback().await?;
                return Err(MetadataError::NotFound(format!("image {image_id}")));
            };

            let sample = sync_sample(&mut *tx, image.sample_id).await?;
            tx.commit().await?;

            Ok(DeletedImage { image, sample })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageFilter, ImageRow, ImageUpdate, NewSample};

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        let store = SqliteStore::open(
            DatasetId::parse("d1").unwrap(),
            dir.path().join("ldm.db"),
            &MetadataConfig::default(),
        )
        .await
        .unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn image(image_id: &str, sample_id: i64, image_no: i64) -> ImageRow {
        ImageRow {
            image_id: image_id.to_string(),
            sample_id,
            image_no,
            image_code: None,
            original_filename: None,
            image_scheme: Some("png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(
            DatasetId::parse("d1").unwrap(),
            dir.path().join("ldm.db"),
            &MetadataConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(store.schema_version().await.unwrap(), 0);
        assert!(store.is_stale().await.unwrap());

        let applied = store.migrate().await.unwrap();
        assert_eq!(applied as i64, migrations::TARGET_VERSION);
        assert_eq!(store.migrate().await.unwrap(), 0);
        assert!(!store.is_stale().await.unwrap());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_sample_sets_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let sample = store
            .create_sample(&NewSample {
                sample_id: 1,
                sample_type: "cat".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(sample.dataset_id, "d1");
        assert_eq!(sample.image_count, 0);
        let snapshot = crate::snapshot::decode(sample.metadata.as_deref().unwrap()).unwrap();
        assert_eq!(snapshot.image_count, 0);
        assert_eq!(snapshot.sample_type, "cat");
    }

    #[tokio::test]
    async fn test_duplicate_sample_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let new = NewSample {
            sample_id: 1,
            sample_type: "cat".to_string(),
        };

        store.create_sample(&new).await.unwrap();
        assert!(matches!(
            store.create_sample(&new).await,
            Err(MetadataError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_delete_keep_count_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .create_sample(&NewSample {
                sample_id: 1,
                sample_type: "cat".to_string(),
            })
            .await
            .unwrap();

        let first = store.insert_image(&image("i1", 1, 0)).await.unwrap();
        assert_eq!(first.sample.image_count, 1);
        let second = store.insert_image(&image("i2", 1, 1)).await.unwrap();
        assert_eq!(second.sample.image_count, 2);

        let deleted = store.delete_image("i1").await.unwrap();
        assert_eq!(deleted.image.image_id, "i1");
        assert_eq!(deleted.sample.image_count, 1);

        let stored = store.get_sample(1).await.unwrap().unwrap();
        assert_eq!(stored.image_count, 1);
        let snapshot = crate::snapshot::decode(stored.metadata.as_deref().unwrap()).unwrap();
        assert_eq!(snapshot.image_count, 1);
    }

    #[tokio::test]
    async fn test_insert_image_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(matches!(
            store.insert_image(&image("i1", 42, 0)).await,
            Err(MetadataError::NotFound(_))
        ));

        store
            .create_sample(&NewSample {
                sample_id: 1,
                sample_type: "cat".to_string(),
            })
            .await
            .unwrap();
        store.insert_image(&image("i1", 1, 0)).await.unwrap();
        assert!(matches!(
            store.insert_image(&image("i1", 1, 1)).await,
            Err(MetadataError::AlreadyExists(_))
        ));

        // The failed insert must not have touched the count.
        assert_eq!(store.get_sample(1).await.unwrap().unwrap().image_count, 1);
    }

    #[tokio::test]
    async fn test_list_images_filters_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        for (id, kind) in [(1, "cat"), (2, "dog")] {
            store
                .create_sample(&NewSample {
                    sample_id: id,
                    sample_type: kind.to_string(),
                })
                .await
                .unwrap();
        }
        store.insert_image(&image("z", 1, 0)).await.unwrap();
        store.insert_image(&image("b", 2, 0)).await.unwrap();
        store.insert_image(&image("a", 1, 1)).await.unwrap();

        let all: Vec<_> = store
            .list_images(&ImageFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.image.image_id)
            .collect();
        assert_eq!(all, vec!["z", "b", "a"]);

        let of_one: Vec<_> = store
            .list_images(&ImageFilter::BySample(1))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.image.image_id)
            .collect();
        assert_eq!(of_one, vec!["z", "a"]);

        let by_id = store
            .list_images(&ImageFilter::ById("b".to_string()))
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].sample.sample_type, "dog");
    }

    #[tokio::test]
    async fn test_update_image_keeps_ownership_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .create_sample(&NewSample {
                sample_id: 1,
                sample_type: "cat".to_string(),
            })
            .await
            .unwrap();
        store.insert_image(&image("i1", 1, 0)).await.unwrap();

        let update = ImageUpdate {
            image_no: 9,
            image_code: Some("side".to_string()),
            original_filename: Some("side.png".to_string()),
            image_scheme: Some("png".to_string()),
        };
        let entry = store.update_image("i1", &update).await.unwrap();
        assert_eq!(entry.image.image_no, 9);
        assert_eq!(entry.image.sample_id, 1);
        assert_eq!(entry.sample.image_count, 1);

        assert!(matches!(
            store.update_image("missing", &update).await,
            Err(MetadataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_sample_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .create_sample(&NewSample {
                sample_id: 1,
                sample_type: "cat".to_string(),
            })
            .await
            .unwrap();
        store.insert_image(&image("i1", 1, 0)).await.unwrap();
        store.insert_image(&image("i2", 1, 1)).await.unwrap();

        let deleted = store.delete_sample(1).await.unwrap();
        assert_eq!(deleted.images.len(), 2);
        assert!(store.get_sample(1).await.unwrap().is_none());
        assert!(store.get_image("i1").await.unwrap().is_none());

        assert!(matches!(
            store.delete_sample(1).await,
            Err(MetadataError::NotFound(_))
        ));
    }
}

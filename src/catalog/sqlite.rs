//! sqlx/sqlite-backed [`Catalog`] implementation.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use super::{
    Catalog, DatapointInsert, DatarangeRow, DatasetSummary, DeletionQueueRow, RestoreDatasetPlan,
    SectionRow,
};
use crate::error::{Error, Result};

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Opens (creating if missing) the sqlite database at `database_url` and
    /// runs embedded migrations.
    ///
    /// An in-memory `database_url` (`sqlite::memory:` / `sqlite://:memory:`)
    /// gets a single-connection pool: SQLite's `:memory:` database is private
    /// to the connection that opened it, so a pool of several connections
    /// would hand out empty, unmigrated databases to anyone but the first
    /// caller.
    #[instrument(level = "info", skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let is_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Internal(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 8 })
            .connect_with(options)
            .await?;

        sqlx::migrate!("src/catalog/migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn insert_datarange_tx(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        dataset: &str,
        object_key: &str,
        min: u64,
        max: u64,
        size_bytes: i64,
        datapoints: &[DatapointInsert],
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO dataranges (dataset_name, object_key, min_key, max_key, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(dataset)
        .bind(object_key)
        .bind(min as i64)
        .bind(max as i64)
        .bind(size_bytes)
        .fetch_one(&mut **tx)
        .await?;
        let id: i64 = row.try_get("id")?;

        for dp in datapoints {
            sqlx::query(
                "INSERT INTO datapoints (datarange_id, key, begin_offset, end_offset)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id)
            .bind(dp.key as i64)
            .bind(dp.begin_offset)
            .bind(dp.end_offset)
            .execute(&mut **tx)
            .await?;
        }

        Ok(id)
    }

    async fn enqueue_deletion_tx(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        object_key: &str,
        delete_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO deletion_queue (id, object_key, delete_at) VALUES (?1, ?2, ?3)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(object_key)
        .bind(delete_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    #[instrument(level = "debug", skip(self))]
    async fn create_dataset(&self, name: &str) -> Result<()> {
        let result = sqlx::query("INSERT INTO datasets (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_dataset(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM datasets WHERE name = ?1)")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(Error::NotFound(name.to_string()));
        }

        let object_keys: Vec<String> =
            sqlx::query_scalar("SELECT object_key FROM dataranges WHERE dataset_name = ?1")
                .bind(name)
                .fetch_all(&mut *tx)
                .await?;

        let now = Utc::now();
        for key in &object_keys {
            Self::enqueue_deletion_tx(&mut tx, key, now).await?;
            Self::enqueue_deletion_tx(&mut tx, &format!("{key}.metadata"), now).await?;
        }

        sqlx::query("DELETE FROM datasets WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>> {
        let rows = sqlx::query(
            "SELECT d.name as name,
                    COUNT(r.id) as datarange_count,
                    COALESCE(SUM(r.size_bytes), 0) as total_size_bytes
             FROM datasets d
             LEFT JOIN dataranges r ON r.dataset_name = d.name
             GROUP BY d.name
             ORDER BY d.name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DatasetSummary {
                    name: row.try_get("name")?,
                    datarange_count: row.try_get("datarange_count")?,
                    total_size_bytes: row.try_get("total_size_bytes")?,
                })
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_dataset(&self, name: &str) -> Result<Option<DatasetSummary>> {
        let row = sqlx::query(
            "SELECT d.name as name,
                    COUNT(r.id) as datarange_count,
                    COALESCE(SUM(r.size_bytes), 0) as total_size_bytes
             FROM datasets d
             LEFT JOIN dataranges r ON r.dataset_name = d.name
             WHERE d.name = ?1
             GROUP BY d.name",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(DatasetSummary {
                name: row.try_get("name")?,
                datarange_count: row.try_get("datarange_count")?,
                total_size_bytes: row.try_get("total_size_bytes")?,
            })
        })
        .transpose()
    }

    #[instrument(level = "debug", skip(self))]
    async fn check_overlap(&self, dataset: &str, min: u64, max: u64) -> Result<bool> {
        let overlap: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dataranges
             WHERE dataset_name = ?1 AND min_key <= ?2 AND max_key >= ?3)",
        )
        .bind(dataset)
        .bind(max as i64)
        .bind(min as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(overlap != 0)
    }

    #[instrument(level = "debug", skip(self, datapoints))]
    async fn insert_ingested_datarange(
        &self,
        dataset: &str,
        object_key: &str,
        min: u64,
        max: u64,
        size_bytes: i64,
        datapoints: &[DatapointInsert],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let overlap: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dataranges
             WHERE dataset_name = ?1 AND min_key <= ?2 AND max_key >= ?3)",
        )
        .bind(dataset)
        .bind(max as i64)
        .bind(min as i64)
        .fetch_one(&mut *tx)
        .await?;
        if overlap != 0 {
            return Err(Error::RangeOverlap);
        }

        let id = Self::insert_datarange_tx(&mut tx, dataset, object_key, min, max, size_bytes, datapoints)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_dataranges(&self, dataset: &str) -> Result<Vec<DatarangeRow>> {
        let rows = sqlx::query(
            "SELECT id, object_key, min_key, max_key, size_bytes
             FROM dataranges WHERE dataset_name = ?1 ORDER BY min_key",
        )
        .bind(dataset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let min_key: i64 = row.try_get("min_key")?;
                let max_key: i64 = row.try_get("max_key")?;
                Ok(DatarangeRow {
                    id: row.try_get("id")?,
                    object_key: row.try_get("object_key")?,
                    min_key: min_key as u64,
                    max_key: max_key as u64,
                    size_bytes: row.try_get("size_bytes")?,
                })
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_sections_of_dataranges(
        &self,
        dataset: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<SectionRow>> {
        let rows = sqlx::query(
            "SELECT r.id as id, r.object_key as object_key, r.size_bytes as size_bytes,
                    r.min_key as min_key, r.max_key as max_key,
                    (SELECT dp.begin_offset FROM datapoints dp
                      WHERE dp.datarange_id = r.id AND dp.key >= ?2
                      ORDER BY dp.key ASC LIMIT 1) as first_offset,
                    (SELECT dp.end_offset FROM datapoints dp
                      WHERE dp.datarange_id = r.id AND dp.key <= ?3
                      ORDER BY dp.key DESC LIMIT 1) as last_offset
             FROM dataranges r
             WHERE r.dataset_name = ?1 AND r.max_key >= ?2 AND r.min_key <= ?3
             ORDER BY r.min_key",
        )
        .bind(dataset)
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut sections = Vec::with_capacity(rows.len());
        for row in rows {
            let first_offset: Option<i64> = row.try_get("first_offset")?;
            let last_offset: Option<i64> = row.try_get("last_offset")?;
            let (Some(first_offset), Some(last_offset)) = (first_offset, last_offset) else {
                continue;
            };
            let min_key: i64 = row.try_get("min_key")?;
            let max_key: i64 = row.try_get("max_key")?;
            sections.push(SectionRow {
                id: row.try_get("id")?,
                object_key: row.try_get("object_key")?,
                size_bytes: row.try_get("size_bytes")?,
                min_key: min_key as u64,
                max_key: max_key as u64,
                first_offset,
                last_offset,
            });
        }
        Ok(sections)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_first_and_last_datapoint(&self, dataset: &str) -> Result<Option<(u64, u64)>> {
        let row = sqlx::query(
            "SELECT MIN(dp.key) as lo, MAX(dp.key) as hi
             FROM datapoints dp JOIN dataranges r ON dp.datarange_id = r.id
             WHERE r.dataset_name = ?1",
        )
        .bind(dataset)
        .fetch_one(&self.pool)
        .await?;

        let lo: Option<i64> = row.try_get("lo")?;
        let hi: Option<i64> = row.try_get("hi")?;
        Ok(match (lo, hi) {
            (Some(lo), Some(hi)) => Some((lo as u64, hi as u64)),
            _ => None,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_largest_datapoint_for_datasets(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, Option<u64>>> {
        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            let max: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(dp.key) FROM datapoints dp
                 JOIN dataranges r ON dp.datarange_id = r.id
                 WHERE r.dataset_name = ?1",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            out.insert(name.clone(), max.map(|v| v as u64));
        }
        Ok(out)
    }

    #[instrument(level = "debug", skip(self))]
    async fn enqueue_deletion(&self, object_key: &str, delete_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO deletion_queue (id, object_key, delete_at) VALUES (?1, ?2, ?3)")
            .bind(Uuid::new_v4().to_string())
            .bind(object_key)
            .bind(delete_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn enqueue_deletion_immediate(&self, object_key: &str) -> Result<()> {
        self.enqueue_deletion(object_key, Utc::now()).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_due_deletions(&self, limit: i64) -> Result<Vec<DeletionQueueRow>> {
        let rows = sqlx::query(
            "SELECT id, object_key, delete_at FROM deletion_queue
             WHERE delete_at <= ?1 ORDER BY delete_at LIMIT ?2",
        )
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DeletionQueueRow {
                    id: row.try_get("id")?,
                    object_key: row.try_get("object_key")?,
                    delete_at: row.try_get("delete_at")?,
                })
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_queue_row(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM deletion_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, new_datapoints, deleted_keys))]
    async fn replace_dataranges(
        &self,
        dataset: &str,
        old_ids: &[i64],
        new_object_key: &str,
        new_min: u64,
        new_max: u64,
        new_size_bytes: i64,
        new_datapoints: &[DatapointInsert],
        deleted_keys: &[(String, String)],
        delete_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        if !old_ids.is_empty() {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM dataranges WHERE dataset_name = ");
            qb.push_bind(dataset);
            qb.push(" AND id IN (");
            let mut separated = qb.separated(", ");
            for id in old_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;
        }

        for (object_key, sidecar_key) in deleted_keys {
            Self::enqueue_deletion_tx(&mut tx, object_key, delete_at).await?;
            Self::enqueue_deletion_tx(&mut tx, sidecar_key, delete_at).await?;
        }

        let new_id = Self::insert_datarange_tx(
            &mut tx,
            dataset,
            new_object_key,
            new_min,
            new_max,
            new_size_bytes,
            new_datapoints,
        )
        .await?;

        tx.commit().await?;
        Ok(new_id)
    }

    #[instrument(level = "info", skip(self, plans))]
    async fn restore(&self, plans: Vec<RestoreDatasetPlan>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for plan in plans {
            sqlx::query("INSERT INTO datasets (name) VALUES (?1)")
                .bind(&plan.name)
                .execute(&mut *tx)
                .await?;

            for kept in &plan.kept {
                Self::insert_datarange_tx(
                    &mut tx,
                    &plan.name,
                    &kept.object_key,
                    kept.min_key,
                    kept.max_key,
                    kept.size_bytes,
                    &kept.datapoints,
                )
                .await?;
            }

            for (object_key, sidecar_key) in &plan.discarded_keys {
                Self::enqueue_deletion_tx(&mut tx, object_key, now).await?;
                Self::enqueue_deletion_tx(&mut tx, sidecar_key, now).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn has_any_dataset(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM datasets)")
            .fetch_one(&self.pool)
            .await?;
        Ok(count != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DatapointInsert;

    fn dp(key: u64, begin: i64, end: i64) -> DatapointInsert {
        DatapointInsert { key, begin_offset: begin, end_offset: end }
    }

    #[tokio::test]
    async fn create_and_list_dataset() {
        let cat = SqliteCatalog::in_memory().await.unwrap();
        cat.create_dataset("A").await.unwrap();
        assert!(matches!(
            cat.create_dataset("A").await,
            Err(Error::AlreadyExists(_))
        ));

        let datasets = cat.list_datasets().await.unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].name, "A");
        assert_eq!(datasets[0].datarange_count, 0);
    }

    #[tokio::test]
    async fn insert_rejects_overlap() {
        let cat = SqliteCatalog::in_memory().await.unwrap();
        cat.create_dataset("A").await.unwrap();
        cat.insert_ingested_datarange(
            "A",
            "dataset/A/datapoints/x.tar",
            1,
            3,
            100,
            &[dp(1, 0, 10), dp(2, 10, 20), dp(3, 20, 30)],
        )
        .await
        .unwrap();

        let err = cat
            .insert_ingested_datarange("A", "dataset/A/datapoints/y.tar", 2, 4, 50, &[dp(2, 0, 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangeOverlap));
    }

    #[tokio::test]
    async fn sections_clip_to_requested_window() {
        let cat = SqliteCatalog::in_memory().await.unwrap();
        cat.create_dataset("A").await.unwrap();
        cat.insert_ingested_datarange(
            "A",
            "dataset/A/datapoints/x.tar",
            1,
            5,
            1000,
            &[dp(1, 0, 100), dp(2, 100, 200), dp(3, 200, 300), dp(4, 300, 400), dp(5, 400, 500)],
        )
        .await
        .unwrap();

        let sections = cat.get_sections_of_dataranges("A", 2, 4).await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].first_offset, 100);
        assert_eq!(sections[0].last_offset, 400);
    }

    #[tokio::test]
    async fn delete_dataset_enqueues_objects() {
        let cat = SqliteCatalog::in_memory().await.unwrap();
        cat.create_dataset("A").await.unwrap();
        cat.insert_ingested_datarange("A", "dataset/A/datapoints/x.tar", 1, 1, 10, &[dp(1, 0, 10)])
            .await
            .unwrap();

        cat.delete_dataset("A").await.unwrap();
        assert!(cat.get_dataset("A").await.unwrap().is_none());

        let due = cat.get_due_deletions(100).await.unwrap();
        let keys: Vec<_> = due.iter().map(|r| r.object_key.as_str()).collect();
        assert!(keys.contains(&"dataset/A/datapoints/x.tar"));
        assert!(keys.contains(&"dataset/A/datapoints/x.tar.metadata"));
    }

    #[tokio::test]
    async fn replace_dataranges_swaps_atomically() {
        let cat = SqliteCatalog::in_memory().await.unwrap();
        cat.create_dataset("B").await.unwrap();
        let id1 = cat
            .insert_ingested_datarange("B", "dataset/B/datapoints/a.tar", 1, 2, 10, &[dp(1, 0, 5), dp(2, 5, 10)])
            .await
            .unwrap();
        let id2 = cat
            .insert_ingested_datarange("B", "dataset/B/datapoints/b.tar", 3, 4, 10, &[dp(3, 0, 5), dp(4, 5, 10)])
            .await
            .unwrap();

        let new_id = cat
            .replace_dataranges(
                "B",
                &[id1, id2],
                "dataset/B/datapoints/merged.tar",
                1,
                4,
                20,
                &[dp(1, 0, 5), dp(2, 5, 10), dp(3, 10, 15), dp(4, 15, 20)],
                &[
                    ("dataset/B/datapoints/a.tar".to_string(), "dataset/B/datapoints/a.tar.metadata".to_string()),
                    ("dataset/B/datapoints/b.tar".to_string(), "dataset/B/datapoints/b.tar.metadata".to_string()),
                ],
                Utc::now(),
            )
            .await
            .unwrap();

        let ranges = cat.get_dataranges("B").await.unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].id, new_id);
        assert_eq!(cat.get_due_deletions(100).await.unwrap().len(), 4);
    }
}

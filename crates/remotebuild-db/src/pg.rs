//! PostgreSQL implementation of `JobStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remotebuild_core::{JobState, JobType, UploadType};
use sqlx::PgPool;

use crate::records::*;
use crate::store::JobStore;
use crate::{DbError, DbResult};

/// Job store backed by PostgreSQL.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    created_at: DateTime<Utc>,
    build_job_id: i64,
    upload_job_id: i64,
    data_dir: String,
    args: String,
    last_logs: String,
    result: String,
}

impl From<JobRow> for JobRecord {
    fn from(r: JobRow) -> Self {
        JobRecord {
            id: r.id,
            created_at: r.created_at,
            build_job_id: r.build_job_id,
            upload_job_id: r.upload_job_id,
            data_dir: r.data_dir,
            args: r.args,
            last_logs: r.last_logs,
            result: r.result,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BuildJobRow {
    id: i64,
    created_at: DateTime<Utc>,
    state: i16,
    job_type: String,
    image: String,
    use_ccache: bool,
}

impl TryFrom<BuildJobRow> for BuildJobRecord {
    type Error = DbError;

    fn try_from(r: BuildJobRow) -> DbResult<Self> {
        Ok(BuildJobRecord {
            id: r.id,
            created_at: r.created_at,
            state: JobState::try_from(r.state)
                .map_err(|e| DbError::Corrupt(format!("build job {}: {e}", r.id)))?,
            job_type: r
                .job_type
                .parse::<JobType>()
                .map_err(|e| DbError::Corrupt(format!("build job {}: {e}", r.id)))?,
            image: r.image,
            use_ccache: r.use_ccache,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UploadJobRow {
    id: i64,
    created_at: DateTime<Utc>,
    state: i16,
    upload_type: String,
}

impl TryFrom<UploadJobRow> for UploadJobRecord {
    type Error = DbError;

    fn try_from(r: UploadJobRow) -> DbResult<Self> {
        Ok(UploadJobRecord {
            id: r.id,
            created_at: r.created_at,
            state: JobState::try_from(r.state)
                .map_err(|e| DbError::Corrupt(format!("upload job {}: {e}", r.id)))?,
            upload_type: r
                .upload_type
                .parse::<UploadType>()
                .map_err(|e| DbError::Corrupt(format!("upload job {}: {e}", r.id)))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QueueItemRow {
    id: i64,
    job_id: i64,
    position: i64,
}

impl From<QueueItemRow> for QueueItemRecord {
    fn from(r: QueueItemRow) -> Self {
        QueueItemRecord {
            id: r.id,
            job_id: r.job_id,
            position: r.position,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_build_job(&self, new: NewBuildJob) -> DbResult<BuildJobRecord> {
        let row = sqlx::query_as::<_, BuildJobRow>(
            r#"
            INSERT INTO build_jobs (state, job_type, image, use_ccache)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(JobState::Waiting.as_i16())
        .bind(new.job_type.as_str())
        .bind(&new.image)
        .bind(new.use_ccache)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn create_upload_job(&self, new: NewUploadJob) -> DbResult<UploadJobRecord> {
        let row = sqlx::query_as::<_, UploadJobRow>(
            r#"
            INSERT INTO upload_jobs (state, upload_type)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(JobState::Waiting.as_i16())
        .bind(new.upload_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn create_job(&self, new: NewJob) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (build_job_id, upload_job_id, data_dir, args)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.build_job_id)
        .bind(new.upload_job_id)
        .bind(&new.data_dir)
        .bind(&new.args)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn save_job(&self, job: &JobRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET data_dir = $2, args = $3, last_logs = $4, result = $5
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.data_dir)
        .bind(&job.args)
        .bind(&job.last_logs)
        .bind(&job.result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_build_job(&self, job: &BuildJobRecord) -> DbResult<()> {
        sqlx::query("UPDATE build_jobs SET state = $2, image = $3, use_ccache = $4 WHERE id = $1")
            .bind(job.id)
            .bind(job.state.as_i16())
            .bind(&job.image)
            .bind(job.use_ccache)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_upload_job(&self, job: &UploadJobRecord) -> DbResult<()> {
        sqlx::query("UPDATE upload_jobs SET state = $2 WHERE id = $1")
            .bind(job.id)
            .bind(job.state.as_i16())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn persist_logs(&self, job_id: i64, last_logs: &str) -> DbResult<()> {
        sqlx::query("UPDATE jobs SET last_logs = $2 WHERE id = $1")
            .bind(job_id)
            .bind(last_logs)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn job(&self, job_id: i64) -> DbResult<HydratedJob> {
        let job: JobRecord = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {job_id}")))?
            .into();

        let build = sqlx::query_as::<_, BuildJobRow>("SELECT * FROM build_jobs WHERE id = $1")
            .bind(job.build_job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("build job {}", job.build_job_id)))?
            .try_into()?;

        let upload = sqlx::query_as::<_, UploadJobRow>("SELECT * FROM upload_jobs WHERE id = $1")
            .bind(job.upload_job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("upload job {}", job.upload_job_id)))?
            .try_into()?;

        Ok(HydratedJob { job, build, upload })
    }

    async fn create_queue_item(&self, job_id: i64) -> DbResult<QueueItemRecord> {
        let row = sqlx::query_as::<_, QueueItemRow>(
            "INSERT INTO job_queue (job_id) VALUES ($1) RETURNING *",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn save_queue_item(&self, item: &QueueItemRecord) -> DbResult<()> {
        sqlx::query("UPDATE job_queue SET job_id = $2, position = $3 WHERE id = $1")
            .bind(item.id)
            .bind(item.job_id)
            .bind(item.position)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_queue_item(&self, item_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM job_queue WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_open_queue(&self) -> DbResult<Vec<HydratedQueueItem>> {
        // Aggregate state: the build state until the build is done, then the
        // upload state. Only Waiting (0) and Running (1) items are open.
        let rows = sqlx::query_as::<_, QueueItemRow>(
            r#"
            SELECT q.id, q.job_id, q.position
            FROM job_queue q
            JOIN jobs j ON j.id = q.job_id
            JOIN build_jobs b ON b.id = j.build_job_id
            JOIN upload_jobs u ON u.id = j.upload_job_id
            WHERE (CASE WHEN b.state <> 5 THEN b.state ELSE u.state END) IN (0, 1)
            ORDER BY q.position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let item: QueueItemRecord = row.into();
            let job = self.job(item.job_id).await?;
            items.push(HydratedQueueItem { item, job });
        }
        Ok(items)
    }

    async fn old_jobs(&self, limit: i64) -> DbResult<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT j.*
            FROM jobs j
            JOIN build_jobs b ON b.id = j.build_job_id
            JOIN upload_jobs u ON u.id = j.upload_job_id
            WHERE b.state <> 0 AND b.state <> 3
              AND u.state <> 0 AND u.state <> 3
            ORDER BY j.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn logs_of(&self, job_id: i64) -> DbResult<String> {
        let logs: Option<(String,)> =
            sqlx::query_as("SELECT last_logs FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        logs.map(|(l,)| l)
            .ok_or_else(|| DbError::NotFound(format!("job {job_id}")))
    }
}

/// Integration tests that require PostgreSQL.
/// Run with: DATABASE_URL=... cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_store() -> PgJobStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url).await.expect("connect");
        run_migrations(&pool).await.expect("migrate");
        PgJobStore::new(pool)
    }

    async fn seed_job(store: &PgJobStore) -> HydratedJob {
        let build = store
            .create_build_job(NewBuildJob {
                job_type: JobType::Aur,
                image: "img:v1.0".into(),
                use_ccache: false,
            })
            .await
            .unwrap();
        let upload = store
            .create_upload_job(NewUploadJob {
                upload_type: UploadType::DataManager,
            })
            .await
            .unwrap();
        let job = store
            .create_job(NewJob {
                build_job_id: build.id,
                upload_job_id: upload.id,
                data_dir: "/tmp/remotebuild_test".into(),
                args: "{}".into(),
            })
            .await
            .unwrap();
        HydratedJob { job, build, upload }
    }

    #[tokio::test]
    #[ignore]
    async fn queue_position_equals_assigned_id() {
        let store = test_store().await;
        let seeded = seed_job(&store).await;

        let mut item = store.create_queue_item(seeded.job.id).await.unwrap();
        item.position = item.id;
        store.save_queue_item(&item).await.unwrap();

        let open = store.load_open_queue().await.unwrap();
        let loaded = open.iter().find(|i| i.item.id == item.id).unwrap();
        assert_eq!(loaded.item.position, item.id);
    }

    #[tokio::test]
    #[ignore]
    async fn deleting_queue_item_keeps_job_row() {
        let store = test_store().await;
        let seeded = seed_job(&store).await;
        let item = store.create_queue_item(seeded.job.id).await.unwrap();

        store.delete_queue_item(item.id).await.unwrap();

        let job = store.job(seeded.job.id).await.unwrap();
        assert_eq!(job.job.id, seeded.job.id);
    }

    #[tokio::test]
    #[ignore]
    async fn old_jobs_filter_excludes_waiting_and_cancelled() {
        let store = test_store().await;

        let mut done = seed_job(&store).await;
        done.build.state = JobState::Done;
        done.upload.state = JobState::Failed;
        store.save_build_job(&done.build).await.unwrap();
        store.save_upload_job(&done.upload).await.unwrap();

        let mut cancelled = seed_job(&store).await;
        cancelled.build.state = JobState::Cancelled;
        cancelled.upload.state = JobState::Cancelled;
        store.save_build_job(&cancelled.build).await.unwrap();
        store.save_upload_job(&cancelled.upload).await.unwrap();

        let waiting = seed_job(&store).await;

        let old = store.old_jobs(100).await.unwrap();
        assert!(old.iter().any(|j| j.id == done.job.id));
        assert!(!old.iter().any(|j| j.id == cancelled.job.id));
        assert!(!old.iter().any(|j| j.id == waiting.job.id));
    }

    #[tokio::test]
    #[ignore]
    async fn persist_logs_updates_only_log_column() {
        let store = test_store().await;
        let seeded = seed_job(&store).await;

        store.persist_logs(seeded.job.id, "tail").await.unwrap();

        assert_eq!(store.logs_of(seeded.job.id).await.unwrap(), "tail");
        let job = store.job(seeded.job.id).await.unwrap();
        assert_eq!(job.job.args, "{}");
    }

    #[tokio::test]
    #[ignore]
    async fn logs_of_unknown_job_is_not_found() {
        let store = test_store().await;
        assert!(matches!(
            store.logs_of(i64::MAX).await,
            Err(DbError::NotFound(_))
        ));
    }
}

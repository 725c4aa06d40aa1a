//! The ordered job queue and its single worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remotebuild_core::{JobState, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::job::Job;

/// Poll interval of the worker while the queue is empty.
const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Membership of a job in the queue.
///
/// `position` equals the item's durable id at insertion, giving a stable
/// total order consistent with the store's id generator.
pub struct QueueItem {
    pub id: i64,
    pub position: i64,
    pub job: Arc<Job>,
    running_since: Mutex<Option<DateTime<Utc>>>,
    deleted: AtomicBool,
}

impl QueueItem {
    fn new(id: i64, position: i64, job: Arc<Job>) -> Arc<Self> {
        Arc::new(Self {
            id,
            position,
            job,
            running_since: Mutex::new(None),
            deleted: AtomicBool::new(false),
        })
    }

    pub fn running_since(&self) -> Option<DateTime<Utc>> {
        *self.running_since.lock()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }
}

/// Ordered FIFO of queue items with a single worker loop.
pub struct JobQueue {
    engine: Arc<Engine>,
    items: Mutex<Vec<Arc<QueueItem>>>,
    current: Mutex<Option<Arc<QueueItem>>>,
    stop: CancellationToken,
}

impl JobQueue {
    /// Construct the queue from the durable store.
    ///
    /// Items whose job was persisted as `Running` (the process died mid-job)
    /// are rewritten to `Waiting` so they are re-executed from scratch.
    pub async fn load(engine: Arc<Engine>) -> Result<Self> {
        let open = engine.store().load_open_queue().await?;

        let mut items = Vec::with_capacity(open.len());
        for hydrated in open {
            let job = Job::from_hydrated(&hydrated.job)?;

            if job.build.state() == JobState::Running {
                job.build.set_state(JobState::Waiting);
            }
            if job.build.state() == JobState::Done && job.upload.state() == JobState::Running {
                job.upload.set_state(JobState::Waiting);
            }

            if !matches!(job.state(), JobState::Waiting | JobState::Running) {
                continue;
            }

            items.push(QueueItem::new(
                hydrated.item.id,
                hydrated.item.position,
                Arc::new(job),
            ));
        }

        info!("Loaded {} jobs from old queue", items.len());
        Ok(Self {
            engine,
            items: Mutex::new(items),
            current: Mutex::new(None),
            stop: CancellationToken::new(),
        })
    }

    /// Insert a job at the tail of the queue.
    ///
    /// The queue item is persisted first so its assigned id can be copied
    /// into `position`; only then does it become visible in memory.
    pub async fn add_job(&self, job: Arc<Job>) -> Result<Arc<QueueItem>> {
        let mut record = self.engine.store().create_queue_item(job.id).await?;
        record.position = record.id;
        self.engine.store().save_queue_item(&record).await?;

        let item = QueueItem::new(record.id, record.position, job);
        self.items.lock().push(Arc::clone(&item));

        debug!(item_id = item.id, job_id = item.job.id, "Job added");
        Ok(item)
    }

    /// Head of the queue: the minimum-position, non-deleted item. Blocks
    /// (1 s poll) until one exists or the queue is stopped.
    async fn next_job(&self) -> Option<Arc<QueueItem>> {
        loop {
            if self.stop.is_cancelled() {
                return None;
            }

            {
                let mut items = self.items.lock();
                items.sort_by_key(|item| item.position);
                if let Some(head) = items.iter().find(|item| !item.is_deleted()) {
                    return Some(Arc::clone(head));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_PERIOD) => {}
                _ = self.stop.cancelled() => return None,
            }
        }
    }

    /// The worker loop. Consumes items in position order, one at a time.
    pub async fn run(&self) {
        info!("Starting job queue");

        while let Some(item) = self.next_job().await {
            *self.current.lock() = Some(Arc::clone(&item));
            *item.running_since.lock() = Some(Utc::now());

            self.run_item(&item).await;

            // The item leaves the queue whatever state the job exited in.
            if let Err(e) = self.engine.store().delete_queue_item(item.id).await {
                warn!(item_id = item.id, error = %e, "Failed to delete queue item");
            }
            item.deleted.store(true, Ordering::SeqCst);
            self.remove_item(item.id);

            *self.current.lock() = None;

            if self.stop.is_cancelled() {
                break;
            }
        }

        info!("Job queue stopped");
    }

    /// Run one item inside a panic boundary: a panicking job is logged and
    /// marked failed, and the worker proceeds.
    async fn run_item(&self, item: &Arc<QueueItem>) {
        let job = Arc::clone(&item.job);
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(job.run(engine));

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(job_id = item.job.id, error = %e, "Job exited with error");
            }
            Err(join_err) => {
                error!(job_id = item.job.id, error = %join_err, "Job panicked");
                item.job.mark_failed(&self.engine).await;
            }
        }
    }

    fn remove_item(&self, item_id: i64) {
        let mut items = self.items.lock();
        if let Some(index) = items.iter().position(|item| item.id == item_id) {
            items.swap_remove(index);
        }
    }

    /// Find the queue item of a job.
    pub fn find_job(&self, job_id: i64) -> Option<Arc<QueueItem>> {
        self.items
            .lock()
            .iter()
            .find(|item| item.job.id == job_id)
            .cloned()
    }

    /// Remove a job's item from the in-memory queue.
    pub fn remove_job(&self, job_id: i64) {
        let mut items = self.items.lock();
        if let Some(index) = items.iter().position(|item| item.job.id == job_id) {
            let removed = items.swap_remove(index);

            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|c| c.id == removed.id) {
                *current = None;
            }
        }
    }

    /// Copy of the non-deleted items, sorted by position.
    pub fn jobs(&self) -> Vec<Arc<QueueItem>> {
        let mut items: Vec<_> = self
            .items
            .lock()
            .iter()
            .filter(|item| !item.is_deleted())
            .cloned()
            .collect();
        items.sort_by_key(|item| item.position);
        items
    }

    /// Index of an item in the sorted queue.
    pub fn queue_position(&self, item: &QueueItem) -> Option<usize> {
        self.jobs().iter().position(|other| other.id == item.id)
    }

    pub fn current_job(&self) -> Option<Arc<QueueItem>> {
        self.current.lock().clone()
    }

    /// Stop the worker and cancel the in-flight job, if any.
    pub async fn stop(&self) {
        self.stop.cancel();

        let current = self.current.lock().clone();
        if let Some(item) = current {
            item.job.cancel(&self.engine).await;
        }
    }
}

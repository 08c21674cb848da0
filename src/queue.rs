use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::driver_pool::DriverPool;
use crate::models::request::CrawlRequest;
use crate::session::LaunchProfile;
use crate::store::CrawlStore;
use crate::utils::error::Result;

struct QueueJob {
    request: CrawlRequest,
}

/// Serializes raw page-fetch requests per driver name. One ephemeral
/// worker thread per name; request order per name is submission order.
/// Workers exit after an idle period and are respawned on the next
/// submit, so a quiet queue holds no threads.
pub struct RequestQueue {
    pool: Arc<DriverPool>,
    store: Arc<dyn CrawlStore>,
    profile: LaunchProfile,
    idle_timeout: Duration,
    navigation_timeout: Duration,
    senders: Mutex<HashMap<String, Sender<QueueJob>>>,
}

impl RequestQueue {
    pub fn new(
        pool: Arc<DriverPool>,
        store: Arc<dyn CrawlStore>,
        profile: LaunchProfile,
        idle_timeout: Duration,
        navigation_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            store,
            profile,
            idle_timeout,
            navigation_timeout,
            senders: Mutex::new(HashMap::new()),
        })
    }

    /// Enqueues a fetch and returns the request id. The request is
    /// persisted as QUEUED before this returns, so callers can poll the
    /// store for completion.
    pub fn submit(
        self: &Arc<Self>,
        driver_name: &str,
        url: &str,
        requester: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let mut request = CrawlRequest::new(driver_name, url, requester, metadata);
        request.mark_queued();
        self.store.save_request(&request)?;
        let request_id = request.request_id.clone();

        let job = QueueJob { request };
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());

        let job = match senders.get(driver_name) {
            Some(sender) => match sender.send(job) {
                Ok(()) => {
                    debug!("Queued request {} on '{}'", request_id, driver_name);
                    return Ok(request_id);
                }
                // worker idled out; respawn below and requeue
                Err(mpsc::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::channel();
        self.spawn_worker(driver_name.to_string(), rx);
        tx.send(job).map_err(|_| {
            crate::utils::error::AppError::Internal("queue worker died at startup".into())
        })?;
        senders.insert(driver_name.to_string(), tx);
        info!("Started queue worker for '{}'", driver_name);
        Ok(request_id)
    }

    fn spawn_worker(self: &Arc<Self>, driver_name: String, rx: Receiver<QueueJob>) {
        let queue = Arc::clone(self);
        thread::Builder::new()
            .name(format!("queue-{}", driver_name))
            .spawn(move || queue.worker_loop(&driver_name, rx))
            .ok();
    }

    fn worker_loop(&self, driver_name: &str, rx: Receiver<QueueJob>) {
        loop {
            match rx.recv_timeout(self.idle_timeout) {
                Ok(job) => self.process(driver_name, job),
                Err(RecvTimeoutError::Timeout) => {
                    // Unregister under the lock first so no submit can
                    // route another job here, then drain anything that
                    // landed between the timeout and the removal.
                    self.senders
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(driver_name);
                    for job in rx.try_iter() {
                        self.process(driver_name, job);
                    }
                    info!("Queue worker '{}' idle, exiting", driver_name);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(&self, driver_name: &str, job: QueueJob) {
        let mut request = job.request;
        request.mark_processing();
        if let Err(e) = self.store.save_request(&request) {
            error!("Failed to persist request {}: {}", request.request_id, e);
        }

        let outcome = self.fetch(driver_name, &request.url);
        match outcome {
            Ok(content) => {
                info!("Request {} completed", request.request_id);
                request.mark_completed(content);
            }
            Err(e) => {
                error!("Request {} failed: {}", request.request_id, e);
                request.mark_failed(e.to_string());
            }
        }
        if let Err(e) = self.store.save_request(&request) {
            error!("Failed to persist request {}: {}", request.request_id, e);
        }
    }

    fn fetch(&self, driver_name: &str, url: &str) -> Result<String> {
        let handle = self.pool.acquire(driver_name, &self.profile)?;
        let _guard = handle.usage_lock.lock().unwrap_or_else(|e| e.into_inner());
        handle.session.navigate(url)?;
        handle.session.wait_for_element("body", self.navigation_timeout)?;
        Ok(handle.session.page_source()?)
    }
}

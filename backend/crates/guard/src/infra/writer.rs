//! Background Writer
//!
//! Durable copies of security events and audit entries are written off the
//! request path through a bounded queue. A full queue drops the job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::events::{AuditEntry, SecurityEvent};
use crate::domain::repository::{AuditLogRepository, SecurityEventRepository};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum WriteJob {
    Event(SecurityEvent),
    Audit(AuditEntry),
}

impl WriteJob {
    fn kind(&self) -> &'static str {
        match self {
            WriteJob::Event(_) => "security_event",
            WriteJob::Audit(_) => "audit_entry",
        }
    }
}

/// Handle for enqueueing durable writes
#[derive(Clone)]
pub struct BackgroundWriter {
    tx: mpsc::Sender<WriteJob>,
    dropped: Arc<AtomicU64>,
}

impl BackgroundWriter {
    /// Start the worker task. It stops once every handle is dropped.
    pub fn spawn<R>(repo: Arc<R>, capacity: usize, write_timeout: Duration) -> (Self, JoinHandle<()>)
    where
        R: SecurityEventRepository + AuditLogRepository + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<WriteJob>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let kind = job.kind();
                let result = match &job {
                    WriteJob::Event(event) => {
                        tokio::time::timeout(write_timeout, repo.insert_event(event)).await
                    }
                    WriteJob::Audit(entry) => {
                        tokio::time::timeout(write_timeout, repo.append(entry)).await
                    }
                };

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(job = kind, error = %e, "Background write failed");
                    }
                    Err(_) => {
                        tracing::warn!(job = kind, timeout_ms = write_timeout.as_millis() as u64, "Background write timed out");
                    }
                }
            }
            tracing::debug!("Background writer stopped");
        });

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    pub fn submit(&self, job: WriteJob) {
        if let Err(e) = self.tx.try_send(job) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let (job, reason) = match e {
                mpsc::error::TrySendError::Full(job) => (job, "queue_full"),
                mpsc::error::TrySendError::Closed(job) => (job, "writer_stopped"),
            };
            tracing::warn!(job = job.kind(), reason, dropped_total = total, "Dropped background write");
        }
    }

    pub fn submit_event(&self, event: SecurityEvent) {
        self.submit(WriteJob::Event(event));
    }

    pub fn submit_audit(&self, entry: AuditEntry) {
        self.submit(WriteJob::Audit(entry));
    }

    /// Jobs dropped since start
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

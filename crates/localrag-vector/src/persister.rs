//! Background saving for a shared [`VectorIndex`].
//!
//! Save requests are queued to a single worker task. Requests that pile up
//! while a save is running are coalesced into one save of the latest state,
//! and every waiter receives that save's outcome.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use localrag_core::error::Error;

use crate::index::VectorIndex;
use crate::persist::SaveReport;

pub type SaveOutcome = std::result::Result<SaveReport, Arc<Error>>;

enum Request {
    Save(oneshot::Sender<SaveOutcome>),
    Shutdown,
}

pub struct BackgroundPersister {
    tx: mpsc::UnboundedSender<Request>,
    worker: JoinHandle<()>,
}

/// Completion handle for one save request.
pub struct SaveHandle {
    rx: oneshot::Receiver<SaveOutcome>,
}

impl SaveHandle {
    /// Wait for the save covering this request. Resolves to
    /// [`Error::Cancelled`] if the persister went away first.
    pub async fn wait(self) -> SaveOutcome {
        self.rx.await.unwrap_or_else(|_| Err(Arc::new(Error::Cancelled)))
    }
}

impl BackgroundPersister {
    /// Must be called from within a tokio runtime.
    pub fn spawn(index: Arc<VectorIndex>, base: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(index, base, rx));
        Self { tx, worker }
    }

    pub fn request_save(&self) -> SaveHandle {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Request::Save(done)).is_err() {
            warn!("persister worker is gone; save request dropped");
        }
        SaveHandle { rx }
    }

    /// Finish queued saves, then stop the worker.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Err(e) = self.worker.await {
            if !e.is_cancelled() {
                error!(error = %e, "persister worker panicked");
            }
        }
    }

    /// Stop immediately. A save already on the blocking pool still runs to
    /// completion or failure; pending waiters get [`Error::Cancelled`].
    pub fn cancel(&self) { self.worker.abort(); }
}

async fn run(index: Arc<VectorIndex>, base: PathBuf, mut rx: mpsc::UnboundedReceiver<Request>) {
    while let Some(first) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut stop = false;
        match first {
            Request::Save(done) => waiters.push(done),
            Request::Shutdown => stop = true,
        }
        while let Ok(next) = rx.try_recv() {
            match next {
                Request::Save(done) => waiters.push(done),
                Request::Shutdown => stop = true,
            }
        }

        if !waiters.is_empty() {
            debug!(coalesced = waiters.len(), "running save");
            let index = Arc::clone(&index);
            let base = base.clone();
            let outcome: SaveOutcome = match tokio::task::spawn_blocking(move || index.save(&base)).await {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => {
                    error!(error = %e, "background save failed");
                    Err(Arc::new(e))
                }
                Err(e) => {
                    error!(error = %e, "background save task failed");
                    Err(Arc::new(Error::Cancelled))
                }
            };
            for done in waiters {
                let _ = done.send(outcome.clone());
            }
        }
        if stop {
            break;
        }
    }
}

//! Debounced background refresh, one task per index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ragidx_core::config::WatchSettings;
use ragidx_core::types::{ChangeEvent, RefreshReport};
use ragidx_core::{CancelFlag, Error, FileFilter, Result};

use crate::manager::IndexManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Change(ChangeEvent),
    /// Explicit request; always relevant.
    Refresh,
}

/// What the coordinator has done so far.
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    pub completed: u64,
    pub last: Option<RefreshReport>,
    pub last_error: Option<String>,
}

/// Decides whether a change event concerns the index.
#[derive(Debug, Clone)]
struct Relevance {
    roots: Vec<PathBuf>,
    filter: FileFilter,
}

impl Relevance {
    fn new(root: &Path, filter: FileFilter) -> Self {
        let mut roots = vec![root.to_path_buf()];
        // Watchers report canonical paths on some platforms.
        if let Ok(canonical) = root.canonicalize() {
            if canonical != root {
                roots.push(canonical);
            }
        }
        Self { roots, filter }
    }

    fn accepts(&self, signal: &Signal) -> bool {
        match signal {
            Signal::Refresh => true,
            Signal::Change(event) => self.roots.iter().any(|root| self.filter.matches(root, &event.path)),
        }
    }
}

pub struct RefreshCoordinator;

impl RefreshCoordinator {
    /// Start the coordinator task for `name`. Must be called inside a tokio runtime.
    pub fn spawn(manager: Arc<IndexManager>, name: &str, settings: &WatchSettings) -> Result<CoordinatorHandle> {
        let config = manager.config(name)?;
        let relevance = Relevance::new(&config.root, manager.filter(name)?);
        let (sender, receiver) = mpsc::channel(settings.channel_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(RefreshStatus::default());
        let cancel = CancelFlag::new();
        let shutdown = Arc::new(Notify::new());

        let worker = Worker {
            manager,
            name: name.to_string(),
            relevance,
            debounce: settings.debounce(),
            max_delay: settings.max_delay(),
            cancel: cancel.clone(),
            shutdown: Arc::clone(&shutdown),
            status: status_tx,
        };
        let task = tokio::spawn(worker.run(receiver));
        info!(
            "Coordinator started for index {} (debounce {:?}, max delay {:?})",
            name,
            settings.debounce(),
            settings.max_delay()
        );
        Ok(CoordinatorHandle { name: name.to_string(), sender, cancel, shutdown, status: status_rx, task })
    }
}

struct Worker {
    manager: Arc<IndexManager>,
    name: String,
    relevance: Relevance,
    debounce: Duration,
    max_delay: Duration,
    cancel: CancelFlag,
    shutdown: Arc<Notify>,
    status: watch::Sender<RefreshStatus>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Signal>) {
        loop {
            let signal = tokio::select! {
                biased;
                () = self.shutdown.notified() => break,
                signal = receiver.recv() => signal,
            };
            let Some(signal) = signal else { break };
            if !self.relevance.accepts(&signal) {
                debug!("Ignoring {:?} for index {}", signal, self.name);
                continue;
            }
            if !self.settle(&mut receiver).await || self.cancel.is_cancelled() {
                break;
            }
            if !self.refresh().await {
                break;
            }
        }
        debug!("Coordinator for index {} stopped", self.name);
    }

    /// Swallow signals until the channel has been quiet for `debounce`, or
    /// `max_delay` has passed since the first one.
    /// Returns false when the coordinator should stop instead.
    async fn settle(&self, receiver: &mut mpsc::Receiver<Signal>) -> bool {
        let deadline = Instant::now() + self.max_delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Index {} still changing after {:?}, refreshing anyway", self.name, self.max_delay);
                return true;
            }
            tokio::select! {
                biased;
                () = self.shutdown.notified() => return false,
                next = tokio::time::timeout(self.debounce.min(remaining), receiver.recv()) => match next {
                    Ok(Some(_)) => continue,
                    Ok(None) => return false,
                    Err(_) => return true,
                },
            }
        }
    }

    /// Run one refresh on the blocking pool. Returns false once cancelled.
    async fn refresh(&self) -> bool {
        let manager = Arc::clone(&self.manager);
        let name = self.name.clone();
        let cancel = self.cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || manager.refresh_with_cancel(&name, &cancel)).await;

        let mut keep_running = true;
        let (report, error) = match outcome {
            Ok(Ok(report)) => (Some(report), None),
            Ok(Err(Error::Cancelled)) => {
                info!("Refresh of index {} cancelled", self.name);
                keep_running = false;
                (None, Some(Error::Cancelled.to_string()))
            }
            Ok(Err(Error::NotFound(msg))) if !self.manager.contains(&self.name) => {
                info!("Index {} is gone; stopping its coordinator", self.name);
                keep_running = false;
                (None, Some(msg))
            }
            Ok(Err(err)) => {
                warn!("Background refresh of index {} failed: {}", self.name, err);
                (None, Some(err.to_string()))
            }
            Err(join) => {
                warn!("Background refresh of index {} panicked: {}", self.name, join);
                (None, Some(join.to_string()))
            }
        };
        self.status.send_modify(|status| {
            status.completed += 1;
            if report.is_some() {
                status.last = report;
            }
            status.last_error = error;
        });
        keep_running
    }
}

/// Owner side of a running coordinator.
pub struct CoordinatorHandle {
    name: String,
    sender: mpsc::Sender<Signal>,
    cancel: CancelFlag,
    shutdown: Arc<Notify>,
    status: watch::Receiver<RefreshStatus>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sender for change sources. Full channels drop signals; a refresh is
    /// already pending in that case.
    pub fn sender(&self) -> mpsc::Sender<Signal> {
        self.sender.clone()
    }

    pub fn notify(&self, event: ChangeEvent) -> bool {
        self.sender.try_send(Signal::Change(event)).is_ok()
    }

    pub async fn request_refresh(&self) -> bool {
        self.sender.send(Signal::Refresh).await.is_ok()
    }

    pub fn status(&self) -> watch::Receiver<RefreshStatus> {
        self.status.clone()
    }

    /// Cancel a running refresh at its next batch boundary and wait for the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.shutdown.notify_one();
        if let Err(err) = self.task.await {
            warn!("Coordinator for index {} ended abnormally: {}", self.name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragidx_core::types::ChangeKind;

    #[test]
    fn relevance_filters_on_extension_and_root() {
        let filter = FileFilter::new(&[".txt"], &["tmp/"]).expect("filter");
        let relevance = Relevance::new(Path::new("/data/docs"), filter);
        let change = |p: &str| Signal::Change(ChangeEvent { path: PathBuf::from(p), kind: ChangeKind::Modified });
        assert!(relevance.accepts(&Signal::Refresh));
        assert!(relevance.accepts(&change("/data/docs/a.txt")));
        assert!(!relevance.accepts(&change("/data/docs/a.bin")));
        assert!(!relevance.accepts(&change("/data/docs/tmp/a.txt")));
        assert!(!relevance.accepts(&change("/elsewhere/a.txt")));
    }
}

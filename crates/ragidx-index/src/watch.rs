//! Filesystem notifications feeding a [`RefreshCoordinator`].

use std::sync::Arc;

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ragidx_core::config::WatchSettings;
use ragidx_core::types::{ChangeEvent, ChangeKind};
use ragidx_core::{Error, Result};

use crate::coordinator::{CoordinatorHandle, RefreshCoordinator, Signal};
use crate::manager::IndexManager;

/// Recursive watcher on one index root plus its coordinator.
pub struct IndexWatcher {
    _watcher: RecommendedWatcher,
    coordinator: CoordinatorHandle,
}

impl IndexWatcher {
    /// Must be called inside a tokio runtime.
    pub fn start(manager: Arc<IndexManager>, name: &str, settings: &WatchSettings) -> Result<Self> {
        let root = manager.config(name)?.root;
        if !root.is_dir() {
            return Err(Error::NotFound(format!("index root {}", root.display())));
        }
        let coordinator = RefreshCoordinator::spawn(manager, name, settings)?;
        let sender = coordinator.sender();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward(&sender, &event),
            Err(err) => warn!("Watch error: {}", err),
        })
        .map_err(Error::storage)?;
        watcher.watch(&root, RecursiveMode::Recursive).map_err(Error::storage)?;
        info!("Watching {} for index {}", root.display(), name);
        Ok(Self { _watcher: watcher, coordinator })
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Stop watching and shut the coordinator down.
    pub async fn shutdown(self) {
        let Self { _watcher: watcher, coordinator } = self;
        drop(watcher);
        coordinator.shutdown().await;
    }
}

fn forward(sender: &mpsc::Sender<Signal>, event: &Event) {
    for change in convert_event(event) {
        match sender.try_send(Signal::Change(change)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(signal)) => debug!("Change queue full, dropping {:?}", signal),
            Err(mpsc::error::TrySendError::Closed(_)) => return,
        }
    }
}

pub fn convert_event(event: &Event) -> Vec<ChangeEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Added,
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) | EventKind::Any | EventKind::Other => {
            return Vec::new();
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
    };
    event.paths.iter().map(|path| ChangeEvent { path: path.clone(), kind }).collect()
}

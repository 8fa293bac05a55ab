use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::SyncService;
use crate::connectivity::Reachability;

/// Start a full drain every time `reachability` turns `Online`, including when it
/// already is on start-up.
///
/// Each drain runs in its own task; a drain still in flight does not hold back
/// the next one.
pub fn spawn_auto_sync(
    service: Arc<SyncService>,
    mut reachability: watch::Receiver<Reachability>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Starting from `Offline` makes an already-online link count as a transition.
        let mut previous = Reachability::Offline;

        loop {
            let current = *reachability.borrow_and_update();
            let came_online = current.is_online() && !previous.is_online();
            previous = current;

            if came_online {
                spawn_drain(&service);
            }

            if reachability.changed().await.is_err() {
                break;
            }
        }
    })
}

fn spawn_drain(service: &Arc<SyncService>) {
    info!("back online, draining sync queue");
    let service = service.clone();
    tokio::spawn(async move {
        if let Err(e) = service.drain().await {
            warn!(error = %e, "automatic sync failed");
        }
    });
}

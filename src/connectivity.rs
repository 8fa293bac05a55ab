//! Reachability of the Comprei backend, probed explicitly instead of inferred from failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiError, HttpApi, RemoteApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Online,
    Offline,
}

impl Reachability {
    pub fn is_online(self) -> bool {
        self == Reachability::Online
    }
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> Reachability;
}

/// Probes `GET {base}/health` through the API client. Any HTTP response means the
/// server can be reached.
pub struct HttpProbe {
    api: HttpApi,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            api: HttpApi::new(base_url, None, timeout)?,
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Reachability {
        match self.api.health().await {
            Ok(()) => Reachability::Online,
            Err(e) => {
                debug!(error = %e, "health probe failed");
                Reachability::Offline
            }
        }
    }
}

/// Periodically probes reachability and publishes changes on a watch channel.
pub struct ConnectivityMonitor {
    receiver: watch::Receiver<Reachability>,
    handle: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// The channel starts out `Offline` until the first probe answers.
    pub fn spawn(probe: Arc<dyn ReachabilityProbe>, interval: Duration) -> Self {
        let (sender, receiver) = watch::channel(Reachability::Offline);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let current = probe.probe().await;

                let changed = sender.send_if_modified(|state| {
                    if *state == current {
                        return false;
                    }
                    *state = current;
                    true
                });

                if changed {
                    info!(reachability = ?current, "connectivity changed");
                }

                if sender.is_closed() {
                    break;
                }
            }
        });

        Self { receiver, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.receiver.clone()
    }

    pub fn current(&self) -> Reachability {
        *self.receiver.borrow()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Probe that answers from a script, repeating its last answer once exhausted.
    pub(crate) struct ScriptedProbe {
        answers: Mutex<Vec<Reachability>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn new(answers: Vec<Reachability>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn fixed(reachability: Reachability) -> Self {
            Self::new(vec![reachability])
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReachabilityProbe for ScriptedProbe {
        async fn probe(&self) -> Reachability {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let answers = self.answers.lock().unwrap();
            answers
                .get(index)
                .or(answers.last())
                .copied()
                .unwrap_or(Reachability::Offline)
        }
    }
}

//! Background polling of channel adapter connectivity
//!
//! Runs independently of chat turns. The latest `{adapter: connected}` map
//! is published through a watch channel; a failed poll keeps the previous
//! value.

use crate::client::ApiClient;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Connection state per adapter name
pub type AdapterStatus = HashMap<String, bool>;

/// Anything that can report adapter connectivity
#[async_trait]
pub trait AdapterStatusSource: Send + Sync {
    async fn adapter_status(&self) -> Result<AdapterStatus>;
}

#[async_trait]
impl AdapterStatusSource for ApiClient {
    async fn adapter_status(&self) -> Result<AdapterStatus> {
        ApiClient::adapter_status(self).await
    }
}

/// Handle to a running poller; dropping it stops polling
pub struct AdapterStatusPoller {
    status: watch::Receiver<AdapterStatus>,
    task: JoinHandle<()>,
}

impl AdapterStatusPoller {
    /// Start polling immediately and then every `interval`
    pub fn spawn(source: Arc<dyn AdapterStatusSource>, interval: Duration) -> Self {
        let (tx, status) = watch::channel(AdapterStatus::new());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match source.adapter_status().await {
                    Ok(latest) => {
                        tx.send_if_modified(|current| {
                            if *current == latest {
                                return false;
                            }
                            tracing::debug!(adapters = ?latest, "Adapter status changed");
                            *current = latest;
                            true
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Adapter status poll failed");
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { status, task }
    }

    /// Latest known status
    pub fn current(&self) -> AdapterStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<AdapterStatus> {
        self.status.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AdapterStatusPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

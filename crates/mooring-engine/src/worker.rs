//! Event pump: polls the session and feeds a bounded dispatch queue.

use std::sync::Arc;
use std::time::Duration;

use mooring_core::{EngineEvent, EngineSession};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;

/// Spawn the poller and the dispatcher. Both exit once `shutdown` flips to
/// `true` or its sender is dropped.
pub(crate) fn spawn(
    session: Arc<dyn EngineSession>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    queue_capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let (queue, mut inbox) = mpsc::channel::<EngineEvent>(queue_capacity.max(1));

    let poller = tokio::spawn(async move {
        let mut poll = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = poll.tick() => {
                    match session.poll_events().await {
                        Ok(events) => {
                            for event in events {
                                if queue.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => warn!(error = %err, "engine event polling failed"),
                    }
                }
            }
        }
        debug!("engine event poller stopped");
    });

    let consumer = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            dispatcher.dispatch(event).await;
        }
        debug!("engine event dispatcher stopped");
    });

    vec![poller, consumer]
}

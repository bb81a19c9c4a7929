//! Runtime integration layer.
//!
//! Binds the engine's cooperative drain pass and the transport status feed to
//! a tokio runtime, so spawning stays at the composition-root boundary and
//! the engine itself remains runtime-agnostic. The returned handles can be
//! aborted by the owner on teardown.

use crate::engine::StreamEngine;
use crate::transport::ConnectionStatus;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawns the drain loop: pump all queued entries, then sleep until the next
/// enqueue. The queue's stored wakeup permit means an enqueue racing ahead of
/// the wait is never missed.
pub fn spawn_drain_loop(engine: Arc<StreamEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if engine.pump().await == 0 {
                engine.wait_for_inbound().await;
            }
        }
    })
}

/// Spawns the status loop feeding transport connection events into the
/// reconnect coordinator. Ends when the sender side is dropped.
pub fn spawn_status_loop(
    engine: Arc<StreamEngine>,
    mut events: broadcast::Receiver<ConnectionStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(status) => engine.handle_connection_event(status).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "status feed lagged, continuing from latest");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

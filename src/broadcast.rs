use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Minimum pause between two totals updates
pub const TOTALS_MIN_INTERVAL: Duration = Duration::from_millis(200);
/// Totals are re-sent at least this often even without votes
pub const TOTALS_HEARTBEAT: Duration = Duration::from_secs(5);

/// Spawn a background task that publishes live vote totals to all clients.
///
/// Wakes on the change signal instead of polling every vote, and at most
/// once per `min_interval`.
pub fn spawn_totals_broadcaster(
    state: Arc<AppState>,
    min_interval: Duration,
    heartbeat: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = state.changes.listen();
        let mut seq = 0u64;

        loop {
            let (clip_idx, total, counts) = state.totals().await;
            seq += 1;
            state.broadcast_to_all(ServerMessage::Totals {
                clip_idx,
                total,
                counts,
                seq,
            });

            tokio::time::sleep(min_interval).await;

            tokio::select! {
                alive = changes.wait_and_clear() => {
                    if !alive {
                        break;
                    }
                }
                _ = tokio::time::sleep(heartbeat) => {}
            }
        }
    })
}

/// Spawn a background task that forwards chat connection changes to all clients
pub fn spawn_chat_status_broadcaster(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let mut status = state.chat.as_ref()?.watch_state();

    Some(tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::debug!(?current, "Chat status changed");
            state.broadcast_to_all(ServerMessage::ChatStatus { state: current });
        }
    }))
}

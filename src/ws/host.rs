//! Host-only command handlers
//!
//! All handlers in this module require the Host role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::state::session::Advance;
use crate::state::{AppState, SessionError};
use crate::types::{ClipIndex, Phase};
use std::sync::Arc;

fn error_message(e: &SessionError) -> ServerMessage {
    ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    }
}

fn log_failure(action: &str, e: &SessionError) {
    if let SessionError::StaleClip { expected, current } = e {
        tracing::info!(
            "Ignoring stale {}: expected clip {:?}, current clip {:?}",
            action,
            expected,
            current
        );
    } else {
        tracing::warn!("{} failed: {}", action, e);
    }
}

/// `clip_idx` is the clip the host panel was showing. Commands issued
/// against another clip (double submits, two open host tabs) are rejected.
pub async fn handle_finalize(
    state: &Arc<AppState>,
    clip_idx: Option<ClipIndex>,
    rank: String,
) -> Option<ServerMessage> {
    tracing::info!("Host finalizing clip {:?} with rank {}", clip_idx, rank);
    match state.finalize_clip(clip_idx, &rank).await {
        Ok(view) => Some(ServerMessage::Session { view }),
        Err(e) => {
            log_failure("finalize", &e);
            Some(error_message(&e))
        }
    }
}

/// Start the next clip, or end the session after the last one.
///
/// The chat feed is connected before a clip starts so no votes are missed,
/// and disconnected once the session is over.
pub async fn handle_advance(
    state: &Arc<AppState>,
    clip_idx: Option<ClipIndex>,
) -> Option<ServerMessage> {
    tracing::info!("Host advancing from clip {:?}", clip_idx);

    // Stale commands are rejected below, so they need no chat connection
    let current = state.current_clip_idx().await;
    if current == clip_idx && state.has_next().await {
        if let Some(chat) = &state.chat {
            chat.ensure_connected().await;
        }
    }

    match state.advance_from(clip_idx).await {
        Ok((Advance::Finished, view)) => {
            if let Some(chat) = &state.chat {
                // Another host may have started the next session meanwhile.
                // Holding the read lock keeps it from starting mid-disconnect.
                let session = state.session.read().await;
                if session.phase() == Phase::Idle {
                    chat.disconnect().await;
                }
            }
            Some(ServerMessage::Session { view })
        }
        Ok((Advance::Started(_), view)) => {
            // A session that just ended elsewhere may have closed the feed
            if let Some(chat) = &state.chat {
                chat.ensure_connected().await;
            }
            Some(ServerMessage::Session { view })
        }
        Err(e) => {
            log_failure("advance", &e);
            Some(error_message(&e))
        }
    }
}

pub async fn handle_reload_catalog(state: &Arc<AppState>, config: String) -> Option<ServerMessage> {
    tracing::info!("Host uploading new catalog ({} bytes)", config.len());
    match state.reload_catalog(&config).await {
        Ok(clips) => Some(ServerMessage::CatalogReloaded { clips }),
        Err(e) => {
            tracing::warn!("Catalog reload failed: {}", e);
            Some(error_message(&e))
        }
    }
}

pub async fn handle_reconnect_chat(state: &Arc<AppState>) -> Option<ServerMessage> {
    let Some(chat) = &state.chat else {
        return Some(ServerMessage::Error {
            code: "CHAT_DISABLED".to_string(),
            msg: "Chat feed is not configured".to_string(),
        });
    };

    tracing::info!("Host requested chat reconnect");
    chat.reconnect().await;
    Some(ServerMessage::ChatStatus {
        state: chat.connection_state(),
    })
}

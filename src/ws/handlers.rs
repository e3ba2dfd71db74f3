//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Authorization is checked here, then dispatched to the host handlers.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::host;

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($role:expr, $action:expr) => {
        if *$role != Role::Host {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only host can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::RequestView => Some(ServerMessage::Session {
            view: state.view().await,
        }),

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostFinalize { clip_idx, rank } => {
            check_host!(role, "finalize clips");
            host::handle_finalize(state, clip_idx, rank).await
        }

        ClientMessage::HostAdvance { clip_idx } => {
            check_host!(role, "advance clips");
            host::handle_advance(state, clip_idx).await
        }

        ClientMessage::HostReloadCatalog { config } => {
            check_host!(role, "replace the catalog");
            host::handle_reload_catalog(state, config).await
        }

        ClientMessage::HostReconnectChat => {
            check_host!(role, "reconnect chat");
            host::handle_reconnect_chat(state).await
        }
    }
}

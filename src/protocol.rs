use crate::state::view::SessionView;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a fresh session snapshot
    RequestView,
    // Host-only messages. `clip_idx` is the clip the host panel was showing
    // when the command was issued; stale commands are rejected.
    HostFinalize {
        clip_idx: Option<ClipIndex>,
        rank: String,
    },
    HostAdvance {
        clip_idx: Option<ClipIndex>,
    },
    HostReloadCatalog {
        config: String,
    },
    HostReconnectChat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        view: SessionView,
        chat: Option<ConnectionState>,
        server_now: String,
    },
    Session {
        view: SessionView,
    },
    /// Live vote totals for the clip in play
    Totals {
        clip_idx: Option<ClipIndex>,
        total: usize,
        counts: Vec<u32>,
        seq: u64,
    },
    ChatStatus {
        state: ConnectionState,
    },
    CatalogReloaded {
        clips: usize,
    },
    Error {
        code: String,
        msg: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"host_finalize","clip_idx":2,"rank":"gold"}"#).unwrap();
        match msg {
            ClientMessage::HostFinalize { clip_idx, rank } => {
                assert_eq!(clip_idx, Some(2));
                assert_eq!(rank, "gold");
            }
            other => panic!("Expected HostFinalize, got {:?}", other),
        }

        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"host_advance","clip_idx":null}"#).unwrap();
        assert!(matches!(msg, ClientMessage::HostAdvance { clip_idx: None }));
    }

    #[test]
    fn test_server_message_wire_format() {
        let json = serde_json::to_value(ServerMessage::Totals {
            clip_idx: Some(0),
            total: 3,
            counts: vec![2, 1],
            seq: 7,
        })
        .unwrap();
        assert_eq!(json["t"], "totals");
        assert_eq!(json["total"], 3);

        let json = serde_json::to_value(ServerMessage::ChatStatus {
            state: ConnectionState::Connecting,
        })
        .unwrap();
        assert_eq!(json["state"], "connecting");
    }
}

use serde::{Deserialize, Serialize};

/// Opaque ID types
pub type SessionId = String;
pub type ViewerId = String;

/// Position of a clip in the catalog
pub type ClipIndex = usize;
/// Position of a rank option within its clip
pub type RankIndex = usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No active clip
    Idle,
    /// Accepting viewer votes for the current clip
    Voting,
    /// Host has finalized the current clip, waiting for advance
    Results,
}

/// State of the chat feed connection, owned by the chat supervisor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    /// Read-only display (stream overlay, results screen)
    Overlay,
}

/// Chat command marker that prefixes every vote
pub const COMMAND_MARKER: char = '!';

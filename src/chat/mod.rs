//! Live chat feed: keeps a connection to the chat network open and turns
//! `!rank` chat commands into viewer votes.

mod backoff;
pub mod frame;
mod supervisor;
mod transport;

use std::fmt;
use std::time::Duration;

pub use backoff::Backoff;
pub use supervisor::ChatSupervisor;
pub use transport::{Connector, Transport, WsConnector, WsTransport};

/// Errors from the chat connection. None of these leave the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Failed to connect: {0}")]
    ConnectFailure(String),

    #[error("Connection lost: {0}")]
    UnexpectedDisconnect(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Chat network configuration
#[derive(Clone)]
pub struct ChatConfig {
    pub url: String,
    pub token: String,
    pub username: String,
    /// Channel to join, without the leading `#`
    pub channel: String,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Pause after a failed connection before reconnecting
    pub restart_cooldown: Duration,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .field("channel", &self.channel)
            .field("backoff_initial", &self.backoff_initial)
            .field("backoff_max", &self.backoff_max)
            .field("restart_cooldown", &self.restart_cooldown)
            .finish()
    }
}

impl ChatConfig {
    pub const DEFAULT_URL: &'static str = "wss://irc-ws.chat.twitch.tv:443";

    pub fn new(
        token: impl Into<String>,
        username: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let token = token.into();
        let channel = channel.into();
        Self {
            url: Self::DEFAULT_URL.to_string(),
            token: token.strip_prefix("oauth:").unwrap_or(&token).to_string(),
            username: username.into().to_lowercase(),
            channel: channel.trim_start_matches('#').to_lowercase(),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
            restart_cooldown: Duration::from_secs(2),
        }
    }

    /// Load chat config from environment variables.
    ///
    /// TTV_TOKEN, TTV_USERNAME and TTV_CHANNEL must all be set, otherwise the
    /// chat feed is disabled.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let (Some(token), Some(username), Some(channel)) =
            (var("TTV_TOKEN"), var("TTV_USERNAME"), var("TTV_CHANNEL"))
        else {
            tracing::warn!(
                "TTV_TOKEN, TTV_USERNAME and TTV_CHANNEL must all be set - chat voting DISABLED"
            );
            return None;
        };

        let millis = |name: &str, default: Duration| {
            var(name)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let mut config = Self::new(token, username, channel);
        if let Some(url) = var("CHAT_URL") {
            config.url = url;
        }
        config.backoff_initial = millis("CHAT_BACKOFF_INITIAL_MS", config.backoff_initial);
        config.backoff_max = millis("CHAT_BACKOFF_MAX_MS", config.backoff_max);
        config.restart_cooldown = millis("CHAT_RESTART_COOLDOWN_MS", config.restart_cooldown);

        tracing::info!(
            url = %config.url,
            channel = %config.channel,
            "Chat config loaded"
        );
        Some(config)
    }

    /// Lines sent once after every connect
    pub fn handshake(&self) -> [String; 4] {
        [
            "CAP REQ :twitch.tv/membership".to_string(),
            format!("PASS oauth:{}", self.token),
            format!("NICK {}", self.username),
            format!("JOIN #{}", self.channel),
        ]
    }

    /// Whether a message target (`#channel`) is the joined channel
    pub fn is_own_channel(&self, target: &str) -> bool {
        target
            .strip_prefix('#')
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.channel))
    }
}

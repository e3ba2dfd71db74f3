use super::backoff::Backoff;
use super::frame::{self, Frame};
use super::transport::{Connector, Transport};
use super::{ChatConfig, ChatError};
use crate::state::AppState;
use crate::types::ConnectionState;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Keeps the chat feed connected and forwards votes into the session.
///
/// Every connect and disconnect runs under one lock, whether it comes from
/// the monitor loop or from a host action, so two sockets are never opened
/// at once and nobody closes a socket another caller just opened.
pub struct ChatSupervisor {
    config: ChatConfig,
    connector: Arc<dyn Connector>,
    link: Mutex<LinkState>,
    current: watch::Sender<Option<Arc<Connection>>>,
    status: watch::Sender<ConnectionState>,
}

struct LinkState {
    next_id: u64,
}

struct Connection {
    id: u64,
    transport: Box<dyn Transport>,
    /// Set when the connection is closed locally
    closing: watch::Sender<bool>,
}

impl ChatSupervisor {
    pub fn new(config: ChatConfig, connector: Arc<dyn Connector>) -> Self {
        let (current, _) = watch::channel(None);
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            link: Mutex::new(LinkState { next_id: 0 }),
            current,
            status,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.current.borrow().is_some()
    }

    fn current_id(&self) -> Option<u64> {
        self.current.borrow().as_ref().map(|conn| conn.id)
    }

    /// Connect unless a connection is already open
    pub async fn ensure_connected(&self) {
        let mut link = self.link.lock().await;
        if !self.is_connected() {
            self.connect_locked(&mut link).await;
        }
    }

    /// Drop the current connection (if any) and open a new one
    pub async fn reconnect(&self) {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await;
    }

    /// Close the current connection. No-op when already disconnected.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.disconnect_locked(&mut link).await;
    }

    async fn disconnect_locked(&self, _link: &mut LinkState) {
        let Some(conn) = self.current.send_replace(None) else {
            return;
        };

        conn.closing.send_replace(true);
        if let Err(e) = conn.transport.close().await {
            tracing::debug!(connection = conn.id, "Error while closing chat connection: {}", e);
        }
        self.status.send_replace(ConnectionState::Disconnected);
        tracing::info!(connection = conn.id, "Chat disconnected");
    }

    /// Retries until a transport opens. Connect attempts are never timed out.
    async fn connect_locked(&self, link: &mut LinkState) {
        self.disconnect_locked(link).await;
        self.status.send_replace(ConnectionState::Connecting);

        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        let transport = loop {
            match self.connector.connect(&self.config.url).await {
                Ok(transport) => break transport,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Chat connect failed: {}. Retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        };

        link.next_id += 1;
        let (closing, _) = watch::channel(false);
        let conn = Arc::new(Connection {
            id: link.next_id,
            transport,
            closing,
        });
        self.current.send_replace(Some(conn));
        self.status.send_replace(ConnectionState::Connected);
        tracing::info!(connection = link.next_id, "Chat connected");
    }

    /// Spawn the monitor loop for the lifetime of the process
    pub fn spawn(self: &Arc<Self>, state: Arc<AppState>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(state))
    }

    /// Monitor loop.
    ///
    /// Waits until some caller has connected, reads the feed until the
    /// connection ends, then reconnects. A connection closed locally through
    /// `disconnect` is not reopened; the loop waits for the next connect.
    ///
    /// Remote closes and read errors share one backoff across cycles. It is
    /// reset only by a connection that got as far as joining the channel, so
    /// a server that accepts and drops the socket right away is retried at
    /// a growing delay.
    pub async fn run(self: Arc<Self>, state: Arc<AppState>) {
        let mut current = self.current.subscribe();
        let mut served: Option<u64> = None;
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);

        loop {
            {
                let mut link = self.link.lock().await;
                // The connection we were reading ended but is still installed
                if served.is_some() && self.current_id() == served {
                    self.connect_locked(&mut link).await;
                }
            }

            let conn = match current.wait_for(Option::is_some).await {
                Ok(conn) => (*conn).clone(),
                Err(_) => return,
            };
            let Some(conn) = conn else {
                continue;
            };

            served = Some(conn.id);
            tracing::info!(connection = conn.id, "Started monitoring chat");

            match self.serve(&conn, &state).await {
                Ended::Local => tracing::info!(connection = conn.id, "Stopped monitoring chat"),
                Ended::Remote { joined, error } => {
                    if joined {
                        backoff.reset();
                    }
                    let mut delay = backoff.next_delay();
                    match error {
                        Some(e) => {
                            tracing::warn!(connection = conn.id, "Chat connection failed: {}", e);
                            delay = delay.max(self.config.restart_cooldown);
                        }
                        None => tracing::info!(connection = conn.id, "Chat closed by remote"),
                    }
                    tracing::debug!(connection = conn.id, "Reconnecting chat in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Read one connection until it closes
    async fn serve(&self, conn: &Connection, state: &AppState) -> Ended {
        let mut closing = conn.closing.subscribe();
        let mut joined = false;
        if *closing.borrow() {
            return Ended::Local;
        }

        for line in self.config.handshake() {
            if let Err(e) = conn.transport.send(&line).await {
                return Ended::Remote {
                    joined,
                    error: Some(e),
                };
            }
        }

        loop {
            let frame = tokio::select! {
                frame = conn.transport.recv() => frame,
                _ = closing.wait_for(|closing| *closing) => return Ended::Local,
            };

            let text = match frame {
                None => return Ended::Remote { joined, error: None },
                Some(Err(e)) => {
                    return Ended::Remote {
                        joined,
                        error: Some(e),
                    }
                }
                Some(Ok(text)) => text,
            };

            for line in text.lines() {
                match self.dispatch_line(conn, state, line).await {
                    Ok(in_channel) => joined |= in_channel,
                    Err(e) => {
                        return Ended::Remote {
                            joined,
                            error: Some(e),
                        }
                    }
                }
            }
        }
    }

    /// Handle one chat line. Only a failed reply ends the connection.
    ///
    /// Returns whether the line came from inside the joined channel.
    async fn dispatch_line(
        &self,
        conn: &Connection,
        state: &AppState,
        line: &str,
    ) -> Result<bool, ChatError> {
        match frame::parse_line(line) {
            Ok(Frame::Ping { nonce }) => {
                conn.transport.send(&format!("PONG {}", nonce)).await?;
            }
            Ok(Frame::ChannelMessage {
                sender,
                channel,
                payload,
            }) => {
                if !self.config.is_own_channel(channel) {
                    return Ok(false);
                }
                if let Some(command) = frame::vote_command(payload) {
                    let viewer = sender.to_lowercase();
                    state.cast_viewer_vote(&viewer, &command).await;
                }
                return Ok(true);
            }
            Ok(Frame::Membership) => return Ok(true),
            Ok(Frame::Other) => tracing::debug!("[chat] {}", line.trim()),
            Err(e) => tracing::warn!("Dropping chat line: {}", e),
        }
        Ok(false)
    }
}

/// How a served connection ended
enum Ended {
    /// Closed through `disconnect` or replaced by `reconnect`
    Local,
    /// Closed by the remote end, or failed with `error`
    Remote {
        joined: bool,
        error: Option<ChatError>,
    },
}

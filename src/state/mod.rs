pub mod session;
pub mod tally;
pub mod view;

use crate::catalog::{Catalog, CatalogStore, LoadError, RankOption};
use crate::chat::ChatSupervisor;
use crate::protocol::ServerMessage;
use crate::signal::ChangeSignal;
use crate::types::*;
use session::{Advance, Session};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockWriteGuard};
use view::SessionView;

/// Errors returned to the host from session actions
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A session is in progress, finish it first")]
    SessionBusy,

    #[error("Cannot {action} during {phase:?}")]
    InvalidPhase { action: &'static str, phase: Phase },

    #[error("The current clip has already been finalized")]
    AlreadyFinalized,

    #[error("Unknown rank: {0}")]
    UnknownRank(String),

    #[error("Command was for clip {expected:?} but the current clip is {current:?}")]
    StaleClip {
        expected: Option<ClipIndex>,
        current: Option<ClipIndex>,
    },

    #[error("Catalog error: {0}")]
    Load(#[from] LoadError),
}

impl SessionError {
    /// Protocol error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::SessionBusy => "SESSION_BUSY",
            SessionError::InvalidPhase { .. } => "INVALID_PHASE",
            SessionError::AlreadyFinalized => "ALREADY_FINALIZED",
            SessionError::UnknownRank(_) => "UNKNOWN_RANK",
            SessionError::StaleClip { .. } => "STALE_CLIP",
            SessionError::Load(_) => "LOAD_FAILED",
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub catalog_store: CatalogStore,
    /// Fired whenever the tally of the clip in play changes
    pub changes: ChangeSignal,
    /// Broadcast channel for sending messages to all connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    pub chat: Option<Arc<ChatSupervisor>>,
}

impl AppState {
    pub fn new(catalog: Catalog, catalog_store: CatalogStore) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self {
            session: Arc::new(RwLock::new(Session::new(Arc::new(catalog)))),
            catalog_store,
            changes: ChangeSignal::new(),
            broadcast: tx,
            chat: None,
        }
    }

    /// State backed by an in-memory catalog blob
    pub fn from_config(blob: &str) -> Result<Self, LoadError> {
        let catalog = Catalog::parse(blob)?;
        Ok(Self::new(catalog, CatalogStore::memory(blob)))
    }

    /// Load the catalog from its store.
    ///
    /// A catalog that fails to load leaves the session idle with no clips;
    /// the host can upload a fixed one.
    pub async fn load(catalog_store: CatalogStore) -> Self {
        let catalog = match catalog_store.load().await {
            Ok(catalog) => {
                tracing::info!(clips = catalog.len(), "Catalog loaded");
                catalog
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load catalog: {}. No session can start until a valid catalog is uploaded.",
                    e
                );
                Catalog::default()
            }
        };
        Self::new(catalog, catalog_store)
    }

    pub fn with_chat(mut self, chat: Arc<ChatSupervisor>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub async fn view(&self) -> SessionView {
        self.session.read().await.view()
    }

    pub async fn phase(&self) -> Phase {
        self.session.read().await.phase()
    }

    pub async fn current_clip_idx(&self) -> Option<ClipIndex> {
        self.session.read().await.clip_idx()
    }

    pub async fn has_next(&self) -> bool {
        self.session.read().await.has_next()
    }

    pub async fn total(&self) -> usize {
        self.session.read().await.total()
    }

    /// Current clip, distinct voter count and per-rank counts
    pub async fn totals(&self) -> (Option<ClipIndex>, usize, Vec<u32>) {
        let session = self.session.read().await;
        let counts = session.tally().map(|t| t.counts()).unwrap_or_default();
        (session.clip_idx(), session.total(), counts)
    }

    /// Look up a rank of the clip in play by label or alias
    pub async fn find_rank(&self, label: &str) -> Option<RankOption> {
        let session = self.session.read().await;
        let clip = session.current_clip()?;
        clip.find_rank(label)
            .and_then(|idx| clip.rank(idx))
            .cloned()
    }

    /// Record a viewer vote from the chat feed, waking observers on change
    pub async fn cast_viewer_vote(&self, viewer_id: &str, raw_text: &str) -> bool {
        let changed = self
            .session
            .write()
            .await
            .cast_viewer_vote(viewer_id, raw_text);

        if changed {
            tracing::debug!(viewer = viewer_id, vote = raw_text, "Vote recorded");
            self.changes.notify();
        }
        changed
    }

    /// Finalize the clip in play with the host's choice
    pub async fn finalize(&self, host_choice: &str) -> Result<SessionView, SessionError> {
        let session = self.session.write().await;
        self.finalize_locked(session, host_choice)
    }

    /// Finalize, provided the clip in play is still `expected`.
    ///
    /// The check and the transition happen under one write lock.
    pub async fn finalize_clip(
        &self,
        expected: Option<ClipIndex>,
        host_choice: &str,
    ) -> Result<SessionView, SessionError> {
        let session = self.session.write().await;
        session.expect_clip(expected)?;
        self.finalize_locked(session, host_choice)
    }

    fn finalize_locked(
        &self,
        mut session: RwLockWriteGuard<'_, Session>,
        host_choice: &str,
    ) -> Result<SessionView, SessionError> {
        let rank = session.finalize(host_choice)?;
        let view = session.view();
        drop(session);

        tracing::info!(clip_idx = ?view.clip_idx, rank, "Clip finalized");
        self.changes.notify();
        self.broadcast_to_all(ServerMessage::Session { view: view.clone() });
        Ok(view)
    }

    /// Advance to the next clip. After the last clip the session resets and
    /// the catalog is reloaded from its store.
    pub async fn advance(&self) -> Result<(Advance, SessionView), SessionError> {
        let session = self.session.write().await;
        self.advance_locked(session).await
    }

    /// Advance, provided the clip in play is still `expected`.
    ///
    /// Two hosts pressing "next" on the same clip move the session once.
    pub async fn advance_from(
        &self,
        expected: Option<ClipIndex>,
    ) -> Result<(Advance, SessionView), SessionError> {
        let session = self.session.write().await;
        session.expect_clip(expected)?;
        self.advance_locked(session).await
    }

    async fn advance_locked(
        &self,
        mut session: RwLockWriteGuard<'_, Session>,
    ) -> Result<(Advance, SessionView), SessionError> {
        let outcome = session.advance()?;

        if outcome == Advance::Finished {
            match self.catalog_store.load().await {
                Ok(catalog) => session.reload_catalog(catalog)?,
                Err(e) => tracing::warn!("Keeping previous catalog, reload failed: {}", e),
            }
        }

        let view = session.view();
        drop(session);

        tracing::info!(?outcome, "Session advanced");
        self.changes.notify();
        self.broadcast_to_all(ServerMessage::Session { view: view.clone() });
        Ok((outcome, view))
    }

    /// Replace the catalog with a new text blob. Only allowed while idle.
    ///
    /// The blob is validated before anything is touched, then persisted,
    /// then swapped in.
    pub async fn reload_catalog(&self, blob: &str) -> Result<usize, SessionError> {
        let catalog = Catalog::parse(blob)?;
        let clips = catalog.len();

        let mut session = self.session.write().await;
        if session.phase() != Phase::Idle {
            return Err(SessionError::SessionBusy);
        }
        self.catalog_store.save(blob).await?;
        session.reload_catalog(catalog)?;
        let view = session.view();
        drop(session);

        tracing::info!(clips, "Catalog replaced");
        self.broadcast_to_all(ServerMessage::CatalogReloaded { clips });
        self.broadcast_to_all(ServerMessage::Session { view });
        Ok(clips)
    }

    /// Broadcast a message to all connected clients
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.broadcast.send(msg);
    }
}

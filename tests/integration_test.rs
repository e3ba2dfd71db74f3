use async_trait::async_trait;
use clipvote::catalog::CatalogStore;
use clipvote::chat::{ChatConfig, ChatError, ChatSupervisor, Connector, Transport};
use clipvote::protocol::{ClientMessage, ServerMessage};
use clipvote::state::view::SessionView;
use clipvote::state::AppState;
use clipvote::types::{ClipIndex, ConnectionState, Phase, Role};
use clipvote::ws::handlers::handle_message;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const ONE_CLIP: &str = "https://clips.example/a\n  gold\n  silver\n";
const TWO_CLIPS: &str = "\
# ranked clips for tonight
https://clips.example/first
    Gold | g, gold nova
    Silver Elite | se
https://clips.example/second
    Gold
    Bronze
";

async fn host(state: &Arc<AppState>, msg: ClientMessage) -> Option<ServerMessage> {
    handle_message(msg, &Role::Host, state).await
}

fn expect_view(result: Option<ServerMessage>) -> SessionView {
    match result {
        Some(ServerMessage::Session { view }) => view,
        other => panic!("Expected Session message, got {:?}", other),
    }
}

fn expect_error(result: Option<ServerMessage>, expected: &str) {
    match result {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, expected),
        other => panic!("Expected {} error, got {:?}", expected, other),
    }
}

async fn advance(state: &Arc<AppState>, from: Option<ClipIndex>) -> SessionView {
    expect_view(host(state, ClientMessage::HostAdvance { clip_idx: from }).await)
}

async fn finalize(state: &Arc<AppState>, clip_idx: ClipIndex, rank: &str) -> Option<ServerMessage> {
    host(
        state,
        ClientMessage::HostFinalize {
            clip_idx: Some(clip_idx),
            rank: rank.to_string(),
        },
    )
    .await
}

/// Single clip, votes changing, host finalizing, session wrapping back to idle
#[tokio::test]
async fn test_single_clip_session() {
    let state = Arc::new(AppState::from_config(ONE_CLIP).unwrap());

    let view = advance(&state, None).await;
    assert_eq!(view.phase, Phase::Voting);
    assert_eq!(view.clip_idx, Some(0));
    assert_eq!(view.total, 0);

    assert!(state.cast_viewer_vote("u1", "!gold").await);
    assert_eq!(state.total().await, 1);
    // Changed mind: still one voter
    assert!(state.cast_viewer_vote("u1", "!silver").await);
    assert_eq!(state.total().await, 1);
    assert!(state.cast_viewer_vote("u2", "!gold").await);
    assert_eq!(state.total().await, 2);

    let view = expect_view(finalize(&state, 0, "gold").await);
    assert_eq!(view.phase, Phase::Results);
    assert_eq!(view.host_choice, Some("gold".to_string()));
    let clip = view.clip.expect("clip in results");
    assert_eq!(clip.ranks[0].votes, 1);
    assert_eq!(clip.ranks[1].votes, 1);
    assert!(clip.ranks[0].is_host_choice);

    // Frozen
    assert!(!state.cast_viewer_vote("u3", "!gold").await);
    assert_eq!(state.total().await, 2);

    let view = advance(&state, Some(0)).await;
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.clip_idx, None);
    assert_eq!(view.total, 0);
    assert!(view.clip.is_none());
}

/// Two clips from a catalog file that is edited while the session runs
#[tokio::test]
async fn test_multi_clip_session_reloads_file_at_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clips.txt");
    std::fs::write(&path, TWO_CLIPS).unwrap();

    let state = Arc::new(AppState::load(CatalogStore::file(&path)).await);
    let first_session = state.view().await.session_id;

    let view = advance(&state, None).await;
    assert_eq!(view.clip_count, 2);
    assert_eq!(view.remaining, 1);
    assert!(view.has_next);

    // Aliases and whitespace variants all land on the same rank
    state.cast_viewer_vote("a", "!se").await;
    state.cast_viewer_vote("b", "!silver elite").await;
    state.cast_viewer_vote("c", "!SilverElite").await;
    state.cast_viewer_vote("d", "!gold_nova").await;
    state.cast_viewer_vote("e", "!pog").await;
    assert_eq!(state.totals().await.2, vec![1, 3]);

    expect_view(finalize(&state, 0, "silver elite").await);

    std::fs::write(&path, ONE_CLIP).unwrap();

    let view = advance(&state, Some(0)).await;
    assert_eq!(view.phase, Phase::Voting);
    assert_eq!(view.clip_idx, Some(1));
    assert!(!view.has_next);
    // Votes do not carry over
    assert_eq!(view.total, 0);

    expect_view(finalize(&state, 1, "bronze").await);
    let view = advance(&state, Some(1)).await;
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(view.clip_count, 1);
    assert_ne!(view.session_id, first_session);
}

#[tokio::test]
async fn test_host_command_guards() {
    let state = Arc::new(AppState::from_config(TWO_CLIPS).unwrap());

    // Nothing to finalize yet
    expect_error(
        host(
            &state,
            ClientMessage::HostFinalize {
                clip_idx: None,
                rank: "gold".to_string(),
            },
        )
        .await,
        "INVALID_PHASE",
    );

    advance(&state, None).await;

    // Double click on "start" from a host panel that still shows idle
    expect_error(
        host(&state, ClientMessage::HostAdvance { clip_idx: None }).await,
        "STALE_CLIP",
    );
    // Cannot skip a clip without a result
    expect_error(
        host(&state, ClientMessage::HostAdvance { clip_idx: Some(0) }).await,
        "INVALID_PHASE",
    );
    expect_error(finalize(&state, 0, "platinum").await, "UNKNOWN_RANK");
    expect_error(finalize(&state, 1, "gold").await, "STALE_CLIP");

    expect_view(finalize(&state, 0, "g").await);
    expect_error(finalize(&state, 0, "se").await, "ALREADY_FINALIZED");
    assert_eq!(state.view().await.host_choice, Some("Gold".to_string()));

    // Overlays cannot drive the session
    expect_error(
        handle_message(
            ClientMessage::HostAdvance { clip_idx: Some(0) },
            &Role::Overlay,
            &state,
        )
        .await,
        "UNAUTHORIZED",
    );
    assert_eq!(state.phase().await, Phase::Results);
}

/// Two host tabs pressing "next" on the last clip end the session once
/// instead of ending it and starting a new one
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_advance_on_last_clip() {
    let state = Arc::new(AppState::from_config(TWO_CLIPS).unwrap());
    advance(&state, None).await;
    expect_view(finalize(&state, 0, "gold").await);
    advance(&state, Some(0)).await;
    expect_view(finalize(&state, 1, "gold").await);

    let first = tokio::spawn({
        let state = state.clone();
        async move { host(&state, ClientMessage::HostAdvance { clip_idx: Some(1) }).await }
    });
    let second = tokio::spawn({
        let state = state.clone();
        async move { host(&state, ClientMessage::HostAdvance { clip_idx: Some(1) }).await }
    });

    let mut finished = 0;
    let mut stale = 0;
    for result in [first.await.unwrap(), second.await.unwrap()] {
        match result {
            Some(ServerMessage::Session { view }) => {
                assert_eq!(view.phase, Phase::Idle);
                finished += 1;
            }
            Some(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, "STALE_CLIP");
                stale += 1;
            }
            other => panic!("Unexpected response {:?}", other),
        }
    }
    assert_eq!((finished, stale), (1, 1));
    assert_eq!(state.phase().await, Phase::Idle);
    assert_eq!(state.current_clip_idx().await, None);
}

#[tokio::test]
async fn test_catalog_upload() {
    let state = Arc::new(AppState::from_config(ONE_CLIP).unwrap());
    let mut rx = state.broadcast.subscribe();

    match host(
        &state,
        ClientMessage::HostReloadCatalog {
            config: TWO_CLIPS.to_string(),
        },
    )
    .await
    {
        Some(ServerMessage::CatalogReloaded { clips }) => assert_eq!(clips, 2),
        other => panic!("Expected CatalogReloaded, got {:?}", other),
    }
    assert!(matches!(
        rx.recv().await.unwrap(),
        ServerMessage::CatalogReloaded { clips: 2 }
    ));

    // Broken upload is rejected and the catalog stays
    expect_error(
        host(
            &state,
            ClientMessage::HostReloadCatalog {
                config: "    gold\nhttps://clips.example/a\n".to_string(),
            },
        )
        .await,
        "LOAD_FAILED",
    );
    assert_eq!(state.view().await.clip_count, 2);

    advance(&state, None).await;
    expect_error(
        host(
            &state,
            ClientMessage::HostReloadCatalog {
                config: ONE_CLIP.to_string(),
            },
        )
        .await,
        "SESSION_BUSY",
    );
    assert_eq!(state.view().await.clip_count, 2);
}

#[tokio::test]
async fn test_reconnect_without_chat() {
    let state = Arc::new(AppState::from_config(ONE_CLIP).unwrap());
    expect_error(
        host(&state, ClientMessage::HostReconnectChat).await,
        "CHAT_DISABLED",
    );
}

/// Chat transport driven by the test
struct ScriptedTransport {
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, line: &str) -> Result<(), ChatError> {
        self.sent.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn recv(&self) -> Option<Result<String, ChatError>> {
        match self.incoming.lock().await.recv().await {
            Some(line) => Some(Ok(line)),
            None => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Hands out a fresh transport per connect and keeps the test side of each
#[derive(Default)]
struct ScriptedConnector {
    links: StdMutex<Vec<(mpsc::UnboundedSender<String>, Arc<StdMutex<Vec<String>>>)>>,
}

impl ScriptedConnector {
    fn connects(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    fn push(&self, line: &str) {
        let links = self.links.lock().unwrap();
        let (tx, _) = links.last().expect("connected");
        tx.send(line.to_string()).unwrap();
    }

    fn sent(&self) -> Vec<String> {
        let links = self.links.lock().unwrap();
        links
            .last()
            .map(|(_, sent)| sent.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, ChatError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        self.links.lock().unwrap().push((tx, sent.clone()));
        Ok(Box::new(ScriptedTransport {
            incoming: Mutex::new(rx),
            sent,
        }))
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Chat connects when the first clip starts, votes flow in, and the feed is
/// closed once the session ends
#[tokio::test]
async fn test_chat_votes_during_session() {
    let connector = Arc::new(ScriptedConnector::default());
    let chat = Arc::new(ChatSupervisor::new(
        ChatConfig::new("oauth:secret", "VoteBot", "#Streamer"),
        connector.clone(),
    ));
    let state = Arc::new(
        AppState::from_config(ONE_CLIP)
            .unwrap()
            .with_chat(chat.clone()),
    );
    chat.spawn(state.clone());
    assert_eq!(connector.connects(), 0);

    advance(&state, None).await;
    assert_eq!(connector.connects(), 1);
    assert_eq!(chat.connection_state(), ConnectionState::Connected);

    eventually("handshake", || connector.sent().len() >= 4).await;
    assert_eq!(connector.sent()[1], "PASS oauth:secret");
    assert_eq!(connector.sent()[3], "JOIN #streamer");

    connector.push(":tmi.twitch.tv 001 votebot :Welcome, GLHF!");
    connector.push(":viewer1!viewer1@viewer1.tmi.twitch.tv JOIN #streamer");
    connector.push("PING :tmi.twitch.tv");
    connector.push(":Viewer1!viewer1@viewer1.tmi.twitch.tv PRIVMSG #streamer :!Gold");
    connector.push(":viewer2!viewer2@viewer2.tmi.twitch.tv PRIVMSG #streamer :!silver");
    connector.push(":viewer1!viewer1@viewer1.tmi.twitch.tv PRIVMSG #streamer :!silver");
    connector.push("");

    let watched = state.clone();
    eventually("votes", || {
        watched
            .session
            .try_read()
            .map(|s| s.tally().map(|t| t.counts()) == Some(vec![0, 2]))
            .unwrap_or(false)
    })
    .await;
    assert!(connector
        .sent()
        .contains(&"PONG :tmi.twitch.tv".to_string()));

    match host(&state, ClientMessage::HostReconnectChat).await {
        Some(ServerMessage::ChatStatus { state }) => assert_eq!(state, ConnectionState::Connected),
        other => panic!("Expected ChatStatus, got {:?}", other),
    }
    assert_eq!(connector.connects(), 2);

    expect_view(finalize(&state, 0, "silver").await);
    let view = advance(&state, Some(0)).await;
    assert_eq!(view.phase, Phase::Idle);
    assert_eq!(chat.connection_state(), ConnectionState::Disconnected);

    // Stays down until the next session starts
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.connects(), 2);
}

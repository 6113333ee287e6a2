//! Live update feed client
//!
//! Maintains one WebSocket connection to the server's push endpoint on a
//! background thread, delivering catalog-change events to the main loop
//! over a channel. Reconnects with exponential backoff; one malformed
//! message is dropped without disturbing the connection or later
//! messages. The connection is process-wide: unsubscribing a consumer
//! never tears it down.

use std::io;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message};
use url::Url;

/// First retry delay after a disconnect.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Retry delay ceiling.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Idle read timeout. Every expiry is a control-poll point and a
/// liveness check, so a link that died without a close frame (sleep,
/// suspend, cable pull) cannot block the reader forever.
const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Consecutive idle timeouts with unanswered pings before the link is
/// declared dead.
const IDLE_STRIKE_LIMIT: u32 = 3;

/// Retry delay before attempt number `failures` (0-based): doubles per
/// consecutive failure up to the ceiling. A successful connect resets
/// the count.
pub fn backoff_delay(failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    BACKOFF_BASE
        .saturating_mul(factor)
        .min(BACKOFF_CEILING)
}

/// What a catalog change did, as named by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Add,
    Edit,
    Delete,
    Rename,
}

/// One push message from the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct SoundUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub sound_name: String,
    /// New modified timestamp, for cache busting.
    pub modified: DateTime<Utc>,
    pub action: UpdateAction,
    /// Old name on a rename, when the feed provides it.
    #[serde(default)]
    pub previous_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("server URL has no usable host")]
    BadEndpoint,
    #[error("not a sound_update message: type '{0}'")]
    UnknownType(String),
    #[error("unparseable update message: {0}")]
    Malformed(String),
}

/// Parse one inbound text frame.
pub fn parse_update(text: &str) -> Result<SoundUpdate, LiveError> {
    let update: SoundUpdate =
        serde_json::from_str(text).map_err(|e| LiveError::Malformed(e.to_string()))?;
    if update.kind != "sound_update" {
        return Err(LiveError::UnknownType(update.kind));
    }
    Ok(update)
}

/// Derive the feed endpoint from the catalog server URL: same origin,
/// scheme upgraded to ws/wss, path `/ws`.
pub fn feed_endpoint(server: &Url) -> Result<Url, LiveError> {
    let mut endpoint = server.clone();
    let scheme = match server.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    endpoint
        .set_scheme(scheme)
        .map_err(|_| LiveError::BadEndpoint)?;
    endpoint.set_path("/ws");
    endpoint.set_query(None);
    Ok(endpoint)
}

/// What the reader thread reports to the main loop.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Connected,
    Disconnected { retry_in: Duration },
    Update(SoundUpdate),
    /// A bad frame, dropped; the connection lives on.
    Malformed(String),
}

enum Control {
    /// Retry now instead of waiting out the backoff delay. Sent when the
    /// terminal regains focus (covers silent failures after sleep).
    Poke,
    Shutdown,
}

/// Subscription token; dropping it does nothing, unsubscribing removes
/// only the one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&ChannelMessage)>;

/// Main-thread side of the feed.
pub struct LiveUpdateChannel {
    endpoint: Url,
    rx: Option<Receiver<ChannelMessage>>,
    control_tx: Option<Sender<Control>>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_sub: u64,
    connected: bool,
}

impl LiveUpdateChannel {
    pub fn new(server: &Url) -> Result<Self, LiveError> {
        Ok(Self {
            endpoint: feed_endpoint(server)?,
            rx: None,
            control_tx: None,
            subscribers: Vec::new(),
            next_sub: 0,
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Start the connection if it isn't already running. Connection
    /// lifetime is process-wide, not subscriber-scoped.
    pub fn connect(&mut self) {
        self.ensure_started();
    }

    /// Register a callback. The first subscription starts the connection;
    /// later ones share it.
    pub fn subscribe(&mut self, callback: impl FnMut(&ChannelMessage) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_sub);
        self.next_sub += 1;
        self.subscribers.push((id, Box::new(callback)));
        self.ensure_started();
        id
    }

    /// Remove one callback. The shared connection is left alone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(sub, _)| *sub != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Ask the reader to retry immediately if it is waiting out a backoff
    /// delay, or to verify a connection it believes is healthy (a ping
    /// with a short answer window). Covers links that died silently
    /// while the terminal was suspended.
    pub fn poke(&self) {
        if let Some(tx) = &self.control_tx {
            let _ = tx.send(Control::Poke);
        }
    }

    /// Drain inbound messages, dispatch them to subscribers, and return
    /// them for the owner. Called once per main-loop tick.
    pub fn pump(&mut self) -> Vec<ChannelMessage> {
        let Some(rx) = &self.rx else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match &msg {
                ChannelMessage::Connected => self.connected = true,
                ChannelMessage::Disconnected { .. } => self.connected = false,
                _ => {}
            }
            drained.push(msg);
        }
        for msg in &drained {
            for (_, subscriber) in &mut self.subscribers {
                subscriber(msg);
            }
        }
        drained
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(Control::Shutdown);
        }
        self.rx = None;
        self.connected = false;
    }

    fn ensure_started(&mut self) {
        if self.rx.is_some() {
            return;
        }
        let (tx, rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let endpoint = self.endpoint.clone();
        thread::spawn(move || reader_loop(endpoint, tx, control_rx));
        self.rx = Some(rx);
        self.control_tx = Some(control_tx);
    }
}

/// Liveness bookkeeping for one connection: counts idle read timeouts
/// and decides when an unresponsive link is dead.
#[derive(Debug, Default)]
struct Liveness {
    strikes: u32,
}

impl Liveness {
    /// Any inbound frame proves the link alive.
    fn traffic(&mut self) {
        self.strikes = 0;
    }

    /// Focus returned and the link may be silently dead: leave it one
    /// timeout to answer the ping before declaring it dead.
    fn expedite(&mut self) {
        self.strikes = IDLE_STRIKE_LIMIT.saturating_sub(1);
    }

    /// An idle read timeout elapsed. True when the link is dead.
    fn timed_out(&mut self) -> bool {
        self.strikes += 1;
        self.strikes >= IDLE_STRIKE_LIMIT
    }
}

fn is_idle_timeout(err: &WsError) -> bool {
    matches!(
        err,
        WsError::Io(e) if e.kind() == io::ErrorKind::WouldBlock
            || e.kind() == io::ErrorKind::TimedOut
    )
}

/// Connect, read until the link drops, back off, repeat.
fn reader_loop(endpoint: Url, tx: Sender<ChannelMessage>, control: Receiver<Control>) {
    let mut failures: u32 = 0;

    loop {
        match tungstenite::connect(endpoint.as_str()) {
            Ok((mut socket, _response)) => {
                // Bound reads so a dead link surfaces as idle timeouts
                if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
                    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
                }
                failures = 0;
                if tx.send(ChannelMessage::Connected).is_err() {
                    return;
                }
                let mut liveness = Liveness::default();
                loop {
                    match control.try_recv() {
                        Ok(Control::Shutdown) => {
                            let _ = socket.close(None);
                            return;
                        }
                        Ok(Control::Poke) => {
                            if socket.send(Message::Ping(Vec::new())).is_err() {
                                break;
                            }
                            liveness.expedite();
                        }
                        Err(_) => {}
                    }
                    match socket.read() {
                        Ok(Message::Text(text)) => {
                            liveness.traffic();
                            let msg = match parse_update(&text) {
                                Ok(update) => ChannelMessage::Update(update),
                                Err(e) => ChannelMessage::Malformed(e.to_string()),
                            };
                            if tx.send(msg).is_err() {
                                return;
                            }
                        }
                        // Pings are answered by the library during read
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => liveness.traffic(),
                        Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => liveness.traffic(),
                        Err(ref e) if is_idle_timeout(e) => {
                            if liveness.timed_out()
                                || socket.send(Message::Ping(Vec::new())).is_err()
                            {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) | Err(_) => break,
                    }
                }
            }
            Err(_) => {}
        }

        let retry_in = backoff_delay(failures);
        failures = failures.saturating_add(1);
        if tx.send(ChannelMessage::Disconnected { retry_in }).is_err() {
            return;
        }
        match control.recv_timeout(retry_in) {
            Ok(Control::Poke) | Err(RecvTimeoutError::Timeout) => continue,
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_backoff_starts_at_base_and_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_caps_at_ceiling() {
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(20), BACKOFF_CEILING);
        assert_eq!(backoff_delay(u32::MAX), BACKOFF_CEILING);
    }

    #[test]
    fn test_parse_valid_update() {
        let text = r#"{
            "type": "sound_update",
            "sound_name": "airhorn",
            "modified": "2024-05-01T12:30:00Z",
            "action": "edit"
        }"#;
        let update = parse_update(text).unwrap();
        assert_eq!(update.sound_name, "airhorn");
        assert_eq!(update.action, UpdateAction::Edit);
        assert!(update.previous_name.is_none());
    }

    #[test]
    fn test_parse_rename_with_previous_name() {
        let text = r#"{
            "type": "sound_update",
            "sound_name": "new horn",
            "modified": "2024-05-01T12:30:00Z",
            "action": "rename",
            "previous_name": "old horn"
        }"#;
        let update = parse_update(text).unwrap();
        assert_eq!(update.action, UpdateAction::Rename);
        assert_eq!(update.previous_name.as_deref(), Some("old horn"));
    }

    #[test]
    fn test_parse_rejects_garbage_and_wrong_type() {
        assert!(matches!(
            parse_update("not json"),
            Err(LiveError::Malformed(_))
        ));
        let wrong = r#"{
            "type": "heartbeat",
            "sound_name": "x",
            "modified": "2024-05-01T12:30:00Z",
            "action": "add"
        }"#;
        assert!(matches!(parse_update(wrong), Err(LiveError::UnknownType(_))));
    }

    #[test]
    fn test_feed_endpoint_upgrades_scheme() {
        let http = Url::parse("http://board.local:8000/api/sounds").unwrap();
        assert_eq!(feed_endpoint(&http).unwrap().as_str(), "ws://board.local:8000/ws");

        let https = Url::parse("https://board.local/").unwrap();
        assert_eq!(feed_endpoint(&https).unwrap().as_str(), "wss://board.local/ws");
    }

    #[test]
    fn test_liveness_declares_dead_after_strike_limit() {
        let mut liveness = Liveness::default();
        assert!(!liveness.timed_out());
        assert!(!liveness.timed_out());
        assert!(liveness.timed_out());
    }

    #[test]
    fn test_traffic_resets_liveness_strikes() {
        let mut liveness = Liveness::default();
        assert!(!liveness.timed_out());
        assert!(!liveness.timed_out());
        liveness.traffic();
        assert!(!liveness.timed_out());
        assert!(!liveness.timed_out());
        assert!(liveness.timed_out());
    }

    #[test]
    fn test_poke_expedites_dead_link_detection() {
        // A silently dead link answers nothing: one unanswered timeout
        // after the focus-driven ping tears the connection down
        let mut liveness = Liveness::default();
        liveness.expedite();
        assert!(liveness.timed_out());

        // A healthy link answers the ping and survives
        let mut liveness = Liveness::default();
        liveness.expedite();
        liveness.traffic();
        assert!(!liveness.timed_out());
    }

    #[test]
    fn test_idle_timeout_is_not_a_disconnect() {
        let would_block = WsError::Io(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(is_idle_timeout(&would_block));
        let timed_out = WsError::Io(io::Error::from(io::ErrorKind::TimedOut));
        assert!(is_idle_timeout(&timed_out));
        let reset = WsError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!is_idle_timeout(&reset));
    }

    #[test]
    fn test_unsubscribe_removes_only_that_callback() {
        let server = Url::parse("http://localhost:8000").unwrap();
        let mut channel = LiveUpdateChannel::new(&server).unwrap();

        let hits = Rc::new(RefCell::new(0u32));
        let hits2 = hits.clone();
        let a = channel.subscribe(move |_| *hits2.borrow_mut() += 1);
        let b = channel.subscribe(|_| {});
        assert_eq!(channel.subscriber_count(), 2);

        channel.unsubscribe(b);
        assert_eq!(channel.subscriber_count(), 1);
        channel.unsubscribe(a);
        assert_eq!(channel.subscriber_count(), 0);
        channel.shutdown();
    }
}

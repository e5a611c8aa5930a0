//! Session lifecycle and event routing
//!
//! Owns the single active connection: microphone capture, the playback
//! timeline, and the WebSocket. Network and playback callbacks never touch
//! shared state directly — they emit [`SessionEvent`]s tagged with the
//! epoch of the session that produced them, and [`SessionManager::handle_event`]
//! is the single dispatcher that drops anything stale. cpal streams are not
//! `Send`, so the manager lives on the driving thread (see `main.rs`).

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::log::{LogKind, SessionLog};
use super::wire::{MediaMessage, ServerMessage, SetupMessage, WebSource};
use crate::audio::{AudioCapture, AudioPlayback, decode_pcm16};
use crate::config::Config;
use crate::{Error, ErrorCode, Result};

/// Depth of the outbound capture-block channel.
///
/// Blocks are fire-and-forget; a full channel drops the block.
const OUTBOUND_QUEUE: usize = 32;

/// Depth of the inbound event channel
const EVENT_QUEUE: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable state surface consumed by the UI layer.
///
/// Invariant: `speaking` is never true while `connected` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub connected: bool,
    pub speaking: bool,
    pub error: Option<ErrorCode>,
}

/// What a session callback observed
#[derive(Debug)]
pub enum SessionEventKind {
    /// Endpoint acknowledged the setup message
    SetupComplete,
    /// Decoded synthesized audio ready for scheduling
    Audio(Vec<f32>),
    /// Model transcript fragment
    Transcript(String),
    /// Server-side barge-in; flush playback
    Interrupted,
    /// Model finished its response turn
    TurnComplete,
    /// Grounding citations for the display list
    Citations(Vec<WebSource>),
    /// Playback speaking flag changed
    Speaking(bool),
    /// Connection closed or errored, already classified
    Closed(ErrorCode),
}

/// One observation from a session callback, tagged with its epoch
#[derive(Debug)]
pub struct SessionEvent {
    pub epoch: u64,
    pub kind: SessionEventKind,
}

/// Resources owned by one live connection
struct ActiveSession {
    capture: AudioCapture,
    playback: AudioPlayback,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    speaking_fwd: JoinHandle<()>,
}

impl ActiveSession {
    fn teardown(&mut self) {
        self.capture.teardown();
        self.playback.teardown();
        self.reader.abort();
        self.writer.abort();
        self.speaking_fwd.abort();
    }
}

/// Orchestrates the connection lifecycle and the audio pipeline.
///
/// At most one session is live at a time; a `connect()` while one is open
/// tears the old one down first. `disconnect()` is always safe and
/// idempotent.
pub struct SessionManager {
    config: Config,
    epoch: u64,
    active: Option<ActiveSession>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    state_tx: tokio::sync::watch::Sender<StateSnapshot>,
    log: SessionLog,
}

impl SessionManager {
    /// Create a manager in the disconnected state
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (state_tx, _) = tokio::sync::watch::channel(StateSnapshot::default());
        let log = SessionLog::new(config.log_capacity);

        Self {
            config,
            epoch: 0,
            active: None,
            events_tx,
            events_rx,
            state_tx,
            log,
        }
    }

    /// Open a session against the configured endpoint.
    ///
    /// Validates the credential, acquires the audio clocks and microphone,
    /// performs the WebSocket handshake, sends the setup message, and
    /// starts streaming. Any failure is classified, triggers full teardown,
    /// and is surfaced on the state snapshot before this returns.
    ///
    /// # Errors
    ///
    /// Returns the underlying error after classification and teardown.
    #[allow(clippy::future_not_send, clippy::too_many_lines)]
    pub async fn connect(&mut self) -> Result<()> {
        if self.active.is_some() {
            tracing::debug!("connect while open; tearing down existing session");
            self.disconnect();
        }

        let Some(api_key) = self.config.api_key.clone() else {
            self.fail(ErrorCode::AuthMissing);
            return Err(Error::Session("no credential configured".to_string()));
        };

        self.epoch += 1;
        let epoch = self.epoch;
        self.log.clear();
        self.log.push(LogKind::Status, "connecting");
        tracing::info!(model = %self.config.model, epoch, "opening session");

        // Output clock first: playback must be ready before audio arrives
        let mut playback = match AudioPlayback::new().and_then(|mut p| {
            p.start()?;
            Ok(p)
        }) {
            Ok(p) => p,
            Err(e) => {
                self.fail(ErrorCode::HardwareAccess);
                return Err(e);
            }
        };

        let mut capture = AudioCapture::new(self.config.block_size, self.config.noise_gate);
        if let Err(e) = capture.arm() {
            let code = classify_capture(&e);
            playback.teardown();
            self.fail(code);
            return Err(e);
        }

        let url = match self.config.session_url(&api_key) {
            Ok(url) => url,
            Err(e) => {
                capture.teardown();
                playback.teardown();
                self.fail(ErrorCode::NetworkOrAuth);
                return Err(e);
            }
        };

        let ws = match connect_async(url.as_str()).await {
            Ok((ws, response)) => {
                tracing::debug!(status = %response.status(), "handshake accepted");
                ws
            }
            Err(e) => {
                let code = ErrorCode::classify_transport(&e);
                capture.teardown();
                playback.teardown();
                self.fail(code);
                return Err(e.into());
            }
        };

        let (mut sink, stream) = ws.split();

        let setup = SetupMessage::new(
            self.config.model.clone(),
            self.config.voice.clone(),
            self.config.system_instruction.clone(),
            self.config.web_search,
        );
        let setup_result = match serde_json::to_string(&setup) {
            Ok(payload) => sink.send(Message::Text(payload)).await.map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        };
        if let Err(e) = setup_result {
            let code = match &e {
                Error::WebSocket(ws_err) => ErrorCode::classify_transport(ws_err),
                _ => ErrorCode::SessionDrop,
            };
            capture.teardown();
            playback.teardown();
            self.fail(code);
            return Err(e);
        }

        // Outbound: encoded capture blocks → wire media messages
        let (block_tx, mut block_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let writer = tokio::spawn(async move {
            while let Some(bytes) = block_rx.recv().await {
                let message = MediaMessage::audio(bytes);
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            // Not retried; the reader surfaces the failure
                            tracing::warn!(error = %e, "outbound send failed");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "media serialization failed"),
                }
            }
            let _ = sink.close().await;
        });

        // Inbound: wire messages → epoch-tagged events for the dispatcher
        let reader = tokio::spawn(read_loop(stream, self.events_tx.clone(), epoch));

        // Playback drain notifications route through the same dispatcher
        let mut speaking_rx = playback.subscribe_speaking();
        let speaking_tx = self.events_tx.clone();
        let speaking_fwd = tokio::spawn(async move {
            while speaking_rx.changed().await.is_ok() {
                let speaking = *speaking_rx.borrow_and_update();
                let event = SessionEvent {
                    epoch,
                    kind: SessionEventKind::Speaking(speaking),
                };
                if speaking_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        if let Err(e) = capture.start(block_tx) {
            let code = classify_capture(&e);
            capture.teardown();
            playback.teardown();
            reader.abort();
            writer.abort();
            speaking_fwd.abort();
            self.fail(code);
            return Err(e);
        }

        self.active = Some(ActiveSession {
            capture,
            playback,
            reader,
            writer,
            speaking_fwd,
        });
        self.set_state(true, false, None);
        self.log.push(LogKind::Status, "session open");
        tracing::info!(epoch, "session open");
        Ok(())
    }

    /// Tear down the active session, if any. Always safe; idempotent.
    ///
    /// Bumps the epoch so late-arriving events from the old session are
    /// discarded by the dispatcher.
    pub fn disconnect(&mut self) {
        self.epoch += 1;
        if let Some(mut active) = self.active.take() {
            active.teardown();
            self.log.push(LogKind::Status, "disconnected");
            tracing::info!("session closed");
        }
        let error = self.state_tx.borrow().error;
        self.set_state(false, false, error);
    }

    /// Next event from any session callback.
    ///
    /// Never resolves to `None`: the manager holds a sender for the
    /// lifetime of the process.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// The single dispatcher: applies an event if its epoch is current.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if event.epoch != self.epoch {
            tracing::trace!(event_epoch = event.epoch, epoch = self.epoch, "stale event dropped");
            return;
        }

        match event.kind {
            SessionEventKind::SetupComplete => {
                self.log.push(LogKind::Status, "setup complete");
                tracing::debug!("setup complete");
            }
            SessionEventKind::Audio(samples) => {
                if let Some(active) = &self.active {
                    active.playback.enqueue(samples);
                    let speaking = active.playback.is_speaking();
                    self.set_state(true, speaking, None);
                }
            }
            SessionEventKind::Transcript(text) => {
                tracing::debug!(%text, "transcript");
                self.log.push(LogKind::Model, text);
            }
            SessionEventKind::Interrupted => {
                if let Some(active) = &self.active {
                    active.playback.flush();
                }
                self.log.push(LogKind::Status, "interrupted");
                tracing::debug!("server interruption, playback flushed");
                let connected = self.active.is_some();
                self.set_state(connected, false, None);
            }
            SessionEventKind::TurnComplete => {
                tracing::debug!("turn complete");
            }
            SessionEventKind::Citations(sources) => {
                self.log.add_citations(sources);
            }
            SessionEventKind::Speaking(speaking) => {
                let connected = self.active.is_some();
                self.set_state(connected, speaking && connected, None);
            }
            SessionEventKind::Closed(code) => {
                tracing::warn!(code = %code, "session closed by remote");
                self.fail(code);
            }
        }
    }

    /// Classified failure: full teardown, then surface the code
    fn fail(&mut self, code: ErrorCode) {
        self.epoch += 1;
        if let Some(mut active) = self.active.take() {
            active.teardown();
        }
        self.log.push(LogKind::Error, code.as_str());
        self.set_state(false, false, Some(code));
    }

    fn set_state(&self, connected: bool, speaking: bool, error: Option<ErrorCode>) {
        let snapshot = StateSnapshot {
            connected,
            // Never report speaking while disconnected
            speaking: speaking && connected,
            error,
        };
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Watch channel over the observable state surface
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    /// Current observable state
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Whether a session is currently open
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Rolling session log
    #[must_use]
    pub const fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Current session epoch (advances on every connect/teardown)
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Sender half of the event channel (dispatcher input)
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<SessionEvent> {
        self.events_tx.clone()
    }
}

/// Map a capture/arm failure to its error code
fn classify_capture(err: &Error) -> ErrorCode {
    match err {
        Error::Capture(_) => ErrorCode::MicDenied,
        _ => ErrorCode::HardwareAccess,
    }
}

/// Read inbound frames, translate to events, classify the close.
async fn read_loop(
    mut stream: futures::stream::SplitStream<WsStream>,
    events: mpsc::Sender<SessionEvent>,
    epoch: u64,
) {
    let send = |kind: SessionEventKind| {
        let events = events.clone();
        async move {
            events
                .send(SessionEvent { epoch, kind })
                .await
                .map_err(|_| ())
        }
    };

    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("non-utf8 binary frame dropped");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let code = frame.map_or(ErrorCode::SessionDrop, |f| {
                    ErrorCode::classify_message(&f.reason)
                });
                let _ = send(SessionEventKind::Closed(code)).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let code = ErrorCode::classify_transport(&e);
                tracing::warn!(error = %e, code = %code, "session stream error");
                let _ = send(SessionEventKind::Closed(code)).await;
                return;
            }
            None => {
                let _ = send(SessionEventKind::Closed(ErrorCode::SessionDrop)).await;
                return;
            }
        };

        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable server message dropped");
                continue;
            }
        };

        if message.setup_complete.is_some() && send(SessionEventKind::SetupComplete).await.is_err()
        {
            return;
        }

        // Interruption cancels in-flight playback before any new audio in
        // the same message is scheduled
        if message.is_interrupted() && send(SessionEventKind::Interrupted).await.is_err() {
            return;
        }

        for payload in message.audio_payloads() {
            match decode_pcm16(payload) {
                Ok(samples) => {
                    if send(SessionEventKind::Audio(samples)).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "audio payload dropped"),
            }
        }

        for text_part in message.text_parts() {
            if send(SessionEventKind::Transcript(text_part.to_string()))
                .await
                .is_err()
            {
                return;
            }
        }

        let citations = message.citations();
        if !citations.is_empty() && send(SessionEventKind::Citations(citations)).await.is_err() {
            return;
        }

        if message.is_turn_complete() && send(SessionEventKind::TurnComplete).await.is_err() {
            return;
        }
    }
}

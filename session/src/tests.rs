//! Scenario tests for the voice session.
//!
//! Runs the full state machine against the in-memory devices and a scripted
//! in-process transport.
//!
//! ```bash
//! RUST_LOG=concierge_session=debug cargo test -p concierge-session -- --nocapture
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use concierge_audio::device::memory::{MemoryInput, MemoryOutput};
use concierge_audio::pcm::{self, AudioFrame, EncodedChunk, Format};
use concierge_live::{Connector, Error as LiveError, Result as LiveResult, ServerEvent, SetupConfig, Transport};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{SessionConfig, SessionError, SessionState, VoiceSession};

const BLOCK: usize = 160;
const TIMEOUT: Duration = Duration::from_secs(5);

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Scripted transport
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum CloseBehavior {
    /// Ends the inbound stream, like a completed close handshake.
    Ack,
    /// Keeps the inbound stream open.
    Silent,
    /// Never returns from `close`.
    Hang,
}

struct ScriptedTransport {
    sent: Mutex<Vec<EncodedChunk>>,
    send_error: Mutex<Option<String>>,
    inbound_tx: mpsc::UnboundedSender<LiveResult<ServerEvent>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LiveResult<ServerEvent>>>,
    eof: CancellationToken,
    closed: CancellationToken,
    close_calls: AtomicUsize,
    on_close: CloseBehavior,
}

impl ScriptedTransport {
    fn new(on_close: CloseBehavior) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            eof: CancellationToken::new(),
            closed: CancellationToken::new(),
            close_calls: AtomicUsize::new(0),
            on_close,
        })
    }

    fn push(&self, event: LiveResult<ServerEvent>) {
        let _ = self.inbound_tx.send(event);
    }

    fn push_audio(&self, frame: &AudioFrame) {
        self.push(Ok(ServerEvent::Audio(pcm::encode(frame))));
    }

    fn fail_sends(&self, reason: &str) {
        *self.send_error.lock() = Some(reason.to_string());
    }

    fn remote_close(&self) {
        self.eof.cancel();
    }

    fn sent(&self) -> Vec<EncodedChunk> {
        self.sent.lock().clone()
    }

    fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_audio(&self, chunk: &EncodedChunk) -> LiveResult<()> {
        if self.closed.is_cancelled() {
            return Err(LiveError::SessionClosed);
        }
        if let Some(reason) = self.send_error.lock().clone() {
            return Err(LiveError::Transport(reason));
        }
        self.sent.lock().push(chunk.clone());
        Ok(())
    }

    async fn recv(&self) -> Option<LiveResult<ServerEvent>> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            event = rx.recv() => event,
            _ = self.eof.cancelled() => None,
        }
    }

    async fn close(&self) -> LiveResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        match self.on_close {
            CloseBehavior::Ack => self.eof.cancel(),
            CloseBehavior::Silent => {}
            CloseBehavior::Hang => std::future::pending::<()>().await,
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConnectBehavior {
    Open,
    /// Never acknowledges; waits for cancellation.
    Hang,
    Refuse,
}

struct ScriptedConnector {
    behavior: ConnectBehavior,
    transport: Arc<ScriptedTransport>,
    connects: AtomicUsize,
    setups: Mutex<Vec<SetupConfig>>,
}

impl ScriptedConnector {
    fn new(behavior: ConnectBehavior, transport: Arc<ScriptedTransport>) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            transport,
            connects: AtomicUsize::new(0),
            setups: Mutex::new(Vec::new()),
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        setup: &SetupConfig,
        cancel: CancellationToken,
    ) -> LiveResult<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.setups.lock().push(setup.clone());
        match self.behavior {
            ConnectBehavior::Open => Ok(self.transport.clone()),
            ConnectBehavior::Hang => {
                cancel.cancelled().await;
                Err(LiveError::SessionAborted)
            }
            ConnectBehavior::Refuse => Err(LiveError::Connection("connection refused".into())),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    session: VoiceSession,
    input: MemoryInput,
    output: MemoryOutput,
    connector: Arc<ScriptedConnector>,
    transport: Arc<ScriptedTransport>,
}

impl Harness {
    fn new(behavior: ConnectBehavior) -> Self {
        Self::with(
            behavior,
            MemoryInput::new(),
            MemoryOutput::new(),
            CloseBehavior::Ack,
            default_config(),
        )
    }

    fn with(
        behavior: ConnectBehavior,
        input: MemoryInput,
        output: MemoryOutput,
        on_close: CloseBehavior,
        config: SessionConfig,
    ) -> Self {
        init_tracing();
        let transport = ScriptedTransport::new(on_close);
        let connector = ScriptedConnector::new(behavior, transport.clone());
        let session = VoiceSession::new(
            config,
            connector.clone(),
            Arc::new(input.clone()),
            Arc::new(output.clone()),
        )
        .unwrap();
        Self {
            session,
            input,
            output,
            connector,
            transport,
        }
    }

    async fn wait_for_state(&self, want: SessionState) {
        let mut rx = self.session.subscribe();
        tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == want))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", want))
            .unwrap();
    }

    async fn wait_terminal(&self) -> SessionState {
        tokio::time::timeout(TIMEOUT, self.session.wait())
            .await
            .expect("session did not terminate")
    }

    fn assert_released(&self) {
        assert_eq!(self.input.open_handles(), 0, "microphone still held");
        assert_eq!(self.output.open_handles(), 0, "speaker still held");
        assert!(!self.input.is_capturing());
    }
}

fn default_config() -> SessionConfig {
    SessionConfig {
        block_size: BLOCK,
        close_grace_ms: 200,
        ..SessionConfig::with_instruction("You are the concierge for a cleaning service.")
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let poll = async {
        while !cond() {
            tokio::time::sleep(ms(1)).await;
        }
    };
    tokio::time::timeout(TIMEOUT, poll)
        .await
        .expect("condition not reached");
}

fn block(value: f32) -> Vec<f32> {
    vec![value; BLOCK]
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_normal_session() {
    let h = Harness::new(ConnectBehavior::Open);
    let t0 = ms(1_000);
    h.output.set_time(t0);

    assert!(h.session.start());
    h.wait_for_state(SessionState::Active).await;
    assert!(h.session.is_active());

    // Five blocks captured and sent in capture order.
    let values = [0.1, 0.2, 0.3, 0.4, 0.5];
    for (i, v) in values.iter().enumerate() {
        assert!(h.input.feed(&block(*v)));
        wait_until(|| h.transport.sent().len() == i + 1).await;
    }
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 5);
    for (chunk, v) in sent.iter().zip(values) {
        assert_eq!(chunk.mime_type(), "audio/pcm;rate=16000");
        let frame = chunk.decode().unwrap();
        assert_eq!(frame.frames(), BLOCK);
        assert_eq!(frame.samples()[0], pcm::f32_to_i16(v));
    }

    // Two inbound chunks arrive back to back.
    h.transport
        .push_audio(&AudioFrame::silence(Format::MONO_24K, ms(200)));
    h.transport
        .push_audio(&AudioFrame::silence(Format::MONO_24K, ms(150)));
    wait_until(|| h.output.history().len() == 2).await;

    let history = h.output.history();
    assert_eq!(history[0].start, t0);
    assert_eq!(history[1].start, t0 + ms(200));
    assert_eq!(history[1].end(), t0 + ms(350));

    let stats = h.session.stats();
    assert_eq!(stats.frames_captured, 5);
    assert_eq!(stats.chunks_sent, 5);
    assert_eq!(stats.chunks_received, 2);
    assert_eq!(stats.chunks_scheduled, 2);

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    assert!(h.session.take_error().is_none());
    assert_eq!(h.transport.close_calls(), 1);
    assert!(h.output.pending().is_empty());
    h.assert_released();

    let setups = h.connector.setups.lock().clone();
    assert_eq!(setups.len(), 1);
    assert_eq!(
        setups[0].system_instruction.as_deref(),
        Some("You are the concierge for a cleaning service.")
    );
}

#[tokio::test]
async fn test_double_start_is_noop() {
    let h = Harness::new(ConnectBehavior::Open);

    assert!(h.session.start());
    assert!(!h.session.start());
    h.wait_for_state(SessionState::Active).await;
    assert!(!h.session.start());

    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.input.acquisitions(), 1);
    assert_eq!(h.output.acquisitions(), 1);

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    assert!(!h.session.start());
    assert_eq!(h.connector.connects(), 1);
}

#[tokio::test]
async fn test_permission_denied() {
    let h = Harness::with(
        ConnectBehavior::Open,
        MemoryInput::unavailable("microphone permission denied"),
        MemoryOutput::new(),
        CloseBehavior::Ack,
        default_config(),
    );

    assert!(h.session.start());
    assert_eq!(h.wait_terminal().await, SessionState::Failed);
    assert_eq!(
        h.session.take_error(),
        Some(SessionError::DeviceUnavailable(
            "microphone permission denied".into()
        ))
    );
    assert!(h.session.take_error().is_none());
    assert_eq!(h.connector.connects(), 0);
    assert_eq!(h.output.acquisitions(), 0);
    h.assert_released();
}

#[tokio::test]
async fn test_output_unavailable_releases_microphone() {
    let h = Harness::with(
        ConnectBehavior::Open,
        MemoryInput::new(),
        MemoryOutput::unavailable("no output device"),
        CloseBehavior::Ack,
        default_config(),
    );

    h.session.start();
    assert_eq!(h.wait_terminal().await, SessionState::Failed);
    assert!(h.session.take_error().is_some_and(|e| e.is_device()));
    assert_eq!(h.connector.connects(), 0);
    assert_eq!(h.input.acquisitions(), 1);
    h.assert_released();
}

#[tokio::test]
async fn test_network_drop() {
    let h = Harness::new(ConnectBehavior::Open);

    h.session.start();
    h.wait_for_state(SessionState::Active).await;
    assert!(h.input.is_capturing());

    h.transport
        .push(Err(LiveError::Transport("connection reset".into())));
    assert_eq!(h.wait_terminal().await, SessionState::Failed);
    assert_eq!(
        h.session.take_error(),
        Some(SessionError::Transport("connection reset".into()))
    );
    assert_eq!(h.transport.close_calls(), 1);
    h.assert_released();
}

#[tokio::test]
async fn test_send_failure_fails_session() {
    let h = Harness::new(ConnectBehavior::Open);

    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    // The write side breaks while the read side still looks healthy.
    h.transport.fail_sends("broken pipe");
    assert!(h.input.feed(&block(0.2)));

    assert_eq!(h.wait_terminal().await, SessionState::Failed);
    assert_eq!(
        h.session.take_error(),
        Some(SessionError::Transport("broken pipe".into()))
    );
    assert_eq!(h.session.stats().chunks_sent, 0);
    assert_eq!(h.transport.close_calls(), 1);
    h.assert_released();
}

#[tokio::test]
async fn test_connect_refused() {
    let h = Harness::new(ConnectBehavior::Refuse);

    h.session.start();
    assert_eq!(h.wait_terminal().await, SessionState::Failed);
    assert!(matches!(
        h.session.take_error(),
        Some(SessionError::Transport(_))
    ));
    h.assert_released();
}

#[tokio::test]
async fn test_malformed_chunk_keeps_session() {
    let h = Harness::new(ConnectBehavior::Open);

    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    // Three bytes cannot hold whole 16-bit samples.
    h.transport.push(Ok(ServerEvent::Audio(EncodedChunk::new(
        Format::MONO_24K,
        vec![0u8, 1, 2],
    ))));
    h.transport
        .push(Ok(ServerEvent::MalformedAudio("invalid base64".into())));
    h.transport
        .push_audio(&AudioFrame::silence(Format::MONO_24K, ms(100)));

    wait_until(|| h.output.history().len() == 1).await;
    assert_eq!(h.session.state(), SessionState::Active);

    let stats = h.session.stats();
    assert_eq!(stats.chunks_received, 3);
    assert_eq!(stats.malformed_chunks, 2);
    assert_eq!(stats.chunks_scheduled, 1);

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    h.assert_released();
}

#[tokio::test]
async fn test_stop_while_connecting() {
    let h = Harness::new(ConnectBehavior::Hang);

    h.session.start();
    wait_until(|| h.connector.connects() == 1).await;
    assert_eq!(h.session.state(), SessionState::Connecting);
    assert_eq!(h.input.open_handles(), 1);

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    assert!(h.session.take_error().is_none());
    h.assert_released();
}

#[test]
fn test_stop_before_start() {
    tokio_test::block_on(async {
        let h = Harness::new(ConnectBehavior::Open);
        h.session.stop();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert!(!h.session.start());
        assert_eq!(h.session.wait().await, SessionState::Closed);
        assert_eq!(h.input.acquisitions(), 0);
        assert_eq!(h.connector.connects(), 0);
    });
}

#[tokio::test]
async fn test_remote_close() {
    let h = Harness::new(ConnectBehavior::Open);

    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    h.transport.remote_close();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    assert!(h.session.take_error().is_none());
    h.assert_released();
}

#[tokio::test]
async fn test_close_without_ack_uses_grace() {
    let config = SessionConfig {
        close_grace_ms: 50,
        ..default_config()
    };
    let h = Harness::with(
        ConnectBehavior::Open,
        MemoryInput::new(),
        MemoryOutput::new(),
        CloseBehavior::Silent,
        config,
    );

    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    let mut states = h.session.subscribe();
    h.session.stop();
    states
        .wait_for(|s| *s == SessionState::Closing)
        .await
        .unwrap();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    h.assert_released();
}

#[tokio::test]
async fn test_stalled_close_still_releases_devices() {
    let config = SessionConfig {
        close_grace_ms: 50,
        ..default_config()
    };
    let h = Harness::with(
        ConnectBehavior::Open,
        MemoryInput::new(),
        MemoryOutput::new(),
        CloseBehavior::Hang,
        config,
    );

    h.session.start();
    h.wait_for_state(SessionState::Active).await;
    h.transport
        .push_audio(&AudioFrame::silence(Format::MONO_24K, ms(500)));
    wait_until(|| h.output.history().len() == 1).await;

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
    assert_eq!(h.transport.close_calls(), 1);
    assert!(h.output.pending().is_empty());
    h.assert_released();
}

#[tokio::test]
async fn test_interrupt_and_turn_counters() {
    let h = Harness::new(ConnectBehavior::Open);

    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    h.transport.push(Ok(ServerEvent::Interrupted));
    h.transport.push(Ok(ServerEvent::TurnComplete));
    h.transport.push(Ok(ServerEvent::Text("hello".into())));
    wait_until(|| h.session.stats().turns_completed == 1).await;

    let stats = h.session.stats();
    assert_eq!(stats.interruptions, 1);
    assert!(h.session.is_active());

    h.session.stop();
    assert_eq!(h.wait_terminal().await, SessionState::Closed);
}

#[tokio::test]
async fn test_drop_stops_session() {
    let h = Harness::new(ConnectBehavior::Open);
    h.session.start();
    h.wait_for_state(SessionState::Active).await;

    let Harness {
        session,
        input,
        output,
        transport,
        ..
    } = h;
    drop(session);

    wait_until(|| input.open_handles() == 0 && output.open_handles() == 0).await;
    assert_eq!(transport.close_calls(), 1);
}

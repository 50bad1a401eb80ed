//! The voice session state machine.
//!
//! A [`VoiceSession`] owns one run of the duplex pipeline:
//!
//! ```text
//! microphone -> CapturePipeline -> FrameQueue -> encode -> Transport::send_audio
//! Transport::recv -> PlaybackScheduler -> speaker
//! ```
//!
//! `start` spawns a driver task that acquires both devices, connects, and
//! then runs two loops until the session ends: the send loop drains the
//! capture queue in order, and the receive loop hands inbound chunks to the
//! scheduler in arrival order. Every exit path releases the capture device,
//! the transport and the output device before the terminal state is
//! published.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use concierge_audio::device::{InputDevice, OutputDevice};
use concierge_audio::{CapturePipeline, FrameQueue, PlaybackScheduler, pcm};
use concierge_live::{Connector, Error as LiveError, ServerEvent, Transport};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{ConfigError, SessionError};
use crate::state::SessionState;
use crate::stats::{SessionStats, StatsRecorder};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One duplex voice conversation with the remote endpoint.
///
/// The UI-facing surface is [`start`](Self::start), [`stop`](Self::stop)
/// and [`is_active`](Self::is_active). Dropping the session stops it.
pub struct VoiceSession {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    input: Arc<dyn InputDevice>,
    output: Arc<dyn OutputDevice>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    error: Mutex<Option<SessionError>>,
    stats: Arc<StatsRecorder>,
}

impl VoiceSession {
    /// Creates an idle session. Nothing is acquired until [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        input: Arc<dyn InputDevice>,
        output: Arc<dyn OutputDevice>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                config,
                connector,
                input,
                output,
                state,
                cancel: CancellationToken::new(),
                error: Mutex::new(None),
                stats: Arc::new(StatsRecorder::default()),
            }),
        })
    }

    /// Returns the process-unique session identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Moves `Idle` to `Connecting` and starts the session in the background.
    ///
    /// Returns false, and does nothing, in any other state. Must be called
    /// from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            debug!("session {}: start ignored in state {}", self.inner.id, self.state());
            return false;
        }

        info!(
            "session {}: idle -> connecting (model {})",
            self.inner.id, self.inner.config.model
        );
        tokio::spawn(run(self.inner.clone()));
        true
    }

    /// Stops the session. Safe to call at any time, any number of times.
    ///
    /// An idle session moves straight to `Closed`. A connecting session
    /// abandons the connect and closes cleanly. An active session moves
    /// through `Closing` to `Closed`.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        let closed = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Closed;
                true
            } else {
                false
            }
        });
        if closed {
            info!("session {}: idle -> closed", self.inner.id);
        }
    }

    /// Returns true while audio is streaming.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Waits until the session reaches `Closed` or `Failed`.
    pub async fn wait(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Takes the error that moved the session to `Failed`, once.
    pub fn take_error(&self) -> Option<SessionError> {
        self.inner.error.lock().take()
    }

    /// Returns a snapshot of the session counters.
    pub fn stats(&self) -> SessionStats {
        self.inner.stats.snapshot()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn transition(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!("session {}: {} -> {}", self.id, prev, next);
        }
    }

    fn fail(&self, err: SessionError) {
        error!("session {} failed: {}", self.id, err);
        *self.error.lock() = Some(err);
        self.transition(SessionState::Failed);
    }
}

/// How the active phase ended.
enum Ending {
    Stopped,
    RemoteClosed,
    Failed(SessionError),
}

async fn run(inner: Arc<Inner>) {
    match drive(&inner).await {
        Ok(()) => inner.transition(SessionState::Closed),
        Err(err) => inner.fail(err),
    }
}

async fn drive(inner: &Inner) -> Result<(), SessionError> {
    let config = &inner.config;

    // Connecting: devices first, so a denied microphone never reaches the network.
    let mut capture = CapturePipeline::open(inner.input.as_ref(), config.capture_config())
        .map_err(SessionError::device)?;
    let mut output = inner
        .output
        .acquire(config.output_format())
        .map_err(SessionError::device)?;
    debug!(
        "session {}: acquired {} and {}",
        inner.id,
        inner.input.name(),
        inner.output.name()
    );

    let transport = match inner
        .connector
        .connect(&config.setup(), inner.cancel.clone())
        .await
    {
        Ok(transport) => transport,
        Err(e) => {
            capture.stop();
            output.close();
            if e.is_aborted() {
                debug!("session {}: connect aborted", inner.id);
                return Ok(());
            }
            return Err(SessionError::transport(e));
        }
    };

    if inner.cancel.is_cancelled() {
        capture.stop();
        close_transport(inner, transport.as_ref()).await;
        output.close();
        return Ok(());
    }

    // Open: start capture and arm the scheduler.
    let queue = match capture.start() {
        Ok(queue) => queue,
        Err(e) => {
            close_transport(inner, transport.as_ref()).await;
            output.close();
            return Err(SessionError::device(e));
        }
    };
    inner.stats.attach_capture(queue.clone());
    let mut scheduler = PlaybackScheduler::new(output);
    inner.transition(SessionState::Active);

    let mut sender = tokio::spawn(send_loop(
        inner.id,
        queue,
        transport.clone(),
        inner.stats.clone(),
    ));

    let ending = receive_loop(inner, transport.as_ref(), &mut scheduler, &mut sender).await;

    if matches!(ending, Ending::Stopped | Ending::RemoteClosed) {
        inner.transition(SessionState::Closing);
    }
    capture.stop();
    sender.abort();
    scheduler.reset();
    close_transport(inner, transport.as_ref()).await;
    if matches!(ending, Ending::Stopped) {
        await_close(inner, transport.as_ref()).await;
    }
    scheduler.close();

    let stats = inner.stats.snapshot();
    debug!(
        "session {}: sent {} chunks, scheduled {}, dropped {} frames, {} malformed",
        inner.id,
        stats.chunks_sent,
        stats.chunks_scheduled,
        stats.frames_dropped,
        stats.malformed_chunks
    );

    match ending {
        Ending::Failed(err) => Err(err),
        Ending::Stopped | Ending::RemoteClosed => Ok(()),
    }
}

// Ends quietly when the queue closes or the transport has been closed; any
// other send error is a network failure.
async fn send_loop(
    id: u64,
    queue: FrameQueue,
    transport: Arc<dyn Transport>,
    stats: Arc<StatsRecorder>,
) -> Result<(), SessionError> {
    while let Some(frame) = queue.recv().await {
        let chunk = pcm::encode(&frame);
        match transport.send_audio(&chunk).await {
            Ok(()) => stats.chunk_sent(),
            Err(LiveError::SessionClosed) => {
                debug!("session {}: transport closed, send loop stopped", id);
                return Ok(());
            }
            Err(e) => return Err(SessionError::transport(e)),
        }
    }
    Ok(())
}

async fn receive_loop(
    inner: &Inner,
    transport: &dyn Transport,
    scheduler: &mut PlaybackScheduler,
    sender: &mut JoinHandle<Result<(), SessionError>>,
) -> Ending {
    let mut sending = true;
    loop {
        let event = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => return Ending::Stopped,
            joined = &mut *sender, if sending => {
                sending = false;
                match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => return Ending::Failed(err),
                    Err(e) => {
                        return Ending::Failed(SessionError::Transport(format!(
                            "send task ended: {}",
                            e
                        )));
                    }
                }
            }
            event = transport.recv() => event,
        };
        match event {
            None => {
                info!("session {}: closed by remote", inner.id);
                return Ending::RemoteClosed;
            }
            Some(Err(e)) => return Ending::Failed(SessionError::transport(e)),
            Some(Ok(event)) => {
                if let Err(err) = handle_event(inner, scheduler, event) {
                    return Ending::Failed(err);
                }
            }
        }
    }
}

fn handle_event(
    inner: &Inner,
    scheduler: &mut PlaybackScheduler,
    event: ServerEvent,
) -> Result<(), SessionError> {
    match event {
        ServerEvent::Audio(chunk) => {
            inner.stats.chunk_received();
            match scheduler.schedule_chunk(&chunk) {
                Ok(_) => inner.stats.chunk_scheduled(),
                Err(e) if e.is_per_chunk() => inner.stats.chunk_malformed(),
                Err(e) => return Err(SessionError::device(e)),
            }
        }
        ServerEvent::MalformedAudio(reason) => {
            inner.stats.chunk_received();
            inner.stats.chunk_malformed();
            warn!("session {}: dropping inbound audio: {}", inner.id, reason);
        }
        ServerEvent::Interrupted => {
            inner.stats.interrupted();
            info!("session {}: model turn interrupted", inner.id);
        }
        ServerEvent::TurnComplete => {
            inner.stats.turn_completed();
            debug!("session {}: turn complete", inner.id);
        }
        ServerEvent::Text(text) => debug!("session {}: text: {}", inner.id, text),
        ServerEvent::GoAway { time_left } => {
            warn!("session {}: endpoint going away (time left {:?})", inner.id, time_left);
        }
        ServerEvent::SetupComplete => debug!("session {}: duplicate setup ack", inner.id),
    }
    Ok(())
}

// Bounded by the close grace so a stalled transport cannot hold the devices.
async fn close_transport(inner: &Inner, transport: &dyn Transport) {
    match tokio::time::timeout(inner.config.close_grace(), transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("session {}: close error: {}", inner.id, e),
        Err(_) => warn!("session {}: transport close timed out", inner.id),
    }
}

// Drains trailing events until the endpoint acknowledges the close or the
// grace period runs out.
async fn await_close(inner: &Inner, transport: &dyn Transport) {
    let grace = inner.config.close_grace();
    let drain = async {
        while let Some(event) = transport.recv().await {
            if let Err(e) = event {
                debug!("session {}: error while closing: {}", inner.id, e);
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(
            "session {}: close not acknowledged within {:?}",
            inner.id, grace
        );
    }
}

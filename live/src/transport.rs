//! Transport traits for the duplex speech channel.

use std::sync::Arc;

use async_trait::async_trait;
use concierge_audio::EncodedChunk;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::ServerEvent;
use crate::types::SetupConfig;

/// An open duplex channel to the remote speech endpoint.
///
/// Implementations are shared between the task that sends microphone
/// audio and the task that receives model output, so every method takes
/// `&self`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one chunk of microphone audio.
    ///
    /// Chunks are delivered in call order. Returns
    /// [`Error::SessionClosed`](crate::Error::SessionClosed) after close.
    async fn send_audio(&self, chunk: &EncodedChunk) -> Result<()>;

    /// Receives the next event.
    ///
    /// Returns `None` once the channel has closed cleanly, and
    /// `Some(Err(_))` if it failed.
    async fn recv(&self) -> Option<Result<ServerEvent>>;

    /// Starts closing the channel. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Returns true once close has been requested or the channel is gone.
    fn is_closed(&self) -> bool;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a channel and sends `setup`.
    ///
    /// Resolves once the endpoint acknowledges the setup. If `cancel` fires
    /// first, the attempt is abandoned and
    /// [`Error::SessionAborted`](crate::Error::SessionAborted) is returned.
    async fn connect(
        &self,
        setup: &SetupConfig,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn Transport>>;
}

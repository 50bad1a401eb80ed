//! Duplex voice session for the concierge widget.
//!
//! Ties the audio pipeline in `concierge-audio` to the live transport in
//! `concierge-live` behind a small lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Active -> Closing -> Closed
//!             |            |
//!             +-> Failed <-+
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use concierge_audio::device::memory::{MemoryInput, MemoryOutput};
//! use concierge_live::Client;
//! use concierge_session::{SessionConfig, VoiceSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::with_instruction("You help customers book a deep clean.");
//! let session = VoiceSession::new(
//!     config,
//!     Arc::new(Client::from_env()?),
//!     Arc::new(MemoryInput::new()),
//!     Arc::new(MemoryOutput::new()),
//! )?;
//!
//! session.start();
//! // ... later, from the UI
//! session.stop();
//! let state = session.wait().await;
//! println!("session ended: {}", state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::SessionConfig;
pub use error::{ConfigError, SessionError};
pub use session::VoiceSession;
pub use state::SessionState;
pub use stats::SessionStats;

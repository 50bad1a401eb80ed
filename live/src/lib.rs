//! Duplex realtime speech transport.
//!
//! A session is opened by sending a `setup` message over a WebSocket and
//! waiting for `setupComplete`. After that, microphone audio flows out as
//! `realtimeInput` messages and synthesized speech flows back as inline
//! audio parts of `serverContent`.
//!
//! # Example
//!
//! ```rust,no_run
//! use concierge_live::{Client, Connector, ServerEvent, SetupConfig, MODEL_GEMINI_FLASH_NATIVE_AUDIO};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> concierge_live::Result<()> {
//! let client = Client::from_env()?;
//! let setup = SetupConfig::audio(MODEL_GEMINI_FLASH_NATIVE_AUDIO, "You answer questions about laundry pickup.");
//! let transport = client.connect(&setup, CancellationToken::new()).await?;
//!
//! while let Some(event) = transport.recv().await {
//!     match event? {
//!         ServerEvent::Audio(chunk) => println!("{} bytes of {}", chunk.len(), chunk.tag()),
//!         ServerEvent::TurnComplete => break,
//!         _ => {}
//!     }
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod transport;
pub mod types;
pub mod websocket;

pub use client::{Client, ClientBuilder, DEFAULT_WEBSOCKET_URL};
pub use error::{ApiError, Error, Result};
pub use event::{ServerEvent, ServerMessage, parse_events};
pub use transport::{Connector, Transport};
pub use types::*;
pub use websocket::WebSocketSession;

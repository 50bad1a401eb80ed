//! Server messages and the events derived from them.

use concierge_audio::{EncodedChunk, Format};
use serde::Deserialize;

use crate::error::{ApiError, Error, Result};

/// Format assumed for inbound audio when the mime type carries no rate.
pub const DEFAULT_INBOUND_FORMAT: Format = Format::MONO_24K;

// ============================================================================
// Wire messages
// ============================================================================

/// A message received from the remote endpoint.
///
/// At most one of the top-level fields is set per message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Acknowledges the setup message. The session is open after this.
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    /// Model output for the current turn.
    #[serde(default)]
    pub server_content: Option<ServerContent>,

    /// The endpoint will close the channel soon.
    #[serde(default)]
    pub go_away: Option<GoAway>,

    /// Error reported by the endpoint.
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Content of a model turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

/// The parts of a model turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single part of a model turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

/// Base64 payload with its mime type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

/// Notice that the endpoint is about to disconnect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

// ============================================================================
// Events
// ============================================================================

/// An event surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The endpoint accepted the setup message.
    SetupComplete,

    /// A chunk of synthesized speech.
    Audio(EncodedChunk),

    /// An inbound audio payload that could not be read. The session
    /// discards it and keeps going.
    MalformedAudio(String),

    /// Text emitted by the model.
    Text(String),

    /// The model finished its turn.
    TurnComplete,

    /// The model's turn was cut short by user speech.
    Interrupted,

    /// The endpoint will close the channel.
    GoAway { time_left: Option<String> },
}

impl ServerEvent {
    /// Returns a short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SetupComplete => "setup_complete",
            ServerEvent::Audio(_) => "audio",
            ServerEvent::MalformedAudio(_) => "malformed_audio",
            ServerEvent::Text(_) => "text",
            ServerEvent::TurnComplete => "turn_complete",
            ServerEvent::Interrupted => "interrupted",
            ServerEvent::GoAway { .. } => "go_away",
        }
    }
}

/// Parses one server message into the events it carries, in order.
///
/// An `error` object from the endpoint is returned as [`Error::Api`].
pub fn parse_events(text: &str) -> Result<Vec<ServerEvent>> {
    let msg: ServerMessage = serde_json::from_str(text)?;

    if let Some(err) = msg.error {
        return Err(Error::Api(err));
    }

    let mut events = Vec::new();
    if msg.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    events.push(audio_event(&inline));
                }
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    events.push(ServerEvent::Text(text));
                }
            }
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(go_away) = msg.go_away {
        events.push(ServerEvent::GoAway {
            time_left: go_away.time_left,
        });
    }

    Ok(events)
}

fn audio_event(inline: &InlineData) -> ServerEvent {
    let format = if inline.mime_type.is_empty() {
        Some(DEFAULT_INBOUND_FORMAT)
    } else {
        Format::from_mime(&inline.mime_type, DEFAULT_INBOUND_FORMAT)
    };
    let Some(format) = format else {
        return ServerEvent::MalformedAudio(format!("unsupported mime type {:?}", inline.mime_type));
    };
    match EncodedChunk::from_base64(format, &inline.data) {
        Ok(chunk) => ServerEvent::Audio(chunk),
        Err(e) => ServerEvent::MalformedAudio(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setup_complete() {
        let events = parse_events(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(events, vec![ServerEvent::SetupComplete]);
    }

    #[test]
    fn test_parse_audio_parts() {
        let text = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQD/fw=="}},
                        {"inlineData": {"mimeType": "audio/pcm", "data": "AAA="}}
                    ]
                }
            }
        }"#;
        let events = parse_events(text).unwrap();
        assert_eq!(events.len(), 2);

        let ServerEvent::Audio(ref chunk) = events[0] else {
            panic!("expected audio, got {:?}", events[0]);
        };
        assert_eq!(chunk.format(), Format::MONO_24K);
        assert_eq!(chunk.data(), &[0x01, 0x00, 0xff, 0x7f]);

        let ServerEvent::Audio(ref chunk) = events[1] else {
            panic!("expected audio, got {:?}", events[1]);
        };
        assert_eq!(chunk.format(), DEFAULT_INBOUND_FORMAT);
    }

    #[test]
    fn test_parse_bad_base64_is_malformed_audio() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"!!!"}}]}}}"#;
        let events = parse_events(text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "malformed_audio");
    }

    #[test]
    fn test_parse_unsupported_mime_is_malformed_audio() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/ogg","data":"AAA="}}]}}}"#;
        let events = parse_events(text).unwrap();
        assert!(matches!(events[0], ServerEvent::MalformedAudio(_)));
    }

    #[test]
    fn test_parse_turn_flags() {
        let text = r#"{"serverContent":{"interrupted":true}}"#;
        assert_eq!(parse_events(text).unwrap(), vec![ServerEvent::Interrupted]);

        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hello"}]},"turnComplete":true}}"#;
        assert_eq!(
            parse_events(text).unwrap(),
            vec![ServerEvent::Text("hello".into()), ServerEvent::TurnComplete]
        );
    }

    #[test]
    fn test_parse_go_away() {
        let events = parse_events(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
        assert_eq!(
            events,
            vec![ServerEvent::GoAway {
                time_left: Some("10s".into())
            }]
        );
    }

    #[test]
    fn test_parse_error() {
        let text = r#"{"error":{"code":400,"status":"INVALID_ARGUMENT","message":"bad model"}}"#;
        let err = parse_events(text).unwrap_err();
        match err {
            Error::Api(api) => {
                assert_eq!(api.code, Some(400));
                assert_eq!(api.message, "bad model");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_fields_ignored() {
        let events = parse_events(r#"{"usageMetadata":{"totalTokenCount":12}}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(parse_events("not json"), Err(Error::Json(_))));
    }
}

//! Session setup types and outbound messages.

use concierge_audio::EncodedChunk;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ============================================================================
// Models
// ============================================================================

/// Native-audio dialog model used by default.
pub const MODEL_GEMINI_FLASH_NATIVE_AUDIO: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

// ============================================================================
// Modalities
// ============================================================================

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Synthesized speech.
    #[default]
    Audio,
    /// Text.
    Text,
}

// ============================================================================
// Setup
// ============================================================================

/// Configuration sent once when the session opens.
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Model ID, with or without the `models/` prefix.
    pub model: String,

    /// Response modalities. Voice sessions use `[Audio]`.
    #[serde(default)]
    pub response_modalities: Vec<Modality>,

    /// Free-text description of the domain the assistant speaks to.
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            model: MODEL_GEMINI_FLASH_NATIVE_AUDIO.to_string(),
            response_modalities: vec![Modality::Audio],
            system_instruction: None,
        }
    }
}

impl SetupConfig {
    /// Creates an audio-response setup with the given system instruction.
    pub fn audio(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        let instruction = system_instruction.into();
        Self {
            model: model.into(),
            response_modalities: vec![Modality::Audio],
            system_instruction: if instruction.is_empty() {
                None
            } else {
                Some(instruction)
            },
        }
    }

    /// Returns the model resource name (`models/<id>`).
    pub fn model_resource(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    /// Builds the `setup` message that opens the session.
    pub fn to_message(&self) -> Value {
        let modalities = if self.response_modalities.is_empty() {
            vec![Modality::Audio]
        } else {
            self.response_modalities.clone()
        };

        let mut setup = json!({
            "model": self.model_resource(),
            "generationConfig": {
                "responseModalities": modalities,
            },
        });
        if let Some(ref instruction) = self.system_instruction {
            setup["systemInstruction"] = json!({
                "parts": [{ "text": instruction }],
            });
        }
        json!({ "setup": setup })
    }
}

/// Builds a `realtimeInput` message carrying one chunk of microphone audio.
pub fn realtime_input_message(chunk: &EncodedChunk) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": chunk.mime_type(),
                "data": chunk.to_base64(),
            }],
        },
    })
}

//! Wire messages for the realtime session
//!
//! JSON over WebSocket, camelCase field names. Outbound: one setup message
//! at open, then one media message per non-silent capture block. Inbound:
//! the subset of server content the client consumes — audio parts,
//! interruption flag, turn completion, and grounding citations.

use serde::{Deserialize, Serialize};

/// Mime type for outbound capture blocks
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ── Outbound ─────────────────────────────────────────────────────

/// Session open parameters, sent once after the socket opens
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: SessionSetup,
}

/// Model, response modality, voice, instruction, and tool configuration
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Tool declaration passed through to the endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<serde_json::Value>,
}

impl Tool {
    /// Web-search tool with default settings
    #[must_use]
    pub fn web_search() -> Self {
        Self {
            google_search: Some(serde_json::json!({})),
        }
    }
}

impl SetupMessage {
    /// Build the setup message from session open parameters
    #[must_use]
    pub fn new(
        model: String,
        voice_name: String,
        system_instruction: Option<String>,
        web_search: bool,
    ) -> Self {
        Self {
            setup: SessionSetup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
                        },
                    },
                },
                system_instruction: system_instruction.map(|text| SystemInstruction {
                    parts: vec![TextPart { text }],
                }),
                tools: if web_search {
                    vec![Tool::web_search()]
                } else {
                    Vec::new()
                },
            },
        }
    }
}

/// One encoded capture block on the wire
#[derive(Debug, Serialize)]
pub struct MediaMessage {
    pub media: MediaChunk,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub bytes: String,
    pub mime_type: &'static str,
}

impl MediaMessage {
    /// Wrap an encoded PCM block for transmission
    #[must_use]
    pub const fn audio(bytes: String) -> Self {
        Self {
            media: MediaChunk {
                bytes,
                mime_type: CAPTURE_MIME_TYPE,
            },
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────

/// Inbound server message (consumed subset; unknown fields ignored)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingMetadata {
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

/// External citation attached to a grounded response
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct WebSource {
    pub uri: String,
    pub title: Option<String>,
}

impl ServerMessage {
    /// Base64 audio payloads carried by this message, in order
    #[must_use]
    pub fn audio_payloads(&self) -> Vec<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|p| p.inline_data.as_ref())
                    .map(|d| d.data.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text fragments carried by this message, in order
    #[must_use]
    pub fn text_parts(&self) -> Vec<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the server signaled a barge-in interruption
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    /// Whether the server finished its response turn
    #[must_use]
    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.turn_complete)
            .unwrap_or(false)
    }

    /// Web citations attached to this message
    #[must_use]
    pub fn citations(&self) -> Vec<WebSource> {
        self.server_content
            .as_ref()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| {
                g.grounding_chunks
                    .iter()
                    .filter_map(|c| c.web.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_message_shape() {
        let msg = MediaMessage::audio("QUJD".to_string());
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["media"]["bytes"], "QUJD");
        assert_eq!(json["media"]["mimeType"], "audio/pcm;rate=16000");
    }

    #[test]
    fn test_setup_message_shape() {
        let msg = SetupMessage::new(
            "models/demo-live".to_string(),
            "Aoede".to_string(),
            Some("Be brief.".to_string()),
            true,
        );
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["setup"]["model"], "models/demo-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Aoede"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
        assert!(json["setup"]["tools"][0]["googleSearch"].is_object());
    }

    #[test]
    fn test_setup_omits_empty_optionals() {
        let msg = SetupMessage::new("m".to_string(), "v".to_string(), None, false);
        let json = serde_json::to_value(&msg).unwrap();

        assert!(json["setup"].get("systemInstruction").is_none());
        assert!(json["setup"].get("tools").is_none());
    }

    #[test]
    fn test_parse_audio_message() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                        { "text": "hello" }
                    ]
                }
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();

        assert_eq!(msg.audio_payloads(), vec!["AAAA"]);
        assert_eq!(msg.text_parts(), vec!["hello"]);
        assert!(!msg.is_interrupted());
    }

    #[test]
    fn test_parse_interruption_and_grounding() {
        let raw = r#"{
            "serverContent": {
                "interrupted": true,
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://example.com", "title": "Example" } },
                        { }
                    ]
                }
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();

        assert!(msg.is_interrupted());
        let citations = msg.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].uri, "https://example.com");
    }

    #[test]
    fn test_parse_unknown_fields_ignored() {
        let raw = r#"{ "toolCall": { "functionCalls": [] }, "usageMetadata": {} }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();

        assert!(msg.audio_payloads().is_empty());
        assert!(!msg.is_interrupted());
        assert!(msg.setup_complete.is_none());
    }
}

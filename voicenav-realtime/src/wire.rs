//! Vendor wire message types and translation.
//!
//! The hosted endpoint speaks a camelCase JSON protocol over a duplex
//! channel: one `setup` message on connect, then interleaved
//! `realtimeInput` / `toolResponse` / `clientContent` messages outbound and
//! `serverContent` / `toolCall` messages inbound. Translation into
//! [`ServerEvent`] happens here so it can be tested without a socket.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audio::AudioChunk;
use crate::config::{SessionConfig, ToolDefinition};
use crate::error::{RealtimeError, Result};
use crate::events::{ServerEvent, ToolInvocation, ToolResult};

/// Top-level client message. Exactly one field is populated per message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup: Option<Setup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<RealtimeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_response: Option<ToolResponseMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_content: Option<ClientContent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseMessage {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionResponse {
    id: String,
    name: String,
    response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContent {
    turns: Vec<Turn>,
    turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Turn {
    role: String,
    parts: Vec<Part>,
}

impl ClientMessage {
    fn empty() -> Self {
        Self { setup: None, realtime_input: None, tool_response: None, client_content: None }
    }

    /// The capability declaration sent once on connect.
    pub fn setup(config: &SessionConfig) -> Self {
        let mut generation_config = json!({
            "responseModalities": config
                .modalities
                .clone()
                .unwrap_or_else(|| vec!["AUDIO".to_string()]),
        });
        if let Some(voice) = &config.voice {
            generation_config["speechConfig"] = json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            });
        }
        if let Some(temp) = config.temperature {
            generation_config["temperature"] = json!(temp);
        }

        let system_instruction = config.instruction.clone().map(|text| Content {
            parts: vec![Part { text: Some(text), inline_data: None }],
        });

        Self {
            setup: Some(Setup {
                model: config.model.clone().unwrap_or_default(),
                system_instruction,
                generation_config: Some(generation_config),
                tools: convert_tools(config.tools.clone()),
            }),
            ..Self::empty()
        }
    }

    /// One captured audio chunk, base64-encoded with its mime type.
    pub fn audio(chunk: &AudioChunk) -> Self {
        Self {
            realtime_input: Some(RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: chunk.format.mime_type(),
                    data: chunk.to_base64(),
                }],
            }),
            ..Self::empty()
        }
    }

    /// A batch of tool acknowledgments. Each response references the
    /// originating invocation id and echoes the tool name.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            tool_response: Some(ToolResponseMessage {
                function_responses: results
                    .into_iter()
                    .map(|r| FunctionResponse { id: r.id, name: r.name, response: r.result })
                    .collect(),
            }),
            ..Self::empty()
        }
    }

    /// A free-text user turn.
    pub fn user_text(text: &str) -> Self {
        Self {
            client_content: Some(ClientContent {
                turns: vec![Turn {
                    role: "user".to_string(),
                    parts: vec![Part { text: Some(text.to_string()), inline_data: None }],
                }],
                turn_complete: true,
            }),
            ..Self::empty()
        }
    }

    /// Serialize to the wire representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Translate one inbound wire message into a unified event.
///
/// A `toolCall` batch of n functionCalls yields one [`ServerEvent::ToolCalls`]
/// carrying all n invocations, in wire order.
pub fn translate_server_message(raw: &str) -> Result<ServerEvent> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| RealtimeError::connection(format!("unparseable server message: {e}")))?;

    if value.get("setupComplete").is_some() {
        return Ok(ServerEvent::SessionReady);
    }

    if let Some(content) = value.get("serverContent") {
        if content.get("turnComplete").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(ServerEvent::TurnComplete);
        }

        if let Some(parts) = content.get("modelTurn").and_then(|t| t.get("parts")) {
            // A turn may split its audio across several parts; they are
            // contiguous PCM, so concatenate them in wire order.
            let mut audio = Vec::new();
            for part in parts.as_array().into_iter().flatten() {
                if let Some(data) =
                    part.get("inlineData").and_then(|d| d.get("data")).and_then(Value::as_str)
                {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(data)
                        .map_err(|e| RealtimeError::decode(format!("invalid audio base64: {e}")))?;
                    audio.extend_from_slice(&decoded);
                }
            }
            if !audio.is_empty() {
                return Ok(ServerEvent::Audio { data: audio });
            }
        }
    }

    if let Some(calls) = value.get("toolCall").and_then(|t| t.get("functionCalls")) {
        let calls: Vec<ToolInvocation> = calls
            .as_array()
            .into_iter()
            .flatten()
            .map(|call| ToolInvocation {
                id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                args: call.get("args").cloned().unwrap_or_else(|| json!({})),
            })
            .collect();
        return Ok(ServerEvent::ToolCalls { calls });
    }

    Ok(ServerEvent::Unknown)
}

fn convert_tools(tools: Option<Vec<ToolDefinition>>) -> Option<Vec<Value>> {
    tools.filter(|t| !t.is_empty()).map(|t_vec| {
        let function_declarations: Vec<Value> = t_vec
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description.unwrap_or_default(),
                    "parameters": t
                        .parameters
                        .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
                })
            })
            .collect();

        vec![json!({ "functionDeclarations": function_declarations })]
    })
}

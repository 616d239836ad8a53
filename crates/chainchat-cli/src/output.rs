//! Output formatting for CLI results.
//!
//! - Text: human-readable; single values are printed bare so they can be piped
//! - JSON: a `JsonResponse` envelope for scripting

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use chainchat_core::ReceivedMessage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// JSON envelope shared by every command.
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339
    pub timestamp: String,
    pub command: String,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str, command: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeygenOutput {
    pub username: String,
    pub path: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct TranscriptEntry {
    pub sender: String,
    pub receiver: String,
    pub timestamp: String,
    pub plaintext: String,
}

#[derive(Debug, Serialize)]
pub struct DemoOutput {
    pub chat_id: String,
    pub messages: Vec<TranscriptEntry>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// A single value, e.g. an envelope or a chat id.
    pub fn format_value(&self, key: &str, value: &str, command: &str) -> String {
        match self.format {
            OutputFormat::Text => value.to_string(),
            OutputFormat::Json => {
                let mut data = serde_json::Map::new();
                data.insert(key.to_string(), serde_json::Value::String(value.to_string()));
                to_json(&JsonResponse::success(data, command))
            }
        }
    }

    pub fn format_keygen(&self, out: &KeygenOutput) -> String {
        match self.format {
            OutputFormat::Text => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Field", "Value"]);
                table.add_row(vec!["Username", out.username.as_str()]);
                table.add_row(vec!["Key file", out.path.as_str()]);
                table.add_row(vec!["Public key", out.public_key.as_str()]);
                table.to_string()
            }
            OutputFormat::Json => to_json(&JsonResponse::success(out, "keygen")),
        }
    }

    pub fn format_verify(&self, valid: bool) -> String {
        match self.format {
            OutputFormat::Text => (if valid { "valid" } else { "invalid" }).to_string(),
            OutputFormat::Json => to_json(&JsonResponse::success(VerifyOutput { valid }, "verify")),
        }
    }

    /// Transcript of a demo exchange; `names` maps key text to a display name.
    pub fn format_transcript(
        &self,
        chat_id: &str,
        messages: &[ReceivedMessage],
        names: &dyn Fn(&str) -> String,
    ) -> String {
        let entries: Vec<TranscriptEntry> = messages
            .iter()
            .map(|m| TranscriptEntry {
                sender: names(&m.sender),
                receiver: names(&m.receiver),
                timestamp: m.timestamp.to_rfc3339(),
                plaintext: m.plaintext.clone(),
            })
            .collect();

        match self.format {
            OutputFormat::Text => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["#", "From", "To", "Time", "Message"]);
                for (i, e) in entries.iter().enumerate() {
                    table.add_row(vec![
                        (i + 1).to_string(),
                        e.sender.clone(),
                        e.receiver.clone(),
                        e.timestamp.clone(),
                        e.plaintext.clone(),
                    ]);
                }
                format!("Chat {chat_id}\n{table}")
            }
            OutputFormat::Json => to_json(&JsonResponse::success(
                DemoOutput {
                    chat_id: chat_id.to_string(),
                    messages: entries,
                },
                "demo",
            )),
        }
    }

    pub fn format_error(&self, message: &str, command: &str) -> String {
        match self.format {
            OutputFormat::Text => format!("Error: {message}"),
            OutputFormat::Json => to_json(&JsonResponse::error(message, command)),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"serialization failed: {e}\"}}"))
}

//! Command execution.

use crate::Commands;
use colored::Colorize;
use muxrpc_client::{Client, InboundMessage};
use muxrpc_protocol::MessageKind;
use serde_json::Value;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Call { method, args } => {
            let args = match args {
                Some(arg) => parse_json_arg(&arg)?,
                None => empty_args(),
            };
            call(client, &method, args).await
        }

        // These are handled directly in main.rs
        Commands::Repl | Commands::Watch { .. } | Commands::ShowConfig => unreachable!(),
    }
}

/// Calls `method` and formats the JSON result.
pub async fn call(
    client: &Client,
    method: &str,
    args: Value,
) -> Result<String, Box<dyn std::error::Error>> {
    validate_method(method)?;
    let result = client.call_value(method, args).await?;
    Ok(format_json(&result))
}

/// Arguments sent when a call names none.
pub fn empty_args() -> Value {
    Value::Object(Default::default())
}

/// Checks that a method name has the `Service.Method` shape.
pub fn validate_method(method: &str) -> Result<(), String> {
    match method.split_once('.') {
        Some((service, name)) if !service.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(format!(
            "invalid method name '{}' (expected Service.Method)",
            method
        )),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Parses a message kind given as a hex byte, with or without `0x`.
pub fn parse_kind(arg: &str) -> Result<MessageKind, Box<dyn std::error::Error>> {
    let digits = arg.trim_start_matches("0x");
    let bytes = hex::decode(digits)?;
    match bytes.as_slice() {
        [byte] => Ok(MessageKind::from_byte(*byte)),
        _ => Err(format!("message kind must be a single byte, got '{}'", arg).into()),
    }
}

/// Formats an unsolicited message for display.
///
/// JSON bodies are printed compactly; anything else is shown as hex.
pub fn format_message(message: &InboundMessage) -> String {
    let kind = format!("[{:02x}]", message.kind.as_byte());
    let body = message.message.get(1..).unwrap_or_default();
    let text = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => hex::encode(body),
    };
    format!("{} {}", kind.cyan(), text)
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

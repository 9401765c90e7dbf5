//! Output mode shared by every CLI command
//!
//! Human mode prints themed text; JSON mode prints exactly one envelope per
//! command: `{"ok": true, "command": ..., "data": ...}` on success and
//! `{"ok": false, "command": ..., "error": ...}` on failure.

use serde::Serialize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `XREPO_QUIET=1` suppresses decorative human output
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("XREPO_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    pub fn is_human(&self) -> bool {
        *self == Self::Human
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn success_envelope<T: Serialize>(command: &str, data: T) -> anyhow::Result<String> {
    let envelope = Envelope { ok: true, command, data: Some(data), error: None };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn error_envelope(command: &str, error: &str) -> anyhow::Result<String> {
    let envelope: Envelope<'_, ()> = Envelope {
        ok: false,
        command,
        data: None,
        error: Some(error.to_string()),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Print a success envelope; no-op in human mode
pub fn emit_success<T: Serialize>(mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", success_envelope(command, data)?);
    }
    Ok(())
}

pub fn emit_error(mode: OutputMode, command: &str, error: &anyhow::Error) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => println!("{}", error_envelope(command, &format!("{:#}", error))?),
        OutputMode::Human => crate::ui::error(&format!("{:#}", error)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let text = success_envelope("stats", serde_json::json!({"dumps": 3})).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "stats");
        assert_eq!(value["data"]["dumps"], 3);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let text = error_envelope("resolve", "Operation canceled").unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "Operation canceled");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_mode_from_flag() {
        assert!(OutputMode::from_json_flag(false).is_human());
        assert_eq!(OutputMode::from_json_flag(true), OutputMode::Json);
    }
}

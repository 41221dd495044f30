use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

const DEFAULT_API_LOG_PATH: &str = "/tmp/citeflow-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "CITEFLOW_DEBUG_PAYLOAD";
const API_LOG_PATH_ENV: &str = "CITEFLOW_API_LOG_PATH";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "CITEFLOW_API DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_header_parse_error(header_line: &str, parse_error: &serde_json::Error) {
    let message = format!(
        "CITEFLOW_API ERROR header_parse_failed error={parse_error}\nline:\n{header_line}\n"
    );
    emit_log_message(&message);
}

pub fn emit_thread_refresh_error(error: &anyhow::Error) {
    emit_log_message(&format!(
        "CITEFLOW_API WARN thread_refresh_failed error={error}\n"
    ));
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprintln!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(API_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_API_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

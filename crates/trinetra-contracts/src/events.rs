use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of application events.
///
/// Each line is one compact object carrying `type`, `run_id` and `ts`, followed by the
/// caller's payload (payload keys win on collision). A log built with
/// [`EventLog::disabled`] still assembles events but writes nothing, so call sites
/// never branch on whether logging is on.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: Option<PathBuf>,
    run_id: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self::with_path(Some(path.into()), run_id.into())
    }

    pub fn disabled(run_id: impl Into<String>) -> Self {
        Self::with_path(None, run_id.into())
    }

    fn with_path(path: Option<PathBuf>, run_id: String) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path,
                run_id,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Builds an [`EventPayload`] from a `json!({...})` object literal.
pub fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = EventLog::new(&path, "run-42");

        let emitted = log.emit("session_created", payload(json!({"key": "chat"})))?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("session_created"));
        assert_eq!(parsed["run_id"], json!("run-42"));
        assert_eq!(parsed["key"], json!("chat"));
        DateTime::parse_from_rfc3339(parsed["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_keys_override_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = EventLog::new(temp.path().join("events.jsonl"), "run-42");

        let emitted = log.emit("reply_received", payload(json!({"run_id": "other"})))?;

        assert_eq!(emitted["type"], json!("reply_received"));
        assert_eq!(emitted["run_id"], json!("other"));
        Ok(())
    }

    #[test]
    fn emit_appends_one_line_per_event() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path, "run-42");

        log.emit("message_sent", EventPayload::new())?;
        log.emit("reply_received", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let types: Vec<Value> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .map(|row| row["type"].clone())
            .collect();
        assert_eq!(types, vec![json!("message_sent"), json!("reply_received")]);
        Ok(())
    }

    #[test]
    fn disabled_log_builds_events_without_writing() -> anyhow::Result<()> {
        let log = EventLog::disabled("run-0");
        assert!(log.path().is_none());

        let emitted = log.emit("view_changed", payload(json!({"view": "chat"})))?;
        assert_eq!(emitted["view"], json!("chat"));
        assert_eq!(emitted["run_id"], json!("run-0"));
        Ok(())
    }
}

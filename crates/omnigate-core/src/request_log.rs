//! Optional per-request debug log written to disk off the data path.
//!
//! Records go through a bounded channel with `try_send`; a full or closed
//! channel drops the record. Write failures are logged and swallowed.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::warn;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::Headers;

/// Cap on stream bytes kept per record.
pub const MAX_LOG_BODY_BYTES: usize = 1024 * 1024;
pub const LOG_CHANNEL_CAPACITY: usize = 256;

/// Append up to `cap` bytes total. Returns `true` if anything was cut.
pub fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    if buf.len() >= cap {
        return !chunk.is_empty();
    }
    let take = cap.saturating_sub(buf.len()).min(chunk.len());
    buf.extend_from_slice(&chunk[..take]);
    take < chunk.len()
}

/// Header names containing `auth`, `key` or `token` keep only their first 10 chars.
pub fn mask_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            if lower.contains("auth") || lower.contains("key") || lower.contains("token") {
                let head: String = value.chars().take(10).collect();
                let masked = if value.is_empty() {
                    String::new()
                } else {
                    format!("{head}...")
                };
                (name.clone(), masked)
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

fn headers_json(headers: &Headers) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect(),
    )
}

#[derive(Debug)]
struct LogRecord {
    dir: Arc<str>,
    file: &'static str,
    content: Vec<u8>,
}

/// Owns the writer task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestLogSink {
    tx: mpsc::Sender<LogRecord>,
    seq: Arc<AtomicU64>,
}

impl RequestLogSink {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(root: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<LogRecord>(LOG_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let dir = root.join(&*record.dir);
                if let Err(err) = tokio::fs::create_dir_all(&dir).await {
                    warn!(event = "request_log_write_failed", dir = %dir.display(), error = %err);
                    continue;
                }
                let path = dir.join(record.file);
                if let Err(err) = tokio::fs::write(&path, &record.content).await {
                    warn!(event = "request_log_write_failed", path = %path.display(), error = %err);
                }
            }
        });
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A log handle for one request, stored under `<seq>_<source>_<target>_<model>/`.
    pub fn session(&self, source: WireFormat, target: WireFormat, model: &str) -> RequestLog {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let model: String = model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        RequestLog {
            inner: Some(Arc::new(Session {
                tx: self.tx.clone(),
                dir: format!("{seq:06}_{source}_{target}_{model}").into(),
            })),
        }
    }
}

#[derive(Debug)]
struct Session {
    tx: mpsc::Sender<LogRecord>,
    dir: Arc<str>,
}

/// Per-request logger. The default value logs nothing.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    inner: Option<Arc<Session>>,
}

impl RequestLog {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn client_raw_request(&self, endpoint: &str, body: &Value, headers: &Headers) {
        self.json(
            "0_client_raw_request.json",
            json!({
                "endpoint": endpoint,
                "headers": headers_json(&mask_headers(headers)),
                "body": body,
            }),
        );
    }

    pub fn raw_request(&self, body: &Value) {
        self.json("1_raw_request.json", body.clone());
    }

    pub fn format_info(&self, source: WireFormat, target: WireFormat, provider: &str, model: &str, stream: bool) {
        self.json(
            "1a_format_info.json",
            json!({
                "sourceFormat": source,
                "targetFormat": target,
                "provider": provider,
                "model": model,
                "stream": stream,
            }),
        );
    }

    pub fn converted_request(&self, url: &str, headers: &Headers, body: &Value) {
        self.json(
            "2_converted_request.json",
            json!({
                "url": url,
                "headers": headers_json(&mask_headers(headers)),
                "body": body,
            }),
        );
    }

    pub fn upstream_response(&self, status: u16, body: &[u8]) {
        let mut content = Vec::new();
        append_capped(&mut content, body, MAX_LOG_BODY_BYTES);
        self.json(
            "3_upstream_response.json",
            json!({"status": status, "body": String::from_utf8_lossy(&content)}),
        );
    }

    pub fn upstream_stream(&self, bytes: Vec<u8>) {
        self.raw("3_upstream_stream.txt", bytes);
    }

    pub fn client_stream(&self, bytes: Vec<u8>) {
        self.raw("4_client_stream.txt", bytes);
    }

    pub fn error(&self, message: &str, body: Option<&Value>) {
        self.json(
            "6_error.json",
            json!({"error": message, "requestBody": body}),
        );
    }

    fn json(&self, file: &'static str, value: Value) {
        if self.inner.is_none() {
            return;
        }
        match serde_json::to_vec_pretty(&value) {
            Ok(content) => self.raw(file, content),
            Err(err) => warn!(event = "request_log_encode_failed", file, error = %err),
        }
    }

    fn raw(&self, file: &'static str, content: Vec<u8>) {
        let Some(session) = &self.inner else {
            return;
        };
        let record = LogRecord {
            dir: session.dir.clone(),
            file,
            content,
        };
        // Full or closed: drop the record rather than stall the request.
        let _ = session.tx.try_send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn secrets_are_truncated() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer sk-0123456789abcdef".to_string()),
            ("x-api-key".to_string(), "short".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        let masked = mask_headers(&headers);
        assert_eq!(masked[0].1, "Bearer sk-...");
        assert_eq!(masked[1].1, "short...");
        assert_eq!(masked[2].1, "application/json");
    }

    #[test]
    fn capped_append() {
        let mut buf = Vec::new();
        assert!(!append_capped(&mut buf, b"abc", 5));
        assert!(append_capped(&mut buf, b"defg", 5));
        assert_eq!(buf, b"abcde");
        assert!(append_capped(&mut buf, b"x", 5));
    }

    #[tokio::test]
    async fn records_land_in_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RequestLogSink::spawn(dir.path().to_path_buf());
        let log = sink.session(WireFormat::Claude, WireFormat::OpenAIChat, "gpt-4o/mini");
        log.raw_request(&json!({"model": "gpt-4o"}));
        log.upstream_stream(b"data: x\n\n".to_vec());

        let session = dir.path().join("000001_anthropic-messages_openai-chat_gpt-4o_mini");
        let expected = session.join("3_upstream_stream.txt");
        for _ in 0..100 {
            if std::fs::read(&expected).is_ok_and(|content| content == b"data: x\n\n") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(&expected).unwrap(), b"data: x\n\n");
        let raw: Value = serde_json::from_slice(&std::fs::read(session.join("1_raw_request.json")).unwrap()).unwrap();
        assert_eq!(raw["model"], "gpt-4o");
    }

    #[test]
    fn disabled_log_is_inert() {
        let log = RequestLog::disabled();
        assert!(!log.is_enabled());
        log.error("nothing happens", None);
    }
}

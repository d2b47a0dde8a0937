// channel.rs — Where escalation notices go.
//
// Publishing is fire-and-forget from the router's point of view: a channel
// either accepts a notice or returns an error, and the caller decides what a
// failed publish means. Duplicate notices are harmless downstream.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::RouterError;
use crate::notice::EscalationNotice;

pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, notice: &EscalationNotice) -> Result<(), RouterError>;
}

/// Appends notices as JSONL to a local file.
pub struct LogChannel {
    path: PathBuf,
}

impl LogChannel {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&self, notice: &EscalationNotice) -> Result<(), RouterError> {
        let json = serde_json::to_string(notice)?;
        append_line(&self.path, &json)
    }
}

/// Append `line` to `path`, creating the file and its parent as needed.
pub(crate) fn append_line(path: &Path, line: &str) -> Result<(), RouterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RouterError::IoError {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RouterError::IoError {
            path: path.display().to_string(),
            source,
        })?;

    writeln!(file, "{}", line).map_err(|source| RouterError::IoError {
        path: path.display().to_string(),
        source,
    })
}

/// POSTs each notice as JSON to a notification topic endpoint.
pub struct TopicChannel {
    client: Client,
    url: String,
}

impl TopicChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RouterError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::PublishError {
                channel: url.clone(),
                request_id: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NotificationChannel for TopicChannel {
    fn name(&self) -> &str {
        "topic"
    }

    fn publish(&self, notice: &EscalationNotice) -> Result<(), RouterError> {
        let failed = |reason: String| RouterError::PublishError {
            channel: self.url.clone(),
            request_id: notice.request_id.clone(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(failed(format!("{} {}", status, body.trim())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn notice(request_id: &str) -> EscalationNotice {
        EscalationNotice {
            request_id: request_id.to_string(),
            reason: "low-confidence".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            model_id: "model-a".to_string(),
            confidence_score: Some(0.3),
        }
    }

    #[test]
    fn log_channel_appends_jsonl() {
        let dir = tempdir().unwrap();
        let channel = LogChannel::new(dir.path().join("nested/notices.jsonl"));

        channel.publish(&notice("req-1")).unwrap();
        channel.publish(&notice("req-2")).unwrap();

        let content = fs::read_to_string(channel.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: EscalationNotice = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, notice("req-1"));
        assert!(lines[1].contains("\"requestId\":\"req-2\""));
    }

    #[test]
    fn topic_channel_reports_unreachable_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel =
            TopicChannel::new(format!("http://{}/notices", addr), Duration::from_secs(2)).unwrap();
        let err = channel.publish(&notice("req-3")).unwrap_err();
        assert!(matches!(
            err,
            RouterError::PublishError { ref request_id, .. } if request_id == "req-3"
        ));
    }
}

// route.rs — Route a JSONL stream of invocation events.
//
// Each non-blank line is evaluated independently. Malformed lines and failed
// publishes are counted and never stop the stream; the summary tells the
// caller what happened. Malformed lines can be kept in a dead-letter log for
// later inspection.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::channel::{append_line, NotificationChannel};
use crate::error::RouterError;
use crate::router::Router;

/// Counters for one routing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    /// Well-formed events evaluated.
    pub evaluated: usize,
    /// Notices produced (published or not).
    pub escalated: usize,
    pub malformed: usize,
    pub publish_failures: usize,
}

/// A line that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub received_at: DateTime<Utc>,
    pub line_number: usize,
    pub reason: String,
    pub line: String,
}

/// JSONL log of malformed input lines.
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn record(&self, entry: &DeadLetter) -> Result<(), RouterError> {
        let json = serde_json::to_string(entry)?;
        append_line(&self.path, &json)
    }
}

/// Evaluate every line of `reader` and publish the resulting notices.
///
/// Only failures to read the input or to write the dead-letter log abort
/// the pass.
pub fn route_lines<R: BufRead>(
    reader: R,
    router: &Router,
    channel: &dyn NotificationChannel,
    dead_letter: Option<&DeadLetterLog>,
) -> Result<RouteSummary, RouterError> {
    let mut summary = RouteSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|source| RouterError::IoError {
            path: format!("<input line {}>", line_number),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let notice = match router.evaluate_line(&line) {
            Ok(notice) => notice,
            Err(e) => {
                summary.malformed += 1;
                warn!(line = line_number, "skipping malformed event: {}", e);
                if let Some(log) = dead_letter {
                    log.record(&DeadLetter {
                        received_at: Utc::now(),
                        line_number,
                        reason: e.to_string(),
                        line,
                    })?;
                }
                continue;
            }
        };

        summary.evaluated += 1;
        let Some(notice) = notice else {
            continue;
        };
        summary.escalated += 1;

        if let Err(e) = channel.publish(&notice) {
            summary.publish_failures += 1;
            warn!(request_id = %notice.request_id, channel = channel.name(), "publish failed: {}", e);
        }
    }

    info!(
        evaluated = summary.evaluated,
        escalated = summary.escalated,
        malformed = summary.malformed,
        publish_failures = summary.publish_failures,
        "routing pass complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LogChannel;
    use crate::notice::EscalationNotice;
    use std::fs;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const INPUT: &str = r#"{"requestId":"a","confidenceScore":0.2,"timestamp":"2026-03-01T12:00:00Z","modelId":"m"}
{"requestId":"b","confidenceScore":0.9,"timestamp":"2026-03-01T12:00:01Z","modelId":"m"}

{"requestId":"c","timestamp":"2026-03-01T12:00:02Z","modelId":"m"}
{"requestId":"d","confidenceScore":0.1,"modelId":"m"}
not json at all
{"requestId":"e","confidenceScore":0.59,"timestamp":"2026-03-01T12:00:04Z","modelId":"m"}
"#;

    /// Collects notices in memory; can be told to reject everything.
    #[derive(Default)]
    struct Collecting {
        notices: Mutex<Vec<EscalationNotice>>,
        reject: bool,
    }

    impl NotificationChannel for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }

        fn publish(&self, notice: &EscalationNotice) -> Result<(), RouterError> {
            if self.reject {
                return Err(RouterError::PublishError {
                    channel: "collecting".to_string(),
                    request_id: notice.request_id.clone(),
                    reason: "rejected".to_string(),
                });
            }
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    #[test]
    fn routes_mixed_stream() {
        let channel = Collecting::default();
        let summary = route_lines(Cursor::new(INPUT), &Router::default(), &channel, None).unwrap();

        assert_eq!(
            summary,
            RouteSummary {
                evaluated: 4,
                escalated: 2,
                malformed: 2,
                publish_failures: 0,
            }
        );
        let ids: Vec<String> = channel
            .notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.request_id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "e"]);
    }

    #[test]
    fn publish_failures_are_counted_not_fatal() {
        let channel = Collecting {
            reject: true,
            ..Default::default()
        };
        let summary = route_lines(Cursor::new(INPUT), &Router::default(), &channel, None).unwrap();
        assert_eq!(summary.escalated, 2);
        assert_eq!(summary.publish_failures, 2);
    }

    #[test]
    fn malformed_lines_go_to_dead_letter_log() {
        let dir = tempdir().unwrap();
        let dead_path = dir.path().join("dead-letter.jsonl");
        let dead_letter = DeadLetterLog::new(&dead_path);
        let channel = LogChannel::new(dir.path().join("notices.jsonl"));

        route_lines(
            Cursor::new(INPUT),
            &Router::default(),
            &channel,
            Some(&dead_letter),
        )
        .unwrap();

        let content = fs::read_to_string(&dead_path).unwrap();
        let entries: Vec<DeadLetter> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line_number, 5);
        assert!(entries[0].reason.contains("missing timestamp"));
        assert_eq!(entries[1].line, "not json at all");

        let notices = fs::read_to_string(channel.path()).unwrap();
        assert_eq!(notices.lines().count(), 2);
    }
}

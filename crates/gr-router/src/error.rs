// error.rs — Error types for the escalation router.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// An invocation record that cannot be evaluated. No notice is produced.
    #[error("malformed event: {reason}")]
    MalformedEvent {
        reason: String,
        /// Present when the record carried a readable request id.
        request_id: Option<String>,
    },

    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("failed to publish notice {request_id} to {channel}: {reason}")]
    PublishError {
        channel: String,
        request_id: String,
        reason: String,
    },

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RouterError {
    pub(crate) fn malformed(reason: impl Into<String>, request_id: Option<&str>) -> Self {
        RouterError::MalformedEvent {
            reason: reason.into(),
            request_id: request_id.map(str::to_string),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RouterError::MalformedEvent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_keeps_request_id_when_known() {
        let err = RouterError::malformed("missing timestamp", Some("req-9"));
        assert_eq!(err.to_string(), "malformed event: missing timestamp");
        assert!(err.is_malformed());
        assert!(matches!(
            err,
            RouterError::MalformedEvent { request_id: Some(ref id), .. } if id == "req-9"
        ));
    }
}

use thiserror::Error;

/// Typed failure surface of the remote backend. Callers decide retry policy:
/// only `is_transient` errors are eligible for polling-style retry, and only
/// for idempotent status reads.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input detected before or by the backend. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The backend refused the request (4xx). Surfaced immediately.
    #[error("backend rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        /// Machine error code, when the backend supplies one.
        code: Option<String>,
    },

    /// Network failure or 5xx; the operation may succeed later.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something we could not decode.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        let (message, code) = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(v) => (
                v.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or(&body)
                    .to_string(),
                v.get("code").and_then(|c| c.as_str()).map(str::to_string),
            ),
            Err(_) => (body, None),
        };
        if status >= 500 {
            Self::Unavailable(format!("HTTP {status}: {message}"))
        } else {
            Self::Rejected {
                status,
                message,
                code,
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_xx_maps_to_unavailable() {
        let err = ApiError::from_status(503, "overloaded".into());
        assert!(err.is_transient());
    }

    #[test]
    fn four_xx_maps_to_rejected_with_code() {
        let err = ApiError::from_status(
            422,
            r#"{"message":"empty file","code":"UploadRejected"}"#.into(),
        );
        match err {
            ApiError::Rejected {
                status,
                message,
                code,
            } => {
                assert_eq!(status, 422);
                assert_eq!(message, "empty file");
                assert_eq!(code.as_deref(), Some("UploadRejected"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!ApiError::from_status(400, "bad".into()).is_transient());
    }
}

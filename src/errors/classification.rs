use super::types::MarketdeskError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl MarketdeskError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            MarketdeskError::Transport(_) => ErrorClassification {
                error_type: "TransportError",
                retryable: true,
            },
            MarketdeskError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            MarketdeskError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            MarketdeskError::Backend(_) => ErrorClassification {
                error_type: "BackendError",
                retryable: true,
            },
            MarketdeskError::WebSocket(_) => ErrorClassification {
                error_type: "WebSocketError",
                retryable: true,
            },
            MarketdeskError::Http(e) => ErrorClassification {
                error_type: "HttpError",
                // 4xx responses will not change on retry
                retryable: !e.status().map_or(false, |s| s.is_client_error()),
            },

            // Non-retryable errors
            MarketdeskError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            MarketdeskError::TaskNotFound(_) => ErrorClassification {
                error_type: "TaskNotFoundError",
                retryable: false,
            },
            MarketdeskError::MalformedEvent(_) => ErrorClassification {
                error_type: "MalformedEventError",
                retryable: false,
            },
            MarketdeskError::ReconnectExhausted(_) => ErrorClassification {
                error_type: "ReconnectExhaustedError",
                retryable: false,
            },
            MarketdeskError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            MarketdeskError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },

            // Default: retryable
            MarketdeskError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },
            MarketdeskError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: true,
            },
            MarketdeskError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: true,
            },
        }
    }
}

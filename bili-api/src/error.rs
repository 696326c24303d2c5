//! Error types for the bili-api crate.

/// Errors returned by [`crate::LiveApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-200 status
    #[error("HTTP status {0}")]
    Status(u16),

    /// The response body was not the expected JSON shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API envelope carried a non-zero code
    #[error("API error {code}: {message}")]
    Api {
        /// Envelope code
        code: i64,
        /// Envelope message
        message: String,
    },

    /// The play URL endpoint returned no stream (the room may be offline)
    #[error("No stream URLs returned (room may be offline)")]
    NoStreamUrl,
}

/// Convenience type alias for Results using ApiError.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::Status(412).to_string(), "HTTP status 412");

        let error = ApiError::Api {
            code: 60004,
            message: "room does not exist".to_string(),
        };
        assert_eq!(error.to_string(), "API error 60004: room does not exist");

        assert!(ApiError::NoStreamUrl.to_string().contains("offline"));
    }

    #[test]
    fn test_decode_error_conversion() {
        let json_error = serde_json::from_str::<u32>("not json").unwrap_err();
        let error: ApiError = json_error.into();
        assert!(matches!(error, ApiError::Decode(_)));
        assert!(error.to_string().starts_with("Failed to decode response"));
    }
}

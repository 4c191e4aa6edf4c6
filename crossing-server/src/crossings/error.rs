//! Geo query error types.

/// Errors from the Overpass interpreter.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// HTTP request failed or timed out
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Interpreter returned an error status
    #[error("Overpass error {status}: {body}")]
    Status { status: u16, body: String },

    /// Response was not the expected JSON
    #[error("JSON parse error: {message}")]
    Json { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = GeoError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "Overpass error 429: rate limited");
    }
}

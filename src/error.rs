use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Serial device unavailable: {0}")]
    DeviceUnavailable(#[from] tokio_serial::Error),

    #[error("Could not parse serial line {line:?}: {reason}")]
    LineParse { line: String, reason: String },

    #[error("Serial read error: {0}")]
    SerialRead(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_parse_error_mentions_the_line() {
        let err = BridgeError::LineParse {
            line: "{oops".to_string(),
            reason: "EOF while parsing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("{oops"));
        assert!(msg.contains("EOF while parsing"));
    }
}

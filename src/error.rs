use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Connection error ({address}): {reason}")]
    Connection { address: String, reason: String },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("IO error ({context}): {source}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("Invalid session state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ScopeError {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ScopeError::Timeout(format!("{context}: {source}"))
            }
            _ => ScopeError::Io { source, context },
        }
    }
}

impl From<std::io::Error> for ScopeError {
    fn from(source: std::io::Error) -> Self {
        ScopeError::io(source, "transport")
    }
}

impl From<csv::Error> for ScopeError {
    fn from(e: csv::Error) -> Self {
        let context = "CSV write".to_string();
        match e.into_kind() {
            csv::ErrorKind::Io(source) => ScopeError::Io { source, context },
            other => ScopeError::Io {
                source: std::io::Error::other(format!("{other:?}")),
                context,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_timed_out_maps_to_timeout() {
        let err = ScopeError::from(Error::new(ErrorKind::TimedOut, "late"));
        assert!(matches!(err, ScopeError::Timeout(_)));

        let err = ScopeError::io(Error::new(ErrorKind::WouldBlock, "late"), "*OPC?");
        assert!(matches!(err, ScopeError::Timeout(msg) if msg.contains("*OPC?")));
    }

    #[test]
    fn test_other_io_keeps_context() {
        let err = ScopeError::io(Error::new(ErrorKind::PermissionDenied, "no"), "out.csv");
        match err {
            ScopeError::Io { context, .. } => assert_eq!(context, "out.csv"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

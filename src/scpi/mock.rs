use super::protocol::Protocol;
use super::transport::Transport;
use crate::error::ScopeError;
use std::collections::VecDeque;
use std::time::Duration;

/// Scripted reply of a [`MockTransport`]
#[derive(Debug, Clone)]
pub enum Reply {
    /// Text line (terminator optional)
    Line(String),
    /// Raw bytes of a binary block response, header included
    Block(Vec<u8>),
    /// The instrument never answers; the read fails with a timeout
    Timeout,
}

impl Reply {
    pub fn line(text: &str) -> Self {
        Reply::Line(text.to_string())
    }

    pub fn opc() -> Self {
        Reply::Line("1".to_string())
    }

    pub fn float_block(samples: &[f32]) -> Self {
        Reply::Block(Protocol::encode_f32_block(samples))
    }
}

/// In-memory stub instrument.
///
/// Records every command written and hands out scripted replies in order,
/// one per read.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Vec<String>,
    replies: VecDeque<Reply>,
    timeouts: Vec<Duration>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push_reply(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }

    /// Commands written so far, in order
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Every timeout the session configured, in order
    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn next_reply(&mut self) -> Result<Reply, ScopeError> {
        if self.closed {
            return Err(ScopeError::InvalidState {
                expected: "open transport".to_string(),
                actual: "closed".to_string(),
            });
        }
        self.replies
            .pop_front()
            .ok_or_else(|| ScopeError::Timeout("no scripted reply left".to_string()))
    }

    fn timed_out() -> ScopeError {
        ScopeError::Timeout("stub instrument did not respond".to_string())
    }
}

impl Transport for MockTransport {
    fn write_line(&mut self, command: &str) -> Result<(), ScopeError> {
        if self.closed {
            return Err(ScopeError::InvalidState {
                expected: "open transport".to_string(),
                actual: "closed".to_string(),
            });
        }
        self.sent.push(command.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ScopeError> {
        match self.next_reply()? {
            Reply::Line(text) => Protocol::decode_line(text.into_bytes()),
            Reply::Block(bytes) => Protocol::decode_line(bytes),
            Reply::Timeout => Err(Self::timed_out()),
        }
    }

    fn read_block(&mut self) -> Result<Vec<u8>, ScopeError> {
        let bytes = match self.next_reply()? {
            Reply::Block(bytes) => bytes,
            Reply::Line(text) => text.into_bytes(),
            Reply::Timeout => return Err(Self::timed_out()),
        };
        Protocol::read_block(&mut bytes.as_slice())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ScopeError> {
        self.timeouts.push(timeout);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ScopeError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_in_order() {
        let mut mock = MockTransport::with_replies([
            Reply::line("Stub,Scope,1,1\n"),
            Reply::float_block(&[2.0]),
            Reply::Timeout,
        ]);

        assert_eq!(mock.query("*IDN?").unwrap(), "Stub,Scope,1,1");
        assert_eq!(mock.read_block().unwrap(), 2.0f32.to_le_bytes().to_vec());
        assert!(matches!(mock.read_line(), Err(ScopeError::Timeout(_))));
        assert!(matches!(mock.read_line(), Err(ScopeError::Timeout(_))));
        assert_eq!(mock.sent(), ["*IDN?"]);
    }

    #[test]
    fn test_non_utf8_reply_is_protocol_error() {
        let mut mock = MockTransport::with_replies([Reply::Block(b"0.1,\xff\xfe,0.3\n".to_vec())]);
        assert!(matches!(
            mock.query("FORM ASC;:CHAN1:DATA?"),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn test_closed_mock_rejects_io() {
        let mut mock = MockTransport::new();
        mock.close().unwrap();
        assert!(mock.is_closed());
        assert!(mock.write_line("*RST").is_err());
    }
}

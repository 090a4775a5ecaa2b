use super::address::ResourceAddress;
use super::protocol::{Protocol, TERMINATOR};
use crate::error::ScopeError;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Message-based connection to an instrument.
///
/// Implementations carry newline-terminated SCPI commands and return either
/// text lines or IEEE 488.2 binary blocks. The session layer only talks to
/// this trait, so a VISA-backed driver or a test stub can stand in for the
/// TCP socket.
pub trait Transport {
    /// Send one command; the terminator is appended by the transport
    fn write_line(&mut self, command: &str) -> Result<(), ScopeError>;

    /// Read one response line without its terminator
    fn read_line(&mut self) -> Result<String, ScopeError>;

    /// Read one binary block response and return its payload
    fn read_block(&mut self) -> Result<Vec<u8>, ScopeError>;

    /// Set how long reads may block before failing with a timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ScopeError>;

    /// Release the connection; further I/O is an error
    fn close(&mut self) -> Result<(), ScopeError>;

    /// Send a query and read its text response
    fn query(&mut self, command: &str) -> Result<String, ScopeError> {
        self.write_line(command)?;
        self.read_line()
    }
}

/// Raw SCPI socket transport (typically port 5025)
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    address: ResourceAddress,
    closed: bool,
}

impl TcpTransport {
    pub fn connect(
        address: &ResourceAddress,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ScopeError> {
        let connection_error = |reason: String| ScopeError::Connection {
            address: address.to_string(),
            reason,
        };

        let socket_addr = (address.host.as_str(), address.port)
            .to_socket_addrs()
            .map_err(|e| connection_error(format!("cannot resolve host: {e}")))?
            .next()
            .ok_or_else(|| connection_error("host resolved to no addresses".to_string()))?;

        debug!("Connecting to instrument at {socket_addr}");

        let stream = TcpStream::connect_timeout(&socket_addr, connect_timeout).map_err(|e| {
            warn!("Failed to connect to {address}: {e}");
            connection_error(e.to_string())
        })?;

        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;
        stream.set_nodelay(true)?;

        debug!("Successfully connected to {address}");

        Ok(Self {
            reader: BufReader::with_capacity(64 * 1024, stream),
            address: address.clone(),
            closed: false,
        })
    }

    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    fn ensure_open(&self) -> Result<(), ScopeError> {
        if self.closed {
            return Err(ScopeError::InvalidState {
                expected: "open transport".to_string(),
                actual: "closed".to_string(),
            });
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn write_line(&mut self, command: &str) -> Result<(), ScopeError> {
        self.ensure_open()?;
        debug!("-> {command}");
        let mut message = Vec::with_capacity(command.len() + 1);
        message.extend_from_slice(command.as_bytes());
        message.push(TERMINATOR);

        let stream = self.reader.get_mut();
        stream
            .write_all(&message)
            .map_err(|e| ScopeError::io(e, format!("Writing {command:?}")))?;
        stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ScopeError> {
        self.ensure_open()?;
        let mut raw = Vec::new();
        let read = self
            .reader
            .read_until(TERMINATOR, &mut raw)
            .map_err(|e| ScopeError::io(e, "Reading response"))?;
        if read == 0 {
            return Err(ScopeError::Connection {
                address: self.address.to_string(),
                reason: "connection closed by instrument".to_string(),
            });
        }
        let line = Protocol::decode_line(raw)?;
        debug!("<- {line}");
        Ok(line)
    }

    fn read_block(&mut self) -> Result<Vec<u8>, ScopeError> {
        self.ensure_open()?;
        let payload = Protocol::read_block(&mut self.reader)?;
        debug!("<- block of {} bytes", payload.len());
        Ok(payload)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ScopeError> {
        self.ensure_open()?;
        let stream = self.reader.get_ref();
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ScopeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing connection to {}", self.address);
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ScopeError::io(e, "Closing connection")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Minimal instrument answering `*IDN?` and a few data queries
    fn spawn_stub() -> (ResourceAddress, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut received = Vec::new();

            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                let command = line.trim_end().to_string();
                match command.as_str() {
                    "*IDN?" => writer.write_all(b"Stub,Scope,0001,1.0\n").unwrap(),
                    "FORM ASC;:CHAN1:DATA?" => writer.write_all(b"0.1,\xff\xfe,0.3\n").unwrap(),
                    c if c.ends_with("DATA?") => writer
                        .write_all(&Protocol::encode_f32_block(&[0.5, 1.5]))
                        .unwrap(),
                    _ => {}
                }
                received.push(command);
            }
            received
        });

        (
            ResourceAddress {
                host: "127.0.0.1".to_string(),
                port,
            },
            handle,
        )
    }

    #[test]
    fn test_tcp_query_and_block() {
        let (address, handle) = spawn_stub();
        let mut transport =
            TcpTransport::connect(&address, Duration::from_secs(2), Duration::from_secs(2))
                .unwrap();

        assert_eq!(transport.query("*IDN?").unwrap(), "Stub,Scope,0001,1.0");

        transport.write_line("CHAN1:DATA?").unwrap();
        let payload = transport.read_block().unwrap();
        assert_eq!(Protocol::decode_f32_le(&payload).unwrap(), vec![0.5, 1.5]);

        transport.close().unwrap();
        assert!(transport.write_line("*CLS").is_err());
        transport.close().unwrap();

        let received = handle.join().unwrap();
        assert_eq!(received, vec!["*IDN?", "CHAN1:DATA?"]);
    }

    #[test]
    fn test_non_utf8_line_is_protocol_error() {
        let (address, _handle) = spawn_stub();
        let mut transport =
            TcpTransport::connect(&address, Duration::from_secs(2), Duration::from_secs(2))
                .unwrap();

        let reply = transport.query("FORM ASC;:CHAN1:DATA?");
        assert!(matches!(reply, Err(ScopeError::Protocol(_))));

        // The bad line was consumed whole, the next reply is intact
        assert_eq!(transport.query("*IDN?").unwrap(), "Stub,Scope,0001,1.0");
        transport.close().unwrap();
    }

    #[test]
    fn test_read_timeout_maps_to_timeout() {
        let (address, _handle) = spawn_stub();
        let mut transport =
            TcpTransport::connect(&address, Duration::from_secs(2), Duration::from_secs(2))
                .unwrap();
        transport.set_timeout(Duration::from_millis(50)).unwrap();

        // The stub never answers unknown commands
        transport.write_line("*OPC?").unwrap();
        assert!(matches!(
            transport.read_line(),
            Err(ScopeError::Timeout(_))
        ));
        transport.close().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address = ResourceAddress {
            host: "127.0.0.1".to_string(),
            port,
        };
        let result =
            TcpTransport::connect(&address, Duration::from_millis(200), Duration::from_secs(1));
        assert!(matches!(result, Err(ScopeError::Connection { .. })));
    }
}

use std::fmt;

use crate::error::ScopeError;

/// Port used by instruments that expose raw SCPI over a TCP socket
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Network location of an instrument.
///
/// Accepts the VISA resource forms `TCPIP[n]::<host>::INSTR` and
/// `TCPIP[n]::<host>::<port>::SOCKET`, as well as a bare `<host>:<port>`.
/// `INSTR` resources are reached on the raw SCPI port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    pub host: String,
    pub port: u16,
}

impl ResourceAddress {
    pub fn parse(resource: &str) -> Result<Self, ScopeError> {
        let malformed = |reason: &str| ScopeError::Connection {
            address: resource.to_string(),
            reason: reason.to_string(),
        };

        let resource = resource.trim();
        if resource.is_empty() {
            return Err(malformed("empty address"));
        }

        if !resource.contains("::") {
            let (host, port) = resource
                .rsplit_once(':')
                .ok_or_else(|| malformed("expected <host>:<port> or a TCPIP resource"))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| malformed("invalid port number"))?;
            return Self::checked(host, port).ok_or_else(|| malformed("missing host"));
        }

        let parts: Vec<&str> = resource.split("::").collect();
        let interface = parts[0].to_ascii_uppercase();
        let board = interface
            .strip_prefix("TCPIP")
            .ok_or_else(|| malformed("only TCPIP resources are supported"))?;
        if !board.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed("invalid TCPIP board number"));
        }

        match parts.as_slice() {
            [_, host, class] if class.eq_ignore_ascii_case("INSTR") => {
                Self::checked(host, DEFAULT_SCPI_PORT).ok_or_else(|| malformed("missing host"))
            }
            [_, host, port, class] if class.eq_ignore_ascii_case("SOCKET") => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| malformed("invalid port number"))?;
                Self::checked(host, port).ok_or_else(|| malformed("missing host"))
            }
            _ => Err(malformed("unrecognised resource string")),
        }
    }

    fn checked(host: &str, port: u16) -> Option<Self> {
        let host = host.trim();
        if host.is_empty() || port == 0 {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_resource_uses_scpi_port() {
        let addr = ResourceAddress::parse("TCPIP::192.168.1.100::INSTR").unwrap();
        assert_eq!(addr.host, "192.168.1.100");
        assert_eq!(addr.port, DEFAULT_SCPI_PORT);

        let addr = ResourceAddress::parse("tcpip0::scope.lab::instr").unwrap();
        assert_eq!(addr.host, "scope.lab");
    }

    #[test]
    fn test_socket_resource_and_plain_form() {
        let addr = ResourceAddress::parse("TCPIP0::10.0.0.5::5555::SOCKET").unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5:5555");

        let addr = ResourceAddress::parse("127.0.0.1:5025").unwrap();
        assert_eq!(addr.port, 5025);
    }

    #[test]
    fn test_malformed_addresses() {
        for bad in [
            "",
            "GPIB0::5::INSTR",
            "TCPIP::::INSTR",
            "TCPIP::host::BOGUS",
            "TCPIPx::host::INSTR",
            "TCPIP::host::notaport::SOCKET",
            "host-without-port",
            "host:99999",
        ] {
            assert!(
                matches!(ResourceAddress::parse(bad), Err(ScopeError::Connection { .. })),
                "{bad} should be rejected"
            );
        }
    }
}

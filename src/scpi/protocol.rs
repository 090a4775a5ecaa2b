use crate::error::ScopeError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use std::io::{BufRead, Read};

// Protocol constants
pub const TERMINATOR: u8 = b'\n';
pub const BLOCK_START: u8 = b'#';
pub const F32_SIZE: usize = 4;
pub const MAX_BLOCK_SIZE: usize = 512 * 1024 * 1024; // 512MB

/// SCPI message framing and payload decoding
pub struct Protocol;

impl Protocol {
    /// Parse a comma separated list of ASCII floats, as returned after `FORM ASC`
    pub fn parse_ascii_floats(response: &str) -> Result<Vec<f32>, ScopeError> {
        let response = response.trim();
        if response.is_empty() {
            return Ok(Vec::new());
        }

        response
            .split(',')
            .enumerate()
            .map(|(i, field)| {
                field.trim().parse::<f32>().map_err(|_| {
                    ScopeError::Protocol(format!(
                        "Invalid ASCII float at position {i}: {:?}",
                        truncate(field, 32)
                    ))
                })
            })
            .collect()
    }

    /// Read one IEEE 488.2 definite-length block (`#<d><len><payload>`) from
    /// `reader`.
    ///
    /// The trailing message terminator is consumed when present. The
    /// indefinite form `#0` is rejected: a socket carries no end-of-message
    /// marker, and the payload may itself contain the terminator byte.
    pub fn read_block<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ScopeError> {
        let start = reader
            .read_u8()
            .map_err(|e| ScopeError::io(e, "Reading block header"))?;
        if start != BLOCK_START {
            return Err(ScopeError::Protocol(format!(
                "Expected binary block starting with '#', got {:?}",
                start as char
            )));
        }

        let digits = reader
            .read_u8()
            .map_err(|e| ScopeError::io(e, "Reading block header"))?;
        let digit_count = (digits as char).to_digit(10).ok_or_else(|| {
            ScopeError::Protocol(format!(
                "Invalid block length digit count {:?}",
                digits as char
            ))
        })? as usize;

        if digit_count == 0 {
            return Err(ScopeError::Protocol(
                "Indefinite-length block (#0) cannot be framed on a socket".to_string(),
            ));
        }

        let mut len_field = vec![0u8; digit_count];
        reader
            .read_exact(&mut len_field)
            .map_err(|e| ScopeError::io(e, "Reading block length"))?;
        let len = std::str::from_utf8(&len_field)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                ScopeError::Protocol(format!(
                    "Invalid block length field {:?}",
                    String::from_utf8_lossy(&len_field)
                ))
            })?;

        if len > MAX_BLOCK_SIZE {
            return Err(ScopeError::Protocol(format!(
                "Block size {len} exceeds maximum {MAX_BLOCK_SIZE}"
            )));
        }

        debug!("Definite block: {len} bytes");
        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .map_err(|e| ScopeError::io(e, format!("Reading {len} byte block payload")))?;

        // Trailing terminator after the payload
        if reader.fill_buf().map(|buf| buf.first() == Some(&TERMINATOR)).unwrap_or(false) {
            reader.consume(1);
        }

        Ok(payload)
    }

    /// Decode one response line, dropping its terminator
    pub fn decode_line(mut line: Vec<u8>) -> Result<String, ScopeError> {
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        String::from_utf8(line).map_err(|e| {
            ScopeError::Protocol(format!(
                "Response is not valid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            ))
        })
    }

    /// Decode a block payload of little-endian 32-bit floats
    pub fn decode_f32_le(payload: &[u8]) -> Result<Vec<f32>, ScopeError> {
        if payload.len() % F32_SIZE != 0 {
            return Err(ScopeError::Protocol(format!(
                "Block length {} is not a multiple of {F32_SIZE}",
                payload.len()
            )));
        }

        let mut cursor = std::io::Cursor::new(payload);
        let mut samples = Vec::with_capacity(payload.len() / F32_SIZE);
        for _ in 0..payload.len() / F32_SIZE {
            samples.push(cursor.read_f32::<LittleEndian>()?);
        }
        Ok(samples)
    }

    /// Encode samples as a terminated definite-length block
    pub fn encode_f32_block(samples: &[f32]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(samples.len() * F32_SIZE);
        for &sample in samples {
            // Writing into a Vec cannot fail
            let _ = payload.write_f32::<LittleEndian>(sample);
        }

        let len = payload.len().to_string();
        let mut block = Vec::with_capacity(payload.len() + len.len() + 3);
        block.push(BLOCK_START);
        block.extend_from_slice(len.len().to_string().as_bytes());
        block.extend_from_slice(len.as_bytes());
        block.extend_from_slice(&payload);
        block.push(TERMINATOR);
        block
    }

    /// Check a `*OPC?` reply
    pub fn check_opc(response: &str) -> Result<(), ScopeError> {
        match response.trim() {
            "1" | "+1" => Ok(()),
            other => Err(ScopeError::Protocol(format!(
                "Unexpected *OPC? response: {:?}",
                truncate(other, 32)
            ))),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ascii_floats() {
        let samples = Protocol::parse_ascii_floats("0.5,-1.25E-3, 2\n").unwrap();
        assert_eq!(samples, vec![0.5, -1.25e-3, 2.0]);
        assert!(Protocol::parse_ascii_floats("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ascii_floats_rejects_garbage() {
        let err = Protocol::parse_ascii_floats("1.0,abc,3.0").unwrap_err();
        assert!(matches!(err, ScopeError::Protocol(msg) if msg.contains("position 1")));
    }

    #[test]
    fn test_read_definite_block() {
        let block = Protocol::encode_f32_block(&[1.0, -0.5, 0.25]);
        assert_eq!(&block[..4], b"#212");

        let mut reader = &block[..];
        let payload = Protocol::read_block(&mut reader).unwrap();
        assert_eq!(payload.len(), 12);
        assert!(reader.is_empty(), "terminator should be consumed");
        assert_eq!(
            Protocol::decode_f32_le(&payload).unwrap(),
            vec![1.0, -0.5, 0.25]
        );
    }

    #[test]
    fn test_indefinite_block_rejected() {
        // Payload holds a 0x0A byte, so it cannot be split at the terminator
        let mut reader: &[u8] = b"#0\x0a\x00\x80\x3f\x00\x00\x80\x3f\n";
        assert!(matches!(
            Protocol::read_block(&mut reader),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn test_block_payload_containing_terminator() {
        // 0x0A inside a definite block is payload, not a terminator
        let sample = f32::from_le_bytes([0x0a, 0x00, 0x80, 0x3f]);
        let block = Protocol::encode_f32_block(&[sample, 1.0]);
        let mut reader = &block[..];
        let payload = Protocol::read_block(&mut reader).unwrap();
        assert_eq!(payload.len(), 8);
        assert_eq!(payload[0], 0x0a);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(Protocol::decode_line(b"+1\r\n".to_vec()).unwrap(), "+1");
        assert!(matches!(
            Protocol::decode_line(b"0.1,\xff\xfe,0.3\n".to_vec()),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn test_block_header_errors() {
        let mut reader: &[u8] = b"1.0,2.0\n";
        assert!(matches!(
            Protocol::read_block(&mut reader),
            Err(ScopeError::Protocol(_))
        ));

        let mut reader: &[u8] = b"#x12";
        assert!(matches!(
            Protocol::read_block(&mut reader),
            Err(ScopeError::Protocol(_))
        ));

        // Declared 8 bytes, only 4 present
        let mut reader: &[u8] = b"#18\x00\x00\x80\x3f";
        assert!(matches!(
            Protocol::read_block(&mut reader),
            Err(ScopeError::Io { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_partial_float() {
        assert!(matches!(
            Protocol::decode_f32_le(&[0, 0, 0]),
            Err(ScopeError::Protocol(_))
        ));
    }

    #[test]
    fn test_check_opc() {
        assert!(Protocol::check_opc("1\n").is_ok());
        assert!(Protocol::check_opc("0").is_err());
    }
}

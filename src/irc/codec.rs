//! IRC line codec.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::ConnectionError;

/// Longest inbound line accepted, message tags included.
pub const MAX_INBOUND_LINE: usize = 8704;

/// Codec for CRLF-terminated IRC lines.
///
/// Inbound bytes are decoded as UTF-8 with invalid sequences replaced, since
/// many networks still carry latin-1. Oversized lines are discarded.
#[derive(Debug, Default)]
pub struct IrcLineCodec {
    /// Index of next byte to check for newline.
    next_index: usize,
    /// Dropping an oversized line until its terminator shows up.
    discarding: bool,
}

impl IrcLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for IrcLineCodec {
    type Item = String;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_INBOUND_LINE {
                    src.clear();
                    self.discarding = true;
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            if self.discarding || end > MAX_INBOUND_LINE {
                src.advance(end + 1);
                self.discarding = false;
                continue;
            }

            let line = src.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
    }
}

impl Encoder<String> for IrcLineCodec {
    type Error = ConnectionError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.trim_end_matches(['\r', '\n']).as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// A framed IRC connection.
pub type IrcConnection<S> = Framed<S, IrcLineCodec>;

/// Create a new IRC connection from a stream.
pub fn new_irc_connection<S: AsyncRead + AsyncWrite>(stream: S) -> IrcConnection<S> {
    Framed::new(stream, IrcLineCodec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from("PING :irc.libera.chat\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("PING :irc.libera.chat".to_string())
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_then_rest() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from("PING :");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"abc\nPONG");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :abc".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from("\r\n\r\nPING :x\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :x".to_string()));
    }

    #[test]
    fn test_decode_lossy() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG x :caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG x :caf"));
        assert!(line.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_oversized_line_discarded() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_INBOUND_LINE + 1].as_slice());
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"tail\r\nPING :ok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :ok".to_string()));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PONG :x".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :x\r\n");
    }
}

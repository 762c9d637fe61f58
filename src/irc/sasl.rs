//! SASL PLAIN client payload.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::config::relay::SaslCredentials;

/// Maximum payload bytes per AUTHENTICATE line.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Base64 of `authzid NUL authcid NUL password`, with authzid = authcid.
pub fn encode_plain(credentials: &SaslCredentials) -> String {
    let user = &credentials.username;
    let raw = format!("{}\0{}\0{}", user, user, credentials.password.expose());
    BASE64.encode(raw.as_bytes())
}

/// AUTHENTICATE lines carrying `encoded`.
///
/// A payload that ends exactly on a chunk boundary, or is empty, is
/// terminated with `AUTHENTICATE +`.
pub fn authenticate_lines(encoded: &str) -> Vec<String> {
    let mut lines: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| format!("AUTHENTICATE {}", String::from_utf8_lossy(chunk)))
        .collect();

    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        lines.push("AUTHENTICATE +".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::relay::Secret;

    fn credentials(password: &str) -> SaslCredentials {
        SaslCredentials {
            username: "Cerebot".to_string(),
            password: Secret::new(password),
        }
    }

    #[test]
    fn test_encode_plain() {
        let encoded = encode_plain(&credentials("hunter2"));
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(decoded, b"Cerebot\0Cerebot\0hunter2");
    }

    #[test]
    fn test_short_payload_single_line() {
        let encoded = encode_plain(&credentials("hunter2"));
        let lines = authenticate_lines(&encoded);
        assert_eq!(lines, vec![format!("AUTHENTICATE {}", encoded)]);
    }

    #[test]
    fn test_long_payload_chunked() {
        let encoded = "A".repeat(SASL_CHUNK_SIZE + 10);
        let lines = authenticate_lines(&encoded);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), "AUTHENTICATE ".len() + SASL_CHUNK_SIZE);
        assert_eq!(lines[1], format!("AUTHENTICATE {}", "A".repeat(10)));
    }

    #[test]
    fn test_exact_boundary_terminated() {
        let encoded = "A".repeat(SASL_CHUNK_SIZE);
        let lines = authenticate_lines(&encoded);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "AUTHENTICATE +");
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(authenticate_lines(""), vec!["AUTHENTICATE +"]);
    }
}

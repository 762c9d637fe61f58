//! Connection registration: CAP/SASL negotiation and NICK/USER.
//!
//! Pure state machine. The session feeds it every inbound message until
//! [`Registration::is_registered`] and writes out whatever lines it returns.

use tracing::{debug, info, warn};

use crate::common::error::AuthError;
use crate::config::relay::SaslCredentials;
use crate::irc::message::{alternate_nick, IrcMessage};
use crate::irc::sasl::{authenticate_lines, encode_plain};

const SASL_FAILURE_NUMERICS: [&str; 5] = ["902", "904", "905", "906", "908"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// `CAP REQ :sasl` sent, waiting for ACK or NAK.
    CapRequested,
    /// `AUTHENTICATE PLAIN` sent.
    Authenticating,
    /// Waiting for `001`.
    Registering,
    Registered,
}

#[derive(Debug)]
pub struct Registration {
    nick: String,
    sasl: Option<SaslCredentials>,
    phase: Phase,
    sasl_done: bool,
}

impl Registration {
    pub fn new(nick: impl Into<String>, sasl: Option<SaslCredentials>) -> Self {
        let phase = if sasl.is_some() {
            Phase::CapRequested
        } else {
            Phase::Registering
        };
        Self {
            nick: nick.into(),
            sasl,
            phase,
            sasl_done: false,
        }
    }

    /// Lines that open registration.
    pub fn start(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if self.sasl.is_some() {
            lines.push("CAP REQ :sasl".to_string());
        }
        lines.push(format!("NICK {}", self.nick));
        lines.push(format!("USER {} 0 * :{}", self.nick, self.nick));
        lines
    }

    /// Nick currently requested, or assigned once registered.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn is_registered(&self) -> bool {
        self.phase == Phase::Registered
    }

    /// Advance on one server message and return the lines to send.
    pub fn handle(&mut self, msg: &IrcMessage) -> Result<Vec<String>, AuthError> {
        match msg.command.as_str() {
            "CAP" => self.on_cap(msg),
            "AUTHENTICATE" if self.phase == Phase::Authenticating && msg.param(0) == Some("+") => {
                Ok(self
                    .sasl
                    .as_ref()
                    .map(|credentials| authenticate_lines(&encode_plain(credentials)))
                    .unwrap_or_default())
            }
            "903" => {
                info!("SASL authentication successful");
                self.sasl_done = true;
                self.phase = Phase::Registering;
                Ok(vec!["CAP END".to_string()])
            }
            numeric if SASL_FAILURE_NUMERICS.contains(&numeric) => Err(AuthError::SaslFailed {
                numeric: numeric.to_string(),
                message: msg.trailing().unwrap_or_default().to_string(),
            }),
            "433" if !self.is_registered() => {
                let next = alternate_nick(&self.nick);
                warn!(nick = %self.nick, next = %next, "Nick in use, retrying");
                self.nick = next;
                Ok(vec![format!("NICK {}", self.nick)])
            }
            "NICK" if msg.nick().is_some_and(|nick| nick.eq_ignore_ascii_case(&self.nick)) => {
                if let Some(next) = msg.param(0) {
                    info!(old = %self.nick, new = %next, "Nick changed");
                    self.nick = next.to_string();
                }
                Ok(Vec::new())
            }
            "001" => {
                if self.sasl.is_some() && !self.sasl_done {
                    return Err(AuthError::SaslUnavailable {
                        message: "server completed registration without SASL".to_string(),
                    });
                }
                if let Some(assigned) = msg.param(0) {
                    self.nick = assigned.to_string();
                }
                self.phase = Phase::Registered;
                info!(nick = %self.nick, "Registered with IRC server");
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn on_cap(&mut self, msg: &IrcMessage) -> Result<Vec<String>, AuthError> {
        if self.phase != Phase::CapRequested {
            return Ok(Vec::new());
        }
        let caps = msg.trailing().unwrap_or_default();
        let requested_sasl = caps.split_whitespace().any(|cap| cap == "sasl");

        match msg.param(1) {
            Some("ACK") if requested_sasl => {
                debug!("SASL capability acknowledged");
                self.phase = Phase::Authenticating;
                Ok(vec!["AUTHENTICATE PLAIN".to_string()])
            }
            Some("NAK") => Err(AuthError::SaslUnavailable {
                message: format!("CAP NAK {}", caps),
            }),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::relay::Secret;

    fn feed(reg: &mut Registration, line: &str) -> Result<Vec<String>, AuthError> {
        reg.handle(&IrcMessage::parse(line).unwrap())
    }

    fn with_sasl() -> Registration {
        Registration::new(
            "Cerebot",
            Some(SaslCredentials {
                username: "Cerebot".to_string(),
                password: Secret::new("hunter2"),
            }),
        )
    }

    #[test]
    fn test_plain_registration() {
        let mut reg = Registration::new("Cerebot", None);
        assert_eq!(reg.start(), vec!["NICK Cerebot", "USER Cerebot 0 * :Cerebot"]);

        assert!(feed(&mut reg, ":server NOTICE * :Looking up your hostname").unwrap().is_empty());
        assert!(!reg.is_registered());
        feed(&mut reg, ":server 001 Cerebot :Welcome").unwrap();
        assert!(reg.is_registered());
    }

    #[test]
    fn test_sasl_flow() {
        let mut reg = with_sasl();
        assert_eq!(reg.start()[0], "CAP REQ :sasl");

        assert_eq!(feed(&mut reg, ":server CAP * ACK :sasl").unwrap(), vec!["AUTHENTICATE PLAIN"]);
        let payload = feed(&mut reg, "AUTHENTICATE +").unwrap();
        assert_eq!(payload.len(), 1);
        assert!(payload[0].starts_with("AUTHENTICATE "));

        feed(&mut reg, ":server 900 Cerebot Cerebot!c@h Cerebot :You are now logged in").unwrap();
        assert_eq!(feed(&mut reg, ":server 903 Cerebot :SASL successful").unwrap(), vec!["CAP END"]);
        feed(&mut reg, ":server 001 Cerebot :Welcome").unwrap();
        assert!(reg.is_registered());
    }

    #[test]
    fn test_sasl_failure_is_fatal() {
        let mut reg = with_sasl();
        feed(&mut reg, ":server CAP * ACK :sasl").unwrap();
        feed(&mut reg, "AUTHENTICATE +").unwrap();
        let err = feed(&mut reg, ":server 904 Cerebot :SASL authentication failed").unwrap_err();
        assert!(matches!(err, AuthError::SaslFailed { ref numeric, .. } if numeric == "904"));
    }

    #[test]
    fn test_cap_nak_is_fatal() {
        let mut reg = with_sasl();
        let err = feed(&mut reg, ":server CAP * NAK :sasl").unwrap_err();
        assert!(matches!(err, AuthError::SaslUnavailable { .. }));
    }

    #[test]
    fn test_welcome_without_sasl_is_fatal() {
        let mut reg = with_sasl();
        assert!(feed(&mut reg, ":server 001 Cerebot :Welcome").is_err());
    }

    #[test]
    fn test_nick_collision() {
        let mut reg = Registration::new("Cerebot", None);
        assert_eq!(
            feed(&mut reg, ":server 433 * Cerebot :Nickname is already in use").unwrap(),
            vec!["NICK Cerebot_"]
        );
        assert_eq!(
            feed(&mut reg, ":server 433 * Cerebot_ :Nickname is already in use").unwrap(),
            vec!["NICK Cerebot__"]
        );
        feed(&mut reg, ":server 001 Cerebot__ :Welcome").unwrap();
        assert_eq!(reg.nick(), "Cerebot__");
    }

    #[test]
    fn test_own_nick_change_tracked() {
        let mut reg = Registration::new("Cerebot", None);
        feed(&mut reg, ":server 001 Cerebot_ :Welcome").unwrap();
        feed(&mut reg, ":Cerebot_!c@h NICK :Cerebot").unwrap();
        assert_eq!(reg.nick(), "Cerebot");

        feed(&mut reg, ":Sequell!s@h NICK :Sequell2").unwrap();
        assert_eq!(reg.nick(), "Cerebot");
    }
}

//! SASL `PLAIN` and `LOGIN` sub-state machines for the `AUTH` command (RFC 4954, RFC 4616).
//!
//! `AUTH` drops out of the main protocol grammar into a short base64 request/response
//! exchange that isn't part of the [`crate::state::State`] machine: the server prompts,
//! the client answers on the next line, and the exchange ends in either a decoded
//! `(username, password)` pair or a failure. [`PendingRequests`](crate::pending) holds at
//! most one of these in flight per session.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

/// SASL mechanisms this listener accepts, advertised via the `Auth` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }
}

/// Outcome of feeding one line into an in-progress exchange.
pub enum Progress {
    /// Another base64-encoded line is needed; `prompt` is the (already-encoded) challenge.
    Continue { prompt: &'static str },
    /// The exchange produced credentials ready to hand to an `AuthBackend`.
    Done {
        username: String,
        password: Zeroizing<String>,
    },
    /// The exchange could not be decoded or was otherwise malformed.
    Failed(String),
}

/// One client's `AUTH` exchange, from the initial command to decoded credentials.
pub struct SaslExchange {
    mechanism: Mechanism,
    login_username: Option<String>,
}

impl SaslExchange {
    #[must_use]
    pub const fn new(mechanism: Mechanism) -> Self {
        Self {
            mechanism,
            login_username: None,
        }
    }

    /// Processes the initial response, if the client supplied one inline with `AUTH`,
    /// otherwise returns the first challenge for the client to answer.
    pub fn begin(&mut self, initial_response: Option<&str>) -> Progress {
        match initial_response {
            Some(line) => self.respond(line),
            None => match self.mechanism {
                // "Username:" / "Password:" pre-encoded; PLAIN has no named prompt.
                Mechanism::Plain => Progress::Continue { prompt: "" },
                Mechanism::Login => Progress::Continue {
                    prompt: "VXNlcm5hbWU6",
                },
            },
        }
    }

    /// Feeds the next base64 line from the client into the exchange.
    pub fn respond(&mut self, line: &str) -> Progress {
        match self.mechanism {
            Mechanism::Plain => Self::decode_plain(line),
            Mechanism::Login if self.login_username.is_none() => self.decode_login_username(line),
            Mechanism::Login => self.decode_login_password(line),
        }
    }

    fn decode_plain(encoded: &str) -> Progress {
        let Ok(raw) = STANDARD.decode(encoded.trim()) else {
            return Progress::Failed("invalid base64".to_string());
        };

        let mut fields = raw.split(|&b| b == 0);
        let _authzid = fields.next();
        let (Some(authcid), Some(passwd)) = (fields.next(), fields.next()) else {
            return Progress::Failed("malformed PLAIN response".to_string());
        };

        Progress::Done {
            username: String::from_utf8_lossy(authcid).into_owned(),
            password: Zeroizing::new(String::from_utf8_lossy(passwd).into_owned()),
        }
    }

    fn decode_login_username(&mut self, encoded: &str) -> Progress {
        let Ok(raw) = STANDARD.decode(encoded.trim()) else {
            return Progress::Failed("invalid base64".to_string());
        };

        self.login_username = Some(String::from_utf8_lossy(&raw).into_owned());
        Progress::Continue {
            prompt: "UGFzc3dvcmQ6",
        }
    }

    fn decode_login_password(&mut self, encoded: &str) -> Progress {
        let Ok(raw) = STANDARD.decode(encoded.trim()) else {
            return Progress::Failed("invalid base64".to_string());
        };

        Progress::Done {
            username: self.login_username.take().unwrap_or_default(),
            password: Zeroizing::new(String::from_utf8_lossy(&raw).into_owned()),
        }
    }
}

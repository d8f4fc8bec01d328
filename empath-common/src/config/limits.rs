//! Protocol limits for one SMTP session.
//!
//! Mirrors OpenSMTPD's `SMTP_MAXMAIL`/`SMTP_MAXRCPT`/`SMTP_LINE_MAX`/kick-threshold
//! constants, made configurable (with the same defaults) rather than hardcoded, and adds
//! the message-size ceiling (`sc_maxsize`) advertised in the `SIZE` EHLO extension.

use serde::{Deserialize, Serialize};

const fn default_max_mail() -> usize {
    100
}

const fn default_max_rcpt() -> usize {
    1000
}

const fn default_line_max() -> usize {
    1024
}

const fn default_kick_threshold() -> u32 {
    50
}

const fn default_max_message_size() -> usize {
    36_700_160 // 35 MiB, OpenSMTPD's historical default.
}

/// Per-session protocol limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Maximum messages accepted in a single session (`SMTP_MAXMAIL`).
    #[serde(default = "default_max_mail")]
    pub max_mail: usize,

    /// Maximum recipients accepted in a single transaction (`SMTP_MAXRCPT`).
    #[serde(default = "default_max_rcpt")]
    pub max_rcpt: usize,

    /// Maximum bytes in a single protocol line, CRLF excluded (`SMTP_LINE_MAX`).
    #[serde(default = "default_line_max")]
    pub line_max: usize,

    /// Number of commands without forward progress before the session is kicked.
    #[serde(default = "default_kick_threshold")]
    pub kick_threshold: u32,

    /// Maximum accepted message size in bytes, advertised via `SIZE` in EHLO's response.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_mail: default_max_mail(),
            max_rcpt: default_max_rcpt(),
            line_max: default_line_max(),
            kick_threshold: default_kick_threshold(),
            max_message_size: default_max_message_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_opensmtpd_constants() {
        let limits = SessionLimits::default();
        assert_eq!(limits.max_mail, 100);
        assert_eq!(limits.max_rcpt, 1000);
        assert_eq!(limits.line_max, 1024);
        assert_eq!(limits.kick_threshold, 50);
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let limits: SessionLimits = toml::from_str("max_rcpt = 50\n").unwrap();
        assert_eq!(limits.max_rcpt, 50);
        assert_eq!(limits.max_mail, 100);
    }
}

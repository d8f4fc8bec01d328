//! Per-listener configuration: the flag set and routing tag a session's `listener_ref`
//! (SPEC_FULL §3) is a back-reference to.

use serde::{Deserialize, Serialize};

use super::{limits::SessionLimits, tls::TlsConfig};

/// Behaviour flags for one listener, mirroring OpenSMTPD's `F_SMTPS`/`F_STARTTLS`/
/// `F_STARTTLS_REQUIRE`/`F_AUTH`/`F_AUTH_REQUIRE` listener flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "mirrors a bitflag set of independent listener behaviours"
)]
pub struct ListenerFlags {
    /// Listener accepts implicit TLS on connect (SMTPS, typically port 465).
    #[serde(default)]
    pub smtps: bool,

    /// Listener advertises and accepts `STARTTLS`.
    #[serde(default)]
    pub starttls: bool,

    /// `STARTTLS` must complete before `MAIL FROM`/`AUTH` are accepted.
    #[serde(default)]
    pub starttls_require: bool,

    /// Listener advertises `AUTH PLAIN LOGIN`.
    #[serde(default)]
    pub auth: bool,

    /// A session must authenticate before `MAIL FROM` is accepted.
    #[serde(default)]
    pub auth_require: bool,
}

impl ListenerFlags {
    #[must_use]
    pub const fn requires_tls_before_mail(&self) -> bool {
        self.starttls_require
    }

    #[must_use]
    pub const fn requires_auth_before_mail(&self) -> bool {
        self.auth_require
    }
}

/// Configuration for a single SMTP listener: its flags, TLS policy, protocol limits, and
/// the routing tag carried through to the queue for policy routing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListenerConfig {
    #[serde(default)]
    pub flags: ListenerFlags,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub limits: SessionLimits,

    /// Carried into every envelope originating from this listener; empty if unassigned.
    #[serde(default)]
    pub routing_tag: String,
}

pub mod body;
pub mod collaborators;
pub mod command;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod fsm;
pub mod listener;
pub mod pending;
pub mod received;
pub mod sasl;
pub mod session;
pub mod session_state;
pub mod state;
pub mod transaction_handler;

// Re-export commonly used types
use std::{borrow::Cow, collections::HashMap, net::SocketAddr, sync::Arc};

pub use command::MailParameters;
use empath_common::{
    config::{ListenerFlags, SessionLimits},
    traits::protocol::{Protocol, SessionHandler},
};
use serde::Deserialize;
// Re-export the type-safe state machine from the state module
pub use state::State;
use tokio::net::TcpStream;

use crate::{
    extensions::Extension,
    session::{Session, SessionConfig, TlsContext},
};

/// SMTP server-side timeout configuration
///
/// These timeouts prevent resource exhaustion from slow or malicious clients
/// and follow RFC 5321 Section 4.5.3.2 recommendations.
#[derive(Clone, Debug, Deserialize)]
pub struct SmtpServerTimeouts {
    /// Timeout for regular SMTP commands (EHLO, MAIL FROM, RCPT TO, etc.)
    ///
    /// RFC 5321 recommends: 5 minutes
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Timeout for DATA command response
    ///
    /// RFC 5321 recommends: 2 minutes
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_init_timeout")]
    pub data_init_secs: u64,

    /// Timeout between data chunks while receiving message body
    ///
    /// RFC 5321 recommends: 3 minutes
    /// Default: 180 seconds (3 minutes)
    #[serde(default = "default_data_block_timeout")]
    pub data_block_secs: u64,

    /// Timeout for processing after final dot terminator
    ///
    /// RFC 5321 recommends: 10 minutes
    /// Default: 600 seconds (10 minutes)
    #[serde(default = "default_data_termination_timeout")]
    pub data_termination_secs: u64,

    /// Maximum total session duration
    ///
    /// Prevents sessions from living indefinitely.
    /// Default: 1800 seconds (30 minutes)
    #[serde(default = "default_connection_timeout")]
    pub connection_secs: u64,
}

impl Default for SmtpServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command_timeout(),
            data_init_secs: default_data_init_timeout(),
            data_block_secs: default_data_block_timeout(),
            data_termination_secs: default_data_termination_timeout(),
            connection_secs: default_connection_timeout(),
        }
    }
}

const fn default_command_timeout() -> u64 {
    300 // 5 minutes per RFC 5321
}

const fn default_data_init_timeout() -> u64 {
    120 // 2 minutes per RFC 5321
}

const fn default_data_block_timeout() -> u64 {
    180 // 3 minutes per RFC 5321
}

const fn default_data_termination_timeout() -> u64 {
    600 // 10 minutes per RFC 5321
}

const fn default_connection_timeout() -> u64 {
    1800 // 30 minutes
}

/// The SMTP `Protocol` implementation. Carries the per-listener configuration that isn't
/// already expressed by `Listener`'s own fields (extensions, TLS) — namely the spool
/// backend and server-side timeouts — and hands each accepted connection off to a fresh
/// [`Session`].
#[derive(Default, Deserialize)]
pub struct Smtp {
    #[serde(skip)]
    spool: Option<Arc<dyn empath_spool::BackingStore>>,
    #[serde(default)]
    pub timeouts: SmtpServerTimeouts,
}

impl Smtp {
    /// Set the spool controller for this SMTP server
    #[must_use]
    pub fn with_spool(mut self, spool: Arc<dyn empath_spool::BackingStore>) -> Self {
        self.spool = Some(spool);
        self
    }

    /// Set the timeout configuration for this SMTP server
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: SmtpServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Context = HashMap<String, String>;
    type ExtraArgs = (Vec<Extension>, Option<TlsContext>, ListenerFlags, SessionLimits);

    #[tracing::instrument(level = tracing::Level::TRACE, skip(self, stream, context, args))]
    fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        context: Self::Context,
        args: Self::ExtraArgs,
    ) -> Self::Session {
        let (extensions, tls_context, flags, limits) = args;

        Session::create(
            stream,
            peer,
            SessionConfig::builder()
                .with_extensions(extensions)
                .with_tls_context(tls_context)
                .with_spool(self.spool.clone())
                .with_timeouts(self.timeouts.clone())
                .with_flags(flags)
                .with_limits(limits)
                .with_init_context(
                    context
                        .into_iter()
                        .map(|(k, v)| (Cow::Owned(k), v))
                        .collect(),
                )
                .build(),
        )
    }
}

impl SessionHandler for Session<TcpStream> {
    fn run(self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send {
        async move { Self::run(self).await.map_err(Into::into) }
    }
}

use std::{borrow::Cow, net::SocketAddr, path::PathBuf, sync::Arc};

use ahash::AHashMap;
use empath_common::{
    config::{ListenerFlags, SessionLimits},
    context,
    error::SessionError,
    internal, outgoing,
    status::Status,
};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    extensions::Extension,
    pending::PendingRequests,
    session::connection::Connection,
    state,
    transaction_handler::{DefaultSmtpTransactionHandler, SmtpTransactionHandler},
};

// Submodules containing implementation details
mod counters;
mod events;
mod io;
mod response;

pub use crate::connection;

#[repr(C)]
#[derive(PartialEq, Eq, Debug)]
pub enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Context {
    pub state: State,
    pub message: Vec<u8>,
    pub sent: bool,
}

pub type Response = (Option<Vec<String>>, Event);

#[derive(Clone, Debug, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug)]
pub struct SessionConfig {
    pub extensions: Vec<Extension>,
    pub tls_context: Option<TlsContext>,
    pub spool: Option<Arc<dyn empath_spool::BackingStore>>,
    pub banner: String,
    pub init_context: AHashMap<Cow<'static, str>, String>,
    pub timeouts: crate::SmtpServerTimeouts,
    pub flags: ListenerFlags,
    pub limits: SessionLimits,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug)]
pub struct SessionConfigBuilder {
    extensions: Vec<Extension>,
    tls_context: Option<TlsContext>,
    spool: Option<Arc<dyn empath_spool::BackingStore>>,
    banner: String,
    init_context: AHashMap<Cow<'static, str>, String>,
    timeouts: crate::SmtpServerTimeouts,
    flags: ListenerFlags,
    limits: SessionLimits,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            tls_context: None,
            spool: None,
            banner: String::new(),
            init_context: AHashMap::new(),
            timeouts: crate::SmtpServerTimeouts::default(),
            flags: ListenerFlags::default(),
            limits: SessionLimits::default(),
        }
    }
}

impl SessionConfigBuilder {
    /// Set the SMTP extensions supported by this session
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the TLS context for STARTTLS support
    #[must_use]
    pub fn with_tls_context(mut self, tls_context: Option<TlsContext>) -> Self {
        self.tls_context = tls_context;
        self
    }

    /// Set the spool controller for message persistence
    #[must_use]
    pub fn with_spool(mut self, spool: Option<Arc<dyn empath_spool::BackingStore>>) -> Self {
        self.spool = spool;
        self
    }

    /// Set the server banner hostname
    #[must_use]
    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = banner;
        self
    }

    /// Set the initial context key-value pairs
    #[must_use]
    pub fn with_init_context(mut self, init_context: AHashMap<Cow<'static, str>, String>) -> Self {
        self.init_context = init_context;
        self
    }

    /// Set the timeout configuration for this session
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: crate::SmtpServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the listener flags (`SMTPS`/`STARTTLS`/`STARTTLS_REQUIRE`/`AUTH`/`AUTH_REQUIRE`)
    #[must_use]
    pub const fn with_flags(mut self, flags: ListenerFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the per-session limits (mail/rcpt/line/kick/message-size)
    #[must_use]
    pub const fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the final `SessionConfig`
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            extensions: self.extensions,
            tls_context: self.tls_context,
            spool: self.spool,
            banner: self.banner,
            init_context: self.init_context,
            timeouts: self.timeouts,
            flags: self.flags,
            limits: self.limits,
        }
    }
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    peer: SocketAddr,
    pub(super) context: Context,
    extensions: Vec<Extension>,
    pub(super) banner: Arc<str>,
    pub(super) tls_context: Option<TlsContext>,
    pub(super) spool: Option<Arc<dyn empath_spool::BackingStore>>,
    pub(super) connection: Connection<Stream>,
    init_context: Arc<AHashMap<Cow<'static, str>, String>>,
    /// Maximum message size in bytes as advertised via SIZE extension (RFC 1870).
    ///
    /// A value of 0 means no size limit is enforced (unlimited).
    ///
    /// This is validated at two points:
    /// 1. **MAIL FROM**: Against declared SIZE parameter (RFC 1870 Section 4)
    /// 2. **DATA**: Against actual received bytes (RFC 1870 Section 5)
    ///
    /// When the limit is exceeded, the server rejects with SMTP status code 552
    /// (Exceeded Storage Allocation).
    pub(super) max_message_size: usize,
    /// Server-side timeout configuration
    timeouts: crate::SmtpServerTimeouts,
    /// Start time for tracking connection lifetime
    start_time: std::time::Instant,
    /// Business-logic collaborators (resolver/filter/auth/spool) consulted per state.
    pub(super) transaction_handler: Box<dyn SmtpTransactionHandler>,
    /// The one `AUTH` exchange this session may have in flight.
    pub(super) pending: PendingRequests,
    /// `SMTPS`/`STARTTLS`/`STARTTLS_REQUIRE`/`AUTH`/`AUTH_REQUIRE` for this listener.
    pub(super) listener_flags: ListenerFlags,
    /// Per-session limits (`max_mail`, `max_rcpt`, `line_max`, `kick_threshold`).
    pub(super) limits: SessionLimits,
    /// Whether this connection is currently running over TLS (SMTPS or post-STARTTLS).
    pub(super) tls_active: bool,
    /// Whether a SASL exchange on this session has completed successfully.
    pub(super) authenticated: bool,
    /// Commands (and SASL sub-lines) received since the last forward-progress event.
    pub(super) kick_count: u32,
    /// Messages successfully queued this session, counted against `SMTP_MAXMAIL`.
    pub(super) mail_count: usize,
    /// Recipients accepted in the current transaction, counted against `SMTP_MAXRCPT`.
    pub(super) rcpt_count: usize,
    /// Bytes accumulated while framing the next CRLF-terminated protocol line.
    pub(super) cmd_buf: Vec<u8>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
    pub(crate) fn create(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        tracing::debug!("Config: {:?}", config);
        tracing::debug!("Extensions: {:?}", config.extensions);

        // Extract max message size from the SIZE extension, falling back to the listener's
        // configured limit when the extension wasn't explicitly set.
        let max_message_size = config
            .extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Size(size) if *size > 0 => Some(*size),
                _ => None,
            })
            .unwrap_or(config.limits.max_message_size);

        tracing::debug!("Max message size: {max_message_size}");

        let tls_context = config.extensions.iter().find_map(|ext| match ext {
            Extension::Starttls(context) => Some(context.clone()),
            _ => None,
        });

        Self {
            peer,
            connection: Connection::Plain {
                stream,
                read_buf: Vec::new(),
                read_pos: 0,
                read_len: 0,
            },
            context: Context::default(),
            extensions: config.extensions,
            tls_context,
            transaction_handler: Box::new(DefaultSmtpTransactionHandler::new(
                config.spool.clone(),
                peer,
            )),
            spool: config.spool,
            banner: if config.banner.is_empty() {
                std::env::var("HOSTNAME")
                    .unwrap_or_else(|_| "localhost".to_string())
                    .into()
            } else {
                config.banner.into()
            },
            init_context: Arc::new(config.init_context),
            max_message_size,
            timeouts: config.timeouts,
            start_time: std::time::Instant::now(),
            pending: PendingRequests::default(),
            listener_flags: config.flags,
            limits: config.limits,
            tls_active: false,
            authenticated: false,
            kick_count: 0,
            mail_count: 0,
            rcpt_count: 0,
            cmd_buf: Vec::new(),
        }
    }

    /// Get the appropriate timeout for the current state
    ///
    /// Returns timeout in seconds based on RFC 5321 recommendations:
    /// - DATA block reading: 3 minutes (waiting for message content)
    /// - DATA initiation: 2 minutes (for DATA command itself)
    /// - `PostDot`: 10 minutes (for processing after final dot)
    /// - Regular commands: 5 minutes (EHLO, MAIL FROM, RCPT TO, etc.)
    const fn get_timeout_secs(&self) -> u64 {
        match &self.context.state {
            State::Reading(_) => self.timeouts.data_block_secs,
            State::Data(_) => self.timeouts.data_init_secs,
            State::PostDot(_) => self.timeouts.data_termination_secs,
            _ => self.timeouts.command_secs,
        }
    }

    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, fields(peer = ?self.peer), ret)]
    #[allow(clippy::too_many_lines)]
    pub(crate) async fn run(mut self) -> Result<(), SessionError> {
        internal!("Connected");

        async fn run_inner<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync>(
            mut session: Session<Stream>,
            validate_context: &mut context::Context,
        ) -> Result<(), SessionError> {
            loop {
                // Check if connection has exceeded maximum lifetime
                let connection_duration = session.start_time.elapsed();
                let max_duration = std::time::Duration::from_secs(session.timeouts.connection_secs);
                if connection_duration >= max_duration {
                    tracing::warn!(
                        peer = ?session.peer,
                        duration_secs = ?connection_duration.as_secs(),
                        max_secs = session.timeouts.connection_secs,
                        "Connection exceeded maximum lifetime, closing"
                    );
                    return Err(SessionError::Timeout(session.timeouts.connection_secs));
                }

                // Then generate the response based on what emit() set
                let (response, ev) = session.response(validate_context).await;

                validate_context.response = None;
                session.context.sent = true;

                for response in response.unwrap_or_default() {
                    outgoing!("{response}");

                    session.connection.send(&response).await.map_err(|err| {
                        internal!(level = ERROR, "{err}");
                        SessionError::Protocol(format!("Failed to send response: {err}"))
                    })?;
                }

                if Event::ConnectionClose == ev {
                    return Ok(());
                } else if let Some(tls_context) = session.tls_context.as_ref()
                    && matches!(session.context.state, State::StartTls(_))
                {
                    // Handle TLS upgrade inline to avoid borrowing issues
                    let (conn, info) = session
                        .connection
                        .upgrade(tls_context)
                        .await
                        .map_err(|e| SessionError::Protocol(e.to_string()))?;

                    session.connection = conn;
                    session.tls_active = true;
                    session.reset_kick();

                    validate_context
                        .metadata
                        .insert("tls".to_string(), "true".to_string());
                    validate_context
                        .metadata
                        .insert("protocol".to_string(), info.proto());
                    validate_context
                        .metadata
                        .insert("cipher".to_string(), info.cipher());

                    session.context = Context {
                        sent: true,
                        ..Default::default()
                    };

                    internal!(
                        level = DEBUG,
                        "Connection successfully upgraded with {info:#?}"
                    );
                } else {
                    session.handle_command_loop(validate_context).await?;
                }
            }
        }

        let mut validate_context = context::Context {
            banner: Arc::clone(&self.banner),
            max_message_size: self.max_message_size,
            // Fast path: if init_context is empty, use default. Otherwise copy entries.
            // This avoids HashMap clone in the common case (empty init_context)
            metadata: if self.init_context.is_empty() {
                AHashMap::new()
            } else {
                self.init_context
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect()
            },
            ..Default::default()
        };

        self.emit(&mut validate_context).await;

        let result = run_inner(self, &mut validate_context).await;

        internal!("Connection closed");

        result
    }

    /// Handle the main command receive loop with a state-aware timeout.
    ///
    /// # Errors
    /// Returns `SessionError` if a timeout occurs or connection error happens.
    async fn handle_command_loop(
        &mut self,
        validate_context: &mut context::Context,
    ) -> Result<(), SessionError> {
        let timeout_secs = self.get_timeout_secs();
        let timeout_duration = std::time::Duration::from_secs(timeout_secs);

        match tokio::time::timeout(timeout_duration, self.receive(validate_context)).await {
            Ok(close) => {
                let _ = close?;
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    peer = ?self.peer,
                    state = ?self.context.state,
                    timeout_secs = timeout_secs,
                    "Client connection timed out"
                );
                Err(SessionError::Timeout(timeout_secs))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use empath_common::{
        config::{ListenerFlags, SessionLimits},
        context::Context,
        status::Status,
    };
    use empath_spool::{BackingStore, TestBackingStore};

    use crate::{
        State,
        session::{Session, SessionConfig},
        state,
    };

    /// Drives one command through a session built over a `tokio::io::duplex` pair: writes
    /// `line` on the client half, then runs `receive()`/`response()` on the session and
    /// clears `context.response` the way `run_inner` does between commands. A duplex pair
    /// (rather than a pre-loaded `Cursor`) is needed here because the commands are sent one
    /// at a time, each only after the previous reply — otherwise the new pipelining check
    /// would see every not-yet-issued command sitting in the buffer at once and reject it.
    async fn roundtrip(
        session: &mut Session<tokio::io::DuplexStream>,
        client: &mut tokio::io::DuplexStream,
        context: &mut Context,
        line: &str,
    ) -> Option<Vec<String>> {
        use tokio::io::AsyncWriteExt;
        client.write_all(line.as_bytes()).await.unwrap();
        let _ = session.receive(context).await;
        let (lines, _) = session.response(context).await;
        context.response = None;
        session.context.sent = true;
        lines
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn session() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let cursor = Cursor::<Vec<u8>>::default();

        let mut session = Session::create(
            cursor,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .build(),
        );

        let response = session.response(&mut context).await;
        assert!(response.0.is_some());
        assert_eq!(
            response.0.unwrap().first().unwrap(),
            &format!("{} {banner}", Status::ServiceReady)
        );

        let response = session.receive(&mut context).await;
        assert!(response.is_ok_and(|v| v));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn helo() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let host = "Test";
        let mut cursor = Cursor::<Vec<u8>>::default();
        cursor
            .get_mut()
            .extend_from_slice(format!("HELO {host}\r\n").as_bytes());

        let mut session = Session::create(
            cursor,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None; // Clear response like run_inner does

        // Receive HELO command
        let response = session.receive(&mut context).await;
        assert!(response.is_ok());
        assert!(!response.unwrap());

        let response = session.response(&mut context).await;
        assert!(response.0.is_some());
        assert_eq!(
            response.0.unwrap().first().unwrap(),
            &format!("{} {banner} Hello {host} [::], pleased to meet you", Status::Ok)
        );

        let response = session.receive(&mut context).await;
        assert!(response.is_ok_and(|v| v));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn noop_is_legal_in_every_phase_and_never_advances_state() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;

        let reply = roundtrip(&mut session, &mut client, &mut context, "NOOP\r\n").await;
        assert_eq!(
            reply.unwrap().first().unwrap(),
            &format!("{} 2.0.0 Ok", Status::Ok)
        );
        assert!(matches!(session.context.state, State::Connect(_)));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn kick_disposes_session_after_threshold_commands_without_progress() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(8192);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .with_limits(SessionLimits {
                    kick_threshold: 5,
                    ..SessionLimits::default()
                })
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;

        let mut last_reply = None;
        for _ in 0..5 {
            last_reply = roundtrip(&mut session, &mut client, &mut context, "NOOP\r\n").await;
        }

        assert_eq!(
            last_reply.unwrap().first().unwrap(),
            &format!("{} 4.7.0 Too many commands without progress", Status::Unavailable)
        );
        assert!(matches!(session.context.state, State::Reject(_)));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn oversize_line_is_rejected_and_session_disposed() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .with_limits(SessionLimits {
                    line_max: 16,
                    ..SessionLimits::default()
                })
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;

        // No CRLF: the line never terminates before hitting the 16-byte cap.
        let reply = roundtrip(&mut session, &mut client, &mut context, "HELO way-too-long-a-name").await;
        assert_eq!(
            reply.unwrap().first().unwrap(),
            &format!("{} 5.0.0 Line too long", Status::CommandUnrecognized)
        );
        assert!(matches!(session.context.state, State::Reject(_)));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn pipelined_commands_are_rejected() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;

        // Two commands written in the same burst, without waiting for a reply in between.
        let reply = roundtrip(
            &mut session,
            &mut client,
            &mut context,
            "HELO test\r\nNOOP\r\n",
        )
        .await;

        assert_eq!(
            reply.unwrap().first().unwrap(),
            &format!("{} 5.0.0 Pipelining not supported", Status::CommandUnrecognized)
        );
        assert!(matches!(session.context.state, State::Reject(_)));
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn starttls_require_blocks_mail_from_until_tls_is_active() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .with_flags(ListenerFlags {
                    starttls: true,
                    starttls_require: true,
                    ..ListenerFlags::default()
                })
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;
        let _ = roundtrip(&mut session, &mut client, &mut context, "HELO test\r\n").await;

        let reply = roundtrip(
            &mut session,
            &mut client,
            &mut context,
            "MAIL FROM:<a@example.com>\r\n",
        )
        .await;

        assert_eq!(
            reply.unwrap().first().unwrap(),
            &format!(
                "{} 5.7.0 Must issue a STARTTLS command first",
                Status::StartTlsRequired
            )
        );
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn max_mail_limit_is_enforced() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let (mut client, server) = tokio::io::duplex(4096);
        let mut session = Session::create(
            server,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_banner(banner.to_string())
                .with_limits(SessionLimits {
                    max_mail: 0,
                    ..SessionLimits::default()
                })
                .build(),
        );

        let _ = session.response(&mut context).await;
        context.response = None;
        let _ = roundtrip(&mut session, &mut client, &mut context, "HELO test\r\n").await;

        let reply = roundtrip(
            &mut session,
            &mut client,
            &mut context,
            "MAIL FROM:<a@example.com>\r\n",
        )
        .await;

        assert_eq!(
            reply.unwrap().first().unwrap(),
            &format!(
                "{} 4.5.3 Too many messages on this session",
                Status::ActionUnavailable
            )
        );
    }

    #[tokio::test]
    #[cfg_attr(all(target_os = "macos", miri), ignore)]
    async fn spool_integration() {
        let banner = "testing";
        let mut context = Context {
            banner: banner.into(),
            max_message_size: 0,
            ..Default::default()
        };

        let mut cursor = Cursor::<Vec<u8>>::default();
        let wire_body = b"Subject: Test\r\n\r\nHello World\r\n.\r\n";
        cursor.get_mut().extend_from_slice(wire_body);

        let mock_spool = std::sync::Arc::new(TestBackingStore::default());

        let mut session = Session::create(
            cursor,
            "[::]:25".parse().unwrap(),
            SessionConfig::builder()
                .with_spool(Some(mock_spool.clone()))
                .with_banner(banner.to_string())
                .build(),
        );

        let mut sender_addrs = mailparse::addrparse("test@example.com").unwrap();
        context.envelope.sender = Some(sender_addrs.remove(0).into());
        context.envelope.recipients = mailparse::addrparse("recipient@example.com")
            .unwrap()
            .into_iter()
            .map(std::convert::Into::into)
            .collect();

        // Ready to receive DATA; response() transitions Data -> Reading and replies "354 ...".
        session.context.state = State::Data(state::Data);
        let (lines, _) = session.response(&mut context).await;
        assert!(lines.is_some_and(|l| l.first().is_some_and(|l| l.starts_with("354"))));
        context.response = None;

        // Client streams the (dot-stuffed) body; handle_data_reception unstuffs it, masks
        // 8-bit content, prepends the Received header, and transitions to PostDot.
        let response = session.receive(&mut context).await;
        assert!(response.is_ok());
        assert!(matches!(session.context.state, State::PostDot(_)));

        let response = session.response(&mut context).await;
        assert!(response.0.is_some());

        mock_spool
            .wait_for_count(1, std::time::Duration::from_secs(5))
            .await
            .expect("Spool operation should complete within timeout");

        assert_eq!(mock_spool.message_count(), 1);
        let ids = mock_spool.list().await.unwrap();
        let spooled_msg_id = ids.first().unwrap();
        let spooled_msg = mock_spool.read(spooled_msg_id).await.unwrap();

        let spooled = spooled_msg.data.expect("message should have been spooled");
        let spooled = std::str::from_utf8(&spooled).unwrap();
        assert!(spooled.starts_with("Received: from "));
        assert!(spooled.ends_with("Subject: Test\r\n\r\nHello World\r\n"));
    }
}

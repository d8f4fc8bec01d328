use std::borrow::Cow;

use empath_common::{context, error::SessionError, incoming, internal, status::Status};
use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroize;

use crate::{
    State,
    body,
    command::Command,
    received,
    sasl::{Mechanism, Progress, SaslExchange},
    session_state::SessionState,
    state::{self, Phase},
    transaction_handler::SmtpTransactionHandler,
};

use super::{Context, Session};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Receive and process data from the client.
    ///
    /// Frames input into CRLF-terminated lines before handing a line to the command or SASL
    /// dispatcher; `BODY` state bypasses the framer entirely and streams raw bytes to
    /// [`Self::handle_data_reception`], which finds its own terminator.
    ///
    /// Returns `Ok(true)` if the connection should be closed, `Ok(false)` to continue.
    ///
    /// # Errors
    /// Returns `SessionError` if there's a protocol error or I/O failure.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, ret)]
    pub(super) async fn receive(
        &mut self,
        validate_context: &mut context::Context,
    ) -> Result<bool, SessionError> {
        let mut received_data = [0; 4096];

        match self.connection.receive(&mut received_data).await {
            // Consider any errors received here to be fatal
            Err(err) => {
                internal!("Error: {err}");
                Err(SessionError::Protocol(err.to_string()))
            }
            Ok(0) => {
                // Reading 0 bytes means the other side has closed the
                // connection or is done writing, then so are we.
                Ok(true)
            }
            Ok(bytes_read) => {
                let received = &received_data[..bytes_read];

                if matches!(self.context.state, State::Reading(_)) {
                    self.handle_data_reception(received, validate_context);
                    return Ok(false);
                }

                self.cmd_buf.extend_from_slice(received);

                let Some(newline_pos) = self.cmd_buf.iter().position(|&b| b == b'\n') else {
                    if self.cmd_buf.len() >= self.limits.line_max {
                        self.reject_line_too_long(validate_context);
                    }
                    return Ok(false);
                };

                let mut line: Vec<u8> = self.cmd_buf.drain(..=newline_pos).collect();
                let residual = !self.cmd_buf.is_empty();

                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                if line.len() >= self.limits.line_max {
                    self.reject_line_too_long(validate_context);
                    return Ok(false);
                }

                if self.pending.is_auth_pending() {
                    self.handle_auth_continuation(&line, validate_context).await;
                } else {
                    self.handle_command_reception(&line, validate_context).await;
                }

                if residual
                    && !matches!(self.context.state, State::Reading(_))
                    && !self.pending.is_auth_pending()
                {
                    self.reject_pipelining(validate_context);
                }

                Ok(false)
            }
        }
    }

    /// Handle reception of message data (during DATA state)
    fn handle_data_reception(&mut self, received: &[u8], validate_context: &mut context::Context) {
        // Check if adding received data would exceed limit (BEFORE extending buffer)
        // This prevents the buffer overflow vulnerability where an attacker could
        // consume up to max_message_size + 4095 bytes before being rejected
        // Use checked_add to prevent integer overflow on 32-bit systems
        if self.max_message_size > 0 {
            let total_size = self.context.message.len().saturating_add(received.len());

            if total_size > self.max_message_size {
                validate_context.response = Some((
                    Status::ExceededStorage,
                    Cow::Owned(format!(
                        "Actual message size {total_size} bytes exceeds maximum allowed size {} bytes",
                        self.max_message_size
                    )),
                ));
                self.context.state = State::Close(state::Close);
                self.context.sent = false;
                return;
            }
        }

        self.context.message.extend(received);

        if self.context.message.ends_with(b"\r\n.\r\n") {
            // Move the message buffer to avoid double cloning
            let message = std::mem::take(&mut self.context.message);

            self.context = Context {
                state: State::PostDot(state::PostDot),
                message: message.clone(),
                sent: false,
            };

            let mut body = body::unstuff(&message);

            if validate_context.envelope.params.get("BODY").map(String::as_str)
                != Some("8BITMIME")
            {
                body::downgrade_8bit(&mut body);
            }

            let mut with_header = received::build(validate_context, self.peer, &self.banner)
                .into_bytes();
            with_header.extend_from_slice(&body);

            validate_context.data = Some(with_header.into());
        }
    }

    /// Handle reception of a single SMTP command line.
    async fn handle_command_reception(
        &mut self,
        received: &[u8],
        validate_context: &mut context::Context,
    ) {
        if self.bump_kick(validate_context) {
            return;
        }

        let command = Command::try_from(received).unwrap_or_else(|e| e);
        let message = command.inner().as_bytes().to_vec();

        incoming!("{command}");

        if matches!(command, Command::Invalid(_)) {
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((
                Status::CommandUnrecognized,
                Cow::Borrowed("Command unrecognized"),
            ));
            return;
        }

        if matches!(command, Command::Noop) {
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((Status::Ok, Cow::Borrowed("2.0.0 Ok")));
            return;
        }

        let phase = self.context.state.phase();

        if let Err(violation) = state::phase_check(phase, &command) {
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((
                Status::InvalidCommandSequence,
                Cow::Borrowed(violation.reply()),
            ));
            return;
        }

        if matches!(command, Command::Rset) && phase == Phase::Init {
            // INIT-phase RSET is a no-op: there is no identity or transaction to clear yet.
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((Status::Ok, Cow::Borrowed("2.0.0 Reset state")));
            return;
        }

        if matches!(command, Command::Data) && matches!(self.context.state, State::MailFrom(_)) {
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((
                Status::InvalidCommandSequence,
                Cow::Borrowed("5.5.1 No recipient specified"),
            ));
            return;
        }

        if matches!(command, Command::MailFrom(..)) {
            if self.listener_flags.requires_tls_before_mail() && !self.tls_active {
                self.context.message = message;
                self.context.sent = false;
                validate_context.response = Some((
                    Status::StartTlsRequired,
                    Cow::Borrowed("5.7.0 Must issue a STARTTLS command first"),
                ));
                return;
            }

            if self.listener_flags.requires_auth_before_mail() && !self.authenticated {
                self.context.message = message;
                self.context.sent = false;
                validate_context.response = Some((
                    Status::StartTlsRequired,
                    Cow::Borrowed("5.7.0 Must authenticate first"),
                ));
                return;
            }

            if self.mail_count >= self.limits.max_mail {
                self.context.message = message;
                self.context.sent = false;
                validate_context.response = Some((
                    Status::ActionUnavailable,
                    Cow::Borrowed("4.5.3 Too many messages on this session"),
                ));
                return;
            }
        }

        if matches!(command, Command::RcptTo(_)) && self.rcpt_count >= self.limits.max_rcpt {
            self.context.message = message;
            self.context.sent = false;
            validate_context.response = Some((
                Status::ActionUnavailable,
                Cow::Borrowed("4.5.3 Too many recipients"),
            ));
            return;
        }

        if let Command::Auth(mechanism, initial_response) = command {
            self.context.message = message;
            self.context.sent = false;
            self.start_auth(&mechanism, initial_response.as_deref(), validate_context)
                .await;
            return;
        }

        let is_helo = matches!(command, Command::Helo(_));
        let is_mail_from = matches!(command, Command::MailFrom(..));
        let is_rcpt_to = matches!(command, Command::RcptTo(_));
        let is_rset = matches!(command, Command::Rset);

        let mut session_state = SessionState::from_context(validate_context);
        let new_state = self
            .context
            .state
            .clone()
            .transition_protocol(command, &mut session_state);
        session_state.sync_to_context(validate_context);

        self.context = Context {
            state: new_state,
            message,
            sent: false,
        };

        if is_helo && matches!(self.context.state, State::Ehlo(_) | State::Helo(_)) {
            self.reset_kick();
        }

        if is_mail_from && matches!(self.context.state, State::MailFrom(_)) {
            self.rcpt_count = 0;
        }

        if is_rcpt_to && matches!(self.context.state, State::RcptTo(_)) {
            self.rcpt_count = self.rcpt_count.saturating_add(1);
            self.decrement_kick();
        }

        if is_rset && matches!(self.context.state, State::Ehlo(_) | State::Helo(_)) {
            self.rcpt_count = 0;
        }

        tracing::debug!("Transitioned to {:#?}", self.context);
    }

    /// Begin an `AUTH` exchange (RFC 4954). Only valid once the listener advertises `AUTH`,
    /// the connection is running over TLS, and this session hasn't already authenticated.
    async fn start_auth(
        &mut self,
        mechanism: &str,
        initial_response: Option<&str>,
        validate_context: &mut context::Context,
    ) {
        if !self.listener_flags.auth || !self.tls_active || self.authenticated {
            validate_context.response = Some((
                Status::InvalidCommandSequence,
                Cow::Borrowed("5.5.1 Command not allowed at this point."),
            ));
            return;
        }

        let Some(parsed) = Mechanism::parse(mechanism) else {
            validate_context.response = Some((
                Status::AuthMechanismNotSupported,
                Cow::Owned(format!("AUTH method \"{mechanism}\" not supported")),
            ));
            return;
        };

        let mut exchange = SaslExchange::new(parsed);
        let progress = exchange.begin(initial_response);
        self.apply_auth_progress(progress, Some(exchange), validate_context)
            .await;
    }

    /// Feed a raw line from the client into the in-progress AUTH exchange.
    async fn handle_auth_continuation(
        &mut self,
        received: &[u8],
        validate_context: &mut context::Context,
    ) {
        if self.bump_kick(validate_context) {
            return;
        }

        let line = String::from_utf8_lossy(received).trim().to_string();

        if line == "*" {
            self.pending.take_auth();
            validate_context.response = Some((
                Status::Unknown(501),
                Cow::Borrowed("Syntax error"),
            ));
            self.return_to_identified_state(validate_context);
            return;
        }

        let Some(mut exchange) = self.pending.take_auth() else {
            return;
        };
        let progress = exchange.respond(&line);
        self.apply_auth_progress(progress, Some(exchange), validate_context)
            .await;
    }

    /// Act on the result of feeding a line into a [`SaslExchange`], either continuing the
    /// exchange, authenticating decoded credentials, or reporting failure. A completed
    /// exchange (success or failure) always returns the session to state HELO/EHLO.
    async fn apply_auth_progress(
        &mut self,
        progress: Progress,
        exchange: Option<SaslExchange>,
        validate_context: &mut context::Context,
    ) {
        match progress {
            Progress::Continue { prompt } => {
                if let Some(exchange) = exchange {
                    // Already validated unique by construction; a stray in-flight exchange
                    // here would be a bug, not a client-triggerable error.
                    let _ = self.pending.start_auth(exchange);
                }
                validate_context.response =
                    Some((Status::AuthContinue, Cow::Owned(prompt.to_string())));
            }
            Progress::Done {
                username,
                mut password,
            } => {
                let authenticated = match self.transaction_handler.auth_backend() {
                    Some(backend) => backend.authenticate("PLAIN", &username, &password).await,
                    None => false,
                };

                password.zeroize();

                validate_context.response = Some(if authenticated {
                    self.authenticated = true;
                    self.reset_kick();
                    (Status::AuthSuccessful, Cow::Borrowed("Authentication succeeded"))
                } else {
                    (Status::AuthFailed, Cow::Borrowed("Authentication failed"))
                });

                self.return_to_identified_state(validate_context);
            }
            Progress::Failed(_reason) => {
                validate_context.response = Some((Status::Unknown(501), Cow::Borrowed("Syntax error")));
                self.return_to_identified_state(validate_context);
            }
        }
    }

    /// After an AUTH exchange concludes (success or failure), commands resume from state
    /// HELO/EHLO, whichever the client originally used to identify itself.
    fn return_to_identified_state(&mut self, validate_context: &context::Context) {
        self.context = Context {
            state: if validate_context.extended {
                State::Ehlo(state::Ehlo {
                    id: validate_context.id.clone(),
                })
            } else {
                State::Helo(state::Helo {
                    id: validate_context.id.clone(),
                })
            },
            message: Vec::new(),
            sent: false,
        };
    }
}

use std::borrow::Cow;

use empath_common::{context, status::Status};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{State, state};

use super::{Context, Session};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Registers forward progress: a successful HELO/EHLO, AUTH, TLS start, or message
    /// commit resets the no-progress counter.
    pub(super) fn reset_kick(&mut self) {
        self.kick_count = 0;
    }

    /// A recipient was accepted: decrement (not reset) the no-progress counter, rather than
    /// letting a long run of RCPTs fully refill the budget.
    pub(super) fn decrement_kick(&mut self) {
        self.kick_count = self.kick_count.saturating_sub(1);
    }

    /// Counts one command (or SASL sub-line) against the kick threshold. Returns `true` if
    /// the session was disposed as a result, in which case the caller must not process the
    /// command any further.
    pub(super) fn bump_kick(&mut self, validate_context: &mut context::Context) -> bool {
        self.kick_count = self.kick_count.saturating_add(1);

        if self.kick_count < self.limits.kick_threshold {
            return false;
        }

        tracing::warn!(
            peer = ?self.peer,
            metric = "smtp.kick",
            "session kicked: no forward progress within threshold"
        );

        validate_context.response = Some((
            Status::Unavailable,
            Cow::Borrowed("4.7.0 Too many commands without progress"),
        ));
        self.context = Context {
            state: State::Reject(state::Reject),
            message: Vec::new(),
            sent: false,
        };

        true
    }

    /// A line exceeded `SMTP_LINE_MAX` (or never found its terminator before the buffer
    /// hit that cap). Disposes the session; the client gets one final reply.
    pub(super) fn reject_line_too_long(&mut self, validate_context: &mut context::Context) {
        self.cmd_buf.clear();
        validate_context.response = Some((
            Status::CommandUnrecognized,
            Cow::Borrowed("5.0.0 Line too long"),
        ));
        self.context = Context {
            state: State::Reject(state::Reject),
            message: Vec::new(),
            sent: false,
        };
    }

    /// Bytes remained in the line buffer after a command outside `BODY` state: the client
    /// sent more than one command without waiting for a reply. Disposes the session.
    pub(super) fn reject_pipelining(&mut self, validate_context: &mut context::Context) {
        self.cmd_buf.clear();
        validate_context.response = Some((
            Status::CommandUnrecognized,
            Cow::Borrowed("5.0.0 Pipelining not supported"),
        ));
        self.context = Context {
            state: State::Reject(state::Reject),
            message: Vec::new(),
            sent: false,
        };
    }
}

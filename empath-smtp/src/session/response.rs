use empath_common::{context, status::Status};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    session::{Event, Response, Session},
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Format and return the response to send to the client
    ///
    /// This is a pure formatter - all validation and work happens in `emit()`.
    /// Just formats the response based on state and what `emit()` set in the context.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, ret)]
    pub(super) async fn response(&mut self, validate_context: &mut context::Context) -> Response {
        if self.context.sent {
            return (None, Event::ConnectionKeepAlive);
        }

        // Emit events, do validation and work first
        self.emit(validate_context).await;

        // If emit() (or an out-of-band exchange like AUTH, a kick, a line-too-long or
        // pipelining rejection) set a response, use it. `Reject` always means this session
        // is being disposed of after one final reply, regardless of whether the reply code
        // itself is permanent (kick uses 421, a temporary code, but still ends the session).
        if let Some((status, ref message)) = validate_context.response {
            let event = if matches!(self.context.state, State::Reject(_)) {
                Event::ConnectionClose
            } else {
                Event::ConnectionKeepAlive
            };

            return (Some(vec![format!("{status} {message}")]), event);
        }

        // Otherwise, provide default responses for states not handled by emit()
        self.default_response(validate_context)
    }

    /// Provide default responses for states not handled by `emit()`
    fn default_response(&mut self, validate_context: &context::Context) -> Response {
        match &self.context.state {
            State::Connect(_) => (
                Some(vec![format!("{} {}", Status::ServiceReady, self.banner)]),
                Event::ConnectionKeepAlive,
            ),
            State::Helo(helo) => (
                Some(vec![format!(
                    "{} {} Hello {} [{}], pleased to meet you",
                    Status::Ok,
                    self.banner,
                    helo.id,
                    self.peer.ip(),
                )]),
                Event::ConnectionKeepAlive,
            ),
            State::Ehlo(ehlo) => self.ehlo_response(&ehlo.id),
            State::Help(help) => (
                Some(vec![format!(
                    "{} Commands supported: {}",
                    Status::HelpMessage,
                    if help.from_ehlo { "EHLO" } else { "HELO" }
                )]),
                Event::ConnectionKeepAlive,
            ),
            State::StartTls(_) => self.starttls_response(),
            State::Data(_) => self.data_response(validate_context),
            State::MailFrom(_) => (
                Some(vec![format!("{} Ok", Status::Ok)]),
                Event::ConnectionKeepAlive,
            ),
            State::RcptTo(_) => (
                Some(vec![format!("{} 2.0.0 Recipient ok", Status::Ok)]),
                Event::ConnectionKeepAlive,
            ),
            State::Quit(_) => (
                Some(vec![format!("{} 2.0.0 Bye", Status::GoodBye)]),
                Event::ConnectionClose,
            ),
            State::Invalid(_) => (
                Some(vec![format!(
                    "{} {}",
                    Status::InvalidCommandSequence,
                    self.context.state
                )]),
                Event::ConnectionClose,
            ),
            State::Reject(_) => {
                // Reject should have response set by emit(), but provide fallback
                (
                    Some(vec![format!("{} Unavailable", Status::Unavailable)]),
                    Event::ConnectionClose,
                )
            }
            // States handled by emit() (Connect, PostDot) should have set a response.
            // States like Reading, Close, and others don't need one.
            _ => (None, Event::ConnectionKeepAlive),
        }
    }

    /// EHLO reply: greeting followed by the fixed-order advertisement block — unconditional
    /// `8BITMIME`/`ENHANCEDSTATUSCODES`/`SIZE`, then `STARTTLS` and `AUTH` when this
    /// listener's flags and the connection's TLS/auth state make them applicable, then
    /// `HELP`.
    fn ehlo_response(&self, client_id: &str) -> Response {
        let mut lines = vec![format!(
            "{}-{} Hello {client_id} [{}], pleased to meet you",
            Status::Ok,
            self.banner,
            self.peer.ip(),
        )];

        lines.push(format!("{}-8BITMIME", Status::Ok));
        lines.push(format!("{}-ENHANCEDSTATUSCODES", Status::Ok));
        lines.push(format!("{}-SIZE {}", Status::Ok, self.max_message_size));

        if self.tls_context.is_some() && !self.tls_active {
            lines.push(format!("{}-STARTTLS", Status::Ok));
        }

        if self.listener_flags.auth && self.tls_active && !self.authenticated {
            lines.push(format!("{}-AUTH PLAIN LOGIN", Status::Ok));
        }

        lines.push(format!("{} HELP", Status::Ok));

        (Some(lines), Event::ConnectionKeepAlive)
    }

    /// Generate response for STARTTLS command
    fn starttls_response(&self) -> Response {
        if self.tls_context.is_some() {
            (
                Some(vec![format!("{} Ready to start TLS", Status::ServiceReady)]),
                Event::ConnectionKeepAlive,
            )
        } else {
            (
                Some(vec![format!("{} TLS not available", Status::Error)]),
                Event::ConnectionClose,
            )
        }
    }

    /// Generate response for DATA command and transition to Reading state
    fn data_response(&mut self, validate_context: &context::Context) -> Response {
        self.context.state = State::Reading(crate::state::Reading);

        // Pre-allocate message buffer based on SIZE parameter if declared
        if let Some(size_str) = validate_context.envelope.params.get("SIZE")
            && let Ok(declared_size) = size_str.parse::<usize>()
        {
            self.context.message.reserve(declared_size);
        }

        (
            Some(vec![format!(
                "{} Enter mail, end with \".\" on a lineby itself",
                Status::StartMailInput
            )]),
            Event::ConnectionKeepAlive,
        )
    }
}

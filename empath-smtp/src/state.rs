use core::fmt::{self, Display, Formatter};

use empath_common::address::Address;
use serde::{Deserialize, Serialize};

use crate::{
    command::{Command, HeloVariant},
    session_state::SessionState,
};

/// Sealed trait to prevent external state implementations
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for valid SMTP states
pub trait SmtpState: sealed::Sealed + core::fmt::Debug {}

// ============================================================================
// State Definitions
// ============================================================================

/// Initial connection state - client just connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect;

/// After successful EHLO command (extended SMTP)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ehlo {
    pub id: String,
}

/// After successful HELO command (basic SMTP)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Helo {
    pub id: String,
}

/// HELP command was issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Help {
    pub from_ehlo: bool,
}

/// After successful STARTTLS negotiation (only from EHLO/HELO, not mid-transaction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTls;

/// After MAIL FROM command (beginning of mail transaction)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailFrom {
    pub sender: Option<Address>,
    pub params: super::MailParameters,
}

/// After RCPT TO command (at least one recipient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcptTo {
    pub sender: Option<Address>,
    pub params: super::MailParameters,
}

/// After DATA command (ready to receive message body)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data;

/// Reading message data (after DATA command, before end-of-data marker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading;

/// After end-of-data marker (.\r\n), message complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDot;

/// Client issued QUIT command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quit;

/// Invalid command or sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalid {
    pub reason: String,
}

/// Connection rejected by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject;

/// Connection closing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close;

// ============================================================================
// Sealed Trait Implementations
// ============================================================================

impl sealed::Sealed for Connect {}
impl sealed::Sealed for Ehlo {}
impl sealed::Sealed for Helo {}
impl sealed::Sealed for Help {}
impl sealed::Sealed for StartTls {}
impl sealed::Sealed for MailFrom {}
impl sealed::Sealed for RcptTo {}
impl sealed::Sealed for Data {}
impl sealed::Sealed for Reading {}
impl sealed::Sealed for PostDot {}
impl sealed::Sealed for Quit {}
impl sealed::Sealed for Invalid {}
impl sealed::Sealed for Reject {}
impl sealed::Sealed for Close {}

impl SmtpState for Connect {}
impl SmtpState for Ehlo {}
impl SmtpState for Helo {}
impl SmtpState for Help {}
impl SmtpState for StartTls {}
impl SmtpState for MailFrom {}
impl SmtpState for RcptTo {}
impl SmtpState for Data {}
impl SmtpState for Reading {}
impl SmtpState for PostDot {}
impl SmtpState for Quit {}
impl SmtpState for Invalid {}
impl SmtpState for Reject {}
impl SmtpState for Close {}

// ============================================================================
// State Enum for Dynamic Dispatch
// ============================================================================

/// Type-safe state enum that wraps all possible states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Connect(Connect),
    Ehlo(Ehlo),
    Helo(Helo),
    Help(Help),
    StartTls(StartTls),
    MailFrom(MailFrom),
    RcptTo(RcptTo),
    Data(Data),
    Reading(Reading),
    PostDot(PostDot),
    Quit(Quit),
    Invalid(Invalid),
    Reject(Reject),
    Close(Close),
}

impl Default for State {
    fn default() -> Self {
        Self::Connect(Connect)
    }
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Reading(_) | Self::PostDot(_) => "",
            Self::Connect(_) => "Connect",
            Self::Close(_) => "Close",
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
            Self::Help(_) => "HELP",
            Self::StartTls(_) => "STARTTLS",
            Self::MailFrom(_) => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data(_) => "DATA",
            Self::Quit(_) => "QUIT",
            Self::Invalid(_) => "INVALID",
            Self::Reject(_) => "Rejected",
        })
    }
}

// ============================================================================
// Type-Safe Transition Methods
// ============================================================================

impl State {
    /// Transition from current state based on received command.
    ///
    /// Enforces valid state transitions at runtime while using type-safe state structs
    /// internally. Operates purely on protocol-level [`SessionState`]; collaborator
    /// dispatch (resolver/filter/queue/auth) happens around this call, not inside it.
    #[must_use]
    pub fn transition_protocol(self, command: Command, ctx: &mut SessionState) -> Self {
        match (self, command) {
            // Connect state transitions
            (Self::Connect(_), Command::Helo(HeloVariant::Ehlo(id))) => {
                ctx.id.clone_from(&id);
                ctx.extended = true;
                Self::Ehlo(Ehlo { id })
            }
            (Self::Connect(_), Command::Helo(HeloVariant::Helo(id))) => {
                ctx.id.clone_from(&id);
                Self::Helo(Helo { id })
            }

            // EHLO/HELO transitions (can do STARTTLS or HELP)
            (Self::Ehlo(_) | Self::Helo(_), Command::StartTLS) if ctx.extended => {
                Self::StartTls(StartTls)
            }
            (Self::Ehlo(_), Command::Help) => Self::Help(Help { from_ehlo: true }),
            (Self::Helo(_), Command::Help) => Self::Help(Help { from_ehlo: false }),

            // Begin mail transaction (only from authenticated/ready states, NOT from MailFrom/RcptTo/Data)
            (
                Self::Ehlo(_)
                | Self::Helo(_)
                | Self::StartTls(_)
                | Self::Help(_)
                | Self::PostDot(_),
                Command::MailFrom(sender, params),
            ) => {
                ctx.envelope.sender_mut().clone_from(&sender);
                ctx.envelope.params = params.clone().into_map();
                Self::MailFrom(MailFrom { sender, params })
            }

            // Cannot do STARTTLS after mail transaction has started
            (Self::MailFrom(_) | Self::RcptTo(_) | Self::Data(_), Command::StartTLS) => {
                Self::Invalid(Invalid {
                    reason: "STARTTLS not allowed during mail transaction".to_string(),
                })
            }

            // Recipient collection (can add multiple recipients)
            (Self::MailFrom(state), Command::RcptTo(recipients)) => {
                ctx.envelope.recipients_mut().extend_from_slice(&recipients);
                Self::RcptTo(RcptTo {
                    sender: state.sender,
                    params: state.params,
                })
            }
            (Self::RcptTo(state), Command::RcptTo(recipients)) => {
                ctx.envelope.recipients_mut().extend_from_slice(&recipients);
                Self::RcptTo(state) // Stay in RcptTo, accumulating recipients
            }

            // DATA command (must have at least one recipient)
            (Self::RcptTo(_), Command::Data) => Self::Data(Data),

            // After DATA response, client sends message body
            (Self::Data(_), _) => Self::Reading(Reading),

            // RSET clears transaction state and returns to ready state (EHLO or HELO)
            (_, Command::Rset) => {
                ctx.envelope.reset_transaction();
                if ctx.extended {
                    Self::Ehlo(Ehlo { id: ctx.id.clone() })
                } else {
                    Self::Helo(Helo { id: ctx.id.clone() })
                }
            }

            // QUIT from any state
            (_, Command::Quit) => Self::Quit(Quit),

            // AUTH is handled by the SASL sub-state machine, not the protocol FSM; reaching
            // here means AUTH was issued somewhere the grammar doesn't allow it.
            (_, Command::Auth(..)) => Self::Invalid(Invalid {
                reason: "AUTH not allowed in this state".to_string(),
            }),

            // Invalid transitions
            (Self::Invalid(state), _) => Self::Invalid(state),
            (state, _) => Self::Invalid(Invalid {
                reason: format!("Invalid command sequence from {state}"),
            }),
        }
    }

    /// Check if this state represents an error condition
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Reject(_))
    }

    /// Check if this state should close the connection
    #[must_use]
    pub const fn should_close(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::Close(_) | Self::Reject(_))
    }

    /// Check if we're in a mail transaction (between MAIL FROM and `PostDot`)
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        matches!(
            self,
            Self::MailFrom(_) | Self::RcptTo(_) | Self::Data(_) | Self::Reading(_)
        )
    }

    /// The coarse lifecycle stage this state belongs to, used to gate which commands are
    /// grammatically legal before the fine-grained FSM ever sees them.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Connect(_) => Phase::Init,
            Self::MailFrom(_) | Self::RcptTo(_) | Self::Data(_) | Self::Reading(_) | Self::PostDot(_) => {
                Phase::Transaction
            }
            Self::Ehlo(_)
            | Self::Helo(_)
            | Self::Help(_)
            | Self::StartTls(_)
            | Self::Quit(_)
            | Self::Invalid(_)
            | Self::Reject(_)
            | Self::Close(_) => Phase::Setup,
        }
    }
}

/// Coarse session lifecycle stage. Separate from the fine-grained [`State`]; gates which
/// commands are legal before a command ever reaches [`State::transition_protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Setup,
    Transaction,
}

/// Why [`phase_check`] rejected a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseViolation {
    NotAllowed,
    AlreadyIdentified,
}

impl PhaseViolation {
    /// The reply text (including the enhanced status code) for this violation.
    #[must_use]
    pub const fn reply(self) -> &'static str {
        match self {
            Self::NotAllowed => "5.5.1 Command not allowed at this point.",
            Self::AlreadyIdentified => "5.5.1 Already identified.",
        }
    }
}

/// Checks whether `command` is grammatically legal in `phase`. Parse failures
/// ([`Command::Invalid`]) and phase-agnostic commands (QUIT, HELP, NOOP) always pass; those
/// are replied to separately from a phase violation.
///
/// This does not consult listener flags or session state (TLS active, authenticated) — those
/// gates are applied by the caller once phase legality is established.
#[must_use]
pub fn phase_check(phase: Phase, command: &Command) -> Result<(), PhaseViolation> {
    match command {
        Command::Quit | Command::Help | Command::Noop | Command::Invalid(_) => Ok(()),
        Command::Helo(_) => match phase {
            Phase::Init => Ok(()),
            Phase::Setup | Phase::Transaction => Err(PhaseViolation::AlreadyIdentified),
        },
        Command::StartTLS | Command::Auth(..) | Command::MailFrom(..) => match phase {
            Phase::Setup => Ok(()),
            Phase::Init | Phase::Transaction => Err(PhaseViolation::NotAllowed),
        },
        Command::RcptTo(_) | Command::Data => match phase {
            Phase::Transaction => Ok(()),
            Phase::Init | Phase::Setup => Err(PhaseViolation::NotAllowed),
        },
        Command::Rset => match phase {
            Phase::Init | Phase::Transaction => Ok(()),
            Phase::Setup => Err(PhaseViolation::NotAllowed),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

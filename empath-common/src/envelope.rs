//! The mail transaction envelope: routing metadata for one message.
//!
//! Distinct from the message body, the envelope tracks what the protocol layer needs to
//! route and re-issue requests to collaborators as the transaction progresses: the peer's
//! HELO string, the (possibly filter-rewritten) sender, the recipients accepted so far,
//! and the queue-assigned envelope id once one exists.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Routing metadata for a single mail transaction.
///
/// Reset at `MAIL FROM` (new transaction) and by `RSET`; `helo` and `routing_tag` persist
/// across transactions within the same session and are therefore not reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// The HELO/EHLO argument the peer most recently supplied.
    pub helo: String,

    /// A listener-supplied routing tag, carried through to the queue for policy routing.
    /// Empty string if the listener does not assign one.
    pub routing_tag: String,

    /// The sender mailbox from `MAIL FROM`. `None` for the null reverse-path (`<>`).
    pub sender: Option<Address>,

    /// Recipients accepted so far in this transaction (each individually filtered and
    /// submitted to the queue before being appended here).
    pub recipients: Vec<Address>,

    /// ESMTP `MAIL FROM` parameters (`AUTH=`, `BODY=`, ...), preserved for logging and
    /// for the `Received:` trace header. Not reset by the command parser after parsing;
    /// only at the next `MAIL FROM`/`RSET`.
    pub params: AHashMap<String, String>,

    /// Queue-assigned envelope id once `QueueCreateMessage` has succeeded. Zero means no
    /// envelope is currently open (invariant 2, SPEC_FULL §3).
    pub id: u64,
}

impl Envelope {
    /// Returns a reference to the sender for this message.
    #[inline]
    pub const fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Returns a mutable reference to the sender for this message.
    #[inline]
    pub const fn sender_mut(&mut self) -> &mut Option<Address> {
        &mut self.sender
    }

    /// Returns the recipients accepted so far in this transaction.
    #[inline]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Returns a mutable reference to the recipients accepted so far, for appending
    /// as `RCPT TO` commands arrive.
    #[inline]
    pub const fn recipients_mut(&mut self) -> &mut Vec<Address> {
        &mut self.recipients
    }

    /// Clears transaction-scoped state (sender, recipients, params, queue id) while
    /// leaving `helo` and `routing_tag` untouched. Used by both `RSET` and by starting a
    /// fresh `MAIL FROM` after a prior transaction committed.
    pub fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.params.clear();
        self.id = 0;
    }
}

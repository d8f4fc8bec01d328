//! Pluggable collaborators consulted during an SMTP transaction.
//!
//! The transaction handler dispatches to these trait objects instead of a hardcoded
//! plugin list: a resolver can reject a connection before the greeting, a filter can
//! reject a sender/recipient/message, and an auth backend validates SASL credentials.
//! Each is optional; a session built without one treats the corresponding step as
//! trivially accepted, which keeps the handler usable in tests without wiring policy.

use async_trait::async_trait;
use empath_common::{address::Address, context::Context};

/// Resolves trust for a connecting peer (reverse DNS, DNSBL, greylisting, ...).
///
/// Consulted once, at `Connect`, before the greeting is sent.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &Context) -> bool;
}

/// Policy filtering applied to envelope data as the transaction progresses.
///
/// Each hook defaults to accepting; implementors override only the checks they need.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter_mail_from(&self, _ctx: &Context) -> bool {
        true
    }

    async fn filter_rcpt_to(&self, _ctx: &Context, _recipient: &Address) -> bool {
        true
    }

    async fn filter_message(&self, _ctx: &Context) -> bool {
        true
    }
}

/// Validates SASL credentials presented via `AUTH`.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(&self, mechanism: &str, username: &str, password: &str) -> bool;
}

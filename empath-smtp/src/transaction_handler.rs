//! Business logic handler for SMTP sessions.
//!
//! This module provides the `SmtpTransactionHandler` trait that separates business
//! logic (validation, spooling, collaborator dispatch) from protocol state management
//! (FSM) and I/O orchestration.

use std::{borrow::Cow, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use empath_common::{context::Context, status::Status};
use empath_spool::BackingStore;

use crate::{
    State,
    collaborators::{AuthBackend, Filter, Resolver},
};

/// SMTP transaction handler for business logic.
///
/// This trait separates business concerns (validation, spooling, auditing) from
/// protocol concerns (state transitions) and I/O concerns (send/receive).
///
/// # Lifecycle
///
/// The handler is called after FSM state transitions:
/// 1. FSM transitions to new state (pure protocol logic)
/// 2. `SmtpTransactionHandler` validates the transition (business rules)
/// 3. `SmtpTransactionHandler` performs work (spooling, auditing, etc.)
/// 4. `Response` is generated and sent to client
#[async_trait]
pub trait SmtpTransactionHandler: Send + Sync {
    /// Validate a Connect event (new connection established), before the greeting.
    async fn validate_connect(&mut self, ctx: &mut Context) -> bool;

    /// Validate an EHLO/HELO command.
    async fn validate_ehlo(&mut self, ctx: &mut Context) -> bool;

    /// Validate a MAIL FROM command.
    async fn validate_mail_from(&mut self, ctx: &mut Context) -> bool;

    /// Validate an RCPT TO command.
    async fn validate_rcpt_to(&mut self, ctx: &mut Context) -> bool;

    /// Validate and process a complete message (after the final dot). Both validates and,
    /// if validation passes, performs the spooling work.
    async fn handle_message(&mut self, ctx: &mut Context) -> bool;

    /// The auth backend to consult for an in-progress SASL exchange, if any is configured.
    /// Sessions without an `AuthBackend` report `AUTH` as unsupported via `validate_ehlo`
    /// simply not advertising the extension, so this defaults to `None`.
    fn auth_backend(&self) -> Option<Arc<dyn AuthBackend>> {
        None
    }
}

/// Default SMTP transaction handler: dispatches to pluggable collaborators and spools
/// accepted messages.
pub struct DefaultSmtpTransactionHandler {
    spool: Option<Arc<dyn BackingStore>>,
    resolver: Option<Arc<dyn Resolver>>,
    filter: Option<Arc<dyn Filter>>,
    auth: Option<Arc<dyn AuthBackend>>,
    peer: SocketAddr,
}

impl DefaultSmtpTransactionHandler {
    /// Creates a new default SMTP transaction handler with no collaborators attached;
    /// every validation hook accepts unconditionally until one is attached with the
    /// `with_*` builders.
    #[must_use]
    pub const fn new(spool: Option<Arc<dyn BackingStore>>, peer: SocketAddr) -> Self {
        Self {
            spool,
            resolver: None,
            filter: None,
            auth: None,
            peer,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthBackend>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Spool a message after validation passes.
    ///
    /// Handles writing the message to the spool, setting the success/failure response,
    /// clearing transaction metadata, and audit logging.
    async fn spool_message(&self, ctx: &mut Context) {
        let tracking_id = if let Some(spool) = &self.spool
            && ctx.data.is_some()
        {
            match spool.write(ctx).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!("Failed to spool message: {e}");
                    ctx.response = Some((
                        Status::ActionUnavailable,
                        Cow::Borrowed("Please try again later"),
                    ));
                    return;
                }
            }
        } else {
            None
        };

        ctx.metadata.remove("declared_size");

        ctx.response = Some((
            Status::Ok,
            tracking_id.as_ref().map_or_else(
                || Cow::Borrowed("2.0.0 Message accepted for delivery"),
                |id| Cow::Owned(format!("2.0.0 {id} Message accepted for delivery")),
            ),
        ));

        if let Some(id) = &tracking_id {
            let sender = ctx.sender();
            let recipients = ctx.recipients();
            let size = ctx.data.as_ref().map_or(0, |d| d.len());
            let from_ip = self.peer.to_string();

            empath_common::audit::log_message_received(
                &id.to_string(),
                &sender,
                &recipients,
                size,
                &from_ip,
            );
        }
    }
}

#[async_trait]
impl SmtpTransactionHandler for DefaultSmtpTransactionHandler {
    async fn validate_connect(&mut self, ctx: &mut Context) -> bool {
        match &self.resolver {
            Some(resolver) => resolver.resolve(ctx).await,
            None => true,
        }
    }

    async fn validate_ehlo(&mut self, _ctx: &mut Context) -> bool {
        true
    }

    async fn validate_mail_from(&mut self, ctx: &mut Context) -> bool {
        match &self.filter {
            Some(filter) => filter.filter_mail_from(ctx).await,
            None => true,
        }
    }

    async fn validate_rcpt_to(&mut self, ctx: &mut Context) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        let Some(recipient) = ctx.envelope.recipients().last() else {
            return true;
        };
        filter.filter_rcpt_to(ctx, recipient).await
    }

    async fn handle_message(&mut self, ctx: &mut Context) -> bool {
        if let Some(filter) = &self.filter
            && !filter.filter_message(ctx).await
        {
            return false;
        }

        let should_spool = ctx
            .response
            .as_ref()
            .is_none_or(|(status, _)| !status.is_temporary() && !status.is_permanent());

        if should_spool {
            self.spool_message(ctx).await;
        }

        true
    }

    fn auth_backend(&self) -> Option<Arc<dyn AuthBackend>> {
        self.auth.clone()
    }
}

/// Helper used by the session orchestrator to decide whether to call the business
/// handler after an FSM transition.
#[must_use]
pub const fn requires_validation(state: &State) -> bool {
    matches!(
        state,
        State::Connect(_)
            | State::Ehlo(_)
            | State::Helo(_)
            | State::MailFrom(_)
            | State::RcptTo(_)
            | State::PostDot(_)
    )
}

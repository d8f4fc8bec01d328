//! The business context handed to collaborators and to the spool.
//!
//! `Context` is the one piece of session state that crosses crate boundaries: the session
//! engine builds one at `QueueCommit` time and hands it to the spool's `BackingStore`, and
//! collaborator trait methods receive `&Context` rather than the full session so that they
//! cannot reach into protocol-only state (`kick_count`, `protocol_state`, the socket). This
//! mirrors the split `empath-smtp`'s session state machine already draws between protocol
//! state and business state, extended with the fields the spool needs to persist a
//! committed message.

use std::{borrow::Cow, sync::Arc};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{envelope::Envelope, status::Status};

/// Business-level context for one mail transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// The peer identifier established at EHLO/HELO.
    pub id: String,

    /// Whether the peer used EHLO (extended SMTP) rather than HELO.
    pub extended: bool,

    /// The envelope (sender, recipients, params) for this transaction.
    pub envelope: Envelope,

    /// The message body, once fully received and dot-unstuffed. `None` until end-of-data.
    pub data: Option<Arc<[u8]>>,

    /// Assigned once the spool has accepted the message (the `SpooledMessageId`, rendered
    /// as text); `None` before that point.
    pub tracking_id: Option<String>,

    /// Free-form metadata attached by the protocol layer for diagnostics (e.g. TLS
    /// version/cipher, source listener tag) and by the spool for bookkeeping.
    pub metadata: AHashMap<String, String>,

    /// The greeting banner advertised at connect time (server hostname, typically).
    pub banner: Arc<str>,

    /// Maximum message size in bytes advertised via the SIZE extension. Zero means
    /// unlimited.
    pub max_message_size: usize,

    /// Set by a collaborator (or the protocol layer itself) to override the default
    /// response for the current state. Cleared after each response is sent; never
    /// meaningful to persist, so it's skipped when a `Context` is spooled to disk.
    #[serde(skip)]
    pub response: Option<(Status, Cow<'static, str>)>,
}

impl Context {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Renders the message body as UTF-8 if possible, else a debug-formatted byte dump.
    /// Diagnostic only; the spool and the wire protocol both work on raw bytes.
    #[must_use]
    pub fn message(&self) -> String {
        self.data.as_deref().map_or_else(String::new, |data| {
            std::str::from_utf8(data).map_or_else(|_| format!("{data:#?}"), str::to_string)
        })
    }

    #[must_use]
    pub fn sender(&self) -> String {
        self.envelope
            .sender()
            .map(std::string::ToString::to_string)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        self.envelope
            .recipients()
            .iter()
            .map(std::string::ToString::to_string)
            .collect()
    }
}

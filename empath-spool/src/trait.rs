//! The `BackingStore` trait: the one seam between the spool and the session engine.
//!
//! `empath-smtp` holds an `Arc<dyn BackingStore>` and never cares whether it's writing to
//! disk, memory, or (in tests) a synchronized in-memory store it can wait on.

use async_trait::async_trait;
use empath_common::context::Context;

use crate::types::SpooledMessageId;

/// Persists committed mail transactions and makes them retrievable by id.
///
/// Implementations must be safe to share across connections (`Send + Sync`); the session
/// engine holds one behind an `Arc` for the lifetime of the listener.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Writes a fully-received message to the store, assigning it a new id.
    ///
    /// Implementations should set `context.tracking_id` to the assigned id's string form
    /// before returning, so the caller doesn't have to round-trip it.
    ///
    /// # Errors
    /// Returns an error if the message cannot be persisted (I/O failure, capacity limit).
    async fn write(&self, context: &mut Context) -> crate::Result<SpooledMessageId>;

    /// Lists the ids of all messages currently in the store, oldest first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be enumerated.
    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>>;

    /// Reads back a previously written message.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if no message exists with this id, or an
    /// I/O or deserialization error if the stored message can't be read.
    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Context>;

    /// Overwrites a previously written message in place, e.g. after updating its metadata.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if no message exists with this id.
    async fn update(&self, id: &SpooledMessageId, context: &Context) -> crate::Result<()>;

    /// Removes a message from the store, e.g. after successful delivery.
    ///
    /// # Errors
    /// Returns [`crate::SpoolError::NotFound`] if no message exists with this id.
    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()>;

    /// Prepares the store for use (e.g. creating a spool directory). Stores with nothing
    /// to prepare (memory-backed) accept the default no-op.
    ///
    /// # Errors
    /// Returns an error if the store can't be prepared.
    async fn init(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Runs until `shutdown` fires. Stores with nothing to actively poll accept the
    /// default, which just waits for the signal.
    ///
    /// # Errors
    /// Never fails by default; overridden only by stores with real lifecycle work.
    async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<empath_common::Signal>,
    ) -> crate::Result<()> {
        let _ = shutdown.recv().await;
        Ok(())
    }
}

//! [`Spool<S>`]: lifecycle wrapper around a [`BackingStore`](crate::BackingStore), giving
//! each backend a uniform `init`/`serve` story regardless of what it's backed by.

use crate::r#trait::BackingStore;

/// Owns a backing store and drives its lifecycle (directory setup, graceful shutdown).
///
/// Business logic never touches this type directly; `SpoolConfig::into_backing_store`
/// hands out the inner store as `Arc<dyn BackingStore>` for use by the session engine,
/// while `Spool` itself is held by the process that owns the spool's lifetime.
#[derive(Debug, Clone)]
pub struct Spool<S> {
    store: S,
}

impl<S> Spool<S>
where
    S: BackingStore,
{
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Prepares the backing store for use. Blocks on the async `BackingStore::init` from
    /// sync context, since config parsing (where this is called) isn't itself async.
    ///
    /// # Errors
    /// Returns an error if the store can't be prepared.
    pub fn init(&mut self) -> crate::Result<()> {
        tokio::runtime::Handle::try_current().map_or_else(
            |_| {
                tokio::runtime::Runtime::new()
                    .map_err(|e| crate::SpoolError::Internal(e.to_string()))?
                    .block_on(self.store.init())
            },
            |handle| tokio::task::block_in_place(|| handle.block_on(self.store.init())),
        )
    }

    /// Runs the store's lifecycle until `shutdown` fires.
    ///
    /// # Errors
    /// Returns an error if the store's lifecycle task fails.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<empath_common::Signal>,
    ) -> crate::Result<()> {
        self.store.serve(shutdown).await
    }
}

/// Production spool: messages persisted to disk, one file per message.
pub type FileSpool = Spool<crate::backends::FileBackingStore>;

/// Memory-backed spool: messages live only as long as the process.
pub type MemorySpool = Spool<crate::backends::MemoryBackingStore>;

/// Memory-backed spool instrumented for tests (`wait_for_count`, etc).
pub type TestSpool = Spool<crate::backends::TestBackingStore>;

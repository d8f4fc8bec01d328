use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use empath_common::context::Context;

use crate::{SpoolError, r#trait::BackingStore, types::SpooledMessageId};

/// In-memory backing store implementation
///
/// This implementation stores messages in a `HashMap` protected by an `RwLock`.
/// It's primarily intended for testing, but can also be used for transient
/// message handling.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity to prevent unbounded
/// memory growth. When capacity is reached, write operations will fail with
/// an error. This is useful for:
/// - Testing capacity-related error handling
/// - Preventing memory exhaustion if accidentally used in production
/// - Simulating resource constraints
///
/// # Performance
/// - Write: O(1) -`HashMap` insert + Arc clone (plus capacity check)
/// - List: O(n log n) - Must clone all keys and sort
/// - Read: O(1) - `HashMap` lookup + Context clone
/// - Delete: O(1) - `HashMap` remove
///
/// # Concurrency
/// Uses an `RwLock` for interior mutability. Production workloads should use
/// file-backed or database-backed stores with better concurrency primitives.
#[derive(Debug, Clone)]
pub struct MemoryBackingStore {
    pub(crate) messages: Arc<RwLock<HashMap<SpooledMessageId, Context>>>,
    /// Maximum number of messages to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryBackingStore {
    /// Create a new empty memory-backed store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    /// Create a new memory-backed store with a capacity limit
    ///
    /// # Examples
    /// ```ignore
    /// // Limit to 1000 messages
    /// let store = MemoryBackingStore::with_capacity(1000);
    /// ```
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Get the current number of messages in the store
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn write(&self, context: &mut Context) -> crate::Result<SpooledMessageId> {
        // Generate unique ULID
        let id = SpooledMessageId::generate();

        // Set the tracking ID in the context
        context.tracking_id = Some(id.to_string());

        // Check capacity before inserting (don't count if overwriting existing)
        if let Some(cap) = self.capacity
            && !self.messages.read()?.contains_key(&id)
            && self.len() >= cap
        {
            return Err(SpoolError::Internal(format!(
                "Memory spool capacity exceeded: {}/{} messages",
                self.len(),
                cap
            )));
        }

        self.messages.write()?.insert(id.clone(), context.clone());

        Ok(id)
    }

    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>> {
        let mut ids: Vec<_> = self.messages.read()?.keys().cloned().collect();

        // ULIDs are lexicographically sortable by creation time
        ids.sort();

        Ok(ids)
    }

    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Context> {
        self.messages
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    async fn update(&self, id: &SpooledMessageId, context: &Context) -> crate::Result<()> {
        if self.messages.read()?.contains_key(id) {
            self.messages.write()?.insert(id.clone(), context.clone());
            Ok(())
        } else {
            Err(SpoolError::NotFound(id.clone()))
        }
    }

    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()> {
        self.messages
            .write()?
            .remove(id)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;
        Ok(())
    }
}

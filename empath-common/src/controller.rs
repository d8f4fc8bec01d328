use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;

use crate::{Signal, internal, traits::Serve};

/// Orchestrates a set of listeners, running each until a shutdown signal arrives.
///
/// Generic over the listener type rather than over `Protocol` directly: `empath-smtp`'s
/// `Listener<Proto>` is itself generic over `Proto`, and the bin crate is the only place
/// that needs to name a concrete protocol.
#[derive(Default, Deserialize)]
pub struct Controller<L> {
    #[serde(alias = "listener", default)]
    listeners: Vec<L>,
}

impl<L> Controller<L> {
    /// Gives the caller a chance to attach anything a listener couldn't deserialize
    /// itself (a spool handle, say) before the listeners are run.
    pub fn listeners_mut(&mut self) -> &mut [L] {
        &mut self.listeners
    }
}

impl<L: Serve + Sync> Controller<L> {
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn control(self, shutdown: Receiver<Signal>) -> anyhow::Result<()> {
        internal!(
            level = INFO,
            "Controlling {} listener(s)",
            self.listeners.len()
        );

        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.serve(shutdown.resubscribe())),
        )
        .await
        .into_iter()
        .try_for_each(|result| result)
    }
}

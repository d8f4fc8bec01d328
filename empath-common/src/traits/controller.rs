use tokio::sync::broadcast;

use crate::Signal;

/// Something that runs until it observes a [`Signal::Shutdown`] on its broadcast channel.
///
/// Implemented by `empath-smtp`'s `Listener<Proto>` and driven by [`crate::controller::Controller`].
pub trait Serve {
    fn serve(
        &self,
        shutdown: broadcast::Receiver<Signal>,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

use std::sync::Arc;

use empath_common::{Signal, controller::Controller, internal, logging};
use empath_smtp::{Smtp, listener::Listener};
use empath_spool::SpoolConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration: one or more SMTP listeners plus the spool they share.
#[derive(Default, Deserialize)]
pub struct Empath {
    #[serde(alias = "smtp")]
    smtp: Controller<Listener<Smtp>>,
    #[serde(alias = "spool", default)]
    spool: SpoolConfig,
}

async fn shutdown(sender: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    }

    sender
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Empath {
    /// Runs every configured listener and the spool's own lifecycle task until a shutdown
    /// signal arrives, then waits for them to finish.
    ///
    /// # Errors
    /// Returns an error if the spool fails to initialise or any listener/the spool's
    /// lifecycle task exits with an error.
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();

        let spool = self.spool.into_spool()?;
        let backing_store = spool.backing_store();

        for listener in self.smtp.listeners_mut() {
            listener.set_handler(Smtp::default().with_spool(backing_store.clone()));
        }

        internal!("Empath starting");

        let (shutdown_tx, _) = broadcast::channel(16);

        let result = tokio::select! {
            r = self.smtp.control(shutdown_tx.subscribe()) => r,
            r = spool.serve(shutdown_tx.subscribe()) => r.map_err(Into::into),
            r = shutdown(&shutdown_tx) => r,
        };

        internal!("Empath shutting down");

        result
    }
}

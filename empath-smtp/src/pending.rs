//! Tracks the one out-of-band exchange a session may have in flight.
//!
//! `AUTH` is the only command that steps outside the [`crate::state::State`] grammar into
//! a multi-line exchange of its own; a client can't start a second one (or a fresh `AUTH`)
//! while one is already open, so this holds at most one [`SaslExchange`] at a time.

use crate::sasl::SaslExchange;

#[derive(Default)]
pub struct PendingRequests {
    auth: Option<SaslExchange>,
}

impl PendingRequests {
    /// Begins tracking a new `AUTH` exchange.
    ///
    /// # Errors
    /// Returns an error message if an exchange is already open.
    pub fn start_auth(&mut self, exchange: SaslExchange) -> Result<(), &'static str> {
        if self.auth.is_some() {
            return Err("AUTH exchange already in progress");
        }
        self.auth = Some(exchange);
        Ok(())
    }

    pub fn auth_mut(&mut self) -> Option<&mut SaslExchange> {
        self.auth.as_mut()
    }

    pub fn take_auth(&mut self) -> Option<SaslExchange> {
        self.auth.take()
    }

    #[must_use]
    pub const fn is_auth_pending(&self) -> bool {
        self.auth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::Mechanism;

    #[test]
    fn rejects_second_auth_while_one_is_open() {
        let mut pending = PendingRequests::default();
        assert!(pending.start_auth(SaslExchange::new(Mechanism::Plain)).is_ok());
        assert!(pending.is_auth_pending());
        assert!(pending.start_auth(SaslExchange::new(Mechanism::Login)).is_err());
    }

    #[test]
    fn take_auth_clears_pending_state() {
        let mut pending = PendingRequests::default();
        pending.start_auth(SaslExchange::new(Mechanism::Plain)).unwrap();
        assert!(pending.take_auth().is_some());
        assert!(!pending.is_auth_pending());
    }
}

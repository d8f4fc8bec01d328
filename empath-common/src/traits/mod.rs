pub mod controller;
pub mod fsm;
pub mod protocol;

pub use self::{controller::Serve, fsm::FiniteStateMachine, protocol::Protocol};

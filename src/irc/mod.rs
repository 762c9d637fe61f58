//! IRC client side of the relay.

pub mod codec;
pub mod message;
pub mod queue;
pub mod registration;
pub mod sasl;
pub mod session;
pub mod tls;

pub use session::IrcSession;

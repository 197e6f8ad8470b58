//! The wire frame codec (C3, §4.3, §6.1): message envelopes exchanged
//! between client and server over a reliable ordered byte stream.
//!
//! Every message begins with a 6-byte ASCII magic; [`Message::decode`]
//! dispatches on it and fails closed on anything it doesn't recognize,
//! closing the session (§4.3) rather than guessing a layout.

pub mod frame;
pub mod messages;

pub use frame::RenderFrame;
pub use messages::Message;

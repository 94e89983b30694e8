//! Conversation state machine
//!
//! Pure state transitions in the Elm style: the runtime feeds [`Event`]s
//! through [`transition`] one at a time and executes the returned
//! [`Effect`]s.

mod effect;
pub mod event;
mod message;
pub mod notice;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use message::{Message, MessageLog, Sender, MAX_LOG_ENTRIES};
pub use notice::{describe_server_error, ErrorCode};
pub use state::{ConvContext, ConvState, ConvStatus};
pub use transition::{transition, TransitionError, TransitionResult};

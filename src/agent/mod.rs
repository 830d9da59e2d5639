//! Event dispatch.
//!
//! The dispatcher owns the run loop: it starts the channel, fans events out
//! to the conversation relay, and handles shutdown.

mod dispatcher;

pub use dispatcher::Dispatcher;

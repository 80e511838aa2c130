// src/session/mod.rs

//! Timed delivery of a form to one responder: identity gate, countdown,
//! proctoring, submission and results.

pub mod client;
pub mod controller;
pub mod error;
pub mod identity;
pub mod proctor;
pub mod results;
pub mod timer;

pub use controller::{SessionConfig, SessionController, SessionPhase, SubmitOutcome};
pub use error::SessionError;

// src/session/error.rs

use thiserror::Error;

use crate::{
    models::answer::AnswerShapeError,
    session::{client::SubmitError, controller::SessionPhase, identity::IdentityError, timer::TimerError},
};

/// Errors surfaced by the delivery flow.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("identity rejected: {0}")]
    Validation(#[from] IdentityError),

    #[error("cannot {action} while the session is {phase:?}")]
    InvalidTransition {
        phase: SessionPhase,
        action: &'static str,
    },

    #[error("form is not open for responses")]
    Unavailable,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field_id}': {source}")]
    AnswerShape {
        field_id: String,
        source: AnswerShapeError,
    },

    #[error("field '{field_id}' has no option '{option}'")]
    UnknownOption { field_id: String, option: String },

    #[error("required fields unanswered: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error(transparent)]
    Submission(#[from] SubmitError),

    #[error(transparent)]
    Timer(#[from] TimerError),
}

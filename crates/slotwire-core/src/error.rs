//! Invocation errors.

use thiserror::Error;

use crate::types::TypeTag;

/// Why a reflective invocation did not run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("receiver was destroyed")]
    ReceiverDestroyed,

    #[error("method not found")]
    MethodNotFound,

    #[error("argument {index} was not bound")]
    ArgumentNotBound { index: usize },

    #[error("expected {expected} arguments, {supplied} supplied")]
    MissingArguments { expected: usize, supplied: usize },

    #[error("argument {index} has type {actual}, expected {expected}")]
    TypeMismatch {
        index: usize,
        expected: TypeTag,
        actual: TypeTag,
    },

    #[error("argument index {index} is out of range for {count} parameters")]
    ArgumentOutOfRange { index: usize, count: usize },

    #[error("receiver is not a {class}")]
    WrongReceiver { class: &'static str },

    #[error("{signature} cannot be invoked")]
    NotInvokable { signature: String },
}

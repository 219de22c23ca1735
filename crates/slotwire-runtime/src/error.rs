//! Binding errors.

use slotwire_core::TypeTag;
use thiserror::Error;

/// Why a forwarder refused a binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("no signal {signal} on {class}")]
    NoSuchSignal { signal: String, class: &'static str },

    #[error("missing argument {index}: the callback expects {expected} but the signal has no such parameter")]
    MissingArgument { index: usize, expected: TypeTag },

    #[error("type mismatch for argument {index}: the signal sends {sent}, the callback expects {expected}")]
    TypeMismatch {
        index: usize,
        sent: TypeTag,
        expected: TypeTag,
    },

    #[error("proxy already holds its maximum of {limit} bindings")]
    CapacityExhausted { limit: usize },

    #[error("sender refused a connection to {signal}")]
    ConnectFailed { signal: String },
}

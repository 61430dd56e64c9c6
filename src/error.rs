use thiserror::Error;

use crate::circuit::{ComponentId, PinRef};

/// Errors reported synchronously to callers of the engine API.
///
/// Nothing inside a tick produces one of these; they only describe misuse of
/// the public surface (unknown ids, wrong properties for a device kind).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("component {0} does not exist")]
    UnknownComponent(ComponentId),

    #[error("component {} has no pin {}", .0.component, .0.pin)]
    UnknownPin(PinRef),

    #[error("unknown device kind '{0}'")]
    UnknownKind(String),

    #[error("property '{key}' is not defined for {kind}")]
    UnknownProperty { kind: &'static str, key: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

use std::{error::Error, fmt};

/// Failures while decoding an inbound frame.
///
/// Both variants are per-frame: the frame is dropped and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErr {
    /// The frame is not json, not an object, lacks `action` or lacks a required field.
    Malformed(String),
    /// The frame names an action this node does not understand.
    UnknownAction(String),
}

impl fmt::Display for ProtocolErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed message: {detail}"),
            Self::UnknownAction(action) => write!(f, "unknown action {action:?}"),
        }
    }
}

impl Error for ProtocolErr {}

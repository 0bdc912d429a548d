use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolErr;

/// Free-form training settings forwarded untouched to the trainer.
pub type Hyperparameters = Map<String, Value>;

/// The `action` discriminator shared by inbound and outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Train,
    Stop,
}

impl Action {
    /// The wire spelling of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "TRAIN",
            Self::Stop => "STOP",
        }
    }
}

/// A request to train one round of a session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainRequest {
    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: String,
    pub round: u64,
    #[serde(alias = "hyperparams")]
    pub hyperparameters: Hyperparameters,
}

/// An inbound message from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Train(TrainRequest),
    Stop,
}

impl Request {
    /// Decodes a text frame into a typed request.
    ///
    /// # Arguments
    /// * `text` - The raw frame as received.
    ///
    /// # Returns
    /// The request, or a `ProtocolErr` describing why the frame must be dropped.
    pub fn decode(text: &str) -> Result<Self, ProtocolErr> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolErr::Malformed(format!("invalid json: {e}")))?;

        let Value::Object(fields) = value else {
            return Err(ProtocolErr::Malformed("frame is not a json object".into()));
        };

        let action = match fields.get("action") {
            Some(Value::String(action)) => action.clone(),
            Some(other) => {
                return Err(ProtocolErr::Malformed(format!(
                    "action must be a string, got {other}"
                )));
            }
            None => return Err(ProtocolErr::Malformed("no action found in message".into())),
        };

        match action.as_str() {
            a if a == Action::Train.as_str() => serde_json::from_value(Value::Object(fields))
                .map(Self::Train)
                .map_err(|e| ProtocolErr::Malformed(format!("invalid TRAIN frame: {e}"))),
            a if a == Action::Stop.as_str() => Ok(Self::Stop),
            _ => Err(ProtocolErr::UnknownAction(action)),
        }
    }
}

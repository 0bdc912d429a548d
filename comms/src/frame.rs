//! Outbound frames sent from this node to the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::msg::{Action, TrainRequest};

/// The `type` discriminator of outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    Register,
    NewWeights,
}

/// The kind of peer announced at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Library,
}

/// Sent once, right after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub node_type: NodeType,
}

impl Registration {
    /// The registration of a library (worker) peer.
    pub fn library() -> Self {
        Self {
            kind: FrameType::Register,
            node_type: NodeType::Library,
        }
    }
}

/// What the trainer produced for one round.
///
/// `weights` is opaque to this crate. `omega` weights this node's contribution when the
/// coordinator averages, usually the number of examples trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub weights: Value,
    pub omega: f64,
}

impl TrainingResult {
    pub fn new(weights: impl Into<Value>, omega: f64) -> Self {
        Self {
            weights: weights.into(),
            omega,
        }
    }
}

/// The result of an accepted round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWeights {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub action: Action,
    pub round: u64,
    pub results: TrainingResult,
    #[serde(rename = "type")]
    pub kind: FrameType,
}

impl NewWeights {
    /// Builds the answer to `request`.
    ///
    /// # Arguments
    /// * `request` - The request that was trained.
    /// * `results` - What the trainer produced for it.
    ///
    /// # Returns
    /// A frame echoing the request's session and round.
    pub fn new(request: &TrainRequest, results: TrainingResult) -> Self {
        Self {
            session_id: request.session_id.clone(),
            action: Action::Train,
            round: request.round,
            results,
            kind: FrameType::NewWeights,
        }
    }
}

/// Acknowledges a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub success: bool,
    pub action: Action,
}

impl Default for StopAck {
    fn default() -> Self {
        Self {
            success: true,
            action: Action::Stop,
        }
    }
}

/// Every frame this node may put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Registration(Registration),
    NewWeights(NewWeights),
    StopAck(StopAck),
}

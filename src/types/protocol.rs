//! Request and response types for the participant API.
//!
//! Field names match the server's snake_case JSON verbatim. Deserialization
//! is tolerant: optional server fields default to `None` so additive server
//! changes do not break the client.

use serde::{Deserialize, Serialize};

/// A participant record as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Server-assigned participant id.
    pub id: u64,
    /// Crowdsourcing worker id.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// HIT id the participant was recruited under.
    #[serde(default)]
    pub hit_id: Option<String>,
    /// Assignment id for this participation.
    #[serde(default)]
    pub assignment_id: Option<String>,
    /// Run mode (`live`, `sandbox`, `debug`).
    #[serde(default)]
    pub mode: Option<String>,
    /// Recruiter that sourced this participant.
    #[serde(default)]
    pub recruiter: Option<String>,
    /// Lifecycle status (e.g. `working`, `submitted`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Quorum progress: `n` of `q` required participants are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum {
    /// Current number of concurrently active participants.
    pub n: u64,
    /// Required number of participants before the experiment proceeds.
    pub q: u64,
    /// True when this participant was admitted past an already-satisfied
    /// quorum and should run in observer capacity.
    #[serde(default)]
    pub overrecruited: bool,
}

impl Quorum {
    /// Whether the required participant count has been reached.
    pub fn is_met(&self) -> bool {
        self.n == self.q
    }
}

/// A participant's position within the experiment's interaction network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Server-assigned node id.
    pub id: u64,
    /// Network this node belongs to.
    #[serde(default)]
    pub network_id: Option<u64>,
    /// Owning participant, when the node is participant-backed.
    #[serde(default)]
    pub participant_id: Option<u64>,
    /// Polymorphic node type name.
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
}

/// A content record attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    /// Server-assigned info id.
    pub id: u64,
    /// Node that produced this info.
    #[serde(default)]
    pub origin_id: Option<u64>,
    /// The content itself. The server permits null contents.
    #[serde(default)]
    pub contents: Option<String>,
    /// Polymorphic info type name.
    #[serde(rename = "type", default)]
    pub info_type: Option<String>,
}

/// A transmission of an info between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmission {
    /// Server-assigned transmission id.
    pub id: u64,
    /// Sending node.
    #[serde(default)]
    pub origin_id: Option<u64>,
    /// Receiving node.
    #[serde(default)]
    pub destination_id: Option<u64>,
    /// The transmitted info.
    #[serde(default)]
    pub info_id: Option<u64>,
    /// `pending` or `received`.
    #[serde(default)]
    pub status: Option<String>,
    /// Receipt timestamp, when received.
    #[serde(default)]
    pub receive_time: Option<String>,
}

/// Response to participant creation. Carries the optional quorum snapshot
/// when the experiment enforces a minimum concurrent participant count.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateParticipantResponse {
    /// The created (or re-resolved) participant.
    pub participant: Participant,
    /// Quorum snapshot, absent when no quorum is configured.
    #[serde(default)]
    pub quorum: Option<Quorum>,
}

/// Envelope for a single participant.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantResponse {
    /// The requested participant.
    pub participant: Participant,
}

/// Envelope for a single node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeResponse {
    /// The created node.
    pub node: Node,
}

/// Envelope for a single info.
#[derive(Debug, Clone, Deserialize)]
pub struct InfoResponse {
    /// The created or requested info.
    pub info: Info,
}

/// Envelope for a node's infos.
#[derive(Debug, Clone, Deserialize)]
pub struct InfosResponse {
    /// Infos in server order.
    pub infos: Vec<Info>,
}

/// Envelope for a node's transmissions.
#[derive(Debug, Clone, Deserialize)]
pub struct TransmissionsResponse {
    /// Transmissions in server order.
    pub transmissions: Vec<Transmission>,
}

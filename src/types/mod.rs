//! Wire types for the experiment server's participant-facing API.

mod protocol;

pub use protocol::{
    CreateParticipantResponse, Info, InfoResponse, InfosResponse, Node, NodeResponse, Participant,
    ParticipantResponse, Quorum, Transmission, TransmissionsResponse,
};

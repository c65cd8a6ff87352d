//! Shared transport plumbing: the HTTP gateway and the quorum push channel.

pub mod http;
#[cfg(feature = "websocket")]
pub mod ws;

pub use self::http::{HttpGateway, Payload};
#[cfg(feature = "websocket")]
pub use self::ws::QuorumChannel;

//! WebSocket subscription to a server push channel.
//!
//! One persistent subscription per page, scoped to a named channel. The
//! connection reconnects on its own with bounded backoff; the overall wait
//! has no timeout. Text frames are forwarded verbatim to the subscriber,
//! which owns all message interpretation.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::error::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// A reconnecting subscription to one push channel.
#[derive(Debug, Clone)]
pub struct QuorumChannel {
    url: Url,
}

impl QuorumChannel {
    /// Derive the channel endpoint from the server's HTTP base URL:
    /// `http` becomes `ws`, `https` becomes `wss`, and the path is
    /// `/chat?channel=<name>`.
    pub fn from_http_base(base: &Url, channel: &str) -> Result<Self> {
        let mut url = base.clone();
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocket(format!("cannot derive a websocket URL from {base}")))?;
        url.set_path("/chat");
        url.set_query(Some(&format!("channel={channel}")));
        Ok(Self { url })
    }

    /// The derived websocket endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the subscription. Text frames arrive on the returned receiver;
    /// the underlying connection reconnects for as long as the receiver is
    /// alive.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        tokio::spawn(async move {
            run_subscription(url, tx).await;
        });
        rx
    }
}

async fn run_subscription(url: Url, tx: mpsc::UnboundedSender<String>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut stream, _)) => {
                tracing::debug!(url = %url, "push channel connected");
                backoff = INITIAL_BACKOFF;
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if tx.send(text.as_str().to_string()).is_err() {
                                return;
                            }
                        },
                        Ok(Message::Close(_)) => {
                            tracing::debug!(url = %url, "push channel closed by server");
                            break;
                        },
                        Ok(_) => {},
                        Err(err) => {
                            tracing::warn!(url = %url, error = %err, "push channel read failed");
                            break;
                        },
                    }
                }
            },
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "push channel connect failed");
            },
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ws_url_from_http_base() {
        let base = Url::parse("http://localhost:5000/").unwrap();
        let channel = QuorumChannel::from_http_base(&base, "quorum").unwrap();
        assert_eq!(channel.url().as_str(), "ws://localhost:5000/chat?channel=quorum");
    }

    #[test]
    fn derives_wss_url_from_https_base() {
        let base = Url::parse("https://study.example.com/launch").unwrap();
        let channel = QuorumChannel::from_http_base(&base, "quorum").unwrap();
        assert_eq!(
            channel.url().as_str(),
            "wss://study.example.com/chat?channel=quorum"
        );
    }
}

//! Persistent text-frame connection to the broker.
//!
//! A [`Transport`] opens a [`Link`]: a pair of unbounded channels carrying
//! [`Outbound`] frames to the broker and [`Inbound`] frames back. The
//! connection manager only ever sees the link, so tests drive it with plain
//! channels. [`WsTransport`] backs a link with a `tokio-tungstenite` socket
//! and two `spawn_local` pump tasks.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use async_trait::async_trait;
use frames::RejoinToken;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

/// Query parameter carrying the rejoin token on the join URL.
pub const REJOIN_TOKEN_PARAM: &str = "rejoinToken";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid connection URL: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Frame or event delivered by the broker side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The connection ended. Always the last item on the channel.
    Closed { abnormal: bool, reason: String },
}

/// Frame or request sent to the broker side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Close the connection gracefully.
    Close,
}

/// Both directions of an open connection.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Opens persistent connections.
#[async_trait(?Send)]
pub trait Transport {
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connection cannot be established.
    async fn open(&self, url: &Url) -> Result<Link, TransportError>;
}

/// Turn a directory-issued join URL into the connection URL.
///
/// Relative URLs resolve against the directory URL. http/https map to ws/wss.
/// A rejoin token, when given, is appended as the `rejoinToken` query pair.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] for unparseable URLs or schemes that
/// cannot carry a websocket.
pub fn resolve_join_url(directory: &Url, join_url: &str, rejoin: Option<&RejoinToken>) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidUrl(join_url.to_owned());
    let Ok(mut url) = directory.join(join_url) else {
        return Err(invalid());
    };

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    if url.set_scheme(scheme).is_err() {
        return Err(invalid());
    }

    if let Some(token) = rejoin {
        url.query_pairs_mut().append_pair(REJOIN_TOKEN_PARAM, token.as_str());
    }
    Ok(url)
}

/// Classify a close frame. Only normal and going-away closures are clean.
#[must_use]
pub fn close_details(frame: Option<&CloseFrame>) -> (bool, String) {
    match frame {
        None => (false, String::new()),
        Some(frame) => {
            let abnormal = !matches!(frame.code, CloseCode::Normal | CloseCode::Away);
            (abnormal, frame.reason.as_str().to_owned())
        }
    }
}

/// [`Transport`] over `tokio-tungstenite`.
///
/// The pump tasks are spawned with `spawn_local`; `open` must be awaited from
/// within a `LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait(?Send)]
impl Transport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Link, TransportError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(Box::new(error)))?;
        info!(%url, "websocket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();

        tokio::task::spawn_local(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if let Err(error) = sink.send(Message::Text(text.into())).await {
                            warn!(%error, "websocket send failed");
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(error) = sink.close().await {
                            debug!(%error, "websocket close failed");
                        }
                        break;
                    }
                }
            }
        });

        tokio::task::spawn_local(async move {
            let closed = loop {
                let next = tokio::select! {
                    () = inbound_tx.closed() => return,
                    next = source.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(Inbound::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (abnormal, reason) = close_details(frame.as_ref());
                        break Inbound::Closed { abnormal, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => break Inbound::Closed { abnormal: true, reason: error.to_string() },
                    None => break Inbound::Closed { abnormal: true, reason: "stream ended".to_owned() },
                }
            };
            if inbound_tx.send(closed).is_err() {
                debug!("close notification dropped; link already released");
            }
        });

        Ok(Link { outbound: outbound_tx, inbound: inbound_rx })
    }
}

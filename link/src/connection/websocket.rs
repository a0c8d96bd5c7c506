//! Production transport over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use url::Url;

use super::transport::{CloseCause, Connector, Framing, Transport, TransportEvent};
use crate::compression::decode_binary_frame;
use crate::error::{AtlasLinkError, Result};
use crate::models::{ClientMessage, ServerMessage};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Maximum text message size (64 MiB).
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 64 << 20;

/// Reason used when the socket goes away without a close frame.
pub const TRANSPORT_CLOSE: &str = "transport-close";

/// Normalise an endpoint to `ws(s)://host[:port]/v1/ws`.
///
/// `http` maps to `ws` and `https` to `wss`. Degraded framing adds
/// `?compress=false`.
pub fn resolve_ws_url(base_url: &str, framing: Framing) -> Result<String> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        AtlasLinkError::ConfigurationError(format!("Invalid server URL '{}': {}", base_url, e))
    })?;

    if base.host_str().is_none() {
        return Err(AtlasLinkError::ConfigurationError(
            "Server URL must include a host".to_string(),
        ));
    }
    if !base.username().is_empty() || base.password().is_some() {
        return Err(AtlasLinkError::ConfigurationError(
            "Server URL must not embed credentials".to_string(),
        ));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AtlasLinkError::ConfigurationError(format!(
                "Unsupported URL scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base.clone();
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        AtlasLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    ws_url.set_path("/v1/ws");
    match framing {
        Framing::Degraded => ws_url.set_query(Some("compress=false")),
        Framing::Message => ws_url.set_query(None),
    }

    Ok(ws_url.to_string())
}

/// Opens tokio-tungstenite sockets to one server.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
}

impl WebSocketConnector {
    /// Fails early on a malformed URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        resolve_ws_url(&base_url, Framing::Message)?;
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, framing: Framing) -> Result<Box<dyn Transport>> {
        let url = resolve_ws_url(&self.base_url, framing)?;
        log::debug!("[atlas-link] Opening WebSocket to {} ({})", url, framing);

        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => Ok(Box::new(WebSocketTransport { ws })),
            Err(WsError::Http(response)) => {
                let status = response.status().as_u16();
                let body_text = response
                    .body()
                    .as_ref()
                    .filter(|b| !b.is_empty())
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                Err(match status {
                    401 => AtlasLinkError::AuthenticationError(
                        "Unauthorized: WebSocket requires valid credentials".to_string(),
                    ),
                    403 => AtlasLinkError::AuthenticationError(
                        "Forbidden: Access to WebSocket denied".to_string(),
                    ),
                    code if body_text.is_empty() => {
                        AtlasLinkError::TransportError(format!("WebSocket HTTP error: {}", code))
                    },
                    code => AtlasLinkError::TransportError(format!(
                        "WebSocket HTTP error {}: {}",
                        code, body_text
                    )),
                })
            },
            Err(e) => Err(AtlasLinkError::TransportError(format!("Connection failed: {}", e))),
        }
    }
}

/// An open tokio-tungstenite socket.
pub struct WebSocketTransport {
    ws: WebSocketStream,
}

impl WebSocketTransport {
    fn parse(text: &str) -> Option<ServerMessage> {
        if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
            log::warn!("[atlas-link] Text message too large ({} bytes)", text.len());
            return None;
        }
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(msg) => Some(msg),
            Err(e) => {
                log::warn!("[atlas-link] Failed to parse server message: {}", e);
                None
            },
        }
    }
}

/// Normal and policy closes are deliberate; anything else counts as loss.
pub fn classify_close(frame: Option<CloseFrame>) -> CloseCause {
    match frame {
        Some(frame) => {
            let reason = if frame.reason.is_empty() {
                format!("close code {}", u16::from(frame.code))
            } else {
                frame.reason.to_string()
            };
            match frame.code {
                CloseCode::Normal | CloseCode::Policy => CloseCause::Server(reason),
                _ => CloseCause::Lost(reason),
            }
        },
        None => CloseCause::Lost(TRANSPORT_CLOSE.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.ws.send(Message::Text(payload.into())).await.map_err(|e| {
            AtlasLinkError::TransportError(format!("Failed to send {}: {}", message.kind(), e))
        })
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = Self::parse(text.as_str()) {
                        return TransportEvent::Message(msg);
                    }
                },
                Some(Ok(Message::Binary(data))) => match decode_binary_frame(&data) {
                    Ok(text) => {
                        if let Some(msg) = Self::parse(&text) {
                            return TransportEvent::Message(msg);
                        }
                    },
                    Err(e) => log::warn!("[atlas-link] Dropping undecodable frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    return TransportEvent::Closed(classify_close(frame));
                },
                // tungstenite answers pings on the next read/flush.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {},
                Some(Err(e)) => {
                    return TransportEvent::Closed(CloseCause::Lost(format!("WebSocket error: {}", e)));
                },
                None => return TransportEvent::Closed(CloseCause::Lost(TRANSPORT_CLOSE.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            log::debug!("[atlas-link] Error while closing WebSocket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ws_url_maps_schemes() {
        assert_eq!(
            resolve_ws_url("http://localhost:8080", Framing::Message).unwrap(),
            "ws://localhost:8080/v1/ws"
        );
        assert_eq!(
            resolve_ws_url("https://sync.example.com/app?x=1#top", Framing::Message).unwrap(),
            "wss://sync.example.com/v1/ws"
        );
        assert_eq!(
            resolve_ws_url("wss://sync.example.com", Framing::Degraded).unwrap(),
            "wss://sync.example.com/v1/ws?compress=false"
        );
    }

    #[test]
    fn test_resolve_ws_url_rejects_bad_input() {
        assert!(resolve_ws_url("ftp://host", Framing::Message).is_err());
        assert!(resolve_ws_url("not a url", Framing::Message).is_err());
        assert!(resolve_ws_url("https://user:pw@host", Framing::Message).is_err());
    }

    #[test]
    fn test_classify_close_codes() {
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert_eq!(classify_close(Some(normal)), CloseCause::Server("bye".to_string()));

        let policy = CloseFrame {
            code: CloseCode::Policy,
            reason: "".into(),
        };
        assert_eq!(classify_close(Some(policy)), CloseCause::Server("close code 1008".to_string()));

        let abnormal = CloseFrame {
            code: CloseCode::Away,
            reason: "restart".into(),
        };
        assert_eq!(classify_close(Some(abnormal)), CloseCause::Lost("restart".to_string()));

        assert_eq!(classify_close(None), CloseCause::Lost(TRANSPORT_CLOSE.to_string()));
    }

    #[test]
    fn test_connector_rejects_bad_url_up_front() {
        assert!(matches!(
            WebSocketConnector::new("ftp://nowhere"),
            Err(AtlasLinkError::ConfigurationError(_))
        ));
    }
}

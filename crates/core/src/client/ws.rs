//! WebSocket implementation of the realtime connector.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::config::ApiConfig;
use crate::realtime::ClientFrame;
use crate::transport::RealtimeConfig;

use super::{RealtimeConnection, RealtimeConnector, RealtimeError, RealtimeEvent};

/// Buffered events per connection.
const EVENT_BUFFER: usize = 64;

/// `tokio::time::interval` panics on a zero period.
const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Realtime connector backed by `tokio-tungstenite`.
///
/// Connects to `{ws_base}/ws/generate/{task_id}` and passes the access token
/// as a query parameter, since the socket authenticates once at open time.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
    ping_interval: Duration,
}

impl WsConnector {
    pub fn new(api: &ApiConfig, realtime: &RealtimeConfig) -> Self {
        Self {
            base_url: api.realtime_base_url(),
            ping_interval: realtime.ping_interval().max(MIN_PING_INTERVAL),
        }
    }

    fn endpoint(&self, task_id: &str, credential: &Credential) -> String {
        let mut url = format!(
            "{}/ws/generate/{}",
            self.base_url,
            urlencoding::encode(task_id)
        );
        if !credential.is_anonymous() {
            url.push_str("?token=");
            url.push_str(&urlencoding::encode(&credential.access_token));
        }
        url
    }
}

#[async_trait]
impl RealtimeConnector for WsConnector {
    async fn connect(
        &self,
        task_id: &str,
        credential: &Credential,
    ) -> Result<RealtimeConnection, RealtimeError> {
        let url = self.endpoint(task_id, credential);
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(RealtimeError::InvalidUrl(self.base_url.clone()));
        }

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        debug!(task_id = task_id, "Realtime socket open");

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(pump_socket(
            stream,
            events_tx,
            shutdown_rx,
            self.ping_interval,
        ));

        Ok(RealtimeConnection::new(events_rx, shutdown_tx))
    }
}

/// Forward socket messages as events, send keep-alives, and close the
/// socket when the connection handle goes away.
async fn pump_socket(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: mpsc::Sender<RealtimeEvent>,
    mut shutdown: oneshot::Receiver<()>,
    ping_interval: Duration,
) {
    let (mut sink, mut source) = stream.split();
    let mut keepalive = tokio::time::interval(ping_interval);
    // The first tick completes immediately.
    keepalive.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let close = Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closed".into(),
                }));
                let _ = sink.send(close).await;
                debug!("Realtime socket closed by client");
                break;
            }
            _ = keepalive.tick() => {
                match serde_json::to_string(&ClientFrame::Ping) {
                    Ok(ping) => {
                        if sink.send(Message::Text(ping.into())).await.is_err() {
                            debug!("Keep-alive send failed");
                        }
                    }
                    Err(e) => warn!("Failed to serialize ping: {}", e),
                }
            }
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if events.send(RealtimeEvent::Frame(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    let _ = events.send(RealtimeEvent::Closed { code, reason }).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(RealtimeEvent::Error(e.to_string())).await;
                    let _ = events
                        .send(RealtimeEvent::Closed { code: None, reason: e.to_string() })
                        .await;
                    break;
                }
                None => {
                    let _ = events
                        .send(RealtimeEvent::Closed {
                            code: None,
                            reason: "connection dropped".to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(base_url: &str) -> WsConnector {
        WsConnector::new(
            &ApiConfig {
                base_url: base_url.to_string(),
                ws_url: None,
                timeout_secs: 5,
            },
            &RealtimeConfig::default(),
        )
    }

    #[test]
    fn test_endpoint_with_token() {
        let url = connector("https://poses.example.com")
            .endpoint("task 1", &Credential::new("a+b/c", None));
        assert_eq!(
            url,
            "wss://poses.example.com/ws/generate/task%201?token=a%2Bb%2Fc"
        );
    }

    #[test]
    fn test_endpoint_anonymous() {
        let url = connector("http://localhost:8000").endpoint("t1", &Credential::anonymous());
        assert_eq!(url, "ws://localhost:8000/ws/generate/t1");
    }

    #[test]
    fn test_zero_ping_interval_is_raised() {
        let connector = WsConnector::new(
            &ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                ws_url: None,
                timeout_secs: 5,
            },
            &RealtimeConfig {
                ping_interval_secs: 0,
                ..Default::default()
            },
        );
        assert_eq!(connector.ping_interval, MIN_PING_INTERVAL);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = connector("http://127.0.0.1:9")
            .connect("t1", &Credential::anonymous())
            .await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_invalid_scheme() {
        let result = connector("ftp://example.com")
            .connect("t1", &Credential::anonymous())
            .await;
        assert!(matches!(result, Err(RealtimeError::InvalidUrl(_))));
    }
}

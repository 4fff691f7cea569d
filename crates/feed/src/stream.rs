use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, Result, Sample};

use crate::decode::decode;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Base WebSocket endpoint, e.g. `wss://stream.binance.com:9443/ws`.
    pub url: String,
    pub symbols: Vec<String>,
    /// Kline interval such as `1s` or `1m`.
    pub interval: String,
}

impl FeedConfig {
    /// Stream names to subscribe: one kline and one depth stream per symbol.
    pub fn streams(&self) -> Vec<String> {
        self.symbols
            .iter()
            .flat_map(|s| {
                let lower = s.to_lowercase();
                [format!("{lower}@kline_{}", self.interval), format!("{lower}@depth")]
            })
            .collect()
    }

    fn subscribe_message(&self) -> String {
        json!({ "method": "SUBSCRIBE", "params": self.streams(), "id": 1 }).to_string()
    }
}

/// Binance WebSocket client that publishes decoded samples on a broadcast
/// channel and reconnects with exponential backoff.
pub struct FeedStream {
    config: FeedConfig,
    samples: broadcast::Sender<Sample>,
}

impl FeedStream {
    pub fn new(config: FeedConfig, samples: broadcast::Sender<Sample>) -> Self {
        Self { config, samples }
    }

    /// Stream until `token` is cancelled. Disconnects are retried and never
    /// returned as errors.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut backoff = Duration::from_secs(1);
        loop {
            info!(url = %self.config.url, streams = ?self.config.streams(), "Connecting to market stream");
            match self.connect_once(&token).await {
                Ok(()) if token.is_cancelled() => {
                    info!("Market stream closed for shutdown");
                    return Ok(());
                }
                Ok(()) => {
                    info!("Market stream closed by server");
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?backoff, "Market stream error, reconnecting");
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_once(&self, token: &CancellationToken) -> Result<()> {
        let url = Url::parse(&self.config.url).map_err(|e| Error::WebSocket(e.to_string()))?;
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.config.subscribe_message()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        loop {
            let msg = tokio::select! {
                _ = token.cancelled() => {
                    // best effort; the socket is dropped either way
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => msg,
            };
            let Some(msg) = msg else {
                return Ok(());
            };
            match msg.map_err(|e| Error::WebSocket(e.to_string()))? {
                Message::Text(text) => {
                    if let Some(sample) = decode(&text) {
                        // no receivers yet is fine
                        let _ = self.samples.send(sample);
                    }
                }
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| Error::WebSocket(e.to_string()))?;
                }
                Message::Close(frame) => {
                    debug!(?frame, "Server sent close frame");
                    return Ok(());
                }
                _ => {}
            }
        }
    }
}

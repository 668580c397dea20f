//! Relay client: posts withdrawal payloads to relays with failover

use super::protocol::{RejectionReason, RelayReceipt, WithdrawalBody};
use crate::ledger::TxHash;
use crate::withdraw::WithdrawalPayload;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Relay client configuration
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Relay base URLs, tried in order
    pub relays: Vec<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("No relays configured")]
    NoRelays,

    #[error("Could not reach any relay: {0}")]
    Unreachable(String),

    #[error("Relay rejected the withdrawal: {0}")]
    Rejected(RejectionReason),

    #[error("Malformed relay response: {0}")]
    MalformedResponse(String),
}

/// Hands a payload to a relay, returning the broadcast transaction hash.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn submit(&self, endpoint: &str, payload: &WithdrawalPayload) -> Result<TxHash, RelayError>;
}

enum Attempt {
    /// Could not talk to this relay; the next one may work.
    Transport(String),
    /// The relay answered; stop here.
    Final(RelayError),
}

/// HTTP relay client. Moves to the next relay only on transport failure; a
/// relay that answers with a rejection is final.
pub struct HttpRelayClient {
    config: RelayClientConfig,
    http: reqwest::Client,
}

impl HttpRelayClient {
    pub fn new(config: RelayClientConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RelayError::Unreachable(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Client for the relays and request timeout in `config`.
    pub fn from_config(config: &crate::config::ClientConfig) -> Result<Self, RelayError> {
        Self::new(RelayClientConfig {
            relays: config.relays.clone(),
            request_timeout: config.relay_request_timeout(),
        })
    }

    pub fn relays(&self) -> &[String] {
        &self.config.relays
    }

    async fn post(&self, relay: &str, endpoint: &str, body: &WithdrawalBody) -> Result<TxHash, Attempt> {
        let url = format!("{}/{}", relay.trim_end_matches('/'), endpoint);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = RejectionReason::parse(&text);
            // Relays report rejections as 500. Anything else is the relay or
            // its gateway being unavailable, unless the body names a reason.
            let rejected = status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
                || !matches!(reason, RejectionReason::Undisclosed(_));
            if !rejected {
                return Err(Attempt::Transport(format!("HTTP {}", status)));
            }

            let reason = if text.trim().is_empty() {
                RejectionReason::parse(status.canonical_reason().unwrap_or("unknown"))
            } else {
                reason
            };
            tracing::warn!("Relay {} rejected withdrawal ({}): {}", relay, status, reason);
            return Err(Attempt::Final(RelayError::Rejected(reason)));
        }

        let receipt: RelayReceipt = response
            .json()
            .await
            .map_err(|e| Attempt::Final(RelayError::MalformedResponse(e.to_string())))?;
        Ok(receipt.hash)
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn submit(&self, endpoint: &str, payload: &WithdrawalPayload) -> Result<TxHash, RelayError> {
        if self.config.relays.is_empty() {
            return Err(RelayError::NoRelays);
        }

        let body = WithdrawalBody::from(payload);
        let mut last_failure = String::new();
        for relay in &self.config.relays {
            match self.post(relay, endpoint, &body).await {
                Ok(hash) => {
                    tracing::info!("Relay {} broadcast withdrawal as {}", relay, hash);
                    return Ok(hash);
                }
                Err(Attempt::Transport(reason)) => {
                    tracing::warn!("Relay {} unreachable: {}", relay, reason);
                    last_failure = reason;
                }
                Err(Attempt::Final(err)) => return Err(err),
            }
        }

        Err(RelayError::Unreachable(last_failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Address;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn payload() -> WithdrawalPayload {
        WithdrawalPayload {
            y: vec![[1u8; 32]; 2],
            c: vec![[2u8; 32]; 2],
            d: [3u8; 32],
            u: [4u8; 32],
            epoch: 1,
            tip: 0,
            proof: vec![1],
            destination: Address([0u8; 20]),
            data: vec![],
            amount: 5,
        }
    }

    /// Serve a single HTTP request with a canned response; returns the base URL.
    async fn one_shot_relay(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = find_header_end(&request) {
                    let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    async fn dead_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn client(relays: Vec<String>) -> HttpRelayClient {
        HttpRelayClient::new(RelayClientConfig {
            relays,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_relays() {
        let result = client(vec![]).submit("withdrawal1", &payload()).await;
        assert_eq!(result, Err(RelayError::NoRelays));
    }

    #[tokio::test]
    async fn test_fails_over_to_next_relay() {
        let hash = format!("0x{}", "ab".repeat(32));
        let live = one_shot_relay("200 OK", format!("{{\"hash\":\"{}\"}}", hash)).await;
        let relays = vec![dead_relay().await, live];

        let result = client(relays).submit("withdrawal1", &payload()).await;
        assert_eq!(result, Ok(TxHash([0xab; 32])));
    }

    #[tokio::test]
    async fn test_rejection_is_final() {
        let rejecting = one_shot_relay("500 Internal Server Error", "Tip too low".to_string()).await;
        let never_reached = dead_relay().await;

        let result = client(vec![rejecting, never_reached])
            .submit("withdrawal1", &payload())
            .await;
        assert_eq!(result, Err(RelayError::Rejected(RejectionReason::TipTooLow)));
    }

    #[tokio::test]
    async fn test_unavailable_relay_fails_over() {
        let hash = format!("0x{}", "cd".repeat(32));
        let unavailable = one_shot_relay("503 Service Unavailable", String::new()).await;
        let live = one_shot_relay("200 OK", format!("{{\"hash\":\"{}\"}}", hash)).await;

        let result = client(vec![unavailable, live])
            .submit("withdrawal1", &payload())
            .await;
        assert_eq!(result, Ok(TxHash([0xcd; 32])));
    }

    #[tokio::test]
    async fn test_gateway_errors_exhaust_to_unreachable() {
        let relays = vec![
            one_shot_relay("502 Bad Gateway", "upstream down".to_string()).await,
            one_shot_relay("404 Not Found", String::new()).await,
        ];
        let result = client(relays).submit("withdrawal1", &payload()).await;
        assert_eq!(result, Err(RelayError::Unreachable("HTTP 404 Not Found".to_string())));
    }

    #[tokio::test]
    async fn test_known_reason_is_final_on_any_status() {
        let rejecting = one_shot_relay("400 Bad Request", "Wrong epoch".to_string()).await;
        let never_reached = dead_relay().await;

        let result = client(vec![rejecting, never_reached])
            .submit("withdrawal1", &payload())
            .await;
        assert_eq!(result, Err(RelayError::Rejected(RejectionReason::WrongEpoch)));
    }

    #[tokio::test]
    async fn test_all_relays_unreachable() {
        let relays = vec![dead_relay().await, dead_relay().await];
        let result = client(relays).submit("withdrawal1", &payload()).await;
        assert!(matches!(result, Err(RelayError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let relay = one_shot_relay("200 OK", "{\"nope\":1}".to_string()).await;
        let result = client(vec![relay]).submit("withdrawal1", &payload()).await;
        assert!(matches!(result, Err(RelayError::MalformedResponse(_))));
    }

    #[test]
    fn test_from_client_config() {
        let mut config = crate::config::ClientConfig::default();
        config.relays = vec!["https://relay.example".to_string()];
        config.relay_request_timeout_secs = 7;

        let client = HttpRelayClient::from_config(&config).unwrap();
        assert_eq!(client.relays(), ["https://relay.example".to_string()]);
        assert_eq!(client.config.request_timeout, Duration::from_secs(7));
    }
}

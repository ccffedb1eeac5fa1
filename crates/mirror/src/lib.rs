pub mod cache;
pub mod events;
pub mod poll;

use anyhow::{bail, Context, Result};
use cache::ReadModelCache;
use events::{decode_topic_message, SequencedEvent};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Read-only client for the mirror query API. The mirror lags the ledger by
/// seconds and is rate limited, so every read goes through the TTL cache.
#[derive(Clone)]
pub struct MirrorClient {
    base_url: String,
    http_client: reqwest::Client,
    cache: Arc<ReadModelCache<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub token_id: String,
    pub name: String,
    pub symbol: String,
    pub total_supply: String,
}

#[derive(Debug, Deserialize)]
struct TopicMessagesPage {
    messages: Vec<TopicMessage>,
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct TopicMessage {
    sequence_number: u64,
    consensus_timestamp: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

impl MirrorClient {
    pub fn new(base_url: String, cache_ttl: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create mirror HTTP client")?;
        Ok(Self {
            base_url,
            http_client,
            cache: Arc::new(ReadModelCache::new(cache_ttl)),
        })
    }

    pub fn cache(&self) -> Arc<ReadModelCache<serde_json::Value>> {
        Arc::clone(&self.cache)
    }

    pub async fn token_info(&self, token_id: &str) -> Result<TokenInfo> {
        let path = format!("/api/v1/tokens/{token_id}");
        let value = self.cached_get(&path).await?;
        serde_json::from_value(value).context("Malformed token info from mirror")
    }

    /// All journaled events for a topic, decoded and sorted by the sequence
    /// number the consensus log assigned. Pagination is followed to the end.
    pub async fn topic_events(&self, topic_id: &str) -> Result<Vec<SequencedEvent>> {
        let path = format!("/api/v1/topics/{topic_id}/messages?limit=100&order=asc");
        let value = self.cached_get(&path).await?;

        let mut page: TopicMessagesPage =
            serde_json::from_value(value).context("Malformed topic messages from mirror")?;
        let mut raw = std::mem::take(&mut page.messages);

        let mut next = page.links.and_then(|l| l.next);
        while let Some(next_path) = next {
            let value = self.cached_get(&next_path).await?;
            let mut more: TopicMessagesPage =
                serde_json::from_value(value).context("Malformed topic messages from mirror")?;
            raw.append(&mut more.messages);
            next = more.links.and_then(|l| l.next);
        }

        Ok(decode_and_sort(topic_id, raw))
    }

    pub async fn account_transactions(&self, account_id: &str) -> Result<serde_json::Value> {
        let path = format!("/api/v1/transactions?account.id={account_id}&limit=25");
        self.cached_get(&path).await
    }

    pub async fn network_stats(&self) -> Result<serde_json::Value> {
        self.cached_get("/api/v1/network/supply").await
    }

    /// Drop any cached state for a topic so the next read refetches.
    pub async fn invalidate_topic(&self, topic_id: &str) {
        let path = format!("/api/v1/topics/{topic_id}/messages?limit=100&order=asc");
        self.cache.invalidate(&path).await;
    }

    async fn cached_get(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let http_client = self.http_client.clone();
        self.cache
            .get(path, move || async move {
                let response = http_client
                    .get(&url)
                    .send()
                    .await
                    .context("Failed to query mirror API")?;
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("Mirror query failed: {} - {}", status, body);
                }
                response
                    .json::<serde_json::Value>()
                    .await
                    .context("Failed to parse mirror response")
            })
            .await
    }
}

/// Decode a batch of raw topic messages and order them by the sequence
/// number the consensus log assigned. Foreign messages on a shared topic
/// are skipped, loudly.
fn decode_and_sort(topic_id: &str, raw: Vec<TopicMessage>) -> Vec<SequencedEvent> {
    let mut decoded = Vec::with_capacity(raw.len());
    for message in raw {
        match decode_topic_message(
            message.sequence_number,
            &message.consensus_timestamp,
            &message.message,
        ) {
            Ok(event) => decoded.push(event),
            Err(err) => tracing::warn!(topic_id, error = %err, "skipping undecodable topic message"),
        }
    }
    decoded.sort_by_key(|e| e.sequence);
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn message(sequence: u64, payload: &str) -> TopicMessage {
        TopicMessage {
            sequence_number: sequence,
            consensus_timestamp: format!("17249000{sequence:02}.000000001"),
            message: BASE64.encode(payload),
        }
    }

    #[test]
    fn topic_events_order_by_consensus_sequence() {
        // mirror pages can interleave; only the assigned sequence orders them
        let raw = vec![
            message(5, r#"{"type":"invoice_paid","invoice_id":"INV-1"}"#),
            message(2, r#"{"type":"funding_requested","invoice_id":"INV-1"}"#),
            message(9, r#"{"type":"invoice_settled","invoice_id":"INV-1","escrow_id":"E-1"}"#),
        ];
        let events = decode_and_sort("0.0.777", raw);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, [2, 5, 9]);
    }

    #[test]
    fn undecodable_topic_messages_are_skipped() {
        let raw = vec![
            message(3, r#"{"type":"funding_requested","invoice_id":"INV-1"}"#),
            TopicMessage {
                sequence_number: 4,
                consensus_timestamp: "1724900004.000000001".into(),
                message: "%%%not-base64%%%".into(),
            },
            message(1, r#"{"type":"invoice_paid","invoice_id":"INV-1"}"#),
        ];
        let events = decode_and_sort("0.0.777", raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 3);
    }
}

//! Stacks node HTTP client.

use std::time::Duration;

use serde::Deserialize;

use super::ChainError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Thin client over the Stacks node RPC API. All calls carry a bounded
/// timeout so cooperative tasks never wedge on the node.
#[derive(Debug, Clone)]
pub struct StacksClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CoreInfo {
    stacks_tip_height: u64,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    nonce: u64,
}

impl StacksClient {
    pub fn new(base_url: &str) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Current chain tip height from `/v2/info`.
    pub async fn block_height(&self) -> Result<u64, ChainError> {
        let url = format!("{}/v2/info", self.base_url);
        let info: CoreInfo = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await?;
        Ok(info.stacks_tip_height)
    }

    /// Next nonce for a principal from `/v2/accounts`.
    pub async fn account_nonce(&self, principal: &str) -> Result<u64, ChainError> {
        let url = format!("{}/v2/accounts/{}?proof=0", self.base_url, principal);
        let account: AccountInfo = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ChainError::Http(e.to_string()))?
            .json()
            .await?;
        Ok(account.nonce)
    }

    /// Broadcast a raw signed transaction. Returns the node's txid on
    /// acceptance; a rejection carries the node's body verbatim.
    pub async fn broadcast_transaction(&self, raw: &[u8]) -> Result<String, ChainError> {
        let url = format!("{}/v2/transactions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("content-type", "application/octet-stream")
            .body(raw.to_vec())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChainError::Rejected(body));
        }
        // the node answers with the txid as a JSON string
        let txid = serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
        Ok(txid.trim_start_matches("0x").to_string())
    }
}

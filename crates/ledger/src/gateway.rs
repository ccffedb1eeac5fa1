use super::{
    ConsensusJournal, DepositOutcome, DepositRequest, EscrowLedger, LedgerError, SequencedReceipt,
    SettlementOutcome,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Every contract call gets its own explicit deadline, separate from the
/// retry budget in [`crate::retry`].
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the contract gateway that fronts the ledger's smart
/// contract and consensus services. Raw transport and status errors are
/// translated into [`LedgerError`] here and never leak upward.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    contract_id: String,
    topic_id: String,
    operator_id: String,
    operator_key: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct DepositBody<'a> {
    invoice_id: &'a str,
    nft_ref: Option<&'a str>,
    investor: &'a str,
    amount_minor: i64,
    due_date: String,
    file_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct DepositResponse {
    escrow_id: String,
    transaction_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SettlementResponse {
    transaction_id: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct TopicMessageBody<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct TopicMessageResponse {
    sequence_number: u64,
    transaction_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl GatewayClient {
    pub fn new(
        base_url: String,
        contract_id: String,
        topic_id: String,
        operator_id: String,
        operator_key: String,
    ) -> anyhow::Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Arc::new(Self {
            base_url,
            contract_id,
            topic_id,
            operator_id,
            operator_key,
            http_client,
        }))
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}:{}", self.operator_id, self.operator_key)
    }

    fn transport_error(err: reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout(CALL_TIMEOUT)
        } else {
            LedgerError::Unavailable(err.to_string())
        }
    }

    /// Map a non-2xx gateway response onto the error taxonomy. The gateway
    /// relays the contract's revert codes as stable string constants.
    async fn rejection(response: reqwest::Response) -> LedgerError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            return LedgerError::Unavailable(format!("{status} - {body}"));
        }

        let parsed: GatewayErrorBody = serde_json::from_str(&body).unwrap_or(GatewayErrorBody {
            code: None,
            message: None,
        });
        let message = parsed.message.unwrap_or(body);
        match parsed.code.as_deref() {
            Some("INSUFFICIENT_BALANCE") => LedgerError::InsufficientBalance,
            Some("INVOICE_NOT_FUNDABLE") => LedgerError::NotFundable(message),
            Some("INVOICE_ALREADY_FUNDED") => LedgerError::AlreadyFunded(message),
            Some("ESCROW_ALREADY_SETTLED") => LedgerError::AlreadySettled(message),
            Some("ESCROW_NOT_DUE") => LedgerError::NotYetDue(message),
            Some("ESCROW_NOT_FOUND") => LedgerError::UnknownEscrow(message),
            _ => LedgerError::Rejected(format!("{status} - {message}")),
        }
    }

    fn check_receipt_status(status: &str, transaction_id: &str) -> Result<(), LedgerError> {
        if status == "SUCCESS" {
            Ok(())
        } else {
            Err(LedgerError::Rejected(format!(
                "transaction {transaction_id} finished with receipt status {status}"
            )))
        }
    }
}

#[async_trait]
impl EscrowLedger for GatewayClient {
    async fn deposit(&self, request: DepositRequest) -> Result<DepositOutcome, LedgerError> {
        let url = format!(
            "{}/api/v1/contracts/{}/deposit",
            self.base_url, self.contract_id
        );
        let body = DepositBody {
            invoice_id: &request.invoice_id,
            nft_ref: request.nft_ref.as_deref(),
            investor: &request.investor,
            amount_minor: request.amount.minor(),
            due_date: request.due_date.to_string(),
            file_hash: &request.file_hash,
        };

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let deposit: DepositResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("malformed deposit response: {e}")))?;
        Self::check_receipt_status(&deposit.status, &deposit.transaction_id)?;

        tracing::info!(
            invoice_id = %request.invoice_id,
            escrow_id = %deposit.escrow_id,
            transaction_id = %deposit.transaction_id,
            "escrow deposit confirmed"
        );

        Ok(DepositOutcome {
            escrow_id: deposit.escrow_id,
            transaction_ref: deposit.transaction_id,
        })
    }

    async fn release(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError> {
        self.settle("release", escrow_id).await
    }

    async fn refund(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError> {
        self.settle("refund", escrow_id).await
    }
}

impl GatewayClient {
    async fn settle(&self, action: &str, escrow_id: &str) -> Result<SettlementOutcome, LedgerError> {
        let url = format!(
            "{}/api/v1/contracts/{}/escrows/{}/{}",
            self.base_url, self.contract_id, escrow_id, action
        );

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let settlement: SettlementResponse = response.json().await.map_err(|e| {
            LedgerError::Unavailable(format!("malformed {action} response: {e}"))
        })?;
        Self::check_receipt_status(&settlement.status, &settlement.transaction_id)?;

        tracing::info!(
            escrow_id,
            action,
            transaction_id = %settlement.transaction_id,
            "escrow settlement confirmed"
        );

        Ok(SettlementOutcome {
            transaction_ref: settlement.transaction_id,
        })
    }
}

#[async_trait]
impl ConsensusJournal for GatewayClient {
    async fn submit(&self, message: &[u8]) -> Result<SequencedReceipt, LedgerError> {
        let url = format!("{}/api/v1/topics/{}/messages", self.base_url, self.topic_id);
        let encoded = BASE64.encode(message);
        let body = TopicMessageBody { message: &encoded };

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let receipt: TopicMessageResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("malformed topic response: {e}")))?;
        Self::check_receipt_status(&receipt.status, &receipt.transaction_id)?;

        Ok(SequencedReceipt {
            sequence: receipt.sequence_number,
            transaction_ref: receipt.transaction_id,
        })
    }
}

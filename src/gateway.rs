// Fortuna Lottery - Chain gateway (JSON-RPC)
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::debug;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::error::{LotteryError, LotteryResult};

/// One entry of `getSignaturesForAddress`
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    /// Present when the transaction failed on-chain
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// `jsonParsed` transaction as returned by `getTransaction`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub inner_instructions: Option<Vec<InnerInstructions>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InnerInstructions {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionBody {
    pub message: TransactionMessage,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionMessage {
    #[serde(default)]
    pub instructions: Vec<ParsedInstruction>,
}

/// A parsed instruction; `parsed` is an object for known programs and a bare
/// string for some others (e.g. memo), so it is kept untyped until inspected.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ParsedInstruction {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub parsed: Option<Value>,
}

/// A native SOL transfer extracted from a parsed instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeTransfer {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

#[derive(Deserialize)]
struct ParsedTransferIx {
    #[serde(rename = "type")]
    kind: String,
    info: TransferInfo,
}

#[derive(Deserialize)]
struct TransferInfo {
    source: String,
    destination: String,
    lamports: u64,
}

impl ParsedInstruction {
    /// Interpret as a system-program transfer, if it is one
    pub fn native_transfer(&self) -> Option<NativeTransfer> {
        if self.program.as_deref() != Some("system") {
            return None;
        }
        let parsed: ParsedTransferIx = serde_json::from_value(self.parsed.clone()?).ok()?;
        if parsed.kind != "transfer" {
            return None;
        }
        Some(NativeTransfer {
            source: parsed.info.source,
            destination: parsed.info.destination,
            lamports: parsed.info.lamports,
        })
    }
}

impl ParsedTransaction {
    /// Whether the transaction failed on-chain
    pub fn is_failed(&self) -> bool {
        self.meta.as_ref().map_or(false, |meta| meta.err.is_some())
    }

    /// First native transfer into `destination`, top-level instructions
    /// before inner ones
    pub fn find_transfer_to(&self, destination: &str) -> Option<NativeTransfer> {
        let inner = self
            .meta
            .iter()
            .flat_map(|meta| meta.inner_instructions.iter().flatten())
            .flat_map(|inner| inner.instructions.iter());

        self.transaction
            .message
            .instructions
            .iter()
            .chain(inner)
            .filter_map(ParsedInstruction::native_transfer)
            .find(|transfer| transfer.destination == destination)
    }
}

/// Read and submit surface of the ledger node.
///
/// No call retries on its own; a failed call is retried by the next
/// invocation of whatever drove it.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Most recent signatures touching `address`, newest first
    async fn signatures_for_address(&self, address: &str, limit: usize) -> LotteryResult<Vec<SignatureInfo>>;

    /// Parsed transaction including inner instructions; `None` if unknown
    async fn transaction(&self, signature: &str) -> LotteryResult<Option<ParsedTransaction>>;

    /// Latest blockhash at finalized commitment
    async fn latest_blockhash(&self) -> LotteryResult<String>;

    async fn slot(&self) -> LotteryResult<u64>;

    /// Blockhash of the block at `slot`; `None` if the node has no block there
    async fn block_hash(&self, slot: u64) -> LotteryResult<Option<String>>;

    /// Submit a signed transaction, returning its signature
    async fn submit_raw(&self, transaction: &[u8]) -> LotteryResult<String>;
}

/// `getBlock` error codes meaning there is no block at the slot: cleaned up,
/// not available, skipped, missing in long-term storage
const NO_BLOCK_CODES: [i64; 4] = [-32001, -32004, -32007, -32009];

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl<T> RpcEnvelope<T> {
    fn into_result(self, method: &str) -> LotteryResult<Option<T>> {
        if let Some(error) = self.error {
            return Err(LotteryError::RpcError(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        Ok(self.result)
    }
}

#[derive(Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Deserialize)]
struct LatestBlockhash {
    blockhash: Option<String>,
}

#[derive(Deserialize)]
struct BlockHeader {
    blockhash: Option<String>,
}

/// JSON-RPC over HTTP with a bounded per-request timeout
pub struct RpcGateway {
    url: String,
    client: reqwest::Client,
}

impl RpcGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> LotteryResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> LotteryResult<RpcEnvelope<T>> {
        debug!("RPC {}", method);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        Ok(self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LotteryResult<Option<T>> {
        self.request(method, params).await?.into_result(method)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> LotteryResult<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| LotteryError::RpcError(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn signatures_for_address(&self, address: &str, limit: usize) -> LotteryResult<Vec<SignatureInfo>> {
        self.call_required("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await
    }

    async fn transaction(&self, signature: &str) -> LotteryResult<Option<ParsedTransaction>> {
        self.call(
            "getTransaction",
            json!([signature, { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }]),
        )
        .await
    }

    async fn latest_blockhash(&self) -> LotteryResult<String> {
        let response: Contextual<LatestBlockhash> = self
            .call_required("getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        response
            .value
            .blockhash
            .ok_or_else(|| LotteryError::RpcError("getLatestBlockhash returned no blockhash".to_string()))
    }

    async fn slot(&self) -> LotteryResult<u64> {
        self.call_required("getSlot", json!([])).await
    }

    async fn block_hash(&self, slot: u64) -> LotteryResult<Option<String>> {
        let envelope: RpcEnvelope<BlockHeader> = self
            .request(
                "getBlock",
                json!([slot, {
                    "encoding": "json",
                    "transactionDetails": "none",
                    "rewards": false,
                    "maxSupportedTransactionVersion": 0
                }]),
            )
            .await?;
        if let Some(error) = &envelope.error {
            if NO_BLOCK_CODES.contains(&error.code) {
                debug!("No block at slot {}: {}", slot, error.message);
                return Ok(None);
            }
        }
        let block = envelope.into_result("getBlock")?;
        Ok(block.and_then(|block| block.blockhash))
    }

    async fn submit_raw(&self, transaction: &[u8]) -> LotteryResult<String> {
        let encoded = STANDARD.encode(transaction);
        self.call_required(
            "sendTransaction",
            json!([encoded, { "encoding": "base64", "skipPreflight": false }]),
        )
        .await
    }
}

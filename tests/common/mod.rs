#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::json;

use fortuna::{
    base58,
    config::Config,
    gateway::{ChainGateway, ParsedTransaction, SignatureInfo},
    processor::Processor,
    state::{Round, TicketBatch},
    store::{RoundStore, Store},
    transaction::{TransferMessage, MESSAGE_LEN, TRANSACTION_LEN},
    LotteryError, LotteryResult,
};

/// RFC 8032 test 1 keypair, `seed || public key`
pub const SETTLEMENT_KEYPAIR: &str =
    "49W385L4rePHy6PAaQUovbD2aacgN4HsKXSMeUzRg4fmwXszN91JuMFrQRj3vMDpZuRF3ZknQBuRBoWQJEfXstMw";
pub const SETTLEMENT_PUBKEY: &str = "FVen3X669xLzsi6N2V91DoiyzHzg1uAgqiT8jZ9nS96Z";

/// 32 bytes of 7
pub const COLLECTION: &str = "US517G5965aydkZ46HS38QLi7UQiSojurfbQfKCELFx";
/// 32 bytes of 9
pub const WALLET: &str = "cGfHiC6Kgg3FpFZvgwGcswsCRtp4aBP2fzuXRQPizuN";
/// Bytes 0..32
pub const RECENT_BLOCKHASH: &str = "1thX6LZfHDZZKUs92febYZhYRcXddmzfzF2NvTkPNE";

pub const DRAW_SECRET: &str = "let-it-roll";
pub const TICKET_PRICE: u64 = 100_000_000; // 0.1 SOL

/// Scripted ledger node
#[derive(Default)]
pub struct MockGateway {
    pub signatures: Mutex<Vec<SignatureInfo>>,
    pub transactions: Mutex<HashMap<String, ParsedTransaction>>,
    pub broken_transactions: Mutex<HashSet<String>>,
    pub slot: Mutex<u64>,
    pub blocks: Mutex<HashMap<u64, String>>,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    pub fail_signatures: AtomicBool,
    pub fail_submit: AtomicBool,
    pub signature_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deposit of `lamports` from `source` into `destination`
    pub fn add_transfer(&self, signature: &str, source: &str, destination: &str, lamports: u64) {
        self.add_transaction(
            signature,
            json!({
                "slot": 100,
                "meta": { "err": null, "innerInstructions": [] },
                "transaction": { "message": { "instructions": [
                    transfer_instruction(source, destination, lamports)
                ]}}
            }),
        );
    }

    /// Deposit whose transfer only shows up as an inner instruction
    pub fn add_inner_transfer(&self, signature: &str, source: &str, destination: &str, lamports: u64) {
        self.add_transaction(
            signature,
            json!({
                "slot": 100,
                "meta": {
                    "err": null,
                    "innerInstructions": [{
                        "index": 0,
                        "instructions": [transfer_instruction(source, destination, lamports)]
                    }]
                },
                "transaction": { "message": { "instructions": [
                    { "program": "spl-memo", "programId": "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr", "parsed": "gm" },
                    { "programId": "Some1111111111111111111111111111111111111111", "accounts": [], "data": "3Bxs4h24hBtQy9rw" }
                ]}}
            }),
        );
    }

    /// Transaction that failed on-chain
    pub fn add_failed_transfer(&self, signature: &str, source: &str, destination: &str, lamports: u64) {
        self.add_transaction(
            signature,
            json!({
                "slot": 100,
                "meta": { "err": { "InstructionError": [0, "Custom"] } },
                "transaction": { "message": { "instructions": [
                    transfer_instruction(source, destination, lamports)
                ]}}
            }),
        );
    }

    pub fn add_transaction(&self, signature: &str, transaction: serde_json::Value) {
        let parsed: ParsedTransaction = serde_json::from_value(transaction).unwrap();
        self.transactions
            .lock()
            .unwrap()
            .insert(signature.to_string(), parsed);
        // Newest first, like the node
        self.signatures.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot: 100,
                err: None,
                block_time: None,
            },
        );
    }

    pub fn set_block(&self, slot: u64, blockhash: &str) {
        *self.slot.lock().unwrap() = slot;
        self.blocks.lock().unwrap().insert(slot, blockhash.to_string());
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }

    /// Decode the transfers submitted so far
    pub fn submitted_transfers(&self) -> Vec<TransferMessage> {
        self.submitted()
            .iter()
            .map(|tx| {
                assert_eq!(tx.len(), TRANSACTION_LEN);
                let message: &[u8; MESSAGE_LEN] = tx[65..].try_into().unwrap();
                TransferMessage::unpack(message)
            })
            .collect()
    }
}

fn transfer_instruction(source: &str, destination: &str, lamports: u64) -> serde_json::Value {
    json!({
        "program": "system",
        "programId": "11111111111111111111111111111111",
        "parsed": {
            "type": "transfer",
            "info": { "source": source, "destination": destination, "lamports": lamports }
        }
    })
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn signatures_for_address(&self, address: &str, limit: usize) -> LotteryResult<Vec<SignatureInfo>> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(address, COLLECTION);
        if self.fail_signatures.load(Ordering::SeqCst) {
            return Err(LotteryError::RpcError("getSignaturesForAddress failed (-32005): node is behind".into()));
        }
        Ok(self.signatures.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn transaction(&self, signature: &str) -> LotteryResult<Option<ParsedTransaction>> {
        if self.broken_transactions.lock().unwrap().contains(signature) {
            return Err(LotteryError::RpcError("getTransaction returned no result".into()));
        }
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn latest_blockhash(&self) -> LotteryResult<String> {
        Ok(RECENT_BLOCKHASH.to_string())
    }

    async fn slot(&self) -> LotteryResult<u64> {
        Ok(*self.slot.lock().unwrap())
    }

    async fn block_hash(&self, slot: u64) -> LotteryResult<Option<String>> {
        Ok(self.blocks.lock().unwrap().get(&slot).cloned())
    }

    async fn submit_raw(&self, transaction: &[u8]) -> LotteryResult<String> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(LotteryError::RpcError(
                "sendTransaction failed (-32002): Transaction simulation failed".into(),
            ));
        }
        self.submitted.lock().unwrap().push(transaction.to_vec());
        Ok(base58::encode(&transaction[1..65]))
    }
}

pub fn test_config() -> Config {
    Config {
        collection_address: COLLECTION.to_string(),
        settlement_key: Some(SETTLEMENT_KEYPAIR.to_string()),
        draw_secret: DRAW_SECRET.to_string(),
        ticket_price: TICKET_PRICE,
        ..Config::default()
    }
}

pub struct TestLottery {
    pub store: Arc<Store>,
    pub gateway: Arc<MockGateway>,
    pub processor: Processor,
}

impl TestLottery {
    pub fn active_round(&self) -> Round {
        self.store.active_round().unwrap().expect("active round")
    }
}

/// Fresh store, no round opened yet
pub fn setup_without_round(config: Config) -> TestLottery {
    let store = Arc::new(Store::in_memory());
    let gateway = Arc::new(MockGateway::new());
    let processor = Processor::new(
        &config,
        store.clone() as Arc<dyn RoundStore>,
        gateway.clone() as Arc<dyn ChainGateway>,
    )
    .unwrap();
    TestLottery {
        store,
        gateway,
        processor,
    }
}

/// Fresh store with round 1 open
pub fn setup_with(config: Config) -> TestLottery {
    let lottery = setup_without_round(config);
    lottery.processor.bootstrap().unwrap();
    lottery
}

pub fn setup() -> TestLottery {
    setup_with(test_config())
}

/// Occupy ticket numbers directly in the store
pub fn seed_tickets(store: &Store, round_id: u64, wallet: &str, numbers: Vec<u16>, signature: &str, jackpot: u64) {
    store
        .issue_tickets(TicketBatch {
            round_id,
            wallet_address: wallet.to_string(),
            ticket_numbers: numbers,
            tx_signature: signature.to_string(),
            jackpot_increment: jackpot,
            created_at: 0,
        })
        .unwrap();
}

// Fortuna Lottery - Configuration
use std::{env, str::FromStr, time::Duration};

use crate::{
    base58,
    error::{LotteryError, LotteryResult},
    settlement::Settler,
    signer::Signer,
    utils::{sol_to_lamports, MAX_BASIS_POINTS},
};

/// Service configuration
#[derive(Clone)]
pub struct Config {
    /// Public account that receives every deposit
    pub collection_address: String,
    /// Base-58 `seed || public key`; refunds and payouts are disabled without it
    pub settlement_key: Option<String>,
    /// JSON-RPC endpoint of the ledger node
    pub rpc_url: String,
    /// Shared secret required by the draw endpoint
    pub draw_secret: String,
    /// Price per ticket in lamports (0.1 SOL = 100,000,000 lamports)
    pub ticket_price: u64,
    /// Length of a round in seconds
    pub round_duration_secs: i64,
    /// Share of each ticket's price credited to the jackpot, in basis points
    pub jackpot_share_bps: u16,
    /// Number of recent collection-address signatures scanned per pass
    pub signature_window: usize,
    pub rpc_timeout_secs: u64,
    /// Journal file of the store; `<name>.lock` next to it is the process lock
    pub store_path: String,
    /// Listen address of the HTTP server
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_address: String::new(),
            settlement_key: None,
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            draw_secret: String::new(),
            ticket_price: 100_000_000, // 0.1 SOL
            round_duration_secs: 1440 * 60,
            jackpot_share_bps: MAX_BASIS_POINTS, // 100%
            signature_window: 50,
            rpc_timeout_secs: 15,
            store_path: "fortuna.store".to_string(),
            bind_addr: "0.0.0.0:8787".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("collection_address", &self.collection_address)
            .field("settlement_key", &self.settlement_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .field("draw_secret", &"<redacted>")
            .field("ticket_price", &self.ticket_price)
            .field("round_duration_secs", &self.round_duration_secs)
            .field("jackpot_share_bps", &self.jackpot_share_bps)
            .field("signature_window", &self.signature_window)
            .field("rpc_timeout_secs", &self.rpc_timeout_secs)
            .field("store_path", &self.store_path)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Config {
    /// Defaults overridden by environment variables
    pub fn from_env() -> LotteryResult<Self> {
        let mut config = Config::default();

        if let Some(address) = var("TREASURY_WALLET") {
            config.collection_address = address;
        }
        config.settlement_key = var("TREASURY_PRIVATE_KEY");
        if let Some(url) = var("SOLANA_RPC") {
            config.rpc_url = url;
        }
        if let Some(secret) = var("DRAW_SECRET") {
            config.draw_secret = secret;
        }
        if let Some(price) = parse_var::<f64>("TICKET_PRICE")? {
            config.ticket_price = sol_to_lamports(price)?;
        }
        if let Some(minutes) = parse_var::<i64>("ROUND_DURATION_MINUTES")? {
            config.round_duration_secs = minutes
                .checked_mul(60)
                .ok_or_else(|| LotteryError::Config("ROUND_DURATION_MINUTES is too large".to_string()))?;
        }
        if let Some(bps) = parse_var("JACKPOT_SHARE_BPS")? {
            config.jackpot_share_bps = bps;
        }
        if let Some(window) = parse_var("SIGNATURE_WINDOW")? {
            config.signature_window = window;
        }
        if let Some(secs) = parse_var("RPC_TIMEOUT_SECS")? {
            config.rpc_timeout_secs = secs;
        }
        if let Some(path) = var("STORE_PATH") {
            config.store_path = path;
        }
        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LotteryResult<()> {
        base58::decode_array::<32>(&self.collection_address)
            .map_err(|e| LotteryError::Config(format!("TREASURY_WALLET: {}", e)))?;
        if self.draw_secret.is_empty() {
            return Err(LotteryError::Config("DRAW_SECRET must be set".to_string()));
        }
        if self.ticket_price == 0 {
            return Err(LotteryError::Config("ticket price must be greater than zero".to_string()));
        }
        if self.round_duration_secs <= 0 {
            return Err(LotteryError::Config("round duration must be positive".to_string()));
        }
        if self.jackpot_share_bps > MAX_BASIS_POINTS {
            return Err(LotteryError::Config(
                "jackpot share cannot exceed 10000 basis points (100%)".to_string(),
            ));
        }
        if self.signature_window == 0 {
            return Err(LotteryError::Config("signature window must be positive".to_string()));
        }
        if let Some(key) = &self.settlement_key {
            Signer::from_base58(key)?;
        }
        Ok(())
    }

    /// Settlement signer, if a key is configured
    pub fn settler(&self) -> LotteryResult<Option<Settler>> {
        self.settlement_key
            .as_deref()
            .map(|key| Signer::from_base58(key).map(Settler::new))
            .transpose()
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> LotteryResult<Option<T>> {
    var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| LotteryError::Config(format!("{} has an invalid value: {}", name, value)))
        })
        .transpose()
}

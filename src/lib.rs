// Fortuna Lottery
// A recurring jackpot lottery settled on Solana: deposits to the collection
// address become numbered tickets, rounds are drawn on chain randomness, and
// payouts and refunds are signed and submitted by the service itself.

// Core modules
pub mod config;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod store;
pub mod utils;

// Ledger transaction modules
pub mod base58;
pub mod gateway;
pub mod settlement;
pub mod signer;
pub mod transaction;

// Lottery pipelines
pub mod draw;
pub mod ingest;

pub mod server;

pub use error::{LotteryError, LotteryResult};

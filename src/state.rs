// Fortuna Lottery - State
use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;

/// Ticket numbers run from 0 to 9999
pub const TICKET_NUMBER_SPACE: u16 = 10_000;

pub type UnixTimestamp = i64;

/// Status of a round
#[derive(BorshSerialize, BorshDeserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Round is accepting deposits
    Active,
    /// Winning number chosen, terminal
    Drawn,
}

/// One lottery cycle
#[derive(BorshSerialize, BorshDeserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Round {
    /// Storage id
    pub id: u64,
    /// Sequential round number (1, 2, 3, etc.)
    pub round_number: u64,
    /// Prize pool in lamports
    pub jackpot_amount: u64,
    pub status: RoundStatus,
    /// Scheduled draw time (Unix timestamp)
    pub draw_time: UnixTimestamp,
    /// Price per ticket in lamports
    pub ticket_price: u64,
    /// Set once, when the round is drawn
    pub winning_number: Option<u16>,
    pub winner_wallet: Option<String>,
    pub draw_blockhash: Option<String>,
    pub draw_slot: Option<u64>,
}

impl Round {
    /// Check if the scheduled draw time has passed
    pub fn is_due(&self, current_time: UnixTimestamp) -> bool {
        current_time >= self.draw_time
    }

    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }
}

/// Values for a round about to be opened
#[derive(Clone, Debug, PartialEq)]
pub struct NewRound {
    pub round_number: u64,
    pub jackpot_amount: u64,
    pub draw_time: UnixTimestamp,
    pub ticket_price: u64,
}

/// Fields written exactly once, when a round is drawn
#[derive(Clone, Debug, PartialEq)]
pub struct RoundClosure {
    pub winning_number: u16,
    pub draw_blockhash: String,
    pub draw_slot: u64,
}

/// One lottery entry
#[derive(BorshSerialize, BorshDeserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: u64,
    pub round_id: u64,
    /// Wallet that paid for the ticket
    pub wallet_address: String,
    /// Unique within the round, 0..9999
    pub ticket_number: u16,
    /// Deposit transaction that paid for the ticket
    pub tx_signature: String,
    pub created_at: UnixTimestamp,
}

/// Tickets paid for by a single deposit, inserted as one batch
#[derive(Clone, Debug, PartialEq)]
pub struct TicketBatch {
    pub round_id: u64,
    pub wallet_address: String,
    pub ticket_numbers: Vec<u16>,
    pub tx_signature: String,
    /// Added to the round's jackpot in the same write
    pub jackpot_increment: u64,
    pub created_at: UnixTimestamp,
}

/// Why a deposit was (partly) sent back
#[derive(BorshSerialize, BorshDeserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// No ticket numbers were left
    RoundFull,
    /// Only some of the paid-for tickets could be issued
    PartialOverflow,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::RoundFull => "round_full",
            RefundReason::PartialOverflow => "partial_overflow",
        }
    }
}

/// A settled refund
#[derive(BorshSerialize, BorshDeserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Refund {
    pub id: u64,
    /// Round that was active when the deposit was processed
    pub round_id: u64,
    pub wallet_address: String,
    /// Refunded lamports
    pub amount: u64,
    /// Original deposit
    pub tx_signature: String,
    /// Settlement transaction that paid the refund
    pub refund_tx: String,
    pub reason: RefundReason,
}

/// Refund accepted by the gateway, not yet stored
#[derive(Clone, Debug, PartialEq)]
pub struct NewRefund {
    pub round_id: u64,
    pub wallet_address: String,
    pub amount: u64,
    pub tx_signature: String,
    pub refund_tx: String,
    pub reason: RefundReason,
}

/// A drawn round together with the round opened in its place
#[derive(Clone, Debug, PartialEq)]
pub struct RoundTransition {
    pub closed: Round,
    pub opened: Round,
}

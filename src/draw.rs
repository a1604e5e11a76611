// Fortuna Lottery - Draw engine
use std::sync::Arc;

use arrayref::array_ref;
use log::{error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{
    config::Config,
    error::{LotteryError, LotteryResult},
    gateway::ChainGateway,
    ingest::Ingestor,
    settlement::Settler,
    state::{NewRound, Round, RoundClosure, UnixTimestamp, TICKET_NUMBER_SPACE},
    store::{self, RoundStore},
    utils::{lamports_to_sol, unix_timestamp},
};

/// `SHA256(blockhash ":" round_id)`, first four digest bytes read as a
/// big-endian `u32`, reduced mod 10000.
pub fn winning_number(blockhash: &str, round_id: u64) -> u16 {
    let digest = Sha256::digest(format!("{}:{}", blockhash, round_id).as_bytes());
    let value = u32::from_be_bytes(*array_ref![digest, 0, 4]);
    (value % TICKET_NUMBER_SPACE as u32) as u16
}

/// Successor of a drawn round: the jackpot resets when it was won and rolls
/// over otherwise
pub fn next_round(closed: &Round, now: UnixTimestamp, ticket_price: u64, round_duration_secs: i64) -> NewRound {
    NewRound {
        round_number: closed.round_number + 1,
        jackpot_amount: if closed.winner_wallet.is_some() {
            0
        } else {
            closed.jackpot_amount
        },
        draw_time: now + round_duration_secs,
        ticket_price,
    }
}

/// Settlement of the jackpot after a round is closed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayoutStatus {
    NoWinner,
    EmptyJackpot,
    /// Winner exists but no settlement key is configured
    NoSettlementKey,
    Sent(String),
    /// Round stays drawn; the prize has to be sent by hand
    Failed(String),
}

impl PayoutStatus {
    pub fn transaction(&self) -> Option<&str> {
        match self {
            PayoutStatus::Sent(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn needs_manual_settlement(&self) -> bool {
        matches!(self, PayoutStatus::NoSettlementKey | PayoutStatus::Failed(_))
    }
}

/// Outcome of a successful draw
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawResult {
    pub winning_number: u16,
    pub winner: Option<String>,
    /// Jackpot of the drawn round, in lamports
    pub jackpot: u64,
    pub payout_tx: Option<String>,
    /// Round number of the round opened by this draw
    pub new_round: u64,
    pub blockhash: String,
    pub slot: u64,
    pub manual_settlement_required: bool,
}

/// Closes the active round on chain-derived randomness and opens the next one
pub struct DrawEngine {
    store: Arc<dyn RoundStore>,
    gateway: Arc<dyn ChainGateway>,
    ingestor: Arc<Ingestor>,
    settler: Option<Arc<Settler>>,
    draw_secret: String,
    ticket_price: u64,
    round_duration_secs: i64,
}

impl DrawEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn RoundStore>,
        gateway: Arc<dyn ChainGateway>,
        ingestor: Arc<Ingestor>,
        settler: Option<Arc<Settler>>,
    ) -> Self {
        Self {
            store,
            gateway,
            ingestor,
            settler,
            draw_secret: config.draw_secret.clone(),
            ticket_price: config.ticket_price,
            round_duration_secs: config.round_duration_secs,
        }
    }

    pub async fn draw(&self, secret: &str) -> LotteryResult<DrawResult> {
        let matches: bool = secret.as_bytes().ct_eq(self.draw_secret.as_bytes()).into();
        if self.draw_secret.is_empty() || !matches {
            warn!("Draw rejected: bad secret");
            return Err(LotteryError::Unauthorized);
        }

        // Pick up late deposits first; a failure here does not stop the draw
        match self.ingestor.ingest().await {
            Ok(report) => info!(
                "Pre-draw deposit scan: {} tickets issued, {} refunds sent",
                report.issued, report.refunded
            ),
            Err(e) => warn!("Pre-draw deposit scan failed: {}", e),
        }

        let round = self.store.active_round()?.ok_or(LotteryError::NoActiveRound)?;
        let now = unix_timestamp();
        if !round.is_due(now) {
            info!(
                "Drawing round {} before its scheduled time {}",
                round.round_number, round.draw_time
            );
        }

        let (slot, blockhash) = self.randomness().await?;
        let winning_number = winning_number(&blockhash, round.id);
        info!(
            "Round {}: slot {}, blockhash {}, winning number {:04}",
            round.round_number, slot, blockhash, winning_number
        );

        let closure = RoundClosure {
            winning_number,
            draw_blockhash: blockhash.clone(),
            draw_slot: slot,
        };
        let (round_id, ticket_price, round_duration_secs) = (round.id, self.ticket_price, self.round_duration_secs);
        let transition = store::blocking(&self.store, move |store| {
            store.close_round(round_id, closure, &|closed: &Round| {
                next_round(closed, now, ticket_price, round_duration_secs)
            })
        })
        .await?;
        let closed = transition.closed;

        match &closed.winner_wallet {
            Some(winner) => info!(
                "Round {} won by {}, jackpot {} SOL",
                closed.round_number,
                winner,
                lamports_to_sol(closed.jackpot_amount)
            ),
            None => info!(
                "Round {} has no winner, {} SOL rolls over",
                closed.round_number,
                lamports_to_sol(closed.jackpot_amount)
            ),
        }
        info!(
            "Round {} opened, draws at {}",
            transition.opened.round_number, transition.opened.draw_time
        );

        let payout = self.payout(&closed).await;

        Ok(DrawResult {
            winning_number,
            winner: closed.winner_wallet.clone(),
            jackpot: closed.jackpot_amount,
            payout_tx: payout.transaction().map(str::to_string),
            new_round: transition.opened.round_number,
            blockhash,
            slot,
            manual_settlement_required: payout.needs_manual_settlement(),
        })
    }

    /// Current slot and the blockhash of the block at that slot
    async fn randomness(&self) -> LotteryResult<(u64, String)> {
        let slot = self.gateway.slot().await?;
        let blockhash = self
            .gateway
            .block_hash(slot)
            .await?
            .ok_or(LotteryError::RandomnessUnavailable(slot))?;
        Ok((slot, blockhash))
    }

    /// Send the jackpot of a drawn round to its winner. Never fails the draw:
    /// the round is already closed when this runs.
    async fn payout(&self, closed: &Round) -> PayoutStatus {
        let winner = match &closed.winner_wallet {
            Some(winner) => winner,
            None => return PayoutStatus::NoWinner,
        };
        if closed.jackpot_amount == 0 {
            return PayoutStatus::EmptyJackpot;
        }
        let settler = match &self.settler {
            Some(settler) => settler,
            None => {
                error!(
                    "No settlement key configured, {} lamports owed to {} for round {}, manual settlement required",
                    closed.jackpot_amount, winner, closed.round_number
                );
                return PayoutStatus::NoSettlementKey;
            }
        };

        match settler
            .transfer(self.gateway.as_ref(), winner, closed.jackpot_amount)
            .await
        {
            Ok(signature) => {
                info!("Payout sent for round {}: {}", closed.round_number, signature);
                PayoutStatus::Sent(signature)
            }
            Err(e) => {
                error!(
                    "Payout of {} lamports to {} for round {} failed, manual settlement required: {}",
                    closed.jackpot_amount, winner, closed.round_number, e
                );
                PayoutStatus::Failed(e.to_string())
            }
        }
    }
}

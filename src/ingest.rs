// Fortuna Lottery - Deposit ingestion
use std::{collections::HashSet, sync::Arc};

use log::{debug, error, info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;

use crate::{
    config::Config,
    error::{LotteryError, LotteryResult},
    gateway::ChainGateway,
    settlement::Settler,
    state::{NewRefund, Refund, RefundReason, Round, TicketBatch, TICKET_NUMBER_SPACE},
    store::{self, RoundStore},
    utils::{calculate_share, lamports_to_sol, unix_timestamp},
};

/// Totals of one ingestion pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Tickets issued
    pub issued: u64,
    /// Refunds sent
    pub refunded: u64,
}

impl IngestReport {
    fn record(&mut self, outcome: &DepositOutcome) {
        match outcome {
            DepositOutcome::Issued { tickets, refund } => {
                self.issued += tickets;
                if refund.is_some() {
                    self.refunded += 1;
                }
            }
            DepositOutcome::Refunded(_) | DepositOutcome::RefundUnrecorded { .. } => self.refunded += 1,
            DepositOutcome::Skipped(_) | DepositOutcome::Failed(_) => {}
        }
    }
}

/// Expected reasons to leave a signature alone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass holds the signature
    InProgress,
    TransactionNotFound,
    FailedOnChain,
    /// No native transfer into the collection address
    NoTransferToCollection,
    BelowTicketPrice,
    /// A refund is owed but no settlement key is configured
    RefundUnavailable,
}

/// What happened to one deposit signature
#[derive(Debug)]
pub enum DepositOutcome {
    /// Tickets issued; `refund` is set when an overflow was sent back
    Issued { tickets: u64, refund: Option<Refund> },
    /// Round was full, the whole deposit went back
    Refunded(Refund),
    /// Refund left the collection account but could not be recorded; the
    /// signature stays claimed so this process will not pay it twice
    RefundUnrecorded { refund_tx: String, error: LotteryError },
    Skipped(SkipReason),
    /// Left unrecorded, retried on the next pass
    Failed(LotteryError),
}

/// A native transfer into the collection address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deposit {
    pub signature: String,
    pub sender: String,
    pub lamports: u64,
}

/// Draw `count` distinct unused numbers, uniformly, by a truncated
/// Fisher-Yates shuffle of the unused pool
pub fn pick_numbers<R: Rng + ?Sized>(used: &HashSet<u16>, count: usize, rng: &mut R) -> Vec<u16> {
    let mut pool: Vec<u16> = (0..TICKET_NUMBER_SPACE).filter(|n| !used.contains(n)).collect();
    let count = count.min(pool.len());
    let (picked, _) = pool.partial_shuffle(rng, count);
    picked.to_vec()
}

/// Turns deposits into tickets, and refunds what cannot be ticketed.
///
/// Safe to run again and again: a signature is only acted on while it is not
/// yet recorded in the ticket or refund tables.
pub struct Ingestor {
    store: Arc<dyn RoundStore>,
    gateway: Arc<dyn ChainGateway>,
    settler: Option<Arc<Settler>>,
    collection_address: String,
    jackpot_share_bps: u16,
    signature_window: usize,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn RoundStore>,
        gateway: Arc<dyn ChainGateway>,
        settler: Option<Arc<Settler>>,
    ) -> Self {
        Self {
            store,
            gateway,
            settler,
            collection_address: config.collection_address.clone(),
            jackpot_share_bps: config.jackpot_share_bps,
            signature_window: config.signature_window,
        }
    }

    /// Scan the recent collection-address signatures and process new deposits
    pub async fn ingest(&self) -> LotteryResult<IngestReport> {
        let mut report = IngestReport::default();

        let round = match self.store.active_round()? {
            Some(round) => round,
            None => {
                info!("No active round, skipping deposit scan");
                return Ok(report);
            }
        };

        let signatures = self
            .gateway
            .signatures_for_address(&self.collection_address, self.signature_window)
            .await?;
        let candidates: Vec<String> = signatures
            .into_iter()
            .filter(|info| info.err.is_none())
            .map(|info| info.signature)
            .collect();
        let recorded = self.store.recorded_signatures(&candidates)?;
        let pending: Vec<&String> = candidates
            .iter()
            .filter(|signature| !recorded.contains(*signature))
            .collect();

        if pending.is_empty() {
            debug!("No new deposits for round {}", round.round_number);
            return Ok(report);
        }
        info!(
            "Processing {} new signatures for round {}",
            pending.len(),
            round.round_number
        );

        let mut used = self.store.used_numbers(round.id)?;

        // Oldest first, so earlier deposits get the last free numbers
        for signature in pending.into_iter().rev() {
            let outcome = self.process_signature(&round, signature, &mut used).await;
            log_outcome(signature, &outcome);
            report.record(&outcome);
        }

        info!(
            "Deposit scan done: {} tickets issued, {} refunds sent",
            report.issued, report.refunded
        );
        Ok(report)
    }

    async fn process_signature(&self, round: &Round, signature: &str, used: &mut HashSet<u16>) -> DepositOutcome {
        match self.store.claim_signature(signature) {
            Ok(true) => {}
            Ok(false) => return DepositOutcome::Skipped(SkipReason::InProgress),
            Err(e) => return DepositOutcome::Failed(e),
        }

        let outcome = match self.process_deposit(round, signature, used).await {
            Ok(outcome) => outcome,
            Err(e) => DepositOutcome::Failed(e),
        };

        if !matches!(outcome, DepositOutcome::RefundUnrecorded { .. }) {
            if let Err(e) = self.store.release_signature(signature) {
                warn!("Could not release claim on {}: {}", signature, e);
            }
        }
        outcome
    }

    async fn process_deposit(
        &self,
        round: &Round,
        signature: &str,
        used: &mut HashSet<u16>,
    ) -> LotteryResult<DepositOutcome> {
        let transaction = match self.gateway.transaction(signature).await? {
            Some(transaction) => transaction,
            None => return Ok(DepositOutcome::Skipped(SkipReason::TransactionNotFound)),
        };
        if transaction.is_failed() {
            return Ok(DepositOutcome::Skipped(SkipReason::FailedOnChain));
        }

        let transfer = match transaction.find_transfer_to(&self.collection_address) {
            Some(transfer) => transfer,
            None => return Ok(DepositOutcome::Skipped(SkipReason::NoTransferToCollection)),
        };
        let deposit = Deposit {
            signature: signature.to_string(),
            sender: transfer.source,
            lamports: transfer.lamports,
        };

        let ticket_count = deposit.lamports / round.ticket_price;
        if ticket_count == 0 {
            return Ok(DepositOutcome::Skipped(SkipReason::BelowTicketPrice));
        }

        let available = (TICKET_NUMBER_SPACE as u64).saturating_sub(used.len() as u64);
        if available == 0 {
            info!(
                "Round {} is full, refunding {} lamports to {}",
                round.round_number, deposit.lamports, deposit.sender
            );
            let outcome = match self
                .refund(round, &deposit, deposit.lamports, RefundReason::RoundFull)
                .await?
            {
                RefundAttempt::Recorded(refund) => DepositOutcome::Refunded(refund),
                RefundAttempt::Unrecorded { refund_tx, error } => {
                    DepositOutcome::RefundUnrecorded { refund_tx, error }
                }
                RefundAttempt::NoSettlementKey => DepositOutcome::Skipped(SkipReason::RefundUnavailable),
            };
            return Ok(outcome);
        }

        let issued = ticket_count.min(available);
        let numbers = pick_numbers(used, issued as usize, &mut StdRng::from_entropy());
        let ticket_value = issued
            .checked_mul(round.ticket_price)
            .ok_or(LotteryError::MathOverflow)?;
        let jackpot_increment = calculate_share(ticket_value, self.jackpot_share_bps)?;

        let batch = TicketBatch {
            round_id: round.id,
            wallet_address: deposit.sender.clone(),
            ticket_numbers: numbers.clone(),
            tx_signature: deposit.signature.clone(),
            jackpot_increment,
            created_at: unix_timestamp(),
        };
        let tickets = store::blocking(&self.store, move |store| store.issue_tickets(batch)).await?;
        used.extend(numbers);
        info!(
            "Issued {} tickets to {} for {} (jackpot +{} lamports)",
            tickets.len(),
            deposit.sender,
            deposit.signature,
            jackpot_increment
        );

        let mut refund = None;
        if ticket_count > issued {
            let excess = (ticket_count - issued)
                .checked_mul(round.ticket_price)
                .ok_or(LotteryError::MathOverflow)?;
            // Tickets are already recorded, so a failed overflow refund cannot
            // be retried by a later pass
            match self
                .refund(round, &deposit, excess, RefundReason::PartialOverflow)
                .await
            {
                Ok(RefundAttempt::Recorded(recorded)) => refund = Some(recorded),
                Ok(RefundAttempt::Unrecorded { refund_tx, error }) => error!(
                    "Overflow refund {} for {} sent but not recorded, manual settlement required: {}",
                    refund_tx, deposit.signature, error
                ),
                Ok(RefundAttempt::NoSettlementKey) => error!(
                    "Overflow of {} lamports for {} owed to {}, no settlement key configured, manual settlement required",
                    excess, deposit.signature, deposit.sender
                ),
                Err(e) => error!(
                    "Overflow refund of {} lamports to {} for {} failed, manual settlement required: {}",
                    excess, deposit.sender, deposit.signature, e
                ),
            }
        }

        Ok(DepositOutcome::Issued {
            tickets: tickets.len() as u64,
            refund,
        })
    }

    async fn refund(
        &self,
        round: &Round,
        deposit: &Deposit,
        lamports: u64,
        reason: RefundReason,
    ) -> LotteryResult<RefundAttempt> {
        let settler = match &self.settler {
            Some(settler) => settler,
            None => {
                warn!(
                    "No settlement key configured, cannot send {} refund of {} lamports to {}",
                    reason.as_str(),
                    lamports,
                    deposit.sender
                );
                return Ok(RefundAttempt::NoSettlementKey);
            }
        };

        let refund_tx = settler
            .transfer(self.gateway.as_ref(), &deposit.sender, lamports)
            .await?;
        info!(
            "Refund ({}) of {} SOL sent to {}: {}",
            reason.as_str(),
            lamports_to_sol(lamports),
            deposit.sender,
            refund_tx
        );

        let refund = NewRefund {
            round_id: round.id,
            wallet_address: deposit.sender.clone(),
            amount: lamports,
            tx_signature: deposit.signature.clone(),
            refund_tx: refund_tx.clone(),
            reason,
        };
        let recorded = store::blocking(&self.store, move |store| store.record_refund(refund)).await;
        Ok(match recorded {
            Ok(refund) => RefundAttempt::Recorded(refund),
            Err(error) => RefundAttempt::Unrecorded { refund_tx, error },
        })
    }
}

enum RefundAttempt {
    Recorded(Refund),
    Unrecorded { refund_tx: String, error: LotteryError },
    NoSettlementKey,
}

fn log_outcome(signature: &str, outcome: &DepositOutcome) {
    match outcome {
        DepositOutcome::Issued { .. } | DepositOutcome::Refunded(_) => {}
        DepositOutcome::RefundUnrecorded { refund_tx, error } => error!(
            "Refund {} for {} sent but not recorded, manual settlement required: {}",
            refund_tx, signature, error
        ),
        DepositOutcome::Skipped(reason) => debug!("Skipped {}: {:?}", signature, reason),
        DepositOutcome::Failed(e) => error!("Failed to process {}: {}", signature, e),
    }
}

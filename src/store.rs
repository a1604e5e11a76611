// Fortuna Lottery - Round, ticket and refund store
use std::{
    collections::{HashMap, HashSet},
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use arrayref::array_ref;
use borsh::{BorshDeserialize, BorshSerialize};
use fs2::FileExt;
use log::{debug, info, warn};

use crate::{
    error::{LotteryError, LotteryResult},
    state::{
        NewRefund, NewRound, Refund, RefundReason, Round, RoundClosure, RoundStatus, RoundTransition,
        Ticket, TicketBatch, TICKET_NUMBER_SPACE,
    },
};

/// Repository over the `rounds`, `tickets` and `refunds` tables.
///
/// Every mutating call is atomic, and the uniqueness rules (one active round,
/// distinct ticket numbers per round, one record per deposit signature) are
/// checked inside the same write that would break them.
pub trait RoundStore: Send + Sync {
    fn active_round(&self) -> LotteryResult<Option<Round>>;

    /// Round with the highest round number, whatever its status
    fn latest_round(&self) -> LotteryResult<Option<Round>>;

    /// Fails with `ActiveRoundExists` if a round is still active
    fn open_round(&self, round: NewRound) -> LotteryResult<Round>;

    /// Subset of `signatures` already recorded in tickets or refunds
    fn recorded_signatures(&self, signatures: &[String]) -> LotteryResult<HashSet<String>>;

    fn used_numbers(&self, round_id: u64) -> LotteryResult<HashSet<u16>>;

    /// Insert all tickets of one deposit and credit the jackpot, all or nothing
    fn issue_tickets(&self, batch: TicketBatch) -> LotteryResult<Vec<Ticket>>;

    fn record_refund(&self, refund: NewRefund) -> LotteryResult<Refund>;

    fn tickets_for_round(&self, round_id: u64) -> LotteryResult<Vec<Ticket>>;

    fn refunds(&self) -> LotteryResult<Vec<Refund>>;

    /// Draw the active round `round_id` and open its successor in one write.
    ///
    /// The winner is resolved from the ticket table inside the write, and
    /// `next` derives the successor from the closed round. Fails with
    /// `RoundAlreadyDrawn` if the round is no longer active.
    fn close_round(
        &self,
        round_id: u64,
        closure: RoundClosure,
        next: &dyn Fn(&Round) -> NewRound,
    ) -> LotteryResult<RoundTransition>;

    /// Take an in-process lease on a deposit signature. Returns `false` if
    /// another pass holds it.
    fn claim_signature(&self, signature: &str) -> LotteryResult<bool>;

    fn release_signature(&self, signature: &str) -> LotteryResult<()>;
}

/// Run a store call on the blocking pool, off the async workers
pub async fn blocking<T, F>(store: &Arc<dyn RoundStore>, op: F) -> LotteryResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn RoundStore) -> LotteryResult<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| LotteryError::Storage(format!("store task failed: {}", e)))?
}

/// One committed write, as recorded in the journal
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
enum Mutation {
    OpenRound(Round),
    IssueTickets {
        round_id: u64,
        jackpot_increment: u64,
        tickets: Vec<Ticket>,
    },
    RecordRefund(Refund),
    CloseRound { closed: Round, opened: Round },
}

/// Table contents plus the lookup indexes rebuilt from them.
///
/// Writes are planned against `&Tables` into a `Mutation`, which is then
/// applied without any further checks. Ids are positional: the n-th row of a
/// table has id n.
#[derive(Debug, Default)]
struct Tables {
    rounds: Vec<Round>,
    tickets: Vec<Ticket>,
    refunds: Vec<Refund>,
    ticket_signatures: HashSet<String>,
    refund_signatures: HashSet<String>,
    /// round id -> ticket number -> position in `tickets`
    numbers: HashMap<u64, HashMap<u16, usize>>,
}

impl Tables {
    fn active_round(&self) -> Option<&Round> {
        self.rounds.iter().rev().find(|round| round.is_active())
    }

    fn round(&self, round_id: u64) -> Option<&Round> {
        self.rounds.iter().rev().find(|round| round.id == round_id)
    }

    fn is_recorded(&self, signature: &str) -> bool {
        self.ticket_signatures.contains(signature) || self.refund_signatures.contains(signature)
    }

    fn winner_of(&self, round_id: u64, number: u16) -> Option<String> {
        let position = *self.numbers.get(&round_id)?.get(&number)?;
        self.tickets.get(position).map(|ticket| ticket.wallet_address.clone())
    }

    fn build_round(&self, round: NewRound) -> Round {
        Round {
            id: self.rounds.len() as u64 + 1,
            round_number: round.round_number,
            jackpot_amount: round.jackpot_amount,
            status: RoundStatus::Active,
            draw_time: round.draw_time,
            ticket_price: round.ticket_price,
            winning_number: None,
            winner_wallet: None,
            draw_blockhash: None,
            draw_slot: None,
        }
    }

    fn plan_open(&self, round: NewRound) -> LotteryResult<(Mutation, Round)> {
        if let Some(active) = self.active_round() {
            return Err(LotteryError::ActiveRoundExists(active.round_number));
        }
        let round = self.build_round(round);
        Ok((Mutation::OpenRound(round.clone()), round))
    }

    fn plan_tickets(&self, batch: TicketBatch) -> LotteryResult<(Mutation, Vec<Ticket>)> {
        if self.is_recorded(&batch.tx_signature) {
            return Err(LotteryError::SignatureAlreadyRecorded(batch.tx_signature));
        }

        let round = self.round(batch.round_id).ok_or(LotteryError::NoActiveRound)?;
        if !round.is_active() {
            return Err(LotteryError::RoundAlreadyDrawn(round.round_number));
        }

        let taken = self.numbers.get(&batch.round_id);
        let mut seen = HashSet::with_capacity(batch.ticket_numbers.len());
        for number in &batch.ticket_numbers {
            let in_use = taken.map_or(false, |taken| taken.contains_key(number));
            if *number >= TICKET_NUMBER_SPACE || in_use || !seen.insert(*number) {
                return Err(LotteryError::TicketNumberTaken {
                    round_id: batch.round_id,
                    number: *number,
                });
            }
        }

        round
            .jackpot_amount
            .checked_add(batch.jackpot_increment)
            .ok_or(LotteryError::MathOverflow)?;

        let first_id = self.tickets.len() as u64 + 1;
        let tickets: Vec<Ticket> = batch
            .ticket_numbers
            .into_iter()
            .enumerate()
            .map(|(offset, number)| Ticket {
                id: first_id + offset as u64,
                round_id: batch.round_id,
                wallet_address: batch.wallet_address.clone(),
                ticket_number: number,
                tx_signature: batch.tx_signature.clone(),
                created_at: batch.created_at,
            })
            .collect();
        let mutation = Mutation::IssueTickets {
            round_id: batch.round_id,
            jackpot_increment: batch.jackpot_increment,
            tickets: tickets.clone(),
        };
        Ok((mutation, tickets))
    }

    fn plan_refund(&self, refund: NewRefund) -> LotteryResult<(Mutation, Refund)> {
        let already_ticketed = match refund.reason {
            RefundReason::RoundFull => self.ticket_signatures.contains(&refund.tx_signature),
            RefundReason::PartialOverflow => false,
        };
        if already_ticketed || self.refund_signatures.contains(&refund.tx_signature) {
            return Err(LotteryError::SignatureAlreadyRecorded(refund.tx_signature));
        }

        let refund = Refund {
            id: self.refunds.len() as u64 + 1,
            round_id: refund.round_id,
            wallet_address: refund.wallet_address,
            amount: refund.amount,
            tx_signature: refund.tx_signature,
            refund_tx: refund.refund_tx,
            reason: refund.reason,
        };
        Ok((Mutation::RecordRefund(refund.clone()), refund))
    }

    fn plan_close(
        &self,
        round_id: u64,
        closure: RoundClosure,
        next: &dyn Fn(&Round) -> NewRound,
    ) -> LotteryResult<(Mutation, RoundTransition)> {
        let round = self.round(round_id).ok_or(LotteryError::NoActiveRound)?;
        if !round.is_active() {
            return Err(LotteryError::RoundAlreadyDrawn(round.round_number));
        }

        let mut closed = round.clone();
        closed.status = RoundStatus::Drawn;
        closed.winner_wallet = self.winner_of(round_id, closure.winning_number);
        closed.winning_number = Some(closure.winning_number);
        closed.draw_blockhash = Some(closure.draw_blockhash);
        closed.draw_slot = Some(closure.draw_slot);

        // The closed round is the only active one, so its successor can be
        // built without another active-round check
        let opened = self.build_round(next(&closed));
        let mutation = Mutation::CloseRound {
            closed: closed.clone(),
            opened: opened.clone(),
        };
        Ok((mutation, RoundTransition { closed, opened }))
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::OpenRound(round) => self.rounds.push(round),
            Mutation::IssueTickets {
                round_id,
                jackpot_increment,
                tickets,
            } => {
                if let Some(round) = self.rounds.iter_mut().rev().find(|round| round.id == round_id) {
                    round.jackpot_amount = round.jackpot_amount.saturating_add(jackpot_increment);
                }
                let numbers = self.numbers.entry(round_id).or_default();
                for ticket in tickets {
                    numbers.insert(ticket.ticket_number, self.tickets.len());
                    self.ticket_signatures.insert(ticket.tx_signature.clone());
                    self.tickets.push(ticket);
                }
            }
            Mutation::RecordRefund(refund) => {
                self.refund_signatures.insert(refund.tx_signature.clone());
                self.refunds.push(refund);
            }
            Mutation::CloseRound { closed, opened } => {
                if let Some(round) = self.rounds.iter_mut().rev().find(|round| round.id == closed.id) {
                    *round = closed;
                }
                self.rounds.push(opened);
            }
        }
    }
}

/// Append-only log of committed mutations.
///
/// Each record is a little-endian `u32` length followed by the borsh-encoded
/// `Mutation`. The journal holds an exclusive lock on `<path>.lock` for as
/// long as it is open, so a second process cannot open the same store.
struct Journal {
    path: PathBuf,
    file: File,
    _lock: File,
}

impl Journal {
    fn open(path: &Path) -> LotteryResult<(Self, Vec<Mutation>)> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path.with_extension("lock"))?;
        lock.try_lock_exclusive().map_err(|_| {
            LotteryError::Storage(format!("{} is in use by another process", path.display()))
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (mutations, intact) = decode_records(&bytes)
            .map_err(|e| LotteryError::Storage(format!("corrupt journal {}: {}", path.display(), e)))?;
        if intact < bytes.len() {
            warn!(
                "Dropping {} bytes of a torn record at the end of {}",
                bytes.len() - intact,
                path.display()
            );
            file.set_len(intact as u64)?;
            file.sync_all()?;
        }

        let journal = Self {
            path: path.to_path_buf(),
            file,
            _lock: lock,
        };
        Ok((journal, mutations))
    }

    /// Append one record and flush it to disk. A failed append is cut back
    /// off the file.
    fn append(&self, mutation: &Mutation) -> LotteryResult<()> {
        let payload = mutation
            .try_to_vec()
            .map_err(|e| LotteryError::Storage(e.to_string()))?;
        let mut record = Vec::with_capacity(4 + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);

        let start = self.file.metadata()?.len();
        let mut file = &self.file;
        if let Err(e) = file.write_all(&record).and_then(|_| file.sync_data()) {
            if let Err(truncate) = self.file.set_len(start) {
                warn!("Could not cut torn record off {}: {}", self.path.display(), truncate);
            }
            return Err(e.into());
        }
        debug!("Journal record written to {}: {} bytes", self.path.display(), record.len());
        Ok(())
    }
}

/// Decode length-prefixed records. Returns them with the length of the
/// intact prefix; a record cut short at the end is a torn write and is left
/// out rather than reported.
fn decode_records(bytes: &[u8]) -> Result<(Vec<Mutation>, usize), String> {
    let mut mutations = Vec::new();
    let mut offset = 0;
    while bytes.len() - offset >= 4 {
        let len = u32::from_le_bytes(*array_ref![bytes, offset, 4]) as usize;
        let start = offset + 4;
        if bytes.len() - start < len {
            break;
        }
        let mutation = Mutation::try_from_slice(&bytes[start..start + len])
            .map_err(|e| format!("record at byte {}: {}", offset, e))?;
        mutations.push(mutation);
        offset = start + len;
    }
    Ok((mutations, offset))
}

/// `RoundStore` over in-memory tables, optionally backed by a journal file
pub struct Store {
    tables: Mutex<Tables>,
    claims: Mutex<HashSet<String>>,
    journal: Option<Journal>,
}

impl Store {
    /// Volatile store, nothing is written to disk
    pub fn in_memory() -> Self {
        Self::with_tables(Tables::default(), None)
    }

    /// Open (or create) a store persisted at `path`.
    ///
    /// Fails with `Storage` if another process has the store open.
    pub fn open(path: impl AsRef<Path>) -> LotteryResult<Self> {
        let path = path.as_ref();
        let (journal, mutations) = Journal::open(path)?;
        let mut tables = Tables::default();
        let records = mutations.len();
        for mutation in mutations {
            tables.apply(mutation);
        }
        info!(
            "Store opened at {}: {} records, {} rounds, {} tickets, {} refunds",
            path.display(),
            records,
            tables.rounds.len(),
            tables.tickets.len(),
            tables.refunds.len()
        );
        Ok(Self::with_tables(tables, Some(journal)))
    }

    fn with_tables(tables: Tables, journal: Option<Journal>) -> Self {
        Self {
            tables: Mutex::new(tables),
            claims: Mutex::new(HashSet::new()),
            journal,
        }
    }

    fn read(&self) -> LotteryResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| LotteryError::Storage("tables lock poisoned".to_string()))
    }

    /// Plan a mutation, make it durable, then apply it. A failed plan or a
    /// failed append leaves the tables untouched.
    fn write<T>(&self, plan: impl FnOnce(&Tables) -> LotteryResult<(Mutation, T)>) -> LotteryResult<T> {
        let mut tables = self.read()?;
        let (mutation, value) = plan(&tables)?;
        if let Some(journal) = &self.journal {
            journal.append(&mutation)?;
        }
        tables.apply(mutation);
        Ok(value)
    }

    fn claims(&self) -> LotteryResult<MutexGuard<'_, HashSet<String>>> {
        self.claims
            .lock()
            .map_err(|_| LotteryError::Storage("claims lock poisoned".to_string()))
    }
}

impl RoundStore for Store {
    fn active_round(&self) -> LotteryResult<Option<Round>> {
        Ok(self.read()?.active_round().cloned())
    }

    fn latest_round(&self) -> LotteryResult<Option<Round>> {
        Ok(self
            .read()?
            .rounds
            .iter()
            .max_by_key(|round| round.round_number)
            .cloned())
    }

    fn open_round(&self, round: NewRound) -> LotteryResult<Round> {
        self.write(|tables| tables.plan_open(round))
    }

    fn recorded_signatures(&self, signatures: &[String]) -> LotteryResult<HashSet<String>> {
        let tables = self.read()?;
        Ok(signatures
            .iter()
            .filter(|sig| tables.is_recorded(sig))
            .cloned()
            .collect())
    }

    fn used_numbers(&self, round_id: u64) -> LotteryResult<HashSet<u16>> {
        Ok(self
            .read()?
            .numbers
            .get(&round_id)
            .map(|numbers| numbers.keys().copied().collect())
            .unwrap_or_default())
    }

    fn issue_tickets(&self, batch: TicketBatch) -> LotteryResult<Vec<Ticket>> {
        self.write(|tables| tables.plan_tickets(batch))
    }

    fn record_refund(&self, refund: NewRefund) -> LotteryResult<Refund> {
        self.write(|tables| tables.plan_refund(refund))
    }

    fn tickets_for_round(&self, round_id: u64) -> LotteryResult<Vec<Ticket>> {
        let tables = self.read()?;
        let mut positions: Vec<usize> = tables
            .numbers
            .get(&round_id)
            .map(|numbers| numbers.values().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();
        Ok(positions
            .into_iter()
            .filter_map(|position| tables.tickets.get(position).cloned())
            .collect())
    }

    fn refunds(&self) -> LotteryResult<Vec<Refund>> {
        Ok(self.read()?.refunds.clone())
    }

    fn close_round(
        &self,
        round_id: u64,
        closure: RoundClosure,
        next: &dyn Fn(&Round) -> NewRound,
    ) -> LotteryResult<RoundTransition> {
        self.write(|tables| tables.plan_close(round_id, closure, next))
    }

    fn claim_signature(&self, signature: &str) -> LotteryResult<bool> {
        Ok(self.claims()?.insert(signature.to_string()))
    }

    fn release_signature(&self, signature: &str) -> LotteryResult<()> {
        self.claims()?.remove(signature);
        Ok(())
    }
}

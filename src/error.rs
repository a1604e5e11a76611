// Fortuna Lottery - Errors
use thiserror::Error;

/// Errors that may be returned by the lottery service
#[derive(Error, Debug)]
pub enum LotteryError {
    /// Draw secret did not match the configured one
    #[error("Unauthorized")]
    Unauthorized,

    /// There is no round with status `active`
    #[error("No active round")]
    NoActiveRound,

    /// Text is not valid base-58, or decodes to the wrong length
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Settlement keypair halves do not belong together
    #[error("Invalid settlement keypair: {0}")]
    InvalidKeypair(String),

    /// Remote node returned an error or an incomplete response
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Transport failure talking to the remote node (timeouts included)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No blockhash is recorded at the queried slot
    #[error("Randomness unavailable: no blockhash for slot {0}")]
    RandomnessUnavailable(u64),

    /// Round was already closed by another draw
    #[error("Round {0} has already been drawn")]
    RoundAlreadyDrawn(u64),

    /// Opening a round while another one is still active
    #[error("Round {0} is still active")]
    ActiveRoundExists(u64),

    /// Deposit signature is already recorded against a ticket or refund
    #[error("Signature already recorded: {0}")]
    SignatureAlreadyRecorded(String),

    /// Ticket number is already held in this round
    #[error("Ticket number {number} already taken in round {round_id}")]
    TicketNumberTaken { round_id: u64, number: u16 },

    /// Arithmetic overflow on an amount
    #[error("Math overflow")]
    MathOverflow,

    /// Missing or malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store could not be read or persisted
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LotteryError {
    /// HTTP status reported for this error by the mutating endpoints
    pub fn status_code(&self) -> u16 {
        match self {
            LotteryError::Unauthorized => 403,
            LotteryError::NoActiveRound => 400,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for LotteryError {
    fn from(e: std::io::Error) -> Self {
        LotteryError::Storage(e.to_string())
    }
}

pub type LotteryResult<T> = Result<T, LotteryError>;

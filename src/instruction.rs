// Fortuna Lottery - Requests
use serde::Deserialize;

/// The two state-changing operations of the service
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotteryInstruction {
    /// Scan the collection address and issue tickets for new deposits
    ///
    /// `POST /api/process-deposits`, no body
    ProcessDeposits,

    /// Close the active round and open the next one
    ///
    /// `POST /api/draw` with body `{"secret": "..."}`
    Draw {
        /// Must match the configured draw secret
        secret: String,
    },
}

#[derive(Deserialize)]
struct DrawBody {
    #[serde(default)]
    secret: String,
}

impl LotteryInstruction {
    /// Unpack a draw request body. A missing or malformed body becomes an
    /// empty secret, which the draw engine rejects as unauthorized.
    pub fn unpack_draw(body: &[u8]) -> Self {
        let secret = serde_json::from_slice::<DrawBody>(body)
            .map(|body| body.secret)
            .unwrap_or_default();
        Self::Draw { secret }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LotteryInstruction::ProcessDeposits => "Process Deposits",
            LotteryInstruction::Draw { .. } => "Draw",
        }
    }
}

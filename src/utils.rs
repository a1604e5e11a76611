// Fortuna Lottery - Utility Functions
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{LotteryError, LotteryResult};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Basis points in 100%
pub const MAX_BASIS_POINTS: u16 = 10_000;

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert SOL to lamports, rounding to the nearest lamport
pub fn sol_to_lamports(sol: f64) -> LotteryResult<u64> {
    let lamports = (sol * LAMPORTS_PER_SOL as f64).round();
    if !lamports.is_finite() || lamports < 0.0 || lamports > u64::MAX as f64 {
        return Err(LotteryError::Config(format!("{} SOL is not a valid amount", sol)));
    }
    Ok(lamports as u64)
}

/// `amount * basis_points / 10000`, rounded down
pub fn calculate_share(amount: u64, basis_points: u16) -> LotteryResult<u64> {
    let share = (amount as u128)
        .checked_mul(basis_points as u128)
        .ok_or(LotteryError::MathOverflow)?
        / MAX_BASIS_POINTS as u128;
    u64::try_from(share).map_err(|_| LotteryError::MathOverflow)
}

/// Current wall-clock time as a Unix timestamp
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

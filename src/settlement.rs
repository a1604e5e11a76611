// Fortuna Lottery - Settlement transfers (refunds and payouts)
use log::info;

use crate::{
    base58,
    error::LotteryResult,
    gateway::ChainGateway,
    signer::Signer,
    transaction::{self, TransferMessage},
    utils::lamports_to_sol,
};

/// Moves lamports out of the collection account using the settlement key
#[derive(Debug)]
pub struct Settler {
    signer: Signer,
}

impl Settler {
    pub fn new(signer: Signer) -> Self {
        Self { signer }
    }

    /// Base-58 address that pays every settlement transfer
    pub fn payer_address(&self) -> String {
        base58::encode(&self.signer.pubkey())
    }

    /// Sign a transfer of `lamports` to `recipient` against `recent_blockhash`.
    /// Pure: no I/O, the result is the full wire transaction.
    pub fn signed_transfer(
        &self,
        recipient: &str,
        recent_blockhash: &str,
        lamports: u64,
    ) -> LotteryResult<[u8; transaction::TRANSACTION_LEN]> {
        let recipient = base58::decode_array::<32>(recipient)?;
        let recent_blockhash = base58::decode_array::<32>(recent_blockhash)?;
        let message = TransferMessage::new(self.signer.pubkey(), recipient, recent_blockhash, lamports).serialize();
        let signature = self.signer.sign(&message);
        Ok(transaction::assemble(&signature, &message))
    }

    /// Build, sign and submit a transfer; returns the settlement transaction id
    pub async fn transfer(
        &self,
        gateway: &dyn ChainGateway,
        recipient: &str,
        lamports: u64,
    ) -> LotteryResult<String> {
        // Reject a bad recipient before any RPC call
        base58::decode_array::<32>(recipient)?;
        let recent_blockhash = gateway.latest_blockhash().await?;
        let transaction = self.signed_transfer(recipient, &recent_blockhash, lamports)?;
        let signature = gateway.submit_raw(&transaction).await?;
        info!(
            "Transferred {} lamports ({} SOL) to {}: {}",
            lamports,
            lamports_to_sol(lamports),
            recipient,
            signature
        );
        Ok(signature)
    }
}

// Fortuna Lottery - Native transfer transaction builder
use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};

/// System program id, all zero bytes (`11111111111111111111111111111111`)
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0; 32];

/// System program instruction tag for `Transfer`
pub const TRANSFER_OPCODE: u32 = 2;

/// Serialized message length for the single supported shape
pub const MESSAGE_LEN: usize = 150;

/// Signature count prefix + one signature + message
pub const TRANSACTION_LEN: usize = 1 + 64 + MESSAGE_LEN;

const INSTRUCTION_DATA_LEN: usize = 12;

/// A native transfer from the settlement key to one recipient.
///
/// Accounts are always `[payer, recipient, system program]`, with the payer as
/// the only signer and the program id as the only read-only account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferMessage {
    /// Fee payer and source of funds
    pub payer: [u8; 32],
    /// Destination of funds
    pub recipient: [u8; 32],
    /// Recent blockhash, bounds the lifetime of the transaction
    pub recent_blockhash: [u8; 32],
    /// Amount in lamports
    pub lamports: u64,
}

impl TransferMessage {
    pub fn new(payer: [u8; 32], recipient: [u8; 32], recent_blockhash: [u8; 32], lamports: u64) -> Self {
        Self {
            payer,
            recipient,
            recent_blockhash,
            lamports,
        }
    }

    /// Serialize into the canonical legacy message layout
    pub fn serialize(&self) -> [u8; MESSAGE_LEN] {
        let mut message = [0u8; MESSAGE_LEN];
        self.pack_into_slice(&mut message);
        message
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, MESSAGE_LEN];
        let (
            num_required_signatures_dst,
            num_readonly_signed_dst,
            num_readonly_unsigned_dst,
            num_account_keys_dst,
            payer_dst,
            recipient_dst,
            program_id_dst,
            recent_blockhash_dst,
            num_instructions_dst,
            program_index_dst,
            num_account_indices_dst,
            payer_index_dst,
            recipient_index_dst,
            data_len_dst,
            data_dst,
        ) = mut_array_refs![dst, 1, 1, 1, 1, 32, 32, 32, 32, 1, 1, 1, 1, 1, 1, INSTRUCTION_DATA_LEN];

        num_required_signatures_dst[0] = 1;
        num_readonly_signed_dst[0] = 0;
        num_readonly_unsigned_dst[0] = 1;
        num_account_keys_dst[0] = 3;
        payer_dst.copy_from_slice(&self.payer);
        recipient_dst.copy_from_slice(&self.recipient);
        program_id_dst.copy_from_slice(&SYSTEM_PROGRAM_ID);
        recent_blockhash_dst.copy_from_slice(&self.recent_blockhash);
        num_instructions_dst[0] = 1;
        program_index_dst[0] = 2;
        num_account_indices_dst[0] = 2;
        payer_index_dst[0] = 0;
        recipient_index_dst[0] = 1;
        data_len_dst[0] = INSTRUCTION_DATA_LEN as u8;
        *data_dst = transfer_instruction_data(self.lamports);
    }

    /// Read back the variable fields of a serialized message
    pub fn unpack(src: &[u8; MESSAGE_LEN]) -> Self {
        let (_header, payer, recipient, _program_id, recent_blockhash, _indices, data) =
            array_refs![src, 4, 32, 32, 32, 32, 6, INSTRUCTION_DATA_LEN];
        let lamports = u64::from_le_bytes(*array_ref![data, 4, 8]);
        Self {
            payer: *payer,
            recipient: *recipient,
            recent_blockhash: *recent_blockhash,
            lamports,
        }
    }
}

/// Little-endian `u32` opcode followed by little-endian `u64` lamports
pub fn transfer_instruction_data(lamports: u64) -> [u8; INSTRUCTION_DATA_LEN] {
    let mut data = [0u8; INSTRUCTION_DATA_LEN];
    let (opcode_dst, lamports_dst) = mut_array_refs![&mut data, 4, 8];
    *opcode_dst = TRANSFER_OPCODE.to_le_bytes();
    *lamports_dst = lamports.to_le_bytes();
    data
}

/// Prefix a signed message with its single signature
pub fn assemble(signature: &[u8; 64], message: &[u8; MESSAGE_LEN]) -> [u8; TRANSACTION_LEN] {
    let mut transaction = [0u8; TRANSACTION_LEN];
    let (count_dst, signature_dst, message_dst) = mut_array_refs![&mut transaction, 1, 64, MESSAGE_LEN];
    count_dst[0] = 1;
    signature_dst.copy_from_slice(signature);
    message_dst.copy_from_slice(message);
    transaction
}

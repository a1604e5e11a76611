use ed25519_dalek::{Signature, Verifier, VerifyingKey};

mod common;
use common::*;

use fortuna::{
    base58,
    config::Config,
    draw::winning_number,
    settlement::Settler,
    signer::Signer,
    transaction::{self, TransferMessage, MESSAGE_LEN, SYSTEM_PROGRAM_ID, TRANSACTION_LEN},
    utils::{calculate_share, sol_to_lamports},
    LotteryError,
};

fn hex(text: &str) -> Vec<u8> {
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
        .collect()
}

const RFC8032_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
const RFC8032_PUBKEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
const RFC8032_SIGNATURE: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

// Test base-58 against known encodings
#[test]
fn test_base58_known_vectors() {
    assert_eq!(base58::encode(b"Hello World!"), "2NEpo7TZRRrLZSi2U");
    assert_eq!(base58::decode("2NEpo7TZRRrLZSi2U").unwrap(), b"Hello World!");

    assert_eq!(base58::encode(&[0u8; 32]), "11111111111111111111111111111111");
    assert_eq!(base58::decode("11111111111111111111111111111111").unwrap(), vec![0u8; 32]);

    assert_eq!(base58::encode(&[0, 0, 1, 2]), "115T");
    assert_eq!(base58::decode("115T").unwrap(), vec![0, 0, 1, 2]);

    assert_eq!(base58::encode(&[7u8; 32]), COLLECTION);
    assert_eq!(base58::encode(&[9u8; 32]), WALLET);

    let ascending: Vec<u8> = (0..32).collect();
    assert_eq!(base58::encode(&ascending), RECENT_BLOCKHASH);

    assert_eq!(base58::encode(&[]), "");
    assert!(base58::decode("").unwrap().is_empty());
}

// Test that leading zero bytes survive both directions
#[test]
fn test_base58_leading_zeros() {
    for zeros in 0..4 {
        let mut bytes = vec![0u8; zeros];
        bytes.extend_from_slice(&[0xff, 0x00, 0x10]);
        let text = base58::encode(&bytes);
        assert!(text.starts_with(&"1".repeat(zeros)));
        assert_eq!(base58::decode(&text).unwrap(), bytes);
    }
}

// Test round trips of 64-byte inputs, the keypair width
#[test]
fn test_base58_round_trip_64_bytes() {
    let keypair = base58::decode(SETTLEMENT_KEYPAIR).unwrap();
    assert_eq!(keypair.len(), 64);
    assert_eq!(base58::encode(&keypair), SETTLEMENT_KEYPAIR);
    assert_eq!(&keypair[..32], &hex(RFC8032_SEED)[..]);
    assert_eq!(&keypair[32..], &hex(RFC8032_PUBKEY)[..]);

    let mut inputs = vec![(0..64).collect::<Vec<u8>>(), vec![0xff; 64], vec![0u8; 64]];
    let mut leading_zeros = vec![0u8; 3];
    leading_zeros.extend((0..61).map(|i| (i * 37 + 11) as u8));
    inputs.push(leading_zeros);

    for bytes in inputs {
        let text = base58::encode(&bytes);
        assert_eq!(base58::decode(&text).unwrap(), bytes);
        assert_eq!(base58::decode_array::<64>(&text).unwrap().to_vec(), bytes);
    }
    assert_eq!(base58::encode(&[0u8; 64]), "1".repeat(64));
}

// Test rejection of characters outside the alphabet
#[test]
fn test_base58_rejects_invalid_characters() {
    for text in ["0abc", "abcO", "Iabc", "abcl", "ab c", "abé", "ab+"] {
        match base58::decode(text) {
            Err(LotteryError::InvalidEncoding(_)) => {}
            other => panic!("{:?} decoded to {:?}", text, other),
        }
    }
}

// Test fixed-size decoding
#[test]
fn test_base58_decode_array() {
    assert_eq!(base58::decode_array::<32>(WALLET).unwrap(), [9u8; 32]);
    assert!(matches!(
        base58::decode_array::<32>("2NEpo7TZRRrLZSi2U"),
        Err(LotteryError::InvalidEncoding(_))
    ));
}

// Test the serialized transfer message layout
#[test]
fn test_transfer_message_layout() {
    let payer = [1u8; 32];
    let recipient = [9u8; 32];
    let blockhash = [5u8; 32];
    let lamports = 250_000_000u64;

    let message = TransferMessage::new(payer, recipient, blockhash, lamports).serialize();
    assert_eq!(message.len(), MESSAGE_LEN);

    // Header
    assert_eq!(&message[0..4], &[1, 0, 1, 3]);
    // Account keys
    assert_eq!(&message[4..36], &payer);
    assert_eq!(&message[36..68], &recipient);
    assert_eq!(&message[68..100], &SYSTEM_PROGRAM_ID);
    assert_eq!(&message[100..132], &blockhash);
    // One instruction: program index 2, accounts [0, 1], 12 data bytes
    assert_eq!(&message[132..138], &[1, 2, 2, 0, 1, 12]);
    assert_eq!(&message[138..142], &2u32.to_le_bytes());
    assert_eq!(&message[142..150], &lamports.to_le_bytes());

    assert_eq!(
        TransferMessage::unpack(&message),
        TransferMessage::new(payer, recipient, blockhash, lamports)
    );
}

// Test instruction data encoding
#[test]
fn test_transfer_instruction_data() {
    assert_eq!(
        transaction::transfer_instruction_data(1),
        [2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]
    );
    assert_eq!(
        transaction::transfer_instruction_data(u64::MAX),
        [2, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    );
}

// Test the wire transaction framing
#[test]
fn test_assemble_transaction() {
    let message = TransferMessage::new([1; 32], [2; 32], [3; 32], 42).serialize();
    let signature = [0xab; 64];
    let tx = transaction::assemble(&signature, &message);

    assert_eq!(tx.len(), TRANSACTION_LEN);
    assert_eq!(TRANSACTION_LEN, 215);
    assert_eq!(tx[0], 1);
    assert_eq!(&tx[1..65], &signature[..]);
    assert_eq!(&tx[65..], &message[..]);
}

// Test signing against RFC 8032 test 1
#[test]
fn test_signer_rfc8032_vector() {
    let seed: [u8; 32] = hex(RFC8032_SEED).try_into().unwrap();
    let signer = Signer::from_seed(&seed);

    assert_eq!(signer.pubkey().to_vec(), hex(RFC8032_PUBKEY));
    assert_eq!(signer.sign(b"").to_vec(), hex(RFC8032_SIGNATURE));
}

// Test parsing of the 64-byte keypair encoding
#[test]
fn test_signer_from_keypair() {
    let signer = Signer::from_base58(SETTLEMENT_KEYPAIR).unwrap();
    assert_eq!(base58::encode(&signer.pubkey()), SETTLEMENT_PUBKEY);

    let mut keypair = [0u8; 64];
    keypair[..32].copy_from_slice(&hex(RFC8032_SEED));
    keypair[32..].copy_from_slice(&hex(RFC8032_PUBKEY));
    let signer = Signer::from_keypair_bytes(&keypair).unwrap();
    assert_eq!(signer.pubkey().to_vec(), hex(RFC8032_PUBKEY));

    // Debug output never shows the seed
    let debug = format!("{:?}", signer);
    assert!(debug.contains(SETTLEMENT_PUBKEY));
    assert!(!debug.contains("9d61b19d"));
}

// Test rejection of a keypair whose halves do not match
#[test]
fn test_signer_rejects_mismatched_keypair() {
    let mut keypair = [0u8; 64];
    keypair[..32].copy_from_slice(&hex(RFC8032_SEED));
    keypair[32..].copy_from_slice(&[9u8; 32]);
    assert!(matches!(
        Signer::from_keypair_bytes(&keypair),
        Err(LotteryError::InvalidKeypair(_))
    ));

    // A 32-byte seed alone is not a keypair
    assert!(matches!(
        Signer::from_base58(WALLET),
        Err(LotteryError::InvalidKeypair(_))
    ));
}

// Test that a settlement transfer is signed by the payer over the message
#[test]
fn test_signed_transfer() {
    let settler = Settler::new(Signer::from_base58(SETTLEMENT_KEYPAIR).unwrap());
    assert_eq!(settler.payer_address(), SETTLEMENT_PUBKEY);

    let tx = settler
        .signed_transfer(WALLET, RECENT_BLOCKHASH, 300_000_000)
        .unwrap();
    assert_eq!(tx[0], 1);

    let message: [u8; MESSAGE_LEN] = tx[65..].try_into().unwrap();
    let transfer = TransferMessage::unpack(&message);
    assert_eq!(base58::encode(&transfer.payer), SETTLEMENT_PUBKEY);
    assert_eq!(transfer.recipient, [9u8; 32]);
    assert_eq!(base58::encode(&transfer.recent_blockhash), RECENT_BLOCKHASH);
    assert_eq!(transfer.lamports, 300_000_000);

    let verifying_key = VerifyingKey::from_bytes(&transfer.payer).unwrap();
    let signature = Signature::from_bytes(&tx[1..65].try_into().unwrap());
    verifying_key.verify(&message, &signature).unwrap();

    // Signing is deterministic
    assert_eq!(
        settler
            .signed_transfer(WALLET, RECENT_BLOCKHASH, 300_000_000)
            .unwrap(),
        tx
    );

    assert!(matches!(
        settler.signed_transfer("not-an-address", RECENT_BLOCKHASH, 1),
        Err(LotteryError::InvalidEncoding(_))
    ));
}

// Test the winning number derivation
#[test]
fn test_winning_number() {
    assert_eq!(winning_number("EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N", 1), 2240);
    assert_eq!(winning_number("EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N", 7), 6974);
    assert_eq!(winning_number("7PzBxnJ4PAxj1e8wVKrL5EPjfPx27Qhrn2tyQTRZ14Hx", 1), 4242);
    assert_eq!(winning_number(RECENT_BLOCKHASH, 1), 3954);
}

// Test amount conversions
#[test]
fn test_amounts() {
    assert_eq!(sol_to_lamports(0.1).unwrap(), 100_000_000);
    assert_eq!(sol_to_lamports(0.25).unwrap(), 250_000_000);
    assert_eq!(sol_to_lamports(1.0).unwrap(), 1_000_000_000);
    assert!(sol_to_lamports(-1.0).is_err());
    assert!(sol_to_lamports(f64::NAN).is_err());

    assert_eq!(calculate_share(200_000_000, 10_000).unwrap(), 200_000_000);
    assert_eq!(calculate_share(200_000_000, 9_000).unwrap(), 180_000_000);
    assert_eq!(calculate_share(3, 5_000).unwrap(), 1);
    assert_eq!(calculate_share(u64::MAX, 10_000).unwrap(), u64::MAX);
}

// Test configuration validation
#[test]
fn test_config_validation() {
    let config = test_config();
    config.validate().unwrap();
    assert!(config.settler().unwrap().is_some());

    // Secrets never show up in debug output
    let debug = format!("{:?}", config);
    assert!(!debug.contains(DRAW_SECRET));
    assert!(!debug.contains(SETTLEMENT_KEYPAIR));

    let invalid = [
        Config { collection_address: "not base58!".to_string(), ..test_config() },
        Config { draw_secret: String::new(), ..test_config() },
        Config { ticket_price: 0, ..test_config() },
        Config { jackpot_share_bps: 10_001, ..test_config() },
        Config { signature_window: 0, ..test_config() },
    ];
    for config in invalid {
        assert!(matches!(config.validate(), Err(LotteryError::Config(_))));
    }

    let mismatched = Config {
        settlement_key: Some(base58::encode(&[7u8; 64])),
        ..test_config()
    };
    assert!(matches!(mismatched.validate(), Err(LotteryError::InvalidKeypair(_))));

    let keyless = Config { settlement_key: None, ..test_config() };
    keyless.validate().unwrap();
    assert!(keyless.settler().unwrap().is_none());
}

//! Order hashing and signature verification.
//!
//! The order digest is SHA-256 over the concatenated consensus encodings of
//! the order fields, with position ids contributing as raw 32-byte buffers.
//! Signatures are 65-byte recoverable ECDSA (RSV); verification recovers
//! the public key and compares it to the supplied compressed key.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};

use super::clarity::ClarityValue;
use super::ChainError;

/// The fields that bind an order to its on-chain fill.
#[derive(Debug, Clone)]
pub struct OrderHashInput<'a> {
    pub maker: &'a str,
    pub taker: &'a str,
    pub maker_position_id: &'a [u8],
    pub taker_position_id: &'a [u8],
    pub maker_amount: u128,
    pub taker_amount: u128,
    pub salt: &'a str,
    pub expiration: u64,
}

/// Compute the 32-byte order digest.
pub fn order_hash(input: &OrderHashInput<'_>) -> Result<[u8; 32], ChainError> {
    if input.maker_position_id.len() != 32 {
        return Err(ChainError::InvalidArgument(
            "maker position id must be 32 bytes".into(),
        ));
    }
    if input.taker_position_id.len() != 32 {
        return Err(ChainError::InvalidArgument(
            "taker position id must be 32 bytes".into(),
        ));
    }
    let salt: u128 = input
        .salt
        .parse()
        .map_err(|_| ChainError::InvalidArgument(format!("salt is not numeric: {}", input.salt)))?;

    let maker = ClarityValue::principal(input.maker)?;
    let taker = ClarityValue::principal(input.taker)?;

    let mut hasher = Sha256::new();
    hasher.update(maker.serialize());
    hasher.update(taker.serialize());
    // position ids are raw buffers, not re-encoded
    hasher.update(input.maker_position_id);
    hasher.update(input.taker_position_id);
    hasher.update(ClarityValue::UInt(input.maker_amount).serialize());
    hasher.update(ClarityValue::UInt(input.taker_amount).serialize());
    hasher.update(ClarityValue::UInt(salt).serialize());
    hasher.update(ClarityValue::UInt(input.expiration as u128).serialize());
    Ok(hasher.finalize().into())
}

/// Verify a 130-hex-char RSV signature over `digest` against a compressed
/// public key. The supplied maker principal is deliberately not bound to
/// the key; callers own that decision.
pub fn verify_order_signature(
    digest: &[u8; 32],
    signature_hex: &str,
    public_key_hex: &str,
) -> Result<(), ChainError> {
    if signature_hex.len() != 130 {
        return Err(ChainError::InvalidArgument(format!(
            "signature must be 130 hex chars, got {}",
            signature_hex.len()
        )));
    }
    let signature = hex::decode(signature_hex)
        .map_err(|_| ChainError::InvalidArgument("signature is not hex".into()))?;
    let expected_key = hex::decode(public_key_hex)
        .map_err(|_| ChainError::InvalidArgument("public key is not hex".into()))?;
    let expected_key = PublicKey::from_slice(&expected_key)
        .map_err(|e| ChainError::InvalidArgument(format!("bad public key: {}", e)))?;

    // RSV layout: r(32) ‖ s(32) ‖ v(1), with v possibly offset by 27
    let mut recovery = signature[64] as i32;
    if recovery >= 27 {
        recovery -= 27;
    }
    let recovery = RecoveryId::from_i32(recovery)
        .map_err(|_| ChainError::BadSignature(format!("bad recovery id {}", signature[64])))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery)
        .map_err(|e| ChainError::BadSignature(format!("malformed signature: {}", e)))?;

    let message = Message::from_digest(*digest);
    let recovered = Secp256k1::verification_only()
        .recover_ecdsa(&message, &signature)
        .map_err(|e| ChainError::BadSignature(format!("recovery failed: {}", e)))?;

    if recovered.serialize() != expected_key.serialize() {
        return Err(ChainError::BadSignature(
            "recovered key does not match supplied public key".into(),
        ));
    }
    Ok(())
}

/// Derive an outcome token's position id:
/// `SHA-256(condition_id ‖ consensus(uint outcome_index))`.
pub fn derive_position_id(condition_id: &[u8; 32], outcome_index: u8) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(condition_id);
    hasher.update(ClarityValue::UInt(outcome_index as u128).serialize());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::clarity::c32_address_encode;
    use secp256k1::SecretKey;

    fn test_principal(tag: u8) -> String {
        c32_address_encode(22, &[tag; 20])
    }

    fn sample_input<'a>(
        maker: &'a str,
        taker: &'a str,
        maker_pos: &'a [u8; 32],
        taker_pos: &'a [u8; 32],
    ) -> OrderHashInput<'a> {
        OrderHashInput {
            maker,
            taker,
            maker_position_id: maker_pos,
            taker_position_id: taker_pos,
            maker_amount: 100,
            taker_amount: 66_000_000,
            salt: "424242",
            expiration: 1000,
        }
    }

    /// Sign a digest RSV-style with a throwaway key; returns (sig, pubkey) hex.
    fn sign_rsv(digest: &[u8; 32], secret: &SecretKey) -> (String, String) {
        let secp = Secp256k1::new();
        let signature = secp.sign_ecdsa_recoverable(&Message::from_digest(*digest), secret);
        let (recovery, compact) = signature.serialize_compact();
        let mut rsv = compact.to_vec();
        rsv.push(recovery.to_i32() as u8);
        let public_key = PublicKey::from_secret_key(&secp, secret);
        (hex::encode(rsv), hex::encode(public_key.serialize()))
    }

    #[test]
    fn test_hash_is_deterministic() {
        let maker = test_principal(1);
        let taker = test_principal(2);
        let maker_pos = [3u8; 32];
        let taker_pos = [4u8; 32];
        let input = sample_input(&maker, &taker, &maker_pos, &taker_pos);
        let first = order_hash(&input).unwrap();
        let second = order_hash(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let maker = test_principal(1);
        let taker = test_principal(2);
        let maker_pos = [3u8; 32];
        let taker_pos = [4u8; 32];
        let base = order_hash(&sample_input(&maker, &taker, &maker_pos, &taker_pos)).unwrap();

        let mut changed = sample_input(&maker, &taker, &maker_pos, &taker_pos);
        changed.maker_amount = 101;
        assert_ne!(base, order_hash(&changed).unwrap());

        let mut changed = sample_input(&maker, &taker, &maker_pos, &taker_pos);
        changed.salt = "424243";
        assert_ne!(base, order_hash(&changed).unwrap());

        let mut changed = sample_input(&maker, &taker, &maker_pos, &taker_pos);
        changed.expiration = 0;
        assert_ne!(base, order_hash(&changed).unwrap());
    }

    #[test]
    fn test_hash_rejects_bad_inputs() {
        let maker = test_principal(1);
        let taker = test_principal(2);
        let short = [3u8; 16];
        let taker_pos = [4u8; 32];
        let input = OrderHashInput {
            maker: &maker,
            taker: &taker,
            maker_position_id: &short,
            taker_position_id: &taker_pos,
            maker_amount: 1,
            taker_amount: 1,
            salt: "1",
            expiration: 0,
        };
        assert!(matches!(
            order_hash(&input),
            Err(ChainError::InvalidArgument(_))
        ));

        let maker_pos = [3u8; 32];
        let mut input = sample_input(&maker, &taker, &maker_pos, &taker_pos);
        input.salt = "not-a-number";
        assert!(matches!(
            order_hash(&input),
            Err(ChainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_signature_round_trip() {
        let maker = test_principal(1);
        let taker = test_principal(2);
        let maker_pos = [3u8; 32];
        let taker_pos = [4u8; 32];
        let digest = order_hash(&sample_input(&maker, &taker, &maker_pos, &taker_pos)).unwrap();

        let secret = SecretKey::from_slice(&[0x5a; 32]).unwrap();
        let (signature, public_key) = sign_rsv(&digest, &secret);
        assert_eq!(signature.len(), 130);
        verify_order_signature(&digest, &signature, &public_key).unwrap();
    }

    #[test]
    fn test_signature_wrong_key_rejected() {
        let digest = [0x77u8; 32];
        let secret = SecretKey::from_slice(&[0x5a; 32]).unwrap();
        let (signature, _) = sign_rsv(&digest, &secret);

        let other = SecretKey::from_slice(&[0x5b; 32]).unwrap();
        let other_key = hex::encode(
            PublicKey::from_secret_key(&Secp256k1::new(), &other).serialize(),
        );
        assert!(matches!(
            verify_order_signature(&digest, &signature, &other_key),
            Err(ChainError::BadSignature(_))
        ));
    }

    #[test]
    fn test_signature_wrong_digest_rejected() {
        let digest = [0x77u8; 32];
        let secret = SecretKey::from_slice(&[0x5a; 32]).unwrap();
        let (signature, public_key) = sign_rsv(&digest, &secret);
        let other_digest = [0x78u8; 32];
        assert!(verify_order_signature(&other_digest, &signature, &public_key).is_err());
    }

    #[test]
    fn test_signature_length_checked() {
        let digest = [0u8; 32];
        assert!(matches!(
            verify_order_signature(&digest, "abcd", "02ab"),
            Err(ChainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_position_id_derivation() {
        let condition = [9u8; 32];
        let yes = derive_position_id(&condition, 0);
        let no = derive_position_id(&condition, 1);
        assert_ne!(yes, no);
        // stable across calls
        assert_eq!(yes, derive_position_id(&condition, 0));
    }
}

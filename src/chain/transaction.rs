//! Minimal single-sig contract-call transactions.
//!
//! Implements exactly the shape the settlement bridge broadcasts: version 1
//! standard auth, P2PKH spending condition with a compressed key, deny-mode
//! post conditions, and a contract-call payload. Sponsored and multisig
//! paths are intentionally absent.

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::digest::Digest;
use sha2::{Sha256, Sha512_256};

use super::clarity::ClarityValue;
use super::ChainError;

const AUTH_TYPE_STANDARD: u8 = 0x04;
const HASH_MODE_P2PKH: u8 = 0x00;
const KEY_ENCODING_COMPRESSED: u8 = 0x00;
const ANCHOR_MODE_ANY: u8 = 0x03;
const POST_CONDITION_MODE_DENY: u8 = 0x02;
const PAYLOAD_CONTRACT_CALL: u8 = 0x02;

/// Target network for transaction version/chain-id bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn parse(value: &str) -> Result<Self, ChainError> {
        match value.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" | "mocknet" => Ok(Network::Devnet),
            other => Err(ChainError::InvalidArgument(format!(
                "unknown network: {}",
                other
            ))),
        }
    }

    fn transaction_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Devnet => 0x80,
        }
    }

    fn chain_id(&self) -> u32 {
        match self {
            Network::Mainnet => 0x0000_0001,
            Network::Testnet | Network::Devnet => 0x8000_0000,
        }
    }

    /// Single-sig address version byte for operator logging.
    pub fn address_version(&self) -> u8 {
        match self {
            Network::Mainnet => 22,
            Network::Testnet | Network::Devnet => 26,
        }
    }
}

/// A contract call ready to be signed and broadcast.
#[derive(Debug, Clone)]
pub struct ContractCall {
    /// Contract address version byte + hash160
    pub contract_address: (u8, [u8; 20]),
    pub contract_name: String,
    pub function_name: String,
    pub args: Vec<ClarityValue>,
}

impl ContractCall {
    /// Parse `SP....name` into a call against `function_name`.
    pub fn new(
        contract_id: &str,
        function_name: &str,
        args: Vec<ClarityValue>,
    ) -> Result<Self, ChainError> {
        let (address, name) = contract_id.split_once('.').ok_or_else(|| {
            ChainError::InvalidArgument(format!(
                "contract id must be address.name, got {}",
                contract_id
            ))
        })?;
        let decoded = super::clarity::c32_address_decode(address)?;
        Ok(Self {
            contract_address: decoded,
            contract_name: name.to_string(),
            function_name: function_name.to_string(),
            args,
        })
    }

    fn serialize_into(&self, out: &mut Vec<u8>) {
        out.push(PAYLOAD_CONTRACT_CALL);
        out.push(self.contract_address.0);
        out.extend_from_slice(&self.contract_address.1);
        out.push(self.contract_name.len() as u8);
        out.extend_from_slice(self.contract_name.as_bytes());
        out.push(self.function_name.len() as u8);
        out.extend_from_slice(self.function_name.as_bytes());
        out.extend_from_slice(&(self.args.len() as u32).to_be_bytes());
        for arg in &self.args {
            out.extend_from_slice(&arg.serialize());
        }
    }
}

/// A signed transaction, ready for `POST /v2/transactions`.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    pub txid: String,
}

/// Operator signing key with its derived P2PKH signer hash.
pub struct Signer {
    secret: SecretKey,
    public: PublicKey,
}

impl Signer {
    pub fn from_hex(private_key_hex: &str) -> Result<Self, ChainError> {
        // wallets commonly append a 01 compression flag to the 32-byte key
        let trimmed = match private_key_hex.len() {
            66 if private_key_hex.ends_with("01") => &private_key_hex[..64],
            _ => private_key_hex,
        };
        let bytes = hex::decode(trimmed)
            .map_err(|_| ChainError::InvalidArgument("private key is not hex".into()))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| ChainError::InvalidArgument(format!("bad private key: {}", e)))?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(Self { secret, public })
    }

    /// P2PKH signer commitment: hash160 = ripemd160(sha256(compressed key)).
    pub fn signer_hash(&self) -> [u8; 20] {
        let sha = Sha256::digest(self.public.serialize());
        let digest = ripemd::Ripemd160::digest(sha);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        hash
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }
}

/// Build and sign a contract-call transaction.
pub fn build_contract_call(
    network: Network,
    signer: &Signer,
    nonce: u64,
    fee: u64,
    call: &ContractCall,
) -> Result<SignedTransaction, ChainError> {
    // sighash over the cleared transaction (zero fee/nonce/signature)
    let cleared = serialize_transaction(network, &signer.signer_hash(), 0, 0, &[0u8; 65], call);
    let initial_sighash = sha512_256(&cleared);

    let mut presign = Vec::with_capacity(32 + 1 + 8 + 8);
    presign.extend_from_slice(&initial_sighash);
    presign.push(AUTH_TYPE_STANDARD);
    presign.extend_from_slice(&fee.to_be_bytes());
    presign.extend_from_slice(&nonce.to_be_bytes());
    let sighash = sha512_256(&presign);

    let secp = Secp256k1::new();
    let message = Message::from_digest(sighash);
    let recoverable = secp.sign_ecdsa_recoverable(&message, &signer.secret);
    let (recovery, compact) = recoverable.serialize_compact();

    // spending-condition signatures carry the recovery byte first
    let mut signature = [0u8; 65];
    signature[0] = recovery.to_i32() as u8;
    signature[1..].copy_from_slice(&compact);

    let bytes = serialize_transaction(
        network,
        &signer.signer_hash(),
        nonce,
        fee,
        &signature,
        call,
    );
    let txid = hex::encode(sha512_256(&bytes));
    Ok(SignedTransaction { bytes, txid })
}

fn serialize_transaction(
    network: Network,
    signer_hash: &[u8; 20],
    nonce: u64,
    fee: u64,
    signature: &[u8; 65],
    call: &ContractCall,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.push(network.transaction_version());
    out.extend_from_slice(&network.chain_id().to_be_bytes());
    out.push(AUTH_TYPE_STANDARD);
    // single-sig spending condition
    out.push(HASH_MODE_P2PKH);
    out.extend_from_slice(signer_hash);
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(&fee.to_be_bytes());
    out.push(KEY_ENCODING_COMPRESSED);
    out.extend_from_slice(signature);
    out.push(ANCHOR_MODE_ANY);
    // deny any transfer the call arguments do not authorize
    out.push(POST_CONDITION_MODE_DENY);
    out.extend_from_slice(&0u32.to_be_bytes());
    call.serialize_into(&mut out);
    out
}

fn sha512_256(data: &[u8]) -> [u8; 32] {
    let digest = Sha512_256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::clarity::c32_address_encode;

    fn test_call() -> ContractCall {
        let contract = format!("{}.ctf-exchange", c32_address_encode(26, &[1u8; 20]));
        ContractCall::new(
            &contract,
            "fill-order",
            vec![ClarityValue::UInt(100), ClarityValue::Buffer(vec![0xaa; 32])],
        )
        .unwrap()
    }

    fn test_signer() -> Signer {
        Signer::from_hex(&hex::encode([0x21u8; 32])).unwrap()
    }

    #[test]
    fn test_contract_call_parsing() {
        let call = test_call();
        assert_eq!(call.contract_name, "ctf-exchange");
        assert_eq!(call.function_name, "fill-order");
        assert!(ContractCall::new("no-dot-here", "f", vec![]).is_err());
    }

    #[test]
    fn test_signer_accepts_compression_suffix() {
        let bare = hex::encode([0x21u8; 32]);
        let suffixed = format!("{}01", bare);
        let a = Signer::from_hex(&bare).unwrap();
        let b = Signer::from_hex(&suffixed).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn test_build_is_deterministic() {
        let call = test_call();
        let signer = test_signer();
        let a = build_contract_call(Network::Testnet, &signer, 7, 500, &call).unwrap();
        let b = build_contract_call(Network::Testnet, &signer, 7, 500, &call).unwrap();
        assert_eq!(a.txid, b.txid);
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.txid.len(), 64);
    }

    #[test]
    fn test_nonce_changes_txid() {
        let call = test_call();
        let signer = test_signer();
        let a = build_contract_call(Network::Testnet, &signer, 7, 500, &call).unwrap();
        let b = build_contract_call(Network::Testnet, &signer, 8, 500, &call).unwrap();
        assert_ne!(a.txid, b.txid);
    }

    #[test]
    fn test_network_bytes() {
        assert_eq!(Network::Mainnet.transaction_version(), 0x00);
        assert_eq!(Network::Testnet.transaction_version(), 0x80);
        assert_eq!(Network::parse("devnet").unwrap(), Network::Devnet);
        assert!(Network::parse("regtest").is_err());
    }

    #[test]
    fn test_serialized_layout_prefix() {
        let call = test_call();
        let signer = test_signer();
        let tx = build_contract_call(Network::Mainnet, &signer, 0, 0, &call).unwrap();
        assert_eq!(tx.bytes[0], 0x00);
        assert_eq!(&tx.bytes[1..5], &1u32.to_be_bytes());
        assert_eq!(tx.bytes[5], AUTH_TYPE_STANDARD);
        assert_eq!(tx.bytes[6], HASH_MODE_P2PKH);
    }
}

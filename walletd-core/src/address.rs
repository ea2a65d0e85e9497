//! Human-readable Factom addresses.
//!
//! An address string is base58 of `prefix(2) || key(32) || checksum(4)`, the
//! checksum being the first four bytes of `SHA256d(prefix || key)`. Every
//! valid address is exactly 52 characters.
//!
//! Factoid addresses publish the RCD-1 hash of the Ed25519 public key; EC
//! addresses publish the public key itself. Secret addresses carry the
//! 32-byte Ed25519 seed.

use crate::error::CoreError;
use crate::hash::sha256d;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

/// Length of every human-readable address.
pub const ADDRESS_STRING_LEN: usize = 52;

/// Length of the key carried by an address.
pub const KEY_LEN: usize = 32;

/// RCD type byte for a single Ed25519 key.
pub const RCD_TYPE_1: u8 = 0x01;

const PAYLOAD_LEN: usize = 2 + KEY_LEN;

/// Address classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    FactoidPublic,
    FactoidSecret,
    EcPublic,
    EcSecret,
    Unrecognized,
}

impl AddressKind {
    const KNOWN: [AddressKind; 4] = [
        AddressKind::FactoidPublic,
        AddressKind::FactoidSecret,
        AddressKind::EcPublic,
        AddressKind::EcSecret,
    ];

    /// Two-byte prefix, or `None` for `Unrecognized`.
    pub fn prefix(&self) -> Option<[u8; 2]> {
        match self {
            AddressKind::FactoidPublic => Some([0x5f, 0xb1]),
            AddressKind::FactoidSecret => Some([0x64, 0x78]),
            AddressKind::EcPublic => Some([0x59, 0x2a]),
            AddressKind::EcSecret => Some([0x5d, 0xb6]),
            AddressKind::Unrecognized => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::FactoidPublic => "factoid public",
            AddressKind::FactoidSecret => "factoid secret",
            AddressKind::EcPublic => "entry credit public",
            AddressKind::EcSecret => "entry credit secret",
            AddressKind::Unrecognized => "unrecognized",
        }
    }

    fn from_prefix(prefix: [u8; 2]) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.prefix() == Some(prefix))
            .unwrap_or(AddressKind::Unrecognized)
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an address string. Never fails: anything malformed is
/// `Unrecognized`.
pub fn classify(address: &str) -> AddressKind {
    match decode_any(address) {
        Some((kind, _)) => kind,
        None => AddressKind::Unrecognized,
    }
}

/// Renders `key` as an address of the given kind.
pub fn encode_address(kind: AddressKind, key: &[u8; KEY_LEN]) -> Result<String, CoreError> {
    let prefix = kind
        .prefix()
        .ok_or_else(|| CoreError::InvalidAddress("cannot encode an unrecognized kind".into()))?;
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..2].copy_from_slice(&prefix);
    payload[2..].copy_from_slice(key);
    Ok(bs58::encode(payload).with_check().into_string())
}

/// Parses an address string, requiring it to be of kind `expected`.
pub fn decode_address(address: &str, expected: AddressKind) -> Result<[u8; KEY_LEN], CoreError> {
    let (kind, key) = decode_any(address)
        .ok_or_else(|| CoreError::InvalidAddress(address.to_string()))?;
    if kind != expected {
        return Err(CoreError::WrongAddressKind {
            expected: expected.as_str(),
            actual: kind.as_str(),
        });
    }
    Ok(key)
}

fn decode_any(address: &str) -> Option<(AddressKind, [u8; KEY_LEN])> {
    if address.len() != ADDRESS_STRING_LEN {
        return None;
    }
    // with_check verifies the SHA256d checksum and strips it.
    let payload = bs58::decode(address).with_check(None).into_vec().ok()?;
    if payload.len() != PAYLOAD_LEN {
        return None;
    }
    let kind = AddressKind::from_prefix([payload[0], payload[1]]);
    if kind == AddressKind::Unrecognized {
        return None;
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&payload[2..]);
    Some((kind, key))
}

/// RCD-1 hash of an Ed25519 public key: `SHA256d(0x01 || pubkey)`.
pub fn rcd_hash(public_key: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let mut rcd = [0u8; 1 + KEY_LEN];
    rcd[0] = RCD_TYPE_1;
    rcd[1..].copy_from_slice(public_key);
    sha256d(&rcd)
}

/// Verifies an Ed25519 signature over `message`.
pub fn verify_signature(public_key: &[u8; KEY_LEN], message: &[u8], signature: &[u8; 64]) -> bool {
    match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok(),
        Err(_) => false,
    }
}

/// An address pair backed by an Ed25519 key.
pub trait KeyedAddress: Sized {
    const PUBLIC_KIND: AddressKind;
    const SECRET_KIND: AddressKind;

    fn from_signing_key(key: SigningKey) -> Self;

    fn signing_key(&self) -> &SigningKey;

    /// Key published in the public address string.
    fn public_address_key(&self) -> [u8; KEY_LEN];

    fn from_secret_bytes(secret: &[u8; KEY_LEN]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    fn from_secret_string(secret: &str) -> Result<Self, CoreError> {
        let key = decode_address(secret, Self::SECRET_KIND)?;
        Ok(Self::from_secret_bytes(&key))
    }

    fn public_key(&self) -> [u8; KEY_LEN] {
        self.signing_key().verifying_key().to_bytes()
    }

    fn secret_bytes(&self) -> [u8; KEY_LEN] {
        self.signing_key().to_bytes()
    }

    fn public_string(&self) -> String {
        render(Self::PUBLIC_KIND, &self.public_address_key())
    }

    fn secret_string(&self) -> String {
        render(Self::SECRET_KIND, &self.secret_bytes())
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key().sign(message).to_bytes()
    }
}

fn render(kind: AddressKind, key: &[u8; KEY_LEN]) -> String {
    // Both KIND constants are known kinds, so encoding cannot fail.
    encode_address(kind, key).unwrap_or_default()
}

/// A Factoid address with its signing key.
#[derive(Clone)]
pub struct FactoidAddress {
    key: SigningKey,
}

impl FactoidAddress {
    /// The RCD-1 hash that identifies this address in transactions.
    pub fn rcd_hash(&self) -> [u8; KEY_LEN] {
        rcd_hash(&self.public_key())
    }
}

impl KeyedAddress for FactoidAddress {
    const PUBLIC_KIND: AddressKind = AddressKind::FactoidPublic;
    const SECRET_KIND: AddressKind = AddressKind::FactoidSecret;

    fn from_signing_key(key: SigningKey) -> Self {
        Self { key }
    }

    fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    fn public_address_key(&self) -> [u8; KEY_LEN] {
        self.rcd_hash()
    }
}

/// An entry credit address with its signing key.
#[derive(Clone)]
pub struct EcAddress {
    key: SigningKey,
}

impl KeyedAddress for EcAddress {
    const PUBLIC_KIND: AddressKind = AddressKind::EcPublic;
    const SECRET_KIND: AddressKind = AddressKind::EcSecret;

    fn from_signing_key(key: SigningKey) -> Self {
        Self { key }
    }

    fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    fn public_address_key(&self) -> [u8; KEY_LEN] {
        self.public_key()
    }
}

// Debug output never includes the secret.
impl fmt::Debug for FactoidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FactoidAddress")
            .field(&self.public_string())
            .finish()
    }
}

impl fmt::Debug for EcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EcAddress")
            .field(&self.public_string())
            .finish()
    }
}

impl PartialEq for FactoidAddress {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for FactoidAddress {}

impl PartialEq for EcAddress {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for EcAddress {}

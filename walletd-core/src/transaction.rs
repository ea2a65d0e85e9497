//! Factoid transactions.
//!
//! ```text
//! body:
//! +---------+-----------+-----+------+-----+--------------------+--------------------+
//! | version | timestamp | ins | outs | ecs | inputs, outputs,   |                    |
//! | varint  | 6 B BE ms | u8  | u8   | u8  | ec outputs:        |                    |
//! |         |           |     |      |     | varint amount+32 B |                    |
//! +---------+-----------+-----+------+-----+--------------------+--------------------+
//! signatures (one per input, once signed):
//! +------+-------------+---------------+
//! | 0x01 | pubkey 32 B | signature 64B |
//! +------+-------------+---------------+
//! ```
//!
//! The signed message and the transaction ID both cover the body only.

use crate::address::{rcd_hash, verify_signature, FactoidAddress, KeyedAddress, KEY_LEN, RCD_TYPE_1};
use crate::error::CoreError;
use crate::hash::sha256;
use crate::varint::{put_varint, varint_len};
use bytes::{BufMut, BytesMut};

/// Transaction format version.
pub const TRANSACTION_VERSION: u64 = 2;

/// Maximum number of entries in each of the input, output and EC output lists.
pub const MAX_ITEMS: usize = u8::MAX as usize;

/// Encoded size of one RCD-1 signature block.
pub const RCD_BLOCK_LEN: usize = 1 + KEY_LEN + 64;

/// Entry credits charged per started kilobyte of transaction.
const FEE_PER_KB: u64 = 1;
/// Entry credits charged per input.
const FEE_PER_INPUT: u64 = 10;
/// Entry credits charged per output of either kind.
const FEE_PER_OUTPUT: u64 = 1;

/// A funding input, identified by the RCD hash of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionInput {
    pub address: [u8; KEY_LEN],
    pub amount: u64,
}

/// A Factoid or entry credit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: [u8; KEY_LEN],
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rcd1Signature {
    public_key: [u8; KEY_LEN],
    signature: [u8; 64],
}

/// A Factoid transaction under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    timestamp_ms: u64,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
    ec_outputs: Vec<TransactionOutput>,
    signatures: Vec<Rcd1Signature>,
}

impl Transaction {
    /// Creates an empty transaction stamped with `timestamp_ms`.
    ///
    /// Only the low 48 bits of the timestamp are encoded.
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            inputs: Vec::new(),
            outputs: Vec::new(),
            ec_outputs: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    pub fn ec_outputs(&self) -> &[TransactionOutput] {
        &self.ec_outputs
    }

    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.signatures.len() == self.inputs.len()
    }

    /// Adds an input, or sets the amount of an existing one.
    pub fn add_input(&mut self, address: [u8; KEY_LEN], amount: u64) -> Result<(), CoreError> {
        if let Some(input) = self.inputs.iter_mut().find(|i| i.address == address) {
            input.amount = amount;
        } else {
            check_room(self.inputs.len(), "inputs")?;
            self.inputs.push(TransactionInput { address, amount });
        }
        self.signatures.clear();
        Ok(())
    }

    /// Adds a Factoid output, or sets the amount of an existing one.
    pub fn add_output(&mut self, address: [u8; KEY_LEN], amount: u64) -> Result<(), CoreError> {
        upsert_output(&mut self.outputs, address, amount, "outputs")?;
        self.signatures.clear();
        Ok(())
    }

    /// Adds an entry credit output, or sets the amount of an existing one.
    pub fn add_ec_output(&mut self, address: [u8; KEY_LEN], amount: u64) -> Result<(), CoreError> {
        upsert_output(&mut self.ec_outputs, address, amount, "ec outputs")?;
        self.signatures.clear();
        Ok(())
    }

    /// Sum of all inputs.
    pub fn total_inputs(&self) -> Result<u64, CoreError> {
        checked_sum(self.inputs.iter().map(|i| i.amount))
    }

    /// Sum of all Factoid and entry credit outputs.
    pub fn total_outputs(&self) -> Result<u64, CoreError> {
        checked_sum(
            self.outputs
                .iter()
                .chain(self.ec_outputs.iter())
                .map(|o| o.amount),
        )
    }

    /// Size of the fully signed encoding.
    pub fn signed_len(&self) -> usize {
        self.body_len() + self.inputs.len() * RCD_BLOCK_LEN
    }

    /// Fee in factoshis at `ec_rate` factoshis per entry credit.
    pub fn calculate_fee(&self, ec_rate: u64) -> Result<u64, CoreError> {
        let kilobytes = self.signed_len().div_ceil(1024) as u64;
        let outputs = (self.outputs.len() + self.ec_outputs.len()) as u64;
        let credits = kilobytes * FEE_PER_KB
            + outputs * FEE_PER_OUTPUT
            + self.inputs.len() as u64 * FEE_PER_INPUT;
        credits
            .checked_mul(ec_rate)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Raises the input at `address` by the fee, so the difference between
    /// inputs and outputs pays for the transaction.
    pub fn add_fee(&mut self, address: [u8; KEY_LEN], ec_rate: u64) -> Result<u64, CoreError> {
        self.check_balanced()?;
        let fee = self.calculate_fee(ec_rate)?;
        let input = self
            .inputs
            .iter_mut()
            .find(|i| i.address == address)
            .ok_or_else(|| CoreError::NotAnInput(hex::encode(address)))?;
        input.amount = input
            .amount
            .checked_add(fee)
            .ok_or(CoreError::AmountOverflow)?;
        self.signatures.clear();
        Ok(fee)
    }

    /// Lowers the Factoid output at `address` by the fee.
    pub fn sub_fee(&mut self, address: [u8; KEY_LEN], ec_rate: u64) -> Result<u64, CoreError> {
        self.check_balanced()?;
        let fee = self.calculate_fee(ec_rate)?;
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.address == address)
            .ok_or_else(|| CoreError::NotAnOutput(hex::encode(address)))?;
        if output.amount < fee {
            return Err(CoreError::FeeExceedsOutput {
                amount: output.amount,
                fee,
            });
        }
        output.amount -= fee;
        self.signatures.clear();
        Ok(fee)
    }

    fn check_balanced(&self) -> Result<(), CoreError> {
        let inputs = self.total_inputs()?;
        let outputs = self.total_outputs()?;
        if inputs != outputs {
            return Err(CoreError::Unbalanced { inputs, outputs });
        }
        Ok(())
    }

    fn body_len(&self) -> usize {
        let items = self
            .inputs
            .iter()
            .map(|i| i.amount)
            .chain(self.outputs.iter().map(|o| o.amount))
            .chain(self.ec_outputs.iter().map(|o| o.amount))
            .map(|amount| varint_len(amount) + KEY_LEN)
            .sum::<usize>();
        varint_len(TRANSACTION_VERSION) + 6 + 3 + items
    }

    /// Encodes the unsigned body.
    pub fn marshal_body(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.body_len());
        self.put_body(&mut buf);
        buf.to_vec()
    }

    fn put_body(&self, buf: &mut BytesMut) {
        put_varint(buf, TRANSACTION_VERSION);
        buf.put_uint(self.timestamp_ms & 0xffff_ffff_ffff, 6);

        // List lengths are capped at MAX_ITEMS on insertion.
        buf.put_u8(self.inputs.len() as u8);
        buf.put_u8(self.outputs.len() as u8);
        buf.put_u8(self.ec_outputs.len() as u8);

        for input in &self.inputs {
            put_varint(buf, input.amount);
            buf.put_slice(&input.address);
        }
        for output in self.outputs.iter().chain(self.ec_outputs.iter()) {
            put_varint(buf, output.amount);
            buf.put_slice(&output.address);
        }
    }

    /// Encodes the body followed by any signature blocks.
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.body_len() + self.signatures.len() * RCD_BLOCK_LEN);
        self.put_body(&mut buf);
        for sig in &self.signatures {
            buf.put_u8(RCD_TYPE_1);
            buf.put_slice(&sig.public_key);
            buf.put_slice(&sig.signature);
        }
        buf.to_vec()
    }

    pub fn hex(&self) -> String {
        hex::encode(self.marshal_binary())
    }

    /// Transaction ID: SHA-256 of the body.
    pub fn txid(&self) -> [u8; 32] {
        sha256(&self.marshal_body())
    }

    /// Signs every input. `keys` must hold the key for each input.
    pub fn sign(&mut self, keys: &[FactoidAddress]) -> Result<(), CoreError> {
        if self.inputs.is_empty() {
            return Err(CoreError::NoInputs);
        }
        let body = self.marshal_body();
        let mut signatures = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            let key = keys
                .iter()
                .find(|k| k.rcd_hash() == input.address)
                .ok_or(CoreError::SignerMismatch { index })?;
            signatures.push(Rcd1Signature {
                public_key: key.public_key(),
                signature: key.sign(&body),
            });
        }
        self.signatures = signatures;
        Ok(())
    }

    /// Checks that every input carries a valid signature from its owner.
    pub fn verify(&self) -> Result<(), CoreError> {
        if self.inputs.is_empty() {
            return Err(CoreError::NoInputs);
        }
        if !self.is_signed() {
            return Err(CoreError::NotSigned);
        }
        let body = self.marshal_body();
        for (index, (input, sig)) in self.inputs.iter().zip(&self.signatures).enumerate() {
            if rcd_hash(&sig.public_key) != input.address {
                return Err(CoreError::SignerMismatch { index });
            }
            if !verify_signature(&sig.public_key, &body, &sig.signature) {
                return Err(CoreError::BadSignature { index });
            }
        }
        Ok(())
    }

    /// Checks that the transaction is ready to submit: validly signed, with
    /// inputs covering outputs.
    pub fn validate_for_compose(&self) -> Result<(), CoreError> {
        self.verify()?;
        let inputs = self.total_inputs()?;
        let outputs = self.total_outputs()?;
        if inputs < outputs {
            return Err(CoreError::InsufficientInputs { inputs, outputs });
        }
        Ok(())
    }
}

fn check_room(len: usize, kind: &'static str) -> Result<(), CoreError> {
    if len >= MAX_ITEMS {
        return Err(CoreError::TooManyTransactionItems {
            kind,
            max: MAX_ITEMS,
        });
    }
    Ok(())
}

fn upsert_output(
    list: &mut Vec<TransactionOutput>,
    address: [u8; KEY_LEN],
    amount: u64,
    kind: &'static str,
) -> Result<(), CoreError> {
    if let Some(output) = list.iter_mut().find(|o| o.address == address) {
        output.amount = amount;
        return Ok(());
    }
    check_room(list.len(), kind)?;
    list.push(TransactionOutput { address, amount });
    Ok(())
}

fn checked_sum(mut amounts: impl Iterator<Item = u64>) -> Result<u64, CoreError> {
    amounts.try_fold(0u64, |acc, a| acc.checked_add(a).ok_or(CoreError::AmountOverflow))
}

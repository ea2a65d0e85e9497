//! Chains: content-derived identifiers plus their first entry.
//!
//! The chain ID is `SHA256(SHA256(name[0]) || SHA256(name[1]) || ...)`, so it
//! is sensitive to the order of the name segments.
//!
//! Binary layout (the first entry is not part of it):
//!
//! ```text
//! +-------------+-------------+---------------------------------------+
//! | chain_id    | name_count  | name segments                         |
//! | 32 bytes    | u64 BE      | (u64 BE len + bytes) * name_count     |
//! +-------------+-------------+---------------------------------------+
//! ```

use crate::entry::Entry;
use crate::error::CoreError;
use crate::hash::{sha256, sha256d, sha512};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Length of a derived chain ID.
pub const CHAIN_ID_LEN: usize = 32;

/// Derives the chain ID for a name.
pub fn derive_chain_id(name: &[Vec<u8>]) -> [u8; CHAIN_ID_LEN] {
    let mut digests = Vec::with_capacity(name.len() * CHAIN_ID_LEN);
    for segment in name {
        digests.extend_from_slice(&sha256(segment));
    }
    sha256(&digests)
}

/// The three hashes that authorize creation of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitHashes {
    /// `SHA256d(chain_id)`.
    pub chain_id_hash: [u8; 32],
    /// Entry hash of the first entry: `SHA256(SHA512(E) || E)`.
    pub entry_hash: [u8; 32],
    /// `SHA256d(entry_hash || chain_id)`, binding the entry to the chain.
    pub weld: [u8; 32],
}

impl CommitHashes {
    pub fn chain_id_hash_hex(&self) -> String {
        hex::encode(self.chain_id_hash)
    }

    pub fn entry_hash_hex(&self) -> String {
        hex::encode(self.entry_hash)
    }

    pub fn weld_hex(&self) -> String {
        hex::encode(self.weld)
    }
}

/// A named chain and the entry that opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChain")]
pub struct Chain {
    chain_id: [u8; CHAIN_ID_LEN],
    name: Vec<Vec<u8>>,
    first_entry: Entry,
}

/// Unchecked wire shape; deserialized chains must pass [`Chain::verify`].
#[derive(Deserialize)]
struct RawChain {
    chain_id: [u8; CHAIN_ID_LEN],
    name: Vec<Vec<u8>>,
    first_entry: Entry,
}

impl TryFrom<RawChain> for Chain {
    type Error = CoreError;

    fn try_from(raw: RawChain) -> Result<Self, Self::Error> {
        let chain = Chain::from_parts(raw.chain_id, raw.name, raw.first_entry);
        chain.verify()?;
        Ok(chain)
    }
}

impl Chain {
    /// Builds a chain, deriving its ID and pointing the first entry at it.
    pub fn new(name: Vec<Vec<u8>>, mut first_entry: Entry) -> Result<Self, CoreError> {
        let chain_id = derive_chain_id(&name);
        first_entry.set_chain_id(chain_id.to_vec())?;
        Ok(Self {
            chain_id,
            name,
            first_entry,
        })
    }

    /// Rebuilds a chain from stored parts. The stored ID is kept as given;
    /// call [`Chain::verify`] to check it.
    pub fn from_parts(chain_id: [u8; CHAIN_ID_LEN], name: Vec<Vec<u8>>, first_entry: Entry) -> Self {
        Self {
            chain_id,
            name,
            first_entry,
        }
    }

    pub fn chain_id(&self) -> &[u8; CHAIN_ID_LEN] {
        &self.chain_id
    }

    pub fn name(&self) -> &[Vec<u8>] {
        &self.name
    }

    pub fn first_entry(&self) -> &Entry {
        &self.first_entry
    }

    /// Re-derives the chain ID from the name, stores it, and returns it as hex.
    /// The first entry is pointed at the new ID.
    pub fn generate_id(&mut self) -> String {
        self.chain_id = derive_chain_id(&self.name);
        self.first_entry.point_at(self.chain_id);
        hex::encode(self.chain_id)
    }

    /// Checks that the stored chain ID matches the name and that the first
    /// entry belongs to this chain.
    pub fn verify(&self) -> Result<(), CoreError> {
        let derived = derive_chain_id(&self.name);
        if derived != self.chain_id {
            return Err(CoreError::ChainIdMismatch {
                stored: hex::encode(self.chain_id),
                derived: hex::encode(derived),
            });
        }
        if self.first_entry.chain_id() != &self.chain_id[..] {
            return Err(CoreError::FirstEntryChainMismatch {
                chain_id: hex::encode(self.chain_id),
                entry_chain_id: hex::encode(self.first_entry.chain_id()),
            });
        }
        Ok(())
    }

    /// Encodes the chain ID and name.
    pub fn marshal_binary(&self) -> Vec<u8> {
        let len = CHAIN_ID_LEN + 8 + self.name.iter().map(|s| 8 + s.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(len);

        buf.put_slice(&self.chain_id);
        buf.put_u64(self.name.len() as u64);
        for segment in &self.name {
            buf.put_u64(segment.len() as u64);
            buf.put_slice(segment);
        }

        buf.to_vec()
    }

    pub fn hex(&self) -> String {
        hex::encode(self.marshal_binary())
    }

    /// Computes the commit hashes for creating this chain.
    pub fn hash(&self) -> CommitHashes {
        let encoded = self.first_entry.marshal_binary();

        let mut preimage = Vec::with_capacity(64 + encoded.len());
        preimage.extend_from_slice(&sha512(&encoded));
        preimage.extend_from_slice(&encoded);
        let entry_hash = sha256(&preimage);

        let mut weld_input = [0u8; 32 + CHAIN_ID_LEN];
        weld_input[..32].copy_from_slice(&entry_hash);
        weld_input[32..].copy_from_slice(&self.chain_id);

        CommitHashes {
            chain_id_hash: sha256d(&self.chain_id),
            entry_hash,
            weld: sha256d(&weld_input),
        }
    }
}

/// Anything that can produce a chain for submission.
pub trait ChainSource {
    fn to_chain(&self) -> Chain;
}

impl ChainSource for Chain {
    fn to_chain(&self) -> Chain {
        self.clone()
    }
}

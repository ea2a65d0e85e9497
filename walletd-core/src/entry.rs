//! Factom entries and their canonical binary encoding.
//!
//! ```text
//! +-----------+------------------+-----------+----------------------------+------+
//! | id_len    | chain_id         | ext_count | ext_ids                    | data |
//! | 1 byte    | id_len bytes     | 1 byte    | (u32 BE len + bytes) * n   | rest |
//! +-----------+------------------+-----------+----------------------------+------+
//! ```
//!
//! The data payload carries no length prefix and runs to the end of the
//! buffer. Independent nodes must reproduce these bytes exactly, since the
//! entry hash is taken over them.

use crate::error::CoreError;
use crate::hash::sha256;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Maximum chain ID length representable in the one-byte length field.
pub const MAX_CHAIN_ID_LEN: usize = u8::MAX as usize;

/// Maximum number of external IDs representable in the one-byte count field.
pub const MAX_EXT_IDS: usize = u8::MAX as usize;

/// Maximum external ID length representable in the four-byte length field.
pub const MAX_EXT_ID_LEN: usize = u32::MAX as usize;

/// A data record anchored to a chain.
///
/// Construction validates the field limits of the wire format, so every
/// `Entry` value is encodable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct Entry {
    chain_id: Vec<u8>,
    ext_ids: Vec<Vec<u8>>,
    data: Vec<u8>,
}

/// Unchecked wire shape; deserialized entries go through `Entry::new`.
#[derive(Deserialize)]
struct RawEntry {
    chain_id: Vec<u8>,
    ext_ids: Vec<Vec<u8>>,
    data: Vec<u8>,
}

impl TryFrom<RawEntry> for Entry {
    type Error = CoreError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        Entry::new(raw.chain_id, raw.ext_ids, raw.data)
    }
}

impl Entry {
    /// Creates an entry, rejecting fields that do not fit the encoding.
    pub fn new(
        chain_id: impl Into<Vec<u8>>,
        ext_ids: Vec<Vec<u8>>,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self, CoreError> {
        let chain_id = chain_id.into();
        check_chain_id(&chain_id)?;
        check_ext_ids(&ext_ids)?;
        Ok(Self {
            chain_id,
            ext_ids,
            data: data.into(),
        })
    }

    pub fn chain_id(&self) -> &[u8] {
        &self.chain_id
    }

    pub fn ext_ids(&self) -> &[Vec<u8>] {
        &self.ext_ids
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Points the entry at a different chain.
    pub fn set_chain_id(&mut self, chain_id: impl Into<Vec<u8>>) -> Result<(), CoreError> {
        let chain_id = chain_id.into();
        check_chain_id(&chain_id)?;
        self.chain_id = chain_id;
        Ok(())
    }

    /// Points the entry at a derived chain ID, which always fits.
    pub(crate) fn point_at(&mut self, chain_id: [u8; 32]) {
        self.chain_id = chain_id.to_vec();
    }

    /// Returns the size of the encoded entry in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + self.chain_id.len()
            + 1
            + self.ext_ids.iter().map(|e| 4 + e.len()).sum::<usize>()
            + self.data.len()
    }

    /// Encodes the entry into its canonical byte form.
    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        // Limits are enforced on construction, so these casts are lossless.
        buf.put_u8(self.chain_id.len() as u8);
        buf.put_slice(&self.chain_id);

        buf.put_u8(self.ext_ids.len() as u8);
        for ext_id in &self.ext_ids {
            buf.put_u32(ext_id.len() as u32);
            buf.put_slice(ext_id);
        }

        buf.put_slice(&self.data);

        buf.to_vec()
    }

    /// Decodes an entry from its canonical byte form.
    pub fn unmarshal_binary(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut buf = bytes;

        let id_len = take_u8(&mut buf, bytes.len())? as usize;
        let chain_id = take_slice(&mut buf, bytes.len(), id_len)?.to_vec();

        let count = take_u8(&mut buf, bytes.len())? as usize;
        let mut ext_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = bytes.len() - buf.remaining();
            if buf.remaining() < 4 {
                return Err(CoreError::Truncated {
                    offset,
                    needed: 4 - buf.remaining(),
                });
            }
            let len = buf.get_u32() as usize;
            ext_ids.push(take_slice(&mut buf, bytes.len(), len)?.to_vec());
        }

        Ok(Self {
            chain_id,
            ext_ids,
            data: buf.to_vec(),
        })
    }

    /// Returns the lowercase hex SHA-256 of the encoded entry.
    pub fn hash(&self) -> String {
        hex::encode(sha256(&self.marshal_binary()))
    }

    /// Returns the lowercase hex encoding of the encoded entry itself.
    pub fn hex(&self) -> String {
        hex::encode(self.marshal_binary())
    }
}

/// Anything that can produce an entry for submission.
pub trait EntrySource {
    fn to_entry(&self) -> Entry;
}

impl EntrySource for Entry {
    fn to_entry(&self) -> Entry {
        self.clone()
    }
}

fn check_chain_id(chain_id: &[u8]) -> Result<(), CoreError> {
    if chain_id.len() > MAX_CHAIN_ID_LEN {
        return Err(CoreError::ChainIdTooLong {
            len: chain_id.len(),
            max: MAX_CHAIN_ID_LEN,
        });
    }
    Ok(())
}

fn check_ext_ids(ext_ids: &[Vec<u8>]) -> Result<(), CoreError> {
    if ext_ids.len() > MAX_EXT_IDS {
        return Err(CoreError::TooManyExtIds {
            count: ext_ids.len(),
            max: MAX_EXT_IDS,
        });
    }
    if let Some((index, ext_id)) = ext_ids
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() > MAX_EXT_ID_LEN)
    {
        return Err(CoreError::ExtIdTooLong {
            index,
            len: ext_id.len(),
        });
    }
    Ok(())
}

fn take_u8(buf: &mut &[u8], total: usize) -> Result<u8, CoreError> {
    if !buf.has_remaining() {
        return Err(CoreError::Truncated {
            offset: total,
            needed: 1,
        });
    }
    Ok(buf.get_u8())
}

fn take_slice<'a>(buf: &mut &'a [u8], total: usize, len: usize) -> Result<&'a [u8], CoreError> {
    if buf.len() < len {
        return Err(CoreError::Truncated {
            offset: total - buf.len(),
            needed: len - buf.len(),
        });
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_entry() -> Entry {
        Entry::new(vec![0x01, 0x02], vec![vec![0x41, 0x42]], vec![0x43]).unwrap()
    }

    #[test]
    fn test_marshal_layout() {
        let entry = sample_entry();
        assert_eq!(
            entry.marshal_binary(),
            vec![0x02, 0x01, 0x02, 0x01, 0x00, 0x00, 0x00, 0x02, 0x41, 0x42, 0x43]
        );
        assert_eq!(entry.hex(), "0201020100000002414243");
        assert_eq!(entry.encoded_len(), 11);
    }

    #[test]
    fn test_hash_is_sha256_of_encoding() {
        let entry = sample_entry();
        assert_eq!(
            entry.hash(),
            "ad9e2fb1f94582de629f498a055086c31f0621fcb87300d894cae88d86ea6ce3"
        );
        // Stable across calls.
        assert_eq!(entry.hash(), sample_entry().hash());
    }

    #[test]
    fn test_empty_entry() {
        let entry = Entry::new(Vec::new(), Vec::new(), Vec::new()).unwrap();
        assert_eq!(entry.marshal_binary(), vec![0x00, 0x00]);
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let err = Entry::new(vec![0u8; 256], Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::ChainIdTooLong { len: 256, .. }));

        let err = Entry::new(vec![1u8; 32], vec![Vec::new(); 256], Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::TooManyExtIds { count: 256, .. }));

        // Exactly at the limits is fine.
        let entry = Entry::new(vec![0u8; 255], vec![Vec::new(); 255], Vec::new()).unwrap();
        assert_eq!(entry.marshal_binary()[0], 0xff);

        let mut entry = sample_entry();
        assert!(entry.set_chain_id(vec![0u8; 300]).is_err());
        assert_eq!(entry.chain_id(), &[0x01, 0x02]);
    }

    #[test]
    fn test_unmarshal_truncated() {
        assert!(matches!(
            Entry::unmarshal_binary(&[]),
            Err(CoreError::Truncated { .. })
        ));
        assert!(matches!(
            Entry::unmarshal_binary(&[0x05, 0x01]),
            Err(CoreError::Truncated { needed: 4, .. })
        ));
        assert!(matches!(
            Entry::unmarshal_binary(&[0x00, 0x01, 0x00, 0x00]),
            Err(CoreError::Truncated { .. })
        ));
        assert!(matches!(
            Entry::unmarshal_binary(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x41]),
            Err(CoreError::Truncated { needed: 2, .. })
        ));
    }

    #[test]
    fn test_deserialize_checks_limits() {
        let entry: Entry = serde_json::from_value(json!({
            "chain_id": [1, 2],
            "ext_ids": [[0x41, 0x42]],
            "data": [0x43],
        }))
        .unwrap();
        assert_eq!(entry, sample_entry());

        let err = serde_json::from_value::<Entry>(json!({
            "chain_id": vec![7u8; 300],
            "ext_ids": [],
            "data": [],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("chain ID too long"));

        let too_many: Vec<Vec<u8>> = vec![Vec::new(); 256];
        assert!(serde_json::from_value::<Entry>(json!({
            "chain_id": [],
            "ext_ids": too_many,
            "data": [],
        }))
        .is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let entry = sample_entry();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(serde_json::from_value::<Entry>(value).unwrap(), entry);
    }

    #[test]
    fn test_entry_source() {
        let entry = sample_entry();
        assert_eq!(entry.to_entry(), entry);
    }

    proptest! {
        #[test]
        fn prop_marshal_roundtrip(
            chain_id in proptest::collection::vec(any::<u8>(), 0..=255),
            ext_ids in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..64),
                0..=16,
            ),
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let entry = Entry::new(chain_id, ext_ids, data).unwrap();
            let bytes = entry.marshal_binary();
            prop_assert_eq!(bytes.len(), entry.encoded_len());
            let decoded = Entry::unmarshal_binary(&bytes).unwrap();
            prop_assert_eq!(decoded, entry);
        }
    }
}

//! JSON wallet file.

use crate::error::WalletError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current on-disk format version.
pub const WALLET_FILE_VERSION: u32 = 1;

/// On-disk wallet contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFile {
    pub version: u32,
    /// Hex-encoded seed.
    pub seed: String,
    pub next_factoid_index: u32,
    pub next_ec_index: u32,
    /// Factoid secret address strings, in insertion order.
    pub factoid_secrets: Vec<String>,
    /// EC secret address strings, in insertion order.
    pub ec_secrets: Vec<String>,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

/// Reads and atomically replaces the wallet file.
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the wallet file, or `None` if it does not exist yet.
    pub fn load(&self) -> Result<Option<WalletFile>, WalletError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let contents: WalletFile = serde_json::from_reader(reader)?;

        if contents.version != WALLET_FILE_VERSION {
            return Err(WalletError::Corruption(format!(
                "unsupported wallet file version {}",
                contents.version
            )));
        }

        Ok(Some(contents))
    }

    /// Writes to a sibling temp file, syncs it, then renames it over the
    /// wallet file so readers never see a partial write.
    pub fn save(&self, contents: &WalletFile) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, contents)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!("Saved wallet file {}", self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

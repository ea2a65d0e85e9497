//! The wallet: address book, key generation and transaction drafts.
//!
//! Locking:
//! - The address book sits behind one `RwLock`. Generation and import take
//!   the write lock and persist before releasing it, so two concurrent
//!   changes can never interleave their file writes.
//! - Each draft has its own `Mutex`. Draft operations clone the `Arc` out of
//!   the table and lock only that draft. When a draft operation also needs
//!   the address book, the draft is locked first.

use crate::error::WalletError;
use crate::store::{WalletFile, WalletStore, WALLET_FILE_VERSION};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use walletd_core::address::{decode_address, KEY_LEN};
use walletd_core::{AddressKind, EcAddress, FactoidAddress, KeyedAddress, Transaction};

/// Length of the wallet seed.
pub const SEED_LEN: usize = 64;

const FACTOID_TAG: &[u8] = b"factoid";
const EC_TAG: &[u8] = b"ec";

/// An address held by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletAddress {
    Factoid(FactoidAddress),
    Ec(EcAddress),
}

impl WalletAddress {
    pub fn public_string(&self) -> String {
        match self {
            WalletAddress::Factoid(a) => a.public_string(),
            WalletAddress::Ec(a) => a.public_string(),
        }
    }

    pub fn secret_string(&self) -> String {
        match self {
            WalletAddress::Factoid(a) => a.secret_string(),
            WalletAddress::Ec(a) => a.secret_string(),
        }
    }
}

#[derive(Clone)]
struct AddressBook {
    seed: [u8; SEED_LEN],
    next_factoid_index: u32,
    next_ec_index: u32,
    factoids: Vec<FactoidAddress>,
    ecs: Vec<EcAddress>,
}

impl AddressBook {
    fn new(seed: [u8; SEED_LEN]) -> Self {
        Self {
            seed,
            next_factoid_index: 0,
            next_ec_index: 0,
            factoids: Vec::new(),
            ecs: Vec::new(),
        }
    }

    fn from_file(file: WalletFile) -> Result<Self, WalletError> {
        let bytes = hex::decode(&file.seed)
            .map_err(|e| WalletError::Corruption(format!("seed is not hex: {}", e)))?;
        let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            WalletError::Corruption(format!("seed is {} bytes, expected {}", b.len(), SEED_LEN))
        })?;

        let factoids = file
            .factoid_secrets
            .iter()
            .map(|s| FactoidAddress::from_secret_string(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WalletError::Corruption(e.to_string()))?;
        let ecs = file
            .ec_secrets
            .iter()
            .map(|s| EcAddress::from_secret_string(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WalletError::Corruption(e.to_string()))?;

        Ok(Self {
            seed,
            next_factoid_index: file.next_factoid_index,
            next_ec_index: file.next_ec_index,
            factoids,
            ecs,
        })
    }

    fn to_file(&self) -> WalletFile {
        WalletFile {
            version: WALLET_FILE_VERSION,
            seed: hex::encode(self.seed),
            next_factoid_index: self.next_factoid_index,
            next_ec_index: self.next_ec_index,
            factoid_secrets: self.factoids.iter().map(|a| a.secret_string()).collect(),
            ec_secrets: self.ecs.iter().map(|a| a.secret_string()).collect(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    fn derive_secret(&self, tag: &[u8], index: u32) -> [u8; KEY_LEN] {
        let digest = Sha256::new()
            .chain_update(self.seed)
            .chain_update(tag)
            .chain_update(index.to_be_bytes())
            .finalize();
        let mut secret = [0u8; KEY_LEN];
        secret.copy_from_slice(&digest);
        secret
    }

    fn insert(&mut self, address: WalletAddress) -> bool {
        match address {
            WalletAddress::Factoid(a) => {
                if self.factoids.contains(&a) {
                    return false;
                }
                self.factoids.push(a);
            }
            WalletAddress::Ec(a) => {
                if self.ecs.contains(&a) {
                    return false;
                }
                self.ecs.push(a);
            }
        }
        true
    }
}

/// Wallet state shared by all requests.
pub struct Wallet {
    book: RwLock<AddressBook>,
    drafts: DashMap<String, Arc<Mutex<Transaction>>>,
    store: Option<WalletStore>,
}

impl Wallet {
    /// Opens the wallet file at `path`, creating a new wallet if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let store = WalletStore::new(path);

        let book = match store.load()? {
            Some(file) => {
                let book = AddressBook::from_file(file)?;
                tracing::info!(
                    "Opened wallet {} ({} factoid, {} EC addresses)",
                    store.path().display(),
                    book.factoids.len(),
                    book.ecs.len()
                );
                book
            }
            None => {
                let book = AddressBook::new(random_seed());
                store.save(&book.to_file())?;
                tracing::info!("Created new wallet {}", store.path().display());
                book
            }
        };

        Ok(Self {
            book: RwLock::new(book),
            drafts: DashMap::new(),
            store: Some(store),
        })
    }

    /// Creates a wallet with a random seed that is never written to disk.
    pub fn in_memory() -> Self {
        Self::from_seed(random_seed())
    }

    /// Creates an in-memory wallet from a known seed.
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self {
            book: RwLock::new(AddressBook::new(seed)),
            drafts: DashMap::new(),
            store: None,
        }
    }

    /// Hex encoding of the wallet seed.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.book.read().seed)
    }

    pub fn address_count(&self) -> usize {
        let book = self.book.read();
        book.factoids.len() + book.ecs.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.drafts.len()
    }

    /// Looks up a Factoid address by its public string.
    pub fn get_fct_address(&self, public: &str) -> Result<FactoidAddress, WalletError> {
        let rcd = decode_address(public, AddressKind::FactoidPublic)?;
        self.find_factoid(&rcd)
            .ok_or_else(|| WalletError::AddressNotFound(public.to_string()))
    }

    /// Looks up an EC address by its public string.
    pub fn get_ec_address(&self, public: &str) -> Result<EcAddress, WalletError> {
        let key = decode_address(public, AddressKind::EcPublic)?;
        self.book
            .read()
            .ecs
            .iter()
            .find(|a| a.public_key() == key)
            .cloned()
            .ok_or_else(|| WalletError::AddressNotFound(public.to_string()))
    }

    fn find_factoid(&self, rcd: &[u8; KEY_LEN]) -> Option<FactoidAddress> {
        self.book
            .read()
            .factoids
            .iter()
            .find(|a| &a.rcd_hash() == rcd)
            .cloned()
    }

    /// Every address, Factoid first then EC, each in insertion order.
    pub fn all_addresses(&self) -> Vec<WalletAddress> {
        let book = self.book.read();
        book.factoids
            .iter()
            .cloned()
            .map(WalletAddress::Factoid)
            .chain(book.ecs.iter().cloned().map(WalletAddress::Ec))
            .collect()
    }

    /// Derives the next Factoid address from the seed.
    pub fn generate_factoid_address(&self) -> Result<FactoidAddress, WalletError> {
        let address = self.update_book(|book| {
            let secret = book.derive_secret(FACTOID_TAG, book.next_factoid_index);
            book.next_factoid_index += 1;
            let address = FactoidAddress::from_secret_bytes(&secret);
            book.insert(WalletAddress::Factoid(address.clone()));
            address
        })?;
        tracing::info!("Generated factoid address {}", address.public_string());
        Ok(address)
    }

    /// Derives the next EC address from the seed.
    pub fn generate_ec_address(&self) -> Result<EcAddress, WalletError> {
        let address = self.update_book(|book| {
            let secret = book.derive_secret(EC_TAG, book.next_ec_index);
            book.next_ec_index += 1;
            let address = EcAddress::from_secret_bytes(&secret);
            book.insert(WalletAddress::Ec(address.clone()));
            address
        })?;
        tracing::info!("Generated EC address {}", address.public_string());
        Ok(address)
    }

    /// Adds addresses to the wallet. Already held addresses are skipped.
    /// Either all are stored or, if persisting fails, none.
    pub fn import(&self, addresses: Vec<WalletAddress>) -> Result<usize, WalletError> {
        let added = self.update_book(|book| {
            addresses
                .into_iter()
                .filter(|a| book.insert(a.clone()))
                .count()
        })?;
        tracing::info!("Imported {} addresses", added);
        Ok(added)
    }

    /// Applies `f` to a copy of the address book, persists the copy and only
    /// then publishes it.
    fn update_book<T>(&self, f: impl FnOnce(&mut AddressBook) -> T) -> Result<T, WalletError> {
        let mut book = self.book.write();
        let mut next = book.clone();
        let out = f(&mut next);
        if let Some(store) = &self.store {
            store.save(&next.to_file())?;
        }
        *book = next;
        Ok(out)
    }

    /// Writes the address book to disk, if the wallet is file-backed.
    pub fn flush(&self) -> Result<(), WalletError> {
        if let Some(store) = &self.store {
            let book = self.book.write();
            store.save(&book.to_file())?;
        }
        Ok(())
    }

    /// Flushes and drops all drafts.
    pub fn close(&self) -> Result<(), WalletError> {
        self.flush()?;
        let drafts = self.drafts.len();
        self.drafts.clear();
        tracing::info!("Wallet closed ({} drafts discarded)", drafts);
        Ok(())
    }

    // Transaction drafts

    /// Starts an empty draft under `name`.
    pub fn new_transaction(&self, name: &str) -> Result<(), WalletError> {
        match self.drafts.entry(name.to_string()) {
            MapEntry::Occupied(_) => Err(WalletError::TransactionExists(name.to_string())),
            MapEntry::Vacant(slot) => {
                let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
                slot.insert(Arc::new(Mutex::new(Transaction::new(now))));
                Ok(())
            }
        }
    }

    pub fn delete_transaction(&self, name: &str) -> Result<(), WalletError> {
        self.drafts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| WalletError::TransactionNotFound(name.to_string()))
    }

    fn draft(&self, name: &str) -> Result<Arc<Mutex<Transaction>>, WalletError> {
        self.drafts
            .get(name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| WalletError::TransactionNotFound(name.to_string()))
    }

    /// Returns a copy of the named draft.
    pub fn get_transaction(&self, name: &str) -> Result<Transaction, WalletError> {
        Ok(self.draft(name)?.lock().clone())
    }

    /// Funds the draft from a Factoid address held by this wallet.
    pub fn add_input(&self, name: &str, address: &str, amount: u64) -> Result<(), WalletError> {
        let draft = self.draft(name)?;
        let mut tx = draft.lock();
        let rcd = decode_address(address, AddressKind::FactoidPublic)?;
        if self.find_factoid(&rcd).is_none() {
            return Err(WalletError::AddressNotFound(address.to_string()));
        }
        tx.add_input(rcd, amount)?;
        Ok(())
    }

    pub fn add_output(&self, name: &str, address: &str, amount: u64) -> Result<(), WalletError> {
        let draft = self.draft(name)?;
        let rcd = decode_address(address, AddressKind::FactoidPublic)?;
        draft.lock().add_output(rcd, amount)?;
        Ok(())
    }

    pub fn add_ec_output(&self, name: &str, address: &str, amount: u64) -> Result<(), WalletError> {
        let draft = self.draft(name)?;
        let key = decode_address(address, AddressKind::EcPublic)?;
        draft.lock().add_ec_output(key, amount)?;
        Ok(())
    }

    /// Raises the named input to cover the fee. Returns the fee.
    pub fn add_fee(&self, name: &str, address: &str, ec_rate: u64) -> Result<u64, WalletError> {
        let draft = self.draft(name)?;
        let rcd = decode_address(address, AddressKind::FactoidPublic)?;
        let fee = draft.lock().add_fee(rcd, ec_rate)?;
        Ok(fee)
    }

    /// Lowers the named output to cover the fee. Returns the fee.
    pub fn sub_fee(&self, name: &str, address: &str, ec_rate: u64) -> Result<u64, WalletError> {
        let draft = self.draft(name)?;
        let rcd = decode_address(address, AddressKind::FactoidPublic)?;
        let fee = draft.lock().sub_fee(rcd, ec_rate)?;
        Ok(fee)
    }

    /// Signs every input with the wallet's keys.
    pub fn sign_transaction(&self, name: &str) -> Result<(), WalletError> {
        let draft = self.draft(name)?;
        let mut tx = draft.lock();
        let keys: Vec<FactoidAddress> = tx
            .inputs()
            .iter()
            .filter_map(|input| self.find_factoid(&input.address))
            .collect();
        tx.sign(&keys)?;
        Ok(())
    }

    /// Returns the signed draft after checking it is ready to submit. The
    /// draft stays in the wallet.
    pub fn compose_transaction(&self, name: &str) -> Result<Transaction, WalletError> {
        let draft = self.draft(name)?;
        let tx = draft.lock();
        tx.validate_for_compose()?;
        Ok(tx.clone())
    }
}

fn random_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut seed);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use walletd_core::CoreError;

    const FS: &str = "Fs3E9gV6DXsYzf7Fqx1fVBQPQXV695eP3k5XbmHEZVRLkMdD9qCK";
    const FA: &str = "FA2jK2HcLnRdS94dEcU27rF3meoJfpUcZPSinpb7AwQvPRY6RL1Q";
    const ES: &str = "Es2Rf7iM6PdsqfYCo3D1tnAR65SkLENyWJG1deUzpRMQmbh9F3eG";
    const EC: &str = "EC2DKSYyRcNWf7RS963VFYgMExoHRYLHVeCfQ9PGPmNzwrcmgm2r";
    const OTHER_FA: &str = "FA1y5ZGuHSLmf2TqNf6hVMkPiNGyQpQDTFJvDLRkKQaoPo4bmbgu";

    fn wallet_with_known_keys() -> Wallet {
        let wallet = Wallet::from_seed([7u8; SEED_LEN]);
        wallet
            .import(vec![
                WalletAddress::Factoid(FactoidAddress::from_secret_string(FS).unwrap()),
                WalletAddress::Ec(EcAddress::from_secret_string(ES).unwrap()),
            ])
            .unwrap();
        wallet
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = Wallet::from_seed([1u8; SEED_LEN]);
        let b = Wallet::from_seed([1u8; SEED_LEN]);
        let c = Wallet::from_seed([2u8; SEED_LEN]);

        let a1 = a.generate_factoid_address().unwrap();
        let a2 = a.generate_factoid_address().unwrap();
        assert_ne!(a1, a2);
        assert_eq!(b.generate_factoid_address().unwrap(), a1);
        assert_ne!(c.generate_factoid_address().unwrap(), a1);

        let e1 = a.generate_ec_address().unwrap();
        assert_eq!(b.generate_ec_address().unwrap(), e1);
        assert_eq!(a.address_count(), 3);
    }

    #[test]
    fn test_lookup_and_listing_order() {
        let wallet = wallet_with_known_keys();
        let generated = wallet.generate_factoid_address().unwrap();

        assert_eq!(wallet.get_fct_address(FA).unwrap().secret_string(), FS);
        assert_eq!(wallet.get_ec_address(EC).unwrap().secret_string(), ES);
        assert!(matches!(
            wallet.get_fct_address(OTHER_FA),
            Err(WalletError::AddressNotFound(_))
        ));
        assert!(matches!(
            wallet.get_ec_address(FA),
            Err(WalletError::Core(CoreError::WrongAddressKind { .. }))
        ));

        let publics: Vec<String> = wallet
            .all_addresses()
            .iter()
            .map(|a| a.public_string())
            .collect();
        assert_eq!(
            publics,
            vec![FA.to_string(), generated.public_string(), EC.to_string()]
        );
    }

    #[test]
    fn test_import_skips_duplicates() {
        let wallet = wallet_with_known_keys();
        let added = wallet
            .import(vec![WalletAddress::Factoid(
                FactoidAddress::from_secret_string(FS).unwrap(),
            )])
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(wallet.address_count(), 2);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");

        let (seed, generated) = {
            let wallet = Wallet::open(&path).unwrap();
            let generated = wallet.generate_ec_address().unwrap();
            wallet
                .import(vec![WalletAddress::Factoid(
                    FactoidAddress::from_secret_string(FS).unwrap(),
                )])
                .unwrap();
            wallet.new_transaction("draft").unwrap();
            wallet.close().unwrap();
            (wallet.seed_hex(), generated)
        };

        let wallet = Wallet::open(&path).unwrap();
        assert_eq!(wallet.seed_hex(), seed);
        assert_eq!(wallet.seed_hex().len(), SEED_LEN * 2);
        assert_eq!(wallet.address_count(), 2);
        assert!(wallet.get_fct_address(FA).is_ok());
        assert_eq!(
            wallet.get_ec_address(&generated.public_string()).unwrap(),
            generated
        );
        // Drafts are not persisted.
        assert_eq!(wallet.transaction_count(), 0);

        // The index advanced, so the next address is new.
        assert_ne!(wallet.generate_ec_address().unwrap(), generated);
    }

    #[test]
    fn test_corrupt_seed_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.json");
        let store = WalletStore::new(&path);
        let mut file = AddressBook::new([0u8; SEED_LEN]).to_file();
        file.seed = "abcd".to_string();
        store.save(&file).unwrap();
        assert!(matches!(
            Wallet::open(&path),
            Err(WalletError::Corruption(_))
        ));
    }

    #[test]
    fn test_draft_lifecycle() {
        let wallet = wallet_with_known_keys();
        wallet.new_transaction("tx").unwrap();
        assert!(matches!(
            wallet.new_transaction("tx"),
            Err(WalletError::TransactionExists(_))
        ));

        wallet.add_input("tx", FA, 100_000).unwrap();
        wallet.add_output("tx", OTHER_FA, 60_000).unwrap();
        wallet.add_ec_output("tx", EC, 40_000).unwrap();
        let fee = wallet.add_fee("tx", FA, 1000).unwrap();
        assert_eq!(fee, (1 + 2 + 10) * 1000);

        assert!(matches!(
            wallet.compose_transaction("tx"),
            Err(WalletError::Core(CoreError::NotSigned))
        ));
        wallet.sign_transaction("tx").unwrap();
        let tx = wallet.compose_transaction("tx").unwrap();
        assert_eq!(tx.total_inputs().unwrap(), 100_000 + fee);

        // Compose leaves the draft in place.
        assert_eq!(wallet.transaction_count(), 1);
        wallet.delete_transaction("tx").unwrap();
        assert!(matches!(
            wallet.delete_transaction("tx"),
            Err(WalletError::TransactionNotFound(_))
        ));
        assert!(matches!(
            wallet.add_output("tx", OTHER_FA, 1),
            Err(WalletError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_sub_fee() {
        let wallet = wallet_with_known_keys();
        wallet.new_transaction("tx").unwrap();
        wallet.add_input("tx", FA, 50_000).unwrap();
        wallet.add_output("tx", OTHER_FA, 50_000).unwrap();
        let fee = wallet.sub_fee("tx", OTHER_FA, 1000).unwrap();
        let tx = wallet.get_transaction("tx").unwrap();
        assert_eq!(tx.outputs()[0].amount, 50_000 - fee);
    }

    #[test]
    fn test_input_must_be_held() {
        let wallet = wallet_with_known_keys();
        wallet.new_transaction("tx").unwrap();
        assert!(matches!(
            wallet.add_input("tx", OTHER_FA, 1),
            Err(WalletError::AddressNotFound(_))
        ));
        assert!(matches!(
            wallet.add_input("tx", EC, 1),
            Err(WalletError::Core(CoreError::WrongAddressKind { .. }))
        ));
        assert!(matches!(
            wallet.add_ec_output("tx", FA, 1),
            Err(WalletError::Core(CoreError::WrongAddressKind { .. }))
        ));
    }

    #[test]
    fn test_concurrent_drafts() {
        let wallet = wallet_with_known_keys();
        let names: Vec<String> = (0..8).map(|i| format!("tx-{}", i)).collect();
        for name in &names {
            wallet.new_transaction(name).unwrap();
        }
        wallet.new_transaction("shared").unwrap();

        std::thread::scope(|s| {
            for (i, name) in names.iter().enumerate() {
                let wallet = &wallet;
                s.spawn(move || {
                    wallet.add_input(name, FA, i as u64).unwrap();
                    wallet.add_input("shared", FA, 1).unwrap();
                });
            }
            for i in 0..8u8 {
                let wallet = &wallet;
                s.spawn(move || {
                    let addr = walletd_core::address::encode_address(
                        AddressKind::FactoidPublic,
                        &[i; KEY_LEN],
                    )
                    .unwrap();
                    wallet.add_output("shared", &addr, u64::from(i)).unwrap();
                });
            }
        });

        for (i, name) in names.iter().enumerate() {
            let tx = wallet.get_transaction(name).unwrap();
            assert_eq!(tx.inputs().len(), 1);
            assert_eq!(tx.inputs()[0].amount, i as u64);
        }
        let shared = wallet.get_transaction("shared").unwrap();
        assert_eq!(shared.inputs().len(), 1);
        assert_eq!(shared.outputs().len(), 8);
    }

    #[test]
    fn test_concurrent_generation() {
        let dir = TempDir::new().unwrap();
        let wallet = Wallet::open(dir.path().join("wallet.json")).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| wallet.generate_factoid_address().unwrap());
            }
        });

        assert_eq!(wallet.address_count(), 8);
        let reopened = Wallet::open(dir.path().join("wallet.json")).unwrap();
        assert_eq!(reopened.address_count(), 8);
    }
}

// Copyright (c) 2024 The Drisschain Developers

use lmdb::{
    Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, RwTransaction, Transaction,
    WriteFlags,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{AccountRecord, LedgerError, StateChanges, StateReader, StorageMap};
use crate::block::Block;

/// LMDB-backed chain and state storage
pub struct Ledger {
    env: Environment,
    /// accounts: address -> AccountRecord (JSON)
    accounts_db: Database,
    /// blocks: block number (8 bytes, big endian) -> Block (JSON)
    blocks_db: Database,
    /// block_hashes: block hash -> block number (8 bytes, big endian)
    block_hashes_db: Database,
    /// code: code hash -> contract source
    code_db: Database,
    /// storage: "address/key" -> value
    storage_db: Database,
    /// metadata: key -> value (height, difficulty)
    meta_db: Database,
}

const META_HEIGHT: &[u8; 6] = b"height";
const META_DIFFICULTY: &[u8; 10] = b"difficulty";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, LedgerError> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| LedgerError::Serialization(format!("expected 8 bytes, got {}", bytes.len())))
}

fn storage_prefix(address: &str) -> String {
    format!("{address}/")
}

impl Ledger {
    /// Open or create a ledger in the given directory.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        fs::create_dir_all(path)?;

        let env = Environment::new()
            .set_flags(EnvironmentFlags::NO_SUB_DIR)
            .set_max_dbs(6)
            .set_map_size(1024 * 1024 * 1024) // 1GB
            .open(&path.join("chain.mdb"))?;

        let accounts_db = env.create_db(Some("accounts"), DatabaseFlags::empty())?;
        let blocks_db = env.create_db(Some("blocks"), DatabaseFlags::empty())?;
        let block_hashes_db = env.create_db(Some("block_hashes"), DatabaseFlags::empty())?;
        let code_db = env.create_db(Some("code"), DatabaseFlags::empty())?;
        let storage_db = env.create_db(Some("storage"), DatabaseFlags::empty())?;
        let meta_db = env.create_db(Some("meta"), DatabaseFlags::empty())?;

        let ledger = Self {
            env,
            accounts_db,
            blocks_db,
            block_hashes_db,
            code_db,
            storage_db,
            meta_db,
        };

        info!(path = %path.display(), height = ledger.height()?, "Opened ledger");
        Ok(ledger)
    }

    fn read<T: DeserializeOwned>(&self, db: Database, key: &[u8]) -> Result<Option<T>, LedgerError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(db, &key) {
            Ok(bytes) => Ok(Some(decode(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_u64(&self, key: &[u8]) -> Result<Option<u64>, LedgerError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.meta_db, &key) {
            Ok(bytes) => Ok(Some(decode_u64(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_account_in(
        &self,
        txn: &mut RwTransaction<'_>,
        address: &str,
        record: &AccountRecord,
    ) -> Result<(), LedgerError> {
        txn.put(self.accounts_db, &address, &encode(record)?, WriteFlags::empty())?;
        Ok(())
    }

    /// Seed a single account record outside of any block.
    #[cfg(test)]
    pub(crate) fn put_account(&self, address: &str, record: &AccountRecord) -> Result<(), LedgerError> {
        let mut txn = self.env.begin_rw_txn()?;
        self.put_account_in(&mut txn, address, record)?;
        txn.commit()?;
        Ok(())
    }

    /// Commit a verified block together with the state it produces and the
    /// difficulty the next block must carry.
    ///
    /// Everything is written in one LMDB transaction; on error nothing is
    /// committed, so state never advances without its block.
    pub fn commit_block(
        &self,
        block: &Block,
        changes: &StateChanges,
        difficulty: u64,
    ) -> Result<(), LedgerError> {
        let current = self.height()?;
        let mut txn = self.env.begin_rw_txn()?;

        for (address, record) in &changes.accounts {
            self.put_account_in(&mut txn, address, record)?;
        }

        for (hash, source) in &changes.code {
            txn.put(self.code_db, hash, source, WriteFlags::empty())?;
        }

        for (address, entries) in &changes.storage {
            let prefix = storage_prefix(address);
            for (key, value) in entries {
                let db_key = format!("{prefix}{key}");
                txn.put(self.storage_db, &db_key, value, WriteFlags::empty())?;
            }
        }

        let number = block.block_number.to_be_bytes();
        txn.put(self.blocks_db, &number, &encode(block)?, WriteFlags::empty())?;
        txn.put(self.block_hashes_db, &block.hash, &number, WriteFlags::empty())?;
        if block.block_number > current {
            txn.put(self.meta_db, META_HEIGHT, &number, WriteFlags::empty())?;
        }
        txn.put(
            self.meta_db,
            META_DIFFICULTY,
            &difficulty.to_be_bytes(),
            WriteFlags::empty(),
        )?;

        txn.commit()?;

        debug!(
            number = block.block_number,
            hash = %&block.hash[..block.hash.len().min(16)],
            accounts = changes.accounts.len(),
            code = changes.code.len(),
            storage = changes.storage.len(),
            difficulty,
            "Committed block"
        );
        Ok(())
    }

    /// Highest stored block number, 0 when no block is stored.
    pub fn height(&self) -> Result<u64, LedgerError> {
        Ok(self.read_u64(META_HEIGHT)?.unwrap_or(0))
    }

    /// Get a block by number
    pub fn get_block(&self, number: u64) -> Result<Option<Block>, LedgerError> {
        self.read(self.blocks_db, &number.to_be_bytes())
    }

    /// Get a block by hash via the hash index
    pub fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>, LedgerError> {
        match self.block_number_of(hash)? {
            Some(number) => self.get_block(number),
            None => Ok(None),
        }
    }

    /// Number of the block with the given hash
    pub fn block_number_of(&self, hash: &str) -> Result<Option<u64>, LedgerError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.block_hashes_db, &hash) {
            Ok(bytes) => Ok(Some(decode_u64(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The block at the current height, if any
    pub fn latest_block(&self) -> Result<Option<Block>, LedgerError> {
        match self.height()? {
            0 => Ok(None),
            height => self
                .get_block(height)?
                .map(Some)
                .ok_or(LedgerError::BlockNotFound(height)),
        }
    }

    /// Persisted mining difficulty
    pub fn difficulty(&self) -> Result<Option<u64>, LedgerError> {
        self.read_u64(META_DIFFICULTY)
    }
}

impl StateReader for Ledger {
    fn account(&self, address: &str) -> Result<Option<AccountRecord>, LedgerError> {
        self.read(self.accounts_db, address.as_bytes())
    }

    fn contains(&self, address: &str) -> Result<bool, LedgerError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.accounts_db, &address) {
            Ok(_) => Ok(true),
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn code(&self, code_hash: &str) -> Result<Option<String>, LedgerError> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.code_db, &code_hash) {
            Ok(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn storage(&self, address: &str) -> Result<StorageMap, LedgerError> {
        let prefix = storage_prefix(address);
        let txn = self.env.begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.storage_db)?;

        let mut entries = StorageMap::new();
        for item in cursor.iter_from(prefix.as_bytes()) {
            let (key, value) = item?;
            let Some(key) = key.strip_prefix(prefix.as_bytes()) else {
                break;
            };
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            let value = String::from_utf8(value.to_vec())
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            entries.insert(key, value);
        }

        Ok(entries)
    }
}

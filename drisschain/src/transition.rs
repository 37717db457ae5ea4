// Copyright (c) 2024 The Drisschain Developers

//! Block replay: applying a block's transactions to account state.
//!
//! Replay works on in-memory overlays (`states`, `code`, `storage`) on top of
//! the committed ledger. Nothing reaches the ledger until the whole block has
//! replayed; the node then commits every change together with the block in
//! one write transaction.

use num_bigint::BigUint;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::config::ChainParams;
use crate::crypto::{sha256_hex, EMPTY_HASH};
use crate::ledger::{
    AccountRecord, AccountStates, Ledger, LedgerError, StateChanges, StateReader, StorageMap,
};
use crate::merkle::merkle_root;
use crate::runtime::{self, CallContext, Program};
use crate::transaction::{Transaction, TxError};

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Transaction {index} is invalid: {source}")]
    Tx {
        index: usize,
        #[source]
        source: TxError,
    },

    #[error("Sender {0} does not exist")]
    UnknownSender(String),

    #[error("Sender {0} is a contract")]
    ContractSender(String),

    #[error("Sender {address} cannot pay {required} (balance {balance})")]
    InsufficientFunds {
        address: String,
        balance: BigUint,
        required: BigUint,
    },

    #[error("Code {0} is referenced but not stored")]
    MissingCode(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TransitionError {
    /// Whether the failure belongs to the sender rather than to the store.
    pub fn is_sender_fault(&self) -> bool {
        matches!(
            self,
            TransitionError::ContractSender(_) | TransitionError::InsufficientFunds { .. }
        )
    }
}

/// Overlay state for replaying transactions one at a time.
pub struct Replay<'a, R> {
    reader: &'a R,
    logging: bool,
    states: AccountStates,
    /// code hash -> source, for contracts deployed during this replay
    code: BTreeMap<String, String>,
    /// address -> full storage of contracts touched during this replay
    storage: BTreeMap<String, StorageMap>,
}

impl<'a, R: StateReader> Replay<'a, R> {
    pub fn new(reader: &'a R, logging: bool) -> Self {
        Self {
            reader,
            logging,
            states: AccountStates::new(),
            code: BTreeMap::new(),
            storage: BTreeMap::new(),
        }
    }

    /// The overlay record for `address`, loaded from the ledger or created empty.
    fn load_account(&mut self, address: &str) -> Result<&mut AccountRecord, LedgerError> {
        if !self.states.contains_key(address) {
            let record = self.reader.account(address)?.unwrap_or_default();
            self.states.insert(address.to_string(), record);
        }
        Ok(self.states.entry(address.to_string()).or_default())
    }

    /// Current overlay view of an account without creating it.
    pub fn account(&self, address: &str) -> Result<Option<AccountRecord>, LedgerError> {
        match self.states.get(address) {
            Some(record) => Ok(Some(record.clone())),
            None => self.reader.account(address),
        }
    }

    fn code(&self, code_hash: &str) -> Result<String, TransitionError> {
        if let Some(source) = self.code.get(code_hash) {
            return Ok(source.clone());
        }
        self.reader
            .code(code_hash)?
            .ok_or_else(|| TransitionError::MissingCode(code_hash.to_string()))
    }

    /// Apply one transaction from `sender`.
    ///
    /// Sender faults are detected before anything is written to the overlay,
    /// so a rejected transaction leaves the replay as it was.
    pub fn apply_tx(
        &mut self,
        tx: &Transaction,
        sender: &str,
        block: &Block,
    ) -> Result<(), TransitionError> {
        let required = tx.total_cost();
        let account = self.load_account(sender)?;
        if account.is_contract() {
            return Err(TransitionError::ContractSender(sender.to_string()));
        }
        if account.balance < required {
            return Err(TransitionError::InsufficientFunds {
                address: sender.to_string(),
                balance: account.balance.clone(),
                required,
            });
        }

        let deployed = tx
            .additional_data
            .sc_body
            .as_ref()
            .map(|body| (sha256_hex(body), body.clone()));

        account.balance -= &required;
        if let Some((code_hash, _)) = &deployed {
            account.code_hash = code_hash.clone();
        }
        account.nonce += 1;

        if let Some((code_hash, body)) = deployed {
            debug!(address = %sender, code_hash = %code_hash, "Deployed contract");
            self.code.insert(code_hash, body);
        }

        let recipient = self.load_account(&tx.recipient)?;
        recipient.balance += &tx.amount;

        if recipient.is_contract() {
            let code_hash = recipient.code_hash.clone();
            self.call_contract(tx, &code_hash, block)?;
        }

        Ok(())
    }

    fn call_contract(
        &mut self,
        tx: &Transaction,
        code_hash: &str,
        block: &Block,
    ) -> Result<(), TransitionError> {
        let program = Program::parse(&self.code(code_hash)?);
        let ctx = CallContext {
            block,
            tx,
            contract: &tx.recipient,
            pending_storage: self.storage.get(&tx.recipient),
            logging: self.logging,
        };

        let outcome = runtime::execute(
            &program,
            self.states.clone(),
            &tx.contract_gas(),
            self.reader,
            &ctx,
        )?;

        debug!(
            contract = %tx.recipient,
            status = ?outcome.status,
            "Executed contract call"
        );

        self.states = outcome.state;
        if let Some(storage) = outcome.storage {
            self.storage.insert(tx.recipient.clone(), storage);
        }
        Ok(())
    }

    /// Credit `amount` to `address`, creating the account if needed.
    pub fn credit(&mut self, address: &str, amount: &BigUint) -> Result<(), LedgerError> {
        self.load_account(address)?.balance += amount;
        Ok(())
    }

    /// Close the replay: recompute storage roots and collect the writes.
    pub fn finish(mut self) -> StateChanges {
        for (address, entries) in &self.storage {
            if let Some(account) = self.states.get_mut(address) {
                account.storage_root = storage_root(entries);
            }
        }

        StateChanges {
            accounts: self.states,
            code: self.code,
            storage: self.storage,
        }
    }
}

/// Merkle root over `"key value"` entries; `EMPTY_HASH` for empty storage.
pub fn storage_root(entries: &StorageMap) -> String {
    if entries.is_empty() {
        return EMPTY_HASH.to_string();
    }
    let items: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{key} {value}"))
        .collect();
    merkle_root(&items)
}

/// Replay `block` against committed state without writing anything.
pub fn replay_block<R: StateReader>(
    block: &Block,
    reader: &R,
    params: &ChainParams,
    logging: bool,
) -> Result<StateChanges, TransitionError> {
    let mut senders = Vec::with_capacity(block.transactions.len());
    for (index, tx) in block.transactions.iter().enumerate() {
        let sender = tx
            .validate(reader, params)
            .map_err(|source| TransitionError::Tx { index, source })?;
        senders.push(sender);
    }

    for sender in &senders {
        if !reader.contains(sender)? {
            return Err(TransitionError::UnknownSender(sender.clone()));
        }
    }

    let mut replay = Replay::new(reader, logging);
    for (tx, sender) in block.transactions.iter().zip(&senders) {
        replay.apply_tx(tx, sender, block)?;
    }

    let reward = &params.block_reward + block.total_fees();
    replay.credit(&block.coinbase, &reward)?;

    Ok(replay.finish())
}

/// Replay `block` on committed state and return the writes it produces.
///
/// Nothing is written here: the changes are committed together with the
/// block by [`Ledger::commit_block`], so a failure at any point leaves the
/// ledger as it was.
pub fn verify_tx_and_transit(
    block: &Block,
    ledger: &Ledger,
    params: &ChainParams,
    logging: bool,
) -> Result<StateChanges, TransitionError> {
    let changes = match replay_block(block, ledger, params, logging) {
        Ok(changes) => changes,
        Err(e) => {
            warn!(number = block.block_number, error = %e, "Block replay failed");
            return Err(e);
        }
    };

    info!(
        number = block.block_number,
        txs = block.transactions.len(),
        accounts = changes.accounts.len(),
        "Replayed block state"
    );
    Ok(changes)
}

// Copyright (c) 2024 The Drisschain Developers

//! The `drisscript` contract runtime.
//!
//! A gas-metered, line-oriented register machine. Every instruction costs
//! [`INSTRUCTION_GAS`] regardless of what it does. A call ends when the
//! program runs off its end, when the remaining gas drops below one
//! instruction's cost, or on a `stop`/`revert` line.
//!
//! Outcomes are deliberately asymmetric: `revert` hands back the account
//! state exactly as it was at entry and drops every storage write, while
//! running out of gas keeps whatever state and storage changes were made
//! before the gas ran out. A `store` under a key longer than
//! [`MAX_STORAGE_KEY_LEN`] bytes reverts the call the same way `revert` does.

mod program;
mod value;

pub use program::{BinaryOp, CompareOp, EnvField, Instruction, Operand, Program};

use num_bigint::{BigInt, BigUint};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::block::Block;
use crate::crypto::{is_digest_hex, sha256_hex};
use crate::ledger::{AccountRecord, AccountStates, LedgerError, StateReader, StorageMap};
use crate::numeric::{clamp_non_negative, to_hex};
use crate::telemetry::CONTRACT_LOG_TARGET;
use crate::transaction::Transaction;
use value::{normalize, read_int, to_address, ZERO};

/// Flat gas cost of one instruction.
pub const INSTRUCTION_GAS: u64 = 10_000_000;

/// Longest storage key a contract may write.
pub const MAX_STORAGE_KEY_LEN: usize = 256;

pub use value::MAX_VALUE_BITS;

/// How a contract call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Ran past the last instruction.
    Completed,
    /// Hit a `stop` line.
    Stopped,
    /// Hit a `revert` line; state is rolled back.
    Reverted,
    /// Gas ran out first; changes so far are kept.
    OutOfGas,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExitStatus,
    /// Account states to merge into the caller's view.
    pub state: AccountStates,
    /// Full storage of the contract if the call read or wrote it.
    pub storage: Option<StorageMap>,
    pub gas_left: BigUint,
}

/// Environment of a single contract call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub block: &'a Block,
    pub tx: &'a Transaction,
    /// Address of the called contract
    pub contract: &'a str,
    /// Storage already written to this contract earlier in the same block
    pub pending_storage: Option<&'a StorageMap>,
    /// Emit `log` instructions
    pub logging: bool,
}

/// Run `program` with `gas_budget`.
///
/// `state` is the caller's view of touched accounts; accounts the program
/// needs beyond it are read from `reader`. Only store failures are errors;
/// every program outcome, including `revert`, is an `Ok`.
pub fn execute<R: StateReader>(
    program: &Program,
    state: AccountStates,
    gas_budget: &BigUint,
    reader: &R,
    ctx: &CallContext<'_>,
) -> Result<ExecutionOutcome, LedgerError> {
    let snapshot = state.clone();
    let mut machine = Machine {
        program,
        reader,
        ctx,
        memory: HashMap::new(),
        storage: None,
        state,
        args: ctx
            .tx
            .additional_data
            .tx_call_args
            .iter()
            .flatten()
            .map(to_hex)
            .collect(),
        gas: gas_budget.clone(),
    };

    let step_cost = BigUint::from(INSTRUCTION_GAS);
    let mut ip = 0;
    let mut faulted = false;
    while ip < program.len() && machine.gas >= step_cost {
        let Some(instruction) = program.get(ip) else {
            break;
        };
        if matches!(instruction, Instruction::Stop | Instruction::Revert) {
            break;
        }
        let step = machine.step(instruction)?;
        machine.gas -= &step_cost;
        match step {
            Step::Next => ip += 1,
            Step::Jump(target) => ip = target + 1,
            Step::Revert => {
                faulted = true;
                break;
            }
        }
    }

    let status = match program.get(ip) {
        _ if faulted => ExitStatus::Reverted,
        Some(Instruction::Revert) => ExitStatus::Reverted,
        Some(Instruction::Stop) => ExitStatus::Stopped,
        Some(_) => ExitStatus::OutOfGas,
        None => ExitStatus::Completed,
    };

    debug!(
        contract = %ctx.contract,
        status = ?status,
        gas_left = %machine.gas,
        "Contract call finished"
    );

    if status == ExitStatus::Reverted {
        return Ok(ExecutionOutcome {
            status,
            state: snapshot,
            storage: None,
            gas_left: machine.gas,
        });
    }

    Ok(ExecutionOutcome {
        status,
        state: machine.state,
        storage: machine.storage,
        gas_left: machine.gas,
    })
}

/// Where execution goes after an instruction.
enum Step {
    Next,
    /// Continue after the label at this index.
    Jump(usize),
    Revert,
}

struct Machine<'a, R> {
    program: &'a Program,
    reader: &'a R,
    ctx: &'a CallContext<'a>,
    memory: HashMap<String, String>,
    storage: Option<StorageMap>,
    state: AccountStates,
    args: Vec<String>,
    gas: BigUint,
}

impl<R: StateReader> Machine<'_, R> {
    fn step(&mut self, instruction: &Instruction) -> Result<Step, LedgerError> {
        match instruction {
            Instruction::Set { dest, value } => {
                let value = self.resolve(value);
                self.set(dest, &value);
            }
            Instruction::Binary { op, dest, value } => {
                let lhs = self.read_memory(dest);
                let rhs = read_int(&self.resolve(value));
                self.set_int(dest, &value::apply_binary(*op, &lhs, &rhs));
            }
            Instruction::Not { dest } => {
                let current = self.read_memory(dest);
                self.set_int(dest, &value::complement(&current));
            }
            Instruction::Compare { op, dest, value } => {
                let lhs = self.read_memory(dest);
                let rhs = read_int(&self.resolve(value));
                self.set(dest, value::apply_compare(*op, &lhs, &rhs));
            }
            Instruction::Jump { condition, label } => {
                if read_int(&self.resolve(condition)) == BigInt::from(1) {
                    let label = self.resolve(label);
                    if let Some(target) = self.program.label(&label) {
                        return Ok(Step::Jump(target));
                    }
                }
            }
            Instruction::Label(_) | Instruction::Unknown(_) => {}
            Instruction::Store { key, value } => {
                let key = self.resolve(key);
                if key.len() > MAX_STORAGE_KEY_LEN {
                    debug!(contract = %self.ctx.contract, key_len = key.len(), "Storage key too long");
                    return Ok(Step::Revert);
                }
                let value = normalize(&self.resolve(value));
                self.storage()?.insert(key, value);
            }
            Instruction::Pull { dest, key } => {
                let key = self.resolve(key);
                let value = self
                    .storage()?
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| ZERO.to_string());
                self.set(dest, &value);
            }
            Instruction::Env { field, dest } => {
                let value = self.env(*field)?;
                self.set(dest, &value);
            }
            Instruction::Balance { dest, address } => {
                let address = to_address(&self.resolve(address));
                let balance = match self.state.get(&address) {
                    Some(account) => account.balance.clone(),
                    None if !is_digest_hex(&address) => BigUint::default(),
                    None => self
                        .reader
                        .account(&address)?
                        .map(|account| account.balance)
                        .unwrap_or_default(),
                };
                self.set(dest, &to_hex(&balance));
            }
            Instruction::Send { target, amount } => {
                let target = to_address(&self.resolve(target));
                let amount = clamp_non_negative(&read_int(&self.resolve(amount)));
                if is_digest_hex(&target) {
                    self.send(&target, amount)?;
                } else {
                    debug!(contract = %self.ctx.contract, "Send skipped: target is not an address");
                }
            }
            Instruction::Sha256 { dest, value } => {
                let digest = format!("0x{}", sha256_hex(self.resolve(value)));
                self.set(dest, &digest);
            }
            Instruction::Log(value) => {
                if self.ctx.logging {
                    let value = self.resolve(value);
                    info!(target: CONTRACT_LOG_TARGET, contract = %self.ctx.contract, %value, "LOG");
                }
            }
            // Halting lines never reach here.
            Instruction::Stop | Instruction::Revert => {}
        }
        Ok(Step::Next)
    }

    fn resolve(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Memory(name) => self
                .memory
                .entry(name.clone())
                .or_insert_with(|| ZERO.to_string())
                .clone(),
            Operand::Arg(Some(index)) => self
                .args
                .get(*index)
                .cloned()
                .unwrap_or_else(|| ZERO.to_string()),
            Operand::Arg(None) => ZERO.to_string(),
            Operand::Literal(text) => text.clone(),
        }
    }

    fn read_memory(&mut self, name: &str) -> BigInt {
        read_int(&self.resolve(&Operand::Memory(name.to_string())))
    }

    fn set(&mut self, dest: &str, value: &str) {
        self.memory.insert(dest.to_string(), normalize(value));
    }

    fn set_int(&mut self, dest: &str, value: &BigInt) {
        self.memory
            .insert(dest.to_string(), value::normalize_int(value));
    }

    /// The contract's storage, loaded on first use.
    fn storage(&mut self) -> Result<&mut StorageMap, LedgerError> {
        if self.storage.is_none() {
            let loaded = match self.ctx.pending_storage {
                Some(pending) => pending.clone(),
                None => self.reader.storage(self.ctx.contract)?,
            };
            self.storage = Some(loaded);
        }
        Ok(self.storage.get_or_insert_with(StorageMap::new))
    }

    /// An account in the call's state, loaded from the store or created empty.
    fn account(&mut self, address: &str) -> Result<&mut AccountRecord, LedgerError> {
        if !self.state.contains_key(address) {
            let record = self.reader.account(address)?.unwrap_or_default();
            self.state.insert(address.to_string(), record);
        }
        Ok(self.state.entry(address.to_string()).or_default())
    }

    fn env(&mut self, field: EnvField) -> Result<String, LedgerError> {
        let CallContext {
            block, tx, contract, ..
        } = *self.ctx;

        let value = match field {
            EnvField::Timestamp => to_hex(&BigUint::from(block.timestamp)),
            EnvField::BlockNumber => to_hex(&BigUint::from(block.block_number)),
            EnvField::BlockHash => format!("0x{}", block.parent_hash),
            EnvField::Difficulty => to_hex(&BigUint::from(block.difficulty)),
            EnvField::TxValue => to_hex(&tx.amount),
            EnvField::TxSender => match tx.sender() {
                Ok(sender) => format!("0x{sender}"),
                Err(_) => ZERO.to_string(),
            },
            EnvField::TxGas => to_hex(&tx.gas),
            EnvField::TxExecGas => to_hex(&tx.contract_gas()),
            EnvField::Address => format!("0x{contract}"),
            EnvField::SelfBalance => to_hex(&self.account(contract)?.balance),
            EnvField::Gas => to_hex(&self.gas),
        };
        Ok(value)
    }

    /// Move `amount` from the contract to `target` if the contract can pay.
    fn send(&mut self, target: &str, amount: BigUint) -> Result<(), LedgerError> {
        let contract = self.ctx.contract;
        let source = self.account(contract)?;
        if source.balance < amount {
            debug!(contract = %contract, %target, %amount, "Send skipped: insufficient balance");
            return Ok(());
        }
        source.balance -= &amount;

        self.account(target)?.balance += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EMPTY_HASH;
    use crate::ledger::{Ledger, StateChanges};
    use crate::transaction::AdditionalData;
    use tempfile::{tempdir, TempDir};

    const CONTRACT: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

    struct Fixture {
        _dir: TempDir,
        ledger: Ledger,
        block: Block,
        tx: Transaction,
    }

    fn fixture(args: Option<Vec<u64>>) -> Fixture {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        let block = Block::new(2, 123_456, Vec::new(), 16, "ab".repeat(32), "miner");
        let tx = Transaction::new(
            CONTRACT,
            BigUint::from(5u32),
            BigUint::from(2_000_000_000u64),
            AdditionalData {
                contract_gas: Some(BigUint::from(1_000_000_000u64)),
                sc_body: None,
                tx_call_args: args.map(|a| a.into_iter().map(BigUint::from).collect()),
            },
            1,
        );
        Fixture {
            _dir: dir,
            ledger,
            block,
            tx,
        }
    }

    fn contract_state(balance: u64) -> AccountStates {
        AccountStates::from([(
            CONTRACT.to_string(),
            AccountRecord {
                balance: BigUint::from(balance),
                code_hash: sha256_hex("code"),
                nonce: 0,
                storage_root: EMPTY_HASH.to_string(),
            },
        )])
    }

    fn run(f: &Fixture, source: &str, state: AccountStates, gas: u64) -> ExecutionOutcome {
        let ctx = CallContext {
            block: &f.block,
            tx: &f.tx,
            contract: CONTRACT,
            pending_storage: None,
            logging: false,
        };
        execute(
            &Program::parse(source),
            state,
            &BigUint::from(gas),
            &f.ledger,
            &ctx,
        )
        .unwrap()
    }

    fn stored(outcome: &ExecutionOutcome, key: &str) -> Option<String> {
        outcome.storage.as_ref().and_then(|s| s.get(key).cloned())
    }

    const PLENTY: u64 = 1_000 * INSTRUCTION_GAS;

    #[test]
    fn test_arithmetic_and_store() {
        let f = fixture(None);
        let source = "
            set a, 10
            add a, 0x5
            mul a, 2
            sub a, 1
            div a, 4
            store result, $a
        ";
        let outcome = run(&f, source, contract_state(0), PLENTY);
        assert_eq!(outcome.status, ExitStatus::Completed);
        assert_eq!(stored(&outcome, "result").as_deref(), Some("0x7"));
    }

    #[test]
    fn test_negative_results_clamp_to_zero() {
        let f = fixture(None);
        let outcome = run(
            &f,
            "set a, 1\nsub a, 5\nstore a, $a\nset b, 3\nnot b\nstore b, $b",
            contract_state(0),
            PLENTY,
        );
        assert_eq!(stored(&outcome, "a").as_deref(), Some("0x0"));
        assert_eq!(stored(&outcome, "b").as_deref(), Some("0x0"));
    }

    #[test]
    fn test_call_args_and_comparisons() {
        let f = fixture(Some(vec![7, 9]));
        let source = "
            set a, %0
            gtr a, %1
            store gt, $a
            set b, %1
            equ b, 9
            store eq, $b
            set c, %5
            store missing, $c
        ";
        let outcome = run(&f, source, contract_state(0), PLENTY);
        assert_eq!(stored(&outcome, "gt").as_deref(), Some("0x0"));
        assert_eq!(stored(&outcome, "eq").as_deref(), Some("0x1"));
        assert_eq!(stored(&outcome, "missing").as_deref(), Some("0x0"));
    }

    #[test]
    fn test_counting_loop() {
        let f = fixture(None);
        let source = "
            set i, 0
            label loop
            add i, 1
            set c, $i
            lss c, 5
            jump $c, loop
            store i, $i
        ";
        let outcome = run(&f, source, contract_state(0), PLENTY);
        assert_eq!(stored(&outcome, "i").as_deref(), Some("0x5"));
    }

    #[test]
    fn test_jump_to_missing_label_falls_through() {
        let f = fixture(None);
        let outcome = run(&f, "jump 1, nowhere\nstore k, 2", contract_state(0), PLENTY);
        assert_eq!(stored(&outcome, "k").as_deref(), Some("0x2"));
    }

    #[test]
    fn test_revert_restores_entry_state() {
        let f = fixture(None);
        let mut state = contract_state(100);
        state.insert("d".repeat(64), AccountRecord::with_balance(BigUint::from(1u32)));
        let before = state.clone();

        let source = format!("store k, 1\nsend 0x{}, 40\nrevert\nstore after, 1", "d".repeat(64));
        let outcome = run(&f, &source, state, PLENTY);

        assert_eq!(outcome.status, ExitStatus::Reverted);
        assert_eq!(outcome.state, before);
        assert!(outcome.storage.is_none());
    }

    #[test]
    fn test_overlong_storage_key_reverts() {
        let f = fixture(None);
        let mut state = contract_state(100);
        state.insert("d".repeat(64), AccountRecord::with_balance(BigUint::from(1u32)));
        let before = state.clone();

        let source = format!(
            "send 0x{}, 40\nstore {}, 1\nstore {}, 1\nstore after, 1",
            "d".repeat(64),
            "k".repeat(MAX_STORAGE_KEY_LEN),
            "k".repeat(600)
        );
        let outcome = run(&f, &source, state, PLENTY);

        assert_eq!(outcome.status, ExitStatus::Reverted);
        assert_eq!(outcome.state, before);
        assert!(outcome.storage.is_none());
        assert_eq!(
            outcome.gas_left,
            BigUint::from(PLENTY - 3 * INSTRUCTION_GAS)
        );
    }

    #[test]
    fn test_send_and_balance_ignore_non_addresses() {
        let f = fixture(None);
        let long = "a".repeat(600);
        let source = format!("send 0x{long}, 30\nbalance b, 0x{long}\nstore b, $b\nsend 0xzz, 30");
        let outcome = run(&f, &source, contract_state(100), PLENTY);

        assert_eq!(outcome.status, ExitStatus::Completed);
        assert_eq!(outcome.state.len(), 1);
        assert_eq!(outcome.state[CONTRACT].balance, BigUint::from(100u32));
        assert_eq!(stored(&outcome, "b").as_deref(), Some("0x0"));
    }

    #[test]
    fn test_repeated_squaring_stays_bounded() {
        let f = fixture(None);
        let source = "
            set a, 3
            set i, 0
            label l
            mul a, $a
            add i, 1
            set c, $i
            lss c, 11
            jump $c, l
            store eleven, $a
            mul a, $a
            store twelve, $a
            label spin
            mul a, $a
            store a, $a
            jump 1, spin
        ";
        let outcome = run(&f, source, contract_state(0), 40_000 * INSTRUCTION_GAS);

        assert_eq!(outcome.status, ExitStatus::OutOfGas);
        let eleven = stored(&outcome, "eleven").unwrap();
        assert!(eleven.len() > 800 && eleven.len() <= 2 + (MAX_VALUE_BITS / 4) as usize);
        assert_eq!(stored(&outcome, "twelve").as_deref(), Some("0x0"));
        assert_eq!(stored(&outcome, "a").as_deref(), Some("0x0"));
    }

    #[test]
    fn test_out_of_gas_keeps_partial_changes() {
        let f = fixture(None);
        let source = "store a, 1\nstore b, 2\nstore c, 3";
        let outcome = run(&f, source, contract_state(0), 2 * INSTRUCTION_GAS);

        assert_eq!(outcome.status, ExitStatus::OutOfGas);
        assert_eq!(stored(&outcome, "a").as_deref(), Some("0x1"));
        assert_eq!(stored(&outcome, "b").as_deref(), Some("0x2"));
        assert_eq!(stored(&outcome, "c"), None);
        assert_eq!(outcome.gas_left, BigUint::from(0u32));
    }

    #[test]
    fn test_revert_with_no_gas_left_still_reverts() {
        let f = fixture(None);
        let outcome = run(&f, "store a, 1\nrevert", contract_state(0), INSTRUCTION_GAS);
        assert_eq!(outcome.status, ExitStatus::Reverted);
        assert!(outcome.storage.is_none());
    }

    #[test]
    fn test_stop_halts() {
        let f = fixture(None);
        let outcome = run(&f, "store a, 1\nstop\nstore b, 2", contract_state(0), PLENTY);
        assert_eq!(outcome.status, ExitStatus::Stopped);
        assert_eq!(stored(&outcome, "b"), None);
    }

    #[test]
    fn test_untouched_storage_is_none() {
        let f = fixture(None);
        let outcome = run(&f, "set a, 1", contract_state(0), PLENTY);
        assert!(outcome.storage.is_none());
    }

    #[test]
    fn test_storage_loads_persisted_and_pending() {
        let f = fixture(None);
        let mut changes = StateChanges::default();
        changes.storage.insert(
            CONTRACT.to_string(),
            StorageMap::from([("x".to_string(), "0x9".to_string())]),
        );
        f.ledger.commit_block(&f.block, &changes, 1).unwrap();

        let outcome = run(&f, "pull a, x\nadd a, 1\nstore y, $a", contract_state(0), PLENTY);
        let storage = outcome.storage.unwrap();
        assert_eq!(storage["x"], "0x9");
        assert_eq!(storage["y"], "0xa");

        let pending = StorageMap::from([("x".to_string(), "0x1".to_string())]);
        let ctx = CallContext {
            block: &f.block,
            tx: &f.tx,
            contract: CONTRACT,
            pending_storage: Some(&pending),
            logging: false,
        };
        let outcome = execute(
            &Program::parse("pull a, x\nstore y, $a"),
            contract_state(0),
            &BigUint::from(PLENTY),
            &f.ledger,
            &ctx,
        )
        .unwrap();
        assert_eq!(stored(&outcome, "y").as_deref(), Some("0x1"));
    }

    #[test]
    fn test_environment_reads() {
        let f = fixture(None);
        let source = "
            timestamp t
            store t, $t
            blocknumber n
            store n, $n
            difficulty d
            store d, $d
            txvalue v
            store v, $v
            txexecgas g
            store g, $g
            selfbalance s
            store s, $s
            address me
            store me, $me
        ";
        let outcome = run(&f, source, contract_state(42), PLENTY);
        assert_eq!(stored(&outcome, "t").as_deref(), Some("0x1e240"));
        assert_eq!(stored(&outcome, "n").as_deref(), Some("0x2"));
        assert_eq!(stored(&outcome, "d").as_deref(), Some("0x10"));
        assert_eq!(stored(&outcome, "v").as_deref(), Some("0x5"));
        assert_eq!(stored(&outcome, "g").as_deref(), Some("0x3b9aca00"));
        assert_eq!(stored(&outcome, "s").as_deref(), Some("0x2a"));
        assert_eq!(stored(&outcome, "me"), Some(format!("0x{CONTRACT}")));
    }

    #[test]
    fn test_send_moves_balance() {
        let f = fixture(None);
        let target = format!("{}1", "0".repeat(63));
        let outcome = run(&f, "send 0x1, 30\nsend 0x1, 500", contract_state(100), PLENTY);

        assert_eq!(outcome.state[CONTRACT].balance, BigUint::from(70u32));
        assert_eq!(outcome.state[&target].balance, BigUint::from(30u32));
        assert_eq!(outcome.state[&target].code_hash, EMPTY_HASH);
    }

    #[test]
    fn test_balance_reads_state_then_store() {
        let f = fixture(None);
        let stored_addr = "e".repeat(64);
        f.ledger
            .put_account(&stored_addr, &AccountRecord::with_balance(BigUint::from(11u32)))
            .unwrap();

        let source = format!(
            "balance a, 0x{stored_addr}\nstore a, $a\nbalance b, 0x{CONTRACT}\nstore b, $b\nbalance c, 0x99\nstore c, $c"
        );
        let outcome = run(&f, &source, contract_state(7), PLENTY);
        assert_eq!(stored(&outcome, "a").as_deref(), Some("0xb"));
        assert_eq!(stored(&outcome, "b").as_deref(), Some("0x7"));
        assert_eq!(stored(&outcome, "c").as_deref(), Some("0x0"));
    }

    #[test]
    fn test_sha256_and_unknown_cost_gas() {
        let f = fixture(None);
        let outcome = run(&f, "bogus\nsha256 h, abc\nstore h, $h", contract_state(0), PLENTY);
        let expected = format!("0x{}", sha256_hex("abc"));
        assert_eq!(stored(&outcome, "h"), Some(expected));
        assert_eq!(
            outcome.gas_left,
            BigUint::from(PLENTY - 3 * INSTRUCTION_GAS)
        );
    }
}

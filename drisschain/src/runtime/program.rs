// Copyright (c) 2024 The Drisschain Developers

//! Parsing of `drisscript` source into instructions.
//!
//! A program is parsed once per call. Each non-blank line becomes exactly one
//! [`Instruction`], so instruction indices line up with the lines the
//! interpreter counts gas for.

use std::collections::HashMap;

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `$name`: read from call memory.
    Memory(String),
    /// `%N`: positional call argument; `None` when `N` is not a number.
    Arg(Option<usize>),
    /// Anything else resolves to its own text.
    Literal(String),
}

impl Operand {
    fn parse(token: &str) -> Self {
        if let Some(name) = token.strip_prefix('$') {
            Operand::Memory(name.to_string())
        } else if let Some(index) = token.strip_prefix('%') {
            let digits: String = index.chars().take_while(char::is_ascii_digit).collect();
            Operand::Arg(digits.parse().ok())
        } else {
            Operand::Literal(token.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gtr,
    Lss,
    Geq,
    Leq,
    Equ,
    Neq,
}

/// Values read from the block, the transaction or the contract account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvField {
    Timestamp,
    BlockNumber,
    BlockHash,
    Difficulty,
    TxValue,
    TxSender,
    TxGas,
    TxExecGas,
    Address,
    SelfBalance,
    Gas,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Set { dest: String, value: Operand },
    Binary { op: BinaryOp, dest: String, value: Operand },
    Not { dest: String },
    Compare { op: CompareOp, dest: String, value: Operand },
    Jump { condition: Operand, label: Operand },
    Label(String),
    Store { key: Operand, value: Operand },
    Pull { dest: String, key: Operand },
    Env { field: EnvField, dest: String },
    Balance { dest: String, address: Operand },
    Send { target: Operand, amount: Operand },
    Sha256 { dest: String, value: Operand },
    Log(Operand),
    Stop,
    Revert,
    /// Unrecognised lines still cost gas.
    Unknown(String),
}

/// A parsed contract.
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// label name -> index of its first `label` line
    labels: HashMap<String, usize>,
}

impl Program {
    pub fn parse(source: &str) -> Self {
        let instructions: Vec<Instruction> = source
            .replace('\t', "")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_line)
            .collect();

        let mut labels = HashMap::new();
        for (index, instruction) in instructions.iter().enumerate() {
            if let Instruction::Label(name) = instruction {
                labels.entry(name.clone()).or_insert(index);
            }
        }

        Self {
            instructions,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Index of the `label <name>` line.
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }
}

fn parse_line(line: &str) -> Instruction {
    let opcode = line.split(' ').find(|tok| !tok.is_empty()).unwrap_or_default();
    let rest: String = line
        .get(opcode.len() + 1..)
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let args: Vec<&str> = rest.split(',').filter(|tok| !tok.is_empty()).collect();

    let dest = || args.first().map(|s| s.to_string()).unwrap_or_default();
    let operand = |i: usize| Operand::parse(args.get(i).copied().unwrap_or("0x0"));

    let binary = |op| Instruction::Binary {
        op,
        dest: dest(),
        value: operand(1),
    };
    let compare = |op| Instruction::Compare {
        op,
        dest: dest(),
        value: operand(1),
    };
    let env = |field| Instruction::Env {
        field,
        dest: dest(),
    };

    match opcode {
        "set" => Instruction::Set {
            dest: dest(),
            value: operand(1),
        },
        "add" => binary(BinaryOp::Add),
        "sub" => binary(BinaryOp::Sub),
        "mul" => binary(BinaryOp::Mul),
        "div" => binary(BinaryOp::Div),
        "mod" => binary(BinaryOp::Mod),
        "and" => binary(BinaryOp::And),
        "or" => binary(BinaryOp::Or),
        "xor" => binary(BinaryOp::Xor),
        "ls" => binary(BinaryOp::Shl),
        "rs" => binary(BinaryOp::Shr),
        "not" => Instruction::Not { dest: dest() },
        "gtr" => compare(CompareOp::Gtr),
        "lss" => compare(CompareOp::Lss),
        "geq" => compare(CompareOp::Geq),
        "leq" => compare(CompareOp::Leq),
        "equ" => compare(CompareOp::Equ),
        "neq" => compare(CompareOp::Neq),
        "jump" => Instruction::Jump {
            condition: operand(0),
            label: operand(1),
        },
        "label" => Instruction::Label(rest),
        "store" => Instruction::Store {
            key: operand(0),
            value: operand(1),
        },
        "pull" => Instruction::Pull {
            dest: dest(),
            key: operand(1),
        },
        "timestamp" => env(EnvField::Timestamp),
        "blocknumber" => env(EnvField::BlockNumber),
        "blockhash" => env(EnvField::BlockHash),
        "difficulty" => env(EnvField::Difficulty),
        "txvalue" => env(EnvField::TxValue),
        "txsender" => env(EnvField::TxSender),
        "txgas" => env(EnvField::TxGas),
        "txexecgas" => env(EnvField::TxExecGas),
        "address" => env(EnvField::Address),
        "selfbalance" => env(EnvField::SelfBalance),
        "gas" => env(EnvField::Gas),
        "balance" => Instruction::Balance {
            dest: dest(),
            address: operand(1),
        },
        "send" => Instruction::Send {
            target: operand(0),
            amount: operand(1),
        },
        "sha256" => Instruction::Sha256 {
            dest: dest(),
            value: operand(1),
        },
        "log" => Instruction::Log(operand(0)),
        "stop" if line == "stop" => Instruction::Stop,
        "revert" if line == "revert" => Instruction::Revert,
        _ => Instruction::Unknown(line.to_string()),
    }
}

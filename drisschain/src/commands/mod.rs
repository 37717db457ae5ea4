// Copyright (c) 2024 The Drisschain Developers

//! CLI command implementations.
//!
//! These modules implement the user-facing CLI commands and legitimately
//! use stdout for output.

#![allow(clippy::print_stdout)]

pub mod init;
pub mod run;
pub mod status;

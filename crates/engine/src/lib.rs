// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-engine: automation gate evaluation and the agent façade

pub mod agent;
pub mod cursor;
pub mod gate;

pub use agent::Agent;
pub use cursor::{max_seq_label, seq_label};
pub use gate::{evaluate, GateError, GateResult, GateStore};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-formula: on-disk automation definitions and the layered scanner

pub mod automation;
pub mod overrides;
pub mod scanner;

pub use automation::{parse_automation, Automation, GateKind, ScanError};
pub use overrides::{apply_overrides, AutomationOverride};
pub use scanner::{discover, filter_active, scan};

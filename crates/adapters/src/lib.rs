// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-adapters: session providers for the Gas City control plane
//!
//! One named session per agent, materialized on tmux, a bare local
//! process, a Kubernetes pod, or a user-supplied script. All backends
//! share the [`session::SessionProvider`] contract; `start` runs the
//! common startup orchestration in [`startup`].

pub mod session;
pub mod startup;
pub mod subprocess;

pub use session::kube::{ExecOutput, KubeConfig, KubeProvider, Kubectl, PodExec, PodInfo};
pub use session::local::LocalProvider;
pub use session::script::ScriptProvider;
pub use session::tmux::TmuxProvider;
pub use session::traced::TracedProvider;
pub use session::{SessionError, SessionProvider};
pub use startup::{run_startup, StartupOps};

#[cfg(any(test, feature = "test-support"))]
pub use session::fake::{FakeSession, FakeSessionProvider, ProviderCall};
#[cfg(any(test, feature = "test-support"))]
pub use session::kube::FakePodExec;
#[cfg(any(test, feature = "test-support"))]
pub use startup::fake::{FakeStartupOps, StartupCall};

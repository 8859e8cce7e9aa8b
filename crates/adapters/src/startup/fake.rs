// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake startup ops for orchestrator sequence tests
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ReadySpec, StartupOps};
use crate::session::SessionError;
use async_trait::async_trait;
use gc_core::SessionConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Recorded orchestrator call
#[derive(Debug, Clone, PartialEq)]
pub enum StartupCall {
    CreateSession { name: String },
    IsAgentAlive { name: String, process_names: Vec<String> },
    KillSession { name: String },
    WaitForCommand { name: String, process_names: Vec<String>, timeout: Duration },
    AcceptStartupDialogs { name: String },
    WaitForReady { name: String, ready: ReadySpec, timeout: Duration },
    HasSession { name: String },
    SendKeys { name: String, keys: Vec<String> },
    SetRemainOnExit { name: String },
    RunSetupCommand { name: String, command: String, env: HashMap<String, String> },
}

#[derive(Default)]
struct FakeState {
    create_results: VecDeque<Result<(), SessionError>>,
    agent_alive: bool,
    has_session: bool,
    calls: Vec<StartupCall>,
}

/// In-memory [`StartupOps`] with scriptable create results.
///
/// `create_session` pops queued results (default success); liveness
/// answers come from plain booleans. Every call is recorded so tests can
/// assert the exact orchestration sequence.
#[derive(Clone)]
pub struct FakeStartupOps {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeStartupOps {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                has_session: true,
                ..Default::default()
            })),
        }
    }
}

impl FakeStartupOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `create_session` call.
    pub fn push_create_result(&self, result: Result<(), SessionError>) {
        self.state.lock().create_results.push_back(result);
    }

    pub fn set_agent_alive(&self, alive: bool) {
        self.state.lock().agent_alive = alive;
    }

    pub fn set_has_session(&self, present: bool) {
        self.state.lock().has_session = present;
    }

    pub fn calls(&self) -> Vec<StartupCall> {
        self.state.lock().calls.clone()
    }

    /// Count of recorded calls matching the predicate.
    pub fn count(&self, predicate: impl Fn(&StartupCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl StartupOps for FakeStartupOps {
    async fn create_session(&self, name: &str, _cfg: &SessionConfig) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.calls.push(StartupCall::CreateSession {
            name: name.to_string(),
        });
        state.create_results.pop_front().unwrap_or(Ok(()))
    }

    async fn is_agent_alive(&self, name: &str, process_names: &[String]) -> bool {
        let mut state = self.state.lock();
        state.calls.push(StartupCall::IsAgentAlive {
            name: name.to_string(),
            process_names: process_names.to_vec(),
        });
        state.agent_alive
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        self.state.lock().calls.push(StartupCall::KillSession {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn wait_for_command(
        &self,
        name: &str,
        process_names: &[String],
        timeout: Duration,
    ) -> bool {
        self.state.lock().calls.push(StartupCall::WaitForCommand {
            name: name.to_string(),
            process_names: process_names.to_vec(),
            timeout,
        });
        true
    }

    async fn accept_startup_dialogs(&self, name: &str) {
        self.state
            .lock()
            .calls
            .push(StartupCall::AcceptStartupDialogs {
                name: name.to_string(),
            });
    }

    async fn wait_for_ready(&self, name: &str, ready: &ReadySpec, timeout: Duration) {
        self.state.lock().calls.push(StartupCall::WaitForReady {
            name: name.to_string(),
            ready: ready.clone(),
            timeout,
        });
    }

    async fn has_session(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        state.calls.push(StartupCall::HasSession {
            name: name.to_string(),
        });
        state.has_session
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        self.state.lock().calls.push(StartupCall::SendKeys {
            name: name.to_string(),
            keys: keys.to_vec(),
        });
        Ok(())
    }

    async fn set_remain_on_exit(&self, name: &str) -> Result<(), SessionError> {
        self.state.lock().calls.push(StartupCall::SetRemainOnExit {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn run_setup_command(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        self.state.lock().calls.push(StartupCall::RunSetupCommand {
            name: name.to_string(),
            command: command.to_string(),
            env: env.clone(),
        });
        Ok(())
    }
}

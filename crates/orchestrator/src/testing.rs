//! A scripted stand-in for the VPS used by this crate's tests.

use async_trait::async_trait;
use remote_session::{CommandError, ExecOutput, RemoteShell};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Response = Result<ExecOutput, CommandError>;

struct Rule {
    needle: String,
    responses: VecDeque<Response>,
}

/// Answers commands by substring match against registered rules.
///
/// Rules are checked in registration order. A rule with several responses hands them
/// out in turn and keeps repeating its last one. Unmatched commands succeed with empty
/// output. Every command text is recorded, and so is every `disconnect`.
#[derive(Default)]
pub struct ScriptedShell {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
}

pub fn ok(stdout: &str) -> Response {
    Ok(ExecOutput::success(stdout))
}

pub fn exit(code: u32, stderr: &str) -> Response {
    Ok(ExecOutput::failure(code, stderr))
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, needle: &str, response: Response) -> &Self {
        self.on_seq(needle, vec![response])
    }

    pub fn on_seq(&self, needle: &str, responses: Vec<Response>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Index of the first recorded call containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(needle))
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&self, command: &str) -> Result<ExecOutput, CommandError> {
        self.calls.lock().unwrap().push(command.to_string());

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| command.contains(&r.needle)) else {
            return Ok(ExecOutput::success(""));
        };
        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_else(|| Ok(ExecOutput::default()))
        } else {
            rule.responses.front().cloned().unwrap_or_else(|| Ok(ExecOutput::default()))
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// Needles for the commands built in `commands`.
pub const LIST: &str = "docker ps --format";
pub const CONTAINER_UP: &str = "docker ps -q";
pub const CONTAINER_STATUS: &str = "docker ps -a";
pub const DOCKER_START: &str = "docker start";
pub const DOCKER_STOP: &str = "docker stop";
pub const TASKLIST: &str = "tasklist";
pub const TASKKILL: &str = "taskkill";
pub const LAUNCH: &str = "--login";
pub const LOG: &str = "MQL5/Logs";
pub const LIST_SYMBOLS: &str = "--list-symbols";
pub const SELECT_SYMBOL: &str = "--symbol ";

pub const TERMINAL_RUNNING: &str = "terminal64.exe               1234 Console                    1    210,512 K";
pub const NO_TERMINAL: &str = "INFO: No tasks are running which match the specified criteria.";
pub const CONNECTED_LOG: &str = "2026.10.16 09:00:01 Network '5012345': Connection established\n";
pub const IDLE_LOG: &str = "2026.10.16 09:00:01 Terminal: started\n";

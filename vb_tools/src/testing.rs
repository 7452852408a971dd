//! Scripted executor for tool tests

use crate::ToolKit;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vb_config::ToolsConfig;
use vb_core::Result;
use vb_exec::{render_command_line, ExecOutput, ExecRequest, Executor};

type Responder = Box<dyn Fn(&ExecRequest) -> Result<ExecOutput> + Send + Sync>;

pub(crate) struct FakeExecutor {
    responder: Responder,
    calls: Mutex<Vec<ExecRequest>>,
}

impl FakeExecutor {
    pub(crate) fn new(
        responder: impl Fn(&ExecRequest) -> Result<ExecOutput> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<ExecRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput> {
        self.calls.lock().unwrap().push(request.clone());
        let mut output = (self.responder)(&request)?;
        output.command_line = render_command_line(&request.command, &request.args);
        Ok(output)
    }
}

/// Output of a command that exited with `code`
pub(crate) fn exited(stdout: &str, stderr: &str, code: i32) -> ExecOutput {
    ExecOutput {
        command_line: String::new(),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code: Some(code),
        output: if stdout.is_empty() { stderr } else { stdout }.to_string(),
        error: match code {
            0 => None,
            _ if !stderr.is_empty() => Some(stderr.to_string()),
            _ => Some(format!("Command exited with code {}", code)),
        },
        execution_time_ms: 5,
        timed_out: false,
        stdout_truncated: false,
        stderr_truncated: false,
    }
}

pub(crate) fn ok(stdout: &str) -> ExecOutput {
    exited(stdout, "", 0)
}

pub(crate) fn toolkit(executor: Arc<FakeExecutor>) -> ToolKit {
    ToolKit::new(executor, ToolsConfig::default())
}

//! External shell hooks run after probes.

use std::fmt;
use std::process::Stdio;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::Instrument;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("failed to execute hook: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("hook exited with {status}: {output}")]
    Exit { status: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    OnSuccess,
    OnFailure,
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookType::OnSuccess => f.write_str("on_success"),
            HookType::OnFailure => f.write_str("on_failure"),
        }
    }
}

/// Commands configured for a monitor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellHooks {
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
}

impl ShellHooks {
    pub fn command(&self, hook_type: HookType) -> Option<&str> {
        let command = match hook_type {
            HookType::OnSuccess => self.on_success.as_deref(),
            HookType::OnFailure => self.on_failure.as_deref(),
        };
        command.filter(|c| !c.is_empty())
    }
}

/// Positional arguments handed to every hook.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    pub command: String,
    pub monitor: String,
    pub component_id: Option<u32>,
    pub target: String,
    pub hook_type: HookType,
    pub data: String,
}

impl HookInvocation {
    /// Run the hook to completion.
    pub async fn run(&self) -> Result<(), HookError> {
        let output = Command::new(&self.command)
            .arg(&self.monitor)
            .arg(self.component_id.unwrap_or(0).to_string())
            .arg(&self.target)
            .arg(self.hook_type.to_string())
            .arg(&self.data)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(HookError::Exit {
                status: output.status.to_string(),
                output: text,
            });
        }

        Ok(())
    }

    /// Run the hook in the background; failures are only logged.
    pub fn spawn(self) {
        tracing::info!("Sending '{}' shellhook", self.hook_type);
        tracing::debug!("Data: {}", self.data);

        let span = tracing::Span::current();
        tokio::spawn(
            async move {
                if let Err(e) = self.run().await {
                    tracing::warn!("Error when processing shellhook '{}': {}", self.hook_type, e);
                }
            }
            .instrument(span),
        );
    }
}

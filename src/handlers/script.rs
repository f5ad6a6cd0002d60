// ABOUTME: Handlers and invite policy backed by user-configured executables
// ABOUTME: Scripts get the event as one JSON argument plus USERID/ROOMID/MESSAGE/VAR_* env vars

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nixbot_core::{
    AdmissionDecision, Handler, HandlerContext, Invite, InvitePolicy, VariableBag,
};
use serde::Serialize;
use tokio::process::Command;

use crate::process::{self, CommandOutput};

/// The single JSON argument passed to every script
#[derive(Debug, Serialize)]
pub struct ScriptArgs<'a> {
    #[serde(rename = "SenderID")]
    pub sender_id: &'a str,
    #[serde(rename = "RoomID")]
    pub room_id: &'a str,
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}

/// Text after the first space, or empty
pub fn message_strip(message: &str) -> &str {
    message.split_once(' ').map(|(_, rest)| rest).unwrap_or("")
}

/// Environment handed to a script for one message
pub fn script_env(
    sender: &str,
    room_id: &str,
    message: &str,
    vars: &VariableBag,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("USERID".to_string(), sender.to_string()),
        ("ROOMID".to_string(), room_id.to_string()),
        ("MESSAGE".to_string(), message.to_string()),
        ("MESSAGE_STRIP".to_string(), message_strip(message).to_string()),
    ];
    let mut captured: Vec<(&str, &str)> = vars.iter().collect();
    captured.sort();
    env.extend(
        captured
            .into_iter()
            .map(|(name, value)| (format!("VAR_{}", name.to_uppercase()), value.to_string())),
    );
    env
}

async fn run_script(
    script: &Path,
    args: &ScriptArgs<'_>,
    env: Vec<(String, String)>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let json = serde_json::to_string(args).context("Failed to encode script arguments")?;
    let mut cmd = Command::new(script);
    cmd.arg(json).envs(env);
    process::run(cmd, None, timeout).await
}

/// Routes a pattern to an external executable and replies with its stdout
pub struct ScriptHandler {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptHandler {
    pub fn new(script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let message = cx.event.body.trim();
        let args = ScriptArgs {
            sender_id: cx.sender(),
            room_id: cx.room_id(),
            message: Some(message),
        };
        let env = script_env(cx.sender(), cx.room_id(), message, &cx.vars);

        let output = run_script(&self.script, &args, env, self.timeout).await?;
        if !output.success() {
            tracing::error!(
                script = %self.script.display(),
                status = %output.status,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Script handler failed"
            );
            anyhow::bail!(
                "{} exited with {}: {}",
                self.script.display(),
                output.status,
                output.stderr.trim()
            );
        }

        if output.stdout.trim().is_empty() {
            tracing::debug!(script = %self.script.display(), "Script produced no output");
            return Ok(());
        }
        cx.reply.send_formatted(&output.stdout).await
    }
}

/// Invite policy that asks a script: exit status 0 accepts the invite
pub struct ScriptPolicy {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptPolicy {
    pub fn new(script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            timeout,
        }
    }
}

#[async_trait]
impl InvitePolicy for ScriptPolicy {
    async fn evaluate(&self, invite: &Invite) -> Result<AdmissionDecision> {
        let args = ScriptArgs {
            sender_id: &invite.sender,
            room_id: &invite.room_id,
            message: None,
        };
        let env = vec![
            ("USERID".to_string(), invite.sender.clone()),
            ("ROOMID".to_string(), invite.room_id.clone()),
        ];

        let output = run_script(&self.script, &args, env, self.timeout).await?;
        if output.success() {
            Ok(AdmissionDecision::accept())
        } else {
            Ok(AdmissionDecision::reject(format!(
                "join script exited with {}: {}",
                output.status,
                output.stderr.trim()
            )))
        }
    }
}

//! Subprocess-backed agent session.
//!
//! Spawns the configured runtime executable and exchanges line-delimited
//! JSON over its stdio: a writer task feeds stdin from a command channel,
//! a reader task parses stdout into [`AgentEvent`]s and broadcasts them,
//! and stderr is drained into the log.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::config::{AgentSettings, PathSettings};

use super::logger::ConversationLogger;
use super::prompt::build_system_prompt;
use super::types::{AgentCommand, AgentEvent};
use super::{AgentConnector, AgentSession, SessionContext};

/// Buffer size for the event broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Buffer size for the command channel.
const COMMAND_BUFFER_SIZE: usize = 64;

/// Spawns one agent subprocess per chat connection.
pub struct ProcessConnector {
    agent: AgentSettings,
    paths: PathSettings,
}

impl ProcessConnector {
    pub fn new(agent: AgentSettings, paths: PathSettings) -> Self {
        Self { agent, paths }
    }
}

#[async_trait]
impl AgentConnector for ProcessConnector {
    async fn open(&self, ctx: SessionContext) -> Result<Box<dyn AgentSession>> {
        let system_prompt = build_system_prompt(&self.paths, ctx.timezone.as_deref());
        let logger = ConversationLogger::new(&self.paths.log_dir())
            .context("creating conversation logger")?;
        logger.log("system_prompt", serde_json::json!({ "prompt": system_prompt }));

        let session = ProcessSession::spawn(&self.agent, logger)?;
        session
            .send_command(AgentCommand::Init {
                system_prompt,
                model: self.agent.model.clone(),
                max_thinking_tokens: self.agent.max_thinking_tokens,
            })
            .await?;
        Ok(Box::new(session))
    }
}

/// A running agent subprocess.
pub struct ProcessSession {
    command_tx: mpsc::Sender<String>,
    event_tx: broadcast::Sender<AgentEvent>,
    child: Mutex<Option<Child>>,
    logger: Arc<ConversationLogger>,
}

impl ProcessSession {
    fn spawn(settings: &AgentSettings, logger: ConversationLogger) -> Result<Self> {
        let mut child = Command::new(&settings.command)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning agent runtime `{}`", settings.command))?;

        let stdin = child.stdin.take().context("agent runtime has no stdin")?;
        let stdout = child.stdout.take().context("agent runtime has no stdout")?;

        let (command_tx, command_rx) = mpsc::channel::<String>(COMMAND_BUFFER_SIZE);
        let (event_tx, _) = broadcast::channel::<AgentEvent>(EVENT_BUFFER_SIZE);
        let logger = Arc::new(logger);

        tokio::spawn(stdin_writer_task(stdin, command_rx));
        tokio::spawn(stdout_reader_task(
            stdout,
            event_tx.clone(),
            logger.clone(),
        ));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(stderr_reader_task(stderr));
        }

        info!("agent runtime started (pid {:?})", child.id());
        Ok(Self {
            command_tx,
            event_tx,
            child: Mutex::new(Some(child)),
            logger,
        })
    }

    async fn send_command(&self, command: AgentCommand) -> Result<()> {
        let json = serde_json::to_string(&command).context("serializing agent command")?;
        self.command_tx
            .send(json)
            .await
            .context("agent runtime stdin closed")
    }
}

#[async_trait]
impl AgentSession for ProcessSession {
    async fn prompt(&self, text: &str) -> Result<()> {
        self.logger
            .log("user_message", serde_json::json!({ "text": text }));
        self.send_command(AgentCommand::Prompt {
            text: text.to_string(),
        })
        .await
    }

    async fn resolve_permission(&self, id: &str, allowed: bool) -> Result<()> {
        let message = (!allowed).then(|| "User declined the request".to_string());
        self.send_command(AgentCommand::PermissionResponse {
            id: id.to_string(),
            allowed,
            message,
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    async fn shutdown(&self) {
        let _ = self.send_command(AgentCommand::Shutdown).await;
        if let Some(mut child) = self.child.lock().await.take() {
            tokio::spawn(async move {
                match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                    Ok(Ok(status)) => info!("agent runtime exited: {}", status),
                    Ok(Err(err)) => warn!("waiting on agent runtime: {}", err),
                    Err(_) => {
                        warn!("agent runtime did not exit; killing");
                        let _ = child.kill().await;
                    }
                }
            });
        }
    }
}

async fn stdin_writer_task(
    mut stdin: tokio::process::ChildStdin,
    mut command_rx: mpsc::Receiver<String>,
) {
    while let Some(command) = command_rx.recv().await {
        let line = format!("{}\n", command);
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            error!("failed to write to agent stdin: {}", err);
            break;
        }
        if let Err(err) = stdin.flush().await {
            error!("failed to flush agent stdin: {}", err);
            break;
        }
    }
}

async fn stdout_reader_task(
    stdout: tokio::process::ChildStdout,
    event_tx: broadcast::Sender<AgentEvent>,
    logger: Arc<ConversationLogger>,
) {
    let reader = BufReader::new(stdout);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match AgentEvent::parse_line(&line) {
            Some(Ok(event)) => {
                logger.log_event(&event);
                let _ = event_tx.send(event);
            }
            Some(Err(err)) => {
                // One corrupt line must not tear down the session.
                let display: String = line.chars().take(200).collect();
                warn!("failed to parse agent event: {} (line: {})", err, display);
            }
            None => {}
        }
    }

    info!("agent stdout closed");
    // Surface stream end so an open turn does not hang forever.
    let _ = event_tx.send(AgentEvent::Fatal {
        message: "agent runtime exited unexpectedly".to_string(),
    });
}

async fn stderr_reader_task(stderr: tokio::process::ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            warn!("agent stderr: {}", line);
        }
    }
}

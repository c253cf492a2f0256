//! Interactive terminal chat.
//!
//! A thin readline front end over the [`crate::client`] transport and
//! transcript. Streamed text prints as it arrives; thinking and tool
//! traffic render only in dev mode. `exit` asks the agent to update its
//! running context note before the session ends.

use std::io::Write as _;

use anyhow::Result;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};

use donna_protocol::ChatEvent;

use crate::client::{ChatTransport, Transcript, TransportConfig, TransportSignal};
use crate::config::Settings;

const CONTEXT_UPDATE_PROMPT: &str = "I'm heading out. Please update current_context.md \
with anything worth remembering from this conversation, then say a brief goodbye.";

/// Command-line overrides for a chat session.
#[derive(Debug, Default)]
pub struct ChatOptions {
    pub server_url: Option<String>,
    pub timezone: Option<String>,
    pub token: Option<String>,
    pub dev_mode: Option<bool>,
}

pub async fn run(settings: &Settings, opts: ChatOptions) -> Result<()> {
    let client = &settings.client;
    let mut config = TransportConfig::new(
        opts.server_url
            .unwrap_or_else(|| client.server_url.clone()),
    );
    config.timezone = opts.timezone.or_else(|| client.timezone.clone());
    config.token = opts.token.or_else(|| settings.auth.token.clone());
    config.reconnect_delay = client.reconnect_delay();
    let dev_mode = opts.dev_mode.unwrap_or(client.dev_mode);

    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exiting = false;

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(TransportSignal::Connected) => {
                    println!("· connected");
                }
                Some(TransportSignal::Event(event)) => {
                    render_event(&event, dev_mode);
                    let turn_ended = matches!(
                        event,
                        ChatEvent::SessionEnd { .. } | ChatEvent::Error { .. }
                    );
                    transcript.apply(event);
                    if turn_ended {
                        if exiting {
                            break;
                        }
                        prompt_user(&transcript);
                    }
                }
                Some(TransportSignal::Disconnected { reconnecting }) => {
                    transcript.finalize_on_disconnect();
                    if reconnecting {
                        println!("\n· connection lost, retrying");
                    } else {
                        break;
                    }
                }
                Some(TransportSignal::AuthRequired) => {
                    eprintln!("authentication required: configure auth.token or pass --token");
                    break;
                }
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // stdin closed
                    if exiting {
                        break;
                    }
                    exiting = true;
                    let cmd = transcript.push_user_message(CONTEXT_UPDATE_PROMPT, dev_mode);
                    transport.send(cmd).await;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match classify_input(line, transcript.pending_permission().is_some()) {
                    InputAction::Permission(allowed) => {
                        if let Some(cmd) = transcript.resolve_permission(allowed) {
                            transport.send(cmd).await;
                        }
                    }
                    InputAction::AskPermissionAgain => {
                        print!("allow? [y/N] ");
                        let _ = std::io::stdout().flush();
                    }
                    InputAction::Exit => {
                        exiting = true;
                        let cmd = transcript.push_user_message(CONTEXT_UPDATE_PROMPT, dev_mode);
                        transport.send(cmd).await;
                    }
                    InputAction::Message => {
                        debug!("sending user message ({} chars)", line.len());
                        let cmd = transcript.push_user_message(line, dev_mode);
                        transport.send(cmd).await;
                    }
                }
            }
        }
    }

    transport.disconnect().await;
    println!();
    Ok(())
}

fn prompt_user(transcript: &Transcript) {
    if let Some(stats) = transcript.last_stats() {
        let mut parts = Vec::new();
        if let Some(turns) = stats.turns {
            parts.push(format!("{turns} turns"));
        }
        if let Some(ms) = stats.duration_ms {
            parts.push(format!("{:.1}s", ms as f64 / 1000.0));
        }
        if let Some(cost) = stats.cost_usd {
            parts.push(format!("${cost:.4}"));
        }
        if !parts.is_empty() {
            println!("\n· {}", parts.join(", "));
        }
    }
    print!("\nyou> ");
    let _ = std::io::stdout().flush();
}

fn render_event(event: &ChatEvent, dev_mode: bool) {
    match event {
        ChatEvent::Text { content } => {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::Thinking { content } if dev_mode => {
            print!("\x1b[2m{content}\x1b[0m");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::ToolUse { name, input, .. } if dev_mode => {
            println!("\n\x1b[2m[tool] {name} {input}\x1b[0m");
        }
        ChatEvent::ToolResult { content, is_error, .. } if dev_mode => {
            let marker = if *is_error { "[tool error]" } else { "[tool ok]" };
            println!("\x1b[2m{marker} {}\x1b[0m", truncate(content, 200));
        }
        ChatEvent::PermissionRequest { tool, input } => {
            println!("\ndonna wants to use {tool}: {input}");
            print!("allow? [y/N] ");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::GreetingStart => {
            println!("donna>");
        }
        ChatEvent::Error { message } => {
            eprintln!("\nerror: {message}");
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputAction {
    Permission(bool),
    AskPermissionAgain,
    Exit,
    Message,
}

/// While a permission request is open, only a yes/no answer is accepted.
/// Anything else re-prompts instead of reaching the agent as a message.
fn classify_input(line: &str, permission_pending: bool) -> InputAction {
    if permission_pending {
        return match parse_yes_no(line) {
            Some(allowed) => InputAction::Permission(allowed),
            None => InputAction::AskPermissionAgain,
        };
    }
    if line == "exit" || line == "quit" {
        return InputAction::Exit;
    }
    InputAction::Message
}

fn parse_yes_no(line: &str) -> Option<bool> {
    match line.to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

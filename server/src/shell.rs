//! Line-oriented admin commands
//!
//! Lines come from Command messages and from the server console. Each line
//! is split on whitespace; the first word selects the command.

use crate::context::ServerContext;
use log::{info, warn};
use shared::ClientId;
use std::collections::BTreeMap;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub type CommandFn = fn(&[&str], &mut ServerContext) -> Result<String, ShellError>;

struct Command {
    usage: &'static str,
    run: CommandFn,
}

pub struct Shell {
    commands: BTreeMap<&'static str, Command>,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut shell = Self::new();
        shell.register("players", "players", players);
        shell.register("kick", "kick <client id>", kick);
        shell.register("save", "save", save);
        shell.register("terminate", "terminate", terminate);
        shell
    }

    /// First registration for a name wins
    pub fn register(&mut self, name: &'static str, usage: &'static str, run: CommandFn) -> bool {
        if self.commands.contains_key(name) {
            warn!("Command '{}' already registered", name);
            return false;
        }
        self.commands.insert(name, Command { usage, run });
        true
    }

    pub fn execute(&self, line: &str, ctx: &mut ServerContext) -> Result<String, ShellError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (name, args) = words.split_first().ok_or(ShellError::Empty)?;

        if *name == "help" {
            return Ok(self.usage());
        }
        let command = self
            .commands
            .get(*name)
            .ok_or_else(|| ShellError::Unknown(name.to_string()))?;
        (command.run)(args, ctx)
    }

    /// Executes every queued console line in arrival order
    pub fn run_pending(&self, ctx: &mut ServerContext) {
        for line in std::mem::take(&mut ctx.console) {
            match self.execute(&line, ctx) {
                Ok(output) if output.is_empty() => info!("> {}", line),
                Ok(output) => info!("> {}\n{}", line, output),
                Err(e) => warn!("> {}: {}", line, e),
            }
        }
    }

    fn usage(&self) -> String {
        let mut out = String::from("commands:\n  help");
        for command in self.commands.values() {
            let _ = write!(out, "\n  {}", command.usage);
        }
        out
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn players(_: &[&str], ctx: &mut ServerContext) -> Result<String, ShellError> {
    let mut out = format!("{} connected", ctx.sessions.len());
    for session in ctx.sessions.iter() {
        let account = session.account.as_deref().unwrap_or("-");
        let _ = write!(out, "\n  {} {} account={}", session.id, session.remote_addr, account);
        if let Some(position) = ctx.world.positions.get(&session.id) {
            let _ = write!(
                out,
                " at ({:.1}, {:.1}) instance {}",
                position.x, position.y, position.instance_id
            );
        }
        if session.pending_disconnect {
            out.push_str(" (leaving)");
        }
    }
    Ok(out)
}

fn kick(args: &[&str], ctx: &mut ServerContext) -> Result<String, ShellError> {
    let id = match args {
        [raw] => raw
            .trim_start_matches('#')
            .parse::<u32>()
            .map(ClientId)
            .map_err(|_| ShellError::Usage("kick <client id>"))?,
        _ => return Err(ShellError::Usage("kick <client id>")),
    };
    if !ctx.sessions.contains(id) {
        return Ok(format!("no client {}", id));
    }
    ctx.request_disconnect(id);
    Ok(format!("kicked {}", id))
}

fn save(_: &[&str], ctx: &mut ServerContext) -> Result<String, ShellError> {
    let saved = ctx.persist_all();
    Ok(format!("saved {} entities", saved))
}

fn terminate(_: &[&str], ctx: &mut ServerContext) -> Result<String, ShellError> {
    ctx.running = false;
    Ok("shutting down".to_string())
}

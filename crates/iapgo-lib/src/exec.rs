//! Post-ready command execution

use std::io;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the active local port to the command.
pub const LISTEN_PORT_ENV: &str = "IAPGO_LISTEN_PORT";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exec command is empty")]
    EmptyCommand,

    #[error("Failed to run command {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Failed waiting for command: {0}")]
    Wait(#[source] io::Error),
}

/// Run `args` with [`LISTEN_PORT_ENV`] set to `port` and wait for it to exit.
///
/// The variable is set on the child only. Standard streams are inherited and
/// the child is killed if the returned future is dropped.
pub async fn run_command(args: &[String], port: u16) -> Result<ExitStatus, ExecError> {
    let (program, rest) = args.split_first().ok_or(ExecError::EmptyCommand)?;
    debug!(program = %program, args = ?rest, port, "running command");

    let mut child = Command::new(program)
        .args(rest)
        .env(LISTEN_PORT_ENV, port.to_string())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    child.wait().await.map_err(ExecError::Wait)
}

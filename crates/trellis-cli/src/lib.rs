//! Embeddable administration commands for extension deployments.
//!
//! Hosts wire these commands into their own binaries: extension providers
//! are host code, so the host constructs the
//! [`trellis_extensions::ExtensionManager`], registers its providers, and
//! hands the manager to [`run_host`] together with the raw command-line
//! arguments. [`run_host`] also brings up telemetry from the host
//! configuration; [`run`] skips that for hosts that install their own
//! subscriber. Output streams are injected so tests can capture them.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::debug;

use trellis_config::Config;
use trellis_extensions::{ExtensionManager, MediaInstallOutcome};

mod cli;
pub mod telemetry;

pub use cli::{Cli, CliCommand};

/// Tracing target for command execution.
const CLI_TARGET: &str = "trellis_cli";

/// Parses `args` and runs the selected administration command against
/// `manager`, writing results to the injected streams.
pub fn run<I, T, W, E>(manager: &ExtensionManager, args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    dispatch(manager, args, stdout, stderr).unwrap_or(ExitCode::FAILURE)
}

/// Initialises telemetry from the host configuration, then runs the
/// selected administration command like [`run`].
///
/// A telemetry failure (typically an invalid `log_filter`) is reported on
/// `stderr` and fails the command before any arguments are parsed.
pub fn run_host<I, T, W, E>(
    config: &Config,
    manager: &ExtensionManager,
    args: I,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    host_dispatch(config, manager, args, stdout, stderr).unwrap_or(ExitCode::FAILURE)
}

fn host_dispatch<I, T, W, E>(
    config: &Config,
    manager: &ExtensionManager,
    args: I,
    stdout: &mut W,
    stderr: &mut E,
) -> io::Result<ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    match telemetry::initialise(config) {
        Ok(handle) => {
            debug!(
                target: CLI_TARGET,
                format = %handle.format(),
                "telemetry initialised"
            );
        }
        Err(telemetry_error) => {
            writeln!(stderr, "{telemetry_error}")?;
            return Ok(ExitCode::FAILURE);
        }
    }
    dispatch(manager, args, stdout, stderr)
}

fn dispatch<I, T, W, E>(
    manager: &ExtensionManager,
    args: I,
    stdout: &mut W,
    stderr: &mut E,
) -> io::Result<ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let parsed = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => {
            return if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                writeln!(stdout, "{error}")?;
                Ok(ExitCode::SUCCESS)
            } else {
                writeln!(stderr, "{error}")?;
                Ok(ExitCode::FAILURE)
            };
        }
    };

    match parsed.command {
        CliCommand::InstallMedia {
            extension_id,
            force,
        } => install_media(manager, extension_id.as_deref(), force, stdout, stderr),
        CliCommand::List => list_extensions(manager, stdout),
    }
}

/// Installs media for one extension or for every enabled extension,
/// reporting each outcome. One extension's failure does not stop the rest;
/// the exit code reflects whether any install failed.
fn install_media<W: Write, E: Write>(
    manager: &ExtensionManager,
    extension_id: Option<&str>,
    force: bool,
    stdout: &mut W,
    stderr: &mut E,
) -> io::Result<ExitCode> {
    let results = match extension_id {
        Some(id) => vec![(id.to_owned(), manager.install_extension_media(id, force))],
        None => manager.install_all_media(force),
    };

    let mut failed = false;
    for (id, result) in results {
        match result {
            Ok(MediaInstallOutcome::Installed) => {
                writeln!(stdout, "installed media for '{id}'")?;
            }
            Ok(MediaInstallOutcome::UpToDate) => {
                writeln!(stdout, "media for '{id}' is already current")?;
            }
            Ok(MediaInstallOutcome::Disabled) => {
                writeln!(stdout, "media management is disabled; skipped '{id}'")?;
            }
            Err(error) => {
                failed = true;
                writeln!(stderr, "failed to install media for '{id}': {error}")?;
            }
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Lists discoverable extensions with their enabled state and any retained
/// load errors.
fn list_extensions<W: Write>(manager: &ExtensionManager, stdout: &mut W) -> io::Result<ExitCode> {
    let load_errors = manager.load_errors();
    for id in manager.installed_extension_ids() {
        let status = if manager.is_extension_enabled(&id) {
            "enabled"
        } else {
            "disabled"
        };
        writeln!(stdout, "{id} ({status})")?;
    }
    for (id, message) in &load_errors {
        writeln!(stdout, "{id}: load error: {message}")?;
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests;

//! SBS battery pack maintenance CLI
//!
//! A command-line tool for talking to Smart Battery System (SBS) compliant
//! battery packs over a Linux `i2c-dev` bus.
//!
//! This tool allows users to:
//! - Read the full diagnostic register set (voltages, capacities, state of
//!   charge, status flags, temperature, current).
//! - Read the vendor serial number string.
//! - Send the vendor two-part unseal key to unlock protected controller
//!   memory.
//! - Clear the latched permanent-failure (PF) flag.
//! - Run the combined repair sequence: repeated unseal and PF-clear bursts
//!   with retries and inter-command delays.
//!
//! The CLI leverages the `sbspack_lib` crate for protocol definitions and
//! client operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use sbspack_lib::{
    client::SbsClient,
    protocol as proto,
    sequencer::{self, MaintenanceCommand, MaintenanceConfig, RetryPolicy},
    transport::EhalBus,
};
use std::io::stdout;
use std::{panic, time::Duration};

mod commandline;

type Client = SbsClient<EhalBus<linux_embedded_hal::I2cdev>>;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// A zero timeout on the command line means "no timeout".
fn timeout_option(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

fn retry_policy(args: &commandline::CliArgs) -> RetryPolicy {
    RetryPolicy {
        attempts: args.retries,
        backoff: args.backoff,
    }
}

/// Prompts the user before commands that alter protected controller state.
fn confirm_maintenance() -> Result<bool> {
    println!(
        "WARNING: Unsealing uses a vendor-specific key and clearing the \
         permanent-failure flag alters protected controller state."
    );
    println!(
        "Only run this on a pack you own and are prepared to lose. A pack \
         that latched the PF flag for a real fault may be unsafe to reuse."
    );
    Confirm::new()
        .with_prompt("Do you want to continue with this understanding?")
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

/// Sends both unseal key halves, with the configured retry policy and the
/// inter-command delay between them.
fn handle_unseal(client: &mut Client, delay: Duration, retry: &RetryPolicy) -> Result<()> {
    info!("Executing: Unseal");
    let first = sequencer::send_with_retry(
        client,
        MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_1),
        retry,
    );
    std::thread::sleep(delay);
    let second = sequencer::send_with_retry(
        client,
        MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_2),
        retry,
    );
    if !(first && second) {
        bail!(
            "unseal key was not acknowledged by {} after {} attempts",
            client.address(),
            retry.attempts
        );
    }
    println!("Unseal key sent to {}.", client.address());
    Ok(())
}

fn handle_clear_pf(client: &mut Client, retry: &RetryPolicy) -> Result<()> {
    info!("Executing: Clear PF flag");
    if !confirm_maintenance()? {
        info!("PF clear aborted by user.");
        return Ok(());
    }
    if !sequencer::send_with_retry(client, MaintenanceCommand::ClearPermanentFailure, retry) {
        bail!(
            "PF clear command was not acknowledged by {} after {} attempts",
            client.address(),
            retry.attempts
        );
    }
    println!("PF clear command sent to {}.", client.address());
    Ok(())
}

fn handle_repair(client: &mut Client, config: &MaintenanceConfig) -> Result<()> {
    info!(
        "Executing: Repair sequence ({} passes, {:?} step delay)",
        config.iterations, config.step_delay
    );
    if !confirm_maintenance()? {
        info!("Repair sequence aborted by user.");
        return Ok(());
    }

    // A quick read up front confirms the pack is actually responding
    // before we start hammering it with maintenance commands.
    match client.voltage() {
        Ok(voltage) => info!("Pack responding, voltage {voltage} V"),
        Err(error) => warn!("Pack did not answer a voltage read: {error}"),
    }

    sequencer::run_maintenance(client, config);
    println!(
        "Maintenance sequence complete ({} passes). Check the log for \
         commands that were not acknowledged.",
        config.iterations
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "packmend started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let bus = sbspack_lib::linux::open(&args.device)
        .with_context(|| format!("Cannot open I2C bus device {}", args.device))?;
    let mut client = SbsClient::new(bus, args.address);
    client.set_read_timeout(timeout_option(args.timeout));
    info!(
        "Connected to bus {} (pack address {})",
        args.device, args.address
    );

    let retry = retry_policy(&args);
    match &args.command {
        commandline::CliCommands::Read => {
            info!("Executing: Read diagnostics");
            sequencer::run_diagnostics(&mut client, &mut stdout())
                .context("Cannot write battery information")?;
        }
        commandline::CliCommands::Serial => {
            info!("Executing: Read serial number");
            let serial = client
                .serial_number()
                .context("Cannot read pack serial number")?;
            println!("Serial Number: {serial}");
        }
        commandline::CliCommands::Unseal => {
            handle_unseal(&mut client, args.delay, &retry)?;
        }
        commandline::CliCommands::ClearPf => {
            handle_clear_pf(&mut client, &retry)?;
        }
        commandline::CliCommands::Repair { iterations } => {
            let config = MaintenanceConfig {
                iterations: *iterations,
                step_delay: args.delay,
                retry,
            };
            handle_repair(&mut client, &config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_the_deadline() {
        assert_eq!(timeout_option(Duration::ZERO), None);
        assert_eq!(
            timeout_option(Duration::from_millis(200)),
            Some(Duration::from_millis(200))
        );
    }
}

//! Orchestration of the diagnostic read-out and the maintenance bursts.
//!
//! The sequences are linear: a one-shot diagnostic phase that prints every
//! register of interest to a report sink, and a maintenance phase that
//! repeats unseal-key / permanent-failure-clear bursts. Individual failures
//! are logged and never abort a sequence; retry counts and delays are
//! explicit configuration so tests can run without waiting.

use crate::client::SbsClient;
use crate::protocol as proto;
use crate::transport::Wire;
use log::{info, warn};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// Bounded retry configuration for a single maintenance command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Configuration for the maintenance phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceConfig {
    /// Number of unseal / PF-clear passes.
    pub iterations: u32,
    /// Pause after each command within a pass.
    pub step_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            step_delay: Duration::from_secs(3),
            retry: RetryPolicy::default(),
        }
    }
}

/// A maintenance command the retry sub-protocol can transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceCommand {
    /// One half of the two-part unseal key.
    UnsealKey(u16),
    /// The permanent-failure flag clear command.
    ClearPermanentFailure,
}

impl fmt::Display for MaintenanceCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MaintenanceCommand::UnsealKey(key) => write!(f, "unseal command (0x{key:04X})"),
            MaintenanceCommand::ClearPermanentFailure => write!(f, "PF clear command"),
        }
    }
}

/// Transmits `command`, retrying per `retry` on transport failure.
///
/// Returns `true` as soon as one attempt is acknowledged. When every
/// attempt fails the exhaustion is logged and `false` returned; callers
/// that follow the original firmware behaviour ignore the result and
/// proceed.
pub fn send_with_retry<B: Wire>(
    client: &mut SbsClient<B>,
    command: MaintenanceCommand,
    retry: &RetryPolicy,
) -> bool {
    for attempt in 1..=retry.attempts {
        let result = match command {
            MaintenanceCommand::UnsealKey(key) => client.send_word(key),
            MaintenanceCommand::ClearPermanentFailure => {
                client.send_command(proto::CLEAR_PF_COMMAND)
            }
        };
        match result {
            Ok(()) => {
                info!("sent {command} to address {}", client.address());
                return true;
            }
            Err(error) => {
                warn!(
                    "error sending {command} (attempt {attempt}/{}): {error}",
                    retry.attempts
                );
                if attempt < retry.attempts {
                    std::thread::sleep(retry.backoff);
                }
            }
        }
    }
    warn!(
        "{command} to address {} not acknowledged after {} attempts, continuing",
        client.address(),
        retry.attempts
    );
    false
}

/// Runs the maintenance phase: `iterations` passes of key part 1, key
/// part 2 and PF clear, each followed by the step delay.
pub fn run_maintenance<B: Wire>(client: &mut SbsClient<B>, config: &MaintenanceConfig) {
    for iteration in 1..=config.iterations {
        info!("maintenance pass {iteration}/{}", config.iterations);
        send_with_retry(
            client,
            MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_1),
            &config.retry,
        );
        std::thread::sleep(config.step_delay);
        send_with_retry(
            client,
            MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_2),
            &config.retry,
        );
        std::thread::sleep(config.step_delay);
        send_with_retry(client, MaintenanceCommand::ClearPermanentFailure, &config.retry);
        std::thread::sleep(config.step_delay);
    }
}

fn report<T: fmt::Display>(
    out: &mut dyn Write,
    label: &str,
    result: crate::Result<T>,
) -> io::Result<()> {
    match result {
        Ok(value) => writeln!(out, "{label}: {value}"),
        Err(error) => {
            warn!("{error}");
            writeln!(out, "{label}: {error}")
        }
    }
}

/// Runs the diagnostic phase once, writing one `"<Label>: <value>"` line
/// per metric to `out`.
///
/// The order matters only for readability; every read is an independent
/// transaction and a failed one prints an error line in place of the value
/// without stopping the sequence.
pub fn run_diagnostics<B: Wire>(
    client: &mut SbsClient<B>,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "Reading battery information...")?;
    report(out, "Serial Number", client.serial_number())?;
    report(out, "Cycle Count", client.cycle_count())?;
    report(out, "Voltage", client.voltage())?;
    report(out, "Design Capacity", client.design_capacity())?;
    report(out, "Design Voltage", client.design_voltage())?;
    report(out, "Manufacture Date (D.M.Y)", client.manufacture_date())?;
    report(out, "State of Health", client.state_of_health())?;
    report(out, "Full Charge Capacity", client.full_charge_capacity())?;
    report(out, "Remaining Capacity", client.remaining_capacity())?;
    report(
        out,
        "Relative State of Charge (%)",
        client.relative_state_of_charge(),
    )?;
    report(
        out,
        "Absolute State of Charge (%)",
        client.absolute_state_of_charge(),
    )?;
    report(
        out,
        "Minutes remaining for full charge",
        client.time_to_full(),
    )?;
    report(out, "Cell 1 Voltage", client.cell1_voltage())?;
    report(out, "Cell 2 Voltage", client.cell2_voltage())?;
    report(out, "State of Health", client.state_of_health())?;
    report(out, "Battery Mode (BIN)", client.battery_mode())?;
    report(out, "Battery Status (BIN)", client.battery_status())?;
    report(out, "Charging Current", client.charging_current())?;
    report(out, "Charging Voltage", client.charging_voltage())?;
    report(out, "Temperature", client.temperature())?;
    report(out, "Current (mA)", client.current())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedWire;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    fn client(wire: ScriptedWire) -> SbsClient<ScriptedWire> {
        let mut client = SbsClient::new(wire, proto::DeviceAddress::default());
        client.set_settle_delay(Duration::ZERO);
        client
    }

    #[test]
    fn send_succeeds_first_try_without_retrying() {
        let mut client = client(ScriptedWire::new());
        let sent = send_with_retry(
            &mut client,
            MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_1),
            &fast_retry(),
        );
        assert!(sent);
        assert_eq!(client.into_inner().attempts, 1);
    }

    #[test]
    fn send_retries_until_the_transport_recovers() {
        for failures in 1..=2 {
            let mut client = client(ScriptedWire::failing(failures));
            let sent = send_with_retry(
                &mut client,
                MaintenanceCommand::ClearPermanentFailure,
                &fast_retry(),
            );
            assert!(sent);
            assert_eq!(client.into_inner().attempts, failures + 1);
        }
    }

    #[test]
    fn send_gives_up_after_the_configured_attempts() {
        let mut client = client(ScriptedWire::always_failing());
        let sent = send_with_retry(
            &mut client,
            MaintenanceCommand::UnsealKey(proto::UNSEAL_KEY_2),
            &fast_retry(),
        );
        assert!(!sent);
        assert_eq!(client.into_inner().attempts, 3);
    }

    #[test]
    fn maintenance_continues_after_exhausted_retries() {
        let mut client = client(ScriptedWire::always_failing());
        let config = MaintenanceConfig {
            iterations: 2,
            step_delay: Duration::ZERO,
            retry: fast_retry(),
        };
        run_maintenance(&mut client, &config);
        // 2 passes x 3 commands x 3 attempts, none fatal.
        assert_eq!(client.into_inner().attempts, 18);
    }

    #[test]
    fn maintenance_sends_the_burst_in_order() {
        let mut client = client(ScriptedWire::new());
        let config = MaintenanceConfig {
            iterations: 1,
            step_delay: Duration::ZERO,
            retry: fast_retry(),
        };
        run_maintenance(&mut client, &config);
        assert_eq!(
            client.into_inner().transmissions,
            vec![
                (0x0B, vec![0xCC, 0xDF]),
                (0x0B, vec![0x7E, 0xE0]),
                (0x0B, vec![0x42]),
            ]
        );
    }

    #[test]
    fn diagnostics_print_one_labelled_line_per_metric() {
        let mut wire = ScriptedWire::new();
        wire.respond(b"\x07DJI-001"); // pack serial
        wire.respond(&[0x2A, 0x00]); // cycle count 42
        wire.respond(&[0x00, 0x40]); // voltage 16384 mV
        // Every following read falls back to zeroed words.
        let mut client = client(wire);

        let mut out = Vec::new();
        run_diagnostics(&mut client, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Serial Number: DJI-001"), "{text}");
        assert!(text.contains("Cycle Count: 42"), "{text}");
        assert!(text.contains("Voltage: 16.384"), "{text}");
        assert!(text.contains("Manufacture Date (D.M.Y): 0.0.1980"), "{text}");
        assert!(text.contains("Battery Mode (BIN): 0b0"), "{text}");
        assert!(text.contains("Temperature: -273.1"), "{text}");
        assert_eq!(text.lines().count(), 22);
    }

    #[test]
    fn diagnostics_continue_past_failed_reads() {
        // First transaction (the serial select) NACKs, the rest succeed.
        let mut client = client(ScriptedWire::failing(1));
        let mut out = Vec::new();
        run_diagnostics(&mut client, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(
            text.contains("Serial Number: error requesting data from address 0x0B"),
            "{text}"
        );
        assert!(text.contains("Cycle Count: 0"), "{text}");
        assert_eq!(text.lines().count(), 22);
    }
}

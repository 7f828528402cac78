use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use sbspack_lib::protocol as proto;
use std::time::Duration;

fn parse_address(s: &str) -> Result<proto::DeviceAddress, String> {
    let value =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::DeviceAddress::try_from(value).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display the full diagnostic register set of the pack:
    /// serial number, capacities, voltages, state of charge, status flags,
    /// temperature and current.
    Read,

    /// Read and display only the vendor serial number string.
    Serial,

    /// Send the two-part unseal key to unlock write access to protected
    /// controller memory. Each key half is retried on transport errors.
    Unseal,

    /// Send the permanent-failure clear command once.
    /// The pack must already be unsealed for the controller to accept it.
    ClearPf,

    /// Run the full maintenance sequence: repeated bursts of unseal key
    /// part 1, unseal key part 2 and the permanent-failure clear command,
    /// with delays between the steps.
    #[clap(verbatim_doc_comment)]
    Repair {
        /// Number of unseal/PF-clear passes to run.
        #[arg(short = 'n', long, default_value_t = 5)]
        iterations: u32,
    },
}

const fn about_text() -> &'static str {
    "SBS battery pack maintenance tool - read diagnostics, unseal and clear the permanent-failure flag."
}

#[derive(Parser, Debug)]
#[command(name="packmend", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// I2C bus device node the pack is attached to.
    /// Example: "/dev/i2c-1".
    #[arg(short, long, default_value = "/dev/i2c-1")]
    pub device: String,

    /// 7-bit bus address of the pack, decimal or hexadecimal.
    /// SBS packs respond on 0x0B.
    #[arg(short, long, default_value = "0x0B", value_parser = parse_address)]
    pub address: proto::DeviceAddress,

    /// How long a register read may wait for data before reporting a
    /// timeout. "0s" disables the timeout and restores the original
    /// poll-forever behaviour.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, default_value = "1s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Delay between consecutive maintenance commands. Packs need time to
    /// process an unseal key half before the next command arrives.
    /// Examples: "3s", "500ms".
    #[arg(global = true, long, default_value = "3s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    /// Total attempts for each maintenance command before giving up.
    #[arg(global = true, long, default_value_t = 3)]
    pub retries: u32,

    /// Backoff between failed attempts of the same command.
    #[arg(global = true, long, default_value = "2s", value_parser = humantime::parse_duration)]
    pub backoff: Duration,

    /// The maintenance or read command to execute.
    #[command(subcommand)]
    pub command: CliCommands,
}

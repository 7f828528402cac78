//! Crate-wide error type for pack communication.

use crate::{protocol, transport};

/// All errors that can occur while talking to the pack.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps `protocol::Error`.
    #[error(transparent)]
    Protocol(#[from] protocol::Error),

    /// A bus transaction with the pack failed (NACK, arbitration loss, ...).
    #[error("error requesting data from address {address}: {source}")]
    Transaction {
        address: protocol::DeviceAddress,
        source: transport::WireError,
    },

    /// The pack stopped supplying bytes and the configured read timeout
    /// elapsed. Never raised when no timeout is configured.
    #[error("timed out waiting for data from address {address}")]
    ReadTimeout { address: protocol::DeviceAddress },
}

/// The result type for pack operations.
pub type Result<T> = std::result::Result<T, Error>;

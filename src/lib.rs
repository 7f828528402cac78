//! A library for reading and repairing Smart Battery System (SBS) packs
//! over a two-wire bus.
//!
//! The crate splits into small layers:
//!
//! 1. **Protocol**: the SBS register set, maintenance key constants and
//!    pure unit conversions (millivolts, deci-Kelvin, packed dates). See
//!    [`protocol`].
//! 2. **Transport**: the [`transport::Wire`] trait with the bus transaction
//!    primitives, plus [`transport::EhalBus`] adapting any
//!    [`embedded_hal::i2c::I2c`] controller.
//! 3. **Codec**: [`client::SbsClient`] frames word and string register
//!    reads and the raw maintenance writes.
//! 4. **Sequencer**: [`sequencer`] orchestrates the diagnostic read-out and
//!    the retried unseal / permanent-failure-clear bursts.
//!
//! ## Quick start
//!
//! ```no_run
//! use sbspack_lib::{client::SbsClient, protocol::DeviceAddress};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Open the pack on a Linux i2c-dev adapter.
//!     let bus = sbspack_lib::linux::open("/dev/i2c-1")?;
//!     let mut client = SbsClient::new(bus, DeviceAddress::default());
//!
//!     let voltage = client.voltage()?;
//!     println!("Pack voltage: {voltage} V");
//!
//!     sbspack_lib::sequencer::run_diagnostics(&mut client, &mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod sequencer;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "linux")))]
#[cfg(feature = "linux")]
pub mod linux;

pub use error::{Error, Result};

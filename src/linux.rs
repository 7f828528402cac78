//! Linux `i2c-dev` glue.
//!
//! Battery packs end up on a host bus through USB I2C adapters or a SBC
//! header; either way the kernel exposes them as `/dev/i2c-N`.

use crate::transport::EhalBus;
use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::I2cdev;
use std::path::Path;

/// Opens a bus on an `i2c-dev` device node such as `/dev/i2c-1`.
pub fn open(path: impl AsRef<Path>) -> Result<EhalBus<I2cdev>, LinuxI2CError> {
    Ok(EhalBus::new(I2cdev::new(path)?))
}

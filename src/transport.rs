//! Bus transport for talking to the pack over a two-wire bus.
//!
//! The [`Wire`] trait models the transaction primitives the register codec
//! needs: bracketed byte writes, an armed multi-byte read, and a
//! non-blocking byte fetch. The bus is an owned value handed to the codec,
//! never process-wide state, so tests can substitute a scripted double.
//!
//! [`EhalBus`] adapts the trait onto any [`embedded_hal::i2c::I2c`]
//! controller, which covers Linux `i2c-dev` adapters (see [`crate::linux`])
//! as well as microcontroller HALs.

use crate::protocol::DeviceAddress;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use std::collections::VecDeque;

/// A transport-level bus failure.
///
/// Any transmission step may fail this way; the codec checks the result of
/// every `end_transmission` and `request_from`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// The device did not acknowledge its address or a data byte.
    #[error("no acknowledge from device")]
    NoAcknowledge,
    /// Arbitration was lost to another bus master.
    #[error("bus arbitration lost")]
    ArbitrationLoss,
    /// An invalid start/stop condition was seen on the wire.
    #[error("bus error on the wire")]
    BusError,
    /// Receive buffer overrun.
    #[error("receive overrun")]
    Overrun,
    /// Any other controller-specific failure.
    #[error("bus transaction failed")]
    Other,
}

impl WireError {
    fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NoAcknowledge(_) => WireError::NoAcknowledge,
            ErrorKind::ArbitrationLoss => WireError::ArbitrationLoss,
            ErrorKind::Bus => WireError::BusError,
            ErrorKind::Overrun => WireError::Overrun,
            _ => WireError::Other,
        }
    }
}

/// Transaction primitives of a two-wire bus master.
///
/// A transaction is bracketed by [`Wire::begin_transmission`] and
/// [`Wire::end_transmission`]; bytes queued in between with
/// [`Wire::write_byte`] go out as one write. `end_transmission(false)`
/// keeps the device selected so the following [`Wire::request_from`] runs
/// with a repeated start (atomically selecting a register and reading it).
///
/// [`Wire::read_byte`] is non-blocking; blocking with an optional timeout
/// lives in the codec so every transport gets the same policy.
pub trait Wire {
    /// Opens a transmission to `address`. Any previously open transmission
    /// is discarded; access is exclusive and non-reentrant.
    fn begin_transmission(&mut self, address: DeviceAddress);

    /// Queues one outgoing byte for the open transmission.
    fn write_byte(&mut self, byte: u8);

    /// Sends the queued bytes. With `send_stop == false` the bus is not
    /// released and the next `request_from` continues with a repeated start.
    fn end_transmission(&mut self, send_stop: bool) -> Result<(), WireError>;

    /// Arms the bus to receive `count` bytes from `address`, replacing any
    /// previously received data.
    fn request_from(
        &mut self,
        address: DeviceAddress,
        count: usize,
        send_stop: bool,
    ) -> Result<(), WireError>;

    /// Number of received bytes not yet consumed.
    fn available(&self) -> usize;

    /// Takes the next received byte, or `None` if nothing is pending.
    fn read_byte(&mut self) -> Option<u8>;
}

/// [`Wire`] implementation over any [`embedded_hal::i2c::I2c`] controller.
///
/// Hardware controllers cannot hold the bus open between separate calls, so
/// an `end_transmission(false)` defers the queued bytes; the following
/// `request_from` replays them in a single write-then-read transaction,
/// which the controller joins with a repeated start. Stop conditions are
/// likewise the controller's responsibility, so the `send_stop` flag on
/// `request_from` is accepted but not interpreted here.
#[derive(Debug)]
pub struct EhalBus<I2C> {
    i2c: I2C,
    tx: Option<(DeviceAddress, Vec<u8>)>,
    deferred: Option<(DeviceAddress, Vec<u8>)>,
    rx: VecDeque<u8>,
}

impl<I2C> EhalBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            tx: None,
            deferred: None,
            rx: VecDeque::new(),
        }
    }

    /// Consumes the adapter and hands the controller back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> Wire for EhalBus<I2C> {
    fn begin_transmission(&mut self, address: DeviceAddress) {
        self.tx = Some((address, Vec::new()));
    }

    fn write_byte(&mut self, byte: u8) {
        if let Some((_, buffer)) = &mut self.tx {
            buffer.push(byte);
        }
    }

    fn end_transmission(&mut self, send_stop: bool) -> Result<(), WireError> {
        let Some((address, bytes)) = self.tx.take() else {
            return Ok(());
        };
        if send_stop {
            self.i2c
                .write(*address, &bytes)
                .map_err(|e| WireError::from_kind(e.kind()))
        } else {
            // A NACK on this path surfaces from the next request_from.
            self.deferred = Some((address, bytes));
            Ok(())
        }
    }

    fn request_from(
        &mut self,
        address: DeviceAddress,
        count: usize,
        _send_stop: bool,
    ) -> Result<(), WireError> {
        self.rx.clear();
        let mut buffer = vec![0u8; count];
        let result = match self.deferred.take() {
            Some((deferred_address, bytes)) if deferred_address == address => {
                self.i2c.write_read(*address, &bytes, &mut buffer)
            }
            _ => self.i2c.read(*address, &mut buffer),
        };
        result.map_err(|e| WireError::from_kind(e.kind()))?;
        self.rx.extend(buffer);
        Ok(())
    }

    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }
}

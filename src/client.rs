//! Register codec for SBS battery packs.
//!
//! [`SbsClient`] owns a [`Wire`] transport and frames the two read shapes
//! the register set uses: a 16-bit little-endian word fetched with a
//! repeated start, and a length-prefixed string. It also issues the raw
//! maintenance writes (unseal key halves, permanent-failure clear).
//!
//! Every read is a fresh bus transaction; nothing is cached between calls.

use crate::protocol::{self as proto, Register};
use crate::transport::{Wire, WireError};
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Capacity of the string receive buffer. Declared string lengths are
/// clamped to `STRING_BUFFER_LEN - 1` so the terminator always fits.
pub const STRING_BUFFER_LEN: usize = 32;

/// Pause between selecting a register and reading it back. Slow targets
/// drop the repeated start when the read follows immediately.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Client for a single battery pack on an owned bus.
///
/// Access is exclusive and synchronous; no transaction begins while another
/// is open, which `&mut self` enforces.
#[derive(Debug)]
pub struct SbsClient<B> {
    bus: B,
    address: proto::DeviceAddress,
    settle_delay: Duration,
    read_timeout: Option<Duration>,
}

impl<B: Wire> SbsClient<B> {
    /// Creates a client for the pack at `address`.
    ///
    /// No read timeout is configured by default: a byte read busy-polls
    /// until the transport yields data, so a non-responding device on a
    /// transport that trickles bytes in can stall the caller. Set a
    /// timeout with [`SbsClient::set_read_timeout`] to get a
    /// [`Error::ReadTimeout`] instead.
    pub fn new(bus: B, address: proto::DeviceAddress) -> Self {
        Self {
            bus,
            address,
            settle_delay: DEFAULT_SETTLE_DELAY,
            read_timeout: None,
        }
    }

    /// The pack address this client talks to.
    pub fn address(&self) -> proto::DeviceAddress {
        self.address
    }

    /// Sets how long a blocking byte read may wait. `None` restores the
    /// poll-forever behaviour.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Overrides the settle delay between register select and read-back.
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    /// Consumes the client and hands the bus back.
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn transaction_error(&self, source: WireError) -> Error {
        Error::Transaction {
            address: self.address,
            source,
        }
    }

    fn read_byte_blocking(&mut self) -> Result<u8> {
        let deadline = self.read_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if let Some(byte) = self.bus.read_byte() {
                return Ok(byte);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::ReadTimeout {
                        address: self.address,
                    });
                }
            }
            std::hint::spin_loop();
        }
    }

    /// Reads a 16-bit register word.
    ///
    /// The register is selected with a write that ends without a stop, so
    /// the read continues with a repeated start after the settle delay.
    /// Bytes arrive low byte first and combine as `low | high << 8`.
    pub fn fetch_word(&mut self, register: Register) -> Result<u16> {
        self.bus.begin_transmission(self.address);
        self.bus.write_byte(register.code());
        self.bus
            .end_transmission(false)
            .map_err(|e| self.transaction_error(e))?;
        std::thread::sleep(self.settle_delay);
        self.bus
            .request_from(self.address, 2, true)
            .map_err(|e| self.transaction_error(e))?;
        let low = self.read_byte_blocking()?;
        let high = self.read_byte_blocking()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Reads a length-prefixed string register.
    ///
    /// The first received byte declares the string length and is clamped
    /// to the buffer capacity. If the bus supplies fewer bytes than
    /// declared, the remainder is zero-filled; the returned text stops at
    /// the first NUL within the declared length.
    pub fn read_string(&mut self, register: Register) -> Result<String> {
        self.bus.begin_transmission(self.address);
        self.bus.write_byte(register.code());
        self.bus
            .end_transmission(true)
            .map_err(|e| self.transaction_error(e))?;
        self.bus
            .request_from(self.address, STRING_BUFFER_LEN, true)
            .map_err(|e| self.transaction_error(e))?;

        let declared = self.read_byte_blocking()? as usize;
        let length = declared.min(STRING_BUFFER_LEN - 1);
        let mut buffer = [0u8; STRING_BUFFER_LEN];
        for slot in buffer.iter_mut().take(length) {
            *slot = self.bus.read_byte().unwrap_or(0);
        }
        buffer[length] = 0;

        let text_end = buffer[..length]
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(length);
        Ok(String::from_utf8_lossy(&buffer[..text_end]).into_owned())
    }

    /// Writes a 16-bit word as one transaction, high byte then low byte.
    /// This is how the unseal key halves go out.
    pub fn send_word(&mut self, word: u16) -> Result<()> {
        self.bus.begin_transmission(self.address);
        self.bus.write_byte((word >> 8) as u8);
        self.bus.write_byte((word & 0xFF) as u8);
        self.bus
            .end_transmission(true)
            .map_err(|e| self.transaction_error(e))
    }

    /// Writes a single command byte as one transaction.
    pub fn send_command(&mut self, command: u8) -> Result<()> {
        self.bus.begin_transmission(self.address);
        self.bus.write_byte(command);
        self.bus
            .end_transmission(true)
            .map_err(|e| self.transaction_error(e))
    }

    /// The vendor pack serial number string.
    pub fn serial_number(&mut self) -> Result<String> {
        self.read_string(Register::PackSerial)
    }

    pub fn voltage(&mut self) -> Result<proto::Voltage> {
        Ok(proto::Voltage::decode(self.fetch_word(Register::Voltage)?))
    }

    pub fn design_voltage(&mut self) -> Result<proto::Voltage> {
        Ok(proto::Voltage::decode(
            self.fetch_word(Register::DesignVoltage)?,
        ))
    }

    pub fn cell1_voltage(&mut self) -> Result<proto::Voltage> {
        Ok(proto::Voltage::decode(
            self.fetch_word(Register::CellVoltage1)?,
        ))
    }

    pub fn cell2_voltage(&mut self) -> Result<proto::Voltage> {
        Ok(proto::Voltage::decode(
            self.fetch_word(Register::CellVoltage2)?,
        ))
    }

    pub fn temperature(&mut self) -> Result<proto::Temperature> {
        Ok(proto::Temperature::decode(
            self.fetch_word(Register::Temperature)?,
        ))
    }

    pub fn current(&mut self) -> Result<proto::Current> {
        Ok(proto::Current::decode(self.fetch_word(Register::Current)?))
    }

    pub fn manufacture_date(&mut self) -> Result<proto::ManufactureDate> {
        Ok(proto::ManufactureDate::decode(
            self.fetch_word(Register::ManufactureDate)?,
        ))
    }

    pub fn battery_mode(&mut self) -> Result<proto::BatteryMode> {
        Ok(proto::BatteryMode::decode(
            self.fetch_word(Register::BatteryMode)?,
        ))
    }

    pub fn battery_status(&mut self) -> Result<proto::BatteryStatus> {
        Ok(proto::BatteryStatus::decode(
            self.fetch_word(Register::BatteryStatus)?,
        ))
    }

    pub fn cycle_count(&mut self) -> Result<u16> {
        self.fetch_word(Register::CycleCount)
    }

    /// Design capacity in mAh.
    pub fn design_capacity(&mut self) -> Result<u16> {
        self.fetch_word(Register::DesignCapacity)
    }

    /// Full charge capacity in mAh.
    pub fn full_charge_capacity(&mut self) -> Result<u16> {
        self.fetch_word(Register::FullChargeCapacity)
    }

    /// Remaining capacity in mAh.
    pub fn remaining_capacity(&mut self) -> Result<u16> {
        self.fetch_word(Register::RemainingCapacity)
    }

    /// Relative state of charge in percent of full charge capacity.
    pub fn relative_state_of_charge(&mut self) -> Result<u16> {
        self.fetch_word(Register::RelativeStateOfCharge)
    }

    /// Absolute state of charge in percent of design capacity.
    pub fn absolute_state_of_charge(&mut self) -> Result<u16> {
        self.fetch_word(Register::AbsoluteStateOfCharge)
    }

    /// Minutes remaining until full charge.
    pub fn time_to_full(&mut self) -> Result<u16> {
        self.fetch_word(Register::TimeToFull)
    }

    /// Requested charging current in mA.
    pub fn charging_current(&mut self) -> Result<u16> {
        self.fetch_word(Register::ChargingCurrent)
    }

    /// Requested charging voltage in mV.
    pub fn charging_voltage(&mut self) -> Result<u16> {
        self.fetch_word(Register::ChargingVoltage)
    }

    pub fn state_of_health(&mut self) -> Result<u16> {
        self.fetch_word(Register::StateOfHealth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedWire;
    use assert_matches::assert_matches;

    fn client(wire: ScriptedWire) -> SbsClient<ScriptedWire> {
        let mut client = SbsClient::new(wire, proto::DeviceAddress::default());
        client.set_settle_delay(Duration::ZERO);
        client
    }

    #[test]
    fn fetch_word_combines_little_endian() {
        let mut wire = ScriptedWire::new();
        wire.respond(&[0x21, 0x4A]);
        let mut client = client(wire);
        assert_eq!(client.fetch_word(Register::ManufactureDate).unwrap(), 0x4A21);

        let wire = client.into_inner();
        assert_eq!(wire.transmissions, vec![(0x0B, vec![0x1B])]);
    }

    #[test]
    fn fetch_word_surfaces_transmission_errors() {
        let wire = ScriptedWire::failing(1);
        let mut client = client(wire);
        let error = client.fetch_word(Register::Voltage).unwrap_err();
        assert_matches!(
            error,
            Error::Transaction {
                source: WireError::NoAcknowledge,
                ..
            }
        );
        // The failure names the device address in padded hex.
        assert!(error.to_string().contains("0x0B"), "{error}");
    }

    #[test]
    fn fetch_word_surfaces_request_errors() {
        let mut wire = ScriptedWire::new();
        wire.fail_requests = 1;
        let mut client = client(wire);
        assert_matches!(
            client.fetch_word(Register::Voltage),
            Err(Error::Transaction { .. })
        );
    }

    #[test]
    fn read_string_returns_declared_text() {
        let mut wire = ScriptedWire::new();
        wire.respond(b"\x09SN1234567");
        let mut client = client(wire);
        assert_eq!(client.read_string(Register::PackSerial).unwrap(), "SN1234567");

        let wire = client.into_inner();
        assert_eq!(wire.transmissions, vec![(0x0B, vec![0xD8])]);
    }

    #[test]
    fn read_string_zero_fills_short_responses() {
        let mut wire = ScriptedWire::new();
        // Ten bytes declared, two supplied.
        wire.respond(&[10, b'H', b'i']);
        let mut client = client(wire);
        assert_eq!(client.read_string(Register::PackSerial).unwrap(), "Hi");
    }

    #[test]
    fn read_string_clamps_declared_length_to_capacity() {
        let mut wire = ScriptedWire::new();
        let mut response = vec![0xFF];
        response.extend(std::iter::repeat(b'A').take(64));
        wire.respond(&response);
        let mut client = client(wire);
        let text = client.read_string(Register::PackSerial).unwrap();
        assert_eq!(text.len(), STRING_BUFFER_LEN - 1);
        assert!(text.bytes().all(|b| b == b'A'));
    }

    #[test]
    fn read_string_never_overruns_for_any_declared_length() {
        for declared in 0..=255u8 {
            let mut wire = ScriptedWire::new();
            wire.respond(&[declared]);
            let mut client = client(wire);
            let text = client.read_string(Register::PackSerial).unwrap();
            assert!(text.len() <= STRING_BUFFER_LEN - 1);
        }
    }

    #[test]
    fn read_string_reports_the_failing_address() {
        let wire = ScriptedWire::failing(1);
        let mut client = client(wire);
        let error = client.read_string(Register::PackSerial).unwrap_err();
        assert_eq!(
            error.to_string(),
            "error requesting data from address 0x0B: no acknowledge from device"
        );
    }

    #[test]
    fn starved_read_times_out_when_configured() {
        let mut wire = ScriptedWire::new();
        wire.starve = true;
        let mut client = client(wire);
        client.set_read_timeout(Some(Duration::from_millis(5)));
        assert_matches!(
            client.fetch_word(Register::Voltage),
            Err(Error::ReadTimeout { .. })
        );
    }

    #[test]
    fn send_word_writes_high_byte_first() {
        let wire = ScriptedWire::new();
        let mut client = client(wire);
        client.send_word(proto::UNSEAL_KEY_1).unwrap();
        client.send_word(proto::UNSEAL_KEY_2).unwrap();
        client.send_command(proto::CLEAR_PF_COMMAND).unwrap();

        let wire = client.into_inner();
        assert_eq!(
            wire.transmissions,
            vec![
                (0x0B, vec![0xCC, 0xDF]),
                (0x0B, vec![0x7E, 0xE0]),
                (0x0B, vec![0x42]),
            ]
        );
    }

    #[test]
    fn typed_getters_decode_their_registers() {
        let mut wire = ScriptedWire::new();
        wire.respond(&[0x00, 0x40]); // voltage 16384 mV
        wire.respond(&[0xA5, 0x0B]); // temperature 2981 dK
        wire.respond(&[0xFF, 0xFF]); // current -1 mA
        let mut client = client(wire);
        assert_eq!(client.voltage().unwrap().to_string(), "16.384");
        assert_eq!(client.temperature().unwrap().to_string(), "24.9");
        assert_eq!(client.current().unwrap().milliamps(), -1);
    }
}

//! Board drivers.
//!
//! Each board owns the registers that follow the common block and implements [`NodeDriver`].
//! The dispatcher stores a [`Board`], which forwards every call to the driver selected at
//! configuration time.

pub mod bpsm;
pub mod common;
pub mod ddrm;
pub mod gpsm;
pub mod lvrm;
pub mod rrm;
pub mod uhfm;

use fugit::SecsDurationU32;
use log::warn;

use crate::{
    codec::{encode_mv, encode_ua},
    config::BoardConfig,
    error::{Error, ErrorBase, Result},
    guard::PowerGuard,
    hal::{Adc, Hardware, Power},
    register::{Access, RegisterStore, RegisterUpdate},
    registers,
    types::{AdcChannel, AdcStatus, BoardId, DelayMode, PowerDomain},
};

/// Persisted registers rewritten by a factory reset.
pub type FactoryDefaults = heapless::Vec<(u8, RegisterUpdate), 4>;

/// Register level behaviour of one board.
pub trait NodeDriver {
    /// Reset the driver context and fill the board registers.
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()>;

    /// Refresh the live fields of register `addr` from the hardware before it is read.
    fn update_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
    ) -> Result<()>;

    /// React to a bus write of `mask` bits in register `addr`.
    ///
    /// The store already holds the written value. Rejected control bits are rewritten to the
    /// state the hardware is actually in before returning.
    fn check_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
        mask: u32,
    ) -> Result<()>;

    /// Measure the board analog channels into its ANALOG_DATA registers.
    fn mtrg_callback<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<AdcStatus>;

    /// Periodic background task, called with the time elapsed since the previous call.
    fn process<H: Hardware>(
        &mut self,
        _regs: &mut RegisterStore,
        _hw: &mut H,
        _period: SecsDurationU32,
    ) -> Result<()> {
        Ok(())
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        FactoryDefaults::new()
    }
}

/// Driver of the configured board.
#[derive(Debug)]
pub enum Board {
    Lvrm(lvrm::Lvrm),
    Bpsm(bpsm::Bpsm),
    Ddrm(ddrm::Ddrm),
    Rrm(rrm::Rrm),
    Gpsm(gpsm::Gpsm),
    Uhfm(uhfm::Uhfm),
}

macro_rules! for_each_board {
    ($board:expr, $driver:ident => $body:expr) => {
        match $board {
            Board::Lvrm($driver) => $body,
            Board::Bpsm($driver) => $body,
            Board::Ddrm($driver) => $body,
            Board::Rrm($driver) => $body,
            Board::Gpsm($driver) => $body,
            Board::Uhfm($driver) => $body,
        }
    };
}

impl Board {
    pub fn new(config: &BoardConfig) -> Self {
        match config {
            BoardConfig::Lvrm(config) => Board::Lvrm(lvrm::Lvrm::new(*config)),
            BoardConfig::Bpsm(config) => Board::Bpsm(bpsm::Bpsm::new(*config)),
            BoardConfig::Ddrm(config) => Board::Ddrm(ddrm::Ddrm::new(*config)),
            BoardConfig::Rrm(config) => Board::Rrm(rrm::Rrm::new(*config)),
            BoardConfig::Gpsm(config) => Board::Gpsm(gpsm::Gpsm::new(*config)),
            BoardConfig::Uhfm(config) => Board::Uhfm(uhfm::Uhfm::new(*config)),
        }
    }

    pub fn id(&self) -> BoardId {
        match self {
            Board::Lvrm(_) => BoardId::Lvrm,
            Board::Bpsm(_) => BoardId::Bpsm,
            Board::Ddrm(_) => BoardId::Ddrm,
            Board::Rrm(_) => BoardId::Rrm,
            Board::Gpsm(_) => BoardId::Gpsm,
            Board::Uhfm(_) => BoardId::Uhfm,
        }
    }

    /// Access table of the full register map, common block included.
    pub fn access(&self) -> &'static [Access] {
        match self {
            Board::Lvrm(_) => &registers::lvrm::ACCESS,
            Board::Bpsm(_) => &registers::bpsm::ACCESS,
            Board::Ddrm(_) => &registers::ddrm::ACCESS,
            Board::Rrm(_) => &registers::rrm::ACCESS,
            Board::Gpsm(_) => &registers::gpsm::ACCESS,
            Board::Uhfm(_) => &registers::uhfm::ACCESS,
        }
    }
}

impl NodeDriver for Board {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        for_each_board!(self, driver => driver.init_registers(regs, hw))
    }

    fn update_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
    ) -> Result<()> {
        for_each_board!(self, driver => driver.update_register(regs, hw, addr))
    }

    fn check_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
        mask: u32,
    ) -> Result<()> {
        for_each_board!(self, driver => driver.check_register(regs, hw, addr, mask))
    }

    fn mtrg_callback<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<AdcStatus> {
        for_each_board!(self, driver => driver.mtrg_callback(regs, hw))
    }

    fn process<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        period: SecsDurationU32,
    ) -> Result<()> {
        for_each_board!(self, driver => driver.process(regs, hw, period))
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        for_each_board!(self, driver => driver.factory_defaults())
    }
}

/// Conversion results of one measurement cycle.
///
/// A failed channel leaves its field at the error value and is reported through
/// [`Conversions::status`], the other channels are still read.
pub(crate) struct Conversions {
    sampled: bool,
    status: AdcStatus,
}

impl Conversions {
    /// Sample every channel with the analog domain powered.
    pub fn perform<H: Power + Adc>(hw: &mut H) -> Result<Self> {
        let mut analog = PowerGuard::enable(hw, PowerDomain::Analog, DelayMode::Active)?;
        let status = match analog.perform_measurements() {
            Ok(()) => AdcStatus::Success,
            Err(err) => {
                warn!("analog measurements failed: {:?}", err);
                AdcStatus::Failure(err)
            }
        };
        analog.release()?;
        Ok(Self { sampled: status.is_success(), status })
    }

    pub fn get<H: Adc>(&mut self, hw: &mut H, channel: AdcChannel) -> Option<i32> {
        if !self.sampled {
            return None;
        }
        match hw.get_data(channel) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("{:?} conversion failed: {:?}", channel, err);
                self.status = AdcStatus::Failure(err);
                None
            }
        }
    }

    /// Conversion result of a channel the operation cannot do without.
    pub fn require<H: Adc>(&mut self, hw: &mut H, channel: AdcChannel) -> Result<i32> {
        self.get(hw, channel).ok_or_else(|| match self.status {
            AdcStatus::Failure(err) => Error::from_hal(ErrorBase::Adc, err),
            AdcStatus::Success => Error::InvalidParameter,
        })
    }

    pub fn status(&self) -> AdcStatus {
        self.status
    }
}

/// Voltage field of a conversion result, negative readings clamp to 0.
pub(crate) fn voltage_field(voltage_mv: i32) -> u32 {
    encode_mv(u32::try_from(voltage_mv).unwrap_or(0))
}

pub(crate) fn current_field(current_ua: i32) -> u32 {
    encode_ua(u32::try_from(current_ua).unwrap_or(0))
}

/// Clear the triggers of `triggers` written to 1, returning the ones that fired.
///
/// Triggers are consumed before their action runs so a failed action never leaves them pending.
pub(crate) fn take_triggers(
    regs: &mut RegisterStore,
    addr: impl Into<u8>,
    mask: u32,
    triggers: u32,
) -> Result<u32> {
    let addr = addr.into();
    let fired = regs.read(addr)? & mask & triggers;
    regs.write(addr, fired, 0)?;
    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GpsmConfig, UhfmConfig},
        hal::HalError,
        mock_hardware::MockHardware,
    };

    #[test]
    fn board_matches_config() {
        let board = Board::new(&GpsmConfig::default().into());
        assert_eq!(board.id(), BoardId::Gpsm);
        assert_eq!(board.access().len(), registers::gpsm::ACCESS.len());

        let board = Board::new(&UhfmConfig::default().into());
        assert_eq!(board.id(), BoardId::Uhfm);
        assert_eq!(board.access().len(), 29);
    }

    #[test]
    fn conversions_report_failed_channels() {
        let mut hw = MockHardware::new();
        hw.set_adc(AdcChannel::VinMv, 12_000);
        hw.fail_adc_channel = Some(AdcChannel::VoutMv);
        let mut conversions = Conversions::perform(&mut hw).unwrap();
        assert_eq!(conversions.get(&mut hw, AdcChannel::VoutMv), None);
        assert_eq!(conversions.get(&mut hw, AdcChannel::VinMv), Some(12_000));
        assert_eq!(conversions.status(), AdcStatus::Failure(HalError::Failure(0x0A)));
        assert!(!hw.powered(PowerDomain::Analog));
    }

    #[test]
    fn failed_cycle_yields_no_data() {
        let mut hw = MockHardware::new();
        hw.fail_adc_measurements = Some(HalError::Timeout);
        let mut conversions = Conversions::perform(&mut hw).unwrap();
        assert_eq!(conversions.get(&mut hw, AdcChannel::VinMv), None);
        assert_eq!(conversions.status(), AdcStatus::Failure(HalError::Timeout));
        assert_eq!(hw.power_disable_count, 1);
    }

    #[test]
    fn only_written_triggers_are_taken() {
        let mut regs = RegisterStore::new(&registers::lvrm::ACCESS).unwrap();
        regs.write(12u8, 0b11, 0b11).unwrap();
        let fired = take_triggers(&mut regs, 12u8, 0b10, 0b10).unwrap();
        assert_eq!(fired, 0b10);
        assert_eq!(regs.read(12u8).unwrap(), 0b01);
        assert_eq!(take_triggers(&mut regs, 12u8, 0b10, 0b10).unwrap(), 0);
    }

    #[test]
    fn negative_readings_clamp() {
        assert_eq!(voltage_field(-12), 0);
        assert_eq!(current_field(-1), 0);
        assert_eq!(voltage_field(3_300), 3_300);
    }
}

//! Hardware action layer.
//!
//! The node drivers never touch peripherals directly. Every hardware effect goes through one of
//! the traits below, which a board support crate implements on top of its peripheral drivers.
//! All calls are blocking and return a [`HalError`] status on failure.

use fugit::{MillisDurationU32, SecsDurationU32};

use crate::types::{
    AdcChannel, ApplicationMessage, ControlMessage, DelayMode, DownlinkFrame, Fix, GpsPosition,
    GpsTime, MessageStatus, PowerDomain, RadioParameters, TestMode, TimepulseConfig,
};

/// Status returned by the hardware layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The operation did not complete in time.
    Timeout,
    /// Driver specific failure status.
    Failure(u16),
}

/// Relay, regulator and charger switches.
pub trait Load {
    fn set_output_state(&mut self, state: bool) -> Result<(), HalError>;
    fn get_output_state(&mut self) -> Result<bool, HalError>;
    fn set_charge_state(&mut self, state: bool) -> Result<(), HalError>;
    fn get_charge_state(&mut self) -> Result<bool, HalError>;
    /// Charger status pin.
    fn get_charge_status(&mut self) -> Result<bool, HalError>;
}

/// Board power domains.
pub trait Power {
    /// Turn a domain on and wait for it to settle using the given delay mode.
    fn enable(&mut self, domain: PowerDomain, delay_mode: DelayMode) -> Result<(), HalError>;
    fn disable(&mut self, domain: PowerDomain) -> Result<(), HalError>;
    fn is_enabled(&mut self, domain: PowerDomain) -> Result<bool, HalError>;
}

/// Analog acquisition.
///
/// [`Adc::perform_measurements`] samples every channel of the board, [`Adc::get_data`] then
/// returns the converted value of one channel.
pub trait Adc {
    fn perform_measurements(&mut self) -> Result<(), HalError>;
    fn get_data(&mut self, channel: AdcChannel) -> Result<i32, HalError>;
}

/// GPS receiver.
pub trait Gps {
    fn get_time(&mut self, timeout: SecsDurationU32) -> Result<Fix<GpsTime>, HalError>;
    fn get_position(&mut self, timeout: SecsDurationU32) -> Result<Fix<GpsPosition>, HalError>;
    fn configure_timepulse(&mut self, config: &TimepulseConfig) -> Result<(), HalError>;
    fn get_backup(&mut self) -> Result<bool, HalError>;
    fn set_backup(&mut self, state: bool) -> Result<(), HalError>;
}

/// Low level radio transceiver control.
pub trait Radio {
    fn wake_up(&mut self) -> Result<(), HalError>;
    fn init(&mut self, parameters: &RadioParameters) -> Result<(), HalError>;
    fn start_continuous_wave(&mut self) -> Result<(), HalError>;
    /// Put the transceiver in continuous reception.
    fn start_rx(&mut self) -> Result<(), HalError>;
    fn get_rssi(&mut self) -> Result<i16, HalError>;
    fn de_init(&mut self) -> Result<(), HalError>;
    fn sleep(&mut self) -> Result<(), HalError>;
}

/// Sigfox end-point stack and its RF test add-on.
pub trait Sigfox {
    fn open(&mut self) -> Result<(), HalError>;
    fn send_application_message(
        &mut self,
        message: &ApplicationMessage,
    ) -> Result<MessageStatus, HalError>;
    fn send_control_message(&mut self, message: &ControlMessage)
    -> Result<MessageStatus, HalError>;
    fn get_dl_frame(&mut self) -> Result<DownlinkFrame, HalError>;
    fn close(&mut self) -> Result<(), HalError>;
    fn rfp_open(&mut self) -> Result<(), HalError>;
    fn rfp_test_mode(&mut self, test_mode: &TestMode) -> Result<(), HalError>;
    fn rfp_close(&mut self) -> Result<(), HalError>;
}

/// Byte addressed non-volatile memory.
pub trait Nvm {
    fn read_byte(&mut self, address: u16) -> Result<u8, HalError>;
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), HalError>;
}

pub trait Delay {
    fn delay_ms(&mut self, duration: MillisDurationU32, mode: DelayMode) -> Result<(), HalError>;
}

pub trait System {
    /// Schedule an MCU reset once the current request has been answered.
    fn request_reset(&mut self);
}

/// Everything a node needs from its board.
pub trait Hardware: Load + Power + Adc + Gps + Radio + Sigfox + Nvm + Delay + System {}

impl<T> Hardware for T where T: Load + Power + Adc + Gps + Radio + Sigfox + Nvm + Delay + System {}

//! This module contains the data types exchanged between the node drivers and the hardware layer.

use fugit::SecsDurationU32;
use modular_bitfield::prelude::*;
use strum_macros::{EnumCount, EnumIter};

/// Board identifier published in the NODE_ID register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
#[repr(u8)]
pub enum BoardId {
    /// Low voltage relay module.
    Lvrm = 0,
    /// Battery protection and storage module.
    Bpsm = 1,
    /// DC-DC regulator module.
    Ddrm = 2,
    /// UHF radio module (Sigfox).
    Uhfm = 3,
    /// GPS module.
    Gpsm = 4,
    /// Regulated relay module.
    Rrm = 7,
}

impl TryFrom<u8> for BoardId {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BoardId::Lvrm),
            1 => Ok(BoardId::Bpsm),
            2 => Ok(BoardId::Ddrm),
            3 => Ok(BoardId::Uhfm),
            4 => Ok(BoardId::Gpsm),
            7 => Ok(BoardId::Rrm),
            _ => Err(()),
        }
    }
}

/// Switchable supply domains of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum PowerDomain {
    /// Voltage dividers and current sense amplifier.
    Analog,
    Gps,
    Radio,
}

/// How the MCU waits during a blocking delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayMode {
    #[default]
    Active,
    Sleep,
    Stop,
}

/// Converted values available after
/// [`Adc::perform_measurements`](crate::hal::Adc::perform_measurements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum AdcChannel {
    /// MCU supply voltage.
    VmcuMv,
    /// MCU die temperature in tenths of degree.
    TmcuTenthDegrees,
    /// Relay common voltage (LVRM).
    VcomMv,
    VinMv,
    VoutMv,
    IoutUa,
    /// Source voltage (BPSM).
    VsrcMv,
    /// Storage element voltage (BPSM), before the divider ratio is applied.
    VstrMv,
    /// Backup output voltage (BPSM).
    VbkpMv,
    VgpsMv,
    /// Active antenna supply (GPSM).
    VantMv,
    /// Radio supply voltage (UHFM).
    VrfMv,
}

/// Outcome of the analog part of a measurement cycle.
///
/// A failing conversion does not abort the cycle, so it is reported next to the node status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcStatus {
    #[default]
    Success,
    Failure(crate::hal::HalError),
}

impl AdcStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AdcStatus::Success)
    }
}

/// UTC date and time from a GPS time fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsTime {
    pub year: u16,
    pub month: u8,
    pub date: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// Position from a GPS geolocation fix.
///
/// `*_seconds` carry the fractional part scaled by the receiver (17 bits in the registers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsPosition {
    pub lat_degrees: u8,
    pub lat_minutes: u8,
    pub lat_seconds: u32,
    pub lat_north: bool,
    pub long_degrees: u8,
    pub long_minutes: u8,
    pub long_seconds: u32,
    pub long_east: bool,
    /// Altitude in metres.
    pub altitude: u32,
}

/// Result of a GPS fix together with the time it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fix<T> {
    pub data: T,
    pub duration: SecsDurationU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimepulseConfig {
    pub active: bool,
    pub frequency_hz: u32,
    pub duty_cycle_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfMode {
    Tx,
    Rx,
}

/// Unmodulated radio configuration used for continuous wave and listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParameters {
    pub mode: RfMode,
    pub frequency_hz: u32,
    pub tx_power_dbm: i8,
}

/// Uplink bit rate, as stored in the BR field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum UlBitRate {
    Bps100 = 0,
    #[default]
    Bps600 = 1,
}

impl TryFrom<u32> for UlBitRate {
    type Error = ();
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UlBitRate::Bps100),
            1 => Ok(UlBitRate::Bps600),
            _ => Err(()),
        }
    }
}

/// Kind of application message, as stored in the MSGT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ApplicationMessageType {
    #[default]
    Empty = 0,
    Bit0 = 1,
    Bit1 = 2,
    ByteArray = 3,
}

impl TryFrom<u32> for ApplicationMessageType {
    type Error = ();
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApplicationMessageType::Empty),
            1 => Ok(ApplicationMessageType::Bit0),
            2 => Ok(ApplicationMessageType::Bit1),
            3 => Ok(ApplicationMessageType::ByteArray),
            _ => Err(()),
        }
    }
}

pub const UL_PAYLOAD_MAX_SIZE_BYTES: usize = 12;
pub const DL_PAYLOAD_SIZE_BYTES: usize = 8;
pub const DL_PHY_CONTENT_SIZE_BYTES: usize = 15;
pub const EP_ID_SIZE_BYTES: usize = 4;
pub const EP_KEY_SIZE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationMessage {
    /// Number of repetitions of the uplink frame (1 to 3).
    pub number_of_frames: u8,
    pub ul_bit_rate: UlBitRate,
    pub message_type: ApplicationMessageType,
    pub bidirectional: bool,
    pub payload: heapless::Vec<u8, UL_PAYLOAD_MAX_SIZE_BYTES>,
}

/// Keep-alive control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    pub number_of_frames: u8,
    pub ul_bit_rate: UlBitRate,
}

/// Status flags reported by the Sigfox stack after a message.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageStatus {
    pub ul_frame_1: bool,
    pub ul_frame_2: bool,
    pub ul_frame_3: bool,
    pub dl_frame: bool,
    pub dl_conf_frame: bool,
    pub network_error: bool,
    pub execution_error: bool,
    #[skip]
    __: B1,
}

impl From<MessageStatus> for u32 {
    fn from(value: MessageStatus) -> Self {
        value.into_bytes()[0] as u32
    }
}

/// Downlink frame received after a bidirectional message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownlinkFrame {
    pub payload: [u8; DL_PAYLOAD_SIZE_BYTES],
    /// Raw frame as seen on air.
    pub phy_content: [u8; DL_PHY_CONTENT_SIZE_BYTES],
    pub rssi_dbm: i16,
}

/// RF test mode request for the RFP add-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestMode {
    pub reference: u8,
    pub ul_bit_rate: UlBitRate,
}

/// Packed layout of the SW_VERSION_0 register.
#[bitfield(bits = 32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwVersion0 {
    pub major: B8,
    pub minor: B8,
    pub commit_index: B8,
    /// Built from a dirty working tree.
    pub dirty: bool,
    #[skip]
    __: B7,
}

impl From<SwVersion0> for u32 {
    fn from(value: SwVersion0) -> Self {
        u32::from_le_bytes(value.into_bytes())
    }
}

impl From<u32> for SwVersion0 {
    fn from(value: u32) -> Self {
        SwVersion0::from_bytes(value.to_le_bytes())
    }
}

/// Firmware identification published in the common block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwVersion {
    pub major: u8,
    pub minor: u8,
    pub commit_index: u8,
    /// 28-bit commit hash.
    pub commit_id: u32,
    pub dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwVersion {
    pub major: u8,
    pub minor: u8,
}

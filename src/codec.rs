//! Field codec.
//!
//! Register fields are sub-ranges of a 32-bit word described by a mask. Physical values are
//! stored in compact unit-tagged representations, each family reserving one "error" encoding
//! meaning "value unavailable".
//!
//! Out-of-range inputs saturate to the largest non-sentinel encoding of their family, so an
//! encode of real data never yields the sentinel.

/// Mask selecting a whole register.
pub const MASK_ALL: u32 = 0xFFFF_FFFF;

pub const VOLTAGE_ERROR_VALUE: u32 = 0xFFFF;
pub const CURRENT_ERROR_VALUE: u32 = 0xFFFF;
pub const TIME_ERROR_VALUE: u32 = 0xFF;
pub const RF_POWER_ERROR_VALUE: u32 = 0xFF;
pub const YEAR_ERROR_VALUE: u32 = 0xFF;
pub const TEMPERATURE_ERROR_VALUE: u32 = 0xFFFF;

const VOLTAGE_UNIT_DV: u32 = 1 << 15;
const VOLTAGE_VALUE_MAX: u32 = 0x7FFF;

const CURRENT_UNIT_SHIFT: u32 = 14;
const CURRENT_VALUE_MAX: u32 = 0x3FFF;
/// Multiplier of each current unit, in µA.
const CURRENT_UNITS_UA: [u32; 4] = [1, 100, 10_000, 1_000_000];

const TIME_UNIT_SHIFT: u32 = 6;
const TIME_VALUE_MAX: u32 = 0x3F;
/// Multiplier of each time unit, in seconds.
const TIME_UNITS_S: [u32; 4] = [1, 60, 3_600, 86_400];

const RF_POWER_OFFSET_DBM: i32 = 174;
const YEAR_OFFSET: u32 = 2000;

const TEMPERATURE_SIGN: u32 = 1 << 15;
const TEMPERATURE_MAGNITUDE_MAX: u32 = 0x7FFF;

/// Bit position of the lowest set bit of `mask`.
#[inline]
pub const fn shift(mask: u32) -> u32 {
    if mask == 0 { 0 } else { mask.trailing_zeros() }
}

/// Extract the field selected by `mask` from a register value.
#[inline]
pub const fn read_field(register: u32, mask: u32) -> u32 {
    (register & mask) >> shift(mask)
}

/// Place `field` into the bits selected by `mask`, returning only those bits.
#[inline]
pub const fn field_bits(field: u32, mask: u32) -> u32 {
    (field << shift(mask)) & mask
}

/// Compute `(old & !mask) | (value & mask)`.
#[inline]
pub const fn apply_mask(old: u32, mask: u32, value: u32) -> u32 {
    (old & !mask) | (value & mask)
}

/// State of a binary control or status signal as published in status fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BitRepresentation {
    Zero = 0b00,
    One = 0b01,
    /// Signal is wired to a fixed level.
    ForcedHardware = 0b10,
    /// Signal state is unknown.
    #[default]
    Error = 0b11,
}

impl BitRepresentation {
    /// Numeric value of the signal when it is known.
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            BitRepresentation::Zero => Some(false),
            BitRepresentation::One => Some(true),
            _ => None,
        }
    }
}

impl From<bool> for BitRepresentation {
    fn from(value: bool) -> Self {
        match value {
            true => BitRepresentation::One,
            false => BitRepresentation::Zero,
        }
    }
}

impl From<u32> for BitRepresentation {
    fn from(value: u32) -> Self {
        match value & 0b11 {
            0b00 => BitRepresentation::Zero,
            0b01 => BitRepresentation::One,
            0b10 => BitRepresentation::ForcedHardware,
            _ => BitRepresentation::Error,
        }
    }
}

impl From<BitRepresentation> for u32 {
    fn from(value: BitRepresentation) -> Self {
        value as u32
    }
}

/// Encode a voltage in millivolts.
///
/// Values below 32768 mV are stored with 1 mV resolution, larger ones with 100 mV resolution.
pub const fn encode_mv(voltage_mv: u32) -> u32 {
    if voltage_mv <= VOLTAGE_VALUE_MAX {
        voltage_mv
    } else {
        let dv = voltage_mv / 100;
        let dv = if dv >= VOLTAGE_VALUE_MAX { VOLTAGE_VALUE_MAX - 1 } else { dv };
        VOLTAGE_UNIT_DV | dv
    }
}

/// Decode a voltage field, `None` if it holds the error value.
pub const fn decode_mv(field: u32) -> Option<u32> {
    let field = field & 0xFFFF;
    if field == VOLTAGE_ERROR_VALUE {
        return None;
    }
    let value = field & VOLTAGE_VALUE_MAX;
    if field & VOLTAGE_UNIT_DV != 0 { Some(value * 100) } else { Some(value) }
}

/// Encode a current in microamps.
pub const fn encode_ua(current_ua: u32) -> u32 {
    let mut unit = 0;
    while unit < CURRENT_UNITS_UA.len() {
        let value = current_ua / CURRENT_UNITS_UA[unit];
        if value <= CURRENT_VALUE_MAX && !(unit == 3 && value == CURRENT_VALUE_MAX) {
            return ((unit as u32) << CURRENT_UNIT_SHIFT) | value;
        }
        unit += 1;
    }
    (3 << CURRENT_UNIT_SHIFT) | (CURRENT_VALUE_MAX - 1)
}

/// Decode a current field, `None` if it holds the error value.
///
/// Values beyond `u32::MAX` µA saturate.
pub const fn decode_ua(field: u32) -> Option<u32> {
    let field = field & 0xFFFF;
    if field == CURRENT_ERROR_VALUE {
        return None;
    }
    let unit = (field >> CURRENT_UNIT_SHIFT) as usize;
    Some((field & CURRENT_VALUE_MAX).saturating_mul(CURRENT_UNITS_UA[unit]))
}

/// Encode a duration in seconds.
pub const fn encode_seconds(seconds: u32) -> u32 {
    let mut unit = 0;
    while unit < TIME_UNITS_S.len() {
        let value = seconds / TIME_UNITS_S[unit];
        if value <= TIME_VALUE_MAX && !(unit == 3 && value == TIME_VALUE_MAX) {
            return ((unit as u32) << TIME_UNIT_SHIFT) | value;
        }
        unit += 1;
    }
    (3 << TIME_UNIT_SHIFT) | (TIME_VALUE_MAX - 1)
}

/// Decode a time field, `None` if it holds the error value.
pub const fn decode_seconds(field: u32) -> Option<u32> {
    let field = field & 0xFF;
    if field == TIME_ERROR_VALUE {
        return None;
    }
    let unit = (field >> TIME_UNIT_SHIFT) as usize;
    Some((field & TIME_VALUE_MAX) * TIME_UNITS_S[unit])
}

/// Encode an RF power or RSSI in dBm.
pub const fn encode_dbm(power_dbm: i16) -> u32 {
    let raw = power_dbm as i32 + RF_POWER_OFFSET_DBM;
    if raw < 0 {
        0
    } else if raw >= RF_POWER_ERROR_VALUE as i32 {
        RF_POWER_ERROR_VALUE - 1
    } else {
        raw as u32
    }
}

/// Decode an RF power field, `None` if it holds the error value.
pub const fn decode_dbm(field: u32) -> Option<i16> {
    let field = field & 0xFF;
    if field == RF_POWER_ERROR_VALUE {
        None
    } else {
        Some((field as i32 - RF_POWER_OFFSET_DBM) as i16)
    }
}

/// Encode a calendar year.
pub const fn encode_year(year: u16) -> u32 {
    let year = year as u32;
    if year < YEAR_OFFSET {
        0
    } else if year - YEAR_OFFSET >= YEAR_ERROR_VALUE {
        YEAR_ERROR_VALUE - 1
    } else {
        year - YEAR_OFFSET
    }
}

/// Decode a year field, `None` if it holds the error value.
pub const fn decode_year(field: u32) -> Option<u16> {
    let field = field & 0xFF;
    if field == YEAR_ERROR_VALUE { None } else { Some((field + YEAR_OFFSET) as u16) }
}

/// Encode a temperature in tenths of degree Celsius.
pub const fn encode_tenth_degrees(temperature: i32) -> u32 {
    let magnitude = temperature.unsigned_abs();
    let magnitude = if magnitude >= TEMPERATURE_MAGNITUDE_MAX {
        TEMPERATURE_MAGNITUDE_MAX - 1
    } else {
        magnitude
    };
    if temperature < 0 { TEMPERATURE_SIGN | magnitude } else { magnitude }
}

/// Decode a temperature field, `None` if it holds the error value.
pub const fn decode_tenth_degrees(field: u32) -> Option<i32> {
    let field = field & 0xFFFF;
    if field == TEMPERATURE_ERROR_VALUE {
        return None;
    }
    let magnitude = (field & TEMPERATURE_MAGNITUDE_MAX) as i32;
    if field & TEMPERATURE_SIGN != 0 { Some(-magnitude) } else { Some(magnitude) }
}

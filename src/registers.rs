//! This module is used to define the register maps of the bus nodes.
//!
//! Every node starts with the [`common`] block (addresses 0 to 7), followed by its board
//! specific registers. Field masks live in one sub-module per register.

use strum_macros::{EnumCount, EnumIter};

use crate::register::Access::{self, ReadOnly as R, ReadWrite as RW};

macro_rules! register_conversions {
    ($reg:ty) => {
        impl From<$reg> for u8 {
            fn from(value: $reg) -> Self {
                value as u8
            }
        }

        impl TryFrom<u8> for $reg {
            type Error = ();
            fn try_from(value: u8) -> Result<Self, Self::Error> {
                use strum::IntoEnumIterator;
                <$reg>::iter().find(|reg| *reg as u8 == value).ok_or(())
            }
        }
    };
}

/// Registers shared by all node types.
pub mod common {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Bus address and board identifier.
        NodeId = 0,
        /// __R__ - Hardware revision.
        HwVersion = 1,
        /// __R__ - Firmware version, see [`SwVersion0`](crate::types::SwVersion0).
        SwVersion0 = 2,
        /// __R__ - Firmware commit hash.
        SwVersion1 = 3,
        /// __R__ - Node flags.
        Flags1 = 4,
        /// __R__ - Status code of the last failed write.
        ErrorStack = 5,
        /// __R/W__ - Node level triggers.
        Control0 = 6,
        /// __R__ - MCU supply voltage and temperature.
        AnalogData0 = 7,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 8] = [R, R, R, R, R, R, RW, R];

    pub mod node_id {
        pub const NODE_ADDR: u32 = 0x0000_00FF;
        pub const BOARD_ID: u32 = 0x0000_FF00;
    }

    pub mod hw_version {
        pub const MAJOR: u32 = 0x0000_00FF;
        pub const MINOR: u32 = 0x0000_FF00;
    }

    pub mod sw_version_1 {
        pub const COMMIT_ID: u32 = 0x0FFF_FFFF;
    }

    pub mod flags_1 {
        /// Boot flag, set at every start-up.
        pub const BF: u32 = 0x0000_0001;
    }

    pub mod error_stack {
        pub const ERROR: u32 = 0x0000_FFFF;
    }

    pub mod control_0 {
        /// Reset trigger.
        pub const RTRG: u32 = 0x0000_0001;
        /// Measurement trigger.
        pub const MTRG: u32 = 0x0000_0002;
        /// Boot flag clear.
        pub const BFC: u32 = 0x0000_0004;
    }

    pub mod analog_data_0 {
        pub const VMCU: u32 = 0x0000_FFFF;
        pub const TMCU: u32 = 0xFFFF_0000;
    }
}

/// Low voltage relay module.
pub mod lvrm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Board wiring options.
        Configuration0 = 8,
        /// __R/W__ - Battery thresholds used in BMS mode.
        Configuration1 = 9,
        /// __R/W__ - Output current sense offset.
        Configuration2 = 10,
        /// __R__ - Relay state.
        Status1 = 11,
        /// __R/W__ - Relay control and calibration trigger.
        Control1 = 12,
        /// __R__ - Common and output voltages.
        AnalogData1 = 13,
        /// __R__ - Output current.
        AnalogData2 = 14,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 15] = [R, R, R, R, R, R, RW, R, R, RW, RW, R, RW, R, R];

    pub mod configuration_0 {
        /// BMS mode flag.
        pub const BMSF: u32 = 0x0000_0001;
        /// Relay forced by hardware.
        pub const RLFH: u32 = 0x0000_0002;
    }

    pub mod configuration_1 {
        pub const VBATT_LOW_THRESHOLD: u32 = 0x0000_FFFF;
        pub const VBATT_HIGH_THRESHOLD: u32 = 0xFFFF_0000;
    }

    pub mod configuration_2 {
        pub const IOUT_OFFSET: u32 = 0x0000_FFFF;
    }

    pub mod status_1 {
        pub const RLSTST: u32 = 0x0000_0003;
    }

    pub mod control_1 {
        /// Relay state.
        pub const RLST: u32 = 0x0000_0001;
        /// Zero current calibration trigger.
        pub const ZCCT: u32 = 0x0000_0002;
    }

    pub mod analog_data_1 {
        pub const VCOM: u32 = 0x0000_FFFF;
        pub const VOUT: u32 = 0xFFFF_0000;
    }

    pub mod analog_data_2 {
        pub const IOUT: u32 = 0x0000_FFFF;
    }
}

/// Battery protection and storage module.
pub mod bpsm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Board wiring options.
        Configuration0 = 8,
        /// __R/W__ - Automatic charge settings.
        Configuration1 = 9,
        /// __R__ - Charger and backup output states.
        Status1 = 10,
        /// __R/W__ - Charger and backup output control.
        Control1 = 11,
        /// __R__ - Source and storage voltages.
        AnalogData1 = 12,
        /// __R__ - Backup output voltage.
        AnalogData2 = 13,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 14] = [R, R, R, R, R, R, RW, R, R, RW, R, RW, R, R];

    pub mod configuration_0 {
        pub const VSTR_RATIO: u32 = 0x0000_00FF;
        /// Backup output forced by hardware.
        pub const BKFH: u32 = 0x0000_0100;
        /// Charge status forced by hardware.
        pub const CSFH: u32 = 0x0000_0200;
        /// Charge enable forced by hardware.
        pub const CEFH: u32 = 0x0000_0400;
    }

    pub mod configuration_1 {
        pub const CHEN_THRESHOLD: u32 = 0x0000_FFFF;
        pub const CHEN_TOGGLE_PERIOD: u32 = 0x00FF_0000;
    }

    pub mod status_1 {
        pub const CHRGST: u32 = 0x0000_0003;
        pub const CHENST: u32 = 0x0000_000C;
        pub const BKENST: u32 = 0x0000_0030;
    }

    pub mod control_1 {
        /// Charge enable.
        pub const CHEN: u32 = 0x0000_0001;
        /// Charge mode, 0 means automatic.
        pub const CHMD: u32 = 0x0000_0002;
        /// Backup output enable.
        pub const BKEN: u32 = 0x0000_0004;
    }

    pub mod analog_data_1 {
        pub const VSRC: u32 = 0x0000_FFFF;
        pub const VSTR: u32 = 0xFFFF_0000;
    }

    pub mod analog_data_2 {
        pub const VBKP: u32 = 0x0000_FFFF;
    }
}

/// DC-DC regulator module.
pub mod ddrm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Regulator state.
        Status1 = 8,
        /// __R/W__ - Regulator control.
        Control1 = 9,
        /// __R__ - Input and output voltages.
        AnalogData1 = 10,
        /// __R__ - Output current.
        AnalogData2 = 11,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 12] = [R, R, R, R, R, R, RW, R, R, RW, R, R];

    pub mod status_1 {
        pub const DDENST: u32 = 0x0000_0003;
    }

    pub mod control_1 {
        pub const DDEN: u32 = 0x0000_0001;
    }

    pub mod analog_data_1 {
        pub const VIN: u32 = 0x0000_FFFF;
        pub const VOUT: u32 = 0xFFFF_0000;
    }

    pub mod analog_data_2 {
        pub const IOUT: u32 = 0x0000_FFFF;
    }
}

/// Regulated relay module.
pub mod rrm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Regulator state.
        Status1 = 8,
        /// __R/W__ - Regulator control and calibration trigger.
        Control1 = 9,
        /// __R__ - Input and output voltages.
        AnalogData1 = 10,
        /// __R__ - Output current.
        AnalogData2 = 11,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 12] = [R, R, R, R, R, R, RW, R, R, RW, R, R];

    pub mod status_1 {
        pub const RENST: u32 = 0x0000_0003;
    }

    pub mod control_1 {
        pub const REN: u32 = 0x0000_0001;
        /// Zero current calibration trigger.
        pub const ZCCT: u32 = 0x0000_0002;
    }

    pub mod analog_data_1 {
        pub const VIN: u32 = 0x0000_FFFF;
        pub const VOUT: u32 = 0xFFFF_0000;
    }

    pub mod analog_data_2 {
        pub const IOUT: u32 = 0x0000_FFFF;
    }
}

/// GPS module.
pub mod gpsm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R__ - Board wiring options.
        Configuration0 = 8,
        /// __R/W__ - Fix timeouts in seconds.
        Configuration1 = 9,
        /// __R/W__ - Timepulse frequency in Hz.
        Configuration2 = 10,
        /// __R/W__ - Timepulse duty cycle in percent.
        Configuration3 = 11,
        /// __R__ - Fix results and power states.
        Status1 = 12,
        /// __R/W__ - Fix triggers, timepulse and power control.
        Control1 = 13,
        /// __R__ - Date of the last time fix.
        TimeData0 = 14,
        /// __R__ - Time of the last time fix.
        TimeData1 = 15,
        /// __R__ - Duration of the last time fix.
        TimeData2 = 16,
        /// __R__ - Latitude.
        GeolocData0 = 17,
        /// __R__ - Longitude.
        GeolocData1 = 18,
        /// __R__ - Altitude in metres.
        GeolocData2 = 19,
        /// __R__ - Duration of the last geolocation fix.
        GeolocData3 = 20,
        /// __R__ - GPS and antenna supply voltages.
        AnalogData1 = 21,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 22] = [
        R, R, R, R, R, R, RW, R, R, RW, RW, RW, R, RW, R, R, R, R, R, R, R, R,
    ];

    pub mod configuration_0 {
        /// Active antenna fitted.
        pub const AAF: u32 = 0x0000_0001;
        /// Backup supply forced by hardware.
        pub const BKFH: u32 = 0x0000_0002;
    }

    pub mod configuration_1 {
        pub const TIME_TIMEOUT: u32 = 0x0000_FFFF;
        pub const GEOLOC_TIMEOUT: u32 = 0xFFFF_0000;
    }

    pub mod configuration_2 {
        pub const TP_FREQUENCY: u32 = 0xFFFF_FFFF;
    }

    pub mod configuration_3 {
        pub const TP_DUTY_CYCLE: u32 = 0x0000_00FF;
    }

    pub mod status_1 {
        /// Time fix success.
        pub const TFS: u32 = 0x0000_0001;
        /// Geolocation fix success.
        pub const GFS: u32 = 0x0000_0002;
        pub const TPST: u32 = 0x0000_0004;
        pub const PWST: u32 = 0x0000_0008;
        pub const BKENST: u32 = 0x0000_0030;
    }

    pub mod control_1 {
        /// Time fix trigger.
        pub const TTRG: u32 = 0x0000_0001;
        /// Geolocation fix trigger.
        pub const GTRG: u32 = 0x0000_0002;
        /// Timepulse enable.
        pub const TPEN: u32 = 0x0000_0004;
        /// Power mode, 1 gives control to PWEN.
        pub const PWMD: u32 = 0x0000_0008;
        pub const PWEN: u32 = 0x0000_0010;
        /// Backup supply enable.
        pub const BKEN: u32 = 0x0000_0020;
    }

    pub mod time_data_0 {
        pub const YEAR: u32 = 0x0000_00FF;
        pub const MONTH: u32 = 0x0000_FF00;
        pub const DATE: u32 = 0x00FF_0000;
    }

    pub mod time_data_1 {
        pub const HOUR: u32 = 0x0000_00FF;
        pub const MINUTE: u32 = 0x0000_FF00;
        pub const SECOND: u32 = 0x00FF_0000;
    }

    /// Layout shared by TIME_DATA_2 and GEOLOC_DATA_3.
    pub mod fix_duration {
        pub const FIX_DURATION: u32 = 0x0000_00FF;
    }

    /// Layout shared by GEOLOC_DATA_0 and GEOLOC_DATA_1.
    pub mod coordinate {
        pub const DEGREE: u32 = 0x0000_00FF;
        pub const MINUTE: u32 = 0x0000_3F00;
        pub const SECOND: u32 = 0x7FFF_C000;
        /// North flag for latitude, east flag for longitude.
        pub const HEMISPHERE: u32 = 0x8000_0000;
    }

    pub mod geoloc_data_2 {
        pub const ALTITUDE: u32 = 0xFFFF_FFFF;
    }

    pub mod analog_data_1 {
        pub const VGPS: u32 = 0x0000_FFFF;
        pub const VANT: u32 = 0xFFFF_0000;
    }
}

/// UHF radio module.
pub mod uhfm {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, EnumCount)]
    #[repr(u8)]
    pub enum Register {
        /// __R/W__ - Sigfox radio configuration.
        Configuration0 = 8,
        /// __R/W__ - Inter-frame and confirmation delays in milliseconds.
        Configuration1 = 9,
        /// __R__ - Result of the last message.
        Status1 = 10,
        /// __R/W__ - Message, test and radio triggers.
        Control1 = 11,
        /// __R__ - Radio supply voltage in TX and RX.
        AnalogData1 = 12,
        /// __R__ - Sigfox end-point identifier.
        SigfoxEpId = 13,
        /// __R__ - Sigfox end-point key, 16 bytes.
        SigfoxEpKey0 = 14,
        SigfoxEpKey1 = 15,
        SigfoxEpKey2 = 16,
        SigfoxEpKey3 = 17,
        /// __R/W__ - Uplink payload, 12 bytes.
        SigfoxUlPayload0 = 18,
        SigfoxUlPayload1 = 19,
        SigfoxUlPayload2 = 20,
        /// __R__ - Downlink payload, 8 bytes.
        SigfoxDlPayload0 = 21,
        SigfoxDlPayload1 = 22,
        /// __R__ - Downlink frame as received, 15 bytes.
        SigfoxDlPhyContent0 = 23,
        SigfoxDlPhyContent1 = 24,
        SigfoxDlPhyContent2 = 25,
        SigfoxDlPhyContent3 = 26,
        /// __R/W__ - Continuous wave and listening frequency in Hz.
        RadioTest0 = 27,
        /// __R/W__ - Continuous wave power and measured RSSI.
        RadioTest1 = 28,
    }

    register_conversions!(Register);

    pub const ACCESS: [Access; 29] = [
        R, R, R, R, R, R, RW, R, RW, RW, R, RW, R, R, R, R, R, R, RW, RW, RW, R, R, R, R, R, R,
        RW, RW,
    ];

    pub const RADIO_TEST_0_DEFAULT: u32 = 0x33AD_5EC0;
    pub const RADIO_TEST_1_DEFAULT: u32 = 0x0000_00BC;

    pub mod configuration_0 {
        /// Radio configuration zone.
        pub const RC: u32 = 0x0000_000F;
        /// Uplink bit rate.
        pub const BR: u32 = 0x0000_0030;
        /// Number of frames.
        pub const NFR: u32 = 0x0000_00C0;
        pub const TX_POWER: u32 = 0x0000_FF00;
    }

    pub mod configuration_1 {
        pub const TIFU: u32 = 0x0000_FFFF;
        pub const TCONF: u32 = 0xFFFF_0000;
    }

    pub mod status_1 {
        pub const MESSAGE_STATUS: u32 = 0x0000_00FF;
        pub const DL_RSSI: u32 = 0x0000_FF00;
        /// Message counter of the last bidirectional message.
        pub const BIDIRECTIONAL_MC: u32 = 0x0FFF_0000;
    }

    pub mod control_1 {
        /// Send trigger.
        pub const STRG: u32 = 0x0000_0001;
        /// RF test mode trigger.
        pub const TTRG: u32 = 0x0000_0002;
        /// Continuous wave enable.
        pub const CWEN: u32 = 0x0000_0004;
        /// Continuous listening enable.
        pub const RSEN: u32 = 0x0000_0008;
        /// Control (keep-alive) message.
        pub const CMSG: u32 = 0x0000_0010;
        /// Application message type.
        pub const MSGT: u32 = 0x0000_00E0;
        /// Bidirectional flag.
        pub const BF: u32 = 0x0000_0100;
        pub const UL_PAYLOAD_SIZE: u32 = 0x0000_1E00;
        pub const RFP_TEST_MODE: u32 = 0x0001_E000;
    }

    pub mod analog_data_1 {
        pub const VRF_TX: u32 = 0x0000_FFFF;
        pub const VRF_RX: u32 = 0xFFFF_0000;
    }

    pub mod radio_test_0 {
        pub const RF_FREQUENCY: u32 = 0xFFFF_FFFF;
    }

    pub mod radio_test_1 {
        pub const TX_POWER: u32 = 0x0000_00FF;
        pub const RSSI: u32 = 0x0000_FF00;
    }
}

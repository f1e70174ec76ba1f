//! Static node configuration.
//!
//! Board wiring options and firmware identity are fixed at build time and validated once by
//! [`NodeConfigBuilder`] before a node is created.

use fugit::{ExtU32, MillisDurationU32, SecsDurationU32};
use thiserror::Error;

use crate::types::{BoardId, HwVersion, SwVersion, UlBitRate};

/// Use [`NodeConfigBuilder`] to create a node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Board type and its wiring options.
    pub board: BoardConfig,
    pub hw_version: HwVersion,
    pub sw_version: SwVersion,
    /// Overwrite the persisted configuration with the factory defaults at init.
    pub factory_reset: bool,
}

impl NodeConfig {
    pub fn board_id(&self) -> BoardId {
        self.board.id()
    }
}

/// Board selection. Each variant carries the options fixed by the board assembly and the factory
/// defaults of its configuration registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardConfig {
    Lvrm(LvrmConfig),
    Bpsm(BpsmConfig),
    Ddrm(DdrmConfig),
    Rrm(RrmConfig),
    Gpsm(GpsmConfig),
    Uhfm(UhfmConfig),
}

impl BoardConfig {
    pub fn id(&self) -> BoardId {
        match self {
            BoardConfig::Lvrm(_) => BoardId::Lvrm,
            BoardConfig::Bpsm(_) => BoardId::Bpsm,
            BoardConfig::Ddrm(_) => BoardId::Ddrm,
            BoardConfig::Rrm(_) => BoardId::Rrm,
            BoardConfig::Gpsm(_) => BoardId::Gpsm,
            BoardConfig::Uhfm(_) => BoardId::Uhfm,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            BoardConfig::Lvrm(lvrm) => {
                if lvrm.vbatt_low_threshold_mv > lvrm.vbatt_high_threshold_mv {
                    return Err(ConfigError::ThresholdOrder);
                }
            }
            BoardConfig::Bpsm(bpsm) => {
                if bpsm.vstr_divider_ratio == 0 {
                    return Err(ConfigError::InvalidDividerRatio);
                }
            }
            BoardConfig::Gpsm(gpsm) => {
                let max = u16::MAX as u32;
                if gpsm.time_timeout.to_secs() > max || gpsm.geoloc_timeout.to_secs() > max {
                    return Err(ConfigError::TimeoutOutOfRange);
                }
                if gpsm.timepulse_duty_cycle_percent > 100 {
                    return Err(ConfigError::DutyCycleOutOfRange);
                }
            }
            BoardConfig::Uhfm(uhfm) => {
                if !(1..=3).contains(&uhfm.number_of_frames) {
                    return Err(ConfigError::NumberOfFramesOutOfRange);
                }
                let max = u16::MAX as u32;
                if uhfm.tifu.to_millis() > max || uhfm.tconf.to_millis() > max {
                    return Err(ConfigError::DelayOutOfRange);
                }
            }
            BoardConfig::Ddrm(_) | BoardConfig::Rrm(_) => {}
        }
        Ok(())
    }
}

/// Low voltage relay module options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LvrmConfig {
    /// Relay wired permanently closed.
    pub relay_forced_hardware: bool,
    /// Relay driven by the battery thresholds instead of the bus.
    pub bms_mode: bool,
    pub vbatt_low_threshold_mv: u32,
    pub vbatt_high_threshold_mv: u32,
}

impl Default for LvrmConfig {
    fn default() -> Self {
        LvrmConfig {
            relay_forced_hardware: false,
            bms_mode: false,
            vbatt_low_threshold_mv: 10_000,
            vbatt_high_threshold_mv: 12_000,
        }
    }
}

/// Battery protection module options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpsmConfig {
    pub charge_forced_hardware: bool,
    pub charge_status_forced_hardware: bool,
    pub backup_forced_hardware: bool,
    /// Ratio of the storage element voltage divider.
    pub vstr_divider_ratio: u8,
    /// Source voltage above which automatic charge is allowed.
    pub chen_threshold_mv: u32,
    /// Maximum continuous charge time in automatic mode.
    pub chen_toggle_period: SecsDurationU32,
}

impl Default for BpsmConfig {
    fn default() -> Self {
        BpsmConfig {
            charge_forced_hardware: false,
            charge_status_forced_hardware: true,
            backup_forced_hardware: true,
            vstr_divider_ratio: 2,
            chen_threshold_mv: 6_000,
            chen_toggle_period: 3_600.secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DdrmConfig {
    pub output_forced_hardware: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RrmConfig {
    pub output_forced_hardware: bool,
}

/// GPS module options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsmConfig {
    pub active_antenna: bool,
    pub backup_forced_hardware: bool,
    pub time_timeout: SecsDurationU32,
    pub geoloc_timeout: SecsDurationU32,
    pub timepulse_frequency_hz: u32,
    pub timepulse_duty_cycle_percent: u8,
}

impl Default for GpsmConfig {
    fn default() -> Self {
        GpsmConfig {
            active_antenna: true,
            backup_forced_hardware: false,
            time_timeout: 120.secs(),
            geoloc_timeout: 180.secs(),
            timepulse_frequency_hz: 10_000_000,
            timepulse_duty_cycle_percent: 50,
        }
    }
}

/// Radio module options.
///
/// TX power and the Sigfox delays are fixed by the stack build and always override the
/// persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UhfmConfig {
    pub tx_power_dbm: i8,
    /// Inter-frame delay.
    pub tifu: MillisDurationU32,
    /// Delay before the downlink confirmation frame.
    pub tconf: MillisDurationU32,
    pub number_of_frames: u8,
    pub ul_bit_rate: UlBitRate,
}

impl Default for UhfmConfig {
    fn default() -> Self {
        UhfmConfig {
            tx_power_dbm: 14,
            tifu: 500.millis(),
            tconf: 2_000.millis(),
            number_of_frames: 3,
            ul_bit_rate: UlBitRate::Bps600,
        }
    }
}

macro_rules! board_config_from {
    ($config:ident, $variant:ident) => {
        impl From<$config> for BoardConfig {
            fn from(value: $config) -> Self {
                BoardConfig::$variant(value)
            }
        }
    };
}

board_config_from!(LvrmConfig, Lvrm);
board_config_from!(BpsmConfig, Bpsm);
board_config_from!(DdrmConfig, Ddrm);
board_config_from!(RrmConfig, Rrm);
board_config_from!(GpsmConfig, Gpsm);
board_config_from!(UhfmConfig, Uhfm);

/// Use this type to create a node configuration.
pub struct NodeConfigBuilder {
    board: BoardConfig,
    hw_version: HwVersion,
    sw_version: SwVersion,
    factory_reset: bool,
}

impl NodeConfigBuilder {
    pub fn new(board: impl Into<BoardConfig>) -> NodeConfigBuilder {
        NodeConfigBuilder {
            board: board.into(),
            hw_version: HwVersion::default(),
            sw_version: SwVersion::default(),
            factory_reset: false,
        }
    }

    /// Let's build it!
    pub fn build(self) -> Result<NodeConfig, ConfigError> {
        if self.sw_version.commit_id > 0x0FFF_FFFF {
            return Err(ConfigError::CommitIdOutOfRange);
        }
        self.board.validate()?;
        Ok(NodeConfig {
            board: self.board,
            hw_version: self.hw_version,
            sw_version: self.sw_version,
            factory_reset: self.factory_reset,
        })
    }

    pub fn with_hw_version(mut self, major: u8, minor: u8) -> Self {
        self.hw_version = HwVersion { major, minor };
        self
    }

    pub fn with_sw_version(mut self, sw_version: SwVersion) -> Self {
        self.sw_version = sw_version;
        self
    }

    /// Rewrite persisted configuration registers with the factory defaults at init.
    pub fn with_factory_reset(mut self, factory_reset: bool) -> Self {
        self.factory_reset = factory_reset;
        self
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Commit ID does not fit in 28 bits")]
    CommitIdOutOfRange,
    #[error("Low battery threshold is above the high threshold")]
    ThresholdOrder,
    #[error("Voltage divider ratio must not be 0")]
    InvalidDividerRatio,
    #[error("GPS timeout does not fit in 16 bits")]
    TimeoutOutOfRange,
    #[error("Duty cycle above 100 %")]
    DutyCycleOutOfRange,
    #[error("Number of frames must be 1 to 3")]
    NumberOfFramesOutOfRange,
    #[error("Sigfox delay does not fit in 16 bits")]
    DelayOutOfRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_board_configs_build() {
        let boards: [BoardConfig; 6] = [
            LvrmConfig::default().into(),
            BpsmConfig::default().into(),
            DdrmConfig::default().into(),
            RrmConfig::default().into(),
            GpsmConfig::default().into(),
            UhfmConfig::default().into(),
        ];
        for board in boards {
            let id = board.id();
            let config = NodeConfigBuilder::new(board).build().unwrap();
            assert_eq!(config.board_id(), id);
            assert!(!config.factory_reset);
        }
    }

    #[test]
    fn test_builder_sets_versions() {
        let sw_version = SwVersion {
            major: 1,
            minor: 4,
            commit_index: 12,
            commit_id: 0x0ABC_DEF1,
            dirty: false,
        };
        let config = NodeConfigBuilder::new(DdrmConfig::default())
            .with_hw_version(2, 0)
            .with_sw_version(sw_version)
            .with_factory_reset(true)
            .build()
            .unwrap();
        assert_eq!(config.hw_version, HwVersion { major: 2, minor: 0 });
        assert_eq!(config.sw_version, sw_version);
        assert!(config.factory_reset);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let lvrm = LvrmConfig { vbatt_low_threshold_mv: 13_000, ..Default::default() };
        assert_eq!(NodeConfigBuilder::new(lvrm).build().err(), Some(ConfigError::ThresholdOrder));

        let bpsm = BpsmConfig { vstr_divider_ratio: 0, ..Default::default() };
        assert_eq!(
            NodeConfigBuilder::new(bpsm).build().err(),
            Some(ConfigError::InvalidDividerRatio)
        );

        let gpsm = GpsmConfig { time_timeout: 70_000.secs(), ..Default::default() };
        assert_eq!(
            NodeConfigBuilder::new(gpsm).build().err(),
            Some(ConfigError::TimeoutOutOfRange)
        );

        let uhfm = UhfmConfig { number_of_frames: 4, ..Default::default() };
        assert_eq!(
            NodeConfigBuilder::new(uhfm).build().err(),
            Some(ConfigError::NumberOfFramesOutOfRange)
        );

        let sw_version = SwVersion { commit_id: 0x1000_0000, ..Default::default() };
        assert_eq!(
            NodeConfigBuilder::new(RrmConfig::default()).with_sw_version(sw_version).build().err(),
            Some(ConfigError::CommitIdOutOfRange)
        );
    }
}

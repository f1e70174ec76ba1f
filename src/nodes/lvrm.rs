//! Low voltage relay module.
//!
//! The relay is either driven from the bus (RLST) or, in BMS mode, opened and closed by the
//! battery thresholds of CONFIGURATION_1. The output current is only valid once the relay
//! common is powered.

use fugit::SecsDurationU32;
use log::{debug, info};

use crate::{
    codec::{
        decode_mv, decode_ua, encode_mv, encode_ua, read_field, BitRepresentation,
        CURRENT_ERROR_VALUE, VOLTAGE_ERROR_VALUE,
    },
    config::LvrmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    hal::Hardware,
    nodes::{current_field, take_triggers, voltage_field, Conversions, FactoryDefaults, NodeDriver},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::lvrm::{
        analog_data_1, analog_data_2, configuration_0, configuration_1, configuration_2,
        control_1, status_1, Register,
    },
    types::{AdcChannel, AdcStatus},
};

/// Relay common voltage below which the current sense amplifier is not supplied.
const IOUT_MEASUREMENT_VCOM_MIN_MV: i32 = 4_500;

#[derive(Debug)]
pub struct Lvrm {
    config: LvrmConfig,
    /// Last known relay state.
    rlstst: BitRepresentation,
}

impl Lvrm {
    pub fn new(config: LvrmConfig) -> Self {
        Self {
            config,
            rlstst: BitRepresentation::Error,
        }
    }

    fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
        regs.apply(
            Register::AnalogData1,
            RegisterUpdate::new()
                .with(analog_data_1::VCOM, VOLTAGE_ERROR_VALUE)
                .with(analog_data_1::VOUT, VOLTAGE_ERROR_VALUE),
        )?;
        regs.write_field(Register::AnalogData2, analog_data_2::IOUT, CURRENT_ERROR_VALUE)
    }

    fn refresh_status<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        let result = if self.config.relay_forced_hardware {
            Ok(BitRepresentation::ForcedHardware)
        } else {
            hw.get_output_state().map(BitRepresentation::from).rebase(ErrorBase::Load)
        };
        self.rlstst = result.unwrap_or(BitRepresentation::Error);
        regs.write_field(Register::Status1, status_1::RLSTST, self.rlstst.into())?;
        result.map(|_| ())
    }

    fn check_control_1<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        mask: u32,
        rollback: &mut RegisterUpdate,
    ) -> Result<()> {
        let control = regs.read(Register::Control1)?;
        let fired = take_triggers(regs, Register::Control1, mask, control_1::ZCCT)?;

        if mask & control_1::RLST != 0 {
            if self.config.relay_forced_hardware {
                rollback.set(control_1::RLST, 0);
                return Err(Error::ForcedHardware);
            }
            let shadow = self.rlstst.as_bool().unwrap_or(false) as u32;
            if self.config.bms_mode {
                rollback.set(control_1::RLST, shadow);
                return Err(Error::ForcedSoftware);
            }
            let rlst = read_field(control, control_1::RLST) != 0;
            if self.rlstst.as_bool() != Some(rlst) {
                if let Err(err) = hw.set_output_state(rlst).rebase(ErrorBase::Load) {
                    rollback.set(control_1::RLST, shadow);
                    return Err(err);
                }
                self.rlstst = rlst.into();
                info!("relay {}", if rlst { "closed" } else { "opened" });
            }
        }
        if fired & control_1::ZCCT != 0 {
            self.calibrate_zero_current(regs, hw)?;
        }
        Ok(())
    }

    /// Store the current measured with no load as the output current offset.
    fn calibrate_zero_current<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<()> {
        let mut conversions = Conversions::perform(hw)?;
        let current_ua = u32::try_from(conversions.require(hw, AdcChannel::IoutUa)?).unwrap_or(0);
        // Rounded up to the next mA.
        let offset_ma = current_ua / 1_000 + 1;
        regs.write_field(
            Register::Configuration2,
            configuration_2::IOUT_OFFSET,
            encode_ua(offset_ma * 1_000),
        )?;
        nvm::store_register(hw, regs, Register::Configuration2)?;
        info!("output current offset calibrated to {} mA", offset_ma);
        Ok(())
    }

    /// Drive the relay from the battery voltage.
    fn bms_process<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        let mut conversions = Conversions::perform(hw)?;
        let vcom_mv = u32::try_from(conversions.require(hw, AdcChannel::VcomMv)?).unwrap_or(0);
        let thresholds = regs.read(Register::Configuration1)?;
        let low = decode_mv(read_field(thresholds, configuration_1::VBATT_LOW_THRESHOLD));
        let high = decode_mv(read_field(thresholds, configuration_1::VBATT_HIGH_THRESHOLD));
        let state = match (low, high) {
            (Some(low), _) if vcom_mv < low => Some(false),
            (_, Some(high)) if vcom_mv > high => Some(true),
            _ => None,
        };
        if let Some(state) = state {
            debug!("battery at {} mV, relay {}", vcom_mv, state);
            hw.set_output_state(state).rebase(ErrorBase::Load)?;
        }
        self.refresh_status(regs, hw)
    }
}

impl NodeDriver for Lvrm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.rlstst = BitRepresentation::Error;
        regs.apply(
            Register::Configuration0,
            RegisterUpdate::new()
                .with(configuration_0::BMSF, self.config.bms_mode as u32)
                .with(configuration_0::RLFH, self.config.relay_forced_hardware as u32),
        )?;
        nvm::load_registers(
            hw,
            regs,
            [Register::Configuration1.into(), Register::Configuration2.into()],
        )?;
        Self::reset_analog_data(regs)?;
        self.refresh_status(regs, hw)?;
        // The control field starts as a copy of the relay state.
        let rlst = self.rlstst.as_bool().unwrap_or(false);
        regs.write_field(Register::Control1, control_1::RLST, rlst as u32)
    }

    fn update_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
    ) -> Result<()> {
        match Register::try_from(addr) {
            Ok(Register::Status1) => self.refresh_status(regs, hw),
            _ => Ok(()),
        }
    }

    fn check_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
        mask: u32,
    ) -> Result<()> {
        let Ok(register) = Register::try_from(addr) else {
            return Ok(());
        };
        let mut rollback = RegisterUpdate::new();
        let result = match register {
            Register::Configuration1 | Register::Configuration2 if mask != 0 => {
                nvm::store_register(hw, regs, register)
            }
            Register::Control1 => self.check_control_1(regs, hw, mask, &mut rollback),
            _ => Ok(()),
        };
        regs.apply(Register::Control1, rollback)?;
        let refresh = self.refresh_status(regs, hw);
        result.and(refresh)
    }

    fn mtrg_callback<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<AdcStatus> {
        Self::reset_analog_data(regs)?;
        let mut conversions = Conversions::perform(hw)?;
        let mut data_1 = RegisterUpdate::new();
        let vcom_mv = conversions.get(hw, AdcChannel::VcomMv);
        if let Some(vcom_mv) = vcom_mv {
            data_1.set(analog_data_1::VCOM, voltage_field(vcom_mv));
        }
        if let Some(vout_mv) = conversions.get(hw, AdcChannel::VoutMv) {
            data_1.set(analog_data_1::VOUT, voltage_field(vout_mv));
        }
        regs.apply(Register::AnalogData1, data_1)?;

        if vcom_mv.is_some_and(|mv| mv >= IOUT_MEASUREMENT_VCOM_MIN_MV) {
            if let Some(iout_ua) = conversions.get(hw, AdcChannel::IoutUa) {
                let offset_ua = regs
                    .read_field(Register::Configuration2, configuration_2::IOUT_OFFSET)
                    .map(|field| decode_ua(field).unwrap_or(0))?;
                let offset_ua = i32::try_from(offset_ua).unwrap_or(i32::MAX);
                let iout = current_field(iout_ua.saturating_sub(offset_ua));
                regs.write_field(Register::AnalogData2, analog_data_2::IOUT, iout)?;
            }
        }
        Ok(conversions.status())
    }

    fn process<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        _period: SecsDurationU32,
    ) -> Result<()> {
        if self.config.bms_mode && !self.config.relay_forced_hardware {
            self.bms_process(regs, hw)?;
        }
        Ok(())
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        [
            (
                Register::Configuration1.into(),
                RegisterUpdate::new()
                    .with(
                        configuration_1::VBATT_LOW_THRESHOLD,
                        encode_mv(self.config.vbatt_low_threshold_mv),
                    )
                    .with(
                        configuration_1::VBATT_HIGH_THRESHOLD,
                        encode_mv(self.config.vbatt_high_threshold_mv),
                    ),
            ),
            (
                Register::Configuration2.into(),
                RegisterUpdate::new().with(configuration_2::IOUT_OFFSET, encode_ua(0)),
            ),
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::MASK_ALL,
        hal::HalError,
        mock_hardware::MockHardware,
        registers::lvrm::ACCESS,
    };

    const CONTROL_1: u8 = Register::Control1 as u8;

    fn setup(config: LvrmConfig) -> (Lvrm, RegisterStore, MockHardware) {
        let mut lvrm = Lvrm::new(config);
        let mut regs = RegisterStore::new(&ACCESS).unwrap();
        let mut hw = MockHardware::new();
        for (addr, update) in lvrm.factory_defaults() {
            nvm::write_register(&mut hw, addr, update.value).unwrap();
        }
        lvrm.init_registers(&mut regs, &mut hw).unwrap();
        (lvrm, regs, hw)
    }

    fn write(
        lvrm: &mut Lvrm,
        regs: &mut RegisterStore,
        hw: &mut MockHardware,
        mask: u32,
        value: u32,
    ) -> Result<()> {
        regs.write(CONTROL_1, mask, value).unwrap();
        lvrm.check_register(regs, hw, CONTROL_1, mask)
    }

    fn relay_status(regs: &RegisterStore) -> BitRepresentation {
        regs.read_field(Register::Status1, status_1::RLSTST).unwrap().into()
    }

    #[test]
    fn test_init_loads_thresholds() {
        let (_, regs, _) = setup(LvrmConfig::default());
        let thresholds = regs.read(Register::Configuration1).unwrap();
        let low = read_field(thresholds, configuration_1::VBATT_LOW_THRESHOLD);
        let high = read_field(thresholds, configuration_1::VBATT_HIGH_THRESHOLD);
        assert_eq!(decode_mv(low), Some(10_000));
        assert_eq!(decode_mv(high), Some(12_000));
        assert_eq!(relay_status(&regs), BitRepresentation::Zero);
    }

    #[test]
    fn test_relay_control() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        write(&mut lvrm, &mut regs, &mut hw, control_1::RLST, 1).unwrap();
        assert!(hw.output_state);
        assert_eq!(relay_status(&regs), BitRepresentation::One);

        // Writing the current state does not touch the switch.
        write(&mut lvrm, &mut regs, &mut hw, control_1::RLST, 1).unwrap();
        assert_eq!(hw.set_output_count, 1);
    }

    #[test]
    fn test_relay_failure_rolls_back() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        hw.fail_load = Some(HalError::Failure(0x05));
        assert_eq!(
            write(&mut lvrm, &mut regs, &mut hw, control_1::RLST, 1),
            Err(Error::SubsystemFailure { base: ErrorBase::Load, code: 0x05 })
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::RLST).unwrap(), 0);
        assert_eq!(relay_status(&regs), BitRepresentation::Zero);
    }

    #[test]
    fn test_forced_relay() {
        let config = LvrmConfig { relay_forced_hardware: true, ..Default::default() };
        let (mut lvrm, mut regs, mut hw) = setup(config);
        assert_eq!(relay_status(&regs), BitRepresentation::ForcedHardware);
        assert_eq!(
            write(&mut lvrm, &mut regs, &mut hw, control_1::RLST, 1),
            Err(Error::ForcedHardware)
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::RLST).unwrap(), 0);
        assert_eq!(hw.set_output_count, 0);
    }

    #[test]
    fn test_bms_mode_rejects_bus_control() {
        let config = LvrmConfig { bms_mode: true, ..Default::default() };
        let (mut lvrm, mut regs, mut hw) = setup(config);
        assert_eq!(
            write(&mut lvrm, &mut regs, &mut hw, control_1::RLST, 1),
            Err(Error::ForcedSoftware)
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::RLST).unwrap(), 0);
    }

    #[test]
    fn test_bms_hysteresis() {
        let config = LvrmConfig { bms_mode: true, ..Default::default() };
        let (mut lvrm, mut regs, mut hw) = setup(config);
        hw.set_adc(AdcChannel::VcomMv, 12_500);
        lvrm.process(&mut regs, &mut hw, SecsDurationU32::secs(60)).unwrap();
        assert!(hw.output_state);
        assert_eq!(relay_status(&regs), BitRepresentation::One);

        // Between thresholds the relay keeps its state.
        hw.set_adc(AdcChannel::VcomMv, 11_000);
        lvrm.process(&mut regs, &mut hw, SecsDurationU32::secs(60)).unwrap();
        assert!(hw.output_state);

        hw.set_adc(AdcChannel::VcomMv, 9_500);
        lvrm.process(&mut regs, &mut hw, SecsDurationU32::secs(60)).unwrap();
        assert!(!hw.output_state);
    }

    #[test]
    fn test_zero_current_calibration() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        hw.set_adc(AdcChannel::IoutUa, 2_400);
        write(&mut lvrm, &mut regs, &mut hw, control_1::ZCCT, control_1::ZCCT).unwrap();
        let offset = regs.read_field(Register::Configuration2, configuration_2::IOUT_OFFSET);
        assert_eq!(decode_ua(offset.unwrap()), Some(3_000));
        assert_eq!(regs.read_field(CONTROL_1, control_1::ZCCT).unwrap(), 0);
        assert_eq!(
            nvm::read_register(&mut hw, Register::Configuration2).unwrap(),
            regs.read(Register::Configuration2).unwrap()
        );

        // The offset is subtracted from the next measurements.
        hw.set_adc(AdcChannel::VcomMv, 12_000);
        hw.set_adc(AdcChannel::IoutUa, 153_000);
        lvrm.mtrg_callback(&mut regs, &mut hw).unwrap();
        let iout = regs.read_field(Register::AnalogData2, analog_data_2::IOUT).unwrap();
        assert_eq!(decode_ua(iout), Some(150_000));
    }

    #[test]
    fn test_large_current_offset() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        regs.write_field(Register::Configuration2, configuration_2::IOUT_OFFSET, 0xFFFE).unwrap();
        let conf_2 = Register::Configuration2 as u8;
        lvrm.check_register(&mut regs, &mut hw, conf_2, configuration_2::IOUT_OFFSET).unwrap();

        hw.set_adc(AdcChannel::VcomMv, 12_000);
        hw.set_adc(AdcChannel::IoutUa, 153_000);
        assert_eq!(lvrm.mtrg_callback(&mut regs, &mut hw).unwrap(), AdcStatus::Success);
        let iout = regs.read_field(Register::AnalogData2, analog_data_2::IOUT).unwrap();
        assert_eq!(decode_ua(iout), Some(0));
    }

    #[test]
    fn test_calibration_failure_clears_trigger() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        hw.fail_adc_measurements = Some(HalError::Failure(0x02));
        assert_eq!(
            write(&mut lvrm, &mut regs, &mut hw, control_1::ZCCT, control_1::ZCCT),
            Err(Error::SubsystemFailure { base: ErrorBase::Adc, code: 0x02 })
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::ZCCT).unwrap(), 0);
    }

    #[test]
    fn test_output_current_needs_common_voltage() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        hw.set_adc(AdcChannel::VcomMv, 3_000);
        hw.set_adc(AdcChannel::VoutMv, 2_900);
        hw.set_adc(AdcChannel::IoutUa, 10_000);
        assert_eq!(lvrm.mtrg_callback(&mut regs, &mut hw).unwrap(), AdcStatus::Success);
        let data_1 = regs.read(Register::AnalogData1).unwrap();
        assert_eq!(decode_mv(read_field(data_1, analog_data_1::VOUT)), Some(2_900));
        assert_eq!(
            regs.read_field(Register::AnalogData2, analog_data_2::IOUT).unwrap(),
            CURRENT_ERROR_VALUE
        );
    }

    #[test]
    fn test_thresholds_are_persisted() {
        let (mut lvrm, mut regs, mut hw) = setup(LvrmConfig::default());
        regs.write(Register::Configuration1, MASK_ALL, 0x2EE0_2710).unwrap();
        lvrm.check_register(&mut regs, &mut hw, Register::Configuration1 as u8, MASK_ALL).unwrap();
        assert_eq!(nvm::read_register(&mut hw, Register::Configuration1).unwrap(), 0x2EE0_2710);
    }
}

//! Regulated relay module.
//!
//! Same register layout as the DC-DC module, with a zero current calibration whose offset is
//! kept in a dedicated NVM byte rather than in a register.

use log::{info, warn};

use crate::{
    codec::{BitRepresentation, CURRENT_ERROR_VALUE, VOLTAGE_ERROR_VALUE},
    config::RrmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    hal::Hardware,
    nodes::{current_field, take_triggers, voltage_field, Conversions, NodeDriver},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::rrm::{analog_data_1, analog_data_2, control_1, status_1, Register},
    types::{AdcChannel, AdcStatus},
};

/// Output voltage below which the current sense amplifier is not supplied.
const IOUT_MEASUREMENT_VOUT_MIN_MV: i32 = 4_500;

#[derive(Debug)]
pub struct Rrm {
    config: RrmConfig,
    renst: BitRepresentation,
    iout_offset_ua: i32,
}

impl Rrm {
    pub fn new(config: RrmConfig) -> Self {
        Self {
            config,
            renst: BitRepresentation::Error,
            iout_offset_ua: 0,
        }
    }

    fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
        regs.apply(
            Register::AnalogData1,
            RegisterUpdate::new()
                .with(analog_data_1::VIN, VOLTAGE_ERROR_VALUE)
                .with(analog_data_1::VOUT, VOLTAGE_ERROR_VALUE),
        )?;
        regs.write_field(Register::AnalogData2, analog_data_2::IOUT, CURRENT_ERROR_VALUE)
    }

    fn refresh_status<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        let result = if self.config.output_forced_hardware {
            Ok(BitRepresentation::ForcedHardware)
        } else {
            hw.get_output_state().map(BitRepresentation::from).rebase(ErrorBase::Load)
        };
        self.renst = result.unwrap_or(BitRepresentation::Error);
        regs.write_field(Register::Status1, status_1::RENST, self.renst.into())?;
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

        if mask & control_1::REN != 0 {
            if self.config.output_forced_hardware {
                rollback.set(control_1::REN, 0);
                return Err(Error::ForcedHardware);
            }
            let shadow = self.renst.as_bool().unwrap_or(false);
            let ren = control & control_1::REN != 0;
            if ren != shadow {
                if let Err(err) = hw.set_output_state(ren).rebase(ErrorBase::Load) {
                    rollback.set(control_1::REN, shadow as u32);
                    return Err(err);
                }
                self.renst = ren.into();
                info!("regulator {}", if ren { "enabled" } else { "disabled" });
            }
        }
        if fired & control_1::ZCCT != 0 {
            self.calibrate_zero_current(hw)?;
        }
        Ok(())
    }

    fn calibrate_zero_current<H: Hardware>(&mut self, hw: &mut H) -> Result<()> {
        let mut conversions = Conversions::perform(hw)?;
        let current_ua = u32::try_from(conversions.require(hw, AdcChannel::IoutUa)?).unwrap_or(0);
        let offset_ma = u8::try_from(current_ua / 1_000 + 1).unwrap_or(u8::MAX);
        hw.write_byte(nvm::LT6106_OFFSET_CURRENT_MA, offset_ma)
            .rebase(ErrorBase::Nvm)?;
        self.iout_offset_ua = offset_ma as i32 * 1_000;
        info!("output current offset calibrated to {} mA", offset_ma);
        Ok(())
    }
}

impl NodeDriver for Rrm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.renst = BitRepresentation::Error;
        self.iout_offset_ua = match hw.read_byte(nvm::LT6106_OFFSET_CURRENT_MA) {
            Ok(offset_ma) => offset_ma as i32 * 1_000,
            Err(err) => {
                warn!("current offset unavailable ({:?}), using 0", err);
                0
            }
        };
        Self::reset_analog_data(regs)?;
        self.refresh_status(regs, hw)?;
        let ren = self.renst.as_bool().unwrap_or(false);
        regs.write_field(Register::Control1, control_1::REN, ren as u32)
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
        if Register::try_from(addr) != Ok(Register::Control1) {
            return Ok(());
        }
        let mut rollback = RegisterUpdate::new();
        let result = self.check_control_1(regs, hw, mask, &mut rollback);
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
        if let Some(vin_mv) = conversions.get(hw, AdcChannel::VinMv) {
            data_1.set(analog_data_1::VIN, voltage_field(vin_mv));
        }
        let vout_mv = conversions.get(hw, AdcChannel::VoutMv);
        if let Some(vout_mv) = vout_mv {
            data_1.set(analog_data_1::VOUT, voltage_field(vout_mv));
        }
        regs.apply(Register::AnalogData1, data_1)?;
        if vout_mv.is_some_and(|mv| mv >= IOUT_MEASUREMENT_VOUT_MIN_MV) {
            if let Some(iout_ua) = conversions.get(hw, AdcChannel::IoutUa) {
                let iout = current_field(iout_ua.saturating_sub(self.iout_offset_ua));
                regs.write_field(Register::AnalogData2, analog_data_2::IOUT, iout)?;
            }
        }
        Ok(conversions.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::decode_ua, mock_hardware::MockHardware, registers::rrm::ACCESS};

    const CONTROL_1: u8 = Register::Control1 as u8;

    fn setup(hw: MockHardware) -> (Rrm, RegisterStore, MockHardware) {
        let mut rrm = Rrm::new(RrmConfig::default());
        let mut regs = RegisterStore::new(&ACCESS).unwrap();
        let mut hw = hw;
        rrm.init_registers(&mut regs, &mut hw).unwrap();
        (rrm, regs, hw)
    }

    fn iout(regs: &RegisterStore) -> Option<u32> {
        decode_ua(regs.read_field(Register::AnalogData2, analog_data_2::IOUT).unwrap())
    }

    #[test]
    fn test_calibration_rounds_up_and_persists() {
        let (mut rrm, mut regs, mut hw) = setup(MockHardware::new());
        hw.set_adc(AdcChannel::IoutUa, 1_700);
        regs.write(CONTROL_1, control_1::ZCCT, control_1::ZCCT).unwrap();
        rrm.check_register(&mut regs, &mut hw, CONTROL_1, control_1::ZCCT).unwrap();
        assert_eq!(hw.nvm[nvm::LT6106_OFFSET_CURRENT_MA as usize], 2);
        assert_eq!(regs.read_field(CONTROL_1, control_1::ZCCT).unwrap(), 0);

        hw.set_adc(AdcChannel::VoutMv, 12_000);
        hw.set_adc(AdcChannel::IoutUa, 52_000);
        rrm.mtrg_callback(&mut regs, &mut hw).unwrap();
        assert_eq!(iout(&regs), Some(50_000));
    }

    #[test]
    fn test_offset_is_restored_at_init() {
        let mut hw = MockHardware::new();
        hw.nvm[nvm::LT6106_OFFSET_CURRENT_MA as usize] = 5;
        let (mut rrm, mut regs, mut hw) = setup(hw);
        hw.set_adc(AdcChannel::VoutMv, 12_000);
        hw.set_adc(AdcChannel::IoutUa, 3_000);
        rrm.mtrg_callback(&mut regs, &mut hw).unwrap();
        // Never negative.
        assert_eq!(iout(&regs), Some(0));
    }

    #[test]
    fn test_current_needs_output_voltage() {
        let (mut rrm, mut regs, mut hw) = setup(MockHardware::new());
        hw.set_adc(AdcChannel::VoutMv, 1_000);
        hw.set_adc(AdcChannel::IoutUa, 30_000);
        rrm.mtrg_callback(&mut regs, &mut hw).unwrap();
        assert_eq!(iout(&regs), None);
    }

    #[test]
    fn test_regulator_control_and_failed_calibration() {
        let (mut rrm, mut regs, mut hw) = setup(MockHardware::new());
        let mask = control_1::REN | control_1::ZCCT;
        hw.fail_adc_channel = Some(AdcChannel::IoutUa);
        regs.write(CONTROL_1, mask, mask).unwrap();
        assert_eq!(
            rrm.check_register(&mut regs, &mut hw, CONTROL_1, mask),
            Err(Error::SubsystemFailure { base: ErrorBase::Adc, code: 0x0A })
        );
        // The regulator was switched before the calibration failed.
        assert!(hw.output_state);
        assert_eq!(regs.read(CONTROL_1).unwrap(), control_1::REN);
    }
}

//! Battery protection and storage module.
//!
//! In automatic mode (CHMD = 0) the charger is enabled while the source voltage stays above the
//! CHEN threshold, and toggled off every CHEN_TOGGLE_PERIOD so the charge status can settle.

use fugit::SecsDurationU32;
use log::{debug, info};

use crate::{
    codec::{
        decode_mv, decode_seconds, encode_mv, encode_seconds, read_field, BitRepresentation,
        VOLTAGE_ERROR_VALUE,
    },
    config::BpsmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    hal::{HalError, Hardware},
    nodes::{voltage_field, Conversions, FactoryDefaults, NodeDriver},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::bpsm::{
        analog_data_1, analog_data_2, configuration_0, configuration_1, control_1, status_1,
        Register,
    },
    types::{AdcChannel, AdcStatus},
};

#[derive(Debug)]
pub struct Bpsm {
    config: BpsmConfig,
    chenst: BitRepresentation,
    bkenst: BitRepresentation,
    /// Time spent charging since the last toggle.
    chen_on_seconds: u32,
}

fn signal<F>(forced: bool, read: F) -> Result<BitRepresentation>
where
    F: FnOnce() -> core::result::Result<bool, HalError>,
{
    if forced {
        Ok(BitRepresentation::ForcedHardware)
    } else {
        read().map(BitRepresentation::from).rebase(ErrorBase::Load)
    }
}

impl Bpsm {
    pub fn new(config: BpsmConfig) -> Self {
        Self {
            config,
            chenst: BitRepresentation::Error,
            bkenst: BitRepresentation::Error,
            chen_on_seconds: 0,
        }
    }

    fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
        regs.apply(
            Register::AnalogData1,
            RegisterUpdate::new()
                .with(analog_data_1::VSRC, VOLTAGE_ERROR_VALUE)
                .with(analog_data_1::VSTR, VOLTAGE_ERROR_VALUE),
        )?;
        regs.write_field(Register::AnalogData2, analog_data_2::VBKP, VOLTAGE_ERROR_VALUE)
    }

    fn refresh_status<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        let chrgst = signal(self.config.charge_status_forced_hardware, || hw.get_charge_status());
        let chenst = signal(self.config.charge_forced_hardware, || hw.get_charge_state());
        let bkenst = signal(self.config.backup_forced_hardware, || hw.get_output_state());
        self.chenst = chenst.unwrap_or(BitRepresentation::Error);
        self.bkenst = bkenst.unwrap_or(BitRepresentation::Error);
        regs.apply(
            Register::Status1,
            RegisterUpdate::new()
                .with(status_1::CHRGST, chrgst.unwrap_or(BitRepresentation::Error).into())
                .with(status_1::CHENST, self.chenst.into())
                .with(status_1::BKENST, self.bkenst.into()),
        )?;
        chrgst.and(chenst).and(bkenst).map(|_| ())
    }

    fn check_control_1<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        mask: u32,
        rollback: &mut RegisterUpdate,
    ) -> Result<()> {
        let control = regs.read(Register::Control1)?;
        if mask & control_1::CHEN != 0 {
            if self.config.charge_forced_hardware {
                rollback.set(control_1::CHEN, 0);
                return Err(Error::ForcedHardware);
            }
            let shadow = self.chenst.as_bool().unwrap_or(false);
            if read_field(control, control_1::CHMD) == 0 {
                rollback.set(control_1::CHEN, shadow as u32);
                return Err(Error::ForcedSoftware);
            }
            let chen = read_field(control, control_1::CHEN) != 0;
            if chen != shadow {
                if let Err(err) = hw.set_charge_state(chen).rebase(ErrorBase::Load) {
                    rollback.set(control_1::CHEN, shadow as u32);
                    return Err(err);
                }
                self.chenst = chen.into();
                info!("charge {}", if chen { "enabled" } else { "disabled" });
            }
        }
        if mask & control_1::BKEN != 0 {
            if self.config.backup_forced_hardware {
                rollback.set(control_1::BKEN, 0);
                return Err(Error::ForcedHardware);
            }
            let shadow = self.bkenst.as_bool().unwrap_or(false);
            let bken = read_field(control, control_1::BKEN) != 0;
            if bken != shadow {
                if let Err(err) = hw.set_output_state(bken).rebase(ErrorBase::Load) {
                    rollback.set(control_1::BKEN, shadow as u32);
                    return Err(err);
                }
                self.bkenst = bken.into();
                info!("backup output {}", if bken { "enabled" } else { "disabled" });
            }
        }
        Ok(())
    }

    /// Automatic charge control, called periodically.
    fn charge_process<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        period: SecsDurationU32,
    ) -> Result<()> {
        if self.config.charge_forced_hardware
            || regs.read_field(Register::Control1, control_1::CHMD)? != 0
        {
            return Ok(());
        }
        let mut conversions = Conversions::perform(hw)?;
        let vsrc_mv = u32::try_from(conversions.require(hw, AdcChannel::VsrcMv)?).unwrap_or(0);
        let settings = regs.read(Register::Configuration1)?;
        let threshold_mv = decode_mv(read_field(settings, configuration_1::CHEN_THRESHOLD));
        let toggle_seconds =
            decode_seconds(read_field(settings, configuration_1::CHEN_TOGGLE_PERIOD));

        let charge = match (threshold_mv, toggle_seconds) {
            (Some(threshold_mv), Some(toggle_seconds)) if vsrc_mv >= threshold_mv => {
                self.chen_on_seconds = self.chen_on_seconds.saturating_add(period.to_secs());
                if self.chen_on_seconds >= toggle_seconds {
                    self.chen_on_seconds = 0;
                    false
                } else {
                    true
                }
            }
            _ => {
                self.chen_on_seconds = 0;
                false
            }
        };
        debug!("source at {} mV, charge {}", vsrc_mv, charge);
        hw.set_charge_state(charge).rebase(ErrorBase::Load)?;
        self.refresh_status(regs, hw)?;
        regs.write_field(Register::Control1, control_1::CHEN, charge as u32)
    }
}

impl NodeDriver for Bpsm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.chenst = BitRepresentation::Error;
        self.bkenst = BitRepresentation::Error;
        self.chen_on_seconds = 0;
        regs.apply(
            Register::Configuration0,
            RegisterUpdate::new()
                .with(configuration_0::VSTR_RATIO, self.config.vstr_divider_ratio as u32)
                .with(configuration_0::BKFH, self.config.backup_forced_hardware as u32)
                .with(configuration_0::CSFH, self.config.charge_status_forced_hardware as u32)
                .with(configuration_0::CEFH, self.config.charge_forced_hardware as u32),
        )?;
        nvm::load_registers(hw, regs, [Register::Configuration1.into()])?;
        Self::reset_analog_data(regs)?;
        self.refresh_status(regs, hw)?;
        regs.apply(
            Register::Control1,
            RegisterUpdate::new()
                .with(control_1::CHEN, self.chenst.as_bool().unwrap_or(false) as u32)
                .with(control_1::BKEN, self.bkenst.as_bool().unwrap_or(false) as u32),
        )
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
            Register::Configuration1 if mask != 0 => nvm::store_register(hw, regs, register),
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
        if let Some(vsrc_mv) = conversions.get(hw, AdcChannel::VsrcMv) {
            data_1.set(analog_data_1::VSRC, voltage_field(vsrc_mv));
        }
        if let Some(vstr_mv) = conversions.get(hw, AdcChannel::VstrMv) {
            let ratio = self.config.vstr_divider_ratio as i32;
            data_1.set(analog_data_1::VSTR, voltage_field(vstr_mv.saturating_mul(ratio)));
        }
        regs.apply(Register::AnalogData1, data_1)?;
        if let Some(vbkp_mv) = conversions.get(hw, AdcChannel::VbkpMv) {
            regs.write_field(Register::AnalogData2, analog_data_2::VBKP, voltage_field(vbkp_mv))?;
        }
        Ok(conversions.status())
    }

    fn process<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        period: SecsDurationU32,
    ) -> Result<()> {
        self.charge_process(regs, hw, period)
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        let settings = RegisterUpdate::new()
            .with(configuration_1::CHEN_THRESHOLD, encode_mv(self.config.chen_threshold_mv))
            .with(
                configuration_1::CHEN_TOGGLE_PERIOD,
                encode_seconds(self.config.chen_toggle_period.to_secs()),
            );
        [(Register::Configuration1.into(), settings)].into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock_hardware::MockHardware, registers::bpsm::ACCESS};
    use fugit::ExtU32;

    const CONTROL_1: u8 = Register::Control1 as u8;

    fn setup(config: BpsmConfig) -> (Bpsm, RegisterStore, MockHardware) {
        let mut bpsm = Bpsm::new(config);
        let mut regs = RegisterStore::new(&ACCESS).unwrap();
        let mut hw = MockHardware::new();
        for (addr, update) in bpsm.factory_defaults() {
            nvm::write_register(&mut hw, addr, update.value).unwrap();
        }
        bpsm.init_registers(&mut regs, &mut hw).unwrap();
        (bpsm, regs, hw)
    }

    fn write(
        bpsm: &mut Bpsm,
        regs: &mut RegisterStore,
        hw: &mut MockHardware,
        mask: u32,
        value: u32,
    ) -> Result<()> {
        regs.write(CONTROL_1, mask, value).unwrap();
        bpsm.check_register(regs, hw, CONTROL_1, mask)
    }

    fn status(regs: &RegisterStore, mask: u32) -> BitRepresentation {
        regs.read_field(Register::Status1, mask).unwrap().into()
    }

    fn automatic() -> BpsmConfig {
        BpsmConfig {
            chen_threshold_mv: 6_000,
            chen_toggle_period: 120.secs(),
            ..Default::default()
        }
    }

    #[test]
    fn test_charge_toggles_in_automatic_mode() {
        let (mut bpsm, mut regs, mut hw) = setup(automatic());
        hw.set_adc(AdcChannel::VsrcMv, 7_000);

        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert!(hw.charge_state);
        assert_eq!(status(&regs, status_1::CHENST), BitRepresentation::One);

        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert!(!hw.charge_state);
        assert_eq!(regs.read_field(CONTROL_1, control_1::CHEN).unwrap(), 0);

        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert!(hw.charge_state);
    }

    #[test]
    fn test_low_source_stops_charge() {
        let (mut bpsm, mut regs, mut hw) = setup(automatic());
        hw.set_adc(AdcChannel::VsrcMv, 7_000);
        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        hw.set_adc(AdcChannel::VsrcMv, 5_000);
        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert!(!hw.charge_state);
        // Counter restarted: a full period is allowed again.
        hw.set_adc(AdcChannel::VsrcMv, 7_000);
        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert!(hw.charge_state);
    }

    #[test]
    fn test_manual_mode_disables_automatic_charge() {
        let (mut bpsm, mut regs, mut hw) = setup(automatic());
        write(&mut bpsm, &mut regs, &mut hw, control_1::CHMD, control_1::CHMD).unwrap();
        hw.set_adc(AdcChannel::VsrcMv, 7_000);
        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert_eq!(hw.set_charge_count, 0);

        let mask = control_1::CHEN;
        write(&mut bpsm, &mut regs, &mut hw, mask, mask).unwrap();
        assert!(hw.charge_state);
    }

    #[test]
    fn test_charge_enable_needs_manual_mode() {
        let (mut bpsm, mut regs, mut hw) = setup(automatic());
        assert_eq!(
            write(&mut bpsm, &mut regs, &mut hw, control_1::CHEN, control_1::CHEN),
            Err(Error::ForcedSoftware)
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::CHEN).unwrap(), 0);
        assert_eq!(hw.set_charge_count, 0);
    }

    #[test]
    fn test_forced_signals() {
        let config = BpsmConfig { charge_forced_hardware: true, ..automatic() };
        let (mut bpsm, mut regs, mut hw) = setup(config);
        assert_eq!(status(&regs, status_1::CHENST), BitRepresentation::ForcedHardware);
        assert_eq!(status(&regs, status_1::CHRGST), BitRepresentation::ForcedHardware);
        assert_eq!(status(&regs, status_1::BKENST), BitRepresentation::ForcedHardware);

        let mask = control_1::CHMD | control_1::CHEN;
        assert_eq!(write(&mut bpsm, &mut regs, &mut hw, mask, mask), Err(Error::ForcedHardware));
        assert_eq!(regs.read_field(CONTROL_1, control_1::CHEN).unwrap(), 0);
        assert_eq!(
            write(&mut bpsm, &mut regs, &mut hw, control_1::BKEN, control_1::BKEN),
            Err(Error::ForcedHardware)
        );
        assert_eq!(regs.read_field(CONTROL_1, control_1::BKEN).unwrap(), 0);
        // Forced charger: the automatic mode stays idle.
        bpsm.process(&mut regs, &mut hw, 60.secs()).unwrap();
        assert_eq!(hw.set_charge_count, 0);
    }

    #[test]
    fn test_backup_output_control() {
        let config = BpsmConfig { backup_forced_hardware: false, ..automatic() };
        let (mut bpsm, mut regs, mut hw) = setup(config);
        write(&mut bpsm, &mut regs, &mut hw, control_1::BKEN, control_1::BKEN).unwrap();
        assert!(hw.output_state);
        assert_eq!(status(&regs, status_1::BKENST), BitRepresentation::One);

        hw.fail_load = Some(HalError::Failure(0x03));
        assert!(write(&mut bpsm, &mut regs, &mut hw, control_1::BKEN, 0).is_err());
        assert_eq!(regs.read_field(CONTROL_1, control_1::BKEN).unwrap(), 1);
    }

    #[test]
    fn test_measurements() {
        let (mut bpsm, mut regs, mut hw) = setup(automatic());
        hw.set_adc(AdcChannel::VsrcMv, 6_500);
        hw.set_adc(AdcChannel::VstrMv, 2_100);
        hw.set_adc(AdcChannel::VbkpMv, 4_000);
        assert_eq!(bpsm.mtrg_callback(&mut regs, &mut hw).unwrap(), AdcStatus::Success);
        let data_1 = regs.read(Register::AnalogData1).unwrap();
        assert_eq!(decode_mv(read_field(data_1, analog_data_1::VSRC)), Some(6_500));
        assert_eq!(decode_mv(read_field(data_1, analog_data_1::VSTR)), Some(4_200));
        let vbkp = regs.read_field(Register::AnalogData2, analog_data_2::VBKP).unwrap();
        assert_eq!(decode_mv(vbkp), Some(4_000));
    }
}

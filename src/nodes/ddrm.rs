//! DC-DC regulator module.

use log::info;

use crate::{
    codec::{BitRepresentation, CURRENT_ERROR_VALUE, VOLTAGE_ERROR_VALUE},
    config::DdrmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    hal::Hardware,
    nodes::{current_field, voltage_field, Conversions, NodeDriver},
    register::{RegisterStore, RegisterUpdate},
    registers::ddrm::{analog_data_1, analog_data_2, control_1, status_1, Register},
    types::{AdcChannel, AdcStatus},
};

#[derive(Debug)]
pub struct Ddrm {
    config: DdrmConfig,
    ddenst: BitRepresentation,
}

impl Ddrm {
    pub fn new(config: DdrmConfig) -> Self {
        Self {
            config,
            ddenst: BitRepresentation::Error,
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
        self.ddenst = result.unwrap_or(BitRepresentation::Error);
        regs.write_field(Register::Status1, status_1::DDENST, self.ddenst.into())?;
        result.map(|_| ())
    }

    fn check_control_1<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        mask: u32,
        rollback: &mut RegisterUpdate,
    ) -> Result<()> {
        if mask & control_1::DDEN == 0 {
            return Ok(());
        }
        if self.config.output_forced_hardware {
            rollback.set(control_1::DDEN, 0);
            return Err(Error::ForcedHardware);
        }
        let shadow = self.ddenst.as_bool().unwrap_or(false);
        let dden = regs.read_field(Register::Control1, control_1::DDEN)? != 0;
        if dden != shadow {
            if let Err(err) = hw.set_output_state(dden).rebase(ErrorBase::Load) {
                rollback.set(control_1::DDEN, shadow as u32);
                return Err(err);
            }
            self.ddenst = dden.into();
            info!("regulator {}", if dden { "enabled" } else { "disabled" });
        }
        Ok(())
    }
}

impl NodeDriver for Ddrm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.ddenst = BitRepresentation::Error;
        Self::reset_analog_data(regs)?;
        self.refresh_status(regs, hw)?;
        let dden = self.ddenst.as_bool().unwrap_or(false);
        regs.write_field(Register::Control1, control_1::DDEN, dden as u32)
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
        if let Some(vout_mv) = conversions.get(hw, AdcChannel::VoutMv) {
            data_1.set(analog_data_1::VOUT, voltage_field(vout_mv));
        }
        regs.apply(Register::AnalogData1, data_1)?;
        if let Some(iout_ua) = conversions.get(hw, AdcChannel::IoutUa) {
            regs.write_field(Register::AnalogData2, analog_data_2::IOUT, current_field(iout_ua))?;
        }
        Ok(conversions.status())
    }
}

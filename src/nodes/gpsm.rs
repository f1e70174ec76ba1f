//! GPS module.
//!
//! The GPS supply is shared between the time fix, the geolocation fix and the timepulse output.
//! In node managed mode (PWMD = 0) each activity powers the receiver on for its own needs and
//! the supply goes off once none of TTRG, GTRG and TPEN remains set. In manual mode (PWMD = 1)
//! the supply follows PWEN and activities needing power are refused while it is off.

use fugit::SecsDurationU32;
use log::{debug, info, warn};

use crate::{
    codec::{encode_seconds, encode_year, BitRepresentation, VOLTAGE_ERROR_VALUE},
    config::GpsmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    hal::{HalError, Hardware},
    nodes::{take_triggers, voltage_field, Conversions, FactoryDefaults, NodeDriver},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::gpsm::{
        analog_data_1, configuration_0, configuration_1, configuration_2, configuration_3,
        control_1, coordinate, fix_duration, geoloc_data_2, status_1, time_data_0, time_data_1,
        Register,
    },
    types::{AdcChannel, AdcStatus, DelayMode, GpsPosition, GpsTime, PowerDomain, TimepulseConfig},
};

#[derive(Debug)]
pub struct Gpsm {
    config: GpsmConfig,
    tpen: bool,
    pwmd: bool,
    pwen: bool,
    /// GPS supply state.
    gps_power: bool,
    bkenst: BitRepresentation,
}

impl Gpsm {
    pub fn new(config: GpsmConfig) -> Self {
        Self {
            config,
            tpen: false,
            pwmd: false,
            pwen: false,
            gps_power: false,
            bkenst: BitRepresentation::Error,
        }
    }

    fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
        regs.apply(
            Register::AnalogData1,
            RegisterUpdate::new()
                .with(analog_data_1::VGPS, VOLTAGE_ERROR_VALUE)
                .with(analog_data_1::VANT, VOLTAGE_ERROR_VALUE),
        )
    }

    fn refresh_status<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        let result = if self.config.backup_forced_hardware {
            Ok(BitRepresentation::ForcedHardware)
        } else {
            hw.get_backup().map(BitRepresentation::from).rebase(ErrorBase::Gps)
        };
        self.bkenst = result.unwrap_or(BitRepresentation::Error);
        regs.apply(
            Register::Status1,
            RegisterUpdate::new()
                .with(status_1::TPST, self.tpen as u32)
                .with(status_1::PWST, self.gps_power as u32)
                .with(status_1::BKENST, self.bkenst.into()),
        )?;
        result.map(|_| ())
    }

    /// Switch the GPS supply.
    fn power_control<H: Hardware>(&mut self, hw: &mut H, state: bool) -> Result<()> {
        if state && !self.gps_power {
            hw.enable(PowerDomain::Gps, DelayMode::Stop).rebase(ErrorBase::Power)?;
            debug!("GPS powered on");
        } else if !state && self.gps_power {
            hw.disable(PowerDomain::Gps).rebase(ErrorBase::Power)?;
            debug!("GPS powered off");
        }
        self.gps_power = state;
        Ok(())
    }

    /// Ask for (or give up) the GPS supply on behalf of one activity.
    fn power_request<H: Hardware>(
        &mut self,
        regs: &RegisterStore,
        hw: &mut H,
        state: bool,
    ) -> Result<()> {
        let control = regs.read(Register::Control1)?;
        if control & control_1::PWMD == 0 {
            let users = control_1::TTRG | control_1::GTRG | control_1::TPEN;
            if state || control & users == 0 {
                self.power_control(hw, state)?;
            }
            Ok(())
        } else if state && control & control_1::PWEN == 0 {
            Err(Error::ResourceBusy)
        } else {
            Ok(())
        }
    }

    /// Run `activity` with the GPS supply held.
    fn with_power<H, F>(&mut self, regs: &mut RegisterStore, hw: &mut H, activity: F) -> Result<()>
    where
        H: Hardware,
        F: FnOnce(&mut RegisterStore, &mut H) -> Result<()>,
    {
        self.power_request(regs, hw, true)?;
        let result = activity(regs, hw);
        let release = self.power_request(regs, hw, false);
        result.and(release)
    }

    fn ttrg_callback<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        regs.write_field(Register::Status1, status_1::TFS, 0)?;
        let timeout = SecsDurationU32::secs(
            regs.read_field(Register::Configuration1, configuration_1::TIME_TIMEOUT)?,
        );
        self.with_power(regs, hw, |regs, hw| match hw.get_time(timeout) {
            Ok(fix) => {
                write_time(regs, &fix.data, fix.duration)?;
                regs.write_field(Register::Status1, status_1::TFS, 1)?;
                info!("time fix in {} s", fix.duration.to_secs());
                Ok(())
            }
            Err(HalError::Timeout) => {
                info!("no time fix within {} s", timeout.to_secs());
                Ok(())
            }
            Err(err) => Err(Error::from_hal(ErrorBase::Gps, err)),
        })
    }

    fn gtrg_callback<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        regs.write_field(Register::Status1, status_1::GFS, 0)?;
        let timeout = SecsDurationU32::secs(
            regs.read_field(Register::Configuration1, configuration_1::GEOLOC_TIMEOUT)?,
        );
        self.with_power(regs, hw, |regs, hw| match hw.get_position(timeout) {
            Ok(fix) => {
                write_position(regs, &fix.data, fix.duration)?;
                regs.write_field(Register::Status1, status_1::GFS, 1)?;
                info!("geolocation fix in {} s", fix.duration.to_secs());
                Ok(())
            }
            Err(HalError::Timeout) => {
                info!("no geolocation fix within {} s", timeout.to_secs());
                Ok(())
            }
            Err(err) => Err(Error::from_hal(ErrorBase::Gps, err)),
        })
    }

    fn tpen_callback<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        state: bool,
    ) -> Result<()> {
        let config = TimepulseConfig {
            active: state,
            frequency_hz: regs.read_field(Register::Configuration2, configuration_2::TP_FREQUENCY)?,
            duty_cycle_percent: regs
                .read_field(Register::Configuration3, configuration_3::TP_DUTY_CYCLE)?
                as u8,
        };
        self.with_power(regs, hw, |_, hw| {
            hw.configure_timepulse(&config).rebase(ErrorBase::Gps)
        })
    }

    fn check_control_1<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        mask: u32,
        rollback: &mut RegisterUpdate,
    ) -> Result<()> {
        let control = regs.read(Register::Control1)?;
        let fired = take_triggers(
            regs,
            Register::Control1,
            mask,
            control_1::TTRG | control_1::GTRG,
        )?;

        if fired & control_1::TTRG != 0 {
            self.ttrg_callback(regs, hw)?;
        }
        if fired & control_1::GTRG != 0 {
            self.gtrg_callback(regs, hw)?;
        }
        if mask & control_1::TPEN != 0 {
            let tpen = control & control_1::TPEN != 0;
            if tpen != self.tpen {
                if let Err(err) = self.tpen_callback(regs, hw, tpen) {
                    // Restore the field first so the supply is released with the right users.
                    regs.write_field(Register::Control1, control_1::TPEN, self.tpen as u32)?;
                    if self.power_request(regs, hw, false).is_err() {
                        warn!("failed to release GPS supply");
                    }
                    return Err(err);
                }
                self.tpen = tpen;
                info!("timepulse {}", if tpen { "enabled" } else { "disabled" });
            }
        }
        if mask & control_1::PWMD != 0 {
            let pwmd = control & control_1::PWMD != 0;
            if pwmd != self.pwmd {
                let pwen = control & control_1::PWEN != 0;
                let result = if pwmd {
                    self.power_control(hw, pwen)
                } else {
                    self.power_request(regs, hw, false)
                };
                if let Err(err) = result {
                    rollback.set(control_1::PWMD, self.pwmd as u32);
                    return Err(err);
                }
                self.pwmd = pwmd;
                self.pwen = pwmd && pwen;
                if !pwmd {
                    rollback.set(control_1::PWEN, 0);
                }
                info!("GPS power {}", if pwmd { "manual" } else { "node managed" });
            }
        }
        if mask & control_1::PWEN != 0 {
            let pwen = control & control_1::PWEN != 0;
            if control & control_1::PWMD == 0 {
                if pwen {
                    rollback.set(control_1::PWEN, 0);
                    return Err(Error::ForcedSoftware);
                }
            } else if pwen != self.pwen {
                if let Err(err) = self.power_control(hw, pwen) {
                    rollback.set(control_1::PWEN, self.pwen as u32);
                    return Err(err);
                }
                self.pwen = pwen;
            }
        }
        if mask & control_1::BKEN != 0 {
            if self.config.backup_forced_hardware {
                rollback.set(control_1::BKEN, 0);
                return Err(Error::ForcedHardware);
            }
            let shadow = self.bkenst.as_bool().unwrap_or(false);
            let bken = control & control_1::BKEN != 0;
            if bken != shadow {
                if let Err(err) = hw.set_backup(bken).rebase(ErrorBase::Gps) {
                    rollback.set(control_1::BKEN, shadow as u32);
                    return Err(err);
                }
                self.bkenst = bken.into();
            }
        }
        Ok(())
    }
}

fn write_time(regs: &mut RegisterStore, time: &GpsTime, duration: SecsDurationU32) -> Result<()> {
    regs.apply(
        Register::TimeData0,
        RegisterUpdate::new()
            .with(time_data_0::YEAR, encode_year(time.year))
            .with(time_data_0::MONTH, time.month as u32)
            .with(time_data_0::DATE, time.date as u32),
    )?;
    regs.apply(
        Register::TimeData1,
        RegisterUpdate::new()
            .with(time_data_1::HOUR, time.hours as u32)
            .with(time_data_1::MINUTE, time.minutes as u32)
            .with(time_data_1::SECOND, time.seconds as u32),
    )?;
    regs.write_field(
        Register::TimeData2,
        fix_duration::FIX_DURATION,
        encode_seconds(duration.to_secs()),
    )
}

fn coordinate(degrees: u8, minutes: u8, seconds: u32, hemisphere: bool) -> RegisterUpdate {
    RegisterUpdate::new()
        .with(coordinate::DEGREE, degrees as u32)
        .with(coordinate::MINUTE, minutes as u32)
        .with(coordinate::SECOND, seconds)
        .with(coordinate::HEMISPHERE, hemisphere as u32)
}

fn write_position(
    regs: &mut RegisterStore,
    position: &GpsPosition,
    duration: SecsDurationU32,
) -> Result<()> {
    regs.apply(
        Register::GeolocData0,
        coordinate(
            position.lat_degrees,
            position.lat_minutes,
            position.lat_seconds,
            position.lat_north,
        ),
    )?;
    regs.apply(
        Register::GeolocData1,
        coordinate(
            position.long_degrees,
            position.long_minutes,
            position.long_seconds,
            position.long_east,
        ),
    )?;
    regs.write_field(Register::GeolocData2, geoloc_data_2::ALTITUDE, position.altitude)?;
    regs.write_field(
        Register::GeolocData3,
        fix_duration::FIX_DURATION,
        encode_seconds(duration.to_secs()),
    )
}

impl NodeDriver for Gpsm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.tpen = false;
        self.pwmd = false;
        self.pwen = false;
        self.gps_power = false;
        self.bkenst = BitRepresentation::Error;
        regs.apply(
            Register::Configuration0,
            RegisterUpdate::new()
                .with(configuration_0::AAF, self.config.active_antenna as u32)
                .with(configuration_0::BKFH, self.config.backup_forced_hardware as u32),
        )?;
        nvm::load_registers(
            hw,
            regs,
            [
                Register::Configuration1.into(),
                Register::Configuration2.into(),
                Register::Configuration3.into(),
            ],
        )?;
        Self::reset_analog_data(regs)?;
        self.refresh_status(regs, hw)?;
        let bken = self.bkenst.as_bool().unwrap_or(false);
        regs.write_field(Register::Control1, control_1::BKEN, bken as u32)
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
            Register::Configuration2 | Register::Configuration3 if mask != 0 => {
                // A running timepulse picks up the new settings.
                match nvm::store_register(hw, regs, register) {
                    Ok(()) if self.tpen => self.tpen_callback(regs, hw, true),
                    result => result,
                }
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
        let active_antenna = self.config.active_antenna;
        let mut status = AdcStatus::Success;
        self.with_power(regs, hw, |regs, hw| {
            let mut conversions = Conversions::perform(hw)?;
            let mut data = RegisterUpdate::new();
            if let Some(vgps_mv) = conversions.get(hw, AdcChannel::VgpsMv) {
                data.set(analog_data_1::VGPS, voltage_field(vgps_mv));
            }
            if active_antenna {
                if let Some(vant_mv) = conversions.get(hw, AdcChannel::VantMv) {
                    data.set(analog_data_1::VANT, voltage_field(vant_mv));
                }
            }
            status = conversions.status();
            regs.apply(Register::AnalogData1, data)
        })?;
        Ok(status)
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        [
            (
                Register::Configuration1.into(),
                RegisterUpdate::new()
                    .with(configuration_1::TIME_TIMEOUT, self.config.time_timeout.to_secs())
                    .with(configuration_1::GEOLOC_TIMEOUT, self.config.geoloc_timeout.to_secs()),
            ),
            (
                Register::Configuration2.into(),
                RegisterUpdate::new()
                    .with(configuration_2::TP_FREQUENCY, self.config.timepulse_frequency_hz),
            ),
            (
                Register::Configuration3.into(),
                RegisterUpdate::new().with(
                    configuration_3::TP_DUTY_CYCLE,
                    self.config.timepulse_duty_cycle_percent as u32,
                ),
            ),
        ]
        .into_iter()
        .collect()
    }
}

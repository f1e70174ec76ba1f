//! We use this mocking module in unit tests to emulate a board.

use fugit::{ExtU32, MillisDurationU32, SecsDurationU32};

use crate::{
    hal::{Adc, Delay, Gps, HalError, Load, Nvm, Power, Radio, Sigfox, System},
    types::{
        AdcChannel, ApplicationMessage, ControlMessage, DelayMode, DownlinkFrame, Fix, GpsPosition,
        GpsTime, MessageStatus, PowerDomain, RadioParameters, TestMode, TimepulseConfig,
    },
};

const ADC_CHANNELS: usize = 12;

/// Our mock type used to emulate every hardware action of a node.
///
/// Fields are public so tests can set up the board state, inject failures and inspect what the
/// drivers did.
pub struct MockHardware {
    pub nvm: [u8; 256],
    power: [bool; 3],
    pub output_state: bool,
    pub charge_state: bool,
    pub charge_status: bool,
    adc: [i32; ADC_CHANNELS],
    pub gps_time: Result<Fix<GpsTime>, HalError>,
    pub gps_position: Result<Fix<GpsPosition>, HalError>,
    /// Timeout passed to the last fix request.
    pub gps_timeout: Option<SecsDurationU32>,
    pub timepulse: Option<TimepulseConfig>,
    pub gps_backup: bool,
    pub radio_parameters: Option<RadioParameters>,
    pub continuous_wave: bool,
    pub listening: bool,
    pub rssi_dbm: i16,
    sigfox_open: bool,
    rfp_open: bool,
    pub message_status: MessageStatus,
    pub dl_frame: DownlinkFrame,
    pub sent_application_message: Option<ApplicationMessage>,
    pub sent_control_message: Option<ControlMessage>,
    pub test_mode: Option<TestMode>,
    pub delay_ms_total: u32,
    pub reset_requested: bool,

    /// Flag to simulate load switch errors
    pub fail_load: Option<HalError>,
    /// Flag to simulate load state read errors
    pub fail_load_read: Option<HalError>,
    pub fail_power_enable: Option<HalError>,
    pub fail_power_disable: Option<HalError>,
    pub fail_nvm: Option<HalError>,
    pub fail_adc_measurements: Option<HalError>,
    /// Channel whose conversion result is unavailable
    pub fail_adc_channel: Option<AdcChannel>,
    pub fail_radio_init: Option<HalError>,
    pub fail_radio_start: Option<HalError>,
    pub fail_sigfox_open: Option<HalError>,
    pub fail_sigfox_send: Option<HalError>,
    pub fail_rfp_test_mode: Option<HalError>,

    pub set_output_count: u32,
    pub set_charge_count: u32,
    pub power_enable_count: u32,
    pub power_disable_count: u32,
    pub measurements_count: u32,
    pub radio_wake_up_count: u32,
    pub radio_sleep_count: u32,
    pub sigfox_close_count: u32,
    pub rfp_close_count: u32,
}

impl MockHardware {
    /// Create a board with everything off, blank NVM and no pending failures.
    pub fn new() -> Self {
        Self {
            nvm: [0; 256],
            power: [false; 3],
            output_state: false,
            charge_state: false,
            charge_status: false,
            adc: [0; ADC_CHANNELS],
            gps_time: Err(HalError::Timeout),
            gps_position: Err(HalError::Timeout),
            gps_timeout: None,
            timepulse: None,
            gps_backup: false,
            radio_parameters: None,
            continuous_wave: false,
            listening: false,
            rssi_dbm: -120,
            sigfox_open: false,
            rfp_open: false,
            message_status: MessageStatus::new(),
            dl_frame: DownlinkFrame::default(),
            sent_application_message: None,
            sent_control_message: None,
            test_mode: None,
            delay_ms_total: 0,
            reset_requested: false,
            fail_load: None,
            fail_load_read: None,
            fail_power_enable: None,
            fail_power_disable: None,
            fail_nvm: None,
            fail_adc_measurements: None,
            fail_adc_channel: None,
            fail_radio_init: None,
            fail_radio_start: None,
            fail_sigfox_open: None,
            fail_sigfox_send: None,
            fail_rfp_test_mode: None,
            set_output_count: 0,
            set_charge_count: 0,
            power_enable_count: 0,
            power_disable_count: 0,
            measurements_count: 0,
            radio_wake_up_count: 0,
            radio_sleep_count: 0,
            sigfox_close_count: 0,
            rfp_close_count: 0,
        }
    }

    pub fn powered(&self, domain: PowerDomain) -> bool {
        self.power[domain as usize]
    }

    pub fn set_powered(&mut self, domain: PowerDomain, state: bool) {
        self.power[domain as usize] = state;
    }

    pub fn set_adc(&mut self, channel: AdcChannel, value: i32) {
        self.adc[channel as usize] = value;
    }

    pub fn sigfox_is_open(&self) -> bool {
        self.sigfox_open
    }

    pub fn rfp_is_open(&self) -> bool {
        self.rfp_open
    }

    /// Make the next time fix succeed after `secs` seconds.
    pub fn set_time_fix(&mut self, data: GpsTime, secs: u32) {
        self.gps_time = Ok(Fix { data, duration: secs.secs() });
    }

    pub fn set_position_fix(&mut self, data: GpsPosition, secs: u32) {
        self.gps_position = Ok(Fix { data, duration: secs.secs() });
    }

    fn check(failure: Option<HalError>) -> Result<(), HalError> {
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Load for MockHardware {
    fn set_output_state(&mut self, state: bool) -> Result<(), HalError> {
        self.set_output_count += 1;
        Self::check(self.fail_load)?;
        self.output_state = state;
        Ok(())
    }

    fn get_output_state(&mut self) -> Result<bool, HalError> {
        Self::check(self.fail_load_read)?;
        Ok(self.output_state)
    }

    fn set_charge_state(&mut self, state: bool) -> Result<(), HalError> {
        self.set_charge_count += 1;
        Self::check(self.fail_load)?;
        self.charge_state = state;
        Ok(())
    }

    fn get_charge_state(&mut self) -> Result<bool, HalError> {
        Ok(self.charge_state)
    }

    fn get_charge_status(&mut self) -> Result<bool, HalError> {
        Ok(self.charge_status)
    }
}

impl Power for MockHardware {
    fn enable(&mut self, domain: PowerDomain, _delay_mode: DelayMode) -> Result<(), HalError> {
        self.power_enable_count += 1;
        Self::check(self.fail_power_enable)?;
        self.set_powered(domain, true);
        Ok(())
    }

    fn disable(&mut self, domain: PowerDomain) -> Result<(), HalError> {
        self.power_disable_count += 1;
        Self::check(self.fail_power_disable)?;
        self.set_powered(domain, false);
        Ok(())
    }

    fn is_enabled(&mut self, domain: PowerDomain) -> Result<bool, HalError> {
        Ok(self.powered(domain))
    }
}

impl Adc for MockHardware {
    fn perform_measurements(&mut self) -> Result<(), HalError> {
        self.measurements_count += 1;
        Self::check(self.fail_adc_measurements)
    }

    fn get_data(&mut self, channel: AdcChannel) -> Result<i32, HalError> {
        if self.fail_adc_channel == Some(channel) {
            return Err(HalError::Failure(0x0A));
        }
        Ok(self.adc[channel as usize])
    }
}

impl Gps for MockHardware {
    fn get_time(&mut self, timeout: SecsDurationU32) -> Result<Fix<GpsTime>, HalError> {
        self.gps_timeout = Some(timeout);
        self.gps_time
    }

    fn get_position(&mut self, timeout: SecsDurationU32) -> Result<Fix<GpsPosition>, HalError> {
        self.gps_timeout = Some(timeout);
        self.gps_position
    }

    fn configure_timepulse(&mut self, config: &TimepulseConfig) -> Result<(), HalError> {
        self.timepulse = Some(*config);
        Ok(())
    }

    fn get_backup(&mut self) -> Result<bool, HalError> {
        Ok(self.gps_backup)
    }

    fn set_backup(&mut self, state: bool) -> Result<(), HalError> {
        self.gps_backup = state;
        Ok(())
    }
}

impl Radio for MockHardware {
    fn wake_up(&mut self) -> Result<(), HalError> {
        self.radio_wake_up_count += 1;
        self.set_powered(PowerDomain::Radio, true);
        Ok(())
    }

    fn init(&mut self, parameters: &RadioParameters) -> Result<(), HalError> {
        Self::check(self.fail_radio_init)?;
        self.radio_parameters = Some(*parameters);
        Ok(())
    }

    fn start_continuous_wave(&mut self) -> Result<(), HalError> {
        Self::check(self.fail_radio_start)?;
        self.continuous_wave = true;
        Ok(())
    }

    fn start_rx(&mut self) -> Result<(), HalError> {
        Self::check(self.fail_radio_start)?;
        self.listening = true;
        Ok(())
    }

    fn get_rssi(&mut self) -> Result<i16, HalError> {
        Ok(self.rssi_dbm)
    }

    fn de_init(&mut self) -> Result<(), HalError> {
        self.continuous_wave = false;
        self.listening = false;
        self.set_powered(PowerDomain::Radio, false);
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), HalError> {
        self.radio_sleep_count += 1;
        self.set_powered(PowerDomain::Radio, false);
        Ok(())
    }
}

impl Sigfox for MockHardware {
    fn open(&mut self) -> Result<(), HalError> {
        Self::check(self.fail_sigfox_open)?;
        self.sigfox_open = true;
        Ok(())
    }

    fn send_application_message(
        &mut self,
        message: &ApplicationMessage,
    ) -> Result<MessageStatus, HalError> {
        Self::check(self.fail_sigfox_send)?;
        self.sent_application_message = Some(message.clone());
        Ok(self.message_status)
    }

    fn send_control_message(
        &mut self,
        message: &ControlMessage,
    ) -> Result<MessageStatus, HalError> {
        Self::check(self.fail_sigfox_send)?;
        self.sent_control_message = Some(*message);
        Ok(self.message_status)
    }

    fn get_dl_frame(&mut self) -> Result<DownlinkFrame, HalError> {
        Ok(self.dl_frame)
    }

    fn close(&mut self) -> Result<(), HalError> {
        self.sigfox_close_count += 1;
        self.sigfox_open = false;
        Ok(())
    }

    fn rfp_open(&mut self) -> Result<(), HalError> {
        self.rfp_open = true;
        Ok(())
    }

    fn rfp_test_mode(&mut self, test_mode: &TestMode) -> Result<(), HalError> {
        Self::check(self.fail_rfp_test_mode)?;
        self.test_mode = Some(*test_mode);
        Ok(())
    }

    fn rfp_close(&mut self) -> Result<(), HalError> {
        self.rfp_close_count += 1;
        self.rfp_open = false;
        Ok(())
    }
}

impl Nvm for MockHardware {
    fn read_byte(&mut self, address: u16) -> Result<u8, HalError> {
        Self::check(self.fail_nvm)?;
        self.nvm
            .get(address as usize)
            .copied()
            .ok_or(HalError::Failure(0x01))
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), HalError> {
        Self::check(self.fail_nvm)?;
        let slot = self
            .nvm
            .get_mut(address as usize)
            .ok_or(HalError::Failure(0x01))?;
        *slot = value;
        Ok(())
    }
}

impl Delay for MockHardware {
    fn delay_ms(&mut self, duration: MillisDurationU32, _mode: DelayMode) -> Result<(), HalError> {
        self.delay_ms_total += duration.to_millis();
        Ok(())
    }
}

impl System for MockHardware {
    fn request_reset(&mut self) {
        self.reset_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_failures() {
        let mut hw = MockHardware::new();
        hw.fail_load = Some(HalError::Failure(2));
        assert_eq!(hw.set_output_state(true), Err(HalError::Failure(2)));
        assert!(!hw.output_state);
        assert_eq!(hw.set_output_count, 1);
    }

    #[test]
    fn test_radio_follows_power_domain() {
        let mut hw = MockHardware::new();
        hw.wake_up().unwrap();
        assert!(hw.powered(PowerDomain::Radio));
        hw.sleep().unwrap();
        assert!(!hw.powered(PowerDomain::Radio));
    }
}

//! UHF radio module.
//!
//! Messages go through the Sigfox end-point library, opened for the duration of one request.
//! The transceiver is also driven directly for radio tests (continuous wave and continuous
//! listening) and for the radio supply measurement. Only one of these activities may own the
//! radio at a time: a request finding the radio domain already on is refused with
//! [`Error::ResourceBusy`].

use fugit::MillisDurationU32;
use log::{debug, info, warn};

use crate::{
    codec::{
        decode_dbm, encode_dbm, read_field, MASK_ALL, RF_POWER_ERROR_VALUE, VOLTAGE_ERROR_VALUE,
    },
    config::UhfmConfig,
    error::{Error, ErrorBase, Rebase, Result},
    guard::{RfpSession, SigfoxSession},
    hal::{Hardware, Power, Radio},
    nodes::{take_triggers, voltage_field, Conversions, FactoryDefaults, NodeDriver},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::uhfm::{
        analog_data_1, configuration_0, configuration_1, control_1, radio_test_0, radio_test_1,
        status_1, Register, RADIO_TEST_0_DEFAULT, RADIO_TEST_1_DEFAULT,
    },
    types::{
        AdcChannel, AdcStatus, ApplicationMessage, ApplicationMessageType, ControlMessage,
        DelayMode, MessageStatus, PowerDomain, RadioParameters, RfMode, TestMode, UlBitRate,
        EP_ID_SIZE_BYTES, EP_KEY_SIZE_BYTES, UL_PAYLOAD_MAX_SIZE_BYTES,
    },
};

/// Settling time between radio start and supply sampling.
const RADIO_STABILIZATION_DELAY: MillisDurationU32 = MillisDurationU32::millis(100);
const VRF_MEASUREMENT_FREQUENCY_HZ: u32 = 830_000_000;
const VRF_MEASUREMENT_TX_POWER_DBM: i16 = 14;

#[derive(Debug)]
pub struct Uhfm {
    config: UhfmConfig,
    /// Continuous wave running.
    cwen: bool,
    /// Continuous listening running.
    rsen: bool,
}

/// What a message request reports in STATUS_1.
#[derive(Default)]
struct MessageOutcome {
    status: MessageStatus,
    /// Counter read before a bidirectional message.
    message_counter: Option<u16>,
    dl_rssi_dbm: Option<i16>,
}

impl MessageOutcome {
    fn status_update(&self) -> RegisterUpdate {
        let status = u32::from(self.status);
        let mut update = RegisterUpdate::new().with(status_1::MESSAGE_STATUS, status);
        if let Some(counter) = self.message_counter {
            if status != 0 {
                update.set(status_1::BIDIRECTIONAL_MC, counter as u32 + 1);
            }
            let rssi = self.dl_rssi_dbm.map_or(RF_POWER_ERROR_VALUE, encode_dbm);
            update.set(status_1::DL_RSSI, rssi);
        }
        update
    }
}

impl Uhfm {
    pub fn new(config: UhfmConfig) -> Self {
        Self { config, cwen: false, rsen: false }
    }

    fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
        regs.apply(
            Register::AnalogData1,
            RegisterUpdate::new()
                .with(analog_data_1::VRF_TX, VOLTAGE_ERROR_VALUE)
                .with(analog_data_1::VRF_RX, VOLTAGE_ERROR_VALUE),
        )
    }

    fn ul_bit_rate(regs: &RegisterStore) -> Result<UlBitRate> {
        let br = regs.read_field(Register::Configuration0, configuration_0::BR)?;
        UlBitRate::try_from(br).map_err(|_| Error::InvalidParameter)
    }

    fn number_of_frames(regs: &RegisterStore) -> Result<u8> {
        Ok(regs.read_field(Register::Configuration0, configuration_0::NFR)? as u8)
    }

    fn check_radio_free<H: Power>(hw: &mut H) -> Result<()> {
        if hw.is_enabled(PowerDomain::Radio).rebase(ErrorBase::Power)? {
            return Err(Error::ResourceBusy);
        }
        Ok(())
    }

    /// Start an unmodulated transmission or a continuous reception with the RADIO_TEST settings.
    fn start_radio<H: Hardware>(regs: &RegisterStore, hw: &mut H, mode: RfMode) -> Result<()> {
        Self::check_radio_free(hw)?;
        let tx_power_dbm = match mode {
            RfMode::Tx => {
                let field = regs.read_field(Register::RadioTest1, radio_test_1::TX_POWER)?;
                decode_dbm(field)
                    .and_then(|dbm| i8::try_from(dbm).ok())
                    .ok_or(Error::InvalidParameter)?
            }
            RfMode::Rx => 0,
        };
        let parameters = RadioParameters {
            mode,
            frequency_hz: regs.read_field(Register::RadioTest0, radio_test_0::RF_FREQUENCY)?,
            tx_power_dbm,
        };
        let started = hw.wake_up().and_then(|()| hw.init(&parameters)).and_then(|()| match mode {
            RfMode::Tx => hw.start_continuous_wave(),
            RfMode::Rx => hw.start_rx(),
        });
        if let Err(err) = started {
            if let Err(stop) = Self::stop_radio(hw) {
                warn!("radio cleanup failed: {}", stop);
            }
            return Err(Error::from_hal(ErrorBase::Radio, err));
        }
        debug!("radio started ({:?}, {} Hz)", mode, parameters.frequency_hz);
        Ok(())
    }

    fn stop_radio<H: Radio>(hw: &mut H) -> Result<()> {
        let de_init = hw.de_init().rebase(ErrorBase::Radio);
        let sleep = hw.sleep().rebase(ErrorBase::Radio);
        de_init.and(sleep)
    }

    fn radio_test<H: Hardware>(
        regs: &RegisterStore,
        hw: &mut H,
        mode: RfMode,
        state: bool,
    ) -> Result<()> {
        if state {
            Self::start_radio(regs, hw, mode)
        } else {
            Self::stop_radio(hw)
        }
    }

    fn strg_callback<H: Hardware>(
        regs: &mut RegisterStore,
        hw: &mut H,
        control: u32,
    ) -> Result<()> {
        Self::check_radio_free(hw)?;
        let mut outcome = MessageOutcome::default();
        let result = if control & control_1::CMSG != 0 {
            Self::send_control_message(regs, hw, &mut outcome)
        } else {
            Self::send_application_message(regs, hw, control, &mut outcome)
        };
        regs.apply(Register::Status1, outcome.status_update())?;
        info!("message request done (status {:#04x})", u32::from(outcome.status));
        result
    }

    fn send_control_message<H: Hardware>(
        regs: &RegisterStore,
        hw: &mut H,
        outcome: &mut MessageOutcome,
    ) -> Result<()> {
        let message = ControlMessage {
            number_of_frames: Self::number_of_frames(regs)?,
            ul_bit_rate: Self::ul_bit_rate(regs)?,
        };
        let mut session = SigfoxSession::open(hw)?;
        outcome.status = session.send_control_message(&message).rebase(ErrorBase::Sigfox)?;
        Ok(())
    }

    fn send_application_message<H: Hardware>(
        regs: &mut RegisterStore,
        hw: &mut H,
        control: u32,
        outcome: &mut MessageOutcome,
    ) -> Result<()> {
        let size = read_field(control, control_1::UL_PAYLOAD_SIZE) as usize;
        if size > UL_PAYLOAD_MAX_SIZE_BYTES {
            return Err(Error::InvalidParameter);
        }
        let mut bytes = [0u8; UL_PAYLOAD_MAX_SIZE_BYTES];
        regs.read_bytes(Register::SigfoxUlPayload0, &mut bytes[..size])?;
        let message_type = ApplicationMessageType::try_from(read_field(control, control_1::MSGT))
            .map_err(|_| Error::InvalidParameter)?;
        let message = ApplicationMessage {
            number_of_frames: Self::number_of_frames(regs)?,
            ul_bit_rate: Self::ul_bit_rate(regs)?,
            message_type,
            bidirectional: control & control_1::BF != 0,
            payload: heapless::Vec::from_slice(&bytes[..size])
                .map_err(|_| Error::InvalidParameter)?,
        };
        if message.bidirectional {
            outcome.message_counter = Some(nvm::read_message_counter(hw)?);
        }

        let mut session = SigfoxSession::open(hw)?;
        outcome.status = session.send_application_message(&message).rebase(ErrorBase::Sigfox)?;
        if message.bidirectional && outcome.status.dl_frame() {
            let frame = session.get_dl_frame().rebase(ErrorBase::Sigfox)?;
            regs.write_bytes(Register::SigfoxDlPayload0, &frame.payload)?;
            regs.write_bytes(Register::SigfoxDlPhyContent0, &frame.phy_content)?;
            outcome.dl_rssi_dbm = Some(frame.rssi_dbm);
            info!("downlink received (RSSI {} dBm)", frame.rssi_dbm);
        }
        Ok(())
    }

    fn ttrg_callback<H: Hardware>(regs: &RegisterStore, hw: &mut H, control: u32) -> Result<()> {
        Self::check_radio_free(hw)?;
        let test_mode = TestMode {
            reference: read_field(control, control_1::RFP_TEST_MODE) as u8,
            ul_bit_rate: Self::ul_bit_rate(regs)?,
        };
        let mut session = RfpSession::open(hw)?;
        session.rfp_test_mode(&test_mode).rebase(ErrorBase::SigfoxRfp)?;
        info!("RF test mode {} done", test_mode.reference);
        Ok(())
    }

    fn check_control_1<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        mask: u32,
        rollback: &mut RegisterUpdate,
    ) -> Result<()> {
        let control = regs.read(Register::Control1)?;
        let triggers = control_1::STRG | control_1::TTRG;
        let fired = take_triggers(regs, Register::Control1, mask, triggers)?;

        if fired & control_1::STRG != 0 {
            Self::strg_callback(regs, hw, control)?;
        }
        if fired & control_1::TTRG != 0 {
            Self::ttrg_callback(regs, hw, control)?;
        }
        if mask & control_1::CWEN != 0 {
            let cwen = control & control_1::CWEN != 0;
            if cwen != self.cwen {
                if let Err(err) = Self::radio_test(regs, hw, RfMode::Tx, cwen) {
                    rollback.set(control_1::CWEN, self.cwen as u32);
                    return Err(err);
                }
                self.cwen = cwen;
                info!("continuous wave {}", if cwen { "started" } else { "stopped" });
            }
        }
        if mask & control_1::RSEN != 0 {
            let rsen = control & control_1::RSEN != 0;
            if rsen != self.rsen {
                if let Err(err) = Self::radio_test(regs, hw, RfMode::Rx, rsen) {
                    rollback.set(control_1::RSEN, self.rsen as u32);
                    return Err(err);
                }
                self.rsen = rsen;
                info!("continuous listening {}", if rsen { "started" } else { "stopped" });
            }
        }
        Ok(())
    }

    /// Radio supply voltage while the transceiver runs in `mode`.
    fn radio_supply<H: Hardware>(
        regs: &RegisterStore,
        hw: &mut H,
        mode: RfMode,
    ) -> Result<(Option<i32>, AdcStatus)> {
        Self::start_radio(regs, hw, mode)?;
        let sample = hw
            .delay_ms(RADIO_STABILIZATION_DELAY, DelayMode::Sleep)
            .rebase(ErrorBase::Delay)
            .and_then(|()| Conversions::perform(hw))
            .map(|mut conversions| (conversions.get(hw, AdcChannel::VrfMv), conversions.status()));
        let stop = Self::stop_radio(hw);
        let sample = sample?;
        stop?;
        Ok(sample)
    }

    fn measure_radio_supply<H: Hardware>(
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<AdcStatus> {
        let mut status = AdcStatus::Success;
        let mut data = RegisterUpdate::new();
        let channels = [(RfMode::Tx, analog_data_1::VRF_TX), (RfMode::Rx, analog_data_1::VRF_RX)];
        for (mode, field) in channels {
            let (vrf_mv, conversion) = Self::radio_supply(regs, hw, mode)?;
            if let Some(vrf_mv) = vrf_mv {
                data.set(field, voltage_field(vrf_mv));
            }
            if status.is_success() {
                status = conversion;
            }
        }
        regs.apply(Register::AnalogData1, data)?;
        Ok(status)
    }
}

impl NodeDriver for Uhfm {
    fn init_registers<H: Hardware>(&mut self, regs: &mut RegisterStore, hw: &mut H) -> Result<()> {
        self.cwen = false;
        self.rsen = false;

        let mut ep_id = [0u8; EP_ID_SIZE_BYTES];
        nvm::read_bytes(hw, nvm::SIGFOX_EP_ID, &mut ep_id)?;
        regs.write_bytes(Register::SigfoxEpId, &ep_id)?;
        let mut ep_key = [0u8; EP_KEY_SIZE_BYTES];
        nvm::read_bytes(hw, nvm::SIGFOX_EP_KEY, &mut ep_key)?;
        regs.write_bytes(Register::SigfoxEpKey0, &ep_key)?;

        let persisted = [Register::Configuration0 as u8, Register::Configuration1 as u8];
        nvm::load_registers(hw, regs, persisted)?;
        regs.apply(
            Register::Configuration0,
            RegisterUpdate::new()
                .with(configuration_0::TX_POWER, encode_dbm(self.config.tx_power_dbm as i16))
                .with(configuration_0::RC, 0),
        )?;
        nvm::store_register(hw, regs, Register::Configuration0)?;
        regs.apply(
            Register::Configuration1,
            RegisterUpdate::new()
                .with(configuration_1::TIFU, self.config.tifu.to_millis())
                .with(configuration_1::TCONF, self.config.tconf.to_millis()),
        )?;
        nvm::store_register(hw, regs, Register::Configuration1)?;

        Self::reset_analog_data(regs)?;
        regs.write(Register::RadioTest0, MASK_ALL, RADIO_TEST_0_DEFAULT)?;
        regs.write(Register::RadioTest1, MASK_ALL, RADIO_TEST_1_DEFAULT)
    }

    fn update_register<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
        addr: u8,
    ) -> Result<()> {
        if Register::try_from(addr) != Ok(Register::RadioTest1) || !self.rsen {
            return Ok(());
        }
        if hw.is_enabled(PowerDomain::Radio).rebase(ErrorBase::Power)? {
            let rssi_dbm = hw.get_rssi().rebase(ErrorBase::Radio)?;
            regs.write_field(Register::RadioTest1, radio_test_1::RSSI, encode_dbm(rssi_dbm))?;
        }
        Ok(())
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
            Register::Configuration0 | Register::Configuration1 if mask != 0 => {
                nvm::store_register(hw, regs, register)
            }
            Register::Control1 => self.check_control_1(regs, hw, mask, &mut rollback),
            _ => Ok(()),
        };
        regs.apply(Register::Control1, rollback)?;
        result
    }

    fn mtrg_callback<H: Hardware>(
        &mut self,
        regs: &mut RegisterStore,
        hw: &mut H,
    ) -> Result<AdcStatus> {
        Self::reset_analog_data(regs)?;
        let radio_test_0 = regs.read(Register::RadioTest0)?;
        let radio_test_1 = regs.read(Register::RadioTest1)?;
        regs.write_field(
            Register::RadioTest0,
            radio_test_0::RF_FREQUENCY,
            VRF_MEASUREMENT_FREQUENCY_HZ,
        )?;
        regs.write_field(
            Register::RadioTest1,
            radio_test_1::TX_POWER,
            encode_dbm(VRF_MEASUREMENT_TX_POWER_DBM),
        )?;
        let result = Self::measure_radio_supply(regs, hw);
        regs.write(Register::RadioTest0, MASK_ALL, radio_test_0)?;
        regs.write(Register::RadioTest1, MASK_ALL, radio_test_1)?;
        result
    }

    fn factory_defaults(&self) -> FactoryDefaults {
        [
            (
                Register::Configuration0.into(),
                RegisterUpdate::new()
                    .with(configuration_0::NFR, self.config.number_of_frames as u32)
                    .with(configuration_0::BR, self.config.ul_bit_rate as u32)
                    .with(configuration_0::TX_POWER, encode_dbm(self.config.tx_power_dbm as i16))
                    .with(configuration_0::RC, 0),
            ),
            (
                Register::Configuration1.into(),
                RegisterUpdate::new()
                    .with(configuration_1::TIFU, self.config.tifu.to_millis())
                    .with(configuration_1::TCONF, self.config.tconf.to_millis()),
            ),
        ]
        .into_iter()
        .collect()
    }
}

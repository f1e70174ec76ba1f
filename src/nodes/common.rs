//! Common register block, identical on every board.

use log::{debug, info};

use crate::{
    codec::{encode_tenth_degrees, MASK_ALL, TEMPERATURE_ERROR_VALUE, VOLTAGE_ERROR_VALUE},
    config::NodeConfig,
    error::{ErrorBase, Rebase, Result},
    hal::Hardware,
    nodes::{voltage_field, Conversions},
    nvm,
    register::{RegisterStore, RegisterUpdate},
    registers::common::{
        analog_data_0, control_0, flags_1, hw_version, node_id, sw_version_1, Register,
    },
    types::{AdcChannel, AdcStatus, SwVersion0},
};

pub fn init_registers<H: Hardware>(
    regs: &mut RegisterStore,
    hw: &mut H,
    config: &NodeConfig,
) -> Result<()> {
    let node_addr = hw.read_byte(nvm::SELF_ADDRESS).rebase(ErrorBase::Nvm)?;
    regs.apply(
        Register::NodeId,
        RegisterUpdate::new()
            .with(node_id::NODE_ADDR, node_addr as u32)
            .with(node_id::BOARD_ID, config.board_id() as u32),
    )?;
    regs.apply(
        Register::HwVersion,
        RegisterUpdate::new()
            .with(hw_version::MAJOR, config.hw_version.major as u32)
            .with(hw_version::MINOR, config.hw_version.minor as u32),
    )?;
    let sw_version = config.sw_version;
    let sw_version_0 = SwVersion0::new()
        .with_major(sw_version.major)
        .with_minor(sw_version.minor)
        .with_commit_index(sw_version.commit_index)
        .with_dirty(sw_version.dirty);
    regs.write(Register::SwVersion0, MASK_ALL, sw_version_0.into())?;
    regs.write_field(Register::SwVersion1, sw_version_1::COMMIT_ID, sw_version.commit_id)?;
    regs.write_field(Register::Flags1, flags_1::BF, 1)?;
    regs.write(Register::ErrorStack, MASK_ALL, 0)?;
    regs.write(Register::Control0, MASK_ALL, 0)?;
    reset_analog_data(regs)?;
    info!(
        "node {:#04x} ({:?}) registers initialized",
        node_addr,
        config.board_id()
    );
    Ok(())
}

fn reset_analog_data(regs: &mut RegisterStore) -> Result<()> {
    regs.apply(
        Register::AnalogData0,
        RegisterUpdate::new()
            .with(analog_data_0::VMCU, VOLTAGE_ERROR_VALUE)
            .with(analog_data_0::TMCU, TEMPERATURE_ERROR_VALUE),
    )
}

/// Handle a write to the common block.
///
/// Returns `true` when a measurement was requested, which the caller runs once the board driver
/// is reachable.
pub fn check_register<H: Hardware>(
    regs: &mut RegisterStore,
    hw: &mut H,
    addr: u8,
    mask: u32,
) -> Result<bool> {
    if Register::try_from(addr) != Ok(Register::Control0) {
        return Ok(false);
    }
    let fired = super::take_triggers(
        regs,
        addr,
        mask,
        control_0::RTRG | control_0::MTRG | control_0::BFC,
    )?;
    if fired & control_0::BFC != 0 {
        regs.write_field(Register::Flags1, flags_1::BF, 0)?;
        debug!("boot flag cleared");
    }
    if fired & control_0::RTRG != 0 {
        info!("reset requested");
        hw.request_reset();
    }
    Ok(fired & control_0::MTRG != 0)
}

/// Measure the MCU supply voltage and temperature.
pub fn mtrg_callback<H: Hardware>(regs: &mut RegisterStore, hw: &mut H) -> Result<AdcStatus> {
    reset_analog_data(regs)?;
    let mut conversions = Conversions::perform(hw)?;
    let mut data = RegisterUpdate::new();
    if let Some(vmcu_mv) = conversions.get(hw, AdcChannel::VmcuMv) {
        data.set(analog_data_0::VMCU, voltage_field(vmcu_mv));
    }
    if let Some(tmcu) = conversions.get(hw, AdcChannel::TmcuTenthDegrees) {
        data.set(analog_data_0::TMCU, encode_tenth_degrees(tmcu));
    }
    regs.apply(Register::AnalogData0, data)?;
    Ok(conversions.status())
}

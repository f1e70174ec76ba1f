//! Layout of the node non-volatile memory.

use log::debug;

use crate::{
    error::{ErrorBase, Rebase, Result},
    hal::Nvm,
    register::RegisterStore,
};

/// Node address on the bus.
pub const SELF_ADDRESS: u16 = 0x00;
pub const SIGFOX_EP_ID: u16 = 0x01;
pub const SIGFOX_EP_KEY: u16 = 0x05;
/// Sigfox library state.
pub const SIGFOX_LIB_DATA: u16 = 0x15;
pub const SIGFOX_MESSAGE_COUNTER_MSB: u16 = SIGFOX_LIB_DATA + 2;
pub const SIGFOX_MESSAGE_COUNTER_LSB: u16 = SIGFOX_LIB_DATA + 3;
/// Current sense amplifier offset in mA.
pub const LT6106_OFFSET_CURRENT_MA: u16 = 0x1D;
/// First byte of the register images.
pub const REGISTERS: u16 = 0x40;

const fn register_address(addr: u8) -> u16 {
    REGISTERS + 4 * addr as u16
}

pub fn read_bytes<N: Nvm + ?Sized>(nvm: &mut N, address: u16, bytes: &mut [u8]) -> Result<()> {
    for (offset, byte) in (address..).zip(bytes.iter_mut()) {
        *byte = nvm.read_byte(offset).rebase(ErrorBase::Nvm)?;
    }
    Ok(())
}

/// Read the persisted image of register `addr`.
pub fn read_register<N: Nvm + ?Sized>(nvm: &mut N, addr: impl Into<u8>) -> Result<u32> {
    let mut bytes = [0u8; 4];
    read_bytes(nvm, register_address(addr.into()), &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn write_register<N: Nvm + ?Sized>(nvm: &mut N, addr: impl Into<u8>, value: u32) -> Result<()> {
    let addr = addr.into();
    for (offset, byte) in (register_address(addr)..).zip(value.to_le_bytes()) {
        nvm.write_byte(offset, byte).rebase(ErrorBase::Nvm)?;
    }
    debug!("register {} persisted ({:#010x})", addr, value);
    Ok(())
}

/// Copy the persisted images of `addrs` into the store.
pub fn load_registers<N: Nvm + ?Sized>(
    nvm: &mut N,
    regs: &mut RegisterStore,
    addrs: impl IntoIterator<Item = u8>,
) -> Result<()> {
    for addr in addrs {
        let value = read_register(nvm, addr)?;
        regs.write(addr, crate::codec::MASK_ALL, value)?;
    }
    Ok(())
}

/// Mirror register `addr` of the store to its persisted image.
pub fn store_register<N: Nvm + ?Sized>(
    nvm: &mut N,
    regs: &RegisterStore,
    addr: impl Into<u8>,
) -> Result<()> {
    let addr = addr.into();
    write_register(nvm, addr, regs.read(addr)?)
}

/// Message counter of the Sigfox library.
pub fn read_message_counter<N: Nvm + ?Sized>(nvm: &mut N) -> Result<u16> {
    let msb = nvm.read_byte(SIGFOX_MESSAGE_COUNTER_MSB).rebase(ErrorBase::Nvm)?;
    let lsb = nvm.read_byte(SIGFOX_MESSAGE_COUNTER_LSB).rebase(ErrorBase::Nvm)?;
    Ok(u16::from_be_bytes([msb, lsb]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, hal::HalError, mock_hardware::MockHardware, register::Access};

    #[test]
    fn test_register_images_are_little_endian() {
        let mut hw = MockHardware::new();
        write_register(&mut hw, 9u8, 0x1122_3344).unwrap();
        assert_eq!(&hw.nvm[0x64..0x68], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(read_register(&mut hw, 9u8).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_load_and_store_registers() {
        static ACCESS: [Access; 3] = [Access::ReadOnly, Access::ReadWrite, Access::ReadWrite];
        let mut hw = MockHardware::new();
        let mut regs = RegisterStore::new(&ACCESS).unwrap();
        write_register(&mut hw, 1u8, 0xCAFE_0001).unwrap();
        write_register(&mut hw, 2u8, 0xCAFE_0002).unwrap();
        load_registers(&mut hw, &mut regs, 1..=2).unwrap();
        assert_eq!(regs.read(2u8).unwrap(), 0xCAFE_0002);

        regs.write(1u8, 0xFFFF, 0x1234).unwrap();
        store_register(&mut hw, &regs, 1u8).unwrap();
        assert_eq!(read_register(&mut hw, 1u8).unwrap(), 0xCAFE_1234);
    }

    #[test]
    fn test_message_counter() {
        let mut hw = MockHardware::new();
        hw.nvm[SIGFOX_MESSAGE_COUNTER_MSB as usize] = 0x01;
        hw.nvm[SIGFOX_MESSAGE_COUNTER_LSB as usize] = 0x2C;
        assert_eq!(read_message_counter(&mut hw).unwrap(), 300);
    }

    #[test]
    fn test_failures_are_rebased() {
        let mut hw = MockHardware::new();
        hw.fail_nvm = Some(HalError::Failure(0x04));
        assert_eq!(
            write_register(&mut hw, 3u8, 0),
            Err(Error::SubsystemFailure { base: ErrorBase::Nvm, code: 0x04 })
        );
    }
}

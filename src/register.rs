//! Register store of a node.
//!
//! A node exposes an array of 32-bit registers. All writes are masked: only the bits set in the
//! mask are modified. The access class of each register is fixed by the board register map and
//! only checked for requests coming from the bus.

use log::debug;

use crate::{
    codec::{apply_mask, field_bits, read_field},
    error::{Error, Result},
};

/// Largest register map of all boards.
pub const MAX_REGISTERS: usize = 32;

/// Access class of a register, as seen from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Accumulates field writes before they are applied to a register in one go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterUpdate {
    pub value: u32,
    pub mask: u32,
}

impl RegisterUpdate {
    pub const fn new() -> Self {
        Self { value: 0, mask: 0 }
    }

    /// Stage `field` into the bits selected by `mask`.
    pub const fn with(mut self, mask: u32, field: u32) -> Self {
        self.value = apply_mask(self.value, mask, field_bits(field, mask));
        self.mask |= mask;
        self
    }

    pub fn set(&mut self, mask: u32, field: u32) {
        *self = self.with(mask, field);
    }

    pub const fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

/// Register array of one node.
#[derive(Debug, Clone)]
pub struct RegisterStore {
    values: heapless::Vec<u32, MAX_REGISTERS>,
    access: &'static [Access],
}

impl RegisterStore {
    /// Create a zeroed store with one register per entry of `access`.
    pub fn new(access: &'static [Access]) -> Result<Self> {
        let mut values = heapless::Vec::new();
        values
            .resize(access.len(), 0)
            .map_err(|_| Error::InvalidParameter)?;
        Ok(Self { values, access })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn access(&self, addr: impl Into<u8>) -> Result<Access> {
        self.access
            .get(addr.into() as usize)
            .copied()
            .ok_or(Error::InvalidParameter)
    }

    /// Reject bus writes to read-only registers.
    pub fn check_external_write(&self, addr: impl Into<u8>) -> Result<()> {
        let addr = addr.into();
        match self.access(addr)? {
            Access::ReadWrite => Ok(()),
            Access::ReadOnly => Err(Error::ReadOnly(addr)),
        }
    }

    pub fn read(&self, addr: impl Into<u8>) -> Result<u32> {
        self.values
            .get(addr.into() as usize)
            .copied()
            .ok_or(Error::InvalidParameter)
    }

    pub fn read_field(&self, addr: impl Into<u8>, mask: u32) -> Result<u32> {
        Ok(read_field(self.read(addr)?, mask))
    }

    /// Masked write: bits outside `mask` are left untouched.
    pub fn write(&mut self, addr: impl Into<u8>, mask: u32, value: u32) -> Result<()> {
        let addr = addr.into();
        let slot = self
            .values
            .get_mut(addr as usize)
            .ok_or(Error::InvalidParameter)?;
        *slot = apply_mask(*slot, mask, value);
        Ok(())
    }

    pub fn write_field(&mut self, addr: impl Into<u8>, mask: u32, field: u32) -> Result<()> {
        self.write(addr, mask, field_bits(field, mask))
    }

    pub fn apply(&mut self, addr: impl Into<u8>, update: RegisterUpdate) -> Result<()> {
        self.write(addr, update.mask, update.value)
    }

    /// Store a byte array little-endian, four bytes per register starting at `base`.
    pub fn write_bytes(&mut self, base: impl Into<u8>, bytes: &[u8]) -> Result<()> {
        let base = base.into();
        for (idx, byte) in bytes.iter().enumerate() {
            let (addr, shift) = Self::byte_position(base, idx)?;
            self.write(addr, 0xFF << shift, (*byte as u32) << shift)?;
        }
        debug!("wrote {} bytes from register {}", bytes.len(), base);
        Ok(())
    }

    /// Fill `bytes` from the registers starting at `base`.
    pub fn read_bytes(&self, base: impl Into<u8>, bytes: &mut [u8]) -> Result<()> {
        let base = base.into();
        for (idx, byte) in bytes.iter_mut().enumerate() {
            let (addr, shift) = Self::byte_position(base, idx)?;
            *byte = (self.read(addr)? >> shift) as u8;
        }
        Ok(())
    }

    fn byte_position(base: u8, idx: usize) -> Result<(u8, u32)> {
        let addr = u8::try_from(base as usize + idx / 4).map_err(|_| Error::InvalidParameter)?;
        Ok((addr, 8 * (idx % 4) as u32))
    }
}

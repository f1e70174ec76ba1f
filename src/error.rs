//! Our error types for the bus nodes.

use thiserror::Error;

use crate::hal::HalError;

pub type Result<T> = core::result::Result<T, Error>;

/// Hardware subsystem a [`Error::SubsystemFailure`] originates from.
///
/// The discriminant is the base added to the subsystem status to build the node error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorBase {
    Nvm = 0x0100,
    Power = 0x0200,
    Load = 0x0300,
    Adc = 0x0400,
    Gps = 0x0500,
    Radio = 0x0600,
    Sigfox = 0x0700,
    SigfoxRfp = 0x0800,
    Delay = 0x0900,
}

/// Errors returned by the node entry points.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The control field is pinned by board wiring.
    #[error("Control field is forced by hardware")]
    ForcedHardware,
    /// The control field is driven by software logic, or its mode bit is in the wrong state.
    #[error("Control field is driven by software")]
    ForcedSoftware,
    #[error("{base:?} subsystem failure (status {code:#06x})")]
    SubsystemFailure { base: ErrorBase, code: u16 },
    /// Another activity already holds the resource.
    #[error("Resource busy")]
    ResourceBusy,
    #[error("Operation timeout")]
    Timeout,
    #[error("Invalid parameter")]
    InvalidParameter,
    #[error("Register {0} is read-only")]
    ReadOnly(u8),
    #[error("Node is not initialized")]
    Uninitialized,
}

impl Error {
    /// Node status code, as published in the ERROR_STACK register.
    pub const fn code(&self) -> u16 {
        match self {
            Error::InvalidParameter => 0x0001,
            Error::ReadOnly(_) => 0x0003,
            Error::ForcedHardware => 0x0004,
            Error::ForcedSoftware => 0x0005,
            Error::ResourceBusy => 0x0006,
            Error::Timeout => 0x0007,
            Error::Uninitialized => 0x0008,
            Error::SubsystemFailure { base, code } => (*base as u16).wrapping_add(*code),
        }
    }

    /// Re-base a hardware status into the node error space.
    pub const fn from_hal(base: ErrorBase, err: HalError) -> Self {
        match err {
            HalError::Timeout => Error::Timeout,
            HalError::Failure(code) => Error::SubsystemFailure { base, code },
        }
    }
}

/// Attach the subsystem base to a hardware result.
pub(crate) trait Rebase<T> {
    fn rebase(self, base: ErrorBase) -> Result<T>;
}

impl<T> Rebase<T> for core::result::Result<T, HalError> {
    fn rebase(self, base: ErrorBase) -> Result<T> {
        self.map_err(|err| Error::from_hal(base, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_codes_are_rebased() {
        let err = Error::from_hal(ErrorBase::Load, HalError::Failure(0x02));
        assert_eq!(err, Error::SubsystemFailure { base: ErrorBase::Load, code: 0x02 });
        assert_eq!(err.code(), 0x0302);
    }

    #[test]
    fn hal_timeout_maps_to_timeout() {
        let result: core::result::Result<(), HalError> = Err(HalError::Timeout);
        assert_eq!(result.rebase(ErrorBase::Gps), Err(Error::Timeout));
    }

    #[test]
    fn kinds_have_distinct_codes() {
        let kinds = [
            Error::InvalidParameter,
            Error::ReadOnly(3),
            Error::ForcedHardware,
            Error::ForcedSoftware,
            Error::ResourceBusy,
            Error::Timeout,
            Error::Uninitialized,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a.code(), b.code());
            }
        }
    }
}

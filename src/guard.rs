//! Scoped acquisition of power domains and Sigfox sessions.
//!
//! Each guard releases its resource when dropped, so every exit path of a driver operation
//! (including early returns through `?`) leaves the hardware in its idle state. Use
//! [`PowerGuard::release`] when the release status matters to the caller.

use core::ops::{Deref, DerefMut};

use log::warn;

use crate::{
    error::{Error, ErrorBase, Rebase, Result},
    hal::{Power, Sigfox},
    types::{DelayMode, PowerDomain},
};

/// Keeps a power domain on for the lifetime of the guard.
pub struct PowerGuard<'a, H: Power + ?Sized> {
    hw: &'a mut H,
    domain: PowerDomain,
    released: bool,
}

impl<'a, H: Power + ?Sized> PowerGuard<'a, H> {
    pub fn enable(hw: &'a mut H, domain: PowerDomain, delay_mode: DelayMode) -> Result<Self> {
        hw.enable(domain, delay_mode).rebase(ErrorBase::Power)?;
        Ok(Self { hw, domain, released: false })
    }

    /// Turn the domain off now and report the outcome.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.hw.disable(self.domain).rebase(ErrorBase::Power)
    }
}

impl<H: Power + ?Sized> Deref for PowerGuard<'_, H> {
    type Target = H;
    fn deref(&self) -> &Self::Target {
        self.hw
    }
}

impl<H: Power + ?Sized> DerefMut for PowerGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hw
    }
}

impl<H: Power + ?Sized> Drop for PowerGuard<'_, H> {
    fn drop(&mut self) {
        if !self.released && self.hw.disable(self.domain).is_err() {
            warn!("failed to turn {:?} domain off", self.domain);
        }
    }
}

/// Open Sigfox end-point library, closed on drop.
pub struct SigfoxSession<'a, H: Sigfox + ?Sized> {
    hw: &'a mut H,
}

impl<'a, H: Sigfox + ?Sized> SigfoxSession<'a, H> {
    pub fn open(hw: &'a mut H) -> Result<Self> {
        if let Err(err) = hw.open() {
            // The library may hold resources after a failed open.
            if hw.close().is_err() {
                warn!("failed to close Sigfox library");
            }
            return Err(Error::from_hal(ErrorBase::Sigfox, err));
        }
        Ok(Self { hw })
    }
}

impl<H: Sigfox + ?Sized> Deref for SigfoxSession<'_, H> {
    type Target = H;
    fn deref(&self) -> &Self::Target {
        self.hw
    }
}

impl<H: Sigfox + ?Sized> DerefMut for SigfoxSession<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hw
    }
}

impl<H: Sigfox + ?Sized> Drop for SigfoxSession<'_, H> {
    fn drop(&mut self) {
        if self.hw.close().is_err() {
            warn!("failed to close Sigfox library");
        }
    }
}

/// Open RF test add-on, closed on drop.
pub struct RfpSession<'a, H: Sigfox + ?Sized> {
    hw: &'a mut H,
}

impl<'a, H: Sigfox + ?Sized> RfpSession<'a, H> {
    pub fn open(hw: &'a mut H) -> Result<Self> {
        if let Err(err) = hw.rfp_open() {
            if hw.rfp_close().is_err() {
                warn!("failed to close RF test add-on");
            }
            return Err(Error::from_hal(ErrorBase::SigfoxRfp, err));
        }
        Ok(Self { hw })
    }
}

impl<H: Sigfox + ?Sized> Deref for RfpSession<'_, H> {
    type Target = H;
    fn deref(&self) -> &Self::Target {
        self.hw
    }
}

impl<H: Sigfox + ?Sized> DerefMut for RfpSession<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hw
    }
}

impl<H: Sigfox + ?Sized> Drop for RfpSession<'_, H> {
    fn drop(&mut self) {
        if self.hw.rfp_close().is_err() {
            warn!("failed to close RF test add-on");
        }
    }
}

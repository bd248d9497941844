//! # vCPU Count Resolution
//!
//! bhyve publishes the number of vCPUs over whichever configuration channel
//! the guest has. The resolver is an ordered fallback chain:
//!
//! 1. fw_cfg file `opt/bhyve/hw.ncpu` (exactly four bytes), if fw_cfg exists;
//! 2. otherwise fwctl key `hw.ncpu` (exactly four bytes);
//! 3. otherwise one CPU.
//!
//! Only [`CpuCountResolver::resolve`] reports why a lookup failed. The
//! [`CpuCount`] implementation absorbs every failure into the single-CPU
//! default, so table installation never aborts because of it.

use core::num::NonZeroU8;

use log::{info, warn};

use crate::config::CpuCountConfig;
use crate::error::ErrorKind;
use crate::fw_cfg::FirmwareConfig;
use crate::fw_ctl::{FirmwareControl, FwCtlError};

/// Largest count whose I/O APIC ID (equal to the count) still fits a byte.
pub const MAX_CPUS: u32 = 255;

/// CPU count used whenever the hypervisor does not provide one.
pub const FALLBACK_CPUS: NonZeroU8 = NonZeroU8::MIN;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuCountError {
    #[error("CPU count item not found")]
    NotFound,
    #[error("CPU count item has {actual} bytes, expected {expected}")]
    BadBufferSize { expected: usize, actual: usize },
    #[error("no configuration channel available")]
    Unavailable,
    #[error("hypervisor reported zero CPUs")]
    ZeroCpus,
    #[error("hypervisor reported {0} CPUs, at most {MAX_CPUS} are supported")]
    TooManyCpus(u32),
    #[error(transparent)]
    FwCtl(#[from] FwCtlError),
}

impl CpuCountError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound | Self::FwCtl(FwCtlError::NotFound) => ErrorKind::NotFound,
            Self::BadBufferSize { .. } | Self::FwCtl(FwCtlError::BufferTooSmall { .. }) => {
                ErrorKind::BadBufferSize
            }
            Self::Unavailable
            | Self::FwCtl(FwCtlError::Unavailable | FwCtlError::Unsupported { .. }) => {
                ErrorKind::Unsupported
            }
            Self::FwCtl(FwCtlError::InvalidParameter) => ErrorKind::InvalidParameter,
            Self::ZeroCpus | Self::TooManyCpus(_) | Self::FwCtl(FwCtlError::Malformed) => {
                ErrorKind::ProtocolError
            }
        }
    }
}

/// Source of the vCPU count used for the synthesized MADT.
pub trait CpuCount {
    fn cpu_count(&mut self) -> NonZeroU8;
}

impl<T: CpuCount + ?Sized> CpuCount for &mut T {
    fn cpu_count(&mut self) -> NonZeroU8 {
        (**self).cpu_count()
    }
}

/// A count known up front.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FixedCpuCount(pub NonZeroU8);

impl CpuCount for FixedCpuCount {
    fn cpu_count(&mut self) -> NonZeroU8 {
        self.0
    }
}

/// Asks fw_cfg, then fwctl, for the vCPU count.
pub struct CpuCountResolver<A, B> {
    fw_cfg: A,
    fw_ctl: B,
    config: CpuCountConfig,
}

impl<A, B> CpuCountResolver<A, B>
where
    A: FirmwareConfig,
    B: FirmwareControl,
{
    #[must_use]
    pub const fn new(fw_cfg: A, fw_ctl: B, config: CpuCountConfig) -> Self {
        Self {
            fw_cfg,
            fw_ctl,
            config,
        }
    }

    /// Query the hypervisor.
    ///
    /// When fw_cfg is present its answer is final; fwctl is only asked on
    /// platforms without fw_cfg.
    ///
    /// # Errors
    /// * [`CpuCountError::NotFound`] / [`CpuCountError::BadBufferSize`] from fw_cfg.
    /// * [`CpuCountError::FwCtl`] / [`CpuCountError::BadBufferSize`] from fwctl.
    /// * [`CpuCountError::Unavailable`] if neither channel exists.
    /// * [`CpuCountError::ZeroCpus`] / [`CpuCountError::TooManyCpus`] for counts the MADT
    ///   cannot describe.
    pub fn resolve(&mut self) -> Result<NonZeroU8, CpuCountError> {
        let raw = if self.fw_cfg.is_available() {
            self.query_fw_cfg()?
        } else {
            self.query_fw_ctl()?
        };

        validate(raw)
    }

    fn query_fw_cfg(&mut self) -> Result<u32, CpuCountError> {
        let name = self.config.fw_cfg_file;
        let file = self.fw_cfg.find_file(name).ok_or(CpuCountError::NotFound)?;
        let actual = usize::try_from(file.size).unwrap_or(usize::MAX);
        if actual != size_of::<u32>() {
            return Err(CpuCountError::BadBufferSize {
                expected: size_of::<u32>(),
                actual,
            });
        }

        let mut buf = [0u8; 4];
        self.fw_cfg.read_file(file, &mut buf);
        Ok(u32::from_le_bytes(buf))
    }

    fn query_fw_ctl(&mut self) -> Result<u32, CpuCountError> {
        let mut buf = [0u8; 4];
        let actual = self
            .fw_ctl
            .get(self.config.fw_ctl_key, &mut buf)
            .map_err(|e| match e {
                FwCtlError::Unavailable => CpuCountError::Unavailable,
                e => CpuCountError::FwCtl(e),
            })?;
        if actual != size_of::<u32>() {
            return Err(CpuCountError::BadBufferSize {
                expected: size_of::<u32>(),
                actual,
            });
        }
        Ok(u32::from_le_bytes(buf))
    }

    #[must_use]
    pub fn into_parts(self) -> (A, B) {
        (self.fw_cfg, self.fw_ctl)
    }
}

impl<A, B> CpuCount for CpuCountResolver<A, B>
where
    A: FirmwareConfig,
    B: FirmwareControl,
{
    fn cpu_count(&mut self) -> NonZeroU8 {
        match self.resolve() {
            Ok(count) => {
                info!("Retrieved CPU count {count}");
                count
            }
            Err(e) => {
                warn!("CPU count retrieval failed ({e}), assuming {FALLBACK_CPUS}");
                FALLBACK_CPUS
            }
        }
    }
}

fn validate(raw: u32) -> Result<NonZeroU8, CpuCountError> {
    let count = u8::try_from(raw).map_err(|_| CpuCountError::TooManyCpus(raw))?;
    NonZeroU8::new(count).ok_or(CpuCountError::ZeroCpus)
}

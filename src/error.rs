// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error taxonomy for the texture manager.
//!
//! - [`Error::DeviceLost`] and [`Error::AllocationFailed`] are ordinary runtime failures and
//!   propagate to the rendering pipeline, which recreates resources and retries.
//! - [`Error::ContractViolation`] means a caller broke a documented precondition.  These are
//!   reported through [`violation`]: logged, then fatal in debug builds.  Release builds
//!   return the error (or skip the operation, where the operation has nothing to return).

use crate::pixel_formats::PixelFormat;
use crate::geometry::Rect;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The backing allocation was discarded by the platform.  Recreate the texture.
    #[error("device surface was lost")]
    DeviceLost,
    /// The device could not satisfy a creation request.
    #[error("could not allocate a {width}x{height} surface: {reason}")]
    AllocationFailed {
        width: u32,
        height: u32,
        reason: &'static str,
    },
    #[error("contract violation: {0}")]
    ContractViolation(Violation),
}

/// Preconditions a caller can break.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("whole_lock called on a virtual texture; use region_lock")]
    WholeLockOnVirtual,
    #[error("lock region {region:?} is empty or exceeds the {width}x{height} texture")]
    RegionOutOfBounds { region: Rect, width: u32, height: u32 },
    #[error("source format {source_format:?} does not match texture format {texture_format:?}")]
    PixelFormatMismatch {
        source_format: PixelFormat,
        texture_format: PixelFormat,
    },
    #[error("source surface is too small for a {width}x{height} upload at its origin")]
    SourceTooSmall { width: u32, height: u32 },
    #[error("gutter copy does not support {0} byte pixels")]
    UnsupportedPixelSize(usize),
    #[error("{width}x{height} texture exceeds max texture size {max} but is not virtual")]
    OversizedNotVirtual { width: u32, height: u32, max: u32 },
    #[error("{width}x{height} hardware texture exceeds max texture size {max}")]
    OversizedHardwareTexture { width: u32, height: u32, max: u32 },
}

/// Reports a broken precondition.
///
/// Logs the violation and panics in debug builds.  In release builds the returned error lets
/// the caller skip the operation.
#[track_caller]
pub(crate) fn violation(violation: Violation) -> Error {
    logwise::error_sync!(
        "contract violation: {violation}",
        violation = logwise::privacy::LogIt(&violation)
    );
    if cfg!(debug_assertions) {
        panic!("contract violation: {violation}");
    }
    Error::ContractViolation(violation)
}

// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Device backends.
//!
//! Platform surfaces plug in through the traits in [`crate::device`].  The only backend that
//! ships with the crate keeps its pixels in process memory.

pub mod memory;

pub use memory::{FrameReport, LockRecord, MemoryDevice, MemorySurface, SurfaceProbe};

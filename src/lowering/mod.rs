//! Per-strategy lowering of one im2col job onto the available data movers.
//!
//! The software loop in [`cpu`] is the reference the hardware paths are
//! measured against. [`dma`] breaks a job into per-row or per-channel-column
//! transactions for the generic DMA engine; [`spc`] packs the whole job into
//! one controller configuration.

pub mod cpu;
pub(crate) mod dma;
pub(crate) mod spc;

pub use cpu::im2col_cpu;

/// Data-movement strategy for one im2col invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Software loop on the core.
    Cpu,
    /// One 1-D transaction per output row, destination pre-zeroed.
    Dma1d,
    /// One padded 2-D transaction per channel column and batch.
    Dma2d,
    /// Whole job on the smart peripheral controller.
    Spc,
}

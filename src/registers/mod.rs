//! Memory-mapped register definitions for the DMA engine and the im2col
//! smart peripheral controller.
//!
//! The register layout is described using [`tock_registers`], which provides
//! a safe and zero-cost abstraction over volatile MMIO access. Each
//! functional block is exposed through a dedicated sub-module so the code
//! that drives the hardware can depend on a well-structured Rust API instead
//! of scattering raw offsets around.
//!
//! Two conventions run through both blocks: status bit 0 is READY and stays
//! low for the whole time a job is in flight, and the interrupt flag
//! registers are read-to-clear, so the first read after completion both
//! observes and acknowledges the event.

pub mod consts;
pub mod dma;
pub mod spc;

pub use dma::{DmaChRegs, DmaChannel, DMA_CONTROL, DMA_PAD, DMA_STATUS};
pub use spc::{
    SpcRegisters, SpcRegs, SPC_ADAPTED_PAD, SPC_CONTROL, SPC_FILTER_SIZE, SPC_IMAGE_SIZE,
    SPC_LOG_STRIDES, SPC_N_PATCHES, SPC_PAD, SPC_STATUS,
};

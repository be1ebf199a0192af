//! Per-generation capability description of the DMA/SPC subsystem.
//!
//! One [`Im2colConfig`] value captures everything the dispatcher needs to
//! know about a hardware variant: channel count, field limits, bus width and
//! interrupt wiring. New silicon generations add a constructor here instead
//! of scattering `cfg` checks through the driver.

/// Returns a mask with the lowest `n` bits set.
pub const fn dma_bit_mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1u64
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpcGeneration {
    V1,
}

#[derive(Debug, Clone)]
pub struct Im2colConfig {
    pub generation: SpcGeneration,
    /// Independent DMA channels in the subsystem.
    pub dma_channels: usize,
    /// Bus address width of the pointer registers.
    pub dma_mask: u64,
    /// Upper bound for one dimension's element count.
    pub max_size_du: u32,
    /// Fast-interrupt line of the DMA engine.
    pub dma_irq: u32,
    /// Platform interrupt line of the SPC.
    pub spc_irq: u32,
}

impl Im2colConfig {
    pub fn new(generation: SpcGeneration) -> Self {
        match generation {
            SpcGeneration::V1 => Self::new_v1(),
        }
    }

    fn new_v1() -> Self {
        Self {
            generation: SpcGeneration::V1,
            dma_channels: 4,
            dma_mask: dma_bit_mask(32),
            max_size_du: 1 << 16,
            dma_irq: 19,
            spc_irq: 40,
        }
    }
}

//! Hardware ports: the seam between the dispatcher and the two peripherals.
//!
//! A port exposes exactly the load/start/ready/irq surface the dispatcher
//! needs. [`MmioDma`] and [`MmioSpc`] program the real register files
//! through the typed views in [`crate::registers`]; the software device
//! model in [`crate::sim`] implements the same traits so the full stack runs
//! hardware-free in tests. Nothing above this seam knows which of the two it
//! is talking to.

use alloc::vec::Vec;
use core::ptr::NonNull;

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use crate::registers::dma::{DmaChannel, DMA_CONTROL, DMA_PAD};
use crate::registers::spc::{
    SpcRegisters, SPC_ADAPTED_PAD, SPC_CONTROL, SPC_FILTER_SIZE, SPC_IMAGE_SIZE, SPC_LOG_STRIDES,
    SPC_N_PATCHES, SPC_PAD,
};
use crate::transfer::{Datatype, Dim};

/// Register-level image of one DMA transaction, ready to program. Pointer
/// fields keep native width; the MMIO port truncates them to the 32-bit
/// pointer registers when it writes them out.
#[derive(Debug, Clone, Copy)]
pub struct DmaDescriptor {
    pub src: *const u8,
    pub dst: *mut u8,
    /// Source step between elements, in data units.
    pub src_inc_d1: u32,
    /// Source step applied instead of `src_inc_d1` at inner-row boundaries.
    pub src_inc_d2: i32,
    pub dst_inc_d1: u32,
    pub dst_inc_d2: i32,
    /// Elements per inner row.
    pub size_d1: u32,
    /// Inner rows. Ignored for 1-D.
    pub size_d2: u32,
    /// Zero border synthesized around the destination block of a 2-D
    /// transfer.
    pub pad_top: u8,
    pub pad_bottom: u8,
    pub pad_left: u8,
    pub pad_right: u8,
    pub dtype: Datatype,
    pub dim: Dim,
    /// Handshake slot pacing the transfer; 0 is free-running memory.
    pub slot: u8,
    pub intr_en: bool,
}

unsafe impl Send for DmaDescriptor {}

/// Whole-job configuration image for the SPC. One descriptor describes one
/// complete im2col invocation.
#[derive(Debug, Clone, Copy)]
pub struct SpcDescriptor {
    pub src: *const u8,
    pub dst: *mut u8,
    pub image_w: u16,
    pub image_h: u16,
    pub filter_w: u8,
    pub filter_h: u8,
    pub batch: u32,
    pub ch_col: u32,
    pub n_patches_w: u16,
    pub n_patches_h: u16,
    pub pad_top: u8,
    pub pad_bottom: u8,
    pub pad_left: u8,
    pub pad_right: u8,
    pub adapted_right: u8,
    pub adapted_bottom: u8,
    /// Stride exponents; strides must be powers of two on this engine.
    pub log_stride_d1: u8,
    pub log_stride_d2: u8,
    pub dtype: Datatype,
    /// Internal engine channels the job may use.
    pub ch_mask: u8,
    pub intr_en: bool,
    /// Input channel count; writing it starts the job.
    pub num_channels: u32,
}

unsafe impl Send for SpcDescriptor {}

/// One DMA engine with some number of independent channels.
///
/// A channel holds at most one transaction. `load` programs everything
/// except the launch register; `start` writes the launch register and the
/// channel runs until its status returns to ready.
pub trait DmaPort {
    fn channel_count(&self) -> usize;

    /// Bring the engine to an idle, acknowledged state.
    fn init(&mut self);

    /// Program channel `ch` from `desc`, everything except the launch
    /// register.
    fn load(&mut self, ch: usize, desc: &DmaDescriptor);

    /// Write the launch register; the channel leaves ready immediately.
    fn start(&mut self, ch: usize, size_d1: u32);

    fn is_ready(&self, ch: usize) -> bool;

    /// Read-and-clear the channel's interrupt flag.
    fn take_irq(&mut self, ch: usize) -> bool;

    /// Raw status word for diagnostics.
    fn status_word(&self, ch: usize) -> u32;

    /// Pause until something may have happened. Spinning is a valid
    /// implementation; a core with a wait-for-event instruction can halt.
    fn wait_for_event(&self) {
        core::hint::spin_loop();
    }
}

/// The im2col smart peripheral controller: one whole job at a time.
pub trait SpcPort {
    /// Bring the controller to an idle, acknowledged state.
    fn init(&mut self);

    /// Program the full job configuration, everything except the start
    /// register.
    fn load(&mut self, desc: &SpcDescriptor);

    /// Write the channel count register; configuration latches and the job
    /// starts.
    fn start(&mut self, num_channels: u32);

    fn is_ready(&self) -> bool;

    /// Read-and-clear the controller's interrupt flag.
    fn take_irq(&mut self) -> bool;

    /// Raw status word for diagnostics.
    fn status_word(&self) -> u32;

    fn wait_for_event(&self) {
        core::hint::spin_loop();
    }
}

/// DMA port backed by the real register file.
pub struct MmioDma {
    channels: Vec<DmaChannel>,
}

impl MmioDma {
    /// # Safety
    ///
    /// `base` must map a DMA register file with at least `channels` channel
    /// windows, valid for the lifetime of the returned object.
    pub unsafe fn new(base: NonNull<u8>, channels: usize) -> Self {
        let channels = (0..channels)
            .map(|ch| unsafe { DmaChannel::nth(base, ch) })
            .collect();
        Self { channels }
    }

    pub fn channel(&self, ch: usize) -> &DmaChannel {
        &self.channels[ch]
    }
}

impl DmaPort for MmioDma {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn init(&mut self) {
        for ch in &self.channels {
            ch.control.set(0);
            let _ = ch.take_ifr();
        }
    }

    fn load(&mut self, ch: usize, desc: &DmaDescriptor) {
        let ch = &self.channels[ch];
        ch.src_ptr.set(desc.src as usize as u32);
        ch.dst_ptr.set(desc.dst as usize as u32);
        ch.src_inc_d1.set(desc.src_inc_d1);
        ch.src_inc_d2.set(desc.src_inc_d2 as u32);
        ch.dst_inc_d1.set(desc.dst_inc_d1);
        ch.dst_inc_d2.set(desc.dst_inc_d2 as u32);
        ch.size_d2.set(desc.size_d2);
        ch.pad.write(
            DMA_PAD::TOP.val(desc.pad_top as u32)
                + DMA_PAD::BOTTOM.val(desc.pad_bottom as u32)
                + DMA_PAD::LEFT.val(desc.pad_left as u32)
                + DMA_PAD::RIGHT.val(desc.pad_right as u32),
        );
        ch.control.modify(
            DMA_CONTROL::DATA_TYPE.val(desc.dtype.encoding())
                + DMA_CONTROL::DIM.val(desc.dim.encoding())
                + DMA_CONTROL::INTR_EN.val(desc.intr_en as u32)
                + DMA_CONTROL::SLOT.val(desc.slot as u32),
        );
    }

    fn start(&mut self, ch: usize, size_d1: u32) {
        self.channels[ch].size_d1.set(size_d1);
    }

    fn is_ready(&self, ch: usize) -> bool {
        self.channels[ch].is_ready()
    }

    fn take_irq(&mut self, ch: usize) -> bool {
        self.channels[ch].take_ifr() != 0
    }

    fn status_word(&self, ch: usize) -> u32 {
        self.channels[ch].status.get()
    }
}

/// SPC port backed by the real register file.
pub struct MmioSpc {
    regs: SpcRegisters,
}

impl MmioSpc {
    /// # Safety
    ///
    /// `base` must map the SPC register file for the lifetime of the
    /// returned object.
    pub unsafe fn new(base: NonNull<u8>) -> Self {
        Self {
            regs: unsafe { SpcRegisters::new(base) },
        }
    }

    pub fn regs(&self) -> &SpcRegisters {
        &self.regs
    }
}

impl SpcPort for MmioSpc {
    fn init(&mut self) {
        self.regs.control.set(0);
        let _ = self.regs.take_ifr();
    }

    fn load(&mut self, desc: &SpcDescriptor) {
        let r = &self.regs;
        r.src_ptr.set(desc.src as usize as u32);
        r.dst_ptr.set(desc.dst as usize as u32);
        r.image_size.write(
            SPC_IMAGE_SIZE::WIDTH.val(desc.image_w as u32)
                + SPC_IMAGE_SIZE::HEIGHT.val(desc.image_h as u32),
        );
        r.filter_size.write(
            SPC_FILTER_SIZE::WIDTH.val(desc.filter_w as u32)
                + SPC_FILTER_SIZE::HEIGHT.val(desc.filter_h as u32),
        );
        r.batch.set(desc.batch);
        r.ch_col.set(desc.ch_col);
        r.n_patches.write(
            SPC_N_PATCHES::W.val(desc.n_patches_w as u32)
                + SPC_N_PATCHES::H.val(desc.n_patches_h as u32),
        );
        r.pad.write(
            SPC_PAD::TOP.val(desc.pad_top as u32)
                + SPC_PAD::BOTTOM.val(desc.pad_bottom as u32)
                + SPC_PAD::LEFT.val(desc.pad_left as u32)
                + SPC_PAD::RIGHT.val(desc.pad_right as u32),
        );
        r.adapted_pad.write(
            SPC_ADAPTED_PAD::RIGHT.val(desc.adapted_right as u32)
                + SPC_ADAPTED_PAD::BOTTOM.val(desc.adapted_bottom as u32),
        );
        r.log_strides.write(
            SPC_LOG_STRIDES::D1.val(desc.log_stride_d1 as u32)
                + SPC_LOG_STRIDES::D2.val(desc.log_stride_d2 as u32),
        );
        r.control.modify(
            SPC_CONTROL::DATA_TYPE.val(desc.dtype.encoding())
                + SPC_CONTROL::INTR_EN.val(desc.intr_en as u32)
                + SPC_CONTROL::CH_MASK.val(desc.ch_mask as u32),
        );
    }

    fn start(&mut self, num_channels: u32) {
        self.regs.num_channels.set(num_channels);
    }

    fn is_ready(&self) -> bool {
        self.regs.is_ready()
    }

    fn take_irq(&mut self) -> bool {
        self.regs.take_ifr() != 0
    }

    fn status_word(&self) -> u32 {
        self.regs.status.get()
    }
}

//! Software model of the DMA engine and the SPC.
//!
//! [`SimDma`] and [`SimSpc`] implement the ports from [`crate::hal`] and
//! execute the descriptor semantics the way the hardware datapath does,
//! driven only by the programmed field values. The model never calls back
//! into the geometry code, so a lowering bug shows up as a mismatch against
//! the software loop instead of being reproduced on both sides.
//!
//! Completion is immediate by default. With [`SimDma::defer_completion`] a
//! started transaction stays busy until [`SimDma::complete`] is called,
//! which is how the busy-channel and interrupt paths get exercised.

use alloc::vec::Vec;
use core::mem;

use crate::hal::{DmaDescriptor, DmaPort, SpcDescriptor, SpcPort};
use crate::transfer::{Datatype, Dim};

unsafe fn copy_element(src: *const u8, dst: *mut u8, dtype: Datatype) {
    match dtype {
        Datatype::Word => {
            (dst as *mut u32).write_unaligned((src as *const u32).read_unaligned())
        }
        Datatype::HalfWord => {
            (dst as *mut u16).write_unaligned((src as *const u16).read_unaligned())
        }
        Datatype::Byte => dst.write(src.read()),
    }
}

unsafe fn zero_element(dst: *mut u8, dtype: Datatype) {
    match dtype {
        Datatype::Word => (dst as *mut u32).write_unaligned(0),
        Datatype::HalfWord => (dst as *mut u16).write_unaligned(0),
        Datatype::Byte => dst.write(0),
    }
}

const fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn run_dma_1d(d: &DmaDescriptor, size_d1: u32) {
    let unit = d.dtype.size() as isize;
    let mut src = d.src;
    let mut dst = d.dst;
    for _ in 0..size_d1 {
        unsafe { copy_element(src, dst, d.dtype) };
        src = src.wrapping_offset(d.src_inc_d1 as isize * unit);
        dst = dst.wrapping_offset(d.dst_inc_d1 as isize * unit);
    }
}

fn run_dma_2d(d: &DmaDescriptor, size_d1: u32) {
    let unit = d.dtype.size() as isize;
    let data_cols = d.pad_left as u32 + size_d1;
    let row_elems = data_cols + d.pad_right as u32;
    let data_rows = d.pad_top as u32 + d.size_d2;
    let total_rows = data_rows + d.pad_bottom as u32;
    let mut src = d.src;
    let mut dst = d.dst;
    for row in 0..total_rows {
        let in_data_rows = row >= d.pad_top as u32 && row < data_rows;
        for col in 0..row_elems {
            let in_data_cols = col >= d.pad_left as u32 && col < data_cols;
            if in_data_rows && in_data_cols {
                unsafe { copy_element(src, dst, d.dtype) };
                let inc = if col + 1 == data_cols {
                    d.src_inc_d2 as isize
                } else {
                    d.src_inc_d1 as isize
                };
                src = src.wrapping_offset(inc * unit);
            } else {
                unsafe { zero_element(dst, d.dtype) };
            }
            let inc = if col + 1 == row_elems {
                d.dst_inc_d2 as isize
            } else {
                d.dst_inc_d1 as isize
            };
            dst = dst.wrapping_offset(inc * unit);
        }
    }
}

fn run_dma(d: &DmaDescriptor, size_d1: u32) {
    match d.dim {
        Dim::D1 => run_dma_1d(d, size_d1),
        // PAD fields only take effect in 2-D mode.
        Dim::D2 => run_dma_2d(d, size_d1),
    }
}

/// One im2col job streamed out of the SPC configuration image.
fn run_spc(d: &SpcDescriptor) {
    let unit = d.dtype.size() as isize;
    let s1 = 1u32 << d.log_stride_d1;
    let s2 = 1u32 << d.log_stride_d2;
    let fw = d.filter_w as u32;
    let fh = d.filter_h as u32;
    let iw = d.image_w as u32;
    let ih = d.image_h as u32;
    let npw = d.n_patches_w as u32;
    let nph = d.n_patches_h as u32;
    let channels = d.num_channels;
    let mut dst = d.dst;
    for b in 0..d.batch {
        for c in 0..d.ch_col {
            let w_off = c % fw;
            let h_off = (c / fw) % fh;
            let ch = c / (fw * fh);

            let left = d.pad_left as u32;
            let lz = if w_off >= left { 0 } else { ceil_div(left - w_off, s1) };
            let w_edge = fw - 1 - w_off;
            let ar = d.adapted_right as u32;
            let rz = if w_edge >= ar { 0 } else { ceil_div(ar - w_edge, s1) };
            let valid_w = npw - lz - rz;
            let col0 = w_off + lz * s1 - left;

            let top = d.pad_top as u32;
            let tz = if h_off >= top { 0 } else { ceil_div(top - h_off, s2) };
            let h_edge = fh - 1 - h_off;
            let ab = d.adapted_bottom as u32;
            let bz = if h_edge >= ab { 0 } else { ceil_div(ab - h_edge, s2) };
            let valid_h = nph - tz - bz;
            let row0 = h_off + tz * s2 - top;

            for h in 0..nph {
                let data_row = h >= tz && h < tz + valid_h;
                for w in 0..npw {
                    if data_row && w >= lz && w < lz + valid_w {
                        let row = row0 + (h - tz) * s2;
                        let col = col0 + (w - lz) * s1;
                        let idx = (((b * channels + ch) * ih + row) * iw + col) as isize;
                        unsafe { copy_element(d.src.wrapping_offset(idx * unit), dst, d.dtype) };
                    } else {
                        unsafe { zero_element(dst, d.dtype) };
                    }
                    dst = dst.wrapping_offset(unit);
                }
            }
        }
    }
}

#[derive(Default)]
struct SimChannel {
    desc: Option<DmaDescriptor>,
    size_d1: u32,
    busy: bool,
    irq: bool,
}

/// Software DMA engine.
pub struct SimDma {
    chans: Vec<SimChannel>,
    defer: bool,
}

impl SimDma {
    pub fn new(channels: usize) -> Self {
        let mut chans = Vec::new();
        chans.resize_with(channels, SimChannel::default);
        Self {
            chans,
            defer: false,
        }
    }

    /// Keep started transactions busy until [`Self::complete`].
    pub fn defer_completion(&mut self, on: bool) {
        self.defer = on;
    }

    /// Finish the pending transaction on `ch`: run the programmed transfer,
    /// return the channel to ready and raise its interrupt flag if enabled.
    pub fn complete(&mut self, ch: usize) {
        let slot = &mut self.chans[ch];
        if !slot.busy {
            return;
        }
        let desc = slot.desc.expect("busy channel without a descriptor");
        run_dma(&desc, slot.size_d1);
        slot.busy = false;
        slot.irq = desc.intr_en;
    }
}

impl DmaPort for SimDma {
    fn channel_count(&self) -> usize {
        self.chans.len()
    }

    fn init(&mut self) {
        for slot in &mut self.chans {
            slot.desc = None;
            slot.busy = false;
            slot.irq = false;
        }
    }

    fn load(&mut self, ch: usize, desc: &DmaDescriptor) {
        self.chans[ch].desc = Some(*desc);
    }

    fn start(&mut self, ch: usize, size_d1: u32) {
        self.chans[ch].size_d1 = size_d1;
        self.chans[ch].busy = true;
        if !self.defer {
            self.complete(ch);
        }
    }

    fn is_ready(&self, ch: usize) -> bool {
        !self.chans[ch].busy
    }

    fn take_irq(&mut self, ch: usize) -> bool {
        mem::take(&mut self.chans[ch].irq)
    }

    fn status_word(&self, ch: usize) -> u32 {
        self.is_ready(ch) as u32
    }
}

/// Software SPC.
pub struct SimSpc {
    desc: Option<SpcDescriptor>,
    busy: bool,
    irq: bool,
    defer: bool,
}

impl SimSpc {
    pub fn new() -> Self {
        Self {
            desc: None,
            busy: false,
            irq: false,
            defer: false,
        }
    }

    /// Keep a started job busy until [`Self::complete`].
    pub fn defer_completion(&mut self, on: bool) {
        self.defer = on;
    }

    /// Finish the pending job.
    pub fn complete(&mut self) {
        if !self.busy {
            return;
        }
        let desc = self.desc.expect("busy controller without a configuration");
        run_spc(&desc);
        self.busy = false;
        self.irq = desc.intr_en;
    }
}

impl Default for SimSpc {
    fn default() -> Self {
        Self::new()
    }
}

impl SpcPort for SimSpc {
    fn init(&mut self) {
        self.desc = None;
        self.busy = false;
        self.irq = false;
    }

    fn load(&mut self, desc: &SpcDescriptor) {
        self.desc = Some(*desc);
    }

    fn start(&mut self, num_channels: u32) {
        if let Some(desc) = &mut self.desc {
            desc.num_channels = num_channels;
        }
        self.busy = true;
        if !self.defer {
            self.complete();
        }
    }

    fn is_ready(&self) -> bool {
        !self.busy
    }

    fn take_irq(&mut self) -> bool {
        mem::take(&mut self.irq)
    }

    fn status_word(&self) -> u32 {
        self.is_ready() as u32
    }
}

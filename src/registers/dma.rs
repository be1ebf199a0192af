use core::ops::Deref;
use core::ptr::NonNull;
use tock_registers::interfaces::{ReadWriteable, Readable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};

use super::consts::DMA_CH_STRIDE;

register_structs! {
    /// One DMA channel's register window. Channel `n` sits at
    /// `base + n * DMA_CH_STRIDE`.
    pub DmaChRegs {
        (0x0000 => pub src_ptr: ReadWrite<u32>),
        (0x0004 => pub dst_ptr: ReadWrite<u32>),
        (0x0008 => pub src_inc_d1: ReadWrite<u32>),
        (0x000C => pub src_inc_d2: ReadWrite<u32>),
        (0x0010 => pub dst_inc_d1: ReadWrite<u32>),
        (0x0014 => pub dst_inc_d2: ReadWrite<u32>),
        (0x0018 => pub size_d2: ReadWrite<u32>),
        (0x001C => pub pad: ReadWrite<u32, DMA_PAD::Register>),
        (0x0020 => pub control: ReadWrite<u32, DMA_CONTROL::Register>),
        (0x0024 => pub status: ReadOnly<u32, DMA_STATUS::Register>),
        (0x0028 => pub ifr: ReadOnly<u32>),
        (0x002C => pub size_d1: WriteOnly<u32>),
        (0x0030 => @END),
    }
}

tock_registers::register_bitfields! {u32,
    pub DMA_PAD [
        TOP OFFSET(0) NUMBITS(6) [],
        BOTTOM OFFSET(8) NUMBITS(6) [],
        LEFT OFFSET(16) NUMBITS(6) [],
        RIGHT OFFSET(24) NUMBITS(6) []
    ],

    pub DMA_CONTROL [
        DATA_TYPE OFFSET(0) NUMBITS(2) [
            Word = 0,
            HalfWord = 1,
            Byte = 2
        ],
        DIM OFFSET(2) NUMBITS(1) [
            D1 = 0,
            D2 = 1
        ],
        INTR_EN OFFSET(3) NUMBITS(1) [],
        SLOT OFFSET(8) NUMBITS(8) []
    ],

    pub DMA_STATUS [
        READY OFFSET(0) NUMBITS(1) []
    ]
}

/// Typed view of one DMA channel.
pub struct DmaChannel {
    base: NonNull<DmaChRegs>,
}
unsafe impl Send for DmaChannel {}

impl DmaChannel {
    /// # Safety
    ///
    /// `base` must map the channel's register window for the lifetime of the
    /// returned object.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }

    /// # Safety
    ///
    /// `base` must map the DMA engine's register file; the view is offset to
    /// channel `ch`.
    pub const unsafe fn nth(base: NonNull<u8>, ch: usize) -> Self {
        let ptr = unsafe { base.as_ptr().add(ch * DMA_CH_STRIDE) };
        unsafe { Self::new(NonNull::new_unchecked(ptr)) }
    }

    /// Channel ready to accept a launch.
    pub fn is_ready(&self) -> bool {
        self.status.is_set(DMA_STATUS::READY)
    }

    /// Read the interrupt flag register. Reading clears it.
    pub fn take_ifr(&self) -> u32 {
        self.ifr.get()
    }

    /// Flip only the interrupt enable bit, leaving the rest of the control
    /// word alone.
    pub fn set_interrupt_enable(&self, enable: bool) {
        self.control
            .modify(DMA_CONTROL::INTR_EN.val(enable as u32));
    }
}

impl Deref for DmaChannel {
    type Target = DmaChRegs;

    fn deref(&self) -> &Self::Target {
        unsafe { self.base.as_ref() }
    }
}

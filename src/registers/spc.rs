use core::ops::Deref;
use core::ptr::NonNull;
use tock_registers::interfaces::{ReadWriteable, Readable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};

register_structs! {
    /// Configuration and status window of the im2col smart peripheral
    /// controller. Writing `num_channels` latches the whole configuration
    /// and starts the job, so it is ordered last among the writable fields.
    pub SpcRegs {
        (0x0000 => pub src_ptr: ReadWrite<u32>),
        (0x0004 => pub dst_ptr: ReadWrite<u32>),
        (0x0008 => pub image_size: ReadWrite<u32, SPC_IMAGE_SIZE::Register>),
        (0x000C => pub filter_size: ReadWrite<u32, SPC_FILTER_SIZE::Register>),
        (0x0010 => pub batch: ReadWrite<u32>),
        (0x0014 => pub ch_col: ReadWrite<u32>),
        (0x0018 => pub n_patches: ReadWrite<u32, SPC_N_PATCHES::Register>),
        (0x001C => pub pad: ReadWrite<u32, SPC_PAD::Register>),
        (0x0020 => pub adapted_pad: ReadWrite<u32, SPC_ADAPTED_PAD::Register>),
        (0x0024 => pub log_strides: ReadWrite<u32, SPC_LOG_STRIDES::Register>),
        (0x0028 => pub control: ReadWrite<u32, SPC_CONTROL::Register>),
        (0x002C => pub num_channels: WriteOnly<u32>),
        (0x0030 => pub status: ReadOnly<u32, SPC_STATUS::Register>),
        (0x0034 => pub ifr: ReadOnly<u32>),
        (0x0038 => @END),
    }
}

tock_registers::register_bitfields! {u32,
    pub SPC_IMAGE_SIZE [
        WIDTH OFFSET(0) NUMBITS(16) [],
        HEIGHT OFFSET(16) NUMBITS(16) []
    ],

    pub SPC_FILTER_SIZE [
        WIDTH OFFSET(0) NUMBITS(8) [],
        HEIGHT OFFSET(8) NUMBITS(8) []
    ],

    pub SPC_N_PATCHES [
        W OFFSET(0) NUMBITS(16) [],
        H OFFSET(16) NUMBITS(16) []
    ],

    pub SPC_PAD [
        TOP OFFSET(0) NUMBITS(6) [],
        BOTTOM OFFSET(8) NUMBITS(6) [],
        LEFT OFFSET(16) NUMBITS(6) [],
        RIGHT OFFSET(24) NUMBITS(6) []
    ],

    pub SPC_ADAPTED_PAD [
        RIGHT OFFSET(0) NUMBITS(6) [],
        BOTTOM OFFSET(8) NUMBITS(6) []
    ],

    /// Strides are power-of-two by construction and stored as exponents.
    pub SPC_LOG_STRIDES [
        D1 OFFSET(0) NUMBITS(4) [],
        D2 OFFSET(4) NUMBITS(4) []
    ],

    pub SPC_CONTROL [
        DATA_TYPE OFFSET(0) NUMBITS(2) [
            Word = 0,
            HalfWord = 1,
            Byte = 2
        ],
        INTR_EN OFFSET(4) NUMBITS(1) [],
        CH_MASK OFFSET(16) NUMBITS(8) []
    ],

    pub SPC_STATUS [
        READY OFFSET(0) NUMBITS(1) []
    ]
}

/// Typed view of the SPC register file.
pub struct SpcRegisters {
    base: NonNull<SpcRegs>,
}
unsafe impl Send for SpcRegisters {}

impl SpcRegisters {
    /// # Safety
    ///
    /// `base` must map the SPC register file for the lifetime of the
    /// returned object.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_set(SPC_STATUS::READY)
    }

    /// Read the interrupt flag register. Reading clears it.
    pub fn take_ifr(&self) -> u32 {
        self.ifr.get()
    }

    pub fn set_interrupt_enable(&self, enable: bool) {
        self.control
            .modify(SPC_CONTROL::INTR_EN.val(enable as u32));
    }

    /// Restrict the job to a subset of the engine's internal channels,
    /// leaving the rest of the control word alone.
    pub fn set_channel_mask(&self, mask: u8) {
        self.control.modify(SPC_CONTROL::CH_MASK.val(mask as u32));
    }
}

impl Deref for SpcRegisters {
    type Target = SpcRegs;

    fn deref(&self) -> &Self::Target {
        unsafe { self.base.as_ref() }
    }
}

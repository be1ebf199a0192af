//! Raw register offsets for code that pokes the blocks without the typed
//! views: trace decoding, register-image assertions in tests.

/// Byte distance between consecutive DMA channel windows.
pub const DMA_CH_STRIDE: usize = 0x40;

/// Offset of a DMA channel's source pointer register.
pub const DMA_SRC_PTR: usize = 0x00;
/// Offset of a DMA channel's destination pointer register.
pub const DMA_DST_PTR: usize = 0x04;
/// Offset of the source inner-dimension increment register.
pub const DMA_SRC_INC_D1: usize = 0x08;
/// Offset of the source row-boundary increment register (two's complement).
pub const DMA_SRC_INC_D2: usize = 0x0C;
/// Offset of the destination inner-dimension increment register.
pub const DMA_DST_INC_D1: usize = 0x10;
/// Offset of the destination row-boundary increment register.
pub const DMA_DST_INC_D2: usize = 0x14;
/// Offset of the outer-dimension size register.
pub const DMA_SIZE_D2: usize = 0x18;
/// Offset of the packed padding register.
pub const DMA_PAD: usize = 0x1C;
/// Offset of the channel control register.
pub const DMA_CONTROL: usize = 0x20;
/// Offset of the channel status register.
pub const DMA_STATUS: usize = 0x24;
/// Offset of the interrupt flag register. Reads clear it.
pub const DMA_IFR: usize = 0x28;
/// Offset of the inner-dimension size register. Writing launches the channel.
pub const DMA_SIZE_D1: usize = 0x2C;

/// Offset of the SPC source pointer register.
pub const SPC_SRC_PTR: usize = 0x00;
/// Offset of the SPC destination pointer register.
pub const SPC_DST_PTR: usize = 0x04;
/// Offset of the packed image width/height register.
pub const SPC_IMAGE_SIZE: usize = 0x08;
/// Offset of the packed filter width/height register.
pub const SPC_FILTER_SIZE: usize = 0x0C;
/// Offset of the batch count register.
pub const SPC_BATCH: usize = 0x10;
/// Offset of the column-matrix row count register.
pub const SPC_CH_COL: usize = 0x14;
/// Offset of the packed patch grid register.
pub const SPC_N_PATCHES: usize = 0x18;
/// Offset of the packed requested padding register.
pub const SPC_PAD: usize = 0x1C;
/// Offset of the packed adapted padding register.
pub const SPC_ADAPTED_PAD: usize = 0x20;
/// Offset of the packed stride exponent register.
pub const SPC_LOG_STRIDES: usize = 0x24;
/// Offset of the SPC control register.
pub const SPC_CONTROL: usize = 0x28;
/// Offset of the channel count register. Writing starts the job.
pub const SPC_NUM_CHANNELS: usize = 0x2C;
/// Offset of the SPC status register.
pub const SPC_STATUS: usize = 0x30;
/// Offset of the SPC interrupt flag register. Reads clear it.
pub const SPC_IFR: usize = 0x34;

//! Lowering onto the smart peripheral controller.
//!
//! The SPC consumes the derived geometry directly, so one job is one
//! configuration image. Strides are stored as exponents in a 4-bit field,
//! which is where the power-of-two restriction comes from: a job with any
//! other stride is not expressible and has to go down a DMA or CPU path
//! instead.

use crate::err::Im2colError;
use crate::geom::ConvGeometry;
use crate::hal::SpcDescriptor;
use crate::sat;
use crate::transfer::{CompletionMode, Datatype, Environment, Transaction, TransferTarget};

/// Pack `g` into a controller configuration image.
///
/// Fails with [`Im2colError::Unsupported`] when a stride is not a power of
/// two or an extent overflows its register field.
pub(crate) fn spc_descriptor(
    g: &ConvGeometry,
    src: *const u8,
    dst: *mut u8,
    dtype: Datatype,
    ch_mask: u8,
    intr_en: bool,
) -> Result<SpcDescriptor, Im2colError> {
    let log_d1 = sat::log2_exact(g.filter.stride_d1).ok_or(Im2colError::Unsupported)?;
    let log_d2 = sat::log2_exact(g.filter.stride_d2).ok_or(Im2colError::Unsupported)?;
    if !sat::fits(g.shape.width, 16)
        || !sat::fits(g.shape.height, 16)
        || !sat::fits(g.filter.width, 8)
        || !sat::fits(g.filter.height, 8)
        || !sat::fits(g.patches.n_patches_w, 16)
        || !sat::fits(g.patches.n_patches_h, 16)
        || !sat::fits(log_d1, 4)
        || !sat::fits(log_d2, 4)
    {
        return Err(Im2colError::Unsupported);
    }
    debug!(
        "spc job: {}x{}x{}x{} filter {}x{} log-strides {}/{} patches {}x{}",
        g.shape.batch,
        g.shape.channels,
        g.shape.height,
        g.shape.width,
        g.filter.height,
        g.filter.width,
        log_d2,
        log_d1,
        g.patches.n_patches_h,
        g.patches.n_patches_w,
    );
    Ok(SpcDescriptor {
        src,
        dst,
        image_w: g.shape.width as u16,
        image_h: g.shape.height as u16,
        filter_w: g.filter.width as u8,
        filter_h: g.filter.height as u8,
        batch: g.shape.batch,
        ch_col: g.patches.ch_col,
        n_patches_w: g.patches.n_patches_w as u16,
        n_patches_h: g.patches.n_patches_h as u16,
        pad_top: g.pad.top as u8,
        pad_bottom: g.pad.bottom as u8,
        pad_left: g.pad.left as u8,
        pad_right: g.pad.right as u8,
        adapted_right: g.adapted.right as u8,
        adapted_bottom: g.adapted.bottom as u8,
        log_stride_d1: log_d1 as u8,
        log_stride_d2: log_d2 as u8,
        dtype,
        ch_mask,
        intr_en,
        num_channels: g.shape.channels,
    })
}

/// Whole-job transaction: both buffers described end to end, which is what
/// the validator checks before the controller is allowed to start.
pub(crate) fn job_transaction(
    g: &ConvGeometry,
    input: &[u32],
    out_base: *mut u32,
    env: Environment,
    mode: CompletionMode,
) -> Transaction {
    let src = TransferTarget::reading(input, Datatype::Word);
    let dst = TransferTarget {
        ptr: out_base as *mut u8,
        size_du: g.output_len() as u32,
        env: Some(env),
        ..TransferTarget::default()
    };
    let mut t = Transaction::new(*g, src, dst);
    t.mode = mode;
    t
}

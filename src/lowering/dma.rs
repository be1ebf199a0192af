//! Lowering onto the generic DMA engine.
//!
//! One im2col job decomposes along channel columns. In 1-D mode every
//! non-border output row becomes a strided gather over one source row, with
//! the destination pre-zeroed by the core. In 2-D mode a whole channel
//! column becomes a single transaction: the row-boundary increment jumps the
//! source to the next patch row and the pad fields make the engine write the
//! border zeros itself.

use crate::err::Im2colError;
use crate::geom::{ConvGeometry, PaddingSpec, Span};
use crate::hal::DmaDescriptor;
use crate::transfer::{
    CompletionMode, Dim, Environment, Transaction, TransferTarget, Trigger,
};
use crate::validate::ValidationResult;

/// Per-channel-column plan shared by both DMA strategies.
pub(crate) struct ColumnPlan {
    pub c: u32,
    pub h_offset: u32,
    pub channel: u32,
    pub h: Span,
    pub v: Span,
    /// First source column the valid span reads. Meaningless when the
    /// horizontal span is empty.
    pub col0: u32,
}

pub(crate) fn plan_column(g: &ConvGeometry, c: u32) -> Result<ColumnPlan, Im2colError> {
    let (w_offset, h_offset, channel) = g.split_channel_column(c);
    let h = g.h_span(w_offset)?;
    let v = g.v_span(h_offset)?;
    let col0 = if h.valid > 0 {
        g.first_col(w_offset, &h)
    } else {
        0
    };
    Ok(ColumnPlan {
        c,
        h_offset,
        channel,
        h,
        v,
        col0,
    })
}

/// 1-D transaction for one output patch row, `None` when the row is all
/// border and there is nothing to move.
pub(crate) fn row_transaction(
    g: &ConvGeometry,
    plan: &ColumnPlan,
    b: u32,
    patch_row: u32,
    input: &[u32],
    out_base: *mut u32,
    env: Environment,
    mode: CompletionMode,
    channel: u8,
) -> Option<Transaction> {
    if plan.h.valid == 0 {
        return None;
    }
    let row = g.source_row(plan.h_offset, patch_row)?;
    let src_idx = g.src_index(b, plan.channel, row, plan.col0);
    let dst_idx = g.dst_index(b, plan.c, patch_row, plan.h.zeros_before);
    let src = TransferTarget {
        ptr: input.as_ptr().wrapping_add(src_idx) as *mut u8,
        inc_du: g.filter.stride_d1,
        size_du: plan.h.valid,
        ..TransferTarget::default()
    };
    let dst = TransferTarget {
        ptr: out_base.wrapping_add(dst_idx) as *mut u8,
        size_du: plan.h.valid,
        env: Some(env),
        ..TransferTarget::default()
    };
    let mut t = Transaction::new(*g, src, dst);
    t.mode = mode;
    t.channel = channel;
    Some(t)
}

/// Padded 2-D transaction covering one whole channel column of one batch
/// image, `None` when the column never reads real data.
pub(crate) fn column_transaction(
    g: &ConvGeometry,
    plan: &ColumnPlan,
    b: u32,
    input: &[u32],
    out_base: *mut u32,
    env: Environment,
    mode: CompletionMode,
    channel: u8,
) -> Option<Transaction> {
    if plan.h.valid == 0 || plan.v.valid == 0 {
        return None;
    }
    let row0 = g.first_row(plan.h_offset, &plan.v);
    let src_idx = g.src_index(b, plan.channel, row0, plan.col0);
    let dst_idx = g.dst_index(b, plan.c, 0, 0);
    // At a row boundary the cursor sits on the last element read; step over
    // the rest of the source row and down stride_d2 rows in one increment.
    let row_step = (g.filter.stride_d2 * g.shape.width) as i32
        - ((plan.h.valid - 1) * g.filter.stride_d1) as i32;
    let src = TransferTarget {
        ptr: input.as_ptr().wrapping_add(src_idx) as *mut u8,
        inc_du: g.filter.stride_d1,
        inc_d2_du: row_step,
        size_du: plan.h.valid,
        size_d2_du: plan.v.valid,
        ..TransferTarget::default()
    };
    let dst = TransferTarget {
        ptr: out_base.wrapping_add(dst_idx) as *mut u8,
        size_du: plan.h.valid,
        size_d2_du: plan.v.valid,
        env: Some(env),
        ..TransferTarget::default()
    };
    let mut t = Transaction::new(*g, src, dst);
    t.dim = Dim::D2;
    t.border = PaddingSpec {
        top: plan.v.zeros_before,
        bottom: plan.v.zeros_after,
        left: plan.h.zeros_before,
        right: plan.h.zeros_after,
    };
    t.mode = mode;
    t.channel = channel;
    Some(t)
}

/// Register image for a validated transaction. Element counts scale by the
/// ratio of the requested to the effective datatype, so a realigned transfer
/// moves the same bytes in narrower units.
pub(crate) fn dma_descriptor(t: &Transaction, v: &ValidationResult) -> DmaDescriptor {
    let ratio = (t.src.dtype.size() / v.effective_type.size()) as u32;
    let slot = match (t.src.trigger, t.dst.trigger) {
        (Trigger::Slot(s), _) | (_, Trigger::Slot(s)) => s,
        _ => 0,
    };
    DmaDescriptor {
        src: t.src.ptr as *const u8,
        dst: t.dst.ptr,
        src_inc_d1: t.src.inc_du,
        src_inc_d2: t.src.inc_d2_du,
        dst_inc_d1: t.dst.inc_du,
        dst_inc_d2: t.dst.inc_d2_du,
        size_d1: t.src.size_du * ratio,
        size_d2: t.src.size_d2_du,
        pad_top: t.border.top as u8,
        pad_bottom: t.border.bottom as u8,
        pad_left: t.border.left as u8,
        pad_right: t.border.right as u8,
        dtype: v.effective_type,
        dim: t.dim,
        slot,
        intr_en: t.mode != CompletionMode::Polling,
    }
}

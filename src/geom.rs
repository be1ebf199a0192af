//! Convolution geometry: patch grids, adapted padding and zero-span planning.
//!
//! Everything in this module is pure integer arithmetic, derived once per
//! im2col invocation and then read by the lowering paths. The derived values
//! are what the hardware register fields are programmed from, so all of them
//! stay within the register field widths or derivation fails.

use crate::err::Im2colError;

/// Widest value the 6-bit padding register fields accept.
pub const MAX_PAD: u32 = 63;

/// NCHW input tensor extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    pub batch: u32,
    pub channels: u32,
    pub height: u32,
    pub width: u32,
}

impl TensorShape {
    pub const fn new(batch: u32, channels: u32, height: u32, width: u32) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Element count of the tensor.
    pub const fn elements(&self) -> usize {
        self.batch as usize * self.channels as usize * self.height as usize * self.width as usize
    }
}

/// Filter extents and the two patch strides. `stride_d1` walks along a row,
/// `stride_d2` between rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterGeometry {
    pub height: u32,
    pub width: u32,
    pub stride_d1: u32,
    pub stride_d2: u32,
}

impl FilterGeometry {
    pub const fn new(height: u32, width: u32, stride_d1: u32, stride_d2: u32) -> Self {
        Self {
            height,
            width,
            stride_d1,
            stride_d2,
        }
    }

    pub const fn square(side: u32, stride: u32) -> Self {
        Self::new(side, side, stride, stride)
    }
}

/// Requested zero border around the input image, in elements per edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingSpec {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl PaddingSpec {
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub const fn uniform(pad: u32) -> Self {
        Self::new(pad, pad, pad, pad)
    }
}

/// Patch grid produced by one convolution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchGeometry {
    /// Patches along a padded row.
    pub n_patches_w: u32,
    /// Patch rows down the padded image.
    pub n_patches_h: u32,
    /// Rows of the column matrix: `channels * filter_h * filter_w`.
    pub ch_col: u32,
}

/// Trailing padding actually reachable by the strided filter. Never larger
/// than the requested padding; smaller whenever the stride steps over part
/// of the requested border.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptedPadding {
    pub right: u32,
    pub bottom: u32,
}

/// Fully derived geometry for one im2col invocation.
///
/// Built through [`ConvGeometry::derive`]; the validator recomputes the
/// derivation and rejects a transaction whose cached copy disagrees, so a
/// value of this type travelling inside a transaction is self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub shape: TensorShape,
    pub filter: FilterGeometry,
    pub pad: PaddingSpec,
    pub patches: PatchGeometry,
    pub adapted: AdaptedPadding,
}

/// Zero-region plan along one axis of a channel column: leading zero
/// patches, patches reading real data, trailing zero patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub zeros_before: u32,
    pub valid: u32,
    pub zeros_after: u32,
}

impl Span {
    pub const fn total(&self) -> u32 {
        self.zeros_before + self.valid + self.zeros_after
    }
}

const fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn axis_span(
    offset: u32,
    pad_before: u32,
    adapted_after: u32,
    filter: u32,
    stride: u32,
    n_patches: u32,
) -> Result<Span, Im2colError> {
    debug_assert!(offset < filter);
    let zeros_before = if offset >= pad_before {
        0
    } else {
        ceil_div(pad_before - offset, stride)
    };
    // Distance from this filter tap to the trailing filter edge.
    let edge = filter - 1 - offset;
    let zeros_after = if edge >= adapted_after {
        0
    } else {
        ceil_div(adapted_after - edge, stride)
    };
    let zeros = zeros_before + zeros_after;
    if zeros > n_patches {
        return Err(Im2colError::InvalidGeometry);
    }
    Ok(Span {
        zeros_before,
        valid: n_patches - zeros,
        zeros_after,
    })
}

impl ConvGeometry {
    /// Derive the patch grid and adapted padding for one convolution call.
    ///
    /// Fails when any extent or stride is zero, when the padded span is
    /// narrower than the filter, or when `ch_col` overflows.
    pub fn derive(
        shape: TensorShape,
        filter: FilterGeometry,
        pad: PaddingSpec,
    ) -> Result<Self, Im2colError> {
        assert!(
            pad.top <= MAX_PAD && pad.bottom <= MAX_PAD && pad.left <= MAX_PAD && pad.right <= MAX_PAD
        );
        if shape.batch == 0
            || shape.channels == 0
            || shape.height == 0
            || shape.width == 0
            || filter.height == 0
            || filter.width == 0
            || filter.stride_d1 == 0
            || filter.stride_d2 == 0
        {
            return Err(Im2colError::InvalidGeometry);
        }

        let span_w =
            shape.width as i64 + pad.left as i64 + pad.right as i64 - filter.width as i64;
        let span_h =
            shape.height as i64 + pad.top as i64 + pad.bottom as i64 - filter.height as i64;
        if span_w < 0 || span_h < 0 {
            return Err(Im2colError::InvalidGeometry);
        }
        let n_patches_w = (span_w / filter.stride_d1 as i64) as u32 + 1;
        let n_patches_h = (span_h / filter.stride_d2 as i64) as u32 + 1;
        let ch_col = shape
            .channels
            .checked_mul(filter.height)
            .and_then(|v| v.checked_mul(filter.width))
            .ok_or(Im2colError::InvalidGeometry)?;

        // Trailing padding the strided grid can actually touch. The raw value
        // goes negative when the last patch stops short of the image edge;
        // the border is simply absent then.
        let raw_right = filter.stride_d1 as i64 * (n_patches_w as i64 - 1) + filter.width as i64
            - (pad.left as i64 + shape.width as i64);
        let raw_bottom = filter.stride_d2 as i64 * (n_patches_h as i64 - 1) + filter.height as i64
            - (pad.top as i64 + shape.height as i64);
        let adapted = AdaptedPadding {
            right: raw_right.max(0) as u32,
            bottom: raw_bottom.max(0) as u32,
        };

        Ok(Self {
            shape,
            filter,
            pad,
            patches: PatchGeometry {
                n_patches_w,
                n_patches_h,
                ch_col,
            },
            adapted,
        })
    }

    /// Element count of the column matrix:
    /// `ch_col * n_patches_w * n_patches_h * batch`.
    pub const fn output_len(&self) -> usize {
        self.patches.ch_col as usize
            * self.patches.n_patches_w as usize
            * self.patches.n_patches_h as usize
            * self.shape.batch as usize
    }

    /// Element count of the input tensor.
    pub const fn input_len(&self) -> usize {
        self.shape.elements()
    }

    /// Decompose a channel-column index into
    /// `(filter column offset, filter row offset, input channel)`.
    pub const fn split_channel_column(&self, c: u32) -> (u32, u32, u32) {
        let w_offset = c % self.filter.width;
        let h_offset = (c / self.filter.width) % self.filter.height;
        let channel = c / (self.filter.width * self.filter.height);
        (w_offset, h_offset, channel)
    }

    /// NCHW flat index of input element `(b, channel, row, col)`.
    #[inline]
    pub const fn src_index(&self, b: u32, channel: u32, row: u32, col: u32) -> usize {
        ((b as usize * self.shape.channels as usize + channel as usize)
            * self.shape.height as usize
            + row as usize)
            * self.shape.width as usize
            + col as usize
    }

    /// Flat index of column-matrix cell `(b, channel_column, patch_row, patch_col)`.
    #[inline]
    pub const fn dst_index(&self, b: u32, c: u32, h: u32, w: u32) -> usize {
        ((b as usize * self.patches.ch_col as usize + c as usize)
            * self.patches.n_patches_h as usize
            + h as usize)
            * self.patches.n_patches_w as usize
            + w as usize
    }

    /// Horizontal zero-span plan for one filter column offset.
    pub fn h_span(&self, w_offset: u32) -> Result<Span, Im2colError> {
        axis_span(
            w_offset,
            self.pad.left,
            self.adapted.right,
            self.filter.width,
            self.filter.stride_d1,
            self.patches.n_patches_w,
        )
    }

    /// Vertical zero-span plan for one filter row offset.
    pub fn v_span(&self, h_offset: u32) -> Result<Span, Im2colError> {
        axis_span(
            h_offset,
            self.pad.top,
            self.adapted.bottom,
            self.filter.height,
            self.filter.stride_d2,
            self.patches.n_patches_h,
        )
    }

    /// First source column read by the valid span of `w_offset`. Meaningful
    /// only when the span has a non-empty valid region.
    pub const fn first_col(&self, w_offset: u32, span: &Span) -> u32 {
        w_offset + span.zeros_before * self.filter.stride_d1 - self.pad.left
    }

    /// First source row read by the valid span of `h_offset`.
    pub const fn first_row(&self, h_offset: u32, span: &Span) -> u32 {
        h_offset + span.zeros_before * self.filter.stride_d2 - self.pad.top
    }

    /// Source row for output patch row `patch_row` of filter row `h_offset`,
    /// `None` when the whole row lies in the top or bottom border.
    pub fn source_row(&self, h_offset: u32, patch_row: u32) -> Option<u32> {
        let row = h_offset as i64 + patch_row as i64 * self.filter.stride_d2 as i64
            - self.pad.top as i64;
        if row < 0 || row >= self.shape.height as i64 {
            None
        } else {
            Some(row as u32)
        }
    }
}

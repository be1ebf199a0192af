//! Reference software loop.
//!
//! Walks the full index map, writing border zeros explicitly, so every cell
//! of the column matrix is stored exactly once. The hardware paths must
//! produce bit-identical output.

use crate::geom::ConvGeometry;

pub fn im2col_cpu(g: &ConvGeometry, input: &[u32], output: &mut [u32]) {
    debug_assert_eq!(input.len(), g.input_len());
    debug_assert_eq!(output.len(), g.output_len());
    for b in 0..g.shape.batch {
        for c in 0..g.patches.ch_col {
            let (w_offset, h_offset, channel) = g.split_channel_column(c);
            for h in 0..g.patches.n_patches_h {
                let row = h_offset as i64 + (h * g.filter.stride_d2) as i64 - g.pad.top as i64;
                let row_valid = row >= 0 && row < g.shape.height as i64;
                for w in 0..g.patches.n_patches_w {
                    let col =
                        w_offset as i64 + (w * g.filter.stride_d1) as i64 - g.pad.left as i64;
                    let value = if row_valid && col >= 0 && col < g.shape.width as i64 {
                        input[g.src_index(b, channel, row as u32, col as u32)]
                    } else {
                        0
                    };
                    output[g.dst_index(b, c, h, w)] = value;
                }
            }
        }
    }
}

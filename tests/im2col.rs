//! End-to-end lowering checks: every strategy against the software loop and
//! a hand-computed column matrix, running on the device model.

use im2col_spc::{
    im2col_cpu, CompletionMode, ConvGeometry, FilterGeometry, Im2colConfig, Im2colEngine,
    Im2colError, PaddingSpec, SimDma, SimSpc, Span, SpcGeneration, Strategy, TensorShape,
};

type SimEngine = Im2colEngine<SimDma, SimSpc>;

fn engine() -> SimEngine {
    let config = Im2colConfig::new(SpcGeneration::V1);
    let mut engine = Im2colEngine::new(SimDma::new(config.dma_channels), SimSpc::new(), config);
    engine.init();
    engine
}

fn geometry(
    shape: (u32, u32, u32, u32),
    filter: FilterGeometry,
    pad: PaddingSpec,
) -> ConvGeometry {
    let (batch, channels, height, width) = shape;
    ConvGeometry::derive(TensorShape::new(batch, channels, height, width), filter, pad).unwrap()
}

fn pattern(len: usize) -> Vec<u32> {
    (0..len as u32)
        .map(|i| i.wrapping_mul(2_654_435_761).rotate_left(7) ^ 0x5a5a)
        .collect()
}

const ALL_STRATEGIES: [Strategy; 4] =
    [Strategy::Cpu, Strategy::Dma1d, Strategy::Dma2d, Strategy::Spc];

/// Column matrix for a 4x4 image, 3 channels, values 1..=48 in NCHW order,
/// 2x2 filter, stride 2, padding 1 on every edge. Worked out by hand; one
/// line per column-matrix row.
#[rustfmt::skip]
const GOLDEN_4X4X3: [u32; 108] = [
    0,  0,  0,   0,  6,  8,   0, 14, 16,
    0,  0,  0,   5,  7,  0,  13, 15,  0,
    0,  2,  4,   0, 10, 12,   0,  0,  0,
    1,  3,  0,   9, 11,  0,   0,  0,  0,
    0,  0,  0,   0, 22, 24,   0, 30, 32,
    0,  0,  0,  21, 23,  0,  29, 31,  0,
    0, 18, 20,   0, 26, 28,   0,  0,  0,
   17, 19,  0,  25, 27,  0,   0,  0,  0,
    0,  0,  0,   0, 38, 40,   0, 46, 48,
    0,  0,  0,  37, 39,  0,  45, 47,  0,
    0, 34, 36,   0, 42, 44,   0,  0,  0,
   33, 35,  0,  41, 43,  0,   0,  0,  0,
];

fn golden_geometry() -> ConvGeometry {
    geometry((1, 3, 4, 4), FilterGeometry::square(2, 2), PaddingSpec::uniform(1))
}

#[test]
fn software_loop_matches_hand_computed_columns() {
    let g = golden_geometry();
    assert_eq!(g.output_len(), GOLDEN_4X4X3.len());
    let input: Vec<u32> = (1..=48).collect();
    let mut out = vec![0u32; g.output_len()];
    im2col_cpu(&g, &input, &mut out);
    assert_eq!(out[..], GOLDEN_4X4X3[..]);
}

#[test]
fn every_strategy_reproduces_the_hand_computed_columns() {
    let g = golden_geometry();
    let input: Vec<u32> = (1..=48).collect();
    let mut engine = engine();
    for strategy in ALL_STRATEGIES {
        // Poisoned so an unwritten border cell cannot pass by accident.
        let mut out = vec![0xdead_beefu32; g.output_len()];
        engine
            .run(strategy, &g, &input, &mut out, CompletionMode::Polling)
            .unwrap();
        assert_eq!(out[..], GOLDEN_4X4X3[..], "strategy {strategy:?}");
    }
}

#[test]
fn strategies_agree_across_geometries() {
    // Strides are powers of two so the SPC can take every case.
    let cases = [
        geometry((1, 1, 5, 5), FilterGeometry::square(3, 1), PaddingSpec::uniform(1)),
        geometry((1, 2, 5, 5), FilterGeometry::square(2, 2), PaddingSpec::uniform(1)),
        geometry((2, 2, 6, 8), FilterGeometry::new(2, 3, 2, 1), PaddingSpec::new(1, 0, 2, 0)),
        geometry((1, 1, 7, 7), FilterGeometry::square(3, 4), PaddingSpec::uniform(3)),
        geometry((1, 1, 4, 4), FilterGeometry::square(4, 1), PaddingSpec::uniform(3)),
        geometry((1, 1, 10, 10), FilterGeometry::square(3, 4), PaddingSpec::uniform(1)),
        geometry((2, 4, 16, 16), FilterGeometry::square(5, 2), PaddingSpec::uniform(2)),
    ];
    let mut engine = engine();
    for g in cases {
        let input = pattern(g.input_len());
        let mut want = vec![0u32; g.output_len()];
        im2col_cpu(&g, &input, &mut want);
        for strategy in ALL_STRATEGIES {
            let mut out = vec![0xdead_beefu32; g.output_len()];
            engine
                .run(strategy, &g, &input, &mut out, CompletionMode::Polling)
                .unwrap();
            assert_eq!(out, want, "strategy {strategy:?} on {:?}", g.shape);
        }
    }
}

#[test]
fn unit_filter_is_an_identity_permutation() {
    // 1x1 filter, no padding, stride 1: the column matrix is the input.
    let g = geometry((2, 3, 6, 5), FilterGeometry::square(1, 1), PaddingSpec::uniform(0));
    assert_eq!(g.output_len(), g.input_len());
    let input = pattern(g.input_len());
    let mut engine = engine();
    for strategy in ALL_STRATEGIES {
        let mut out = vec![0u32; g.output_len()];
        engine
            .run(strategy, &g, &input, &mut out, CompletionMode::Polling)
            .unwrap();
        assert_eq!(out, input, "strategy {strategy:?}");
    }
}

#[test]
fn non_power_of_two_stride_only_rejects_the_spc() {
    let cases = [
        geometry((1, 2, 5, 5), FilterGeometry::square(3, 3), PaddingSpec::uniform(2)),
        geometry((3, 2, 4, 9), FilterGeometry::new(3, 3, 3, 1), PaddingSpec::uniform(2)),
    ];
    let mut engine = engine();
    for g in cases {
        let input = pattern(g.input_len());
        let mut want = vec![0u32; g.output_len()];
        im2col_cpu(&g, &input, &mut want);

        let mut out = vec![0u32; g.output_len()];
        let err = engine
            .run(Strategy::Spc, &g, &input, &mut out, CompletionMode::Polling)
            .unwrap_err();
        assert_eq!(err, Im2colError::Unsupported);

        // The generic engine has real stride registers and still takes it.
        for strategy in [Strategy::Dma1d, Strategy::Dma2d] {
            let mut out = vec![0xdead_beefu32; g.output_len()];
            engine
                .run(strategy, &g, &input, &mut out, CompletionMode::Polling)
                .unwrap();
            assert_eq!(out, want, "strategy {strategy:?}");
        }
    }
}

#[test]
fn completion_modes_deliver_identical_results() {
    let g = geometry((1, 2, 5, 5), FilterGeometry::square(2, 2), PaddingSpec::uniform(1));
    let input = pattern(g.input_len());
    let mut want = vec![0u32; g.output_len()];
    im2col_cpu(&g, &input, &mut want);
    let mut engine = engine();
    for strategy in [Strategy::Dma1d, Strategy::Dma2d, Strategy::Spc] {
        for mode in [
            CompletionMode::Polling,
            CompletionMode::Interrupt,
            CompletionMode::InterruptWait,
        ] {
            let mut out = vec![0xdead_beefu32; g.output_len()];
            engine.run(strategy, &g, &input, &mut out, mode).unwrap();
            assert_eq!(out, want, "strategy {strategy:?} mode {mode:?}");
        }
    }
}

#[test]
fn adapted_padding_shrinks_to_what_the_stride_reaches() {
    // Stride 2 lands the last patch before the requested right/bottom border.
    let g = geometry((1, 2, 5, 5), FilterGeometry::square(2, 2), PaddingSpec::uniform(1));
    assert_eq!(g.patches.n_patches_w, 3);
    assert_eq!(g.patches.n_patches_h, 3);
    assert_eq!(g.adapted.right, 0);
    assert_eq!(g.adapted.bottom, 0);

    // Stride 4 over a 7x7 image with padding 3 still reaches one element of it.
    let g = geometry((1, 1, 7, 7), FilterGeometry::square(3, 4), PaddingSpec::uniform(3));
    assert_eq!(g.patches.n_patches_w, 3);
    assert_eq!(g.adapted.right, 1);
    assert_eq!(g.adapted.bottom, 1);
}

#[test]
fn span_planning_covers_each_filter_offset() {
    let g = geometry((1, 1, 5, 5), FilterGeometry::square(3, 1), PaddingSpec::uniform(1));
    assert_eq!(g.output_len(), 225);
    let spans: Vec<Span> = (0..3).map(|off| g.h_span(off).unwrap()).collect();
    assert_eq!(
        spans[0],
        Span { zeros_before: 1, valid: 4, zeros_after: 0 }
    );
    assert_eq!(
        spans[1],
        Span { zeros_before: 0, valid: 5, zeros_after: 0 }
    );
    assert_eq!(
        spans[2],
        Span { zeros_before: 0, valid: 4, zeros_after: 1 }
    );
}

#[test]
fn mismatched_buffer_lengths_are_refused() {
    let g = golden_geometry();
    let input: Vec<u32> = (1..=48).collect();
    let mut engine = engine();

    let mut out = vec![0u32; g.output_len() - 1];
    let err = engine
        .run(Strategy::Cpu, &g, &input, &mut out, CompletionMode::Polling)
        .unwrap_err();
    assert_eq!(err, Im2colError::InvalidArgument);

    let mut out = vec![0u32; g.output_len()];
    let err = engine
        .run(Strategy::Dma1d, &g, &input[1..], &mut out, CompletionMode::Polling)
        .unwrap_err();
    assert_eq!(err, Im2colError::InvalidArgument);
}

#[test]
fn filter_larger_than_padded_image_is_invalid() {
    let err = ConvGeometry::derive(
        TensorShape::new(1, 1, 4, 4),
        FilterGeometry::square(5, 1),
        PaddingSpec::uniform(0),
    )
    .unwrap_err();
    assert_eq!(err, Im2colError::InvalidGeometry);
}

#[test]
fn jobs_run_back_to_back_on_one_engine() {
    let first = golden_geometry();
    let second = geometry((1, 1, 5, 5), FilterGeometry::square(3, 1), PaddingSpec::uniform(1));
    let mut engine = engine();

    let input: Vec<u32> = (1..=48).collect();
    let mut out = vec![0u32; first.output_len()];
    engine
        .run(Strategy::Spc, &first, &input, &mut out, CompletionMode::Polling)
        .unwrap();
    assert_eq!(out[..], GOLDEN_4X4X3[..]);

    let input = pattern(second.input_len());
    let mut want = vec![0u32; second.output_len()];
    im2col_cpu(&second, &input, &mut want);
    let mut out = vec![0u32; second.output_len()];
    engine
        .run(Strategy::Spc, &second, &input, &mut out, CompletionMode::Polling)
        .unwrap();
    assert_eq!(out, want);
}

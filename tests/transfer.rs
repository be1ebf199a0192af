//! Transfer admission and launch behavior: validation outcomes observed
//! through the dispatcher, the register image a load produces, and the
//! completion plumbing on both device models.

use core::ptr::NonNull;
use std::sync::Arc;

use im2col_spc::registers::consts;
use im2col_spc::{
    im2col_cpu, validate, CheckPolicy, CompletionFlag, CompletionMode, ConvGeometry, Datatype,
    Dim, DmaDescriptor, DmaPort, Environment, FilterGeometry, Im2colConfig, Im2colEngine,
    Im2colError, MmioDma, MmioSpc, PaddingSpec, RealignPolicy, SimDma, SimSpc, SpcDescriptor,
    SpcGeneration, SpcPort, TensorShape, Transaction, TransferPhase, TransferTarget,
    ValidationFlags,
};

fn engine() -> Im2colEngine<SimDma, SimSpc> {
    let config = Im2colConfig::new(SpcGeneration::V1);
    let mut engine = Im2colEngine::new(SimDma::new(config.dma_channels), SimSpc::new(), config);
    engine.init();
    engine
}

fn small_geometry() -> ConvGeometry {
    ConvGeometry::derive(
        TensorShape::new(1, 1, 4, 4),
        FilterGeometry::square(2, 1),
        PaddingSpec::uniform(0),
    )
    .unwrap()
}

#[repr(align(8))]
struct Aligned([u8; 40]);

/// 8-word transaction whose pointers sit two bytes past word alignment.
fn half_aligned_words(src: &Aligned, dst: &mut Aligned) -> Transaction {
    let env = Environment::of(&dst.0[2..34]);
    Transaction::new(
        small_geometry(),
        TransferTarget {
            ptr: src.0[2..].as_ptr() as *mut u8,
            size_du: 8,
            dtype: Datatype::Word,
            ..TransferTarget::default()
        },
        TransferTarget {
            ptr: dst.0[2..].as_mut_ptr(),
            size_du: 8,
            dtype: Datatype::Word,
            env: Some(env),
            ..TransferTarget::default()
        },
    )
}

#[test]
fn validation_reports_the_same_verdict_every_time() {
    let src = [7u32; 16];
    let mut dst = [0u32; 16];
    let t = Transaction::new(
        small_geometry(),
        TransferTarget::reading(&src, Datatype::Word),
        TransferTarget::writing(&mut dst, Datatype::Word),
    );
    let first = validate(&t, RealignPolicy::Realign, CheckPolicy::Integrity);
    let second = validate(&t, RealignPolicy::Realign, CheckPolicy::Integrity);
    assert_eq!(first, second);
    assert!(first.is_ok());
    assert_eq!(first.effective_type, Datatype::Word);
}

#[test]
fn realignment_carries_misaligned_words_intact() {
    let mut src = Aligned([0u8; 40]);
    for (i, b) in src.0.iter_mut().enumerate() {
        *b = i as u8;
    }
    let mut dst = Aligned([0u8; 40]);
    let t = half_aligned_words(&src, &mut dst);

    let mut engine = engine();
    let result = engine
        .transfer(&t, RealignPolicy::Realign, CheckPolicy::Integrity, 1000)
        .unwrap();
    assert_eq!(result.flags, ValidationFlags::MISALIGN);
    assert_eq!(result.effective_type, Datatype::HalfWord);
    assert_eq!(result.misalignment, 1);

    assert_eq!(src.0[2..34], dst.0[2..34]);
    // Nothing outside the window moved.
    assert!(dst.0[..2].iter().all(|b| *b == 0));
    assert!(dst.0[34..].iter().all(|b| *b == 0));
}

#[test]
fn strict_alignment_policy_refuses_the_launch() {
    let src = Aligned([0u8; 40]);
    let mut dst = Aligned([0u8; 40]);
    let t = half_aligned_words(&src, &mut dst);

    let mut engine = engine();
    let err = engine
        .transfer(&t, RealignPolicy::DoNotRealign, CheckPolicy::Integrity, 1000)
        .unwrap_err();
    assert_eq!(
        err,
        Im2colError::Rejected(ValidationFlags::MISALIGN | ValidationFlags::CRITICAL_ERROR)
    );
}

#[repr(align(4))]
struct DmaRam([u8; 0x100]);

#[repr(align(4))]
struct SpcRam([u8; 0x40]);

fn reg(ram: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes(ram[off..off + 4].try_into().unwrap())
}

#[test]
fn rejection_happens_before_any_register_write() {
    let mut dma_ram = DmaRam([0u8; 0x100]);
    let mut spc_ram = SpcRam([0u8; 0x40]);
    // Every channel reports ready, so only validation can refuse the launch.
    for ch in 0..4 {
        dma_ram.0[ch * consts::DMA_CH_STRIDE + consts::DMA_STATUS] = 1;
    }
    spc_ram.0[consts::SPC_STATUS] = 1;

    let config = Im2colConfig::new(SpcGeneration::V1);
    let dma = unsafe {
        MmioDma::new(
            NonNull::new(dma_ram.0.as_mut_ptr()).unwrap(),
            config.dma_channels,
        )
    };
    let spc = unsafe { MmioSpc::new(NonNull::new(spc_ram.0.as_mut_ptr()).unwrap()) };
    let mut engine = Im2colEngine::new(dma, spc, config);

    let src = Aligned([0u8; 40]);
    let mut dst = Aligned([0u8; 40]);
    let t = half_aligned_words(&src, &mut dst);
    let err = engine
        .begin_transfer(&t, RealignPolicy::DoNotRealign, CheckPolicy::Integrity)
        .unwrap_err();
    assert_eq!(
        err,
        Im2colError::Rejected(ValidationFlags::MISALIGN | ValidationFlags::CRITICAL_ERROR)
    );

    for (off, byte) in dma_ram.0.iter().enumerate() {
        let expected = if off % consts::DMA_CH_STRIDE == consts::DMA_STATUS {
            1
        } else {
            0
        };
        assert_eq!(*byte, expected, "dma register byte {off:#x} was written");
    }
}

#[test]
fn busy_channel_refuses_a_second_launch() {
    let mut engine = engine();
    engine.dma_mut().defer_completion(true);

    let src = [1u32, 2, 3, 4];
    let mut dst = [0u32; 4];
    let mut dst2 = [0u32; 4];
    let t = Transaction::new(
        small_geometry(),
        TransferTarget::reading(&src, Datatype::Word),
        TransferTarget::writing(&mut dst, Datatype::Word),
    );
    let (_, pending) = engine
        .begin_transfer(&t, RealignPolicy::Realign, CheckPolicy::Integrity)
        .unwrap();
    assert_eq!(engine.channel_phase(0), Some(TransferPhase::Running));

    let t2 = Transaction::new(
        small_geometry(),
        TransferTarget::reading(&src, Datatype::Word),
        TransferTarget::writing(&mut dst2, Datatype::Word),
    );
    let err = engine
        .begin_transfer(&t2, RealignPolicy::Realign, CheckPolicy::Integrity)
        .unwrap_err();
    assert_eq!(
        err,
        Im2colError::Rejected(ValidationFlags::TRANS_OVERRIDE | ValidationFlags::CRITICAL_ERROR)
    );
    // The refusal left the running transaction alone.
    assert_eq!(engine.channel_phase(0), Some(TransferPhase::Running));

    engine.dma_mut().complete(0);
    engine.wait(&pending, 1000).unwrap();
    assert_eq!(engine.channel_phase(0), Some(TransferPhase::Done));
    assert_eq!(dst, src);
    assert_eq!(dst2, [0u32; 4]);
}

#[test]
fn interrupt_dispatch_completes_the_waiter() {
    let mut engine = engine();
    engine.dma_mut().defer_completion(true);

    let src = [11u32, 22, 33, 44];
    let mut dst = [0u32; 4];
    let mut t = Transaction::new(
        small_geometry(),
        TransferTarget::reading(&src, Datatype::Word),
        TransferTarget::writing(&mut dst, Datatype::Word),
    );
    t.mode = CompletionMode::Interrupt;
    let done = Arc::new(CompletionFlag::new());
    t.notify = Some(done.clone());

    let (_, pending) = engine
        .begin_transfer(&t, RealignPolicy::Realign, CheckPolicy::Integrity)
        .unwrap();
    assert!(!done.is_signalled());

    engine.dma_mut().complete(0);
    engine.handle_dma_interrupt();
    assert!(done.is_signalled());

    engine.wait(&pending, 10).unwrap();
    assert_eq!(engine.channel_phase(0), Some(TransferPhase::Done));
    assert_eq!(dst, src);
}

#[test]
fn spc_job_completes_through_interrupt_dispatch() {
    let g = ConvGeometry::derive(
        TensorShape::new(1, 3, 4, 4),
        FilterGeometry::square(2, 2),
        PaddingSpec::uniform(1),
    )
    .unwrap();
    let input: Vec<u32> = (1..=48).collect();
    let mut want = vec![0u32; g.output_len()];
    im2col_cpu(&g, &input, &mut want);

    let mut engine = engine();
    engine.spc_mut().defer_completion(true);
    let done = Arc::new(CompletionFlag::new());
    let mut out = vec![0u32; g.output_len()];
    let pending = engine
        .begin_spc_job(
            &g,
            &input,
            &mut out,
            CompletionMode::Interrupt,
            Some(done.clone()),
        )
        .unwrap();
    assert!(!done.is_signalled());

    engine.spc_mut().complete();
    engine.handle_spc_interrupt();
    assert!(done.is_signalled());

    engine.wait(&pending, 10).unwrap();
    assert_eq!(out, want);
}

#[test]
fn free_running_source_is_flagged_but_still_runs() {
    let src = [0xabcd_1234u32];
    let mut dst = [0u32; 6];
    let mut src_t = TransferTarget::reading(&src, Datatype::Word);
    src_t.inc_du = 0;
    src_t.size_du = 6;
    let t = Transaction::new(
        small_geometry(),
        src_t,
        TransferTarget::writing(&mut dst, Datatype::Word),
    );

    let mut engine = engine();
    let result = engine
        .transfer(&t, RealignPolicy::Realign, CheckPolicy::Integrity, 1000)
        .unwrap();
    assert_eq!(result.flags, ValidationFlags::OVERLAP);
    assert!(!result.is_critical());
    assert_eq!(dst, [0xabcd_1234u32; 6]);
}

#[test]
fn writes_outside_the_window_are_refused() {
    let src = [1u32; 8];
    let mut dst = [0u32; 8];
    // Bounds cover four words but the transaction claims eight.
    let mut dst_t = TransferTarget::writing(&mut dst[..4], Datatype::Word);
    dst_t.size_du = 8;
    let t = Transaction::new(
        small_geometry(),
        TransferTarget::reading(&src, Datatype::Word),
        dst_t,
    );

    let mut engine = engine();
    let err = engine
        .transfer(&t, RealignPolicy::Realign, CheckPolicy::Integrity, 1000)
        .unwrap_err();
    assert_eq!(
        err,
        Im2colError::Rejected(ValidationFlags::OUTBOUNDS | ValidationFlags::CRITICAL_ERROR)
    );
    assert_eq!(dst, [0u32; 8]);
}

#[test]
fn dma_load_reaches_the_register_file_bit_exact() {
    let mut ram = DmaRam([0u8; 0x100]);
    let mut dma = unsafe { MmioDma::new(NonNull::new(ram.0.as_mut_ptr()).unwrap(), 4) };
    let desc = DmaDescriptor {
        src: 0x2000 as *const u8,
        dst: 0x3000 as *mut u8,
        src_inc_d1: 2,
        src_inc_d2: -3,
        dst_inc_d1: 1,
        dst_inc_d2: 4,
        size_d1: 42,
        size_d2: 5,
        pad_top: 1,
        pad_bottom: 2,
        pad_left: 3,
        pad_right: 4,
        dtype: Datatype::HalfWord,
        dim: Dim::D2,
        slot: 7,
        intr_en: true,
    };
    dma.load(1, &desc);
    dma.start(1, desc.size_d1);

    let base = consts::DMA_CH_STRIDE;
    assert_eq!(reg(&ram.0, base + consts::DMA_SRC_PTR), 0x2000);
    assert_eq!(reg(&ram.0, base + consts::DMA_DST_PTR), 0x3000);
    assert_eq!(reg(&ram.0, base + consts::DMA_SRC_INC_D1), 2);
    assert_eq!(reg(&ram.0, base + consts::DMA_SRC_INC_D2), (-3i32) as u32);
    assert_eq!(reg(&ram.0, base + consts::DMA_DST_INC_D1), 1);
    assert_eq!(reg(&ram.0, base + consts::DMA_DST_INC_D2), 4);
    assert_eq!(reg(&ram.0, base + consts::DMA_SIZE_D2), 5);
    assert_eq!(reg(&ram.0, base + consts::DMA_PAD), 0x0403_0201);
    // DATA_TYPE half, DIM 2-D, INTR_EN, SLOT 7.
    assert_eq!(reg(&ram.0, base + consts::DMA_CONTROL), 0x70d);
    assert_eq!(reg(&ram.0, base + consts::DMA_SIZE_D1), 42);
    assert_eq!(reg(&ram.0, base + consts::DMA_STATUS), 0);
    assert_eq!(reg(&ram.0, base + consts::DMA_IFR), 0);

    // The neighbouring channel window is untouched.
    assert!(ram.0[..consts::DMA_CH_STRIDE].iter().all(|b| *b == 0));
}

#[test]
fn spc_load_reaches_the_register_file_bit_exact() {
    let mut ram = SpcRam([0u8; 0x40]);
    let mut spc = unsafe { MmioSpc::new(NonNull::new(ram.0.as_mut_ptr()).unwrap()) };
    let desc = SpcDescriptor {
        src: 0x4000 as *const u8,
        dst: 0x5000 as *mut u8,
        image_w: 640,
        image_h: 480,
        filter_w: 3,
        filter_h: 5,
        batch: 2,
        ch_col: 75,
        n_patches_w: 320,
        n_patches_h: 120,
        pad_top: 1,
        pad_bottom: 2,
        pad_left: 3,
        pad_right: 4,
        adapted_right: 2,
        adapted_bottom: 1,
        log_stride_d1: 1,
        log_stride_d2: 2,
        dtype: Datatype::Word,
        ch_mask: 0x0f,
        intr_en: true,
        num_channels: 3,
    };
    spc.load(&desc);
    spc.start(desc.num_channels);

    assert_eq!(reg(&ram.0, consts::SPC_SRC_PTR), 0x4000);
    assert_eq!(reg(&ram.0, consts::SPC_DST_PTR), 0x5000);
    assert_eq!(reg(&ram.0, consts::SPC_IMAGE_SIZE), (480 << 16) | 640);
    assert_eq!(reg(&ram.0, consts::SPC_FILTER_SIZE), (5 << 8) | 3);
    assert_eq!(reg(&ram.0, consts::SPC_BATCH), 2);
    assert_eq!(reg(&ram.0, consts::SPC_CH_COL), 75);
    assert_eq!(reg(&ram.0, consts::SPC_N_PATCHES), (120 << 16) | 320);
    assert_eq!(reg(&ram.0, consts::SPC_PAD), 0x0403_0201);
    assert_eq!(reg(&ram.0, consts::SPC_ADAPTED_PAD), 0x0102);
    assert_eq!(reg(&ram.0, consts::SPC_LOG_STRIDES), 0x21);
    // DATA_TYPE word, INTR_EN, CH_MASK 0x0f.
    assert_eq!(reg(&ram.0, consts::SPC_CONTROL), 0x000f_0010);
    assert_eq!(reg(&ram.0, consts::SPC_NUM_CHANNELS), 3);
}

#[test]
fn control_updates_preserve_unrelated_bits() {
    let mut ram = DmaRam([0u8; 0x100]);
    ram.0[consts::DMA_CONTROL..consts::DMA_CONTROL + 4]
        .copy_from_slice(&(1u32 << 31).to_ne_bytes());
    let mut dma = unsafe { MmioDma::new(NonNull::new(ram.0.as_mut_ptr()).unwrap(), 4) };
    let desc = DmaDescriptor {
        src: 0x2000 as *const u8,
        dst: 0x3000 as *mut u8,
        src_inc_d1: 1,
        src_inc_d2: 1,
        dst_inc_d1: 1,
        dst_inc_d2: 1,
        size_d1: 4,
        size_d2: 1,
        pad_top: 0,
        pad_bottom: 0,
        pad_left: 0,
        pad_right: 0,
        dtype: Datatype::Word,
        dim: Dim::D1,
        slot: 0,
        intr_en: false,
    };
    dma.load(0, &desc);
    assert_eq!(reg(&ram.0, consts::DMA_CONTROL), 1 << 31);

    dma.channel(0).set_interrupt_enable(true);
    assert_eq!(reg(&ram.0, consts::DMA_CONTROL), (1 << 31) | (1 << 3));
}

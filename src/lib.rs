//! im2col lowering and transfer validation for the padded-DMA / SPC stack.
//!
//! The crate turns batched, padded, strided 2-D convolution inputs into
//! column matrices for GEMM, either with a software loop or by lowering the
//! job onto a generic DMA engine or the dedicated im2col smart peripheral
//! controller. Every hardware launch goes through a pure validation pass
//! first; the register files are described with type-safe accessors instead
//! of hard-coded offsets, and a register-level software model lets the whole
//! stack run without the silicon.

#![no_std]

extern crate alloc;
#[macro_use]
extern crate log;

use core::ptr::NonNull;

mod completion;
mod config;
mod err;
mod geom;
mod hal;
pub mod lowering;
pub mod registers;
pub mod sat;
mod sim;
mod transfer;
mod validate;

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

pub use completion::*;
pub use config::*;
pub use err::*;
pub use geom::*;
pub use hal::*;
pub use lowering::{im2col_cpu, Strategy};
pub use sim::*;
pub use transfer::*;
pub use validate::*;

use crate::completion::ChannelSlot;

const VERSION_MAJOR: u32 = 0;
const VERSION_MINOR: u32 = 3;
const VERSION_PATCH: u32 = 0;

/// Poll iterations a blocking wait spends before giving up.
pub const DEFAULT_TIMEOUT: usize = 1_000_000;

const fn version(major: u32, minor: u32, patch: u32) -> u32 {
    major * 10000 + minor * 100 + patch
}

pub const fn driver_version() -> u32 {
    version(VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Handle for a launched transaction.
#[derive(Debug)]
pub struct Pending {
    unit: Unit,
    signal: Arc<CompletionFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Dma(usize),
    Spc,
}

/// The dispatcher: owns the two ports, per-channel transaction slots and the
/// completion plumbing.
///
/// Generic over the port implementations so the same code drives the MMIO
/// register files on target and the software model in tests.
pub struct Im2colEngine<D: DmaPort, S: SpcPort> {
    dma: D,
    spc: S,
    config: Im2colConfig,
    slots: Vec<ChannelSlot>,
    spc_slot: ChannelSlot,
    irq_lock: Mutex<()>,
}

/// Engine over the real register files.
pub type MmioEngine = Im2colEngine<MmioDma, MmioSpc>;

impl MmioEngine {
    /// # Safety
    ///
    /// `dma_base` and `spc_base` must be correctly mapped register file
    /// addresses, valid for the lifetime of the returned engine.
    pub unsafe fn from_mmio(
        dma_base: NonNull<u8>,
        spc_base: NonNull<u8>,
        config: Im2colConfig,
    ) -> Self {
        let dma = unsafe { MmioDma::new(dma_base, config.dma_channels) };
        let spc = unsafe { MmioSpc::new(spc_base) };
        Self::new(dma, spc, config)
    }
}

impl<D: DmaPort, S: SpcPort> Im2colEngine<D, S> {
    pub fn new(dma: D, spc: S, config: Im2colConfig) -> Self {
        assert_eq!(dma.channel_count(), config.dma_channels);
        let mut slots = Vec::new();
        slots.resize_with(config.dma_channels, ChannelSlot::new);
        Self {
            dma,
            spc,
            config,
            slots,
            spc_slot: ChannelSlot::new(),
            irq_lock: Mutex::new(()),
        }
    }

    /// Reset both peripherals and forget any completed transactions.
    pub fn init(&mut self) {
        debug!(
            "engine init: generation {:?}, {} dma channels",
            self.config.generation, self.config.dma_channels
        );
        self.dma.init();
        self.spc.init();
        for slot in &mut self.slots {
            *slot = ChannelSlot::new();
        }
        self.spc_slot = ChannelSlot::new();
    }

    pub fn config(&self) -> &Im2colConfig {
        &self.config
    }

    pub fn dma(&self) -> &D {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut D {
        &mut self.dma
    }

    pub fn spc(&self) -> &S {
        &self.spc
    }

    pub fn spc_mut(&mut self) -> &mut S {
        &mut self.spc
    }

    /// Lifecycle phase of a DMA channel's current transaction.
    pub fn channel_phase(&self, ch: usize) -> Option<TransferPhase> {
        self.slots.get(ch).map(|slot| slot.phase)
    }

    /// Run one im2col job with the given strategy, blocking until the column
    /// matrix is complete.
    ///
    /// `input` is NCHW, `output` the column matrix laid out batch-major. The
    /// completion mode shapes how hardware strategies wait; the software
    /// loop has nothing to wait for and ignores it.
    pub fn run(
        &mut self,
        strategy: Strategy,
        geom: &ConvGeometry,
        input: &[u32],
        output: &mut [u32],
        mode: CompletionMode,
    ) -> Result<(), Im2colError> {
        if input.len() != geom.input_len() || output.len() != geom.output_len() {
            return Err(Im2colError::InvalidArgument);
        }
        debug!(
            "im2col {:?}: {} -> {} elements, mode {:?}",
            strategy,
            input.len(),
            output.len(),
            mode
        );
        match strategy {
            Strategy::Cpu => self.run_cpu(geom, input, output),
            Strategy::Dma1d => self.run_dma_1d(geom, input, output, mode),
            Strategy::Dma2d => self.run_dma_2d(geom, input, output, mode),
            Strategy::Spc => {
                let pending = self.begin_spc_job(geom, input, output, mode, None)?;
                self.wait(&pending, DEFAULT_TIMEOUT)
            }
        }
    }

    /// Validate `t` and, when launchable, run it to completion.
    pub fn transfer(
        &mut self,
        t: &Transaction,
        realign: RealignPolicy,
        checks: CheckPolicy,
        timeout: usize,
    ) -> Result<ValidationResult, Im2colError> {
        let (result, pending) = self.begin_transfer(t, realign, checks)?;
        self.wait(&pending, timeout)?;
        Ok(result)
    }

    /// Validate `t` and launch it on its channel without waiting.
    ///
    /// A critical classification refuses the launch before any register is
    /// touched. Non-critical flags are logged and the transfer proceeds,
    /// realigned if the validator narrowed the datatype. The source element
    /// count paces the transfer.
    pub fn begin_transfer(
        &mut self,
        t: &Transaction,
        realign: RealignPolicy,
        checks: CheckPolicy,
    ) -> Result<(ValidationResult, Pending), Im2colError> {
        let ch = t.channel as usize;
        if ch >= self.slots.len() {
            return Err(Im2colError::InvalidArgument);
        }
        let result = validate(t, realign, checks);
        if result.is_critical() {
            warn!("transaction refused: {:?}", result.flags);
            return Err(Im2colError::Rejected(result.flags));
        }
        if !result.is_ok() {
            warn!("transaction flagged {:?}, launching anyway", result.flags);
        }
        let desc = lowering::dma::dma_descriptor(t, &result);
        if desc.size_d1 > self.config.max_size_du || desc.size_d2 > self.config.max_size_du {
            return Err(Im2colError::Unsupported);
        }
        if !self.dma.is_ready(ch) {
            let flags =
                result.flags | ValidationFlags::TRANS_OVERRIDE | ValidationFlags::CRITICAL_ERROR;
            warn!("dma ch{} still running, refusing launch", ch);
            return Err(Im2colError::Rejected(flags));
        }
        self.dma.load(ch, &desc);
        let slot = &mut self.slots[ch];
        slot.phase = TransferPhase::Armed;
        slot.signal = Arc::new(CompletionFlag::new());
        slot.notify = t.notify.clone();
        slot.mode = t.mode;
        let signal = slot.signal.clone();
        debug!(
            "dma ch{} launch: size_d1={} size_d2={} {:?} {:?}",
            ch, desc.size_d1, desc.size_d2, desc.dim, desc.dtype
        );
        self.dma.start(ch, desc.size_d1);
        self.slots[ch].phase = TransferPhase::Running;
        Ok((
            result,
            Pending {
                unit: Unit::Dma(ch),
                signal,
            },
        ))
    }

    /// Validate a whole im2col job and start it on the SPC without waiting.
    ///
    /// `notify` is invoked from the interrupt acknowledge path when the job
    /// finishes, in addition to the completion signal the returned handle
    /// polls.
    pub fn begin_spc_job(
        &mut self,
        geom: &ConvGeometry,
        input: &[u32],
        output: &mut [u32],
        mode: CompletionMode,
        notify: Option<Arc<dyn OnComplete>>,
    ) -> Result<Pending, Im2colError> {
        if input.len() != geom.input_len() || output.len() != geom.output_len() {
            return Err(Im2colError::InvalidArgument);
        }
        let env = Environment::of(output);
        let out_base = output.as_mut_ptr();
        let mut t = lowering::spc::job_transaction(geom, input, out_base, env, mode);
        t.notify = notify;
        // The controller streams whole elements; a base the bus cannot carry
        // at full width is refused rather than narrowed.
        let result = validate(&t, RealignPolicy::DoNotRealign, CheckPolicy::Integrity);
        if result.is_critical() {
            warn!("spc job refused: {:?}", result.flags);
            return Err(Im2colError::Rejected(result.flags));
        }
        let desc = lowering::spc::spc_descriptor(
            geom,
            t.src.ptr as *const u8,
            t.dst.ptr,
            Datatype::Word,
            0xFF,
            mode != CompletionMode::Polling,
        )?;
        if !self.spc.is_ready() {
            let flags =
                result.flags | ValidationFlags::TRANS_OVERRIDE | ValidationFlags::CRITICAL_ERROR;
            warn!("spc still running, refusing launch");
            return Err(Im2colError::Rejected(flags));
        }
        self.spc.load(&desc);
        self.spc_slot.phase = TransferPhase::Armed;
        self.spc_slot.signal = Arc::new(CompletionFlag::new());
        self.spc_slot.notify = t.notify.clone();
        self.spc_slot.mode = mode;
        let signal = self.spc_slot.signal.clone();
        self.spc.start(desc.num_channels);
        self.spc_slot.phase = TransferPhase::Running;
        Ok(Pending {
            unit: Unit::Spc,
            signal,
        })
    }

    /// Block until `pending` completes.
    ///
    /// Checks both the completion signal and the ready status each
    /// iteration, so the wait terminates whether or not the interrupt vector
    /// is wired up; when completion is first observed through the status,
    /// the interrupt flag is read to keep it acknowledged.
    pub fn wait(&mut self, pending: &Pending, timeout: usize) -> Result<(), Im2colError> {
        const LOG_INTERVAL: usize = 100_000;
        for iteration in 0..timeout {
            if pending.signal.is_signalled() {
                match pending.unit {
                    Unit::Dma(ch) => self.slots[ch].phase = TransferPhase::Done,
                    Unit::Spc => self.spc_slot.phase = TransferPhase::Done,
                }
                return Ok(());
            }
            let ready = match pending.unit {
                Unit::Dma(ch) => self.dma.is_ready(ch),
                Unit::Spc => self.spc.is_ready(),
            };
            if ready {
                match pending.unit {
                    Unit::Dma(ch) => {
                        let _ = self.dma.take_irq(ch);
                        self.slots[ch].complete();
                    }
                    Unit::Spc => {
                        let _ = self.spc.take_irq();
                        self.spc_slot.complete();
                    }
                }
                return Ok(());
            }
            if iteration != 0 && iteration % LOG_INTERVAL == 0 {
                let (status, phase) = self.unit_state(pending.unit);
                debug!(
                    "wait[{:?}]: iter={} status=0x{:x} phase={:?}",
                    pending.unit, iteration, status, phase
                );
            }
            let mode = match pending.unit {
                Unit::Dma(ch) => self.slots[ch].mode,
                Unit::Spc => self.spc_slot.mode,
            };
            if mode == CompletionMode::InterruptWait {
                match pending.unit {
                    Unit::Dma(_) => self.dma.wait_for_event(),
                    Unit::Spc => self.spc.wait_for_event(),
                }
            } else {
                core::hint::spin_loop();
            }
        }

        let (status, phase) = self.unit_state(pending.unit);
        error!(
            "wait timeout: unit={:?} status=0x{:x} phase={:?} signalled={}",
            pending.unit,
            status,
            phase,
            pending.signal.is_signalled()
        );
        match pending.unit {
            Unit::Dma(ch) => self.slots[ch].phase = TransferPhase::Error,
            Unit::Spc => self.spc_slot.phase = TransferPhase::Error,
        }
        Err(Im2colError::Timeout)
    }

    /// Acknowledge and dispatch raised DMA channel interrupts. Call from the
    /// platform's fast-interrupt handler for [`Im2colConfig::dma_irq`].
    pub fn handle_dma_interrupt(&mut self) {
        let _guard = self.irq_lock.lock();
        for ch in 0..self.slots.len() {
            if self.dma.take_irq(ch) {
                self.slots[ch].complete();
            }
        }
    }

    /// Acknowledge and dispatch a raised SPC interrupt. Call from the
    /// platform's handler for [`Im2colConfig::spc_irq`].
    pub fn handle_spc_interrupt(&mut self) {
        let _guard = self.irq_lock.lock();
        if self.spc.take_irq() {
            self.spc_slot.complete();
        }
    }

    fn unit_state(&self, unit: Unit) -> (u32, TransferPhase) {
        match unit {
            Unit::Dma(ch) => (self.dma.status_word(ch), self.slots[ch].phase),
            Unit::Spc => (self.spc.status_word(), self.spc_slot.phase),
        }
    }

    /// Software loop with the same admission control as the hardware paths:
    /// a job the validator would refuse to launch is refused here too.
    fn run_cpu(
        &mut self,
        geom: &ConvGeometry,
        input: &[u32],
        output: &mut [u32],
    ) -> Result<(), Im2colError> {
        let env = Environment::of(output);
        let t = lowering::spc::job_transaction(
            geom,
            input,
            output.as_mut_ptr(),
            env,
            CompletionMode::Polling,
        );
        let result = validate(&t, RealignPolicy::DoNotRealign, CheckPolicy::Integrity);
        if result.is_critical() {
            return Err(Im2colError::Rejected(result.flags));
        }
        im2col_cpu(geom, input, output);
        Ok(())
    }

    /// One strided 1-D transaction per non-border output row. The engine
    /// never writes border cells in this mode, so the destination is zeroed
    /// up front.
    fn run_dma_1d(
        &mut self,
        geom: &ConvGeometry,
        input: &[u32],
        output: &mut [u32],
        mode: CompletionMode,
    ) -> Result<(), Im2colError> {
        output.fill(0);
        let env = Environment::of(output);
        let out_base = output.as_mut_ptr();
        for b in 0..geom.shape.batch {
            for c in 0..geom.patches.ch_col {
                let plan = lowering::dma::plan_column(geom, c)?;
                for h in 0..geom.patches.n_patches_h {
                    let Some(t) = lowering::dma::row_transaction(
                        geom, &plan, b, h, input, out_base, env, mode, 0,
                    ) else {
                        continue;
                    };
                    self.transfer(
                        &t,
                        RealignPolicy::Realign,
                        CheckPolicy::Integrity,
                        DEFAULT_TIMEOUT,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// One padded 2-D transaction per channel column and batch image; the
    /// engine writes the border zeros itself. Columns that never touch real
    /// data have no transaction and are zeroed by the core.
    fn run_dma_2d(
        &mut self,
        geom: &ConvGeometry,
        input: &[u32],
        output: &mut [u32],
        mode: CompletionMode,
    ) -> Result<(), Im2colError> {
        let env = Environment::of(output);
        let out_base = output.as_mut_ptr();
        let block = (geom.patches.n_patches_w * geom.patches.n_patches_h) as usize;
        for b in 0..geom.shape.batch {
            for c in 0..geom.patches.ch_col {
                let plan = lowering::dma::plan_column(geom, c)?;
                match lowering::dma::column_transaction(
                    geom, &plan, b, input, out_base, env, mode, 0,
                ) {
                    Some(t) => {
                        self.transfer(
                            &t,
                            RealignPolicy::Realign,
                            CheckPolicy::Integrity,
                            DEFAULT_TIMEOUT,
                        )?;
                    }
                    None => {
                        let start = geom.dst_index(b, c, 0, 0);
                        unsafe { core::slice::from_raw_parts_mut(out_base.add(start), block) }
                            .fill(0);
                    }
                }
            }
        }
        Ok(())
    }
}

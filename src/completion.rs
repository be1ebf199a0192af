//! Completion protocol: per-channel transaction lifecycle and the signal the
//! interrupt acknowledge path raises for whoever is waiting.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::transfer::CompletionMode;

/// Capability invoked when the hardware reports a transaction done. Supplied
/// per transaction; the dispatcher calls it from the acknowledge path, so
/// implementations must be interrupt-safe.
pub trait OnComplete: Send + Sync {
    fn on_complete(&self);
}

/// Lifecycle of the transaction occupying one hardware channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPhase {
    /// No transaction placed on the channel yet.
    #[default]
    Idle,
    /// Registers programmed, launch register not written.
    Armed,
    /// Launch register written, hardware busy.
    Running,
    Done,
    Error,
}

/// Single-slot completion signal. The producer is the interrupt acknowledge
/// path, the consumer the waiting caller; one flag belongs to one channel's
/// current transaction.
#[derive(Debug, Default)]
pub struct CompletionFlag(AtomicBool);

impl CompletionFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Rearm for the channel's next transaction.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OnComplete for CompletionFlag {
    fn on_complete(&self) {
        self.signal();
    }
}

/// Book-keeping for the transaction currently occupying one channel.
pub(crate) struct ChannelSlot {
    pub phase: TransferPhase,
    pub signal: Arc<CompletionFlag>,
    pub notify: Option<Arc<dyn OnComplete>>,
    pub mode: CompletionMode,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self {
            phase: TransferPhase::Idle,
            signal: Arc::new(CompletionFlag::new()),
            notify: None,
            mode: CompletionMode::Polling,
        }
    }

    /// Mark the slot done and fire its observers. Safe to call more than
    /// once per transaction; the signal is idempotent.
    pub fn complete(&mut self) {
        self.phase = TransferPhase::Done;
        self.signal.signal();
        if let Some(notify) = &self.notify {
            notify.on_complete();
        }
    }
}

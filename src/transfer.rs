//! Transfer targets and transactions: the value-level description of one
//! asynchronous data movement, independent of the peripheral that will
//! eventually carry it out.

use alloc::sync::Arc;
use core::fmt;
use core::mem;
use core::ptr;

use crate::completion::OnComplete;
use crate::geom::{ConvGeometry, PaddingSpec};

/// Element width moved on the bus. Two-bit hardware encoding; the second
/// byte encoding (`0b11`) is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Datatype {
    Word = 0,
    HalfWord = 1,
    Byte = 2,
}

impl Datatype {
    /// Element size in bytes.
    pub const fn size(self) -> usize {
        match self {
            Datatype::Word => 4,
            Datatype::HalfWord => 2,
            Datatype::Byte => 1,
        }
    }

    /// Two-bit register encoding.
    pub const fn encoding(self) -> u32 {
        self as u32
    }

    pub const fn from_encoding(v: u32) -> Option<Self> {
        match v {
            0 => Some(Datatype::Word),
            1 => Some(Datatype::HalfWord),
            2 => Some(Datatype::Byte),
            _ => None,
        }
    }

    /// Narrow by `steps` halvings (word, half word, byte). Saturates at byte.
    pub const fn narrow(self, steps: u8) -> Self {
        match self as u8 + steps {
            0 => Datatype::Word,
            1 => Datatype::HalfWord,
            _ => Datatype::Byte,
        }
    }
}

/// What paces a target: free-running memory access, or one of the hardware
/// handshake slots a peripheral FIFO is wired to. Slot ids start at 1;
/// encoding 0 means memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Memory,
    Slot(u8),
}

impl Trigger {
    pub const fn encoding(self) -> u32 {
        match self {
            Trigger::Memory => 0,
            Trigger::Slot(s) => s as u32,
        }
    }
}

/// Transfer dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    D1,
    D2,
}

impl Dim {
    pub const fn encoding(self) -> u32 {
        match self {
            Dim::D1 => 0,
            Dim::D2 => 1,
        }
    }
}

/// How the caller observes the end of a transaction. The choice never alters
/// what the transaction moves, only how completion is noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Spin on the ready status.
    #[default]
    Polling,
    /// Enable the interrupt, poll the completion signal it raises.
    Interrupt,
    /// Enable the interrupt and halt between checks.
    InterruptWait,
}

/// Byte bounds of a destination region the transfer must stay inside.
/// `end` is the last valid byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub start: *const u8,
    pub end: *const u8,
}

impl Environment {
    /// Bounds covering `buf` exactly.
    pub fn of<T>(buf: &[T]) -> Self {
        let bytes = mem::size_of_val(buf);
        assert!(bytes > 0);
        let start = buf.as_ptr() as *const u8;
        Self {
            start,
            end: unsafe { start.add(bytes - 1) },
        }
    }
}

unsafe impl Send for Environment {}

/// One side of a transfer: where it reads or writes, how it steps, and how
/// much it moves. All increments and counts are in data units of `dtype`.
#[derive(Debug, Clone, Copy)]
pub struct TransferTarget {
    pub ptr: *mut u8,
    /// Step between consecutive elements.
    pub inc_du: u32,
    /// Step applied instead of `inc_du` after the last element of each inner
    /// row of a 2-D transfer. Two's complement in the register, so it may
    /// rewind.
    pub inc_d2_du: i32,
    /// Elements per inner row.
    pub size_du: u32,
    /// Inner rows. Ignored for 1-D transfers.
    pub size_d2_du: u32,
    pub dtype: Datatype,
    pub trigger: Trigger,
    /// Bounds for the outbound check; only meaningful on a destination.
    pub env: Option<Environment>,
}

unsafe impl Send for TransferTarget {}

impl Default for TransferTarget {
    fn default() -> Self {
        Self {
            ptr: ptr::null_mut(),
            inc_du: 1,
            inc_d2_du: 1,
            size_du: 0,
            size_d2_du: 1,
            dtype: Datatype::Word,
            trigger: Trigger::Memory,
            env: None,
        }
    }
}

impl TransferTarget {
    /// Contiguous read target covering `buf`.
    pub fn reading<T>(buf: &[T], dtype: Datatype) -> Self {
        let bytes = mem::size_of_val(buf);
        debug_assert!(bytes % dtype.size() == 0);
        Self {
            ptr: buf.as_ptr() as *mut u8,
            size_du: (bytes / dtype.size()) as u32,
            dtype,
            ..Self::default()
        }
    }

    /// Contiguous write target covering `buf`, with its bounds attached for
    /// the outbound check.
    pub fn writing<T>(buf: &mut [T], dtype: Datatype) -> Self {
        let env = Environment::of(buf);
        let bytes = mem::size_of_val(buf);
        debug_assert!(bytes % dtype.size() == 0);
        Self {
            ptr: buf.as_mut_ptr() as *mut u8,
            size_du: (bytes / dtype.size()) as u32,
            dtype,
            env: Some(env),
            ..Self::default()
        }
    }
}

/// A single data movement, validated before it is handed to hardware. Pure
/// value: building or validating one touches no peripheral state.
#[derive(Clone)]
pub struct Transaction {
    /// Convolution this transfer belongs to, carried for recomputation.
    pub geom: ConvGeometry,
    pub src: TransferTarget,
    pub dst: TransferTarget,
    pub dim: Dim,
    /// Zero border the engine synthesizes around the destination block of a
    /// 2-D transfer; all zero for 1-D.
    pub border: PaddingSpec,
    pub mode: CompletionMode,
    /// Hardware channel the dispatcher should place this on.
    pub channel: u8,
    /// Capability invoked from the interrupt acknowledge path.
    pub notify: Option<Arc<dyn OnComplete>>,
}

unsafe impl Send for Transaction {}

impl Transaction {
    pub fn new(geom: ConvGeometry, src: TransferTarget, dst: TransferTarget) -> Self {
        Self {
            geom,
            src,
            dst,
            dim: Dim::D1,
            border: PaddingSpec::default(),
            mode: CompletionMode::Polling,
            channel: 0,
            notify: None,
        }
    }

    /// Total bytes this transaction writes at the destination, synthesized
    /// zero border included. Counted in the original datatype, so the value
    /// is invariant under realignment.
    pub fn output_range_bytes(&self) -> usize {
        let per_row =
            self.border.left as usize + self.dst.size_du as usize + self.border.right as usize;
        let rows = match self.dim {
            Dim::D1 => 1,
            Dim::D2 => {
                self.border.top as usize
                    + self.dst.size_d2_du as usize
                    + self.border.bottom as usize
            }
        };
        per_row * rows * self.dst.dtype.size()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("dim", &self.dim)
            .field("border", &self.border)
            .field("mode", &self.mode)
            .field("channel", &self.channel)
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

//! Pure pre-launch classification of transactions.
//!
//! [`validate`] inspects a transaction and returns a fresh
//! [`ValidationResult`]; it never touches the transaction, any hardware
//! register, or any shared state, so calling it twice on the same input
//! yields the same answer. The dispatcher refuses to program a channel from
//! a result carrying [`ValidationFlags::CRITICAL_ERROR`].

use crate::geom::{ConvGeometry, MAX_PAD};
use crate::transfer::{Datatype, Dim, Transaction, TransferTarget, Trigger};

bitflags::bitflags! {
    /// Classification mask produced by [`validate`]. An empty mask means the
    /// transaction is safe to launch as described.
    pub struct ValidationFlags: u32 {
        /// Source target is malformed.
        const SRC = 1 << 0;
        /// Destination target is malformed.
        const DST = 1 << 1;
        /// A pointer is not aligned to the datatype.
        const MISALIGN = 1 << 2;
        /// A free-running target never advances; later elements overwrite
        /// earlier ones. Informational.
        const OVERLAP = 1 << 3;
        /// Misaligned and not contiguous, so datatype narrowing cannot
        /// preserve the element stream.
        const DISCONTINUOUS = 1 << 4;
        /// The write range leaves the destination environment.
        const OUTBOUNDS = 1 << 5;
        /// Targets disagree with each other or with the recomputed geometry.
        const INCOMPATIBLE = 1 << 6;
        /// A launch was attempted on a channel that is still running.
        const TRANS_OVERRIDE = 1 << 7;
        /// The transaction must not reach the hardware.
        const CRITICAL_ERROR = 1 << 8;
    }
}

/// How thoroughly to examine a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPolicy {
    /// Structural checks only.
    SanityOnly,
    /// Structural checks plus datatype and alignment analysis.
    Integrity,
}

/// Whether a recoverable misalignment may narrow the transfer datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealignPolicy {
    Realign,
    DoNotRealign,
}

/// Outcome of one [`validate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    pub flags: ValidationFlags,
    /// Datatype the bus will actually carry after any realignment. Equal to
    /// the requested type unless the result contains
    /// [`ValidationFlags::MISALIGN`] without a critical flag.
    pub effective_type: Datatype,
    /// Narrowing steps a realignment applied or would apply.
    pub misalignment: u8,
}

impl ValidationResult {
    fn clean(dtype: Datatype) -> Self {
        Self {
            flags: ValidationFlags::empty(),
            effective_type: dtype,
            misalignment: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        self.flags.contains(ValidationFlags::CRITICAL_ERROR)
    }
}

/// Narrowing steps needed to align `addr` for `dtype` accesses.
fn misalign_steps(addr: usize, dtype: Datatype) -> u8 {
    match dtype {
        Datatype::Word => {
            if addr % 4 == 0 {
                0
            } else if addr % 2 == 0 {
                1
            } else {
                2
            }
        }
        Datatype::HalfWord => (addr % 2 != 0) as u8,
        Datatype::Byte => 0,
    }
}

fn target_malformed(t: &TransferTarget) -> bool {
    let null = match t.trigger {
        Trigger::Memory => t.ptr.is_null(),
        // A slot-paced target is addressed by the hardware handshake.
        Trigger::Slot(_) => false,
    };
    null || t.size_du == 0
}

/// Classify `t` without touching it.
///
/// Structural problems in the caller's own code (padding outside the
/// register field range) are programming errors and panic; everything that
/// can legitimately arise from data is reported through the returned flags.
/// Classification stops at the first critical condition, so a critical
/// result never carries flags from later steps.
pub fn validate(t: &Transaction, realign: RealignPolicy, checks: CheckPolicy) -> ValidationResult {
    let g = &t.geom;
    assert!(
        g.pad.top <= MAX_PAD
            && g.pad.bottom <= MAX_PAD
            && g.pad.left <= MAX_PAD
            && g.pad.right <= MAX_PAD
    );
    assert!(g.adapted.right <= MAX_PAD && g.adapted.bottom <= MAX_PAD);
    assert!(
        t.border.top <= MAX_PAD
            && t.border.bottom <= MAX_PAD
            && t.border.left <= MAX_PAD
            && t.border.right <= MAX_PAD
    );

    let mut r = ValidationResult::clean(t.src.dtype);

    if target_malformed(&t.src) {
        r.flags |= ValidationFlags::SRC;
    }
    if target_malformed(&t.dst) {
        r.flags |= ValidationFlags::DST;
    }
    if !r.flags.is_empty() {
        r.flags |= ValidationFlags::CRITICAL_ERROR;
        return r;
    }

    // The geometry travels with the transaction; recompute it so a stale or
    // hand-edited copy cannot program nonsense extents.
    match ConvGeometry::derive(g.shape, g.filter, g.pad) {
        Ok(derived) if derived == *g => {}
        _ => {
            r.flags |= ValidationFlags::INCOMPATIBLE | ValidationFlags::CRITICAL_ERROR;
            return r;
        }
    }

    if checks == CheckPolicy::Integrity {
        if t.src.dtype != t.dst.dtype {
            r.flags |= ValidationFlags::INCOMPATIBLE | ValidationFlags::CRITICAL_ERROR;
            return r;
        }
        let steps = misalign_steps(t.src.ptr as usize, t.src.dtype)
            .max(misalign_steps(t.dst.ptr as usize, t.dst.dtype));
        if steps != 0 {
            r.flags |= ValidationFlags::MISALIGN;
            r.misalignment = steps;
            if realign == RealignPolicy::DoNotRealign {
                r.flags |= ValidationFlags::CRITICAL_ERROR;
                return r;
            }
            // Narrowing the datatype only reproduces the element stream when
            // both targets step element by element in one dimension.
            if t.dim == Dim::D2 || t.src.inc_du > 1 || t.dst.inc_du > 1 {
                r.flags |= ValidationFlags::DISCONTINUOUS | ValidationFlags::CRITICAL_ERROR;
                return r;
            }
            r.effective_type = t.src.dtype.narrow(steps);
        }
        if t.src.trigger == Trigger::Memory && t.src.inc_du == 0 {
            r.flags |= ValidationFlags::OVERLAP;
        }
        if t.dst.trigger == Trigger::Memory && t.dst.inc_du == 0 {
            r.flags |= ValidationFlags::OVERLAP;
        }
    }

    if let Some(env) = t.dst.env {
        let start = t.dst.ptr as usize;
        let range = t.output_range_bytes();
        if start < env.start as usize || start + range - 1 > env.end as usize {
            r.flags |= ValidationFlags::OUTBOUNDS | ValidationFlags::CRITICAL_ERROR;
            return r;
        }
    }

    r
}

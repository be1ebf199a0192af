//! Scalar bit-width helpers shared by the geometry code and the register
//! packers: explicit saturation into `bits`-wide domains plus the small
//! power-of-two utilities the descriptor builders rely on.

/// Mask with the lowest `n` bits set.
pub const fn mask(n: u32) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1 << n) - 1
    }
}

const fn clamp_signed(x: i64, bits: u32) -> i32 {
    let lo = -(1i64 << (bits - 1));
    let hi = (1i64 << (bits - 1)) - 1;
    if x < lo {
        lo as i32
    } else if x > hi {
        hi as i32
    } else {
        x as i32
    }
}

/// Clamp `x` into the signed `bits`-wide range.
pub const fn clip(x: i32, bits: u32) -> i32 {
    assert!(bits >= 1 && bits <= 32);
    clamp_signed(x as i64, bits)
}

/// Clamp `x` into the unsigned `bits`-wide range.
pub const fn clipu(x: i32, bits: u32) -> u32 {
    assert!(bits >= 1 && bits <= 32);
    let hi = (1u64 << bits) - 1;
    if x < 0 {
        0
    } else if x as u64 > hi {
        hi as u32
    } else {
        x as u32
    }
}

/// Saturating add in a `bits`-wide signed domain.
pub const fn add_sat(a: i32, b: i32, bits: u32) -> i32 {
    assert!(bits >= 1 && bits <= 32);
    clamp_signed(a as i64 + b as i64, bits)
}

/// Saturating subtract in a `bits`-wide signed domain.
pub const fn sub_sat(a: i32, b: i32, bits: u32) -> i32 {
    assert!(bits >= 1 && bits <= 32);
    clamp_signed(a as i64 - b as i64, bits)
}

/// Multiply-accumulate of 16-bit operands, saturated into 32 bits.
pub const fn mac(acc: i32, a: i16, b: i16) -> i32 {
    clamp_signed(acc as i64 + (a as i64) * (b as i64), 32)
}

/// Dot product of two pairs of 16-bit lanes, saturated into 32 bits.
pub const fn dotp2(a: (i16, i16), b: (i16, i16)) -> i32 {
    clamp_signed((a.0 as i64) * (b.0 as i64) + (a.1 as i64) * (b.1 as i64), 32)
}

/// Sign-extend the low `bits` of `v`.
pub const fn sign_extend(v: u32, bits: u32) -> i32 {
    assert!(bits >= 1 && bits <= 32);
    let shift = 32 - bits;
    ((v << shift) as i32) >> shift
}

/// Exact base-2 logarithm, `None` unless `v` is a power of two.
pub const fn log2_exact(v: u32) -> Option<u32> {
    if v.is_power_of_two() {
        Some(v.trailing_zeros())
    } else {
        None
    }
}

/// True when `v` fits an unsigned `bits`-wide register field.
pub const fn fits(v: u32, bits: u32) -> bool {
    v <= mask(bits)
}

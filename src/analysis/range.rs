//! Interval lattice for integer values of a fixed bit width.
//!
//! An [`IntRange`] bounds one SSA value's possible bit patterns under both
//! interpretations at once: `[smin, smax]` bounds the value read as signed,
//! `[umin, umax]` bounds the same bit patterns read as unsigned. Each
//! projection is independently sound; neither is allowed to exclude a bit
//! pattern the value can actually take.
//!
//! "No information yet" (bottom) is represented by *absence* of a range from
//! the fact store, never by a sentinel value here. [`IntRange::full`] is top.
//!
//! Transfer functions model wraparound on the concrete width: a projection
//! whose exact result would leave the representable range widens to the full
//! projection for that width, independently of the other projection.

/// Largest unsigned value representable at `width` bits.
pub const fn max_unsigned(width: u8) -> u64 {
    u64::MAX >> (64 - width as u32)
}

/// Largest signed value representable at `width` bits.
pub const fn max_signed(width: u8) -> i64 {
    (max_unsigned(width) >> 1) as i64
}

/// Smallest signed value representable at `width` bits.
pub const fn min_signed(width: u8) -> i64 {
    -max_signed(width) - 1
}

/// Interpret the low `width` bits of `bits` as a signed value.
const fn sign_extend(bits: u64, width: u8) -> i64 {
    let shift = 64 - width as u32;
    ((bits << shift) as i64) >> shift
}

/// A closed interval of possible values for one bit width, tracked under
/// both signed and unsigned interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRange {
    width: u8,
    smin: i64,
    smax: i64,
    umin: u64,
    umax: u64,
}

impl IntRange {
    /// The unconstrained range at `width` bits (lattice top).
    pub fn full(width: u8) -> Self {
        Self {
            width,
            smin: min_signed(width),
            smax: max_signed(width),
            umin: 0,
            umax: max_unsigned(width),
        }
    }

    /// The singleton range of one constant, given as raw bits.
    pub fn constant(width: u8, bits: u64) -> Self {
        let masked = bits & max_unsigned(width);
        let signed = sign_extend(masked, width);
        Self {
            width,
            smin: signed,
            smax: signed,
            umin: masked,
            umax: masked,
        }
    }

    /// Range from signed bounds; the unsigned projection is derived.
    ///
    /// # Panics
    ///
    /// Debug-panics if the bounds are inverted or not representable at `width`.
    pub fn from_signed(width: u8, smin: i64, smax: i64) -> Self {
        debug_assert!(smin <= smax);
        debug_assert!(smin >= min_signed(width) && smax <= max_signed(width));
        let (umin, umax) = if smin >= 0 {
            (smin as u64, smax as u64)
        } else if smax < 0 {
            // Entirely negative: bit patterns are a contiguous high interval.
            (
                smin as u64 & max_unsigned(width),
                smax as u64 & max_unsigned(width),
            )
        } else {
            // Crosses zero: patterns wrap, no unsigned interval tighter than full.
            (0, max_unsigned(width))
        };
        Self {
            width,
            smin,
            smax,
            umin,
            umax,
        }
    }

    /// Range from unsigned bounds; the signed projection is derived.
    pub fn from_unsigned(width: u8, umin: u64, umax: u64) -> Self {
        debug_assert!(umin <= umax);
        debug_assert!(umax <= max_unsigned(width));
        let (smin, smax) = if umax <= max_signed(width) as u64 {
            (umin as i64, umax as i64)
        } else if umin > max_signed(width) as u64 {
            // Entirely in the high half: all patterns read as negative.
            (sign_extend(umin, width), sign_extend(umax, width))
        } else {
            (min_signed(width), max_signed(width))
        };
        Self {
            width,
            smin,
            smax,
            umin,
            umax,
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn smin(&self) -> i64 {
        self.smin
    }

    pub fn smax(&self) -> i64 {
        self.smax
    }

    pub fn umin(&self) -> u64 {
        self.umin
    }

    pub fn umax(&self) -> u64 {
        self.umax
    }

    /// Smallest range covering both operands (lattice join). Never narrows.
    ///
    /// # Panics
    ///
    /// Debug-panics if the widths differ.
    pub fn join(&self, other: &IntRange) -> IntRange {
        debug_assert_eq!(self.width, other.width, "join of mismatched widths");
        IntRange {
            width: self.width,
            smin: self.smin.min(other.smin),
            smax: self.smax.max(other.smax),
            umin: self.umin.min(other.umin),
            umax: self.umax.max(other.umax),
        }
    }

    /// Whether the signed interpretation is provably non-negative.
    pub fn is_non_negative(&self) -> bool {
        self.smin >= 0
    }

    /// Whether every unsigned interpretation is at most `bound`.
    pub fn fits_unsigned(&self, bound: u64) -> bool {
        self.umin <= bound && self.umax <= bound
    }

    pub fn contains_signed(&self, x: i64) -> bool {
        self.smin <= x && x <= self.smax
    }

    pub fn contains_unsigned(&self, x: u64) -> bool {
        self.umin <= x && x <= self.umax
    }

    // ========================================================================
    // Transfer functions
    // ========================================================================

    /// Compose independently computed projections, widening each that
    /// overflowed its representable range.
    fn compose(
        width: u8,
        signed: Option<(i64, i64)>,
        unsigned: Option<(u64, u64)>,
    ) -> Self {
        let full = Self::full(width);
        let (smin, smax) = signed.unwrap_or((full.smin, full.smax));
        let (umin, umax) = unsigned.unwrap_or((full.umin, full.umax));
        Self {
            width,
            smin,
            smax,
            umin,
            umax,
        }
    }

    fn signed_window(width: u8, lo: i128, hi: i128) -> Option<(i64, i64)> {
        if lo >= min_signed(width) as i128 && hi <= max_signed(width) as i128 {
            Some((lo as i64, hi as i64))
        } else {
            None
        }
    }

    fn unsigned_window(width: u8, lo: u128, hi: u128) -> Option<(u64, u64)> {
        if hi <= max_unsigned(width) as u128 {
            Some((lo as u64, hi as u64))
        } else {
            None
        }
    }

    pub fn add(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        let signed = Self::signed_window(
            w,
            self.smin as i128 + rhs.smin as i128,
            self.smax as i128 + rhs.smax as i128,
        );
        let unsigned = Self::unsigned_window(
            w,
            self.umin as u128 + rhs.umin as u128,
            self.umax as u128 + rhs.umax as u128,
        );
        Self::compose(w, signed, unsigned)
    }

    pub fn sub(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        let signed = Self::signed_window(
            w,
            self.smin as i128 - rhs.smax as i128,
            self.smax as i128 - rhs.smin as i128,
        );
        let ulo = self.umin as i128 - rhs.umax as i128;
        let uhi = self.umax as i128 - rhs.umin as i128;
        let unsigned = if ulo >= 0 {
            Some((ulo as u64, uhi as u64))
        } else {
            None
        };
        Self::compose(w, signed, unsigned)
    }

    pub fn mul(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        let corners = [
            self.smin as i128 * rhs.smin as i128,
            self.smin as i128 * rhs.smax as i128,
            self.smax as i128 * rhs.smin as i128,
            self.smax as i128 * rhs.smax as i128,
        ];
        let signed = Self::signed_window(
            w,
            corners.iter().copied().min().unwrap_or(0),
            corners.iter().copied().max().unwrap_or(0),
        );
        let unsigned = Self::unsigned_window(
            w,
            self.umin as u128 * rhs.umin as u128,
            self.umax as u128 * rhs.umax as u128,
        );
        Self::compose(w, signed, unsigned)
    }

    pub fn div_ui(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w || rhs.umin == 0 {
            // Division by zero possible: no sound bound.
            return Self::full(w);
        }
        Self::from_unsigned(w, self.umin / rhs.umax, self.umax / rhs.umin)
    }

    pub fn ceil_div_ui(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w || rhs.umin == 0 {
            return Self::full(w);
        }
        let lo = self.umin.div_ceil(rhs.umax);
        let hi = self.umax.div_ceil(rhs.umin);
        if hi > max_unsigned(w) {
            return Self::full(w);
        }
        Self::from_unsigned(w, lo, hi)
    }

    fn signed_corner_div(&self, rhs: &IntRange, f: fn(i128, i128) -> i128) -> IntRange {
        let w = self.width;
        if rhs.width != w || (rhs.smin <= 0 && rhs.smax >= 0) {
            // Divisor may be zero.
            return Self::full(w);
        }
        let mut lo = i128::MAX;
        let mut hi = i128::MIN;
        for x in [self.smin as i128, self.smax as i128] {
            for y in [rhs.smin as i128, rhs.smax as i128] {
                let q = f(x, y);
                lo = lo.min(q);
                hi = hi.max(q);
            }
        }
        match Self::signed_window(w, lo, hi) {
            Some((smin, smax)) => Self::from_signed(w, smin, smax),
            None => Self::full(w),
        }
    }

    pub fn div_si(&self, rhs: &IntRange) -> IntRange {
        self.signed_corner_div(rhs, |x, y| x / y)
    }

    pub fn floor_div_si(&self, rhs: &IntRange) -> IntRange {
        self.signed_corner_div(rhs, |x, y| {
            let q = x / y;
            if x % y != 0 && (x < 0) != (y < 0) { q - 1 } else { q }
        })
    }

    pub fn ceil_div_si(&self, rhs: &IntRange) -> IntRange {
        self.signed_corner_div(rhs, |x, y| {
            let q = x / y;
            if x % y != 0 && (x < 0) == (y < 0) { q + 1 } else { q }
        })
    }

    pub fn rem_ui(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w || rhs.umin == 0 {
            return Self::full(w);
        }
        // Result is below the divisor and never above the dividend.
        Self::from_unsigned(w, 0, self.umax.min(rhs.umax - 1))
    }

    pub fn rem_si(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w || (rhs.smin <= 0 && rhs.smax >= 0) {
            return Self::full(w);
        }
        // |r| < max |divisor|, and the sign of r follows the dividend.
        let m = (rhs.smin as i128).abs().max((rhs.smax as i128).abs()) - 1;
        let lo = if self.smin >= 0 {
            0
        } else {
            (self.smin as i128).max(-m) as i64
        };
        let hi = if self.smax <= 0 {
            0
        } else {
            (self.smax as i128).min(m) as i64
        };
        Self::from_signed(w, lo, hi)
    }

    pub fn min_si(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        Self::from_signed(w, self.smin.min(rhs.smin), self.smax.min(rhs.smax))
    }

    pub fn max_si(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        Self::from_signed(w, self.smin.max(rhs.smin), self.smax.max(rhs.smax))
    }

    pub fn min_ui(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        Self::from_unsigned(w, self.umin.min(rhs.umin), self.umax.min(rhs.umax))
    }

    pub fn max_ui(&self, rhs: &IntRange) -> IntRange {
        let w = self.width;
        if rhs.width != w {
            return Self::full(w);
        }
        Self::from_unsigned(w, self.umin.max(rhs.umin), self.umax.max(rhs.umax))
    }

    /// Sign-extension to `out_width`.
    pub fn ext_si(&self, out_width: u8) -> IntRange {
        debug_assert!(out_width >= self.width);
        Self::from_signed(out_width, self.smin, self.smax)
    }

    /// Zero-extension to `out_width`.
    pub fn ext_ui(&self, out_width: u8) -> IntRange {
        debug_assert!(out_width >= self.width);
        Self::from_unsigned(out_width, self.umin, self.umax)
    }

    /// Truncation to `out_width`. Keeps bounds that provably survive the
    /// truncation, otherwise widens to full at the narrow width.
    pub fn trunc(&self, out_width: u8) -> IntRange {
        debug_assert!(out_width <= self.width);
        if self.umax <= max_unsigned(out_width) {
            Self::from_unsigned(out_width, self.umin, self.umax)
        } else if self.smin >= min_signed(out_width) && self.smax <= max_signed(out_width) {
            Self::from_signed(out_width, self.smin, self.smax)
        } else {
            Self::full(out_width)
        }
    }

    /// Width change with signed semantics (extend or truncate as needed).
    pub fn resize_signed(&self, out_width: u8) -> IntRange {
        if out_width >= self.width {
            self.ext_si(out_width)
        } else {
            self.trunc(out_width)
        }
    }

    /// Width change with unsigned semantics.
    pub fn resize_unsigned(&self, out_width: u8) -> IntRange {
        if out_width >= self.width {
            self.ext_ui(out_width)
        } else {
            self.trunc(out_width)
        }
    }
}

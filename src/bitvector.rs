//! Two's-complement arithmetic circuits over region vectors.
//!
//! A [`Bitvector`] is a fixed-length, LSB-first sequence of [`Region`]s
//! encoding an integer in two's complement. [`BitvectorManager`] builds the
//! boolean circuits for arithmetic, comparison, shifts and casts; it is
//! stateless (no mutable fields), so one instance can serve any number of
//! evaluations over the same region manager.
//!
//! Width discipline: every binary operation requires equal operand widths.
//! A mismatch is a bug in the caller's width computation, not a data
//! problem, and fails the `assert_eq!` immediately.
//!
//! Conventions pinned for compatibility (the source language leaves them
//! undefined):
//! - division by a literal-zero divisor yields all-ones (−1), signed and
//!   unsigned alike; modulo by literal zero returns the dividend unchanged;
//! - shifts consult only the low ⌈log2(width)⌉ bits of the shift amount.

use std::rc::Rc;

use log::debug;
use num_bigint::{BigInt, Sign};

use crate::region::{Region, RegionManager};

/// Fixed-width vector of regions, LSB first.
///
/// The width is fixed at creation and invariant for the vector's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitvector {
    bits: Vec<Region>,
}

impl Bitvector {
    pub fn new(bits: Vec<Region>) -> Self {
        assert!(!bits.is_empty(), "Bitvectors must have at least one bit");
        Self { bits }
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Bit `i`, with bit 0 the least significant.
    pub fn bit(&self, i: usize) -> Region {
        self.bits[i]
    }

    /// The most significant bit; the sign bit in signed interpretation.
    pub fn msb(&self) -> Region {
        self.bits[self.bits.len() - 1]
    }

    pub fn bits(&self) -> &[Region] {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        self.bits.iter().copied()
    }
}

/// Circuit constructors over a shared region manager.
pub struct BitvectorManager {
    regions: Rc<RegionManager>,
}

impl BitvectorManager {
    pub fn new(regions: Rc<RegionManager>) -> Self {
        Self { regions }
    }

    pub fn regions(&self) -> &Rc<RegionManager> {
        &self.regions
    }

    fn assert_same_width(&self, a: &Bitvector, b: &Bitvector) {
        assert_eq!(
            a.width(),
            b.width(),
            "Bitvector operands must have equal widths"
        );
    }

    /// All-zero vector of the given width.
    pub fn zero(&self, width: usize) -> Bitvector {
        Bitvector::new(vec![self.regions.zero; width])
    }

    /// All-ones vector of the given width (−1 in two's complement).
    pub fn ones(&self, width: usize) -> Bitvector {
        Bitvector::new(vec![self.regions.one; width])
    }

    /// Two's-complement literal encoding of `value` at the given width.
    ///
    /// The value is reduced modulo `2^width`, so negative literals come out
    /// in their two's-complement bit pattern.
    pub fn make_number(&self, value: &BigInt, width: usize) -> Bitvector {
        debug!("make_number(value = {}, width = {})", value, width);
        let modulus = BigInt::from(1) << width;
        let mut v = value % &modulus;
        if v.sign() == Sign::Minus {
            v += &modulus;
        }
        let digits: Vec<u64> = v.magnitude().iter_u64_digits().collect();
        let bits = (0..width)
            .map(|i| {
                let digit = digits.get(i / 64).copied().unwrap_or(0);
                if (digit >> (i % 64)) & 1 == 1 {
                    self.regions.one
                } else {
                    self.regions.zero
                }
            })
            .collect();
        Bitvector::new(bits)
    }

    fn full_adder(&self, a: Region, b: Region, carry: Region) -> (Region, Region) {
        let r = &self.regions;
        let axb = r.apply_xor(a, b);
        let sum = r.apply_xor(axb, carry);
        let carry_out = r.apply_or(r.apply_and(a, b), r.apply_and(carry, axb));
        (sum, carry_out)
    }

    /// Ripple-carry addition; the carry out of the top bit is dropped.
    pub fn make_add(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let mut carry = self.regions.zero;
        let mut bits = Vec::with_capacity(a.width());
        for i in 0..a.width() {
            let (sum, c) = self.full_adder(a.bit(i), b.bit(i), carry);
            bits.push(sum);
            carry = c;
        }
        Bitvector::new(bits)
    }

    /// Subtraction as addition of the one's complement with carry-in true.
    pub fn make_sub(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let mut carry = self.regions.one;
        let mut bits = Vec::with_capacity(a.width());
        for i in 0..a.width() {
            let (sum, c) = self.full_adder(a.bit(i), -b.bit(i), carry);
            bits.push(sum);
            carry = c;
        }
        Bitvector::new(bits)
    }

    /// Two's-complement negation: `0 − a`.
    pub fn make_neg(&self, a: &Bitvector) -> Bitvector {
        self.make_sub(&self.zero(a.width()), a)
    }

    /// Shift-and-add multiplication, truncated to the operand width.
    ///
    /// Builds width² bit-products and width additions. With two symbolic
    /// operands the resulting formula can blow up; that is a documented
    /// scalability limit of the encoding, not a correctness bug.
    pub fn make_mult(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let r = &self.regions;
        let w = a.width();
        let mut acc = self.zero(w);
        for i in 0..w {
            let mut partial = vec![r.zero; w];
            for j in i..w {
                partial[j] = r.apply_and(a.bit(j - i), b.bit(i));
            }
            acc = self.make_add(&acc, &Bitvector::new(partial));
        }
        acc
    }

    /// Single region encoding `a == b`.
    pub fn make_equal(&self, a: &Bitvector, b: &Bitvector) -> Region {
        self.assert_same_width(a, b);
        let r = &self.regions;
        let mut res = r.one;
        for i in 0..a.width() {
            res = r.apply_and(res, r.apply_eq(a.bit(i), b.bit(i)));
        }
        res
    }

    /// Single region encoding `a < b`.
    ///
    /// Bit-serial comparison from the LSB up; in signed mode the sign bit's
    /// contribution is inverted relative to the magnitude bits.
    pub fn make_less(&self, a: &Bitvector, b: &Bitvector, signed: bool) -> Region {
        self.compare(a, b, signed, self.regions.zero)
    }

    /// Single region encoding `a <= b`.
    pub fn make_less_or_equal(&self, a: &Bitvector, b: &Bitvector, signed: bool) -> Region {
        self.compare(a, b, signed, self.regions.one)
    }

    fn compare(&self, a: &Bitvector, b: &Bitvector, signed: bool, on_equal: Region) -> Region {
        self.assert_same_width(a, b);
        let r = &self.regions;
        let w = a.width();
        let mut res = on_equal;
        for i in 0..w {
            let (ai, bi) = (a.bit(i), b.bit(i));
            let strictly = if signed && i == w - 1 {
                // Sign bit: a negative, b non-negative.
                r.apply_and(ai, -bi)
            } else {
                r.apply_and(-ai, bi)
            };
            res = r.apply_or(strictly, r.apply_and(r.apply_eq(ai, bi), res));
        }
        res
    }

    /// Bitwise AND.
    pub fn make_and(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let r = &self.regions;
        Bitvector::new((0..a.width()).map(|i| r.apply_and(a.bit(i), b.bit(i))).collect())
    }

    /// Bitwise OR.
    pub fn make_or(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let r = &self.regions;
        Bitvector::new((0..a.width()).map(|i| r.apply_or(a.bit(i), b.bit(i))).collect())
    }

    /// Bitwise XOR.
    pub fn make_xor(&self, a: &Bitvector, b: &Bitvector) -> Bitvector {
        self.assert_same_width(a, b);
        let r = &self.regions;
        Bitvector::new((0..a.width()).map(|i| r.apply_xor(a.bit(i), b.bit(i))).collect())
    }

    /// Bitwise complement.
    pub fn make_not(&self, a: &Bitvector) -> Bitvector {
        Bitvector::new(a.iter().map(|bit| -bit).collect())
    }

    /// Single region encoding `a != 0`.
    pub fn any_bit_set(&self, a: &Bitvector) -> Region {
        self.regions.apply_or_many(a.iter())
    }

    /// Per-bit if-then-else: `cond ? t : e`.
    pub fn select(&self, cond: Region, t: &Bitvector, e: &Bitvector) -> Bitvector {
        self.assert_same_width(t, e);
        let r = &self.regions;
        Bitvector::new((0..t.width()).map(|i| r.apply_ite(cond, t.bit(i), e.bit(i))).collect())
    }

    /// True when every bit of `a` is the constant-false region, i.e. `a` is
    /// the literal zero rather than a possibly-zero symbolic value.
    pub fn is_literal_zero(&self, a: &Bitvector) -> bool {
        a.iter().all(|bit| self.regions.is_zero(bit))
    }

    /// Number of shift-amount bits consulted for the given width.
    fn shift_stages(width: usize) -> u32 {
        // ⌈log2(width)⌉; widths are never zero.
        usize::BITS - (width - 1).leading_zeros()
    }

    /// Logarithmic-doubling left shift.
    ///
    /// Only the low ⌈log2(width)⌉ bits of `amount` are consulted, matching
    /// the undefined-overshift convention noted in the module docs.
    pub fn make_shift_left(&self, a: &Bitvector, amount: &Bitvector) -> Bitvector {
        self.assert_same_width(a, amount);
        let r = &self.regions;
        let w = a.width();
        let mut cur = a.clone();
        for s in 0..Self::shift_stages(w) {
            let dist = 1usize << s;
            let shifted = Bitvector::new(
                (0..w)
                    .map(|j| if j >= dist { cur.bit(j - dist) } else { r.zero })
                    .collect(),
            );
            cur = self.select(amount.bit(s as usize), &shifted, &cur);
        }
        cur
    }

    /// Logarithmic-doubling right shift; fills with the sign bit when
    /// `signed`, else with zero.
    pub fn make_shift_right(&self, a: &Bitvector, amount: &Bitvector, signed: bool) -> Bitvector {
        self.assert_same_width(a, amount);
        let r = &self.regions;
        let w = a.width();
        let fill = if signed { a.msb() } else { r.zero };
        let mut cur = a.clone();
        for s in 0..Self::shift_stages(w) {
            let dist = 1usize << s;
            let shifted = Bitvector::new(
                (0..w)
                    .map(|j| if j + dist < w { cur.bit(j + dist) } else { fill })
                    .collect(),
            );
            cur = self.select(amount.bit(s as usize), &shifted, &cur);
        }
        cur
    }

    /// Restoring division on unsigned operands.
    ///
    /// Returns `(quotient, remainder)`. For a zero divisor no subtraction
    /// ever fires, so the quotient comes out all-ones and the remainder
    /// equals the dividend, consistent with the pinned literal-zero
    /// sentinels.
    fn udivmod(&self, a: &Bitvector, b: &Bitvector) -> (Bitvector, Bitvector) {
        self.assert_same_width(a, b);
        let r = &self.regions;
        let w = a.width();
        let mut rem = self.zero(w);
        let mut quot = vec![r.zero; w];
        for i in (0..w).rev() {
            // rem = (rem << 1) | a[i]
            let mut shifted = Vec::with_capacity(w);
            shifted.push(a.bit(i));
            shifted.extend((0..w - 1).map(|j| rem.bit(j)));
            let shifted = Bitvector::new(shifted);

            let fits = -self.make_less(&shifted, b, false); // rem >= b
            quot[i] = fits;
            let diff = self.make_sub(&shifted, b);
            rem = self.select(fits, &diff, &shifted);
        }
        (Bitvector::new(quot), rem)
    }

    /// Conditional negation on the magnitude path of signed division.
    fn abs(&self, a: &Bitvector) -> Bitvector {
        self.select(a.msb(), &self.make_neg(a), a)
    }

    /// Division, truncating toward zero.
    ///
    /// Signed mode runs restoring division on the magnitudes and corrects
    /// the quotient sign to the XOR of the operand signs. Division by a
    /// literal zero is pinned to all-ones (−1) for both signednesses.
    pub fn make_div(&self, a: &Bitvector, b: &Bitvector, signed: bool) -> Bitvector {
        self.assert_same_width(a, b);
        debug!("make_div(width = {}, signed = {})", a.width(), signed);
        if self.is_literal_zero(b) {
            return self.ones(a.width());
        }
        if !signed {
            return self.udivmod(a, b).0;
        }
        let (quot, _) = self.udivmod(&self.abs(a), &self.abs(b));
        let quot_sign = self.regions.apply_xor(a.msb(), b.msb());
        self.select(quot_sign, &self.make_neg(&quot), &quot)
    }

    /// Remainder, with the sign of the dividend (truncating semantics).
    ///
    /// Modulo by a literal zero returns the dividend unchanged for both
    /// signednesses.
    pub fn make_mod(&self, a: &Bitvector, b: &Bitvector, signed: bool) -> Bitvector {
        self.assert_same_width(a, b);
        debug!("make_mod(width = {}, signed = {})", a.width(), signed);
        if self.is_literal_zero(b) {
            return a.clone();
        }
        if !signed {
            return self.udivmod(a, b).1;
        }
        let (_, rem) = self.udivmod(&self.abs(a), &self.abs(b));
        self.select(a.msb(), &self.make_neg(&rem), &rem)
    }

    /// Truncate or extend `bits` to `width`; extension replicates the sign
    /// bit when `signed`, else pads with zero. Used uniformly for casts.
    pub fn to_bitsize(&self, width: usize, signed: bool, bits: &Bitvector) -> Bitvector {
        if width == bits.width() {
            return bits.clone();
        }
        if width < bits.width() {
            return Bitvector::new(bits.bits()[..width].to_vec());
        }
        let fill = if signed { bits.msb() } else { self.regions.zero };
        let mut out = bits.bits().to_vec();
        out.resize(width, fill);
        Bitvector::new(out)
    }
}

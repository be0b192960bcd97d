//! Instruction patterns executed by the busy-loop engine.
//!
//! Each activity kind maps to a short fixed-cost operation implementing
//! [`Pattern`]. The arithmetic primitives live in per-architecture `arch`
//! modules selected at build time; the engine only sees the trait.
//!
//! Arithmetic patterns keep their operands in registers (inline asm on
//! x86_64 and aarch64) so they never touch memory. Divisors are passed
//! through [`std::hint::black_box`] once at construction, which keeps the
//! division from being folded into a constant.

use crate::scratch::ScratchRegion;
use std::hint::black_box;

/// Dividend used by the division patterns.
pub const DIVIDEND: u32 = 0x7777_7777;

/// Divisor of [`rattle_common::ActivityKind::DivBySmall`].
pub const SMALL_DIVISOR: u32 = 2;

/// Divisor of [`rattle_common::ActivityKind::DivByLarge`].
pub const LARGE_DIVISOR: u32 = 8209;

/// One repetition of an activity's operation.
pub(crate) trait Pattern {
    /// Execute the operation once.
    fn step(&mut self);
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use core::arch::asm;

    #[inline(always)]
    pub(super) fn add(mut acc: u32) -> u32 {
        // SAFETY: register-only arithmetic.
        unsafe { asm!("add {0:e}, 1", inout(reg) acc, options(nomem, nostack)) };
        acc
    }

    #[inline(always)]
    pub(super) fn mul(mut acc: u32, factor: u32) -> u32 {
        // SAFETY: register-only arithmetic.
        unsafe {
            asm!("imul {0:e}, {1:e}", inout(reg) acc, in(reg) factor, options(nomem, nostack));
        }
        acc
    }

    #[inline(always)]
    pub(super) fn fmul(mut acc: f32, factor: f32) -> f32 {
        // SAFETY: register-only arithmetic.
        unsafe {
            asm!(
                "mulss {0}, {1}",
                inout(xmm_reg) acc,
                in(xmm_reg) factor,
                options(nomem, nostack, preserves_flags)
            );
        }
        acc
    }

    #[inline(always)]
    pub(super) fn div(dividend: u32, divisor: u32) -> u32 {
        let quotient: u32;
        // SAFETY: register-only arithmetic; callers never pass a zero divisor.
        unsafe {
            asm!(
                "div {0:e}",
                in(reg) divisor,
                inout("eax") dividend => quotient,
                inout("edx") 0u32 => _,
                options(nomem, nostack)
            );
        }
        quotient
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use core::arch::asm;

    #[inline(always)]
    pub(super) fn add(mut acc: u32) -> u32 {
        // SAFETY: register-only arithmetic.
        unsafe {
            asm!("add {0:w}, {0:w}, #1", inout(reg) acc, options(nomem, nostack, preserves_flags));
        }
        acc
    }

    #[inline(always)]
    pub(super) fn mul(mut acc: u32, factor: u32) -> u32 {
        // SAFETY: register-only arithmetic.
        unsafe {
            asm!(
                "mul {0:w}, {0:w}, {1:w}",
                inout(reg) acc,
                in(reg) factor,
                options(nomem, nostack, preserves_flags)
            );
        }
        acc
    }

    #[inline(always)]
    pub(super) fn fmul(mut acc: f32, factor: f32) -> f32 {
        // SAFETY: register-only arithmetic.
        unsafe {
            asm!(
                "fmul {0:s}, {0:s}, {1:s}",
                inout(vreg) acc,
                in(vreg) factor,
                options(nomem, nostack, preserves_flags)
            );
        }
        acc
    }

    #[inline(always)]
    pub(super) fn div(dividend: u32, divisor: u32) -> u32 {
        let quotient: u32;
        // SAFETY: register-only arithmetic; udiv by zero yields zero on aarch64.
        unsafe {
            asm!(
                "udiv {0:w}, {1:w}, {2:w}",
                out(reg) quotient,
                in(reg) dividend,
                in(reg) divisor,
                options(nomem, nostack, preserves_flags)
            );
        }
        quotient
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod arch {
    use std::hint::black_box;

    #[inline(always)]
    pub(super) fn add(acc: u32) -> u32 {
        black_box(black_box(acc).wrapping_add(1))
    }

    #[inline(always)]
    pub(super) fn mul(acc: u32, factor: u32) -> u32 {
        black_box(black_box(acc).wrapping_mul(factor))
    }

    #[inline(always)]
    pub(super) fn fmul(acc: f32, factor: f32) -> f32 {
        black_box(black_box(acc) * factor)
    }

    #[inline(always)]
    pub(super) fn div(dividend: u32, divisor: u32) -> u32 {
        black_box(black_box(dividend) / divisor)
    }
}

/// Spin-loop relaxation hint; also the calibration reference pattern.
#[derive(Debug, Default)]
pub(crate) struct Pause;

impl Pattern for Pause {
    #[inline(always)]
    fn step(&mut self) {
        std::hint::spin_loop();
    }
}

#[derive(Debug, Default)]
pub(crate) struct Add {
    acc: u32,
}

impl Pattern for Add {
    #[inline(always)]
    fn step(&mut self) {
        self.acc = arch::add(self.acc);
    }
}

/// Odd factor: the product never collapses to zero.
const MUL_FACTOR: u32 = 0x9E37_79B9;

#[derive(Debug)]
pub(crate) struct Mul {
    acc: u32,
    factor: u32,
}

impl Default for Mul {
    fn default() -> Self {
        Self {
            acc: 1,
            factor: black_box(MUL_FACTOR),
        }
    }
}

impl Pattern for Mul {
    #[inline(always)]
    fn step(&mut self) {
        self.acc = arch::mul(self.acc, self.factor);
    }
}

/// Multiplying by exactly one keeps the value normal forever.
#[derive(Debug)]
pub(crate) struct Fmul {
    acc: f32,
    factor: f32,
}

impl Default for Fmul {
    fn default() -> Self {
        Self {
            acc: 1.5,
            factor: black_box(1.0),
        }
    }
}

impl Pattern for Fmul {
    #[inline(always)]
    fn step(&mut self) {
        self.acc = arch::fmul(self.acc, self.factor);
    }
}

#[derive(Debug, Default)]
pub(crate) struct MulFmul {
    mul: Mul,
    fmul: Fmul,
}

impl Pattern for MulFmul {
    #[inline(always)]
    fn step(&mut self) {
        self.mul.step();
        self.fmul.step();
    }
}

#[derive(Debug)]
pub(crate) struct Div {
    divisor: u32,
}

impl Div {
    pub(crate) fn new(divisor: u32) -> Self {
        Self {
            divisor: black_box(divisor.max(1)),
        }
    }
}

impl Pattern for Div {
    #[inline(always)]
    fn step(&mut self) {
        // The asm blocks are not `pure`, so the unused quotient is still computed.
        let _ = arch::div(DIVIDEND, self.divisor);
    }
}

pub(crate) struct MemoryRead<'a> {
    region: &'a mut ScratchRegion,
}

impl<'a> MemoryRead<'a> {
    pub(crate) fn new(region: &'a mut ScratchRegion) -> Self {
        Self { region }
    }
}

impl Pattern for MemoryRead<'_> {
    #[inline(always)]
    fn step(&mut self) {
        black_box(self.region.read_next());
    }
}

pub(crate) struct MemoryWrite<'a> {
    region: &'a mut ScratchRegion,
    value: u32,
}

impl<'a> MemoryWrite<'a> {
    pub(crate) fn zeros(region: &'a mut ScratchRegion) -> Self {
        Self { region, value: 0 }
    }

    pub(crate) fn ones(region: &'a mut ScratchRegion) -> Self {
        Self {
            region,
            value: u32::MAX,
        }
    }
}

impl Pattern for MemoryWrite<'_> {
    #[inline(always)]
    fn step(&mut self) {
        self.region.write_next(self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rattle_common::config::MIN_SCRATCH_WORDS;

    #[test]
    fn test_arith_primitives() {
        assert_eq!(arch::add(41), 42);
        assert_eq!(arch::add(u32::MAX), 0);
        assert_eq!(arch::mul(7, 6), 42);
        assert_eq!(arch::mul(1, MUL_FACTOR), MUL_FACTOR);
        assert!((arch::fmul(1.5, 2.0) - 3.0).abs() < f32::EPSILON);
        assert_eq!(arch::div(DIVIDEND, SMALL_DIVISOR), DIVIDEND / 2);
        assert_eq!(arch::div(DIVIDEND, LARGE_DIVISOR), DIVIDEND / 8209);
    }

    #[test]
    fn test_patterns_keep_state_sane() {
        let mut add = Add::default();
        for _ in 0..10 {
            add.step();
        }
        assert_eq!(add.acc, 10);

        let mut mul = Mul::default();
        for _ in 0..1000 {
            mul.step();
        }
        assert_ne!(mul.acc, 0);

        let mut fmul = Fmul::default();
        for _ in 0..1000 {
            fmul.step();
        }
        assert!((fmul.acc - 1.5).abs() < f32::EPSILON);

        let mut div = Div::new(LARGE_DIVISOR);
        div.step();
        assert_eq!(div.divisor, LARGE_DIVISOR);
    }

    #[test]
    fn test_zero_divisor_clamped() {
        let mut div = Div::new(0);
        assert_eq!(div.divisor, 1);
        div.step();
    }

    #[test]
    fn test_memory_patterns_touch_region() {
        let mut region = ScratchRegion::new(MIN_SCRATCH_WORDS);
        {
            let mut zeros = MemoryWrite::zeros(&mut region);
            for _ in 0..8 {
                zeros.step();
            }
        }
        assert_eq!(region.write_cursor(), 32);
        assert!(region.words()[..32].iter().all(|&w| w == 0));

        {
            let mut ones = MemoryWrite::ones(&mut region);
            ones.step();
        }
        assert!(region.words()[32..36].iter().all(|&w| w == u32::MAX));

        {
            let mut read = MemoryRead::new(&mut region);
            read.step();
            read.step();
        }
        assert_eq!(region.read_cursor(), 2 * crate::scratch::READ_STRIDE_WORDS);
    }
}

//! Opaque tick counter.
//!
//! Ticks are cheap to read and increase monotonically at a rate that is not
//! known up front; [`crate::calibrate`] establishes it. The source is picked
//! at build time:
//!
//! - **x86_64**: `rdtsc`
//! - **aarch64**: `cntvct_el0` virtual counter
//! - **other**: nanoseconds of a process-local monotonic clock

/// A raw counter reading. Only ordering and offsets are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Tick(u64);

impl Tick {
    /// Tick `delta` counts after `self`.
    #[inline]
    pub(crate) fn saturating_add(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Counts elapsed since `earlier`, zero if `earlier` is later.
    #[inline]
    pub(crate) fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Read the counter.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub(crate) fn read() -> Tick {
    // SAFETY: rdtsc has no memory effects and is available on every x86_64 CPU.
    #[allow(unused_unsafe)]
    let value = unsafe { core::arch::x86_64::_rdtsc() };
    Tick(value)
}

/// Read the counter.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub(crate) fn read() -> Tick {
    let value: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on every supported OS and the
    // read has no side effects.
    unsafe {
        core::arch::asm!("mrs {0}, cntvct_el0", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    Tick(value)
}

/// Read the counter.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
pub(crate) fn read() -> Tick {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    Tick(u64::try_from(origin.elapsed().as_nanos()).unwrap_or(u64::MAX))
}

//! Activity kinds: the named load signatures rattle can produce.

use std::fmt;

/// A named CPU, memory or idle pattern.
///
/// The [`label`](ActivityKind::label) of each kind is what appears in the
/// execution log dump; it is part of the output format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKind {
    /// Idle without an explicit sleep request.
    None,
    /// Blocking sleep.
    Sleep,
    /// Register integer addition.
    Add,
    /// Register integer multiplication.
    Mul,
    /// Register single-precision multiplication.
    Fmul,
    /// Integer multiply followed by a floating-point multiply.
    MulFmul,
    /// Strided loads from the scratch region.
    MemoryRead,
    /// Sequential stores of zero to the scratch region.
    MemoryWriteZero,
    /// Sequential stores of all-ones to the scratch region.
    MemoryWriteOnes,
    /// Integer division by a small divisor (2).
    DivBySmall,
    /// Integer division by a large divisor (8209).
    DivByLarge,
    /// Spin-loop relaxation hint.
    Pause,
}

impl ActivityKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActivityKind; 12] = [
        Self::None,
        Self::Sleep,
        Self::Add,
        Self::Mul,
        Self::Fmul,
        Self::MulFmul,
        Self::MemoryRead,
        Self::MemoryWriteZero,
        Self::MemoryWriteOnes,
        Self::DivBySmall,
        Self::DivByLarge,
        Self::Pause,
    ];

    /// Label written to the log dump.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Sleep => "SLEEP",
            Self::Add => "ADD",
            Self::Mul => "MUL",
            Self::Fmul => "FMUL",
            Self::MulFmul => "MUL_FMUL",
            Self::MemoryRead => "MEMORY",
            Self::MemoryWriteZero => "MEMW0",
            Self::MemoryWriteOnes => "MEMW1",
            Self::DivBySmall => "DIV2",
            Self::DivByLarge => "DIV8209",
            Self::Pause => "PAUSE",
        }
    }

    /// Idle kinds are served by the sleep engine rather than a busy loop.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::None | Self::Sleep)
    }

    /// Memory kinds touch the scratch region.
    #[must_use]
    pub const fn touches_memory(self) -> bool {
        matches!(
            self,
            Self::MemoryRead | Self::MemoryWriteZero | Self::MemoryWriteOnes
        )
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

use crate::{Width, MAX_WIDTH};

/// Kernel operation failures.
///
/// All of these are programmer errors in the calling code; the kernel
/// reports them instead of producing a silently-wrong value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitVecError {
    /// Declared width was zero.
    #[error("bit vector width must be at least 1")]
    ZeroWidth,
    /// Declared width exceeds [`MAX_WIDTH`](crate::MAX_WIDTH).
    #[error("bit vector width {0} exceeds the supported maximum of {MAX_WIDTH}")]
    WidthOverflow(Width),
    /// Binary operation applied to operands of different widths.
    #[error("width mismatch: left operand is {left} bits, right operand is {right} bits")]
    WidthMismatch {
        /// Width of the left operand.
        left: Width,
        /// Width of the right operand.
        right: Width,
    },
    /// Slice or bit index outside the operand.
    #[error("slice [{high}:{low}] is out of range for a {width}-bit value")]
    SliceOutOfRange {
        /// Requested high bit, inclusive.
        high: Width,
        /// Requested low bit, inclusive.
        low: Width,
        /// Width of the sliced operand.
        width: Width,
    },
    /// Zero divisor in the optional divide.
    #[error("division by zero")]
    DivisionByZero,
}

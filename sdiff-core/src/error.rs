use crate::Shape;

/// Main library error type.
///
/// Variants fall into three families: schedule configuration errors (invalid
/// ranges or step counts handed to the schedule math), shape errors (tensor
/// construction, arithmetic, split/concat, model output validation), and
/// scheduler state errors (API misuse). All are precondition violations
/// detected at the offending call; none are recovered internally.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Schedule configuration errors.
    #[error("invalid range in {op}, end {end} must be greater than start {start}")]
    InvalidRange {
        op: &'static str,
        start: f32,
        end: f32,
    },

    #[error("invalid number of steps {steps} in {op}")]
    InvalidStepCount { op: &'static str, steps: usize },

    #[error("invalid step size {step_size} in arange, must be positive")]
    InvalidStepSize { step_size: f32 },

    // Shape errors.
    #[error("shape mismatch, got buffer of size {buffer_size} which is incompatible with shape {shape:?}")]
    ShapeMismatch { buffer_size: usize, shape: Shape },

    #[error("invalid dimension {dim} at index {index} of shape {shape:?}")]
    InvalidDim {
        shape: Shape,
        index: usize,
        dim: i64,
    },

    #[error("element count overflow for shape {shape:?}")]
    ElemCountOverflow { shape: Shape },

    #[error("shape mismatch in {op}, lhs: {lhs:?}, rhs: {rhs:?}")]
    ShapeMismatchBinaryOp {
        lhs: Shape,
        rhs: Shape,
        op: &'static str,
    },

    #[error("shape mismatch in split, {elem_count} elements cannot be partitioned into chunks of {shape:?}")]
    ShapeMismatchSplit { elem_count: usize, shape: Shape },

    #[error("shape mismatch in concat, shape for arg 1: {lhs:?}, shape for arg 2: {rhs:?}")]
    ShapeMismatchCat { lhs: Shape, rhs: Shape },

    // Scheduler state errors.
    #[error("{op} called before set_timesteps configured the scheduler")]
    SchedulerNotConfigured { op: &'static str },

    #[error("timestep {timestep} is not in the active schedule")]
    UnknownTimestep { timestep: i32 },

    /// Failure from the external denoising model, surfaced unchanged.
    #[error(transparent)]
    Denoiser(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Arbitrary errors.
    #[error("{0}")]
    Msg(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::Error::Msg(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($fmt, $($arg)*)))
    };
}

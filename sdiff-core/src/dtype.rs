//! Types for the elements of tensors.

/// The different element types supported by [`crate::Tensor`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    I32,
    I64,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }
}

/// Trait for the primitive types a tensor can contain.
pub trait WithDType:
    Sized
    + Copy
    + Default
    + PartialEq
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + 'static
{
    const DTYPE: DType;
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
}

impl WithDType for i32 {
    const DTYPE: DType = DType::I32;
}

impl WithDType for i64 {
    const DTYPE: DType = DType::I64;
}

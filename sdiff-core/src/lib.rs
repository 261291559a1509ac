//! Core data types for the sdiff diffusion sampler.
//!
//! This crate provides the owned, row-major [`Tensor`] container used to move
//! numeric data between the sampling stages, together with the schedule math
//! helpers ([`utils`]) used to build noise schedules.
//!
//! ```rust
//! use sdiff_core::{Result, Tensor};
//! # fn main() -> Result<()> {
//! let a = Tensor::new(vec![1f32, 2., 3., 4., 5., 6.], (2, 3))?;
//! let mut b = a.copy();
//! b.scale(2.0);
//! b.add(&a)?;
//! assert_eq!(b.get(&[1, 2]), 18.0);
//! # Ok(())}
//! ```

mod dtype;
pub mod error;
pub mod shape;
mod tensor;
pub mod utils;

pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use shape::Shape;
pub use tensor::Tensor;

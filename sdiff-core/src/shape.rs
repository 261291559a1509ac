use crate::{Error, Result};

/// The shape of a tensor.
///
/// Dimensions are signed 64-bit values to match the conventions of the
/// external model boundary, but the total element count must fit in an `i32`.
#[derive(Clone, PartialEq, Eq)]
pub struct Shape(Vec<i64>);

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &self.dims())
    }
}

impl<const C: usize> From<&[i64; C]> for Shape {
    fn from(dims: &[i64; C]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<&[i64]> for Shape {
    fn from(dims: &[i64]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        Self(shape.0.to_vec())
    }
}

impl From<i64> for Shape {
    fn from(d1: i64) -> Self {
        Self(vec![d1])
    }
}

impl From<(i64, i64)> for Shape {
    fn from(d12: (i64, i64)) -> Self {
        Self(vec![d12.0, d12.1])
    }
}

impl From<(i64, i64, i64)> for Shape {
    fn from(d123: (i64, i64, i64)) -> Self {
        Self(vec![d123.0, d123.1, d123.2])
    }
}

impl From<(i64, i64, i64, i64)> for Shape {
    fn from(d1234: (i64, i64, i64, i64)) -> Self {
        Self(vec![d1234.0, d1234.1, d1234.2, d1234.3])
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Self(dims)
    }
}

impl Shape {
    pub fn from_dims(dims: &[i64]) -> Self {
        Self(dims.to_vec())
    }

    /// The rank is the number of dimensions, 0 is the rank of a scalar.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn into_dims(self) -> Vec<i64> {
        self.0
    }

    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    /// The total number of elements for this shape.
    ///
    /// Fails if any dimension past the leading one is non-positive, if the
    /// leading dimension is negative, or if the product overflows an `i32`.
    pub fn elem_count(&self) -> Result<usize> {
        let mut total = 1i64;
        for (index, &dim) in self.0.iter().enumerate() {
            if dim < 0 || (index > 0 && dim == 0) {
                return Err(Error::InvalidDim {
                    shape: self.clone(),
                    index,
                    dim,
                });
            }
            total = match total.checked_mul(dim) {
                Some(total) if total <= i32::MAX as i64 => total,
                _ => return Err(Error::ElemCountOverflow { shape: self.clone() }),
            };
        }
        Ok(total as usize)
    }

    /// The strides given in number of elements for a contiguous n-dimensional
    /// array using this shape.
    pub fn stride_contiguous(&self) -> Vec<i64> {
        let mut stride: Vec<_> = self
            .0
            .iter()
            .rev()
            .scan(1, |prod, u| {
                let prod_pre_mult = *prod;
                *prod *= u;
                Some(prod_pre_mult)
            })
            .collect();
        stride.reverse();
        stride
    }
}

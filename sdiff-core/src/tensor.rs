use crate::{DType, Error, Result, Shape, WithDType};

/// An owned, contiguous, row-major n-dimensional array.
///
/// The buffer length always equals the element count of the shape; this is
/// validated at construction. Tensors are exclusively owned by whichever
/// component holds them, so the in-place operations ([`Tensor::scale`],
/// [`Tensor::add`]) take `&mut self` and [`Tensor::copy`] produces a fully
/// independent tensor.
#[derive(Debug, Clone)]
pub struct Tensor<T: WithDType> {
    data: Vec<T>,
    shape: Shape,
    strides: Vec<i64>,
}

impl<T: WithDType> Tensor<T> {
    /// Creates a tensor from the supplied buffer and shape.
    pub fn new<S: Into<Shape>>(data: Vec<T>, shape: S) -> Result<Self> {
        let shape = shape.into();
        let elem_count = shape.elem_count()?;
        if data.len() != elem_count {
            return Err(Error::ShapeMismatch {
                buffer_size: data.len(),
                shape,
            });
        }
        let strides = shape.stride_contiguous();
        Ok(Self {
            data,
            shape,
            strides,
        })
    }

    /// Creates a zero-filled tensor of the supplied shape.
    pub fn zeros<S: Into<Shape>>(shape: S) -> Result<Self> {
        let shape = shape.into();
        let elem_count = shape.elem_count()?;
        Self::new(vec![T::default(); elem_count], shape)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[i64] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }

    fn linear_index(&self, indices: &[i64]) -> usize {
        indices
            .iter()
            .zip(self.strides.iter())
            .map(|(&idx, &stride)| idx * stride)
            .sum::<i64>() as usize
    }

    /// Gets an element from this tensor.
    ///
    /// The caller guarantees the indices match the rank and lie within the
    /// shape; only the linearized index is bounds checked by the buffer.
    pub fn get(&self, indices: &[i64]) -> T {
        self.data[self.linear_index(indices)]
    }

    /// Sets an element of this tensor.
    pub fn set(&mut self, indices: &[i64], value: T) {
        let idx = self.linear_index(indices);
        self.data[idx] = value;
    }

    /// Deep copy of this tensor, leaving the original untouched.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Scales each element by the supplied scalar.
    pub fn scale(&mut self, scalar: T) {
        for v in self.data.iter_mut() {
            *v = *v * scalar;
        }
    }

    /// Adds the supplied tensor elementwise to this one.
    pub fn add(&mut self, rhs: &Self) -> Result<()> {
        if self.shape != rhs.shape {
            return Err(Error::ShapeMismatchBinaryOp {
                lhs: self.shape.clone(),
                rhs: rhs.shape.clone(),
                op: "add",
            });
        }
        for (v, &r) in self.data.iter_mut().zip(rhs.data.iter()) {
            *v = *v + r;
        }
        Ok(())
    }

    /// Splits this tensor into consecutive chunks of the supplied shape.
    ///
    /// The chunks partition the flat buffer in linear row-major order along
    /// the leading dimension, so the element count must be an exact multiple
    /// of the chunk element count.
    pub fn split<S: Into<Shape>>(&self, new_shape: S) -> Result<Vec<Self>> {
        let new_shape = new_shape.into();
        let chunk_elems = new_shape.elem_count()?;
        if chunk_elems == 0 || self.data.len() % chunk_elems != 0 {
            return Err(Error::ShapeMismatchSplit {
                elem_count: self.data.len(),
                shape: new_shape,
            });
        }
        self.data
            .chunks_exact(chunk_elems)
            .map(|chunk| Self::new(chunk.to_vec(), &new_shape))
            .collect()
    }

    /// Concatenates two tensors along their last dimension.
    ///
    /// All other dimensions must be equal, e.g. a = [5, 10, 15] and
    /// b = [5, 10, 3] give concat(a, b) = [5, 10, 18]. As the last dimension
    /// varies fastest this interleaves row-length chunks from each input
    /// rather than appending the buffers.
    pub fn concat(first: &Self, second: &Self) -> Result<Self> {
        let lhs_dims = first.dims();
        let rhs_dims = second.dims();
        let mismatch = || Error::ShapeMismatchCat {
            lhs: first.shape.clone(),
            rhs: second.shape.clone(),
        };
        if lhs_dims.len() != rhs_dims.len() || lhs_dims.is_empty() {
            return Err(mismatch());
        }
        let mut num_rows = 1usize;
        for (l, r) in lhs_dims[..lhs_dims.len() - 1]
            .iter()
            .zip(rhs_dims[..rhs_dims.len() - 1].iter())
        {
            if l != r {
                return Err(mismatch());
            }
            num_rows *= *l as usize;
        }

        let first_row = lhs_dims[lhs_dims.len() - 1] as usize;
        let second_row = rhs_dims[rhs_dims.len() - 1] as usize;
        let mut new_dims = lhs_dims.to_vec();
        new_dims[lhs_dims.len() - 1] += rhs_dims[rhs_dims.len() - 1];

        let mut data = Vec::with_capacity(num_rows * (first_row + second_row));
        for i in 0..num_rows {
            data.extend_from_slice(&first.data[i * first_row..(i + 1) * first_row]);
            data.extend_from_slice(&second.data[i * second_row..(i + 1) * second_row]);
        }
        Self::new(data, new_dims)
    }
}

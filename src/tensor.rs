//! Tensor type with shape metadata and gradient tracking
//!
//! Storage is a flat `Array1<f32>` with an explicit shape, so the same type
//! carries 1-d parameter vectors and (n, c, h, w) score maps. Gradients live
//! in a shared cell so a loss can write into the gradient of the tensor it
//! was computed from; `BackwardOp` is the seam through which an opaque model
//! chains score gradients back into its parameters.

use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Trait for backward pass operations
pub trait BackwardOp {
    /// Perform backward pass
    fn backward(&self);
}

/// Tensor with automatic differentiation support
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    shape: Vec<usize>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a new tensor with data and an explicit shape
    ///
    /// Panics if the shape does not describe `data.len()` elements.
    pub fn new(data: Array1<f32>, shape: Vec<usize>, requires_grad: bool) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} does not describe {} elements",
            shape,
            data.len()
        );
        Self {
            data,
            shape,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a 1-d tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        let shape = vec![data.len()];
        Self::new(Array1::from(data), shape, requires_grad)
    }

    /// Create a tensor of the given shape filled with zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        let len: usize = shape.iter().product();
        Self::new(Array1::zeros(len), shape.to_vec(), requires_grad)
    }

    /// Get reference to the flat data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Get mutable reference to the flat data
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Logical shape of the tensor
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Set gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut grad_ref = self.grad.borrow_mut();
        if let Some(existing) = grad_ref.as_mut() {
            *existing = &*existing + &grad;
        } else {
            *grad_ref = Some(grad);
        }
    }

    /// Zero out gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Get reference to gradient cell (for backward operations)
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        self.grad.clone()
    }

    /// Set backward operation
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Get backward operation
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .field("grad", &self.grad.borrow())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}

/// Perform backward pass on a tensor
///
/// With no explicit output gradient the tensor is seeded with ones, the
/// convention for a scalar loss.
pub fn backward(tensor: &mut Tensor, grad_output: Option<Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}

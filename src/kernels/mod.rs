//! Matrix-free tensor-product kernels.

pub mod basis;
pub mod limiter;
pub mod scratch;
pub mod tensor;

pub use basis::{DofToQuad, gauss_legendre};
pub use limiter::{LimiterCoefficient, LimiterData, add_mult_limiter_3d};
pub use scratch::ScratchArena;
pub use tensor::{ElementBatch, KernelPath, apply_transpose, eval_gradients, eval_values};

//! Mass matrix inversion for the high-order update.

use nalgebra::{DMatrix, DVector, LU, Dyn};

use crate::data::CsrMatrix;
use crate::fct::layout::DgLayout;
use crate::mesh_error::{MeshDdmError, check_len};

/// Solves `M y = r`.
pub trait MassSolver: Send + Sync {
    fn solve(&self, r: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError>;
}

/// Exact inverse of a block-diagonal (DG) mass matrix, one LU factorization
/// per element.
pub struct BlockDiagonalMass {
    nd: usize,
    blocks: Vec<LU<f64, Dyn, Dyn>>,
}

impl BlockDiagonalMass {
    pub fn new(layout: &DgLayout, mass: &CsrMatrix) -> Result<Self, MeshDdmError> {
        check_len("mass matrix rows", layout.num_dofs(), mass.nrows())?;
        let nd = layout.nd();
        let blocks = (0..layout.num_elements())
            .map(|k| {
                let base = k * nd;
                let block = DMatrix::from_fn(nd, nd, |i, j| {
                    mass.get(base + i, base + j).unwrap_or(0.0)
                });
                let lu = block.lu();
                if lu.is_invertible() {
                    Ok(lu)
                } else {
                    Err(MeshDdmError::SingularMassBlock(k))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("factored {} mass blocks of size {nd}", blocks.len());
        Ok(Self { nd, blocks })
    }
}

impl MassSolver for BlockDiagonalMass {
    fn solve(&self, r: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        let n = self.nd * self.blocks.len();
        check_len("mass solve rhs", n, r.len())?;
        check_len("mass solve result", n, y.len())?;
        for (k, (lu, out)) in self.blocks.iter().zip(y.chunks_mut(self.nd)).enumerate() {
            let rhs = DVector::from_column_slice(&r[k * self.nd..(k + 1) * self.nd]);
            let sol = lu.solve(&rhs).ok_or(MeshDdmError::SingularMassBlock(k))?;
            out.copy_from_slice(sol.as_slice());
        }
        Ok(())
    }
}

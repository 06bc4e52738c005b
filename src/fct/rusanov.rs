//! Rusanov-type artificial diffusion.

use nalgebra::DMatrix;

use crate::fct::layout::DgLayout;
use crate::mesh_error::{MeshDdmError, check_len};

/// Element and face diffusion coefficients.
///
/// `bdr_diff` has one row per element and one column per face.
#[derive(Clone, Debug, PartialEq)]
pub struct RusanovData {
    pub el_diff: Vec<f64>,
    pub bdr_diff: DMatrix<f64>,
}

impl RusanovData {
    /// Schwarz estimate for linear elements on a 1D mesh with a constant
    /// velocity per element.
    pub fn schwarz_segment(velocity: &[f64]) -> Self {
        let ne = velocity.len();
        let el_diff = velocity.iter().map(|v| v.abs() / 3f64.sqrt()).collect();
        let bdr_diff = DMatrix::from_fn(ne, 2, |k, face| {
            let outward = if face == 0 { -velocity[k] } else { velocity[k] };
            outward.max(0.0)
        });
        Self { el_diff, bdr_diff }
    }

    pub fn check(&self, layout: &DgLayout) -> Result<(), MeshDdmError> {
        let ne = layout.num_elements();
        check_len("el_diff", ne, self.el_diff.len())?;
        check_len("bdr_diff rows", ne, self.bdr_diff.nrows())?;
        check_len(
            "bdr_diff cols",
            layout.boundary_dofs().num_bdrs(),
            self.bdr_diff.ncols(),
        )
    }

    /// Add the diffusion of element `k` to the residual `z`, then write
    /// `y = z / lumped` on the element's dofs.
    pub(crate) fn apply_element(
        &self,
        layout: &DgLayout,
        k: usize,
        x: &[f64],
        z: &mut [f64],
        lumped: &[f64],
        y: &mut [f64],
    ) {
        let nd = layout.nd();
        let bd = layout.boundary_dofs();
        let nf = bd.num_dofs() as f64;
        for face in 0..bd.num_bdrs() {
            let dofs = (0..bd.num_dofs()).map(|j| k * nd + bd.dof(j, face));
            let u_sum: f64 = dofs.clone().map(|d| x[d]).sum();
            let c = self.bdr_diff[(k, face)];
            for d in dofs {
                z[d] += c * (u_sum - nf * x[d]);
            }
        }
        let range = k * nd..(k + 1) * nd;
        let u_sum: f64 = x[range.clone()].iter().sum();
        for d in range {
            y[d] = (z[d] + self.el_diff[k] * (u_sum - nd as f64 * x[d])) / lumped[d];
        }
    }
}

//! Residual distribution.
//!
//! The element fluctuation `z = F x` is split into its positive and negative
//! parts and handed to the element dofs with weights that never push a
//! value past the element's own extrema. With sub-cells the weights blend
//! in the fluctuations of the uniformly refined element, and the limited
//! variants keep a share `alpha` of each fluctuation at its own dof.

use nalgebra::DMatrix;

use crate::config::FctOptions;
use crate::fct::bounds::SolutionBounds;
use crate::fct::flux::{FaceFluxData, lump_flux_terms};
use crate::fct::layout::DgLayout;
use crate::mesh_error::{MeshDdmError, check_len};

/// Sub-cell fluctuation weights: row `k * num_subcells + m` holds the weights
/// of the vertices of sub-cell `m` of element `k`.
#[derive(Clone, Debug, PartialEq)]
pub struct SubcellData {
    pub fluct_sub: DMatrix<f64>,
}

impl SubcellData {
    pub fn check(&self, layout: &DgLayout) -> Result<(), MeshDdmError> {
        check_len(
            "fluct_sub rows",
            layout.num_elements() * layout.num_subcells(),
            self.fluct_sub.nrows(),
        )?;
        check_len("fluct_sub cols", layout.subcell_dofs(), self.fluct_sub.ncols())
    }
}

/// How much of each fluctuation stays at its own dof.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Retention {
    /// Everything is distributed.
    None,
    /// Bounds-driven share, result divided by the lumped mass.
    Limited,
    /// Bounds-driven share, result left unscaled for the mass correction.
    LimitedMass,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DistributionParams {
    pub gamma: f64,
    pub beta: f64,
    pub eps: f64,
    pub retention: Retention,
}

impl DistributionParams {
    pub fn new(opts: &FctOptions, retention: Retention) -> Self {
        Self {
            gamma: opts.gamma,
            beta: opts.beta,
            eps: opts.eps,
            retention,
        }
    }
}

/// Inputs of one distribution sweep.
pub(crate) struct Distribution<'a> {
    pub layout: &'a DgLayout,
    pub params: DistributionParams,
    pub subcell: Option<&'a SubcellData>,
    pub face: Option<&'a FaceFluxData>,
    pub bounds: &'a SolutionBounds,
    pub lumped: &'a [f64],
}

impl Distribution<'_> {
    /// Distribute the fluctuations `z` of every element into `y`, which
    /// holds the non-distributed part of the residual on entry.
    pub fn apply(&self, x: &[f64], z: &[f64], y: &mut [f64]) {
        let layout = self.layout;
        let nd = layout.nd();
        let p = self.params;
        let eps = p.eps;
        let bd = layout.boundary_dofs();
        let n_sub = layout.num_subcells();
        let sub_nd = layout.subcell_dofs();

        let mut alpha = vec![0.0; nd];
        let mut nodal_p = vec![0.0; nd];
        let mut nodal_n = vec![0.0; nd];
        let mut sub_max = vec![0.0; n_sub];
        let mut sub_min = vec![0.0; n_sub];
        let mut sub_wp = vec![0.0; n_sub];
        let mut sub_wn = vec![0.0; n_sub];
        let mut rho_sub_p = vec![0.0; n_sub];
        let mut rho_sub_n = vec![0.0; n_sub];

        for k in 0..layout.num_elements() {
            let base = k * nd;
            let xe = &x[base..base + nd];
            let ze = &z[base..base + nd];
            let x_max = xe.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let x_min = xe.iter().copied().fold(f64::INFINITY, f64::min);
            let x_sum: f64 = xe.iter().sum();
            let rho_p: f64 = ze.iter().map(|v| v.max(0.0)).sum();
            let rho_n: f64 = ze.iter().map(|v| v.min(0.0)).sum();

            alpha.fill(0.0);
            if p.retention != Retention::None {
                let (lo, hi) = (self.bounds.x_min(), self.bounds.x_max());
                for j in 0..nd {
                    let d = base + j;
                    let room = (hi[d] - x[d]).min(x[d] - lo[d]);
                    let spread = (x_max - x[d]).max(x[d] - x_min);
                    alpha[j] = (p.beta * room / (spread + eps)).min(1.0);
                }
            }

            if layout.dim() > 1 {
                if let Some(face) = self.face {
                    lump_flux_terms(layout, &bd, face, k, x, y, &alpha, eps);
                }
            }

            let sum_wp = nd as f64 * x_max - x_sum + eps;
            let sum_wn = nd as f64 * x_min - x_sum - eps;

            let mut sub_sums = None;
            if let Some(sub) = self.subcell {
                nodal_p.fill(0.0);
                nodal_n.fill(0.0);
                for m in 0..n_sub {
                    let (mut lo, mut hi, mut sum, mut fluct) =
                        (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0.0);
                    for i in 0..sub_nd {
                        let d = base + layout.subcell_to_cell_dof(m, i);
                        fluct += sub.fluct_sub[(k * n_sub + m, i)] * x[d];
                        hi = hi.max(x[d]);
                        lo = lo.min(x[d]);
                        sum += x[d];
                    }
                    sub_max[m] = hi;
                    sub_min[m] = lo;
                    sub_wp[m] = sub_nd as f64 * hi - sum + eps;
                    sub_wn[m] = sub_nd as f64 * lo - sum - eps;
                    rho_sub_p[m] = fluct.max(0.0);
                    rho_sub_n[m] = fluct.min(0.0);
                }
                for m in 0..n_sub {
                    for i in 0..sub_nd {
                        let loc = layout.subcell_to_cell_dof(m, i);
                        let xd = x[base + loc];
                        nodal_p[loc] += rho_sub_p[m] * ((sub_max[m] - xd) / sub_wp[m]);
                        nodal_n[loc] += rho_sub_n[m] * ((sub_min[m] - xd) / sub_wn[m]);
                    }
                }
                sub_sums = Some((
                    rho_sub_p.iter().sum::<f64>(),
                    rho_sub_n.iter().sum::<f64>(),
                ));
            }

            for i in 0..nd {
                let d = base + i;
                let mut weight_p = (x_max - x[d]) / sum_wp;
                let mut weight_n = (x_min - x[d]) / sum_wn;
                if let Some((sum_rho_p, sum_rho_n)) = sub_sums {
                    let aux_p = p.gamma / (rho_p + eps);
                    weight_p *= 1.0 - (aux_p * sum_rho_p).min(1.0);
                    weight_p += aux_p.min(1.0 / (sum_rho_p + eps)) * nodal_p[i];

                    let aux_n = p.gamma / (rho_n - eps);
                    weight_n *= 1.0 - (aux_n * sum_rho_n).min(1.0);
                    weight_n += aux_n.max(1.0 / (sum_rho_n - eps)) * nodal_n[i];
                }

                for (j, &zj) in ze.iter().enumerate() {
                    if zj > eps {
                        y[d] += (1.0 - alpha[j]) * weight_p * zj;
                    } else if zj < -eps {
                        y[d] += (1.0 - alpha[j]) * weight_n * zj;
                    }
                }
                y[d] = match p.retention {
                    Retention::LimitedMass => y[d] + alpha[i] * z[d],
                    _ => (y[d] + alpha[i] * z[d]) / self.lumped[d],
                };
            }
        }
    }
}

//! Face flux lumping shared by the low-order schemes in more than one dimension.

use nalgebra::DMatrix;

use crate::fct::layout::{BoundaryDofs, DgLayout};
use crate::mesh_error::{MeshDdmError, check_len};

/// Precomputed face integrals of a DG space.
///
/// Rows are global dofs. `bdr_int` and `bdr_int_neighbor` have one column
/// block of `nd` per face; `bdr_int_lumped` has one column per face.
/// `neighbor_dof[(k * face_dofs + i) * num_bdrs + face]` is the global dof
/// across `face` that coincides with face dof `i` of element `k`, or `None`
/// on the domain boundary.
#[derive(Clone, Debug)]
pub struct FaceFluxData {
    pub bdr_int_lumped: DMatrix<f64>,
    pub bdr_int: DMatrix<f64>,
    pub bdr_int_neighbor: DMatrix<f64>,
    pub neighbor_dof: Vec<Option<usize>>,
}

impl FaceFluxData {
    pub fn check(&self, layout: &DgLayout) -> Result<(), MeshDdmError> {
        let bd = layout.boundary_dofs();
        let n = layout.num_dofs();
        let wide = bd.num_bdrs() * layout.nd();
        check_len("bdr_int_lumped rows", n, self.bdr_int_lumped.nrows())?;
        check_len("bdr_int_lumped cols", bd.num_bdrs(), self.bdr_int_lumped.ncols())?;
        check_len("bdr_int rows", n, self.bdr_int.nrows())?;
        check_len("bdr_int cols", wide, self.bdr_int.ncols())?;
        check_len("bdr_int_neighbor rows", n, self.bdr_int_neighbor.nrows())?;
        check_len("bdr_int_neighbor cols", wide, self.bdr_int_neighbor.ncols())?;
        check_len(
            "neighbor_dof",
            layout.num_elements() * bd.num_dofs() * bd.num_bdrs(),
            self.neighbor_dof.len(),
        )
    }

    fn neighbor(&self, bd: &BoundaryDofs, k: usize, i: usize, face: usize) -> Option<usize> {
        self.neighbor_dof[(k * bd.num_dofs() + i) * bd.num_bdrs() + face]
    }
}

/// Add the face fluxes of element `k` to `y`, the part `1 - alpha` of each
/// flux redistributed over the face dofs by their lumped upwind weights.
pub(crate) fn lump_flux_terms(
    layout: &DgLayout,
    bd: &BoundaryDofs,
    face: &FaceFluxData,
    k: usize,
    x: &[f64],
    y: &mut [f64],
    alpha: &[f64],
    eps: f64,
) {
    let nd = layout.nd();
    let nf = bd.num_dofs();
    let mut lumped_p = vec![0.0; nf];
    let mut lumped_n = vec![0.0; nf];
    let mut total = vec![0.0; nf];
    let x_nbr = |m: usize, j: usize| face.neighbor(bd, k, m, j).map_or(0.0, |d| x[d]);

    for j in 0..bd.num_bdrs() {
        let (mut sum_p, mut sum_n) = (0.0, 0.0);
        for i in 0..nf {
            let di = k * nd + bd.dof(i, j);
            let jump = x_nbr(i, j) - x[di];
            let w = face.bdr_int_lumped[(di, j)];
            lumped_p[i] = jump.max(0.0) * w;
            lumped_n[i] = jump.min(0.0) * w;
            sum_p += lumped_p[i];
            sum_n += lumped_n[i];

            total[i] = (0..nf)
                .map(|m| {
                    let col = j * nd + bd.dof(m, j);
                    face.bdr_int[(di, col)] * x[k * nd + bd.dof(m, j)]
                        - face.bdr_int_neighbor[(di, col)] * x_nbr(m, j)
                })
                .sum();
            y[di] += alpha[bd.dof(i, j)] * total[i];
        }

        for i in 0..nf {
            let weight_p = lumped_p[i] / (sum_p + eps);
            let weight_n = lumped_n[i] / (sum_n - eps);
            let di = k * nd + bd.dof(i, j);
            for m in 0..nf {
                let keep = 1.0 - alpha[bd.dof(m, j)];
                if total[m] > eps {
                    y[di] += keep * weight_p * total[m];
                } else if total[m] < -eps {
                    y[di] += keep * weight_n * total[m];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two P1 quads side by side, only the shared face (right of 0, left of 1)
    /// carries flux.
    fn pair() -> (DgLayout, FaceFluxData) {
        let l = DgLayout::new(2, 1, 2).unwrap();
        let bd = l.boundary_dofs();
        let n = l.num_dofs();
        let wide = bd.num_bdrs() * l.nd();
        let mut lumped = DMatrix::zeros(n, bd.num_bdrs());
        let mut own = DMatrix::zeros(n, wide);
        let nbr = DMatrix::zeros(n, wide);
        let mut neighbor_dof = vec![None; 2 * bd.num_dofs() * bd.num_bdrs()];
        for i in 0..bd.num_dofs() {
            let d0 = bd.dof(i, 1);
            let d1 = bd.dof(i, 3);
            neighbor_dof[i * bd.num_bdrs() + 1] = Some(l.dof(1, d1));
            neighbor_dof[(bd.num_dofs() + i) * bd.num_bdrs() + 3] = Some(l.dof(0, d0));
            lumped[(l.dof(0, d0), 1)] = 0.5;
            lumped[(l.dof(1, d1), 3)] = 0.5;
            // outflow through the right face of element 0
            own[(l.dof(0, d0), l.nd() + d0)] = -0.5;
        }
        (
            l,
            FaceFluxData {
                bdr_int_lumped: lumped,
                bdr_int: own,
                bdr_int_neighbor: nbr,
                neighbor_dof,
            },
        )
    }

    #[test]
    fn shapes_are_checked() {
        let (l, f) = pair();
        assert!(f.check(&l).is_ok());
        let other = DgLayout::new(2, 1, 3).unwrap();
        assert!(f.check(&other).is_err());
    }

    #[test]
    fn full_alpha_adds_raw_flux() {
        let (l, f) = pair();
        let bd = l.boundary_dofs();
        let x = vec![1.0; 8];
        let mut y = vec![0.0; 8];
        lump_flux_terms(&l, &bd, &f, 0, &x, &mut y, &[1.0; 4], 1e-15);
        assert_eq!(y[1], -0.5);
        assert_eq!(y[3], -0.5);
        assert_eq!(y[0], 0.0);
    }

    #[test]
    fn zero_alpha_conserves_face_total() {
        let (l, f) = pair();
        let bd = l.boundary_dofs();
        let x = vec![2.0, 0.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        let mut y = vec![0.0; 8];
        lump_flux_terms(&l, &bd, &f, 0, &x, &mut y, &[0.0; 4], 1e-15);
        let raw = -0.5 * (x[1] + x[3]);
        let got: f64 = y.iter().sum();
        // negative flux only lands on dofs with a downward jump
        assert!((got - raw).abs() < 1e-12, "{got} vs {raw}");
        assert_eq!(y[1], 0.0);
    }
}

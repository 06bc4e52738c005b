//! Nodal solution bounds for the limiters.

use crate::config::Stencil;
use crate::data::CsrMatrix;
use crate::fct::layout::DgLayout;
use crate::mesh_error::{MeshDdmError, check_len};
use itertools::Itertools;

const COLOCATED_TOL: f64 = 1e-10;

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

/// Admissible `[x_min, x_max]` of every dof, refreshed from the current solution.
#[derive(Clone, Debug)]
pub struct SolutionBounds {
    stencil: Stencil,
    map: Option<Vec<Vec<usize>>>,
    x_min: Vec<f64>,
    x_max: Vec<f64>,
}

impl SolutionBounds {
    /// Prepare bounds for `stencil`. The local stencils need the physical
    /// coordinates of every dof and the sparsity of the convection matrix `k`.
    pub fn new(
        stencil: Stencil,
        layout: &DgLayout,
        k: &CsrMatrix,
        dof_coords: &[[f64; 3]],
    ) -> Result<Self, MeshDdmError> {
        let n = layout.num_dofs();
        check_len("convection matrix rows", n, k.nrows())?;
        let map = match stencil {
            Stencil::Full => None,
            Stencil::Local | Stencil::LocalAndDiag => {
                check_len("dof coordinates", n, dof_coords.len())?;
                let level = match stencil {
                    Stencil::Local => 1.0,
                    _ => 1.8,
                } / layout.order() as f64
                    + COLOCATED_TOL;
                Some(local_stencils(layout, k, dof_coords, level))
            }
        };
        Ok(Self {
            stencil,
            map,
            x_min: vec![0.0; n],
            x_max: vec![0.0; n],
        })
    }

    pub fn stencil(&self) -> Stencil {
        self.stencil
    }

    /// Dofs whose values bound dof `i` (local stencils only).
    pub fn neighborhood(&self, i: usize) -> Option<&[usize]> {
        self.map.as_ref().and_then(|m| m.get(i)).map(Vec::as_slice)
    }

    pub fn x_min(&self) -> &[f64] {
        &self.x_min
    }

    pub fn x_max(&self) -> &[f64] {
        &self.x_max
    }

    /// Recompute the bounds from `x`.
    pub fn compute(&mut self, k: &CsrMatrix, x: &[f64]) -> Result<(), MeshDdmError> {
        check_len("solution", self.x_min.len(), x.len())?;
        let fold = |it: &mut dyn Iterator<Item = usize>| {
            it.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), j| {
                (lo.min(x[j]), hi.max(x[j]))
            })
        };
        match self.stencil {
            Stencil::Full => {
                check_len("convection matrix rows", x.len(), k.nrows())?;
                for i in 0..x.len() {
                    let (lo, hi) = fold(&mut k.row_cols(i).iter().copied());
                    self.x_min[i] = lo;
                    self.x_max[i] = hi;
                }
            }
            Stencil::Local | Stencil::LocalAndDiag => {
                let map = self.map.as_ref().ok_or(MeshDdmError::MissingBoundsStencil)?;
                for (i, nbrs) in map.iter().enumerate() {
                    let (lo, hi) = fold(&mut nbrs.iter().copied());
                    self.x_min[i] = lo;
                    self.x_max[i] = hi;
                }
            }
        }
        Ok(())
    }
}

/// Dofs within `level` of each dof on the reference element, extended across
/// faces through dofs at the same physical location.
fn local_stencils(
    layout: &DgLayout,
    k: &CsrMatrix,
    coords: &[[f64; 3]],
    level: f64,
) -> Vec<Vec<usize>> {
    let nd = layout.nd();
    let refs: Vec<[f64; 3]> = (0..nd).map(|j| layout.reference_node(j)).collect();
    let mut map = vec![Vec::new(); layout.num_dofs()];
    for e in 0..layout.num_elements() {
        for i in 0..nd {
            let di = layout.dof(e, i);
            let entry = &mut map[di];
            for j in 0..nd {
                if distance(&refs[i], &refs[j]) <= level {
                    entry.push(layout.dof(e, j));
                }
            }

            // dofs at the same spot, and the ones co-located with those (edges, corners)
            let same_spot: Vec<usize> = k
                .row_cols(di)
                .iter()
                .copied()
                .filter(|&c| c != di && distance(&coords[di], &coords[c]) <= COLOCATED_TOL)
                .flat_map(|c| {
                    std::iter::once(c).chain(k.row_cols(c).iter().copied().filter(move |&cc| {
                        cc != di && distance(&coords[c], &coords[cc]) < COLOCATED_TOL
                    }))
                })
                .unique()
                .collect();

            for &d in &same_spot {
                let cell = layout.element_of(d);
                let loc = d % nd;
                for j in 0..nd {
                    let ext = layout.dof(cell, j);
                    if !entry.contains(&ext) && distance(&refs[loc], &refs[j]) <= level {
                        entry.push(ext);
                    }
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two P1 segments [0,1], [1,2] coupled through the shared node.
    fn two_segments() -> (DgLayout, CsrMatrix, Vec<[f64; 3]>) {
        let l = DgLayout::new(1, 1, 2).unwrap();
        let mut t = Vec::new();
        for r in 0..4 {
            for c in 0..4 {
                if r / 2 == c / 2 || (r, c) == (1, 2) || (r, c) == (2, 1) {
                    t.push((r, c, 1.0));
                }
            }
        }
        let k = CsrMatrix::from_triplets(4, 4, t).unwrap();
        let coords = vec![[0.0; 3], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        (l, k, coords)
    }

    #[test]
    fn full_stencil_uses_matrix_rows() {
        let (l, k, coords) = two_segments();
        let mut b = SolutionBounds::new(Stencil::Full, &l, &k, &coords).unwrap();
        b.compute(&k, &[1.0, 2.0, 5.0, 0.0]).unwrap();
        assert_eq!(b.x_min(), &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(b.x_max(), &[2.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn local_stencil_reaches_across_the_shared_node() {
        let (l, k, coords) = two_segments();
        let mut b = SolutionBounds::new(Stencil::Local, &l, &k, &coords).unwrap();
        let mut n1 = b.neighborhood(1).unwrap().to_vec();
        n1.sort_unstable();
        assert_eq!(n1, vec![0, 1, 2, 3]);
        let mut n0 = b.neighborhood(0).unwrap().to_vec();
        n0.sort_unstable();
        assert_eq!(n0, vec![0, 1]);
        b.compute(&k, &[1.0, 2.0, 5.0, 0.0]).unwrap();
        assert_eq!(b.x_min()[0], 1.0);
        assert_eq!(b.x_max()[1], 5.0);
    }
}

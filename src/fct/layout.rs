//! Dof layout of a discontinuous tensor-product space.
//!
//! Element `k` owns dofs `k*nd .. (k+1)*nd`; local dofs are lexicographic
//! with x fastest. Faces are numbered per dimension:
//! * 1D: left, right
//! * 2D: bottom, right, top, left
//! * 3D: bottom, front, right, back, left, top

use crate::mesh_error::MeshDdmError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DgLayout {
    dim: usize,
    order: usize,
    ne: usize,
}

impl DgLayout {
    pub fn new(dim: usize, order: usize, ne: usize) -> Result<Self, MeshDdmError> {
        if !(1..=3).contains(&dim) || order == 0 {
            return Err(MeshDdmError::InvalidGeometry(format!(
                "DG layout needs dim in 1..=3 and order >= 1, got dim={dim}, order={order}"
            )));
        }
        Ok(Self { dim, order, ne })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_elements(&self) -> usize {
        self.ne
    }

    /// Dofs per element.
    pub fn nd(&self) -> usize {
        (self.order + 1).pow(self.dim as u32)
    }

    pub fn num_dofs(&self) -> usize {
        self.ne * self.nd()
    }

    #[inline]
    pub fn dof(&self, k: usize, j: usize) -> usize {
        k * self.nd() + j
    }

    /// Element owning global dof `d`.
    #[inline]
    pub fn element_of(&self, d: usize) -> usize {
        d / self.nd()
    }

    /// Reference coordinates of local dof `j` on `[0,1]^dim`.
    pub fn reference_node(&self, j: usize) -> [f64; 3] {
        let n = self.order + 1;
        let p = self.order as f64;
        let mut x = [0.0; 3];
        let mut rem = j;
        for c in x.iter_mut().take(self.dim) {
            *c = (rem % n) as f64 / p;
            rem /= n;
        }
        x
    }

    pub fn boundary_dofs(&self) -> BoundaryDofs {
        BoundaryDofs::tensor(self.dim, self.order)
    }

    /// Number of sub-cells of the uniform refinement of one element.
    pub fn num_subcells(&self) -> usize {
        self.order.pow(self.dim as u32)
    }

    /// Dofs per sub-cell.
    pub fn subcell_dofs(&self) -> usize {
        1 << self.dim
    }

    /// Element-local dof of vertex `i` of sub-cell `m`.
    pub fn subcell_to_cell_dof(&self, m: usize, i: usize) -> usize {
        let p = self.order;
        match self.dim {
            1 => m + i,
            2 => {
                let base = m + m / p;
                base + [0, 1, p + 1, p + 2][i]
            }
            _ => {
                let base = m + m / p + (p + 1) * (m / (p * p));
                let plane = (p + 1) * (p + 1);
                base + [0, 1, p + 1, p + 2][i % 4] + if i >= 4 { plane } else { 0 }
            }
        }
    }
}

/// Local dofs on each element face: `dof(i, face)` is the `i`-th dof of `face`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryDofs {
    dim: usize,
    num_dofs: usize,
    num_bdrs: usize,
    table: Vec<usize>,
}

impl BoundaryDofs {
    pub fn tensor(dim: usize, p: usize) -> Self {
        let n = p + 1;
        let (num_dofs, num_bdrs) = match dim {
            1 => (1, 2),
            2 => (n, 4),
            _ => (n * n, 6),
        };
        let mut table = vec![0; num_dofs * num_bdrs];
        for face in 0..num_bdrs {
            for j in 0..num_dofs {
                table[face * num_dofs + j] = match (dim, face) {
                    (1, 0) => 0,
                    (1, _) => p,
                    (2, 0) => j,
                    (2, 1) => n * j + p,
                    (2, 2) => n * p + j,
                    (2, _) => n * j,
                    (_, 0) => j,
                    (_, 1) => (j / n) * n * n + j % n,
                    (_, 2) => j * n + p,
                    (_, 3) => (j / n) * n * n + n * p + j % n,
                    (_, 4) => j * n,
                    (_, _) => n * n * p + j,
                };
            }
        }
        Self {
            dim,
            num_dofs,
            num_bdrs,
            table,
        }
    }

    /// Dofs per face.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_bdrs(&self) -> usize {
        self.num_bdrs
    }

    #[inline]
    pub fn dof(&self, i: usize, face: usize) -> usize {
        self.table[face * self.num_dofs + i]
    }

    /// Face of the neighbor element that touches `face`.
    pub fn opposite_face(&self, face: usize) -> usize {
        match self.dim {
            1 => 1 - face,
            2 => (face + 2) % 4,
            _ => [5, 3, 4, 1, 2, 0][face],
        }
    }

    /// Local dof of the neighbor across `face` that coincides with `dof(i, face)`.
    pub fn neighbor_dof(&self, i: usize, face: usize) -> usize {
        self.dof(i, self.opposite_face(face))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_faces_match_their_neighbors() {
        let b = BoundaryDofs::tensor(2, 2);
        assert_eq!((0..3).map(|i| b.dof(i, 0)).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!((0..3).map(|i| b.dof(i, 1)).collect::<Vec<_>>(), vec![2, 5, 8]);
        assert_eq!((0..3).map(|i| b.dof(i, 2)).collect::<Vec<_>>(), vec![6, 7, 8]);
        assert_eq!((0..3).map(|i| b.dof(i, 3)).collect::<Vec<_>>(), vec![0, 3, 6]);
        // across the bottom face sits the neighbor's top row
        assert_eq!(b.neighbor_dof(1, 0), 7);
        assert_eq!(b.neighbor_dof(2, 1), 6);
    }

    #[test]
    fn hex_faces_lie_on_their_planes() {
        let l = DgLayout::new(3, 2, 1).unwrap();
        let b = l.boundary_dofs();
        // (axis, value) fixed on each face
        let planes = [(2, 0.0), (1, 0.0), (0, 1.0), (1, 1.0), (0, 0.0), (2, 1.0)];
        for (face, &(axis, v)) in planes.iter().enumerate() {
            for i in 0..b.num_dofs() {
                let x = l.reference_node(b.dof(i, face));
                assert_eq!(x[axis], v, "face {face} dof {i}");
                let y = l.reference_node(b.neighbor_dof(i, face));
                assert_eq!(y[axis], 1.0 - v);
                // the neighbor dof sits at the same in-plane position
                for a in (0..3).filter(|&a| a != axis) {
                    assert_eq!(x[a], y[a]);
                }
            }
        }
    }

    #[test]
    fn subcells_cover_vertices_of_the_refined_cell() {
        let l = DgLayout::new(2, 2, 1).unwrap();
        assert_eq!(l.num_subcells(), 4);
        let v: Vec<usize> = (0..4).map(|i| l.subcell_to_cell_dof(3, i)).collect();
        assert_eq!(v, vec![4, 5, 7, 8]);
        let l3 = DgLayout::new(3, 1, 1).unwrap();
        let v: Vec<usize> = (0..8).map(|i| l3.subcell_to_cell_dof(0, i)).collect();
        assert_eq!(v, (0..8).collect::<Vec<_>>());
        let l1 = DgLayout::new(1, 3, 2).unwrap();
        assert_eq!(l1.subcell_to_cell_dof(2, 1), 3);
        assert_eq!(l1.dof(1, 2), 6);
    }
}

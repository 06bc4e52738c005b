//! Finite-element space collaborators.
//!
//! The DOF layer only needs element → DOF lists and the global true-DOF
//! numbering; [`LagrangeSpace`] and [`DistributedLagrangeSpace`] provide both
//! for continuous `Q_p` elements on a [`CartesianMesh`].

use crate::mesh_error::MeshDdmError;
use crate::partition::block_range;
use crate::topology::{CartesianMesh, MeshGeometry};
use std::ops::Range;

/// Recover a DOF index from its orientation-encoded form.
#[inline]
pub fn decode_dof(d: i64) -> usize {
    if d >= 0 { d as usize } else { (-d - 1) as usize }
}

/// Element → local DOF connectivity.
pub trait ElementDofs {
    fn num_elements(&self) -> usize;
    /// Orientation-encoded local DOFs of element `e`, written into `out`
    /// (cleared first). Decode with [`decode_dof`].
    fn element_dofs(&self, e: usize, out: &mut Vec<i64>);
    /// Number of local true DOFs.
    fn num_true_dofs(&self) -> usize;
}

/// A rank's view of the distributed global space.
pub trait GlobalDofNumbering: ElementDofs {
    /// Global true DOF of local DOF `ldof`.
    fn global_tdof_number(&self, ldof: usize) -> u64;
    /// First global true DOF owned by this rank.
    fn my_tdof_offset(&self) -> u64;
    /// Number of global true DOFs owned by this rank.
    fn num_owned_tdofs(&self) -> usize;
}

/// A subdomain's independent space, with the mesh it lives on.
pub trait SubdomainSpace: ElementDofs {
    type Mesh: MeshGeometry;
    fn mesh(&self) -> &Self::Mesh;
}

/// Continuous `Q_p` Lagrange space with lexicographic nodes (x fastest).
#[derive(Clone, Debug)]
pub struct LagrangeSpace {
    mesh: CartesianMesh,
    order: usize,
    nodes: [usize; 3],
}

impl LagrangeSpace {
    pub fn new(mesh: CartesianMesh, order: usize) -> Result<Self, MeshDdmError> {
        if order == 0 {
            return Err(MeshDdmError::InvalidGeometry(
                "continuous space needs order >= 1".into(),
            ));
        }
        let n = mesh.elements_per_axis();
        let dim = mesh.dim();
        let mut nodes = [1usize; 3];
        for a in 0..dim {
            nodes[a] = n[a] * order + 1;
        }
        Ok(Self { mesh, order, nodes })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn dofs_per_element(&self) -> usize {
        (self.order + 1).pow(self.mesh.dim() as u32)
    }

    fn node_id(&self, ijk: [usize; 3]) -> usize {
        ijk[2] * self.nodes[0] * self.nodes[1] + ijk[1] * self.nodes[0] + ijk[0]
    }

    /// Physical coordinates of DOF `d`.
    pub fn dof_coords(&self, d: usize) -> [f64; 3] {
        let plane = self.nodes[0] * self.nodes[1];
        let k = d / plane;
        let rem = d - k * plane;
        let ijk = [rem % self.nodes[0], rem / self.nodes[0], k];
        let lo = self.mesh.lower();
        let mut x = [0.0; 3];
        for a in 0..self.mesh.dim() {
            x[a] = lo[a] + ijk[a] as f64 * self.mesh.h(a) / self.order as f64;
        }
        x
    }

    /// Nodal interpolant of `f`.
    pub fn project<F: Fn([f64; 3]) -> f64>(&self, f: F) -> Vec<f64> {
        (0..self.num_true_dofs()).map(|d| f(self.dof_coords(d))).collect()
    }

    fn push_element_dofs(&self, e: usize, out: &mut Vec<i64>) {
        let ijk = self.mesh.element_ijk(e);
        let dim = self.mesh.dim();
        let p = self.order;
        let span = |a: usize| if a < dim { p } else { 0 };
        for lz in 0..=span(2) {
            for ly in 0..=span(1) {
                for lx in 0..=span(0) {
                    let node = [ijk[0] * p + lx, ijk[1] * p + ly, ijk[2] * p + lz];
                    out.push(self.node_id(node) as i64);
                }
            }
        }
    }
}

impl ElementDofs for LagrangeSpace {
    fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    fn element_dofs(&self, e: usize, out: &mut Vec<i64>) {
        out.clear();
        self.push_element_dofs(e, out);
    }

    fn num_true_dofs(&self) -> usize {
        self.nodes.iter().product()
    }
}

impl SubdomainSpace for LagrangeSpace {
    type Mesh = CartesianMesh;

    fn mesh(&self) -> &CartesianMesh {
        &self.mesh
    }
}

/// Rank-local view of a global [`LagrangeSpace`].
///
/// Elements are owned in contiguous chunks, true DOFs in contiguous chunks
/// independent of the element chunks. Local DOFs are the global DOFs touched
/// by the owned elements, numbered compactly in ascending global order.
#[derive(Clone, Debug)]
pub struct DistributedLagrangeSpace {
    global: LagrangeSpace,
    elements: Range<usize>,
    tdofs: Range<usize>,
    local_to_global: Vec<u64>,
}

impl DistributedLagrangeSpace {
    pub fn new(global: LagrangeSpace, rank: usize, size: usize) -> Result<Self, MeshDdmError> {
        if size == 0 || rank >= size {
            return Err(MeshDdmError::InvalidPartition(format!(
                "rank {rank} out of {size}"
            )));
        }
        let elements = block_range(global.num_elements(), size, rank);
        let tdofs = block_range(global.num_true_dofs(), size, rank);
        let mut touched = Vec::new();
        let mut buf = Vec::new();
        for e in elements.clone() {
            global.element_dofs(e, &mut buf);
            touched.extend(buf.iter().map(|&d| decode_dof(d) as u64));
        }
        touched.sort_unstable();
        touched.dedup();
        Ok(Self {
            global,
            elements,
            tdofs,
            local_to_global: touched,
        })
    }

    pub fn global_space(&self) -> &LagrangeSpace {
        &self.global
    }

    /// Global ids of the elements this rank owns.
    pub fn element_range(&self) -> Range<usize> {
        self.elements.clone()
    }

    /// Global true DOFs this rank owns.
    pub fn tdof_range(&self) -> Range<usize> {
        self.tdofs.clone()
    }

    /// Nodal interpolant of `f` restricted to the owned true DOFs.
    pub fn project_owned<F: Fn([f64; 3]) -> f64>(&self, f: F) -> Vec<f64> {
        self.tdofs
            .clone()
            .map(|d| f(self.global.dof_coords(d)))
            .collect()
    }
}

impl ElementDofs for DistributedLagrangeSpace {
    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn element_dofs(&self, e: usize, out: &mut Vec<i64>) {
        self.global.element_dofs(self.elements.start + e, out);
        for d in out.iter_mut() {
            let g = decode_dof(*d) as u64;
            // every dof of an owned element is in the table by construction
            let l = self.local_to_global.partition_point(|&x| x < g);
            *d = l as i64;
        }
    }

    fn num_true_dofs(&self) -> usize {
        self.local_to_global.len()
    }
}

impl GlobalDofNumbering for DistributedLagrangeSpace {
    fn global_tdof_number(&self, ldof: usize) -> u64 {
        self.local_to_global[ldof]
    }

    fn my_tdof_offset(&self) -> u64 {
        self.tdofs.start as u64
    }

    fn num_owned_tdofs(&self) -> usize {
        self.tdofs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_handles_orientation() {
        assert_eq!(decode_dof(5), 5);
        assert_eq!(decode_dof(-1), 0);
        assert_eq!(decode_dof(-6), 5);
    }

    #[test]
    fn q2_element_dofs_are_lexicographic() {
        let mesh = CartesianMesh::unit(2, [2, 1, 1]).unwrap();
        let s = LagrangeSpace::new(mesh, 2).unwrap();
        assert_eq!(s.num_true_dofs(), 5 * 3);
        let mut dofs = Vec::new();
        s.element_dofs(1, &mut dofs);
        assert_eq!(dofs, vec![2, 3, 4, 7, 8, 9, 12, 13, 14]);
        let x = s.dof_coords(8);
        assert!((x[0] - 0.75).abs() < 1e-14 && (x[1] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn distributed_view_maps_back_to_global() {
        let mesh = CartesianMesh::unit(2, [3, 3, 1]).unwrap();
        let global = LagrangeSpace::new(mesh, 1).unwrap();
        let total = global.num_true_dofs();
        let mut owned = 0;
        for rank in 0..2 {
            let d = DistributedLagrangeSpace::new(global.clone(), rank, 2).unwrap();
            owned += d.num_owned_tdofs();
            let mut local = Vec::new();
            let mut reference = Vec::new();
            for e in 0..d.num_elements() {
                d.element_dofs(e, &mut local);
                global.element_dofs(d.element_range().start + e, &mut reference);
                let mapped: Vec<i64> = local
                    .iter()
                    .map(|&l| d.global_tdof_number(decode_dof(l)) as i64)
                    .collect();
                assert_eq!(mapped, reference);
            }
        }
        assert_eq!(owned, total);
    }
}

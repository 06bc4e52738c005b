//! Overlap (halo) bookkeeping between neighboring subdomains.
//!
//! [`regions`] sorts each subdomain's elements into directional buckets,
//! [`dofs`] turns the buckets into DOF lists, and [`exchange`] moves values
//! across them. [`OverlapMaps`] holds the result of the first two for every
//! subdomain owned by this rank.

pub mod delta;
pub mod dofs;
pub mod exchange;
pub mod regions;

pub use exchange::{OverlapSolutions, transfer_to_neighbors};
pub use regions::AxisFlags;

use crate::data::SubdomainSpace;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDdmError;
use crate::partition::SubdomainPartition;
use crate::topology::{Direction, MeshGeometry};

/// Overlap elements and DOFs of the owned subdomains, by subdomain and
/// direction id. Subdomains owned elsewhere have no entries.
#[derive(Clone, Debug, Default)]
pub struct OverlapMaps {
    elements: Vec<Vec<Vec<usize>>>,
    dofs: Vec<Vec<Vec<usize>>>,
    ntdofs: Vec<usize>,
}

impl OverlapMaps {
    /// Build the maps of every owned subdomain; `width` is the halo width in
    /// physical units.
    pub fn build<S: SubdomainSpace>(
        partition: &SubdomainPartition,
        spaces: &[Option<S>],
        width: f64,
    ) -> Result<Self, MeshDdmError> {
        let nsub = partition.num_subdomains();
        crate::mesh_error::check_len("subdomain spaces", nsub, spaces.len())?;
        let grid = partition.grid();
        let mut maps = Self {
            elements: vec![Vec::new(); nsub],
            dofs: vec![Vec::new(); nsub],
            ntdofs: vec![0; nsub],
        };
        for ip in partition.owned_subdomains() {
            let space = spaces[ip]
                .as_ref()
                .ok_or(MeshDdmError::MissingSubdomainSpace(ip))?;
            if space.mesh().dim() != grid.dim() {
                return Err(MeshDdmError::InvalidPartition(format!(
                    "subdomain {ip}: mesh dimension {} in a {}-D grid",
                    space.mesh().dim(),
                    grid.dim()
                )));
            }
            let elems = regions::overlap_elements(grid, ip, space.mesh(), width);
            maps.dofs[ip] = dofs::overlap_dofs(space, &elems);
            maps.elements[ip] = elems;
            maps.ntdofs[ip] = space.num_true_dofs();
            log::debug!(
                "subdomain {ip}: {} overlap elements, {} overlap dofs",
                maps.elements[ip].iter().map(Vec::len).sum::<usize>(),
                maps.dofs[ip].iter().map(Vec::len).sum::<usize>()
            );
        }
        maps.debug_assert_invariants();
        Ok(maps)
    }

    /// Elements of `subdomain` in the bucket of `dir` (empty if not owned here).
    pub fn elements(&self, subdomain: usize, dir: Direction) -> &[usize] {
        self.elements
            .get(subdomain)
            .and_then(|b| b.get(dir.id()))
            .map_or(&[], Vec::as_slice)
    }

    /// Local DOFs of `subdomain` in the bucket of `dir` (empty if not owned here).
    pub fn dofs(&self, subdomain: usize, dir: Direction) -> &[usize] {
        self.dofs
            .get(subdomain)
            .and_then(|b| b.get(dir.id()))
            .map_or(&[], Vec::as_slice)
    }

    /// True-DOF count of an owned subdomain's space; zero elsewhere.
    pub fn num_true_dofs(&self, subdomain: usize) -> usize {
        self.ntdofs.get(subdomain).copied().unwrap_or(0)
    }

    /// Sum of all overlap DOF list lengths on this rank.
    pub fn total_overlap_dofs(&self) -> usize {
        self.dofs.iter().flatten().map(Vec::len).sum()
    }
}

impl DebugInvariants for OverlapMaps {
    /// Every overlap DOF list holds distinct DOFs of its subdomain, and the
    /// center bucket stays empty.
    fn validate_invariants(&self) -> Result<(), MeshDdmError> {
        let mut seen = Vec::new();
        for (ip, buckets) in self.dofs.iter().enumerate() {
            let n = self.ntdofs[ip];
            let dim = if buckets.len() == 27 { 3 } else { 2 };
            for (d, list) in buckets.iter().enumerate() {
                if Direction::from_id(d).is_center(dim) && !list.is_empty() {
                    return Err(MeshDdmError::InvalidPartition(format!(
                        "subdomain {ip}: center bucket holds {} dofs",
                        list.len()
                    )));
                }
                seen.clear();
                seen.resize(n, false);
                for &dof in list {
                    if dof >= n || std::mem::replace(&mut seen[dof], true) {
                        return Err(MeshDdmError::InvalidPartition(format!(
                            "subdomain {ip}: overlap dof {dof} repeated or out of {n} in direction {d}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

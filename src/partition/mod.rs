//! Subdomain partition descriptor.
//!
//! A partition splits the global mesh into the cells of a [`SubdomainGrid`],
//! assigns every subdomain to one owning rank, and records which global
//! elements each subdomain holds. The DOF layer consumes it read-only.

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshDdmError;
use crate::topology::{CartesianMesh, MeshGeometry, SubdomainGrid};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// `i`-th of `parts` contiguous, near-equal chunks of `0..n`.
pub fn block_range(n: usize, parts: usize, i: usize) -> Range<usize> {
    (i * n / parts)..((i + 1) * n / parts)
}

/// How subdomains are mapped to ranks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankAssignment {
    /// Subdomain `ip` goes to rank `ip % num_ranks`.
    RoundRobin(usize),
    /// Owner of every subdomain, listed by subdomain id; `num_ranks` bounds the entries.
    Explicit { ranks: Vec<usize>, num_ranks: usize },
}

impl RankAssignment {
    fn resolve(&self, nsub: usize) -> Result<(Vec<usize>, usize), MeshDdmError> {
        match self {
            RankAssignment::RoundRobin(0) => {
                Err(MeshDdmError::InvalidPartition("zero ranks".into()))
            }
            RankAssignment::RoundRobin(p) => Ok(((0..nsub).map(|ip| ip % p).collect(), *p)),
            RankAssignment::Explicit { ranks, num_ranks } => {
                if ranks.len() != nsub {
                    return Err(MeshDdmError::InvalidPartition(format!(
                        "{} owners listed for {nsub} subdomains",
                        ranks.len()
                    )));
                }
                if let Some(bad) = ranks.iter().find(|&&r| r >= *num_ranks) {
                    return Err(MeshDdmError::InvalidPartition(format!(
                        "owner rank {bad} out of {num_ranks}"
                    )));
                }
                Ok((ranks.clone(), *num_ranks))
            }
        }
    }
}

/// Partition of a global mesh into a logical grid of subdomains, seen from one rank.
#[derive(Clone, Debug)]
pub struct SubdomainPartition {
    grid: SubdomainGrid,
    my_rank: usize,
    num_ranks: usize,
    overlap_layers: usize,
    mesh_size: f64,
    subdomain_rank: Vec<usize>,
    element_map: Vec<Vec<usize>>,
    local_element_map: Vec<Vec<usize>>,
    my_element_offset: usize,
    subdomain_meshes: Vec<Option<CartesianMesh>>,
}

impl SubdomainPartition {
    /// Split a Cartesian mesh into the cells of `grid`, each extended by
    /// `overlap_layers` elements on every interior side.
    ///
    /// `my_elements` are the global elements this rank owns in the global
    /// space. Subdomain elements are listed in ascending global id, which is
    /// also the lexicographic order of the subdomain's own mesh.
    pub fn cartesian(
        mesh: &CartesianMesh,
        grid: SubdomainGrid,
        overlap_layers: usize,
        assignment: &RankAssignment,
        my_rank: usize,
        my_elements: Range<usize>,
    ) -> Result<Self, MeshDdmError> {
        if mesh.dim() != grid.dim() {
            return Err(MeshDdmError::InvalidPartition(format!(
                "mesh dimension {} but grid dimension {}",
                mesh.dim(),
                grid.dim()
            )));
        }
        let nsub = grid.num_subdomains();
        let (subdomain_rank, num_ranks) = assignment.resolve(nsub)?;
        if my_rank >= num_ranks {
            return Err(MeshDdmError::InvalidPartition(format!(
                "rank {my_rank} out of {num_ranks}"
            )));
        }
        let n = mesh.elements_per_axis();
        let g = grid.extents();

        let mut element_map = Vec::with_capacity(nsub);
        let mut local_element_map = Vec::with_capacity(nsub);
        let mut subdomain_meshes = Vec::with_capacity(nsub);
        for ip in 0..nsub {
            let ijk = grid.subdomain_ijk(ip);
            let mut first = [0usize; 3];
            let mut last = [1usize; 3];
            for a in 0..grid.dim() {
                let core = block_range(n[a], g[a], ijk[a]);
                if core.is_empty() {
                    return Err(MeshDdmError::InvalidPartition(format!(
                        "axis {a}: {} subdomains for {} elements",
                        g[a], n[a]
                    )));
                }
                first[a] = core.start.saturating_sub(overlap_layers);
                last[a] = (core.end + overlap_layers).min(n[a]);
            }
            let sub = mesh.sub_box(first, last)?;
            let sn = sub.elements_per_axis();
            let mut elems = Vec::with_capacity(sub.num_elements());
            for k in 0..sn[2] {
                for j in 0..sn[1] {
                    for i in 0..sn[0] {
                        elems.push(mesh.element_id([first[0] + i, first[1] + j, first[2] + k]));
                    }
                }
            }
            local_element_map.push(
                elems
                    .iter()
                    .copied()
                    .filter(|e| my_elements.contains(e))
                    .collect::<Vec<_>>(),
            );
            element_map.push(elems);
            subdomain_meshes.push((subdomain_rank[ip] == my_rank).then_some(sub));
        }

        let part = Self {
            grid,
            my_rank,
            num_ranks,
            overlap_layers,
            mesh_size: mesh.mesh_size(),
            subdomain_rank,
            element_map,
            local_element_map,
            my_element_offset: my_elements.start,
            subdomain_meshes,
        };
        part.debug_assert_invariants();
        log::info!(
            "rank {my_rank}: partition of {nsub} subdomains, {} owned here",
            part.owned_subdomains().count()
        );
        Ok(part)
    }

    pub fn grid(&self) -> &SubdomainGrid {
        &self.grid
    }

    pub fn num_subdomains(&self) -> usize {
        self.subdomain_rank.len()
    }

    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    pub fn overlap_layers(&self) -> usize {
        self.overlap_layers
    }

    /// Characteristic element size of the global mesh.
    pub fn mesh_size(&self) -> f64 {
        self.mesh_size
    }

    /// Owning rank of every subdomain, by subdomain id.
    pub fn subdomain_ranks(&self) -> &[usize] {
        &self.subdomain_rank
    }

    pub fn subdomain_rank(&self, ip: usize) -> usize {
        self.subdomain_rank[ip]
    }

    pub fn owns(&self, ip: usize) -> bool {
        self.subdomain_rank[ip] == self.my_rank
    }

    pub fn owned_subdomains(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_subdomains()).filter(move |&ip| self.owns(ip))
    }

    /// Global element ids of subdomain `ip`, in subdomain element order.
    pub fn element_map(&self, ip: usize) -> &[usize] {
        &self.element_map[ip]
    }

    /// The part of `element_map(ip)` owned by this rank in the global space.
    pub fn local_element_map(&self, ip: usize) -> &[usize] {
        &self.local_element_map[ip]
    }

    /// First global element owned by this rank.
    pub fn my_element_offset(&self) -> usize {
        self.my_element_offset
    }

    /// Mesh of subdomain `ip`; only present on the owning rank.
    pub fn subdomain_mesh(&self, ip: usize) -> Option<&CartesianMesh> {
        self.subdomain_meshes.get(ip).and_then(Option::as_ref)
    }

    /// Build one space per owned subdomain; `None` elsewhere.
    pub fn build_spaces<S, F>(&self, mut f: F) -> Result<Vec<Option<S>>, MeshDdmError>
    where
        F: FnMut(&CartesianMesh) -> Result<S, MeshDdmError>,
    {
        self.subdomain_meshes
            .iter()
            .map(|m| m.as_ref().map(&mut f).transpose())
            .collect()
    }
}

impl DebugInvariants for SubdomainPartition {
    fn validate_invariants(&self) -> Result<(), MeshDdmError> {
        for (ip, elems) in self.element_map.iter().enumerate() {
            if elems.windows(2).any(|w| w[0] >= w[1]) {
                return Err(MeshDdmError::InvalidPartition(format!(
                    "subdomain {ip}: element map not strictly ascending"
                )));
            }
            if let Some(e) = self.local_element_map[ip]
                .iter()
                .find(|e| elems.binary_search(e).is_err())
            {
                return Err(MeshDdmError::InvalidPartition(format!(
                    "subdomain {ip}: local element {e} not in its element map"
                )));
            }
            if let Some(m) = &self.subdomain_meshes[ip] {
                if m.num_elements() != elems.len() {
                    return Err(MeshDdmError::InvalidPartition(format!(
                        "subdomain {ip}: mesh has {} elements, map has {}",
                        m.num_elements(),
                        elems.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

//! Subdomain DOF maps: overlap bookkeeping, the subdomain ↔ global bridge
//! and the transfers built on them.
//!
//! [`DofMaps::setup`] is collective over the communicator and must be called
//! by every rank with the same partition layout. The resulting maps are
//! read-only; every transfer allocates its own buffers.

pub mod bridge;
pub mod resolver;
pub mod transfer;

pub use bridge::SubdomainBridge;
pub use resolver::{TdofOffsets, get_rank};
pub use transfer::{TransferCtx, global_to_subdomains, subdomains_to_global};

use crate::algs::communicator::Communicator;
use crate::config::DdmOptions;
use crate::data::space::{GlobalDofNumbering, SubdomainSpace};
use crate::mesh_error::{MeshDdmError, check_len};
use crate::overlap::{OverlapMaps, OverlapSolutions, transfer_to_neighbors};
use crate::partition::SubdomainPartition;
use serde::Serialize;
use std::fmt;

/// Per-rank statistics of a built [`DofMaps`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DofMapsSummary {
    pub rank: usize,
    pub num_ranks: usize,
    pub owned_subdomains: usize,
    pub halo_width: f64,
    pub overlap_dofs: usize,
    pub subdomain_dofs: usize,
    pub owned_contributions: usize,
}

impl fmt::Display for DofMapsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rank {}/{}: {} subdomains, halo {:.3e}, {} overlap dofs, {} subdomain dofs, {} owned contributions",
            self.rank,
            self.num_ranks,
            self.owned_subdomains,
            self.halo_width,
            self.overlap_dofs,
            self.subdomain_dofs,
            self.owned_contributions
        )
    }
}

/// Immutable DOF maps of one rank, bound to its communicator.
pub struct DofMaps<'c, C: Communicator> {
    comm: &'c C,
    partition: SubdomainPartition,
    offsets: TdofOffsets,
    overlap: OverlapMaps,
    bridge: SubdomainBridge,
    halo_width: f64,
    num_owned_tdofs: usize,
}

impl<'c, C: Communicator> DofMaps<'c, C> {
    /// Build offsets, overlap maps and the DOF bridge.
    ///
    /// `spaces[ip]` must be present for every subdomain this rank owns.
    /// A reassembled DOF list that disagrees with its subdomain space is
    /// reported as [`MeshDdmError::DofCountMismatch`]; the maps are unusable
    /// in that case.
    pub fn setup<G, S>(
        comm: &'c C,
        global: &G,
        partition: SubdomainPartition,
        spaces: &[Option<S>],
        options: &DdmOptions,
    ) -> Result<Self, MeshDdmError>
    where
        G: GlobalDofNumbering,
        S: SubdomainSpace,
    {
        if partition.num_ranks() != comm.size() || partition.my_rank() != comm.rank() {
            return Err(MeshDdmError::InvalidPartition(format!(
                "partition built for rank {}/{} used on rank {}/{}",
                partition.my_rank(),
                partition.num_ranks(),
                comm.rank(),
                comm.size()
            )));
        }
        if options.overlap_layers != partition.overlap_layers() {
            log::warn!(
                "rank {}: options request {} overlap layers, partition has {}; using the partition's",
                comm.rank(),
                options.overlap_layers,
                partition.overlap_layers()
            );
        }
        let offsets = TdofOffsets::gather(comm, global.my_tdof_offset())?;
        let halo_width =
            options.halo_factor * partition.overlap_layers() as f64 * partition.mesh_size();
        let overlap = OverlapMaps::build(&partition, spaces, halo_width)?;
        let bridge = SubdomainBridge::build(comm, &partition, global, spaces, &offsets)?;
        let maps = Self {
            comm,
            partition,
            offsets,
            overlap,
            bridge,
            halo_width,
            num_owned_tdofs: global.num_owned_tdofs(),
        };
        log::info!("{}", maps.summary());
        Ok(maps)
    }

    /// Halo exchange; see [`transfer_to_neighbors`].
    pub fn transfer_to_neighbors(
        &self,
        ids: &[usize],
        x: &[Option<Vec<f64>>],
    ) -> Result<OverlapSolutions, MeshDdmError> {
        transfer_to_neighbors(
            self.comm,
            self.partition.grid(),
            self.partition.subdomain_ranks(),
            &self.overlap,
            ids,
            x,
        )
    }

    /// Restrict this rank's slice of a global true-DOF vector to every owned subdomain.
    pub fn global_to_subdomains(&self, y: &[f64]) -> Result<Vec<Option<Vec<f64>>>, MeshDdmError> {
        check_len("global vector", self.num_owned_tdofs, y.len())?;
        global_to_subdomains(self.comm, &self.ctx(), y)
    }

    /// Accumulate subdomain vectors into this rank's slice of a global vector.
    pub fn subdomains_to_global(
        &self,
        x: &[Option<Vec<f64>>],
        y: &mut [f64],
    ) -> Result<(), MeshDdmError> {
        check_len("global vector", self.num_owned_tdofs, y.len())?;
        subdomains_to_global(self.comm, &self.ctx(), x, y)
    }

    fn ctx(&self) -> TransferCtx<'_> {
        TransferCtx {
            partition: &self.partition,
            bridge: &self.bridge,
            offsets: &self.offsets,
        }
    }

    pub fn partition(&self) -> &SubdomainPartition {
        &self.partition
    }

    pub fn offsets(&self) -> &TdofOffsets {
        &self.offsets
    }

    pub fn overlap(&self) -> &OverlapMaps {
        &self.overlap
    }

    pub fn bridge(&self) -> &SubdomainBridge {
        &self.bridge
    }

    pub fn halo_width(&self) -> f64 {
        self.halo_width
    }

    pub fn summary(&self) -> DofMapsSummary {
        let owned: Vec<usize> = self.partition.owned_subdomains().collect();
        DofMapsSummary {
            rank: self.comm.rank(),
            num_ranks: self.comm.size(),
            owned_subdomains: owned.len(),
            halo_width: self.halo_width,
            overlap_dofs: self.overlap.total_overlap_dofs(),
            subdomain_dofs: owned.iter().map(|&ip| self.bridge.global_tdofs(ip).len()).sum(),
            owned_contributions: (0..self.partition.num_subdomains())
                .map(|ip| self.bridge.owned_tdofs(ip).len())
                .sum(),
        }
    }
}

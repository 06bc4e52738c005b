//! Owner lookup for global true DOFs.

use crate::algs::collective::all_gather;
use crate::algs::communicator::{CommTag, Communicator};
use crate::mesh_error::MeshDdmError;

const OFFSETS_TAG: CommTag = CommTag::new(0x0100);

/// Rank owning `tdof`, given each rank's first true DOF in `offsets`.
///
/// This is the last rank whose offset does not exceed `tdof`; with a single
/// rank the answer is always 0.
pub fn get_rank(tdof: u64, offsets: &[u64]) -> usize {
    if offsets.len() <= 1 {
        return 0;
    }
    offsets.partition_point(|&o| o <= tdof).saturating_sub(1)
}

/// Per-rank starting true DOFs; non-decreasing, one entry per rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TdofOffsets(Vec<u64>);

impl TdofOffsets {
    pub fn new(offsets: Vec<u64>) -> Result<Self, MeshDdmError> {
        if offsets.is_empty() {
            return Err(MeshDdmError::InvalidPartition("empty offset table".into()));
        }
        if let Some(p) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(MeshDdmError::OffsetsNotSorted(p + 1));
        }
        Ok(Self(offsets))
    }

    /// Gather every rank's first owned true DOF.
    pub fn gather<C: Communicator>(comm: &C, my_offset: u64) -> Result<Self, MeshDdmError> {
        Self::new(all_gather(comm, OFFSETS_TAG, my_offset)?)
    }

    pub fn rank_of(&self, tdof: u64) -> usize {
        get_rank(tdof, &self.0)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn num_ranks(&self) -> usize {
        self.0.len()
    }
}

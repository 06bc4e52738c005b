//! MeshDdmError: Unified error type for mesh-ddm public APIs
//!
//! This error type is used throughout the crate to provide non-panicking
//! error handling. Conditions that the numerical layer treats as fatal
//! (for example a DOF-count mismatch while building the subdomain bridge)
//! are still reported through this type; the driving program decides to
//! abort.

use thiserror::Error;

/// Unified error type for mesh-ddm operations.
#[derive(Debug, Error)]
pub enum MeshDdmError {
    /// The reassembled global-true-DOF list of a subdomain disagrees with its local space.
    #[error(
        "subdomain {subdomain}: DOF count mismatch (local space expects {expected}, reassembled {found})"
    )]
    DofCountMismatch {
        subdomain: usize,
        expected: usize,
        found: usize,
    },
    /// A local DOF of a subdomain received two different global-true ids.
    #[error("subdomain {subdomain}: local dof {local} mapped to both {first} and {second}")]
    ConflictingDofMap {
        subdomain: usize,
        local: usize,
        first: u64,
        second: u64,
    },
    /// Two inputs that must agree in length do not.
    #[error("{what}: expected length {expected}, got {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Unrecognized monotonicity/limiter scheme id.
    #[error("unsupported monotonicity scheme id {0}")]
    UnsupportedScheme(i32),
    /// Unrecognized bounds stencil id.
    #[error("unsupported bounds stencil id {0}")]
    UnsupportedStencil(i32),
    /// The requested tensor kernel exceeds the generic path limits.
    #[error("no tensor kernel for dim={dim}, d1d={d1d}, q1d={q1d} (limits d1d<={max_d1d}, q1d<={max_q1d})")]
    UnsupportedKernel {
        dim: usize,
        d1d: usize,
        q1d: usize,
        max_d1d: usize,
        max_q1d: usize,
    },
    /// Logical subdomain grid is malformed.
    #[error("invalid subdomain grid: {0}")]
    InvalidGrid(String),
    /// Partition descriptor is malformed.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    /// The local finite-element space of a subdomain was required but is absent on this rank.
    #[error("subdomain {0} has no local space on this rank")]
    MissingSubdomainSpace(usize),
    /// A vector for an owned subdomain was required but not supplied.
    #[error("no vector supplied for owned subdomain {0}")]
    MissingSubdomainVector(usize),
    /// The true-DOF offset table is not non-decreasing.
    #[error("true-dof offset table is not sorted at position {0}")]
    OffsetsNotSorted(usize),
    /// A communication operation with a neighbor failed or delivered garbage.
    #[error("communication with rank {neighbor} failed: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A message tag exceeds what the communication backend accepts.
    #[error("message tag {tag} exceeds the backend limit {max}")]
    TagOutOfRange { tag: u32, max: u32 },
    /// A positional wire buffer could not be decoded.
    #[error("malformed wire buffer: {0}")]
    WireDecode(String),
    /// A sparse matrix lacks the transposed entry of a stored entry.
    #[error("sparse matrix has ({row},{col}) but no ({col},{row}) entry")]
    MissingSymmetricEntry { row: usize, col: usize },
    /// A sparse matrix row has no stored diagonal entry.
    #[error("sparse matrix row {0} has no diagonal entry")]
    MissingDiagonal(usize),
    /// A sparse matrix index is out of range.
    #[error("sparse matrix index ({row},{col}) out of range for {nrows}x{ncols}")]
    SparseIndexOutOfRange {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    /// Sparse storage rejected its input.
    #[error("sparse matrix format: {0}")]
    SparseFormat(String),
    /// A diagonal block of the mass matrix could not be factored.
    #[error("mass matrix block of element {0} is singular")]
    SingularMassBlock(usize),
    /// Local bounds were requested without a stencil map.
    #[error("local bounds stencil has not been built")]
    MissingBoundsStencil,
    /// The selected limiter scheme needs precomputed data that was not supplied.
    #[error("limiter scheme {scheme} needs {what}")]
    MissingFctData {
        scheme: &'static str,
        what: &'static str,
    },
    /// Geometry input is inconsistent (bad extents, zero sizes, ...).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl MeshDdmError {
    /// Convenience constructor for communication failures described by a message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        MeshDdmError::CommError {
            neighbor,
            source: msg.into(),
        }
    }
}

/// Check that `found == expected`, reporting `what` otherwise.
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), MeshDdmError> {
    if expected == found {
        Ok(())
    } else {
        Err(MeshDdmError::SizeMismatch {
            what,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comm_error_keeps_neighbor_and_message() {
        let err = MeshDdmError::comm(3, "short read");
        let msg = err.to_string();
        assert!(msg.contains("rank 3"));
        assert!(msg.contains("short read"));
    }

    #[test]
    fn check_len_reports_both_sizes() {
        assert!(check_len("x", 2, 2).is_ok());
        match check_len("x", 2, 3) {
            Err(MeshDdmError::SizeMismatch { expected, found, .. }) => {
                assert_eq!((expected, found), (2, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

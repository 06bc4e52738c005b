#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-ddm
//!
//! mesh-ddm holds the parallel plumbing and the element kernels of an
//! overlapping domain-decomposition finite-element code on a structured
//! grid of subdomains.
//!
//! ## Features
//! - Overlap regions and overlap dofs per (subdomain, direction), with a
//!   halo exchange between neighboring subdomains
//! - A bridge between subdomain-local dofs and the distributed global true
//!   dofs, with restriction (overwrite) and prolongation (accumulate)
//! - Sum-factorized tensor-product kernels for values, gradients, their
//!   transpose and a limiter residual
//! - Flux-corrected transport for DG advection with discrete upwinding,
//!   Rusanov diffusion and residual distribution
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Determinism
//!
//! Message channels are FIFO per (source, destination, tag) and every
//! receiver walks its buffers in rank order, so results do not depend on
//! message arrival order. Tests use fixed `SmallRng` seeds.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-ddm = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! A typical driver builds a [`partition::SubdomainPartition`], a global
//! space implementing [`data::GlobalDofNumbering`] and the local subdomain
//! spaces, calls [`dofmap::DofMaps::setup`] once, then uses
//! `global_to_subdomains`, `transfer_to_neighbors` and
//! `subdomains_to_global` inside the solver loop.

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod dofmap;
pub mod fct;
pub mod kernels;
pub mod mesh_error;
pub mod overlap;
pub mod partition;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use mesh_error::MeshDdmError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{
        CommTag, Communicator, NoComm, RayonComm, Wait, run_local_ranks,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::config::{DdmOptions, FctOptions, KernelOptions, MonoType, Stencil};
    pub use crate::data::{
        CsrMatrix, DistributedLagrangeSpace, ElementDofs, GlobalDofNumbering, LagrangeSpace,
        SubdomainSpace,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dofmap::{DofMaps, DofMapsSummary, TdofOffsets};
    pub use crate::fct::{FctEvolution, PeriodicSegment, SolutionBounds, TransportProblem};
    pub use crate::kernels::{
        DofToQuad, ElementBatch, KernelPath, apply_transpose, eval_gradients, eval_values,
    };
    pub use crate::mesh_error::MeshDdmError;
    pub use crate::overlap::{OverlapMaps, OverlapSolutions};
    pub use crate::partition::{RankAssignment, SubdomainPartition};
    pub use crate::topology::{CartesianMesh, Direction, MeshGeometry, SubdomainGrid};
}

//! Data collaborators: finite-element spaces and sparse matrices.

pub mod csr;
pub mod space;

pub use csr::CsrMatrix;
pub use space::{
    DistributedLagrangeSpace, ElementDofs, GlobalDofNumbering, LagrangeSpace, SubdomainSpace,
    decode_dof,
};

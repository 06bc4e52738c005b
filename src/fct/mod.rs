//! Flux-corrected transport for DG advection.
//!
//! A low-order update that respects the nodal bounds is blended with the
//! plain high-order update, either by clipping and rescaling anti-diffusive
//! element fluxes (the `*Fct` schemes) or by a continuous per-dof share
//! (`ResDistLim`, `ResDistLimMass`).

pub mod bounds;
pub mod evolution;
pub mod flux;
pub mod layout;
pub mod mass;
pub mod resdist;
pub mod rusanov;
pub mod segment;
pub mod upwind;

pub use crate::config::{FctOptions, MonoType, Stencil};
pub use bounds::SolutionBounds;
pub use evolution::{FctEvolution, TransportProblem};
pub use flux::FaceFluxData;
pub use layout::{BoundaryDofs, DgLayout};
pub use mass::{BlockDiagonalMass, MassSolver};
pub use resdist::SubcellData;
pub use rusanov::RusanovData;
pub use segment::PeriodicSegment;
pub use upwind::{discrete_upwinding, upwinded_operator};

//! Message passing and the collectives built on it.

pub mod collective;
pub mod communicator;
pub mod wire;

pub use collective::{AllToAllPlan, all_gather, all_to_all_counts, all_to_allv};
pub use communicator::{CommTag, Communicator, NoComm, RayonComm, Wait, run_local_ranks};

//! Structural self-checks for the index tables built at setup.
//!
//! Builders call [`DebugInvariants::debug_assert_invariants`] on the finished
//! value. The check only runs in debug builds or with the `check-invariants`
//! feature; [`DebugInvariants::validate_invariants`] is always available.

use crate::mesh_error::MeshDdmError;

pub trait DebugInvariants {
    /// First violated invariant, reported as the error a caller would see.
    fn validate_invariants(&self) -> Result<(), MeshDdmError>;

    /// Panic on the first violated invariant when checks are compiled in.
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(err) = self.validate_invariants() {
            panic!("{} invariant violated: {err}", std::any::type_name::<Self>());
        }
    }
}

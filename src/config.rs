//! Option structs for the decomposition, the FCT blender and the tensor kernels.
//!
//! Every struct deserializes with missing fields taken from `Default`, so a
//! partial JSON document is a valid configuration.

use crate::mesh_error::MeshDdmError;
use serde::{Deserialize, Serialize};

/// Overlap settings of a domain decomposition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdmOptions {
    /// Element layers each subdomain extends into its neighbors.
    pub overlap_layers: usize,
    /// Halo width is `halo_factor * overlap_layers * mesh_size`.
    pub halo_factor: f64,
}

impl Default for DdmOptions {
    fn default() -> Self {
        Self {
            overlap_layers: 1,
            halo_factor: 2.0,
        }
    }
}

impl DdmOptions {
    /// Halo width in physical units for a mesh of characteristic size `h`.
    pub fn halo_width(&self, h: f64) -> f64 {
        self.halo_factor * self.overlap_layers as f64 * h
    }
}

/// Monotonicity treatment of the transport step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonoType {
    None,
    DiscUpw,
    DiscUpwFct,
    Rusanov,
    RusanovFct,
    ResDist,
    ResDistFct,
    ResDistLim,
    ResDistLimMass,
}

impl MonoType {
    pub const ALL: [MonoType; 9] = [
        MonoType::None,
        MonoType::DiscUpw,
        MonoType::DiscUpwFct,
        MonoType::Rusanov,
        MonoType::RusanovFct,
        MonoType::ResDist,
        MonoType::ResDistFct,
        MonoType::ResDistLim,
        MonoType::ResDistLimMass,
    ];

    /// Legacy integer id.
    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            MonoType::None => "None",
            MonoType::DiscUpw => "DiscUpw",
            MonoType::DiscUpwFct => "DiscUpwFct",
            MonoType::Rusanov => "Rusanov",
            MonoType::RusanovFct => "RusanovFct",
            MonoType::ResDist => "ResDist",
            MonoType::ResDistFct => "ResDistFct",
            MonoType::ResDistLim => "ResDistLim",
            MonoType::ResDistLimMass => "ResDistLimMass",
        }
    }

    /// Whether a flux-corrected blend follows the low-order update.
    pub fn is_fct(self) -> bool {
        matches!(
            self,
            MonoType::DiscUpwFct | MonoType::RusanovFct | MonoType::ResDistFct
        )
    }

    /// Whether bounds are computed inside the step rather than by the caller.
    pub fn bounds_inside_step(self) -> bool {
        matches!(self, MonoType::ResDistLim | MonoType::ResDistLimMass)
    }
}

impl TryFrom<i32> for MonoType {
    type Error = MeshDdmError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        usize::try_from(id)
            .ok()
            .and_then(|i| MonoType::ALL.get(i).copied())
            .ok_or(MeshDdmError::UnsupportedScheme(id))
    }
}

/// Neighborhood used to compute nodal solution bounds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stencil {
    /// Sparsity row of the convection matrix.
    Full,
    /// Nodes within `1/p` in the reference element, plus co-located nodes.
    Local,
    /// Nodes within `1.8/p`, which also reaches the diagonal neighbors.
    LocalAndDiag,
}

impl TryFrom<i32> for Stencil {
    type Error = MeshDdmError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Stencil::Full),
            1 => Ok(Stencil::Local),
            2 => Ok(Stencil::LocalAndDiag),
            _ => Err(MeshDdmError::UnsupportedStencil(id)),
        }
    }
}

/// Flux-corrected transport parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FctOptions {
    pub mono_type: MonoType,
    pub stencil: Stencil,
    /// Use sub-cell weights in residual distribution.
    pub sub_cell: bool,
    /// Sub-cell weight sharpness.
    pub gamma: f64,
    /// Bound-distance amplification of the limited schemes.
    pub beta: f64,
    /// Limiter strength of the limited-mass correction.
    pub limited_mass_beta: f64,
    /// Denominator guard.
    pub eps: f64,
}

impl Default for FctOptions {
    fn default() -> Self {
        Self {
            mono_type: MonoType::ResDistLim,
            stencil: Stencil::Full,
            sub_cell: true,
            gamma: 1e2,
            beta: 10.0,
            limited_mass_beta: 0.5,
            eps: 1e-15,
        }
    }
}

/// Limits of the generic tensor-kernel path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    pub max_d1d: usize,
    pub max_q1d: usize,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            max_d1d: 8,
            max_q1d: 8,
        }
    }
}

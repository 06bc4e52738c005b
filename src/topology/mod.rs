//! Geometry collaborators: the logical subdomain grid and the meshes that
//! feed the overlap builder.

pub mod cartesian;
pub mod grid;

pub use cartesian::CartesianMesh;
pub use grid::{Direction, SubdomainGrid};

/// The geometric queries the overlap builder needs from a mesh.
pub trait MeshGeometry {
    fn dim(&self) -> usize;
    fn num_elements(&self) -> usize;
    /// Centroid of element `e`; unused trailing components are zero.
    fn element_centroid(&self, e: usize) -> [f64; 3];
    /// `(pmin, pmax)` of the mesh.
    fn bounding_box(&self) -> ([f64; 3], [f64; 3]);
    /// Characteristic element size.
    fn mesh_size(&self) -> f64;
}

//! Uniform Cartesian box meshes in 1, 2 or 3 dimensions.

use crate::mesh_error::MeshDdmError;
use crate::topology::MeshGeometry;
use serde::{Deserialize, Serialize};

/// Box `[lo, hi]` split into `n[a]` equal elements along each active axis.
///
/// Elements are numbered lexicographically, x fastest:
/// `e = k·nx·ny + j·nx + i`. Inactive axes have `n = 1` and zero extent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartesianMesh {
    dim: usize,
    n: [usize; 3],
    lo: [f64; 3],
    hi: [f64; 3],
}

impl CartesianMesh {
    pub fn new(dim: usize, n: [usize; 3], lo: [f64; 3], hi: [f64; 3]) -> Result<Self, MeshDdmError> {
        if !(1..=3).contains(&dim) {
            return Err(MeshDdmError::InvalidGeometry(format!("dimension {dim}")));
        }
        let mut n = n;
        let mut lo = lo;
        let mut hi = hi;
        for a in 0..3 {
            if a >= dim {
                n[a] = 1;
                lo[a] = 0.0;
                hi[a] = 0.0;
                continue;
            }
            if n[a] == 0 {
                return Err(MeshDdmError::InvalidGeometry(format!("no elements along axis {a}")));
            }
            if !(hi[a] > lo[a]) {
                return Err(MeshDdmError::InvalidGeometry(format!(
                    "axis {a}: upper bound {} not above lower bound {}",
                    hi[a], lo[a]
                )));
            }
        }
        Ok(Self { dim, n, lo, hi })
    }

    /// Unit box `[0,1]^dim` with `n` elements per axis.
    pub fn unit(dim: usize, n: [usize; 3]) -> Result<Self, MeshDdmError> {
        Self::new(dim, n, [0.0; 3], [1.0; 3])
    }

    pub fn elements_per_axis(&self) -> [usize; 3] {
        self.n
    }

    pub fn lower(&self) -> [f64; 3] {
        self.lo
    }

    pub fn upper(&self) -> [f64; 3] {
        self.hi
    }

    /// Element width along `axis` (zero for inactive axes).
    pub fn h(&self, axis: usize) -> f64 {
        if axis >= self.dim {
            0.0
        } else {
            (self.hi[axis] - self.lo[axis]) / self.n[axis] as f64
        }
    }

    pub fn element_ijk(&self, e: usize) -> [usize; 3] {
        let plane = self.n[0] * self.n[1];
        let k = e / plane;
        let rem = e - k * plane;
        [rem % self.n[0], rem / self.n[0], k]
    }

    pub fn element_id(&self, ijk: [usize; 3]) -> usize {
        ijk[2] * self.n[0] * self.n[1] + ijk[1] * self.n[0] + ijk[0]
    }

    /// Sub-mesh covering elements `first[a]..last[a]` (exclusive) on each axis.
    pub fn sub_box(&self, first: [usize; 3], last: [usize; 3]) -> Result<Self, MeshDdmError> {
        let mut n = [1usize; 3];
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for a in 0..self.dim {
            if first[a] >= last[a] || last[a] > self.n[a] {
                return Err(MeshDdmError::InvalidGeometry(format!(
                    "axis {a}: element range {}..{} outside 0..{}",
                    first[a], last[a], self.n[a]
                )));
            }
            n[a] = last[a] - first[a];
            lo[a] = self.lo[a] + first[a] as f64 * self.h(a);
            hi[a] = self.lo[a] + last[a] as f64 * self.h(a);
        }
        Self::new(self.dim, n, lo, hi)
    }
}

impl MeshGeometry for CartesianMesh {
    fn dim(&self) -> usize {
        self.dim
    }

    fn num_elements(&self) -> usize {
        self.n.iter().product()
    }

    fn element_centroid(&self, e: usize) -> [f64; 3] {
        let ijk = self.element_ijk(e);
        let mut c = [0.0; 3];
        for a in 0..self.dim {
            c[a] = self.lo[a] + (ijk[a] as f64 + 0.5) * self.h(a);
        }
        c
    }

    fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        (self.lo, self.hi)
    }

    fn mesh_size(&self) -> f64 {
        (0..self.dim).map(|a| self.h(a)).fold(0.0, f64::max)
    }
}

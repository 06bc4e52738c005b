//! Directional element buckets of a subdomain's boundary layer.
//!
//! An element close to the lower face of axis `a` (and not on the first
//! subdomain of that axis) is flagged `neg[a]`; close to the upper face
//! (and not on the last subdomain) `pos[a]`. The element then lands in the
//! bucket of every non-zero direction whose components are all backed by a
//! flag, so corner elements are replicated into their edge and face buckets.

use crate::topology::{Direction, MeshGeometry, SubdomainGrid};

/// Per-axis proximity of one element to its subdomain's interior faces.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AxisFlags {
    pub neg: [bool; 3],
    pub pos: [bool; 3],
}

impl AxisFlags {
    /// Classify an element centroid against the subdomain box `[pmin, pmax]`.
    ///
    /// `ijk` and `extents` locate the subdomain in its grid; `width` is the
    /// halo width in physical units.
    pub fn classify(
        dim: usize,
        center: [f64; 3],
        (pmin, pmax): ([f64; 3], [f64; 3]),
        ijk: [usize; 3],
        extents: [usize; 3],
        width: f64,
    ) -> Self {
        let mut flags = Self::default();
        for d in 0..dim {
            flags.neg[d] = ijk[d] > 0 && center[d] < pmin[d] + width;
            flags.pos[d] = ijk[d] + 1 < extents[d] && center[d] > pmax[d] - width;
        }
        flags
    }

    /// Whether every component of `dir` is backed by a flag.
    fn admits(&self, dim: usize, dir: Direction) -> bool {
        let c = dir.ijk();
        (0..dim).all(|a| match c[a] {
            -1 => self.neg[a],
            1 => self.pos[a],
            _ => true,
        })
    }

    /// Non-zero directions this element belongs to, in direction-id order.
    pub fn directions(self, grid: &SubdomainGrid) -> impl Iterator<Item = Direction> + '_ {
        let dim = grid.dim();
        grid.directions()
            .filter(move |d| !d.is_center(dim) && self.admits(dim, *d))
    }
}

/// Element buckets of one subdomain, indexed by direction id. The center
/// slot stays empty.
pub fn overlap_elements<M: MeshGeometry>(
    grid: &SubdomainGrid,
    subdomain: usize,
    mesh: &M,
    width: f64,
) -> Vec<Vec<usize>> {
    let dim = grid.dim();
    let ijk = grid.subdomain_ijk(subdomain);
    let bbox = mesh.bounding_box();
    let mut buckets = vec![Vec::new(); grid.num_directions()];
    for e in 0..mesh.num_elements() {
        let flags = AxisFlags::classify(
            dim,
            mesh.element_centroid(e),
            bbox,
            ijk,
            grid.extents(),
            width,
        );
        for dir in flags.directions(grid) {
            buckets[dir.id()].push(e);
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::CartesianMesh;

    #[test]
    fn classify_respects_grid_position() {
        let bbox = ([0.0; 3], [1.0, 1.0, 0.0]);
        // first subdomain along x: never neg in x
        let f = AxisFlags::classify(2, [0.05, 0.05, 0.0], bbox, [0, 1, 0], [2, 2, 1], 0.1);
        assert_eq!(f.neg, [false, true, false]);
        assert_eq!(f.pos, [false, false, false]);
        let g = AxisFlags::classify(2, [0.95, 0.05, 0.0], bbox, [0, 1, 0], [2, 2, 1], 0.1);
        assert_eq!(g.neg, [false, true, false]);
        assert_eq!(g.pos, [true, false, false]);
    }

    #[test]
    fn corner_element_fills_face_and_corner_buckets() {
        let grid = SubdomainGrid::new(2, [2, 2, 1]).unwrap();
        let f = AxisFlags {
            neg: [false; 3],
            pos: [true, true, false],
        };
        let ids: Vec<usize> = f.directions(&grid).map(Direction::id).collect();
        // (+1,0), (0,+1), (+1,+1)
        assert_eq!(ids, vec![5, 7, 8]);
    }

    #[test]
    fn lower_left_subdomain_buckets() {
        let grid = SubdomainGrid::new(2, [2, 2, 1]).unwrap();
        let mesh = CartesianMesh::unit(2, [4, 4, 1]).unwrap();
        let b = overlap_elements(&grid, 0, &mesh, 0.25);
        assert_eq!(b.len(), 9);
        // east face: last column
        assert_eq!(b[5], vec![3, 7, 11, 15]);
        // north face: last row
        assert_eq!(b[7], vec![12, 13, 14, 15]);
        // north-east corner
        assert_eq!(b[8], vec![15]);
        // nothing toward the domain boundary or the center
        for d in [0, 1, 2, 3, 4, 6] {
            assert!(b[d].is_empty(), "direction {d}");
        }
    }
}

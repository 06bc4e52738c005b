//! Logical subdomain grid and neighbor directions.
//!
//! Subdomain `(i, j, k)` of an `nx × ny × nz` grid has id
//! `k·nx·ny + j·nx + i`. A direction is a vector in `{-1, 0, 1}^3` with id
//! `(k+1)·9 + (j+1)·3 + (i+1)`; planar grids pin the third component to the
//! `-1` sentinel, which folds the ids into `0..9`.

use crate::mesh_error::MeshDdmError;
use serde::{Deserialize, Serialize};

/// Offset to a neighboring subdomain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Direction {
    ijk: [i32; 3],
}

impl Direction {
    /// Direction from its components. For planar grids pass `k = -1`.
    pub fn new(i: i32, j: i32, k: i32) -> Self {
        Self { ijk: [i, j, k] }
    }

    pub fn ijk(self) -> [i32; 3] {
        self.ijk
    }

    /// Flat id of this direction.
    pub fn id(self) -> usize {
        direction_id(self.ijk)
    }

    /// Direction with id `id`; the inverse of [`Direction::id`].
    pub fn from_id(id: usize) -> Self {
        Self {
            ijk: direction_ijk(id),
        }
    }

    /// Negated direction. Only the first `dim` components flip; a planar
    /// direction keeps its `-1` sentinel.
    pub fn opposite(self, dim: usize) -> Self {
        let mut ijk = self.ijk;
        for c in ijk.iter_mut().take(dim) {
            *c = -*c;
        }
        Self { ijk }
    }

    /// True for the zero vector in the first `dim` components.
    pub fn is_center(self, dim: usize) -> bool {
        self.ijk.iter().take(dim).all(|&c| c == 0)
    }
}

/// Flat id of a direction vector.
pub fn direction_id(ijk: [i32; 3]) -> usize {
    ((ijk[2] + 1) * 9 + (ijk[1] + 1) * 3 + ijk[0] + 1) as usize
}

/// Components of the direction with id `id`.
pub fn direction_ijk(id: usize) -> [i32; 3] {
    let id = id as i32;
    let k = id / 9 - 1;
    let rem = id - (k + 1) * 9;
    [rem % 3 - 1, rem / 3 - 1, k]
}

/// `nx × ny × nz` grid of subdomains, planar (`dim = 2`) or volumetric (`dim = 3`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainGrid {
    dim: usize,
    n: [usize; 3],
}

impl SubdomainGrid {
    /// Planar grids must have `n[2] == 1`.
    pub fn new(dim: usize, n: [usize; 3]) -> Result<Self, MeshDdmError> {
        if dim != 2 && dim != 3 {
            return Err(MeshDdmError::InvalidGrid(format!(
                "dimension {dim} (only 2 and 3 are supported)"
            )));
        }
        if n.iter().any(|&c| c == 0) {
            return Err(MeshDdmError::InvalidGrid(format!("empty axis in {n:?}")));
        }
        if dim == 2 && n[2] != 1 {
            return Err(MeshDdmError::InvalidGrid(format!(
                "planar grid with nz = {}",
                n[2]
            )));
        }
        Ok(Self { dim, n })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn extents(&self) -> [usize; 3] {
        self.n
    }

    pub fn num_subdomains(&self) -> usize {
        self.n.iter().product()
    }

    /// Number of direction slots, center included: 9 or 27.
    pub fn num_directions(&self) -> usize {
        3usize.pow(self.dim as u32)
    }

    pub fn subdomain_id(&self, ijk: [usize; 3]) -> usize {
        subdomain_id(self.n, ijk)
    }

    pub fn subdomain_ijk(&self, id: usize) -> [usize; 3] {
        subdomain_ijk(self.n, id)
    }

    /// All valid directions, center included, in id order.
    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        (0..self.num_directions()).map(Direction::from_id)
    }

    /// Subdomain reached from `id` by stepping along `dir`, or `None` when the
    /// step leaves the grid.
    pub fn neighbor(&self, id: usize, dir: Direction) -> Option<usize> {
        let ijk = self.subdomain_ijk(id);
        let d = dir.ijk();
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let step = if axis < self.dim { d[axis] } else { 0 };
            let c = ijk[axis] as i64 + step as i64;
            if c < 0 || c >= self.n[axis] as i64 {
                return None;
            }
            out[axis] = c as usize;
        }
        Some(self.subdomain_id(out))
    }
}

/// Flat id of subdomain `(i, j, k)` in a grid of extents `n`.
pub fn subdomain_id(n: [usize; 3], ijk: [usize; 3]) -> usize {
    ijk[2] * n[0] * n[1] + ijk[1] * n[0] + ijk[0]
}

/// Grid coordinates of subdomain `id` in a grid of extents `n`.
pub fn subdomain_ijk(n: [usize; 3], id: usize) -> [usize; 3] {
    let plane = n[0] * n[1];
    let k = id / plane;
    let rem = id - k * plane;
    [rem % n[0], rem / n[0], k]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_directions_fold_into_nine_slots() {
        let g = SubdomainGrid::new(2, [3, 2, 1]).unwrap();
        let ids: Vec<usize> = g.directions().map(Direction::id).collect();
        assert_eq!(ids, (0..9).collect::<Vec<_>>());
        assert_eq!(Direction::from_id(4).ijk(), [0, 0, -1]);
        assert!(Direction::from_id(4).is_center(2));
        assert_eq!(Direction::new(1, -1, -1).opposite(2).ijk(), [-1, 1, -1]);
    }

    #[test]
    fn volumetric_center_is_13() {
        assert_eq!(direction_id([0, 0, 0]), 13);
        assert_eq!(direction_ijk(13), [0, 0, 0]);
        assert_eq!(direction_ijk(0), [-1, -1, -1]);
        assert_eq!(direction_ijk(26), [1, 1, 1]);
    }

    #[test]
    fn subdomain_ids_roundtrip() {
        let n = [3, 4, 2];
        for id in 0..24 {
            assert_eq!(subdomain_id(n, subdomain_ijk(n, id)), id);
        }
        assert_eq!(subdomain_ijk(n, 17), [2, 1, 1]);
    }

    #[test]
    fn neighbors_stop_at_the_grid_edge() {
        let g = SubdomainGrid::new(2, [2, 2, 1]).unwrap();
        let east = Direction::new(1, 0, -1);
        assert_eq!(g.neighbor(0, east), Some(1));
        assert_eq!(g.neighbor(1, east), None);
        assert_eq!(g.neighbor(0, Direction::new(1, 1, -1)), Some(3));
        assert_eq!(g.neighbor(3, Direction::new(-1, -1, -1)), Some(0));
    }

    #[test]
    fn rejects_bad_grids() {
        assert!(SubdomainGrid::new(1, [2, 1, 1]).is_err());
        assert!(SubdomainGrid::new(2, [2, 2, 2]).is_err());
        assert!(SubdomainGrid::new(3, [2, 0, 2]).is_err());
    }
}

//! Halo exchange between neighboring subdomains.
//!
//! For every listed subdomain `i0` and every non-zero direction `d` that
//! stays inside the grid, the owner of `i0` sends `x[i0]` restricted to
//! `dofs(i0, d)`; the owner of the neighbor `i1` writes the values at
//! `dofs(i1, -d)` of an otherwise zero vector. Ranks that own neither side
//! of a slot take no part in it.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{as_bytes, decode_pod_vec};
use crate::mesh_error::MeshDdmError;
use crate::overlap::OverlapMaps;
use crate::overlap::delta::{Overwrite, scatter};
use crate::topology::{Direction, SubdomainGrid};

/// Base tag of halo messages; slot `(i0, d)` uses `base + i0·ndir + d`.
/// With the MPI minimum tag bound this covers 1061 subdomains in 3D.
pub const HALO_TAG: CommTag = CommTag::new(0x1000);

/// Values received by each owned subdomain, per direction.
///
/// A slot is `None` when no neighbor exists in that direction or the
/// neighbor was not part of the exchange.
#[derive(Clone, Debug, Default)]
pub struct OverlapSolutions {
    dim: usize,
    slots: Vec<Vec<Option<Vec<f64>>>>,
}

impl OverlapSolutions {
    fn new(dim: usize, nsub: usize, ndir: usize) -> Self {
        Self {
            dim,
            slots: vec![vec![None; ndir]; nsub],
        }
    }

    /// Full-length subdomain vector filled from direction `dir`.
    pub fn get(&self, subdomain: usize, dir: Direction) -> Option<&[f64]> {
        self.slots
            .get(subdomain)?
            .get(dir.id())?
            .as_deref()
    }

    /// Every filled slot as `(subdomain, direction, values)`.
    pub fn received(&self) -> impl Iterator<Item = (usize, Direction, &[f64])> + '_ {
        self.slots.iter().enumerate().flat_map(|(ip, dirs)| {
            dirs.iter().enumerate().filter_map(move |(d, v)| {
                v.as_deref().map(|v| (ip, Direction::from_id(d), v))
            })
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

struct Slot {
    i0: usize,
    d: Direction,
    i1: usize,
    tag: CommTag,
}

fn slots(grid: &SubdomainGrid, ids: &[usize]) -> Vec<Slot> {
    let dim = grid.dim();
    let ndir = grid.num_directions();
    let mut out = Vec::new();
    for &i0 in ids {
        for d in grid.directions() {
            if d.is_center(dim) {
                continue;
            }
            let Some(i1) = grid.neighbor(i0, d) else {
                continue;
            };
            out.push(Slot {
                i0,
                d,
                i1,
                tag: HALO_TAG.offset((i0 * ndir + d.id()) as u32),
            });
        }
    }
    out
}

/// Send each listed subdomain's overlap values to its neighbors.
///
/// `x` runs parallel to `ids`; entries of subdomains this rank does not own
/// are ignored and may be `None`.
pub fn transfer_to_neighbors<C: Communicator>(
    comm: &C,
    grid: &SubdomainGrid,
    subdomain_rank: &[usize],
    maps: &OverlapMaps,
    ids: &[usize],
    x: &[Option<Vec<f64>>],
) -> Result<OverlapSolutions, MeshDdmError> {
    if ids.len() != x.len() {
        return Err(MeshDdmError::SizeMismatch {
            what: "transfer_to_neighbors ids/vectors",
            expected: ids.len(),
            found: x.len(),
        });
    }
    let me = comm.rank();
    let dim = grid.dim();
    let plan = slots(grid, ids);
    if let Some(tag) = plan.iter().map(|s| s.tag.as_u32()).max() {
        if tag > comm.max_tag() {
            return Err(MeshDdmError::TagOutOfRange {
                tag,
                max: comm.max_tag(),
            });
        }
    }

    // source vectors of the subdomains we send from, by id
    let mut source: Vec<Option<&[f64]>> = vec![None; grid.num_subdomains()];
    for (&ip, v) in ids.iter().zip(x) {
        if subdomain_rank[ip] != me {
            continue;
        }
        let v = v.as_deref().ok_or(MeshDdmError::MissingSubdomainVector(ip))?;
        crate::mesh_error::check_len("subdomain vector", maps.num_true_dofs(ip), v.len())?;
        source[ip] = Some(v);
    }

    // 1) post all receives
    let mut recvs = Vec::new();
    for (s, slot) in plan.iter().enumerate() {
        let src = subdomain_rank[slot.i0];
        if subdomain_rank[slot.i1] == me && src != me {
            let count = maps.dofs(slot.i1, slot.d.opposite(dim)).len();
            recvs.push((s, src, comm.irecv(src, slot.tag, count * std::mem::size_of::<f64>())));
        }
    }

    // 2) post all sends; same-rank slots are delivered directly
    let mut sends = Vec::new();
    let mut local = Vec::new();
    for (s, slot) in plan.iter().enumerate() {
        if subdomain_rank[slot.i0] != me {
            continue;
        }
        let Some(xs) = source[slot.i0] else {
            continue;
        };
        let buf: Vec<f64> = maps.dofs(slot.i0, slot.d).iter().map(|&k| xs[k]).collect();
        let dest = subdomain_rank[slot.i1];
        if dest == me {
            local.push((s, buf));
        } else {
            sends.push(comm.isend(dest, slot.tag, as_bytes(&buf)));
        }
    }
    log::debug!(
        "rank {me}: halo exchange posts {} sends, {} receives, {} local copies",
        sends.len(),
        recvs.len(),
        local.len()
    );

    // 3) wait for receives, then place everything
    let mut out = OverlapSolutions::new(dim, grid.num_subdomains(), grid.num_directions());
    let mut maybe_err = None;
    let mut place = |s: usize, values: Vec<f64>, from: usize| -> Result<(), MeshDdmError> {
        let slot = &plan[s];
        let back = slot.d.opposite(dim);
        let positions = maps.dofs(slot.i1, back);
        if positions.len() != values.len() {
            return Err(MeshDdmError::comm(
                from,
                format!(
                    "subdomain {} direction {:?}: {} values for {} overlap dofs",
                    slot.i1,
                    back.ijk(),
                    values.len(),
                    positions.len()
                ),
            ));
        }
        let mut full = vec![0.0; maps.num_true_dofs(slot.i1)];
        scatter::<Overwrite>(&mut full, positions, &values);
        out.slots[slot.i1][back.id()] = Some(full);
        Ok(())
    };
    for (s, src, h) in recvs {
        let res = h
            .wait()
            .ok_or_else(|| MeshDdmError::comm(src, "no halo data received"))
            .and_then(|data| {
                decode_pod_vec::<f64>(&data).map_err(|e| MeshDdmError::comm(src, e.to_string()))
            })
            .and_then(|vals| place(s, vals, src));
        if let Err(e) = res {
            maybe_err.get_or_insert(e);
        }
    }
    for (s, buf) in local {
        if let Err(e) = place(s, buf, me) {
            maybe_err.get_or_insert(e);
        }
    }

    // 4) drain sends
    for h in sends {
        let _ = h.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{MPI_TAG_UB_MIN, NoComm};
    use crate::config::DdmOptions;
    use crate::data::LagrangeSpace;
    use crate::partition::{RankAssignment, SubdomainPartition};
    use crate::topology::{CartesianMesh, MeshGeometry};

    /// Single rank with an MPI-sized tag space.
    struct SmallTags;

    impl Communicator for SmallTags {
        type SendHandle = ();
        type RecvHandle = ();

        fn rank(&self) -> usize {
            0
        }
        fn size(&self) -> usize {
            1
        }
        fn max_tag(&self) -> u32 {
            MPI_TAG_UB_MIN
        }
        fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}
        fn irecv(&self, _peer: usize, _tag: CommTag, _len: usize) {}
    }

    fn maps(n: [usize; 3], sub: [usize; 3]) -> (SubdomainPartition, OverlapMaps) {
        let mesh = CartesianMesh::unit(2, n).unwrap();
        let grid = SubdomainGrid::new(2, sub).unwrap();
        let ne = mesh.num_elements();
        let part = SubdomainPartition::cartesian(
            &mesh,
            grid,
            1,
            &RankAssignment::RoundRobin(1),
            0,
            0..ne,
        )
        .unwrap();
        let spaces = part
            .build_spaces(|m| LagrangeSpace::new(m.clone(), 1))
            .unwrap();
        let width = DdmOptions::default().halo_factor * part.mesh_size();
        let maps = OverlapMaps::build(&part, &spaces, width).unwrap();
        (part, maps)
    }

    #[test]
    fn halo_tags_fit_the_mpi_minimum_for_a_ten_cubed_grid() {
        let grid = SubdomainGrid::new(3, [10, 10, 10]).unwrap();
        let ids: Vec<usize> = (0..grid.num_subdomains()).collect();
        let plan = slots(&grid, &ids);
        let max = plan.iter().map(|s| s.tag.as_u32()).max().unwrap();
        assert!(max <= MPI_TAG_UB_MIN);
        let mut tags: Vec<u32> = plan.iter().map(|s| s.tag.as_u32()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), plan.len());
    }

    #[test]
    fn exchange_with_a_small_grid_runs_under_the_mpi_bound() {
        let (part, maps) = maps([4, 4, 1], [2, 2, 1]);
        let x: Vec<Option<Vec<f64>>> = (0..4)
            .map(|ip| Some(vec![1.0; maps.num_true_dofs(ip)]))
            .collect();
        let ids: Vec<usize> = (0..4).collect();
        let ranks = part.subdomain_ranks();
        let sol = transfer_to_neighbors(&SmallTags, part.grid(), ranks, &maps, &ids, &x).unwrap();
        let plain = transfer_to_neighbors(&NoComm, part.grid(), ranks, &maps, &ids, &x).unwrap();
        assert_eq!(sol.received().count(), 12);
        assert!(sol.received().zip(plain.received()).all(|(a, b)| a == b));
    }

    #[test]
    fn oversized_grid_reports_the_tag_instead_of_sending() {
        // 11^3 subdomains need tags past 32767; nothing is touched before the check
        let (_, maps) = maps([4, 4, 1], [2, 2, 1]);
        let grid = SubdomainGrid::new(3, [11, 11, 11]).unwrap();
        let n = grid.num_subdomains();
        let ids: Vec<usize> = (0..n).collect();
        let x: Vec<Option<Vec<f64>>> = vec![None; n];
        match transfer_to_neighbors(&SmallTags, &grid, &vec![0; n], &maps, &ids, &x) {
            Err(MeshDdmError::TagOutOfRange { tag, max }) => {
                assert_eq!(max, MPI_TAG_UB_MIN);
                assert!(tag > max);
            }
            other => panic!("unexpected {:?}", other.map(|s| s.received().count())),
        }
    }
}

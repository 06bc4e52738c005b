//! Two-phase construction of the subdomain ↔ global true-DOF bridge.
//!
//! Phase A ships, for every subdomain, the global true DOFs touched by this
//! rank's global elements to the subdomain owner, which reassembles them in
//! the subdomain's own element-DOF order. Phase B routes each reassembled id
//! to the rank owning it in the global space.

use crate::algs::collective::{AllToAllPlan, all_to_allv};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{Records, push_record};
use crate::data::space::{ElementDofs, GlobalDofNumbering, SubdomainSpace, decode_dof};
use crate::dofmap::resolver::TdofOffsets;
use crate::mesh_error::MeshDdmError;
use crate::partition::SubdomainPartition;

const PHASE_A_TAG: CommTag = CommTag::new(0x0200);
const PHASE_B_TAG: CommTag = CommTag::new(0x0210);

/// Per-subdomain true-DOF correspondence, seen from one rank.
#[derive(Clone, Debug, Default)]
pub struct SubdomainBridge {
    /// `gtrue[ip][i]`: global true DOF of local true DOF `i` of owned subdomain `ip`.
    gtrue: Vec<Vec<u64>>,
    /// `ltrue[ip]`: the global true DOFs of subdomain `ip` owned by this rank,
    /// in the order they appear in the owner's `gtrue[ip]`.
    ltrue: Vec<Vec<u64>>,
}

impl SubdomainBridge {
    pub fn build<C, G, S>(
        comm: &C,
        partition: &SubdomainPartition,
        global: &G,
        spaces: &[Option<S>],
        offsets: &TdofOffsets,
    ) -> Result<Self, MeshDdmError>
    where
        C: Communicator,
        G: GlobalDofNumbering,
        S: SubdomainSpace,
    {
        crate::mesh_error::check_len("subdomain spaces", partition.num_subdomains(), spaces.len())?;
        let gtrue = phase_a(comm, partition, global, spaces)?;
        let ltrue = phase_b(comm, partition, &gtrue, offsets)?;
        log::info!(
            "rank {}: dof bridge holds {} subdomain dofs, {} owned contributions",
            comm.rank(),
            gtrue.iter().map(Vec::len).sum::<usize>(),
            ltrue.iter().map(Vec::len).sum::<usize>()
        );
        Ok(Self { gtrue, ltrue })
    }

    /// Global true DOFs of owned subdomain `ip`, index-aligned with its local true DOFs.
    pub fn global_tdofs(&self, ip: usize) -> &[u64] {
        self.gtrue.get(ip).map_or(&[], Vec::as_slice)
    }

    /// Global true DOFs of subdomain `ip` that this rank owns.
    pub fn owned_tdofs(&self, ip: usize) -> &[u64] {
        self.ltrue.get(ip).map_or(&[], Vec::as_slice)
    }

    pub fn num_subdomains(&self) -> usize {
        self.gtrue.len()
    }
}

/// Send `records[r]` to rank `r` and return everything received, in rank order.
fn route_records<C: Communicator>(
    comm: &C,
    tag: CommTag,
    records: Vec<Vec<u64>>,
) -> Result<Vec<u64>, MeshDdmError> {
    let counts = records.iter().map(Vec::len).collect();
    let plan = AllToAllPlan::negotiate(comm, tag, counts)?;
    let send: Vec<u64> = records.into_iter().flatten().collect();
    all_to_allv(comm, tag.offset(1), &plan, &send)
}

fn phase_a<C, G, S>(
    comm: &C,
    partition: &SubdomainPartition,
    global: &G,
    spaces: &[Option<S>],
) -> Result<Vec<Vec<u64>>, MeshDdmError>
where
    C: Communicator,
    G: GlobalDofNumbering,
    S: SubdomainSpace,
{
    let nsub = partition.num_subdomains();
    let offset = partition.my_element_offset();
    let mut records = vec![Vec::new(); comm.size()];
    let mut edofs = Vec::new();
    let mut tdofs = Vec::new();
    for ip in 0..nsub {
        let elems = partition.local_element_map(ip);
        if elems.is_empty() {
            continue;
        }
        tdofs.clear();
        for &e in elems {
            let local = e.checked_sub(offset).filter(|&l| l < global.num_elements()).ok_or_else(|| {
                MeshDdmError::InvalidPartition(format!(
                    "subdomain {ip}: element {e} is not owned by rank {}",
                    comm.rank()
                ))
            })?;
            global.element_dofs(local, &mut edofs);
            tdofs.extend(edofs.iter().map(|&d| global.global_tdof_number(decode_dof(d))));
        }
        push_record(&mut records[partition.subdomain_rank(ip)], ip, &tdofs);
    }

    let recv = route_records(comm, PHASE_A_TAG, records)?;

    // concatenation in sender-rank order follows ascending global element id
    let mut gathered: Vec<Vec<u64>> = vec![Vec::new(); nsub];
    for rec in Records::new(&recv) {
        let (ip, payload) = rec?;
        if ip >= nsub || !partition.owns(ip) {
            return Err(MeshDdmError::WireDecode(format!(
                "phase A record for subdomain {ip} reached a rank that does not own it"
            )));
        }
        gathered[ip].extend_from_slice(payload);
    }

    let mut gtrue = vec![Vec::new(); nsub];
    for ip in partition.owned_subdomains() {
        let space = spaces[ip]
            .as_ref()
            .ok_or(MeshDdmError::MissingSubdomainSpace(ip))?;
        gtrue[ip] = align(ip, space, &gathered[ip])?;
        log::debug!(
            "subdomain {ip}: {} element dofs reassembled into {} true dofs",
            gathered[ip].len(),
            gtrue[ip].len()
        );
    }
    Ok(gtrue)
}

/// Walk the subdomain's element dofs in order, consuming `flat` one id per
/// element dof.
fn align<S: ElementDofs>(ip: usize, space: &S, flat: &[u64]) -> Result<Vec<u64>, MeshDdmError> {
    let mut edofs = Vec::new();
    let mut expected = 0;
    for e in 0..space.num_elements() {
        space.element_dofs(e, &mut edofs);
        expected += edofs.len();
    }
    if expected != flat.len() {
        return Err(MeshDdmError::DofCountMismatch {
            subdomain: ip,
            expected,
            found: flat.len(),
        });
    }

    let mut map: Vec<Option<u64>> = vec![None; space.num_true_dofs()];
    let mut k = 0;
    for e in 0..space.num_elements() {
        space.element_dofs(e, &mut edofs);
        for &d in &edofs {
            let l = decode_dof(d);
            let g = flat[k];
            k += 1;
            let slot = map.get_mut(l).ok_or(MeshDdmError::DofCountMismatch {
                subdomain: ip,
                expected: space.num_true_dofs(),
                found: l + 1,
            })?;
            match *slot {
                None => *slot = Some(g),
                Some(prev) if prev == g => {}
                Some(prev) => {
                    return Err(MeshDdmError::ConflictingDofMap {
                        subdomain: ip,
                        local: l,
                        first: prev,
                        second: g,
                    });
                }
            }
        }
    }
    let assigned = map.iter().filter(|m| m.is_some()).count();
    if assigned != map.len() {
        return Err(MeshDdmError::DofCountMismatch {
            subdomain: ip,
            expected: map.len(),
            found: assigned,
        });
    }
    Ok(map.into_iter().flatten().collect())
}

fn phase_b<C: Communicator>(
    comm: &C,
    partition: &SubdomainPartition,
    gtrue: &[Vec<u64>],
    offsets: &TdofOffsets,
) -> Result<Vec<Vec<u64>>, MeshDdmError> {
    let size = comm.size();
    let me = comm.rank();
    if offsets.num_ranks() != size {
        return Err(MeshDdmError::SizeMismatch {
            what: "true-dof offset table",
            expected: size,
            found: offsets.num_ranks(),
        });
    }
    let nsub = partition.num_subdomains();
    let mut records = vec![Vec::new(); size];
    let mut per_rank: Vec<Vec<u64>> = vec![Vec::new(); size];
    for ip in partition.owned_subdomains() {
        per_rank.iter_mut().for_each(Vec::clear);
        for &g in &gtrue[ip] {
            per_rank[offsets.rank_of(g)].push(g);
        }
        for (r, ids) in per_rank.iter().enumerate() {
            if !ids.is_empty() {
                push_record(&mut records[r], ip, ids);
            }
        }
    }

    let recv = route_records(comm, PHASE_B_TAG, records)?;

    let mut ltrue = vec![Vec::new(); nsub];
    for rec in Records::new(&recv) {
        let (ip, payload) = rec?;
        if ip >= nsub {
            return Err(MeshDdmError::WireDecode(format!(
                "phase B record for unknown subdomain {ip}"
            )));
        }
        ltrue[ip].extend(payload.iter().copied().filter(|&g| offsets.rank_of(g) == me));
    }
    Ok(ltrue)
}

//! Value transfer between the distributed global vector and subdomain vectors.
//!
//! Messages carry bare values; both sides walk the bridge lists in the same
//! order so positions agree without explicit ids.

use crate::algs::collective::{AllToAllPlan, all_to_allv};
use crate::algs::communicator::{CommTag, Communicator};
use crate::dofmap::bridge::SubdomainBridge;
use crate::dofmap::resolver::TdofOffsets;
use crate::mesh_error::{MeshDdmError, check_len};
use crate::overlap::delta::{Accumulate, Fuse, Overwrite};
use crate::partition::SubdomainPartition;

const G2S_TAG: CommTag = CommTag::new(0x0300);
const S2G_TAG: CommTag = CommTag::new(0x0310);

/// Borrowed view of everything a transfer needs.
pub struct TransferCtx<'a> {
    pub partition: &'a SubdomainPartition,
    pub bridge: &'a SubdomainBridge,
    pub offsets: &'a TdofOffsets,
}

impl TransferCtx<'_> {
    fn local_index(&self, me: usize, g: u64, len: usize) -> Result<usize, MeshDdmError> {
        let start = self.offsets.as_slice()[me];
        g.checked_sub(start)
            .map(|d| d as usize)
            .filter(|&d| d < len)
            .ok_or_else(|| {
                MeshDdmError::InvalidPartition(format!(
                    "true dof {g} outside the {len} values owned by rank {me}"
                ))
            })
    }
}

fn exchange<C: Communicator>(
    comm: &C,
    tag: CommTag,
    buckets: Vec<Vec<f64>>,
) -> Result<(AllToAllPlan, Vec<f64>), MeshDdmError> {
    let counts = buckets.iter().map(Vec::len).collect();
    let plan = AllToAllPlan::negotiate(comm, tag, counts)?;
    let send: Vec<f64> = buckets.into_iter().flatten().collect();
    let recv = all_to_allv(comm, tag.offset(1), &plan, &send)?;
    Ok((plan, recv))
}

/// Restrict the owned slice `y` of the global vector onto every owned subdomain.
///
/// Returns one full-length vector per subdomain; `None` for subdomains owned
/// elsewhere.
pub fn global_to_subdomains<C: Communicator>(
    comm: &C,
    ctx: &TransferCtx<'_>,
    y: &[f64],
) -> Result<Vec<Option<Vec<f64>>>, MeshDdmError> {
    let me = comm.rank();
    let nsub = ctx.partition.num_subdomains();
    let mut buckets = vec![Vec::new(); comm.size()];
    for ip in 0..nsub {
        let dest = ctx.partition.subdomain_rank(ip);
        for &g in ctx.bridge.owned_tdofs(ip) {
            buckets[dest].push(y[ctx.local_index(me, g, y.len())?]);
        }
    }

    let (plan, recv) = exchange(comm, G2S_TAG, buckets)?;

    let mut cursor = plan.recv_displs.clone();
    let mut out = vec![None; nsub];
    for ip in ctx.partition.owned_subdomains() {
        let gt = ctx.bridge.global_tdofs(ip);
        let mut x = vec![0.0; gt.len()];
        for (slot, &g) in x.iter_mut().zip(gt) {
            let r = ctx.offsets.rank_of(g);
            let at = cursor[r];
            if at >= plan.recv_displs[r] + plan.recv_counts[r] {
                return Err(MeshDdmError::comm(r, format!("ran out of values for subdomain {ip}")));
            }
            Overwrite::fuse(slot, recv[at]);
            cursor[r] += 1;
        }
        out[ip] = Some(x);
    }
    Ok(out)
}

/// Add every owned subdomain vector into the owned slice `y` of the global vector.
///
/// `x` is indexed by subdomain id; entries of subdomains owned elsewhere are
/// ignored.
pub fn subdomains_to_global<C: Communicator>(
    comm: &C,
    ctx: &TransferCtx<'_>,
    x: &[Option<Vec<f64>>],
    y: &mut [f64],
) -> Result<(), MeshDdmError> {
    let me = comm.rank();
    let nsub = ctx.partition.num_subdomains();
    check_len("subdomain vectors", nsub, x.len())?;
    let mut buckets = vec![Vec::new(); comm.size()];
    for ip in ctx.partition.owned_subdomains() {
        let gt = ctx.bridge.global_tdofs(ip);
        let xs = x[ip]
            .as_deref()
            .ok_or(MeshDdmError::MissingSubdomainVector(ip))?;
        check_len("subdomain vector", gt.len(), xs.len())?;
        for (&g, &v) in gt.iter().zip(xs) {
            buckets[ctx.offsets.rank_of(g)].push(v);
        }
    }

    let (plan, recv) = exchange(comm, S2G_TAG, buckets)?;

    let mut cursor = plan.recv_displs.clone();
    for ip in 0..nsub {
        let src = ctx.partition.subdomain_rank(ip);
        for &g in ctx.bridge.owned_tdofs(ip) {
            let at = cursor[src];
            if at >= plan.recv_displs[src] + plan.recv_counts[src] {
                return Err(MeshDdmError::comm(src, format!("ran out of values for subdomain {ip}")));
            }
            let l = ctx.local_index(me, g, y.len())?;
            Accumulate::fuse(&mut y[l], recv[at]);
            cursor[src] += 1;
        }
    }
    Ok(())
}

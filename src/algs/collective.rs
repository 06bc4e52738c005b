//! Collectives built on the point-to-point [`Communicator`].
//!
//! Every rank must call the same collective with the same tag. Messages to
//! self never reach the backend. All functions drain every posted send and
//! receive before returning, even when a receive fails.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{as_bytes, decode_pod_vec};
use crate::mesh_error::{MeshDdmError, check_len};
use bytemuck::{Pod, Zeroable};

/// Gather one value from every rank, in rank order.
pub fn all_gather<C, T>(comm: &C, tag: CommTag, value: T) -> Result<Vec<T>, MeshDdmError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size();
    let width = std::mem::size_of::<T>();

    // 1) post all receives
    let recvs: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|r| (r, comm.irecv(r, tag, width)))
        .collect();

    // 2) post all sends
    let sends: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|r| comm.isend(r, tag, as_bytes(std::slice::from_ref(&value))))
        .collect();

    // 3) collect
    let mut out = vec![value; size];
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match decode_one::<T>(peer, h.wait()) {
            Ok(v) => out[peer] = v,
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn decode_one<T: Pod>(peer: usize, data: Option<Vec<u8>>) -> Result<T, MeshDdmError> {
    let data = data.ok_or_else(|| MeshDdmError::comm(peer, "no data received"))?;
    let mut vals = decode_pod_vec::<T>(&data).map_err(|e| MeshDdmError::comm(peer, e.to_string()))?;
    if vals.len() != 1 {
        return Err(MeshDdmError::comm(
            peer,
            format!("expected one value, got {}", vals.len()),
        ));
    }
    vals.pop()
        .ok_or_else(|| MeshDdmError::comm(peer, "empty payload"))
}

/// Exchange one count per peer: entry `r` of the result is what rank `r`
/// announced for us.
pub fn all_to_all_counts<C: Communicator>(
    comm: &C,
    tag: CommTag,
    send_counts: &[usize],
) -> Result<Vec<usize>, MeshDdmError> {
    let me = comm.rank();
    let size = comm.size();
    check_len("all_to_all send counts", size, send_counts.len())?;

    let recvs: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|r| (r, comm.irecv(r, tag, std::mem::size_of::<u64>())))
        .collect();
    let wire: Vec<u64> = send_counts.iter().map(|&c| c as u64).collect();
    let sends: Vec<_> = (0..size)
        .filter(|&r| r != me)
        .map(|r| comm.isend(r, tag, as_bytes(&wire[r..r + 1])))
        .collect();

    let mut out = vec![0usize; size];
    out[me] = send_counts[me];
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match decode_one::<u64>(peer, h.wait()) {
            Ok(v) => out[peer] = v as usize,
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Counts and displacements of one variable-size all-to-all.
///
/// Built fresh for every exchange; nothing is cached between calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllToAllPlan {
    pub send_counts: Vec<usize>,
    pub send_displs: Vec<usize>,
    pub recv_counts: Vec<usize>,
    pub recv_displs: Vec<usize>,
}

fn displacements(counts: &[usize]) -> Vec<usize> {
    let mut acc = 0;
    counts
        .iter()
        .map(|&c| {
            let d = acc;
            acc += c;
            d
        })
        .collect()
}

impl AllToAllPlan {
    /// Negotiate receive counts for the given send counts.
    pub fn negotiate<C: Communicator>(
        comm: &C,
        tag: CommTag,
        send_counts: Vec<usize>,
    ) -> Result<Self, MeshDdmError> {
        let recv_counts = all_to_all_counts(comm, tag, &send_counts)?;
        log::debug!(
            "rank {}: all-to-all plan sends {} values, receives {}",
            comm.rank(),
            send_counts.iter().sum::<usize>(),
            recv_counts.iter().sum::<usize>()
        );
        Ok(Self {
            send_displs: displacements(&send_counts),
            recv_displs: displacements(&recv_counts),
            send_counts,
            recv_counts,
        })
    }

    pub fn send_total(&self) -> usize {
        self.send_counts.iter().sum()
    }

    pub fn recv_total(&self) -> usize {
        self.recv_counts.iter().sum()
    }

    /// Range of the send buffer destined for `rank`.
    pub fn send_range(&self, rank: usize) -> std::ops::Range<usize> {
        self.send_displs[rank]..self.send_displs[rank] + self.send_counts[rank]
    }

    /// Range of the receive buffer filled by `rank`.
    pub fn recv_range(&self, rank: usize) -> std::ops::Range<usize> {
        self.recv_displs[rank]..self.recv_displs[rank] + self.recv_counts[rank]
    }
}

/// Variable-size all-to-all: segment `r` of `send` goes to rank `r`; the
/// result holds the segments received from every rank, in rank order.
pub fn all_to_allv<C, T>(
    comm: &C,
    tag: CommTag,
    plan: &AllToAllPlan,
    send: &[T],
) -> Result<Vec<T>, MeshDdmError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size();
    check_len("all_to_allv send buffer", plan.send_total(), send.len())?;
    let width = std::mem::size_of::<T>();

    let recvs: Vec<_> = (0..size)
        .filter(|&r| r != me && plan.recv_counts[r] > 0)
        .map(|r| (r, comm.irecv(r, tag, plan.recv_counts[r] * width)))
        .collect();
    let sends: Vec<_> = (0..size)
        .filter(|&r| r != me && plan.send_counts[r] > 0)
        .map(|r| comm.isend(r, tag, as_bytes(&send[plan.send_range(r)])))
        .collect();

    let mut out = vec![<T as Zeroable>::zeroed(); plan.recv_total()];
    let mut maybe_err = None;
    if plan.send_counts[me] != plan.recv_counts[me] {
        maybe_err = Some(MeshDdmError::comm(me, "self segment size disagrees"));
    } else {
        out[plan.recv_range(me)].copy_from_slice(&send[plan.send_range(me)]);
    }
    for (peer, h) in recvs {
        let res = h
            .wait()
            .ok_or_else(|| MeshDdmError::comm(peer, "no data received"))
            .and_then(|data| {
                decode_pod_vec::<T>(&data).map_err(|e| MeshDdmError::comm(peer, e.to_string()))
            })
            .and_then(|vals| {
                if vals.len() == plan.recv_counts[peer] {
                    Ok(vals)
                } else {
                    Err(MeshDdmError::comm(
                        peer,
                        format!(
                            "expected {} values, got {}",
                            plan.recv_counts[peer],
                            vals.len()
                        ),
                    ))
                }
            });
        match res {
            Ok(vals) if maybe_err.is_none() => out[plan.recv_range(peer)].copy_from_slice(&vals),
            Ok(_) => {}
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

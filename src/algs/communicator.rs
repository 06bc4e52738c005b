//! Thin façade over intra-process (in-memory) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices*. Send handles own a copy of the
//! outgoing bytes, so a caller's buffer never has to outlive the call that
//! posted it. All handles are **waitable** but non-blocking; exchange code
//! calls `.wait()` before it trusts that a buffer is ready.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Message tag. Tags disambiguate concurrent messages between one pair of ranks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u32);

impl CommTag {
    #[inline]
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Tag shifted by `k`, used to give each phase of an operation its own channel.
    #[inline]
    pub const fn offset(self, k: u32) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Non-blocking point-to-point messaging between ranks.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the calling process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;

    /// Largest tag the backend accepts.
    fn max_tag(&self) -> u32 {
        u32::MAX
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Self::RecvHandle;
}

/// Smallest tag upper bound every MPI implementation must support.
pub const MPI_TAG_UB_MIN: u32 = 32767;

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator. Every message would be addressed to the caller
/// itself, which exchange code short-circuits before reaching the backend.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: CommTag, _len: usize) {}
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u32); // (src, dst, tag)

/// Shared mailbox of one in-process universe. Each `(src, dst, tag)` channel is FIFO.
#[derive(Debug, Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        self.slots.entry(key).or_default().push_back(data);
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        let mut queue = self.slots.get_mut(key)?;
        queue.pop_front()
    }
}

/// Pending receive on a [`RayonComm`] mailbox.
pub struct LocalHandle {
    key: Key,
    mailbox: Arc<Mailbox>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut spins = 0u32;
        loop {
            if let Some(bytes) = self.mailbox.take(&self.key) {
                return Some(bytes.to_vec());
            }
            spins = spins.saturating_add(1);
            if spins < 1024 {
                std::thread::yield_now();
            } else {
                std::thread::sleep(std::time::Duration::from_micros(50));
            }
        }
    }
}

/// In-process rank of a shared-memory "universe". Ranks of one universe
/// share a mailbox; ranks of different universes never see each other's
/// messages.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl RayonComm {
    /// Create all ranks of a fresh universe of `size` ranks.
    pub fn universe(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag.as_u32()), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: CommTag, _len: usize) -> Self::RecvHandle {
        LocalHandle {
            key: (peer, self.rank, tag.as_u32()),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

/// Run `f` once per rank of a fresh in-process universe, each rank on its own
/// scoped thread, and return the per-rank results in rank order.
///
/// A panic on any rank is propagated to the caller.
pub fn run_local_ranks<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(RayonComm) -> R + Sync,
    R: Send,
{
    let comms = RayonComm::universe(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(r) => r,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator, Wait};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI-backed communicator. The caller owns the MPI universe and must keep
    /// it alive for as long as any `MpiComm` is in use.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self { world, rank, size }
        }
    }

    /// In-flight MPI request together with the heap buffer it reads or writes.
    pub struct MpiHandle {
        req: Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
        returns_data: bool,
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // SAFETY: `buf` came from `Box::into_raw` in `isend`/`irecv` and the
            // request that borrowed it has completed.
            let data = unsafe { Box::from_raw(self.buf) };
            if self.returns_data {
                Some(data.into_vec())
            } else {
                None
            }
        }
    }

    // The Rust bindings cannot express "buffer lives until wait" for a handle
    // returned from a function, so the buffer is leaked into the request and
    // reclaimed in `wait`.
    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn max_tag(&self) -> u32 {
            super::MPI_TAG_UB_MIN
        }

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> MpiHandle {
            let raw = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: `raw` stays allocated until `MpiHandle::wait` frees it.
            let data: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag.as_u32() as i32);
            MpiHandle {
                req,
                buf: raw,
                returns_data: false,
            }
        }

        fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> MpiHandle {
            let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
            // SAFETY: as above; nothing else touches the buffer until `wait`.
            let data: &'static mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, tag.as_u32() as i32);
            MpiHandle {
                req,
                buf: raw,
                returns_data: true,
            }
        }
    }

    // SAFETY: the raw buffer pointer is only dereferenced by the owner of the handle.
    unsafe impl Send for MpiHandle {}
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

//! Fusion rules for values arriving from another subdomain or rank.

/// How an incoming value merges into the local slot.
pub trait Fuse {
    fn fuse(local: &mut f64, incoming: f64);
}

/// Incoming value replaces the local one (restriction, halo fill).
#[derive(Copy, Clone, Debug)]
pub struct Overwrite;

impl Fuse for Overwrite {
    #[inline]
    fn fuse(local: &mut f64, incoming: f64) {
        *local = incoming;
    }
}

/// Incoming value is added to the local one (partition-of-unity prolongation).
#[derive(Copy, Clone, Debug)]
pub struct Accumulate;

impl Fuse for Accumulate {
    #[inline]
    fn fuse(local: &mut f64, incoming: f64) {
        *local += incoming;
    }
}

/// Fuse `values` into `target` at `positions`.
pub fn scatter<F: Fuse>(target: &mut [f64], positions: &[usize], values: &[f64]) {
    for (&p, &v) in positions.iter().zip(values) {
        F::fuse(&mut target[p], v);
    }
}

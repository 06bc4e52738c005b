//! Per-worker scratch memory for the tensor kernels.

/// Growable buffer handed out as disjoint, zeroed slices.
///
/// One arena lives on each rayon worker for the duration of a kernel call.
#[derive(Debug, Default)]
pub struct ScratchArena {
    buf: Vec<f64>,
}

impl ScratchArena {
    pub fn with_capacity(n: usize) -> Self {
        Self { buf: vec![0.0; n] }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Split off `N` zeroed slices of the requested sizes.
    pub fn carve<const N: usize>(&mut self, sizes: [usize; N]) -> [&mut [f64]; N] {
        let total: usize = sizes.iter().sum();
        if self.buf.len() < total {
            self.buf.resize(total, 0.0);
        }
        let mut rest: &mut [f64] = &mut self.buf[..total];
        sizes.map(|n| {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(n);
            rest = tail;
            head.fill(0.0);
            head
        })
    }
}

//! Sum-factorized evaluation on batches of tensor-product elements.
//!
//! Layouts (column-major, first index fastest):
//! * nodal input `x(dx, dy, [dz], c, e)`
//! * quadrature output `y(c, qx, qy, [qz], e)` (components fastest)
//! * gradients `y(dir, qx, qy, [qz], e)` for scalar fields
//!
//! Each element is contracted one axis at a time through scratch tensors
//! that belong to that element alone, so elements run independently on the
//! rayon pool. A handful of `(dim, vdim, d1d, q1d)` combinations are
//! monomorphized with stack scratch; everything else up to the configured
//! limits goes through the generic path and a per-worker [`ScratchArena`].

use crate::config::KernelOptions;
use crate::kernels::basis::DofToQuad;
use crate::kernels::scratch::ScratchArena;
use crate::mesh_error::{MeshDdmError, check_len};
use rayon::prelude::*;

/// Shape of one batch of elements sharing a basis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ElementBatch {
    pub dim: usize,
    pub vdim: usize,
    pub ne: usize,
}

impl ElementBatch {
    pub fn new(dim: usize, vdim: usize, ne: usize) -> Self {
        Self { dim, vdim, ne }
    }

    /// Nodal values per element (all components).
    pub fn nodal_len(&self, d1d: usize) -> usize {
        self.vdim * d1d.pow(self.dim as u32)
    }

    /// Quadrature values per element (all components).
    pub fn quad_len(&self, q1d: usize) -> usize {
        self.vdim * q1d.pow(self.dim as u32)
    }
}

/// Which implementation served a kernel call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelPath {
    Specialized,
    Generic,
}

fn check_limits(dim: usize, basis: &DofToQuad, opts: &KernelOptions) -> Result<(), MeshDdmError> {
    if !(2..=3).contains(&dim) || basis.d1d > opts.max_d1d || basis.q1d > opts.max_q1d {
        return Err(MeshDdmError::UnsupportedKernel {
            dim,
            d1d: basis.d1d,
            q1d: basis.q1d,
            max_d1d: opts.max_d1d,
            max_q1d: opts.max_q1d,
        });
    }
    check_len("basis table", basis.d1d * basis.q1d, basis.b.len())
}

// ---------------------------------------------------------------------------
// per-element contractions
// ---------------------------------------------------------------------------

/// `x(dx,dy,c)` → `y(c,qx,qy)`; `dq` holds `d1d * q1d` values.
#[inline(always)]
pub(crate) fn values_2d(
    vdim: usize,
    d1d: usize,
    q1d: usize,
    b: &[f64],
    x: &[f64],
    y: &mut [f64],
    dq: &mut [f64],
) {
    let nd = d1d * d1d;
    for c in 0..vdim {
        let xc = &x[c * nd..(c + 1) * nd];
        for dy in 0..d1d {
            for qx in 0..q1d {
                let mut u = 0.0;
                for dx in 0..d1d {
                    u += b[qx + q1d * dx] * xc[dx + d1d * dy];
                }
                dq[qx + q1d * dy] = u;
            }
        }
        for qy in 0..q1d {
            for qx in 0..q1d {
                let mut u = 0.0;
                for dy in 0..d1d {
                    u += b[qy + q1d * dy] * dq[qx + q1d * dy];
                }
                y[c + vdim * (qx + q1d * qy)] = u;
            }
        }
    }
}

/// `x(dx,dy,dz,c)` → `y(c,qx,qy,qz)`; `ddq` holds `d1d² q1d`, `dqq` holds `d1d q1d²`.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn values_3d(
    vdim: usize,
    d1d: usize,
    q1d: usize,
    b: &[f64],
    x: &[f64],
    y: &mut [f64],
    ddq: &mut [f64],
    dqq: &mut [f64],
) {
    let nd = d1d * d1d * d1d;
    for c in 0..vdim {
        let xc = &x[c * nd..(c + 1) * nd];
        for dz in 0..d1d {
            for dy in 0..d1d {
                for qx in 0..q1d {
                    let mut u = 0.0;
                    for dx in 0..d1d {
                        u += b[qx + q1d * dx] * xc[dx + d1d * (dy + d1d * dz)];
                    }
                    ddq[qx + q1d * (dy + d1d * dz)] = u;
                }
            }
        }
        for dz in 0..d1d {
            for qy in 0..q1d {
                for qx in 0..q1d {
                    let mut u = 0.0;
                    for dy in 0..d1d {
                        u += b[qy + q1d * dy] * ddq[qx + q1d * (dy + d1d * dz)];
                    }
                    dqq[qx + q1d * (qy + q1d * dz)] = u;
                }
            }
        }
        for qz in 0..q1d {
            for qy in 0..q1d {
                for qx in 0..q1d {
                    let mut u = 0.0;
                    for dz in 0..d1d {
                        u += b[qz + q1d * dz] * dqq[qx + q1d * (qy + q1d * dz)];
                    }
                    y[c + vdim * (qx + q1d * (qy + q1d * qz))] = u;
                }
            }
        }
    }
}

/// `x(dx,dy,c) += Σ Bᵀ y(c,qx,qy)`; `qd` holds `q1d * d1d`.
#[inline(always)]
pub(crate) fn transpose_2d(
    vdim: usize,
    d1d: usize,
    q1d: usize,
    b: &[f64],
    y: &[f64],
    x: &mut [f64],
    qd: &mut [f64],
) {
    let nd = d1d * d1d;
    for c in 0..vdim {
        for qy in 0..q1d {
            for dx in 0..d1d {
                let mut u = 0.0;
                for qx in 0..q1d {
                    u += b[qx + q1d * dx] * y[c + vdim * (qx + q1d * qy)];
                }
                qd[dx + d1d * qy] = u;
            }
        }
        let xc = &mut x[c * nd..(c + 1) * nd];
        for dy in 0..d1d {
            for dx in 0..d1d {
                let mut u = 0.0;
                for qy in 0..q1d {
                    u += b[qy + q1d * dy] * qd[dx + d1d * qy];
                }
                xc[dx + d1d * dy] += u;
            }
        }
    }
}

/// `x(dx,dy,dz,c) += Σ Bᵀ y(c,qx,qy,qz)`; `qqd` holds `q1d² d1d`, `qdd` holds `q1d d1d²`.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn transpose_3d(
    vdim: usize,
    d1d: usize,
    q1d: usize,
    b: &[f64],
    y: &[f64],
    x: &mut [f64],
    qqd: &mut [f64],
    qdd: &mut [f64],
) {
    let nd = d1d * d1d * d1d;
    for c in 0..vdim {
        for qz in 0..q1d {
            for qy in 0..q1d {
                for dx in 0..d1d {
                    let mut u = 0.0;
                    for qx in 0..q1d {
                        u += b[qx + q1d * dx] * y[c + vdim * (qx + q1d * (qy + q1d * qz))];
                    }
                    qqd[dx + d1d * (qy + q1d * qz)] = u;
                }
            }
        }
        for qz in 0..q1d {
            for dy in 0..d1d {
                for dx in 0..d1d {
                    let mut u = 0.0;
                    for qy in 0..q1d {
                        u += b[qy + q1d * dy] * qqd[dx + d1d * (qy + q1d * qz)];
                    }
                    qdd[dx + d1d * (dy + d1d * qz)] = u;
                }
            }
        }
        let xc = &mut x[c * nd..(c + 1) * nd];
        for dz in 0..d1d {
            for dy in 0..d1d {
                for dx in 0..d1d {
                    let mut u = 0.0;
                    for qz in 0..q1d {
                        u += b[qz + q1d * dz] * qdd[dx + d1d * (dy + d1d * qz)];
                    }
                    xc[dx + d1d * (dy + d1d * dz)] += u;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn gradients_2d(
    d1d: usize,
    q1d: usize,
    b: &[f64],
    g: &[f64],
    x: &[f64],
    y: &mut [f64],
    bx: &mut [f64],
    gx: &mut [f64],
) {
    for dy in 0..d1d {
        for qx in 0..q1d {
            let (mut u, mut v) = (0.0, 0.0);
            for dx in 0..d1d {
                let xv = x[dx + d1d * dy];
                u += b[qx + q1d * dx] * xv;
                v += g[qx + q1d * dx] * xv;
            }
            bx[qx + q1d * dy] = u;
            gx[qx + q1d * dy] = v;
        }
    }
    for qy in 0..q1d {
        for qx in 0..q1d {
            let (mut du_dx, mut du_dy) = (0.0, 0.0);
            for dy in 0..d1d {
                du_dx += b[qy + q1d * dy] * gx[qx + q1d * dy];
                du_dy += g[qy + q1d * dy] * bx[qx + q1d * dy];
            }
            let q = qx + q1d * qy;
            y[2 * q] = du_dx;
            y[2 * q + 1] = du_dy;
        }
    }
}

fn gradients_3d(
    d1d: usize,
    q1d: usize,
    b: &[f64],
    g: &[f64],
    x: &[f64],
    y: &mut [f64],
    arena: &mut ScratchArena,
) {
    let ddq = d1d * d1d * q1d;
    let dqq = d1d * q1d * q1d;
    let [bx, gx, bbx, bgx, gbx] = arena.carve([ddq, ddq, dqq, dqq, dqq]);
    for dz in 0..d1d {
        for dy in 0..d1d {
            for qx in 0..q1d {
                let (mut u, mut v) = (0.0, 0.0);
                for dx in 0..d1d {
                    let xv = x[dx + d1d * (dy + d1d * dz)];
                    u += b[qx + q1d * dx] * xv;
                    v += g[qx + q1d * dx] * xv;
                }
                bx[qx + q1d * (dy + d1d * dz)] = u;
                gx[qx + q1d * (dy + d1d * dz)] = v;
            }
        }
    }
    for dz in 0..d1d {
        for qy in 0..q1d {
            for qx in 0..q1d {
                let (mut bb, mut bg, mut gb) = (0.0, 0.0, 0.0);
                for dy in 0..d1d {
                    let k = qx + q1d * (dy + d1d * dz);
                    bb += b[qy + q1d * dy] * bx[k];
                    bg += b[qy + q1d * dy] * gx[k];
                    gb += g[qy + q1d * dy] * bx[k];
                }
                let k = qx + q1d * (qy + q1d * dz);
                bbx[k] = bb;
                bgx[k] = bg;
                gbx[k] = gb;
            }
        }
    }
    for qz in 0..q1d {
        for qy in 0..q1d {
            for qx in 0..q1d {
                let (mut du_dx, mut du_dy, mut du_dz) = (0.0, 0.0, 0.0);
                for dz in 0..d1d {
                    let k = qx + q1d * (qy + q1d * dz);
                    du_dx += b[qz + q1d * dz] * bgx[k];
                    du_dy += b[qz + q1d * dz] * gbx[k];
                    du_dz += g[qz + q1d * dz] * bbx[k];
                }
                let q = qx + q1d * (qy + q1d * qz);
                y[3 * q] = du_dx;
                y[3 * q + 1] = du_dy;
                y[3 * q + 2] = du_dz;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// batch drivers
// ---------------------------------------------------------------------------

fn values_2d_fixed<const VDIM: usize, const D: usize, const Q: usize>(
    b: &[f64],
    x: &[f64],
    y: &mut [f64],
) {
    x.par_chunks(VDIM * D * D)
        .zip(y.par_chunks_mut(VDIM * Q * Q))
        .for_each(|(xe, ye)| {
            let mut dq = [[0.0f64; Q]; D];
            values_2d(VDIM, D, Q, b, xe, ye, dq.as_flattened_mut());
        });
}

fn values_3d_fixed<const VDIM: usize, const D: usize, const Q: usize>(
    b: &[f64],
    x: &[f64],
    y: &mut [f64],
) {
    x.par_chunks(VDIM * D * D * D)
        .zip(y.par_chunks_mut(VDIM * Q * Q * Q))
        .for_each(|(xe, ye)| {
            let mut ddq = [[[0.0f64; Q]; D]; D];
            let mut dqq = [[[0.0f64; Q]; Q]; D];
            values_3d(
                VDIM,
                D,
                Q,
                b,
                xe,
                ye,
                ddq.as_flattened_mut().as_flattened_mut(),
                dqq.as_flattened_mut().as_flattened_mut(),
            );
        });
}

fn values_generic(batch: ElementBatch, basis: &DofToQuad, x: &[f64], y: &mut [f64]) {
    let (d, q, vdim) = (basis.d1d, basis.q1d, batch.vdim);
    let b = basis.b.as_slice();
    let xs = batch.nodal_len(d);
    let ys = batch.quad_len(q);
    if batch.dim == 2 {
        x.par_chunks(xs).zip(y.par_chunks_mut(ys)).for_each_init(
            || ScratchArena::with_capacity(d * q),
            |arena, (xe, ye)| {
                let [dq] = arena.carve([d * q]);
                values_2d(vdim, d, q, b, xe, ye, dq);
            },
        );
    } else {
        x.par_chunks(xs).zip(y.par_chunks_mut(ys)).for_each_init(
            || ScratchArena::with_capacity(d * d * q + d * q * q),
            |arena, (xe, ye)| {
                let [ddq, dqq] = arena.carve([d * d * q, d * q * q]);
                values_3d(vdim, d, q, b, xe, ye, ddq, dqq);
            },
        );
    }
}

/// Interpolate nodal values to quadrature points, overwriting `y`.
pub fn eval_values(
    batch: ElementBatch,
    basis: &DofToQuad,
    x: &[f64],
    y: &mut [f64],
    opts: &KernelOptions,
) -> Result<KernelPath, MeshDdmError> {
    check_limits(batch.dim, basis, opts)?;
    check_len("nodal input", batch.ne * batch.nodal_len(basis.d1d), x.len())?;
    check_len("quadrature output", batch.ne * batch.quad_len(basis.q1d), y.len())?;
    if batch.ne == 0 {
        return Ok(KernelPath::Specialized);
    }
    let b = basis.b.as_slice();
    let shape = (batch.dim, batch.vdim, basis.d1d, basis.q1d);
    match shape {
        (2, 1, 2, 4) => values_2d_fixed::<1, 2, 4>(b, x, y),
        (2, 1, 3, 6) => values_2d_fixed::<1, 3, 6>(b, x, y),
        (2, 1, 4, 8) => values_2d_fixed::<1, 4, 8>(b, x, y),
        (2, 2, 2, 4) => values_2d_fixed::<2, 2, 4>(b, x, y),
        (2, 2, 3, 4) => values_2d_fixed::<2, 3, 4>(b, x, y),
        (2, 2, 3, 6) => values_2d_fixed::<2, 3, 6>(b, x, y),
        (2, 2, 4, 8) => values_2d_fixed::<2, 4, 8>(b, x, y),
        (3, 1, 2, 4) => values_3d_fixed::<1, 2, 4>(b, x, y),
        (3, 1, 3, 6) => values_3d_fixed::<1, 3, 6>(b, x, y),
        (3, 1, 4, 8) => values_3d_fixed::<1, 4, 8>(b, x, y),
        (3, 3, 2, 4) => values_3d_fixed::<3, 2, 4>(b, x, y),
        (3, 3, 3, 6) => values_3d_fixed::<3, 3, 6>(b, x, y),
        (3, 3, 4, 8) => values_3d_fixed::<3, 4, 8>(b, x, y),
        _ => {
            log::warn!("no specialized kernel for (dim, vdim, d1d, q1d) = {shape:?}, using the generic path");
            values_generic(batch, basis, x, y);
            return Ok(KernelPath::Generic);
        }
    }
    Ok(KernelPath::Specialized)
}

/// Reference-space gradients of a scalar field at the quadrature points, overwriting `y`.
pub fn eval_gradients(
    batch: ElementBatch,
    basis: &DofToQuad,
    x: &[f64],
    y: &mut [f64],
    opts: &KernelOptions,
) -> Result<(), MeshDdmError> {
    check_limits(batch.dim, basis, opts)?;
    if batch.vdim != 1 {
        return Err(MeshDdmError::UnsupportedKernel {
            dim: batch.dim,
            d1d: basis.d1d,
            q1d: basis.q1d,
            max_d1d: opts.max_d1d,
            max_q1d: opts.max_q1d,
        });
    }
    let (d, q, dim) = (basis.d1d, basis.q1d, batch.dim);
    let xs = batch.nodal_len(d);
    let ys = dim * q.pow(dim as u32);
    check_len("nodal input", batch.ne * xs, x.len())?;
    check_len("gradient output", batch.ne * ys, y.len())?;
    let (b, g) = (basis.b.as_slice(), basis.g.as_slice());
    x.par_chunks(xs.max(1))
        .zip(y.par_chunks_mut(ys.max(1)))
        .for_each_init(ScratchArena::default, |arena, (xe, ye)| {
            if dim == 2 {
                let [bx, gx] = arena.carve([d * q, d * q]);
                gradients_2d(d, q, b, g, xe, ye, bx, gx);
            } else {
                gradients_3d(d, q, b, g, xe, ye, arena);
            }
        });
    Ok(())
}

/// Add `Bᵀ y` to the nodal vector `x` (quadrature → nodes).
pub fn apply_transpose(
    batch: ElementBatch,
    basis: &DofToQuad,
    y: &[f64],
    x: &mut [f64],
    opts: &KernelOptions,
) -> Result<(), MeshDdmError> {
    check_limits(batch.dim, basis, opts)?;
    let (d, q, vdim) = (basis.d1d, basis.q1d, batch.vdim);
    let xs = batch.nodal_len(d);
    let ys = batch.quad_len(q);
    check_len("quadrature input", batch.ne * ys, y.len())?;
    check_len("nodal output", batch.ne * xs, x.len())?;
    let b = basis.b.as_slice();
    let dim = batch.dim;
    y.par_chunks(ys.max(1))
        .zip(x.par_chunks_mut(xs.max(1)))
        .for_each_init(ScratchArena::default, |arena, (ye, xe)| {
            if dim == 2 {
                let [qd] = arena.carve([q * d]);
                transpose_2d(vdim, d, q, b, ye, xe, qd);
            } else {
                let [qqd, qdd] = arena.carve([q * q * d, q * d * d]);
                transpose_3d(vdim, d, q, b, ye, xe, qqd, qdd);
            }
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    /// Dense evaluation without sum factorization.
    fn dense_values(batch: ElementBatch, t: &DofToQuad, x: &[f64]) -> Vec<f64> {
        let (d, q, v) = (t.d1d, t.q1d, batch.vdim);
        let nz_d = if batch.dim == 3 { d } else { 1 };
        let nz_q = if batch.dim == 3 { q } else { 1 };
        let bz = |qz: usize, dz: usize| if batch.dim == 3 { t.b(qz, dz) } else { 1.0 };
        let mut y = vec![0.0; batch.ne * batch.quad_len(q)];
        for e in 0..batch.ne {
            for c in 0..v {
                for qz in 0..nz_q {
                    for qy in 0..q {
                        for qx in 0..q {
                            let mut s = 0.0;
                            for dz in 0..nz_d {
                                for dy in 0..d {
                                    for dx in 0..d {
                                        let xi = dx + d * (dy + d * (dz + nz_d * (c + v * e)));
                                        s += t.b(qx, dx) * t.b(qy, dy) * bz(qz, dz) * x[xi];
                                    }
                                }
                            }
                            y[c + v * (qx + q * (qy + q * (qz + nz_q * e)))] = s;
                        }
                    }
                }
            }
        }
        y
    }

    #[test]
    fn specialized_and_generic_agree_with_dense() {
        let opts = KernelOptions::default();
        for &(dim, vdim, d, q) in &[(2, 2, 3, 4), (2, 1, 3, 5), (3, 3, 2, 4), (3, 2, 3, 3)] {
            let t = DofToQuad::lagrange_gauss(d, q).unwrap();
            let batch = ElementBatch::new(dim, vdim, 5);
            let x = random(batch.ne * batch.nodal_len(d), 7);
            let mut y = vec![0.0; batch.ne * batch.quad_len(q)];
            let path = eval_values(batch, &t, &x, &mut y, &opts).unwrap();
            let expect_path = if (dim, vdim, d, q) == (2, 2, 3, 4) || (dim, vdim, d, q) == (3, 3, 2, 4) {
                KernelPath::Specialized
            } else {
                KernelPath::Generic
            };
            assert_eq!(path, expect_path);
            for (a, b) in y.iter().zip(dense_values(batch, &t, &x)) {
                assert!((a - b).abs() < 1e-12, "dim {dim} vdim {vdim}");
            }
        }
    }

    #[test]
    fn wide_quadrature_takes_the_generic_path() {
        // q1d above 15 must not alias a specialized shape such as (2, 1, 2, 4)
        let opts = KernelOptions { max_d1d: 8, max_q1d: 40 };
        let t = DofToQuad::lagrange_gauss(2, 36).unwrap();
        let batch = ElementBatch::new(2, 1, 1);
        let x = vec![1.0; batch.nodal_len(2)];
        let mut y = vec![0.0; batch.quad_len(36)];
        assert_eq!(eval_values(batch, &t, &x, &mut y, &opts).unwrap(), KernelPath::Generic);
        for (a, b) in y.iter().zip(dense_values(batch, &t, &x)) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(y.iter().all(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn transpose_is_the_adjoint() {
        let opts = KernelOptions::default();
        for dim in [2, 3] {
            let t = DofToQuad::lagrange_gauss(3, 4).unwrap();
            let batch = ElementBatch::new(dim, 2, 3);
            let x = random(batch.ne * batch.nodal_len(3), 1);
            let w = random(batch.ne * batch.quad_len(4), 2);
            let mut bx = vec![0.0; w.len()];
            eval_values(batch, &t, &x, &mut bx, &opts).unwrap();
            let mut btw = vec![0.0; x.len()];
            apply_transpose(batch, &t, &w, &mut btw, &opts).unwrap();
            let lhs: f64 = bx.iter().zip(&w).map(|(a, b)| a * b).sum();
            let rhs: f64 = x.iter().zip(&btw).map(|(a, b)| a * b).sum();
            assert!((lhs - rhs).abs() < 1e-11);
        }
    }

    #[test]
    fn gradient_of_a_linear_field_is_constant() {
        let opts = KernelOptions::default();
        let t = DofToQuad::lagrange_gauss(3, 3).unwrap();
        let nodes = crate::kernels::basis::uniform_nodes(3);
        // u = 2x - y + 3z
        let mut x = Vec::new();
        for &z in &nodes {
            for &y in &nodes {
                for &xx in &nodes {
                    x.push(2.0 * xx - y + 3.0 * z);
                }
            }
        }
        let mut g = vec![0.0; 3 * 27];
        eval_gradients(ElementBatch::new(3, 1, 1), &t, &x, &mut g, &opts).unwrap();
        for q in 0..27 {
            assert!((g[3 * q] - 2.0).abs() < 1e-12);
            assert!((g[3 * q + 1] + 1.0).abs() < 1e-12);
            assert!((g[3 * q + 2] - 3.0).abs() < 1e-12);
        }
        let mut g2 = vec![0.0; 2 * 9];
        eval_gradients(ElementBatch::new(2, 1, 1), &t, &x[..9], &mut g2, &opts).unwrap();
        for q in 0..9 {
            assert!((g2[2 * q] - 2.0).abs() < 1e-12);
            assert!((g2[2 * q + 1] + 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn oversized_basis_is_rejected() {
        let t = DofToQuad::lagrange_gauss(9, 9).unwrap();
        let batch = ElementBatch::new(2, 1, 1);
        let mut y = vec![0.0; 81];
        let err = eval_values(batch, &t, &vec![0.0; 81], &mut y, &KernelOptions::default());
        assert!(matches!(err, Err(MeshDdmError::UnsupportedKernel { d1d: 9, .. })));
        let roomy = KernelOptions { max_d1d: 10, max_q1d: 10 };
        assert_eq!(eval_values(batch, &t, &vec![0.0; 81], &mut y, &roomy).unwrap(), KernelPath::Generic);
    }
}

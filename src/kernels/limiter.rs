//! Limiter term of the target-matching mesh-optimization functional.
//!
//! For every quadrature point of a 3D element batch the kernel evaluates the
//! limiting distance `d`, the reference positions `x0` and the current
//! positions `x1`, and adds
//! `Bᵀ (w · det(J) · λ · c0 · (x1 − x0) / d²)` to the nodal residual.

use crate::config::KernelOptions;
use crate::kernels::basis::DofToQuad;
use crate::kernels::scratch::ScratchArena;
use crate::kernels::tensor::{transpose_3d, values_3d};
use crate::mesh_error::{MeshDdmError, check_len};
use rayon::prelude::*;

/// Limiter coefficient `c0`: one value, or one per quadrature point and element.
#[derive(Clone, Debug, PartialEq)]
pub enum LimiterCoefficient {
    Constant(f64),
    PerPoint(Vec<f64>),
}

/// Inputs of [`add_mult_limiter_3d`].
///
/// * `dist`: nodal limiting distance `(d1d³, ne)`
/// * `x0`: nodal reference positions `(d1d³, 3, ne)`
/// * `jacobians`: target Jacobians `(3, 3, q1d³, ne)`
#[derive(Clone, Copy, Debug)]
pub struct LimiterData<'a> {
    pub ne: usize,
    pub lim_normal: f64,
    pub dist: &'a [f64],
    pub x0: &'a [f64],
    pub jacobians: &'a [f64],
    pub coefficient: &'a LimiterCoefficient,
}

#[inline]
fn det3(j: &[f64]) -> f64 {
    // column-major 3x3
    j[0] * (j[4] * j[8] - j[7] * j[5]) - j[3] * (j[1] * j[8] - j[7] * j[2])
        + j[6] * (j[1] * j[5] - j[4] * j[2])
}

/// Add the limiter residual at positions `x1` into `y` (both `(d1d³, 3, ne)`).
pub fn add_mult_limiter_3d(
    basis: &DofToQuad,
    data: &LimiterData<'_>,
    x1: &[f64],
    y: &mut [f64],
    opts: &KernelOptions,
) -> Result<(), MeshDdmError> {
    let (d, q, ne) = (basis.d1d, basis.q1d, data.ne);
    if d > opts.max_d1d || q > opts.max_q1d {
        return Err(MeshDdmError::UnsupportedKernel {
            dim: 3,
            d1d: d,
            q1d: q,
            max_d1d: opts.max_d1d,
            max_q1d: opts.max_q1d,
        });
    }
    let nd = d * d * d;
    let nq = q * q * q;
    check_len("limiter weights", nq, basis.weights.len().pow(3))?;
    check_len("limiter distance", ne * nd, data.dist.len())?;
    check_len("limiter reference positions", ne * 3 * nd, data.x0.len())?;
    check_len("limiter positions", ne * 3 * nd, x1.len())?;
    check_len("limiter residual", ne * 3 * nd, y.len())?;
    check_len("limiter jacobians", ne * 9 * nq, data.jacobians.len())?;
    if let LimiterCoefficient::PerPoint(c) = data.coefficient {
        check_len("limiter coefficient", ne * nq, c.len())?;
    }
    if ne == 0 {
        return Ok(());
    }

    let b = basis.b.as_slice();
    let w1 = basis.weights.as_slice();
    let scratch = 2 * d * d * q + 2 * d * q * q + 7 * nq;
    y.par_chunks_mut(3 * nd).enumerate().for_each_init(
        || ScratchArena::with_capacity(scratch),
        |arena, (e, ye)| {
            let [ddq, dqq, dist_q, p0, p1, qqd, qdd] =
                arena.carve([d * d * q, d * q * q, nq, 3 * nq, 3 * nq, q * q * d, q * d * d]);
            values_3d(1, d, q, b, &data.dist[e * nd..(e + 1) * nd], dist_q, ddq, dqq);
            values_3d(3, d, q, b, &data.x0[e * 3 * nd..(e + 1) * 3 * nd], p0, ddq, dqq);
            values_3d(3, d, q, b, &x1[e * 3 * nd..(e + 1) * 3 * nd], p1, ddq, dqq);

            for qz in 0..q {
                for qy in 0..q {
                    for qx in 0..q {
                        let k = qx + q * (qy + q * qz);
                        let jac = &data.jacobians[9 * (k + nq * e)..9 * (k + nq * e) + 9];
                        let weight = w1[qx] * w1[qy] * w1[qz] * det3(jac);
                        let c0 = match data.coefficient {
                            LimiterCoefficient::Constant(c) => *c,
                            LimiterCoefficient::PerPoint(c) => c[k + nq * e],
                        };
                        let dist = dist_q[k];
                        let a = 1.0 / (dist * dist);
                        let scale = weight * data.lim_normal * c0 * a;
                        // p0 now holds the quadrature-point residual
                        for c in 0..3 {
                            p0[3 * k + c] = scale * (p1[3 * k + c] - p0[3 * k + c]);
                        }
                    }
                }
            }
            transpose_3d(3, d, q, b, p0, ye, qqd, qdd);
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_jacobians(ne: usize, nq: usize, scale: f64) -> Vec<f64> {
        let mut j = vec![0.0; 9 * nq * ne];
        for blk in j.chunks_mut(9) {
            blk[0] = scale;
            blk[4] = scale;
            blk[8] = scale;
        }
        j
    }

    #[test]
    fn zero_displacement_gives_zero_residual() {
        let t = DofToQuad::lagrange_gauss(2, 3).unwrap();
        let nd = 8;
        let x0: Vec<f64> = (0..3 * nd).map(|i| i as f64 * 0.1).collect();
        let jac = identity_jacobians(1, 27, 1.0);
        let c0 = LimiterCoefficient::Constant(1.0);
        let data = LimiterData {
            ne: 1,
            lim_normal: 1.0,
            dist: &[1.0; 8],
            x0: &x0,
            jacobians: &jac,
            coefficient: &c0,
        };
        let mut y = vec![0.5; 3 * nd];
        add_mult_limiter_3d(&t, &data, &x0, &mut y, &KernelOptions::default()).unwrap();
        assert!(y.iter().all(|v| (v - 0.5).abs() < 1e-15));
    }

    #[test]
    fn uniform_shift_matches_mass_row_sums() {
        // shift every node by s in x: residual = λ c0 s / d² · ∫ φ_i
        let t = DofToQuad::lagrange_gauss(2, 2).unwrap();
        let nd = 8;
        let x0 = vec![0.0; 3 * nd];
        let mut x1 = vec![0.0; 3 * nd];
        x1[..nd].iter_mut().for_each(|v| *v = 0.3);
        let jac = identity_jacobians(2, 8, 2.0);
        let c0 = LimiterCoefficient::PerPoint(vec![0.5; 2 * 8]);
        let data = LimiterData {
            ne: 2,
            lim_normal: 4.0,
            dist: &[2.0; 16],
            x0: &[x0.clone(), x0].concat(),
            jacobians: &jac,
            coefficient: &c0,
        };
        let x1 = [x1.clone(), x1].concat();
        let mut y = vec![0.0; 2 * 3 * nd];
        add_mult_limiter_3d(&t, &data, &x1, &mut y, &KernelOptions::default()).unwrap();
        // det J = 8, ∫ φ_i over the unit cube = 1/8
        let expect = 8.0 * 4.0 * 0.5 * 0.3 / 4.0 / 8.0;
        for e in 0..2 {
            let ye = &y[e * 24..(e + 1) * 24];
            assert!(ye[..nd].iter().all(|v| (v - expect).abs() < 1e-14));
            assert!(ye[nd..].iter().all(|v| v.abs() < 1e-15));
        }
    }
}

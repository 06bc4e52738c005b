//! 1D quadrature rules and nodal-to-quadrature tables.
//!
//! Tables are stored column-major with the quadrature index fastest:
//! `b[q + q1d * d]` is basis function `d` evaluated at point `q`.

use crate::mesh_error::MeshDdmError;
use std::f64::consts::PI;

/// Legendre polynomial `P_n(x)` and its derivative by the three-term recurrence.
fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    let (mut dp0, mut dp1) = (0.0, 1.0);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let pk = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        let dpk = ((2.0 * kf - 1.0) * (p1 + x * dp1) - (kf - 1.0) * dp0) / kf;
        p0 = p1;
        p1 = pk;
        dp0 = dp1;
        dp1 = dpk;
    }
    (p1, dp1)
}

/// `n`-point Gauss–Legendre rule on `[0, 1]`, nodes ascending.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    // roots come out descending from the Chebyshev guesses
    for i in (0..n).rev() {
        let theta = PI * (i as f64 + 0.75) / (n as f64 + 0.5);
        let mut x = theta.cos();
        for _ in 0..100 {
            let (p, dp) = legendre_and_derivative(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre_and_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes.push(0.5 * (x + 1.0));
        weights.push(0.5 * w);
    }
    (nodes, weights)
}

/// `n` equispaced closed nodes on `[0, 1]` (`0.5` when `n == 1`).
pub fn uniform_nodes(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// Value and derivative of the Lagrange polynomial of `nodes[j]` at `x`.
fn lagrange(nodes: &[f64], j: usize, x: f64) -> (f64, f64) {
    let xj = nodes[j];
    let mut value = 1.0;
    let mut deriv = 0.0;
    for (m, &xm) in nodes.iter().enumerate() {
        if m == j {
            continue;
        }
        let denom = xj - xm;
        deriv = deriv * (x - xm) / denom + value / denom;
        value *= (x - xm) / denom;
    }
    (value, deriv)
}

/// Nodal basis of one reference axis evaluated at the quadrature points.
#[derive(Clone, Debug, PartialEq)]
pub struct DofToQuad {
    pub d1d: usize,
    pub q1d: usize,
    /// `b[q + q1d * d]`
    pub b: Vec<f64>,
    /// `g[q + q1d * d]`, derivative of `b` along the axis.
    pub g: Vec<f64>,
    /// Quadrature points on `[0, 1]`.
    pub points: Vec<f64>,
    /// Quadrature weights on `[0, 1]`.
    pub weights: Vec<f64>,
}

impl DofToQuad {
    /// Equispaced Lagrange basis with `d1d` nodes on a `q1d`-point Gauss rule.
    pub fn lagrange_gauss(d1d: usize, q1d: usize) -> Result<Self, MeshDdmError> {
        if d1d == 0 || q1d == 0 {
            return Err(MeshDdmError::InvalidGeometry(format!(
                "empty basis table d1d={d1d}, q1d={q1d}"
            )));
        }
        let (points, weights) = gauss_legendre(q1d);
        let nodes = uniform_nodes(d1d);
        let mut b = vec![0.0; q1d * d1d];
        let mut g = vec![0.0; q1d * d1d];
        for d in 0..d1d {
            for (q, &x) in points.iter().enumerate() {
                let (v, dv) = lagrange(&nodes, d, x);
                b[q + q1d * d] = v;
                g[q + q1d * d] = dv;
            }
        }
        Ok(Self {
            d1d,
            q1d,
            b,
            g,
            points,
            weights,
        })
    }

    #[inline]
    pub fn b(&self, q: usize, d: usize) -> f64 {
        self.b[q + self.q1d * d]
    }

    #[inline]
    pub fn g(&self, q: usize, d: usize) -> f64 {
        self.g[q + self.q1d * d]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_rule_integrates_polynomials() {
        let (x, w) = gauss_legendre(4);
        assert!(x.windows(2).all(|p| p[0] < p[1]));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        // degree 7 is exact for 4 points
        let int: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(7)).sum();
        assert!((int - 1.0 / 8.0).abs() < 1e-14);
    }

    #[test]
    fn basis_is_a_partition_of_unity() {
        let t = DofToQuad::lagrange_gauss(3, 5).unwrap();
        for q in 0..5 {
            let s: f64 = (0..3).map(|d| t.b(q, d)).sum();
            let ds: f64 = (0..3).map(|d| t.g(q, d)).sum();
            assert!((s - 1.0).abs() < 1e-13);
            assert!(ds.abs() < 1e-12);
        }
    }

    #[test]
    fn derivative_of_linear_basis() {
        let t = DofToQuad::lagrange_gauss(2, 3).unwrap();
        for q in 0..3 {
            assert!((t.g(q, 0) + 1.0).abs() < 1e-14);
            assert!((t.g(q, 1) - 1.0).abs() < 1e-14);
            assert!((t.b(q, 1) - t.points[q]).abs() < 1e-14);
        }
    }
}

//! Discrete upwinding.

use crate::data::CsrMatrix;
use crate::mesh_error::MeshDdmError;

/// Artificial diffusion `D` with `d_ij = max(0, -k_ij, -k_ji)` off the
/// diagonal and zero row sums, on the sparsity of `k`.
pub fn discrete_upwinding(k: &CsrMatrix) -> Result<CsrMatrix, MeshDdmError> {
    let smap = k.symmetric_map()?;
    let kv = k.values();
    let mut d = vec![0.0; k.nnz()];
    for i in 0..k.nrows() {
        let mut rowsum = 0.0;
        let mut diag = None;
        for p in k.row_range(i) {
            let j = k.col_at(p);
            if i == j {
                diag = Some(p);
                continue;
            }
            let dij = 0.0f64.max(-kv[p]).max(-kv[smap[p]]);
            d[p] = dij;
            rowsum += dij;
        }
        let p = diag.ok_or(MeshDdmError::MissingDiagonal(i))?;
        d[p] = -rowsum;
    }
    k.with_values(d)
}

/// `K + D`, the low-order convection operator.
pub fn upwinded_operator(k: &CsrMatrix) -> Result<CsrMatrix, MeshDdmError> {
    let d = discrete_upwinding(k)?;
    let sum = k.values().iter().zip(d.values()).map(|(a, b)| a + b).collect();
    k.with_values(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_pattern(n: usize, seed: u64) -> CsrMatrix {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, rng.gen_range(-1.0..1.0)));
            let j = (i + 1) % n;
            t.push((i, j, rng.gen_range(-1.0..1.0)));
            t.push((j, i, rng.gen_range(-1.0..1.0)));
        }
        CsrMatrix::from_triplets(n, n, t).unwrap()
    }

    #[test]
    fn upwinded_operator_has_nonnegative_off_diagonals() {
        let k = random_pattern(7, 11);
        let kpd = upwinded_operator(&k).unwrap();
        let d = discrete_upwinding(&k).unwrap();
        for i in 0..7 {
            let s: f64 = d.row_values(i).iter().sum();
            assert!(s.abs() < 1e-14);
            for (j, v) in kpd.row(i) {
                if i != j {
                    assert!(v >= 0.0, "({i},{j}) = {v}");
                }
                assert_eq!(d.get(i, j), d.get(j, i));
            }
        }
    }

    #[test]
    fn one_sided_pattern_is_rejected() {
        let k = CsrMatrix::from_triplets(2, 2, [(0, 0, 1.0), (0, 1, -1.0), (1, 1, 1.0)]).unwrap();
        assert!(matches!(
            discrete_upwinding(&k),
            Err(MeshDdmError::MissingSymmetricEntry { row: 0, col: 1 })
        ));
        let no_diag = CsrMatrix::from_triplets(2, 2, [(0, 1, -1.0), (1, 0, 1.0)]).unwrap();
        assert!(matches!(
            discrete_upwinding(&no_diag),
            Err(MeshDdmError::MissingDiagonal(0))
        ));
    }
}

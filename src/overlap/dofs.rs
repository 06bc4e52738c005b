//! Overlap DOF lists: the deduplicated local DOFs touched by each bucket.

use crate::data::{ElementDofs, decode_dof};

/// DOFs of the elements in `buckets`, one list per bucket, unique and in
/// first-touch order (element order, then element-DOF order).
pub fn overlap_dofs<S: ElementDofs + ?Sized>(space: &S, buckets: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut marker = vec![false; space.num_true_dofs()];
    let mut edofs = Vec::new();
    buckets
        .iter()
        .map(|elems| {
            marker.fill(false);
            let mut list = Vec::new();
            for &e in elems {
                space.element_dofs(e, &mut edofs);
                for &d in &edofs {
                    let dof = decode_dof(d);
                    if !marker[dof] {
                        marker[dof] = true;
                        list.push(dof);
                    }
                }
            }
            list
        })
        .collect()
}

//! Linear DG upwind advection on a periodic 1D mesh.

use crate::data::CsrMatrix;
use crate::fct::evolution::TransportProblem;
use crate::fct::layout::DgLayout;
use crate::fct::rusanov::RusanovData;
use crate::mesh_error::MeshDdmError;

/// Uniform periodic mesh of `[0, length)` with constant velocity.
#[derive(Clone, Debug)]
pub struct PeriodicSegment {
    layout: DgLayout,
    h: f64,
    velocity: f64,
    mass: CsrMatrix,
    convection: CsrMatrix,
    fluctuation: CsrMatrix,
}

impl PeriodicSegment {
    pub fn new(ne: usize, length: f64, velocity: f64) -> Result<Self, MeshDdmError> {
        if ne == 0 || !(length > 0.0) {
            return Err(MeshDdmError::InvalidGeometry(format!(
                "periodic segment needs elements and a positive length, got ne={ne}, length={length}"
            )));
        }
        let layout = DgLayout::new(1, 1, ne)?;
        let h = length / ne as f64;
        let n = layout.num_dofs();
        let v = velocity;

        let mut mass = Vec::with_capacity(4 * ne);
        let mut vol = Vec::with_capacity(4 * ne);
        for k in 0..ne {
            for i in 0..2 {
                for j in 0..2 {
                    let (r, c) = (layout.dof(k, i), layout.dof(k, j));
                    mass.push((r, c, if i == j { h / 3.0 } else { h / 6.0 }));
                    // -(v u', phi_i)
                    vol.push((r, c, if j == 0 { v / 2.0 } else { -v / 2.0 }));
                }
            }
        }

        let mut conv = vol.clone();
        for k in 0..ne {
            let left = layout.dof((k + ne - 1) % ne, 1);
            let right = layout.dof(k, 0);
            conv.extend([(left, right, 0.0), (right, left, 0.0)]);
            if v >= 0.0 {
                conv.extend([(right, left, v), (right, right, -v)]);
            } else {
                conv.extend([(left, left, v), (left, right, -v)]);
            }
        }

        Ok(Self {
            layout,
            h,
            velocity,
            mass: CsrMatrix::from_triplets(n, n, mass)?,
            convection: CsrMatrix::from_triplets(n, n, conv)?,
            fluctuation: CsrMatrix::from_triplets(n, n, vol)?,
        })
    }

    pub fn layout(&self) -> &DgLayout {
        &self.layout
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn mass(&self) -> &CsrMatrix {
        &self.mass
    }

    pub fn convection(&self) -> &CsrMatrix {
        &self.convection
    }

    /// Node positions, with `length` wrapped onto 0 so the periodic node is co-located.
    pub fn dof_coords(&self) -> Vec<[f64; 3]> {
        let ne = self.layout.num_elements();
        (0..self.layout.num_dofs())
            .map(|d| {
                let k = self.layout.element_of(d);
                [((k + d % 2) % ne) as f64 * self.h, 0.0, 0.0]
            })
            .collect()
    }

    /// Nodal values of `f`.
    pub fn interpolate(&self, f: impl Fn(f64) -> f64) -> Vec<f64> {
        self.dof_coords().iter().map(|c| f(c[0])).collect()
    }

    pub fn problem(&self) -> TransportProblem {
        let ne = self.layout.num_elements();
        TransportProblem {
            layout: self.layout,
            mass: self.mass.clone(),
            convection: self.convection.clone(),
            inflow: vec![0.0; self.layout.num_dofs()],
            dof_coords: self.dof_coords(),
            fluctuation: Some(self.fluctuation.clone()),
            rusanov: Some(RusanovData::schwarz_segment(&vec![self.velocity; ne])),
            subcell: None,
            face_flux: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convection_columns_sum_to_zero() {
        for v in [1.0, -0.5] {
            let s = PeriodicSegment::new(5, 2.0, v).unwrap();
            let k = s.convection();
            let mut col = vec![0.0; 10];
            for i in 0..10 {
                for (j, a) in k.row(i) {
                    col[j] += a;
                }
                let row: f64 = k.row_values(i).iter().sum();
                assert!(row.abs() < 1e-14);
            }
            assert!(col.iter().all(|c| c.abs() < 1e-14));
            assert!(k.symmetric_map().is_ok());
        }
    }

    #[test]
    fn lumped_mass_is_half_an_element() {
        let s = PeriodicSegment::new(4, 1.0, 1.0).unwrap();
        assert!(s.mass().row_sums().iter().all(|m| (m - 0.125).abs() < 1e-15));
        assert_eq!(s.dof_coords()[3], [0.5, 0.0, 0.0]);
        assert_eq!(s.dof_coords()[7], s.dof_coords()[0]);
    }

    #[test]
    fn bad_geometry_is_rejected() {
        assert!(PeriodicSegment::new(0, 1.0, 1.0).is_err());
        assert!(PeriodicSegment::new(3, 0.0, 1.0).is_err());
    }
}

//! Right-hand side of the transport ODE `M du/dt = K u + b` with the
//! monotonicity treatment selected by [`MonoType`].
//!
//! The strategy is resolved once in the constructor; [`FctEvolution::mult`]
//! only dispatches on it. Time integration stays with the caller, who is
//! expected to refresh the bounds with [`FctEvolution::compute_bounds`] at
//! the start of each step for the FCT variants.

use crate::config::{FctOptions, MonoType};
use crate::data::CsrMatrix;
use crate::fct::bounds::SolutionBounds;
use crate::fct::flux::{FaceFluxData, lump_flux_terms};
use crate::fct::layout::DgLayout;
use crate::fct::mass::{BlockDiagonalMass, MassSolver};
use crate::fct::resdist::{Distribution, DistributionParams, Retention, SubcellData};
use crate::fct::rusanov::RusanovData;
use crate::fct::upwind::upwinded_operator;
use crate::mesh_error::{MeshDdmError, check_len};

/// Discretized transport problem on a DG space.
#[derive(Clone, Debug)]
pub struct TransportProblem {
    pub layout: DgLayout,
    pub mass: CsrMatrix,
    /// Convection including the upwind face terms.
    pub convection: CsrMatrix,
    /// Inflow boundary contribution `b`.
    pub inflow: Vec<f64>,
    /// Physical position of each dof, needed by the local bound stencils.
    pub dof_coords: Vec<[f64; 3]>,
    /// Volume part of the convection, the element fluctuation operator.
    pub fluctuation: Option<CsrMatrix>,
    pub rusanov: Option<RusanovData>,
    pub subcell: Option<SubcellData>,
    pub face_flux: Option<FaceFluxData>,
}

#[derive(Debug)]
enum LowOrder {
    DiscreteUpwind { kpd: CsrMatrix, lump_faces: bool },
    Rusanov(RusanovData),
    ResidualDistribution {
        fluct: CsrMatrix,
        params: DistributionParams,
        sub_cell: bool,
    },
}

#[derive(Debug)]
enum Strategy {
    HighOrder,
    LowOrder(LowOrder),
    FluxCorrected(LowOrder),
    LimitedMass(LowOrder),
}

pub struct FctEvolution<M: MassSolver = BlockDiagonalMass> {
    layout: DgLayout,
    mass: CsrMatrix,
    k: CsrMatrix,
    b: Vec<f64>,
    lumped: Vec<f64>,
    subcell: Option<SubcellData>,
    face_flux: Option<FaceFluxData>,
    bounds: SolutionBounds,
    mono_type: MonoType,
    strategy: Strategy,
    solver: M,
    dt: f64,
    limited_mass_beta: f64,
    eps: f64,
}

impl FctEvolution<BlockDiagonalMass> {
    pub fn new(problem: TransportProblem, opts: &FctOptions) -> Result<Self, MeshDdmError> {
        let solver = BlockDiagonalMass::new(&problem.layout, &problem.mass)?;
        Self::with_mass_solver(problem, opts, solver)
    }
}

impl<M: MassSolver> FctEvolution<M> {
    pub fn with_mass_solver(
        problem: TransportProblem,
        opts: &FctOptions,
        solver: M,
    ) -> Result<Self, MeshDdmError> {
        let TransportProblem {
            layout,
            mass,
            convection,
            inflow,
            dof_coords,
            fluctuation,
            rusanov,
            subcell,
            face_flux,
        } = problem;
        let n = layout.num_dofs();
        check_len("mass matrix rows", n, mass.nrows())?;
        check_len("convection matrix rows", n, convection.nrows())?;
        check_len("inflow vector", n, inflow.len())?;
        if let Some(f) = &face_flux {
            f.check(&layout)?;
        }

        let mono = opts.mono_type;
        let missing = |what| MeshDdmError::MissingFctData {
            scheme: mono.name(),
            what,
        };

        let mut sub_cell = opts.sub_cell;
        if sub_cell && layout.order() == 1 && mono != MonoType::None {
            log::warn!("sub-cell option has no effect for order 1, using the cell-based scheme");
            sub_cell = false;
        }

        let low_order = match mono {
            MonoType::None => None,
            MonoType::DiscUpw | MonoType::DiscUpwFct => {
                let lump_faces = sub_cell && face_flux.is_some();
                let kpd = match (&fluctuation, lump_faces) {
                    (Some(vol), true) => upwinded_operator(vol)?,
                    _ => upwinded_operator(&convection)?,
                };
                Some(LowOrder::DiscreteUpwind {
                    kpd,
                    lump_faces: lump_faces && fluctuation.is_some(),
                })
            }
            MonoType::Rusanov | MonoType::RusanovFct => {
                let r = rusanov.ok_or_else(|| missing("Rusanov diffusion coefficients"))?;
                r.check(&layout)?;
                Some(LowOrder::Rusanov(r))
            }
            MonoType::ResDist
            | MonoType::ResDistFct
            | MonoType::ResDistLim
            | MonoType::ResDistLimMass => {
                let fluct = fluctuation.ok_or_else(|| missing("a fluctuation matrix"))?;
                check_len("fluctuation matrix rows", n, fluct.nrows())?;
                if sub_cell {
                    subcell
                        .as_ref()
                        .ok_or_else(|| missing("sub-cell fluctuation weights"))?
                        .check(&layout)?;
                }
                if layout.dim() > 1 && face_flux.is_none() {
                    return Err(missing("face flux integrals"));
                }
                let retention = match mono {
                    MonoType::ResDistLim => Retention::Limited,
                    MonoType::ResDistLimMass => Retention::LimitedMass,
                    _ => Retention::None,
                };
                Some(LowOrder::ResidualDistribution {
                    fluct,
                    params: DistributionParams::new(opts, retention),
                    sub_cell,
                })
            }
        };

        let strategy = match (mono, low_order) {
            (MonoType::ResDistLimMass, Some(lo)) => Strategy::LimitedMass(lo),
            (m, Some(lo)) if m.is_fct() => Strategy::FluxCorrected(lo),
            (_, Some(lo)) => Strategy::LowOrder(lo),
            (_, None) => Strategy::HighOrder,
        };

        let bounds = SolutionBounds::new(opts.stencil, &layout, &convection, &dof_coords)?;
        let lumped = mass.row_sums();
        log::info!(
            "transport: {} elements, {} dofs, scheme {}, stencil {:?}",
            layout.num_elements(),
            n,
            mono.name(),
            opts.stencil
        );

        Ok(Self {
            layout,
            mass,
            k: convection,
            b: inflow,
            lumped,
            subcell,
            face_flux,
            bounds,
            mono_type: mono,
            strategy,
            solver,
            dt: 0.005,
            limited_mass_beta: opts.limited_mass_beta,
            eps: opts.eps,
        })
    }

    pub fn mono_type(&self) -> MonoType {
        self.mono_type
    }

    pub fn layout(&self) -> &DgLayout {
        &self.layout
    }

    pub fn bounds(&self) -> &SolutionBounds {
        &self.bounds
    }

    pub fn lumped_mass(&self) -> &[f64] {
        &self.lumped
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Step size the FCT blend and the limited correction are tuned for.
    pub fn set_dt(&mut self, dt: f64) {
        debug_assert!(dt > 0.0, "time step must be positive");
        self.dt = dt;
    }

    /// Refresh the admissible bounds from the solution at the start of a step.
    pub fn compute_bounds(&mut self, u: &[f64]) -> Result<(), MeshDdmError> {
        self.bounds.compute(&self.k, u)
    }

    /// `sum_i lumped_i u_i`.
    pub fn lumped_mass_integral(&self, u: &[f64]) -> f64 {
        self.lumped.iter().zip(u).map(|(m, v)| m * v).sum()
    }

    /// Time derivative `y = du/dt` at state `x`.
    pub fn mult(&mut self, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        check_len("state", self.lumped.len(), x.len())?;
        check_len("derivative", self.lumped.len(), y.len())?;
        if self.mono_type.bounds_inside_step() {
            self.bounds.compute(&self.k, x)?;
        }
        match &self.strategy {
            Strategy::HighOrder => self.high_order(x, y),
            Strategy::LowOrder(lo) => self.low_order(lo, x, y),
            Strategy::FluxCorrected(lo) => {
                let mut yh = vec![0.0; x.len()];
                let mut yl = vec![0.0; x.len()];
                self.high_order(x, &mut yh)?;
                self.low_order(lo, x, &mut yl)?;
                self.fct_solution(x, &yh, &yl, y);
                Ok(())
            }
            Strategy::LimitedMass(lo) => {
                self.low_order(lo, x, y)?;
                self.limited_solution(x, y)
            }
        }
    }

    /// `y = M^{-1} (K x + b)`.
    pub fn high_order(&self, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        let mut z = self.b.clone();
        self.k.mul_add_vec(x, &mut z)?;
        self.solver.solve(&z, y)
    }

    fn low_order(&self, lo: &LowOrder, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        let layout = &self.layout;
        let nd = layout.nd();
        match lo {
            LowOrder::DiscreteUpwind { kpd, lump_faces } => {
                kpd.mul_vec(x, y)?;
                for (yi, bi) in y.iter_mut().zip(&self.b) {
                    *yi += bi;
                }
                let alpha = vec![0.0; nd];
                let bd = layout.boundary_dofs();
                for k in 0..layout.num_elements() {
                    if let (true, Some(face)) = (*lump_faces, &self.face_flux) {
                        lump_flux_terms(layout, &bd, face, k, x, y, &alpha, self.eps);
                    }
                    for d in k * nd..(k + 1) * nd {
                        y[d] /= self.lumped[d];
                    }
                }
            }
            LowOrder::Rusanov(r) => {
                let mut z = self.b.clone();
                self.k.mul_add_vec(x, &mut z)?;
                for k in 0..layout.num_elements() {
                    r.apply_element(layout, k, x, &mut z, &self.lumped, y);
                }
            }
            LowOrder::ResidualDistribution {
                fluct,
                params,
                sub_cell,
            } => {
                let mut z = vec![0.0; x.len()];
                fluct.mul_vec(x, &mut z)?;
                y.copy_from_slice(&self.b);
                if layout.dim() == 1 {
                    self.k.mul_add_vec(x, y)?;
                    for (yi, zi) in y.iter_mut().zip(&z) {
                        *yi -= zi;
                    }
                }
                Distribution {
                    layout,
                    params: *params,
                    subcell: self.subcell.as_ref().filter(|_| *sub_cell),
                    face: self.face_flux.as_ref(),
                    bounds: &self.bounds,
                    lumped: &self.lumped,
                }
                .apply(x, &z, y);
            }
        }
        Ok(())
    }

    /// Blend the high-order derivative `yh` into the low-order `yl` so that a
    /// forward Euler step of size `dt` stays within the bounds.
    pub fn fct_solution(&self, x: &[f64], yh: &[f64], yl: &[f64], y: &mut [f64]) {
        let nd = self.layout.nd();
        let dt = self.dt;
        let eps = self.eps;
        let (lo, hi) = (self.bounds.x_min(), self.bounds.x_max());
        let mut f = vec![0.0; nd];
        for k in 0..self.layout.num_elements() {
            let base = k * nd;
            let (mut sum_pos, mut sum_neg) = (0.0, 0.0);
            for (j, fj) in f.iter_mut().enumerate() {
                let d = base + j;
                let clipped = (x[d] + dt * yh[d]).max(lo[d]).min(hi[d]);
                *fj = self.lumped[d] * (clipped - (x[d] + dt * yl[d]));
                sum_pos += fj.max(0.0);
                sum_neg += fj.min(0.0);
            }
            for (j, fj) in f.iter_mut().enumerate() {
                if sum_pos + sum_neg > eps && *fj > eps {
                    *fj *= -sum_neg / sum_pos;
                }
                if sum_pos + sum_neg < -eps && *fj < -eps {
                    *fj *= -sum_pos / sum_neg;
                }
                let d = base + j;
                y[d] = yl[d] + *fj / (dt * self.lumped[d]);
            }
        }
    }

    /// Add the limited mass-matrix correction to the unscaled low-order
    /// residual `y` and divide by the lumped mass.
    pub fn limited_solution(&self, x: &[f64], y: &mut [f64]) -> Result<(), MeshDdmError> {
        let nd = self.layout.nd();
        let eps = self.eps;
        let beta = self.limited_mass_beta;
        let (lo, hi) = (self.bounds.x_min(), self.bounds.x_max());
        let mut z = vec![0.0; y.len()];
        self.solver.solve(y, &mut z)?;
        let mut alpha = vec![1.0; nd];
        for k in 0..self.layout.num_elements() {
            let base = k * nd;
            let ze = &z[base..base + nd];
            let z_max = ze.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let z_min = ze.iter().copied().fold(f64::INFINITY, f64::min);
            for (i, a) in alpha.iter_mut().enumerate() {
                let d = base + i;
                let room = (hi[d] - x[d]).min(x[d] - lo[d]);
                let spread = (z_max - z[d]).max(z[d] - z_min);
                *a = (beta / self.dt * room / (spread + eps)).min(1.0);
            }
            for i in 0..nd {
                let d = base + i;
                for (c, m) in self.mass.row(d) {
                    if c == d || c < base || c >= base + nd {
                        continue;
                    }
                    let j = c - base;
                    y[d] += alpha[i] * m * alpha[j] * (z[d] - z[c]);
                }
                y[d] /= self.lumped[d];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Stencil;
    use crate::fct::segment::PeriodicSegment;

    fn step(ev: &mut FctEvolution, u: &mut Vec<f64>, dt: f64) {
        let mut du = vec![0.0; u.len()];
        ev.mult(u, &mut du).unwrap();
        for (a, b) in u.iter_mut().zip(&du) {
            *a += dt * b;
        }
    }

    fn square_wave(seg: &PeriodicSegment) -> Vec<f64> {
        seg.interpolate(|x| if (0.2..0.5).contains(&x) { 1.0 } else { 0.0 })
    }

    fn opts(mono_type: MonoType) -> FctOptions {
        FctOptions {
            mono_type,
            stencil: Stencil::Full,
            sub_cell: false,
            ..Default::default()
        }
    }

    #[test]
    fn every_scheme_builds_on_the_segment() {
        for mono in MonoType::ALL {
            let seg = PeriodicSegment::new(8, 1.0, 1.0).unwrap();
            let ev = FctEvolution::new(seg.problem(), &opts(mono)).unwrap();
            assert_eq!(ev.mono_type(), mono);
        }
    }

    #[test]
    fn high_order_derivative_of_a_constant_is_zero() {
        let seg = PeriodicSegment::new(6, 1.0, 0.7).unwrap();
        let mut ev = FctEvolution::new(seg.problem(), &opts(MonoType::None)).unwrap();
        let u = vec![2.0; seg.layout().num_dofs()];
        let mut du = vec![1.0; u.len()];
        ev.mult(&u, &mut du).unwrap();
        assert!(du.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn flux_corrected_steps_stay_in_bounds() {
        for mono in [MonoType::DiscUpwFct, MonoType::RusanovFct, MonoType::ResDistFct] {
            let seg = PeriodicSegment::new(20, 1.0, 1.0).unwrap();
            let dt = 0.1 * seg.h();
            let mut ev = FctEvolution::new(seg.problem(), &opts(mono)).unwrap();
            ev.set_dt(dt);
            let mut u = square_wave(&seg);
            for _ in 0..30 {
                ev.compute_bounds(&u).unwrap();
                let (lo, hi) = (ev.bounds().x_min().to_vec(), ev.bounds().x_max().to_vec());
                step(&mut ev, &mut u, dt);
                for i in 0..u.len() {
                    assert!(u[i] >= lo[i] - 1e-10 && u[i] <= hi[i] + 1e-10, "{mono:?} dof {i}");
                }
            }
        }
    }

    #[test]
    fn low_order_schemes_conserve_lumped_mass() {
        for mono in [MonoType::DiscUpw, MonoType::Rusanov, MonoType::ResDist] {
            let seg = PeriodicSegment::new(16, 1.0, -0.8).unwrap();
            let dt = 0.1 * seg.h();
            let mut ev = FctEvolution::new(seg.problem(), &opts(mono)).unwrap();
            let mut u = square_wave(&seg);
            let m0 = ev.lumped_mass_integral(&u);
            for _ in 0..50 {
                step(&mut ev, &mut u, dt);
            }
            let m1 = ev.lumped_mass_integral(&u);
            assert!((m0 - m1).abs() < 1e-12, "{mono:?}: {m0} -> {m1}");
        }
    }

    #[test]
    fn limited_mass_correction_vanishes_for_constants() {
        let seg = PeriodicSegment::new(5, 1.0, 1.0).unwrap();
        let mut ev = FctEvolution::new(seg.problem(), &opts(MonoType::ResDistLimMass)).unwrap();
        let u = vec![0.3; seg.layout().num_dofs()];
        let mut du = vec![1.0; u.len()];
        ev.mult(&u, &mut du).unwrap();
        assert!(du.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn residual_distribution_in_2d_needs_face_data() {
        let seg = PeriodicSegment::new(4, 1.0, 1.0).unwrap();
        let mut problem = seg.problem();
        problem.layout = DgLayout::new(2, 1, 2).unwrap();
        let err = FctEvolution::new(problem, &opts(MonoType::ResDist));
        assert!(err.is_err());
    }

    #[test]
    fn rusanov_without_coefficients_is_rejected() {
        let seg = PeriodicSegment::new(4, 1.0, 1.0).unwrap();
        let mut problem = seg.problem();
        problem.rusanov = None;
        assert!(matches!(
            FctEvolution::new(problem, &opts(MonoType::Rusanov)),
            Err(MeshDdmError::MissingFctData { scheme: "Rusanov", .. })
        ));
    }
}

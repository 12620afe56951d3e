//! Steepest-ascent gradient-path integration: from a point just off a bond
//! critical point, follow ẋ = ∇f/‖∇f‖ with an adaptive Cash–Karp RK5 step
//! (embedded 4th-order error estimate) until the trajectory runs into an
//! attractor. Two such half-paths, launched along ±(principal eigenvector),
//! make up one bond path.

use lin_alg::f64::Vec3;

use crate::{ScalarField, error::Result, eval::field_grad, wavefunction::Wavefunction};

/// Hard cap on points per half-path.
pub const GRAD_PATH_MAX_PTS: usize = 100;

/// Once the trajectory gets this close to an ACP, the endpoint is snapped to
/// the ACP position and the path is complete.
const SNAP_DIST: f64 = 0.1;
/// Same, for the near-flat-gradient terminal check (the field is very soft
/// around a non-nuclear attractor).
const SNAP_DIST_FLAT: f64 = 0.3;

/// Gradients below this magnitude mean the integrand ĝ is no longer defined.
const EPS_FLAT_GRAD: f64 = 1e-12;

/// Absolute per-step displacement under which the path counts as stagnant.
const EPS_STAGNATION: f64 = 1e-8;
const STAGNANT_STEPS_ABORT: usize = 3;

const MAX_STEP: f64 = 0.2;
const RK_TOL: f64 = 1e-6;

// Cash–Karp tableau.
const B21: f64 = 0.2;
const B31: f64 = 3. / 40.;
const B32: f64 = 9. / 40.;
const B41: f64 = 0.3;
const B42: f64 = -0.9;
const B43: f64 = 1.2;
const B51: f64 = -11. / 54.;
const B52: f64 = 2.5;
const B53: f64 = -70. / 27.;
const B54: f64 = 35. / 27.;
const B61: f64 = 1631. / 55296.;
const B62: f64 = 175. / 512.;
const B63: f64 = 575. / 13824.;
const B64: f64 = 44275. / 110592.;
const B65: f64 = 253. / 4096.;
/// 5th-order weights.
const C: [f64; 6] = [37. / 378., 0., 250. / 621., 125. / 594., 0., 512. / 1771.];
/// (5th − 4th)-order weight differences, for the error estimate.
const DC: [f64; 6] = [
    37. / 378. - 2825. / 27648.,
    0.,
    250. / 621. - 18575. / 48384.,
    125. / 594. - 13525. / 55296.,
    -277. / 14336.,
    512. / 1771. - 0.25,
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathEnd {
    /// Terminated on the ACP with this index; the final point is snapped to
    /// its position.
    Acp(usize),
    /// Point cap reached before reaching an attractor.
    Truncated,
    /// Successive steps stopped making progress.
    Stagnated,
}

#[derive(Clone, Debug)]
pub struct GradPath {
    pub points: Vec<Vec3>,
    pub end: PathEnd,
}

fn nearest_acp(x: Vec3, acp_positions: &[Vec3]) -> Option<(usize, f64)> {
    acp_positions
        .iter()
        .enumerate()
        .map(|(i, &p)| (i, (x - p).magnitude()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Integrate one half-path from `from` (already displaced off the BCP).
pub fn trace(
    wf: &Wavefunction,
    field: ScalarField,
    from: Vec3,
    h0: f64,
    acp_positions: &[Vec3],
) -> Result<GradPath> {
    let mut x = from;
    let mut h = h0;
    let mut points = vec![from];
    let mut stagnant = 0;

    // ĝ = ∇f/‖∇f‖, undefined where the gradient vanishes.
    let unit_grad = |p: Vec3| -> Result<Option<Vec3>> {
        let (_, g) = field_grad(wf, field, p)?;
        let mag = g.magnitude();
        if mag < EPS_FLAT_GRAD || !mag.is_finite() {
            return Ok(None);
        }
        Ok(Some(g / mag))
    };

    while points.len() < GRAD_PATH_MAX_PTS {
        let Some(k1) = unit_grad(x)? else {
            return Ok(finish_flat(x, points, acp_positions));
        };

        // One adaptive attempt: shrink h until the embedded error passes.
        let mut accepted = None;
        for _ in 0..24 {
            let Some(k2) = unit_grad(x + k1 * (B21 * h))? else {
                return Ok(finish_flat(x, points, acp_positions));
            };
            let Some(k3) = unit_grad(x + (k1 * B31 + k2 * B32) * h)? else {
                return Ok(finish_flat(x, points, acp_positions));
            };
            let Some(k4) = unit_grad(x + (k1 * B41 + k2 * B42 + k3 * B43) * h)? else {
                return Ok(finish_flat(x, points, acp_positions));
            };
            let Some(k5) = unit_grad(x + (k1 * B51 + k2 * B52 + k3 * B53 + k4 * B54) * h)? else {
                return Ok(finish_flat(x, points, acp_positions));
            };
            let Some(k6) = unit_grad(
                x + (k1 * B61 + k2 * B62 + k3 * B63 + k4 * B64 + k5 * B65) * h,
            )?
            else {
                return Ok(finish_flat(x, points, acp_positions));
            };

            let ks = [k1, k2, k3, k4, k5, k6];
            let mut delta = Vec3::new_zero();
            let mut err = Vec3::new_zero();
            for (i, k) in ks.iter().enumerate() {
                delta = delta + *k * (C[i] * h);
                err = err + *k * (DC[i] * h);
            }

            let err_max = err.x.abs().max(err.y.abs()).max(err.z.abs());
            if err_max <= RK_TOL || h < 1e-7 {
                accepted = Some(delta);
                break;
            }
            h *= 0.5;
        }

        let Some(delta) = accepted else {
            return Ok(GradPath { points, end: PathEnd::Stagnated });
        };

        x = x + delta;
        points.push(x);
        h = (h * 1.2).min(MAX_STEP);

        if delta.magnitude() < EPS_STAGNATION {
            stagnant += 1;
            if stagnant >= STAGNANT_STEPS_ABORT {
                return Ok(GradPath { points, end: PathEnd::Stagnated });
            }
        } else {
            stagnant = 0;
        }

        if let Some((idx, dist)) = nearest_acp(x, acp_positions) {
            if dist < SNAP_DIST {
                *points.last_mut().unwrap() = acp_positions[idx];
                return Ok(GradPath { points, end: PathEnd::Acp(idx) });
            }
        }
    }

    Ok(GradPath { points, end: PathEnd::Truncated })
}

/// The gradient vanished under the integrator: either we are sitting on an
/// attractor (snap to it) or the path died in a flat region.
fn finish_flat(x: Vec3, mut points: Vec<Vec3>, acp_positions: &[Vec3]) -> GradPath {
    if let Some((idx, dist)) = nearest_acp(x, acp_positions) {
        if dist < SNAP_DIST_FLAT {
            points.push(acp_positions[idx]);
            return GradPath { points, end: PathEnd::Acp(idx) };
        }
    }
    GradPath { points, end: PathEnd::Stagnated }
}

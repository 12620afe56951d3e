//! The kind-specific critical-point search: an eigenvector-following Newton
//! optimizer after Chem. Phys. Lett. 228 (1994) 160, which scales the step
//! independently along each Hessian eigendirection so the iteration is pulled
//! toward a stationary point of the prescribed signature even when started
//! where the local curvature disagrees.

use std::sync::atomic::{AtomicBool, Ordering};

use lin_alg::f64::Vec3;

use crate::{
    CpKind, ScalarField,
    eigen::eigen_sym3,
    error::Result,
    eval::field_grad_hess,
    wavefunction::Wavefunction,
};

/// Convergence threshold on ‖∇f‖.
pub const EPS_GRAD_MAG: f64 = 1e-14;

/// Eigenvalues closer to zero than this count as positive when computing the
/// Hessian signature.
const EPS_EIGEN_ZERO: f64 = 1e-10;

/// A stationary point the optimizer landed on; the signature may or may not
/// match the kind that was searched for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Converged {
    pub posit: Vec3,
    pub value: f64,
    pub grad_mag: f64,
    pub signature: i8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SearchOutcome {
    Converged(Converged),
    /// Iteration cap reached; the seed is discarded.
    NoConvergence,
    /// The cooperative cancel flag was raised mid-search.
    Cancelled,
}

impl CpKind {
    /// Which sorted eigendirections (ascending λ) the field is maximized
    /// along at a CP of this kind. The remainder are minimize directions.
    fn maximize_dirs(self) -> [bool; 3] {
        match self {
            Self::Acp => [true, true, true],
            Self::Bcp => [true, true, false],
            Self::Rcp => [true, false, false],
            Self::Ccp => [false, false, false],
        }
    }

    /// Cap on ‖Δx‖ per Newton iteration.
    pub fn max_step(self) -> f64 {
        match self {
            Self::Acp => 0.1,
            Self::Bcp => 0.4,
            Self::Rcp => 0.35,
            Self::Ccp => 0.3,
        }
    }

    /// Default iteration cap; overridable through `Config`.
    pub fn default_max_iterations(self) -> usize {
        match self {
            Self::Acp => 40,
            Self::Bcp => 80,
            Self::Rcp => 100,
            Self::Ccp => 240,
        }
    }
}

/// Signature from eigenvalue signs; zeros within tolerance count positive.
pub fn signature_from_eigenvalues(vals: [f64; 3]) -> i8 {
    let mut sig = 0;
    for v in vals {
        if v < -EPS_EIGEN_ZERO {
            sig -= 1;
        } else {
            sig += 1;
        }
    }
    sig
}

/// One eigenvector-following step toward a CP of the given kind.
///
/// With F_k = v_k·∇f, the shifted-Newton roots
///   h_k = (λ_k + √(λ_k² + 4F_k²)) / (2F_k)   (maximize directions)
///   h_k = (λ_k − √(λ_k² + 4F_k²)) / (2F_k)   (minimize directions)
/// both reduce to the plain Newton step −F_k/λ_k once the local curvature
/// already has the target sign, and grow into an escape step when it does
/// not. Each root is evaluated in the algebraic form that avoids
/// cancellation for the sign of λ_k: near convergence 4F_k² is far below
/// λ_k²'s last bit, and the naive difference of λ and the square root would
/// freeze the iteration around ‖g‖ ≈ 1e-11. The step is capped at the
/// kind's maximum length.
pub fn evf_step(kind: CpKind, grad: Vec3, hess: [[f64; 3]; 3]) -> (Vec3, i8) {
    let (vals, vecs) = eigen_sym3(hess);
    let maximize = kind.maximize_dirs();

    let mut step = Vec3::new_zero();
    for k in 0..3 {
        let v = Vec3::new(vecs[k][0], vecs[k][1], vecs[k][2]);
        let f = v.dot(grad);
        if f.abs() < 1e-30 {
            continue;
        }

        let lam = vals[k];
        let root = (lam * lam + 4. * f * f).sqrt();
        let h = if maximize[k] {
            if lam > 0. {
                (lam + root) / (2. * f)
            } else {
                2. * f / (root - lam)
            }
        } else if lam < 0. {
            (lam - root) / (2. * f)
        } else {
            -2. * f / (root + lam)
        };

        step = step + v * h;
    }

    let mag = step.magnitude();
    let cap = kind.max_step();
    if mag > cap {
        step = step * (cap / mag);
    }

    (step, signature_from_eigenvalues(vals))
}

/// Run the Newton search from one seed. Returns `Err` only for a non-finite
/// field evaluation (which aborts the whole run); failure to converge is an
/// ordinary outcome.
pub fn newton_search(
    wf: &Wavefunction,
    field: ScalarField,
    kind: CpKind,
    seed: Vec3,
    max_iterations: usize,
    cancel: &AtomicBool,
) -> Result<SearchOutcome> {
    let mut x = seed;

    for _ in 0..max_iterations {
        if cancel.load(Ordering::Relaxed) {
            return Ok(SearchOutcome::Cancelled);
        }

        let sample = field_grad_hess(wf, field, x)?;
        let grad_mag = sample.grad.magnitude();

        if grad_mag < EPS_GRAD_MAG {
            let (vals, _) = eigen_sym3(sample.hessian);
            return Ok(SearchOutcome::Converged(Converged {
                posit: x,
                value: sample.value,
                grad_mag,
                signature: signature_from_eigenvalues(vals),
            }));
        }

        let (step, _) = evf_step(kind, sample.grad, sample.hessian);
        x = x + step;
    }

    Ok(SearchOutcome::NoConvergence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_counts_zeros_as_positive() {
        assert_eq!(signature_from_eigenvalues([-2., -1., -0.5]), -3);
        assert_eq!(signature_from_eigenvalues([-2., -1., 0.5]), -1);
        assert_eq!(signature_from_eigenvalues([-2., 1e-14, 0.5]), 1);
        assert_eq!(signature_from_eigenvalues([1., 2., 3.]), 3);
    }

    #[test]
    fn evf_step_is_newton_near_a_matching_cp() {
        // Quadratic model of a maximum: H = diag(−2, −1.5, −1), g = H·(x − x*).
        let hess = [[-2., 0., 0.], [0., -1.5, 0.], [0., 0., -1.]];
        let offset = Vec3::new(0.01, -0.02, 0.015);
        let grad = Vec3::new(-2. * offset.x, -1.5 * offset.y, -1. * offset.z);

        let (step, sig) = evf_step(CpKind::Acp, grad, hess);
        assert_eq!(sig, -3);
        // Newton would step exactly back to x*.
        assert!((step + offset).magnitude() < 1e-4);
    }

    #[test]
    fn evf_step_escapes_wrong_curvature() {
        // BCP search sitting in an all-negative-curvature region: the step
        // along the softest mode should be large (capped), not Newton-small.
        let hess = [[-2., 0., 0.], [0., -1.5, 0.], [0., 0., -0.1]];
        let grad = Vec3::new(0.001, 0.001, 0.01);

        let (step, _) = evf_step(CpKind::Bcp, grad, hess);
        assert!(step.magnitude() > 0.05);
        assert!(step.magnitude() <= CpKind::Bcp.max_step() + 1e-12);
    }

    #[test]
    fn step_caps_respected() {
        let hess = [[0.01, 0., 0.], [0., 0.02, 0.], [0., 0., 0.03]];
        let grad = Vec3::new(5., -3., 2.);

        for kind in [CpKind::Acp, CpKind::Bcp, CpKind::Rcp, CpKind::Ccp] {
            let (step, _) = evf_step(kind, grad, hess);
            assert!(step.magnitude() <= kind.max_step() + 1e-12);
        }
    }
}

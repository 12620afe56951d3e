//! Field evaluation over a [`Wavefunction`]: the electron density ρ, the
//! Localized Orbital Locator γ (LOL), and their gradients and Hessians at
//! arbitrary points. Everything here is a pure function of the immutable
//! wavefunction; these routines are hit millions of times from the
//! critical-point optimizers, which also call them from rayon workers.
//!
//! Each Cartesian Gaussian primitive factorizes per axis:
//! χ(r) = Π_k p_k(x_k)·exp(−α‖r−R‖²). We evaluate the polynomial factors
//! through the third derivative per axis, so one exp() per primitive serves
//! value, gradient, Hessian, and the third derivatives that the LOL Hessian
//! needs through the kinetic-energy density.

use lin_alg::f64::Vec3;

use crate::{
    ScalarField,
    error::{Error, Result},
    wavefunction::Wavefunction,
};

/// Below this density the LOL branch substitutes τ = 0, yielding γ = 0 with
/// zero derivatives rather than dividing by a vanishing kinetic-energy
/// density.
pub const EPS_RHO_LOL: f64 = 1e-20;

/// (3/5)·(6π²)^{2/3}, the closed-shell Thomas–Fermi prefactor in
/// τ = CF·ρ^{5/3}/G.
const LOL_CF: f64 = 9.115599744691192;

/// Value, gradient, and Hessian of one scalar field at one point.
#[derive(Clone, Copy, Debug)]
pub struct FieldSample {
    pub value: f64,
    pub grad: Vec3,
    pub hessian: [[f64; 3]; 3],
}

/// Polynomial factors of x^a·exp(−αx²) with the exponential stripped:
/// value and first three derivatives, via repeated application of
/// D(p) = p′ − 2αx·p.
#[inline]
fn axis_factors(a: i32, alpha: f64, x: f64) -> [f64; 4] {
    let xp = |e: i32| if e < 0 { 0. } else { x.powi(e) };
    let af = a as f64;
    let al2 = 2. * alpha;

    let p0 = xp(a);
    let p1 = af * xp(a - 1) - al2 * xp(a + 1);
    let p2 = af * (af - 1.) * xp(a - 2) - al2 * (2. * af + 1.) * xp(a)
        + al2 * al2 * xp(a + 2);
    let p3 = af * (af - 1.) * (af - 2.) * xp(a - 3) - 3. * al2 * af * af * xp(a - 1)
        + 3. * al2 * al2 * (af + 1.) * xp(a + 1)
        - al2 * al2 * al2 * xp(a + 3);

    [p0, p1, p2, p3]
}

/// Per-primitive value and Cartesian derivatives at a field point. The third
/// derivative tensor is only filled when `with_third` is set.
#[derive(Clone)]
struct PrimDerivs {
    chi: f64,
    d1: [f64; 3],
    d2: [[f64; 3]; 3],
    d3: [[[f64; 3]; 3]; 3],
}

/// Evaluate every primitive's χ and derivatives at `p`. The outer loop runs
/// over nuclear centers so each center's Δr (and each primitive's exp) is
/// computed once.
fn eval_prims(wf: &Wavefunction, p: Vec3, with_third: bool) -> Vec<PrimDerivs> {
    let mut result = Vec::with_capacity(wf.npri());
    let mut prim = 0;

    for (center, &count) in wf.prims_per_center().iter().enumerate() {
        let dr = p - wf.nuclei[center].posit;
        let r2 = dr.magnitude_squared();

        for _ in 0..count {
            let alpha = wf.prim_exps[prim];
            let [l, m, n] = wf.ang_exponents(prim);

            let e = (-alpha * r2).exp();
            let fx = axis_factors(l, alpha, dr.x);
            let fy = axis_factors(m, alpha, dr.y);
            let fz = axis_factors(n, alpha, dr.z);

            // Derivative component for a per-axis order multi-index.
            let comp = |cx: usize, cy: usize, cz: usize| fx[cx] * fy[cy] * fz[cz] * e;

            let chi = comp(0, 0, 0);
            let d1 = [comp(1, 0, 0), comp(0, 1, 0), comp(0, 0, 1)];

            let mut d2 = [[0.; 3]; 3];
            for i in 0..3 {
                for j in i..3 {
                    let mut c = [0usize; 3];
                    c[i] += 1;
                    c[j] += 1;
                    let v = comp(c[0], c[1], c[2]);
                    d2[i][j] = v;
                    d2[j][i] = v;
                }
            }

            let mut d3 = [[[0.; 3]; 3]; 3];
            if with_third {
                for i in 0..3 {
                    for j in i..3 {
                        for k in j..3 {
                            let mut c = [0usize; 3];
                            c[i] += 1;
                            c[j] += 1;
                            c[k] += 1;
                            let v = comp(c[0], c[1], c[2]);
                            // All permutations of (i, j, k).
                            d3[i][j][k] = v;
                            d3[i][k][j] = v;
                            d3[j][i][k] = v;
                            d3[j][k][i] = v;
                            d3[k][i][j] = v;
                            d3[k][j][i] = v;
                        }
                    }
                }
            }

            result.push(PrimDerivs { chi, d1, d2, d3 });
            prim += 1;
        }
    }

    result
}

/// Electron density ρ(p) = Σ_ab Cab·χa·χb, exploiting Cab symmetry.
pub fn rho(wf: &Wavefunction, p: Vec3) -> f64 {
    let prims = eval_prims(wf, p, false);
    let npri = wf.npri();

    let mut dens = 0.;
    for a in 0..npri {
        let chi_a = prims[a].chi;
        dens += wf.cab(a, a) * chi_a * chi_a;
        let mut cross = 0.;
        for b in (a + 1)..npri {
            cross += wf.cab(a, b) * prims[b].chi;
        }
        dens += 2. * chi_a * cross;
    }

    dens
}

/// ρ and ∇ρ in a single pass over the primitive pairs.
pub fn rho_grad(wf: &Wavefunction, p: Vec3) -> (f64, Vec3) {
    let prims = eval_prims(wf, p, false);
    let npri = wf.npri();

    let mut dens = 0.;
    let mut grad = [0.; 3];

    for a in 0..npri {
        let pa = &prims[a];
        for b in a..npri {
            let pb = &prims[b];
            let f = if a == b { wf.cab(a, a) } else { 2. * wf.cab(a, b) };

            dens += f * pa.chi * pb.chi;
            for k in 0..3 {
                grad[k] += f * (pa.d1[k] * pb.chi + pa.chi * pb.d1[k]);
            }
        }
    }

    (dens, Vec3::new(grad[0], grad[1], grad[2]))
}

/// ρ, ∇ρ, and the six independent Hessian components, accumulated together.
pub fn rho_grad_hess(wf: &Wavefunction, p: Vec3) -> (f64, Vec3, [[f64; 3]; 3]) {
    let prims = eval_prims(wf, p, false);
    let npri = wf.npri();

    let mut dens = 0.;
    let mut grad = [0.; 3];
    let mut hess = [[0.; 3]; 3];

    for a in 0..npri {
        let pa = &prims[a];
        for b in a..npri {
            let pb = &prims[b];
            let f = if a == b { wf.cab(a, a) } else { 2. * wf.cab(a, b) };

            dens += f * pa.chi * pb.chi;
            for k in 0..3 {
                grad[k] += f * (pa.d1[k] * pb.chi + pa.chi * pb.d1[k]);
            }
            for k in 0..3 {
                for l in k..3 {
                    hess[k][l] += f
                        * (pa.d2[k][l] * pb.chi
                            + pa.d1[k] * pb.d1[l]
                            + pa.d1[l] * pb.d1[k]
                            + pa.chi * pb.d2[k][l]);
                }
            }
        }
    }
    for k in 1..3 {
        for l in 0..k {
            hess[k][l] = hess[l][k];
        }
    }

    (dens, Vec3::new(grad[0], grad[1], grad[2]), hess)
}

/// ∇²ρ, the Hessian trace.
pub fn lap_rho(wf: &Wavefunction, p: Vec3) -> f64 {
    let (_, _, h) = rho_grad_hess(wf, p);
    h[0][0] + h[1][1] + h[2][2]
}

/// Positive-definite kinetic-energy density
/// G(p) = ½·Σ_ab Cab·∇χa·∇χb = ½·Σ_μ occ[μ]·‖∇φ_μ(p)‖².
pub fn kinetic_energy_g(wf: &Wavefunction, p: Vec3) -> f64 {
    let prims = eval_prims(wf, p, false);
    g_from_prims(wf, &prims).0
}

/// G together with ∇G; Hessian of G additionally requires `with_third`
/// primitives and is produced by `g_grad_hess_from_prims`.
fn g_from_prims(wf: &Wavefunction, prims: &[PrimDerivs]) -> (f64, [f64; 3]) {
    let npri = wf.npri();
    let mut g = 0.;
    let mut gg = [0.; 3];

    for a in 0..npri {
        let pa = &prims[a];
        for b in a..npri {
            let pb = &prims[b];
            let f = if a == b { 0.5 * wf.cab(a, a) } else { wf.cab(a, b) };

            let mut dot = 0.;
            for j in 0..3 {
                dot += pa.d1[j] * pb.d1[j];
            }
            g += f * dot;

            for k in 0..3 {
                let mut s = 0.;
                for j in 0..3 {
                    s += pa.d2[k][j] * pb.d1[j] + pa.d1[j] * pb.d2[k][j];
                }
                gg[k] += f * s;
            }
        }
    }

    (g, gg)
}

fn g_grad_hess_from_prims(
    wf: &Wavefunction,
    prims: &[PrimDerivs],
) -> (f64, [f64; 3], [[f64; 3]; 3]) {
    let (g, gg) = g_from_prims(wf, prims);
    let npri = wf.npri();
    let mut gh = [[0.; 3]; 3];

    for a in 0..npri {
        let pa = &prims[a];
        for b in a..npri {
            let pb = &prims[b];
            let f = if a == b { 0.5 * wf.cab(a, a) } else { wf.cab(a, b) };

            for k in 0..3 {
                for l in k..3 {
                    let mut s = 0.;
                    for j in 0..3 {
                        s += pa.d3[k][l][j] * pb.d1[j]
                            + pa.d2[k][j] * pb.d2[l][j]
                            + pa.d2[l][j] * pb.d2[k][j]
                            + pa.d1[j] * pb.d3[k][l][j];
                    }
                    gh[k][l] += f * s;
                }
            }
        }
    }
    for k in 1..3 {
        for l in 0..k {
            gh[k][l] = gh[l][k];
        }
    }

    (g, gg, gh)
}

/// Localized Orbital Locator γ = τ/(1+τ), τ = CF·ρ^{5/3}/G, bounded to
/// [0, 1]. Evaluated as γ = t/(t+G) with t = CF·ρ^{5/3}, which stays finite
/// where G vanishes (γ → 1 at stationary points of a single occupied
/// orbital).
pub fn lol(wf: &Wavefunction, p: Vec3) -> f64 {
    let dens = rho(wf, p);
    if dens < EPS_RHO_LOL {
        return 0.;
    }
    let g = kinetic_energy_g(wf, p);

    let t = LOL_CF * dens.powf(5. / 3.);
    t / (t + g)
}

/// γ with its analytic gradient and Hessian, differentiated through both ρ
/// and G. Near-zero density short-circuits to all zeros (the NaN-free
/// contract).
pub fn lol_grad_hess(wf: &Wavefunction, p: Vec3) -> (f64, Vec3, [[f64; 3]; 3]) {
    let prims = eval_prims(wf, p, true);
    let npri = wf.npri();

    // ρ, ∇ρ, H(ρ) from the same primitive pass.
    let mut dens = 0.;
    let mut dg = [0.; 3];
    let mut dh = [[0.; 3]; 3];
    for a in 0..npri {
        let pa = &prims[a];
        for b in a..npri {
            let pb = &prims[b];
            let f = if a == b { wf.cab(a, a) } else { 2. * wf.cab(a, b) };
            dens += f * pa.chi * pb.chi;
            for k in 0..3 {
                dg[k] += f * (pa.d1[k] * pb.chi + pa.chi * pb.d1[k]);
            }
            for k in 0..3 {
                for l in k..3 {
                    dh[k][l] += f
                        * (pa.d2[k][l] * pb.chi
                            + pa.d1[k] * pb.d1[l]
                            + pa.d1[l] * pb.d1[k]
                            + pa.chi * pb.d2[k][l]);
                }
            }
        }
    }
    for k in 1..3 {
        for l in 0..k {
            dh[k][l] = dh[l][k];
        }
    }

    let zero = (0., Vec3::new_zero(), [[0.; 3]; 3]);
    if dens < EPS_RHO_LOL {
        return zero;
    }
    let (g, gg, gh) = g_grad_hess_from_prims(wf, &prims);

    // γ = t/(t+G) with t = CF·ρ^{5/3}; the quotient rule runs through ρ and
    // G. t+G > 0 whenever ρ is above the guard, so no division hazards.
    let r23 = dens.powf(2. / 3.);
    let t = LOL_CF * r23 * dens;
    let mut tg = [0.; 3];
    let mut th = [[0.; 3]; 3];
    for k in 0..3 {
        tg[k] = (5. / 3.) * LOL_CF * r23 * dg[k];
    }
    for k in 0..3 {
        for l in 0..3 {
            th[k][l] =
                (5. / 3.) * LOL_CF * r23 * ((2. / 3.) * dg[k] * dg[l] / dens + dh[k][l]);
        }
    }

    let denom = t + g;
    let gamma = t / denom;

    // Numerator of ∇γ: G·∇t − t·∇G.
    let mut num = [0.; 3];
    for k in 0..3 {
        num[k] = g * tg[k] - t * gg[k];
    }

    let mut grad = [0.; 3];
    for k in 0..3 {
        grad[k] = num[k] / (denom * denom);
    }

    let mut hess = [[0.; 3]; 3];
    for k in 0..3 {
        for l in 0..3 {
            let num_l = gg[l] * tg[k] + g * th[k][l] - tg[l] * gg[k] - t * gh[k][l];
            hess[k][l] =
                num_l / (denom * denom) - 2. * num[k] * (tg[l] + gg[l]) / (denom * denom * denom);
        }
    }

    (gamma, Vec3::new(grad[0], grad[1], grad[2]), hess)
}

/// Value of the chosen field.
pub fn field_value(wf: &Wavefunction, field: ScalarField, p: Vec3) -> f64 {
    match field {
        ScalarField::Rho => rho(wf, p),
        ScalarField::Lol => lol(wf, p),
    }
}

/// Value and gradient of the chosen field (no Hessian); the gradient-path
/// integrator's workhorse.
pub fn field_grad(wf: &Wavefunction, field: ScalarField, p: Vec3) -> Result<(f64, Vec3)> {
    let (value, grad) = match field {
        ScalarField::Rho => rho_grad(wf, p),
        ScalarField::Lol => {
            let (v, g, _) = lol_grad_hess(wf, p);
            (v, g)
        }
    };

    if !(value.is_finite() && grad.x.is_finite() && grad.y.is_finite() && grad.z.is_finite()) {
        return Err(Error::Numerical { point: p });
    }

    Ok((value, grad))
}

/// Value, gradient, and Hessian of the chosen field, with the finiteness
/// status check at the component boundary: the optimizers never see NaN or
/// infinity from here, they see `Error::Numerical`.
pub fn field_grad_hess(wf: &Wavefunction, field: ScalarField, p: Vec3) -> Result<FieldSample> {
    let (value, grad, hessian) = match field {
        ScalarField::Rho => rho_grad_hess(wf, p),
        ScalarField::Lol => lol_grad_hess(wf, p),
    };

    let finite = value.is_finite()
        && grad.x.is_finite()
        && grad.y.is_finite()
        && grad.z.is_finite()
        && hessian.iter().flatten().all(|v| v.is_finite());

    if !finite {
        return Err(Error::Numerical { point: p });
    }

    Ok(FieldSample { value, grad, hessian })
}

/// The per-point property bundle reports are built from.
#[derive(Clone, Copy, Debug)]
pub struct FieldProperties {
    pub rho: f64,
    pub grad_rho_mag: f64,
    pub lap_rho: f64,
    pub kinetic_g: f64,
    pub lol: f64,
}

pub fn field_properties(wf: &Wavefunction, p: Vec3) -> FieldProperties {
    let (dens, grad, hess) = rho_grad_hess(wf, p);

    FieldProperties {
        rho: dens,
        grad_rho_mag: grad.magnitude(),
        lap_rho: hess[0][0] + hess[1][1] + hess[2][2],
        kinetic_g: kinetic_energy_g(wf, p),
        lol: lol(wf, p),
    }
}

impl std::fmt::Display for FieldProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Rho:        {:>16.10e}", self.rho)?;
        writeln!(f, "  |grad Rho|: {:>16.10e}", self.grad_rho_mag)?;
        writeln!(f, "  Lap Rho:    {:>16.10e}", self.lap_rho)?;
        writeln!(f, "  KED G:      {:>16.10e}", self.kinetic_g)?;
        write!(f, "  LOL:        {:>16.10e}", self.lol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavefunction::Nucleus;

    /// Single normalized-ish s primitive on one center: ρ = occ·c²·exp(−2αr²).
    fn one_prim_wf() -> Wavefunction {
        Wavefunction::new(
            vec![Nucleus::new("H1", 1., Vec3::new_zero())],
            vec![0],
            vec![1],
            vec![0.8],
            vec![1.0],
            vec![2.0],
        )
        .unwrap()
    }

    #[test]
    fn single_s_primitive_density() {
        let wf = one_prim_wf();
        let p = Vec3::new(0.3, -0.2, 0.5);
        let r2 = p.magnitude_squared();

        let expected = 2.0 * (-2.0 * 0.8 * r2).exp();
        assert!((rho(&wf, p) - expected).abs() < 1e-14);
    }

    #[test]
    fn single_s_primitive_gradient() {
        let wf = one_prim_wf();
        let p = Vec3::new(0.4, 0.1, -0.3);

        let (dens, grad) = rho_grad(&wf, p);
        // ∇ρ = −4αρ·r for a single s primitive.
        let expected = p * (-4.0 * 0.8 * dens);
        assert!((grad - expected).magnitude() < 1e-12);
    }

    #[test]
    fn axis_factors_match_finite_differences() {
        let h = 1e-5;
        for &a in &[0, 1, 2, 3] {
            for &x in &[0.0, 0.37, -1.2] {
                let alpha = 0.9;
                let f = |x: f64| x.powi(a) * (-alpha * x * x).exp();
                let e = (-alpha * x * x).exp();
                let p = axis_factors(a, alpha, x);

                let d1_num = (f(x + h) - f(x - h)) / (2. * h);
                let d2_num = (f(x + h) - 2. * f(x) + f(x - h)) / (h * h);

                assert!((p[0] * e - f(x)).abs() < 1e-12, "a={a} x={x}");
                assert!((p[1] * e - d1_num).abs() < 1e-6, "a={a} x={x}");
                assert!((p[2] * e - d2_num).abs() < 1e-4, "a={a} x={x}");
            }
        }
    }

    #[test]
    fn lol_bounded_and_guarded() {
        let wf = one_prim_wf();

        let near = lol(&wf, Vec3::new(0.2, 0., 0.));
        assert!(near > 0. && near <= 1.);

        // Far from the molecule, density underflows and the guard kicks in.
        let (gamma, grad, hess) = lol_grad_hess(&wf, Vec3::new(50., 0., 0.));
        assert_eq!(gamma, 0.);
        assert_eq!(grad.magnitude(), 0.);
        assert_eq!(hess[0][0], 0.);
    }

    #[test]
    fn hessian_is_symmetric() {
        let wf = one_prim_wf();
        let (_, _, h) = rho_grad_hess(&wf, Vec3::new(0.3, 0.7, -0.1));
        for k in 0..3 {
            for l in 0..3 {
                assert_eq!(h[k][l], h[l][k]);
            }
        }
    }
}

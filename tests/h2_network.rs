//! End-to-end critical-point analysis of an H₂-like wavefunction: two
//! STO-3G-contracted s shells 1.4 bohr apart, one doubly-occupied σ orbital.
//! The density topology is the textbook case: one attractor per nucleus
//! (displaced slightly inward of it for this contraction), one bond CP at the
//! midpoint, and the z axis as the bond path.

use std::sync::atomic::AtomicBool;

use lin_alg::f64::Vec3;
use qtaim::{
    CpKind, CritPtNetwork, Config, ScalarField, Wavefunction,
    eval::{lol, lol_grad_hess, rho, rho_grad, rho_grad_hess},
    search::{self, SearchOutcome},
    wavefunction::Nucleus,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const STO3G_EXPS: [f64; 3] = [3.42525091, 0.62391373, 0.16885540];
// Contraction coefficients times the primitive normalization (2α/π)^{3/4}.
const STO3G_COEFFS: [f64; 3] = [0.2769343596911839, 0.26783885053249434, 0.08347366923669439];
// ~1/√(2(1+S)) for the σ_g combination at this separation.
const SIGMA_NORM: f64 = 0.54894;

const NUC_Z: f64 = 0.7;

fn h2() -> Wavefunction {
    let mut exps = Vec::new();
    let mut mo = Vec::new();
    for _center in 0..2 {
        for i in 0..3 {
            exps.push(STO3G_EXPS[i]);
            mo.push(SIGMA_NORM * STO3G_COEFFS[i]);
        }
    }

    Wavefunction::new(
        vec![
            Nucleus::new("H1", 1., Vec3::new(0., 0., -NUC_Z)),
            Nucleus::new("H2", 1., Vec3::new(0., 0., NUC_Z)),
        ],
        vec![0, 0, 0, 1, 1, 1],
        vec![1; 6],
        exps,
        mo,
        vec![2.0],
    )
    .unwrap()
}

fn sample_points(count: usize) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|_| {
            Vec3::new(
                rng.random_range(-1.2..1.2),
                rng.random_range(-1.2..1.2),
                rng.random_range(-1.2..1.2),
            )
        })
        .collect()
}

/// |a − b| under a relative tolerance with an absolute floor, since Hessian
/// components pass through zero inside the sampling box.
fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.)
}

#[test]
fn analytic_rho_gradient_matches_finite_differences() {
    let wf = h2();
    let h = 1e-5;

    for p in sample_points(25) {
        let (_, grad) = rho_grad(&wf, p);

        for k in 0..3 {
            let mut e = Vec3::new_zero();
            match k {
                0 => e.x = h,
                1 => e.y = h,
                _ => e.z = h,
            }
            let fd = (rho(&wf, p + e) - rho(&wf, p - e)) / (2. * h);
            let an = match k {
                0 => grad.x,
                1 => grad.y,
                _ => grad.z,
            };
            assert!(close(an, fd, 1e-6), "grad[{k}] at {p:?}: {an} vs {fd}");
        }
    }
}

#[test]
fn analytic_rho_hessian_matches_finite_differences() {
    let wf = h2();
    let h = 1e-5;

    for p in sample_points(25) {
        let (_, _, hess) = rho_grad_hess(&wf, p);

        for l in 0..3 {
            let mut e = Vec3::new_zero();
            match l {
                0 => e.x = h,
                1 => e.y = h,
                _ => e.z = h,
            }
            // Differentiate the analytic gradient once more.
            let (_, gp) = rho_grad(&wf, p + e);
            let (_, gm) = rho_grad(&wf, p - e);
            let fd = (gp - gm) / (2. * h);

            assert!(close(hess[0][l], fd.x, 1e-6), "H[0][{l}] at {p:?}");
            assert!(close(hess[1][l], fd.y, 1e-6), "H[1][{l}] at {p:?}");
            assert!(close(hess[2][l], fd.z, 1e-6), "H[2][{l}] at {p:?}");
        }
    }
}

#[test]
fn analytic_lol_derivatives_match_finite_differences() {
    let wf = h2();
    let h = 1e-5;

    for p in sample_points(15) {
        let (_, grad, hess) = lol_grad_hess(&wf, p);

        for l in 0..3 {
            let mut e = Vec3::new_zero();
            match l {
                0 => e.x = h,
                1 => e.y = h,
                _ => e.z = h,
            }

            let fd_val = (lol(&wf, p + e) - lol(&wf, p - e)) / (2. * h);
            let an = match l {
                0 => grad.x,
                1 => grad.y,
                _ => grad.z,
            };
            // The LOL surface is flatter than ρ; allow a slightly looser
            // relative tolerance than for the density.
            assert!(close(an, fd_val, 1e-5), "LOL grad[{l}] at {p:?}: {an} vs {fd_val}");

            let (_, gp, _) = lol_grad_hess(&wf, p + e);
            let (_, gm, _) = lol_grad_hess(&wf, p - e);
            let fd = (gp - gm) / (2. * h);
            assert!(close(hess[0][l], fd.x, 1e-5), "LOL H[0][{l}] at {p:?}");
            assert!(close(hess[1][l], fd.y, 1e-5), "LOL H[1][{l}] at {p:?}");
            assert!(close(hess[2][l], fd.z, 1e-5), "LOL H[2][{l}] at {p:?}");
        }
    }
}

#[test]
fn acp_search_converges_from_every_nucleus() {
    let wf = h2();
    let cancel = AtomicBool::new(false);

    for nuc in &wf.nuclei {
        let outcome = search::newton_search(
            &wf,
            ScalarField::Rho,
            CpKind::Acp,
            nuc.posit,
            CpKind::Acp.default_max_iterations(),
            &cancel,
        )
        .unwrap();

        let SearchOutcome::Converged(c) = outcome else {
            panic!("no convergence from nucleus {}", nuc.label);
        };
        assert_eq!(c.signature, -3);
        assert!(c.grad_mag < 1e-14);
        // The attractor sits just inside the nucleus for this contraction.
        assert!((c.posit - nuc.posit).magnitude() < 0.15);
    }
}

#[test]
fn h2_density_network() {
    let wf = h2();
    let mut net = CritPtNetwork::new(&wf);
    net.set_critical_points(ScalarField::Rho).unwrap();

    // 2 ACPs, 1 BCP, nothing else; Poincaré–Hopf 2 − 1 = 1.
    assert_eq!(net.acps().len(), 2);
    assert_eq!(net.bcps().len(), 1);
    assert_eq!(net.rcps().len(), 0);
    assert_eq!(net.ccps().len(), 0);
    assert_eq!(net.poincare_hopf_sum(), 1);
    assert!(net.warnings().is_empty());

    // Labels inherited from the nuclei, in nuclear order.
    assert_eq!(net.acps()[0].label, "H1");
    assert_eq!(net.acps()[1].label, "H2");

    // Signatures match kinds.
    for cp in net.acps() {
        assert_eq!(cp.signature, CpKind::Acp.signature());
    }
    let bcp = &net.bcps()[0];
    assert_eq!(bcp.signature, CpKind::Bcp.signature());
    assert_eq!(bcp.label, "H1-H2");
    let mut attractors = bcp.attractors.unwrap();
    attractors.sort();
    assert_eq!(attractors, [0, 1]);

    // The saddle lies on the symmetry center.
    assert!(bcp.posit.magnitude() < 1e-6);

    // Dedup invariant.
    for table in [net.acps(), net.bcps()] {
        for (i, a) in table.iter().enumerate() {
            for b in &table[i + 1..] {
                assert!((a.posit - b.posit).magnitude() >= qtaim::EPS_CP_DUP);
            }
        }
    }

    // The centering translation is the nuclear centroid, not applied to
    // any table.
    assert!(net.centering().magnitude() < 1e-12);
}

#[test]
fn h2_bond_path_connects_the_attractors() {
    let wf = h2();
    let mut net = CritPtNetwork::new(&wf);
    net.set_critical_points(ScalarField::Rho).unwrap();
    net.set_bond_paths().unwrap();

    assert_eq!(net.bond_paths().len(), 1);
    let bp = &net.bond_paths()[0];
    assert!(bp.complete);
    assert_eq!(bp.bcp, 0);

    // Endpoints coincide with the two ACPs, comfortably inside the 1e-4
    // coincidence tolerance since terminal points snap.
    let first = *bp.points.first().unwrap();
    let last = *bp.points.last().unwrap();
    let d0 = (first - net.acps()[0].posit).magnitude();
    let d1 = (first - net.acps()[1].posit).magnitude();
    assert!(d0.min(d1) < 1e-4);
    let e0 = (last - net.acps()[0].posit).magnitude();
    let e1 = (last - net.acps()[1].posit).magnitude();
    assert!(e0.min(e1) < 1e-4);
    // ...and they are different attractors.
    assert!((first - last).magnitude() > 1.0);

    // The whole path lies on the molecular axis.
    for p in &bp.points {
        assert!(p.x.abs() < 1e-6 && p.y.abs() < 1e-6);
    }
}

#[test]
fn cpx_round_trip_reproduces_the_network() {
    let wf = h2();
    let mut net = CritPtNetwork::new(&wf);
    net.set_critical_points(ScalarField::Rho).unwrap();
    net.set_bond_paths().unwrap();

    let path = std::env::temp_dir().join("qtaim_h2_round_trip.cpx");
    net.write_cpx(&path).unwrap();

    let mut reloaded = CritPtNetwork::new(&wf);
    reloaded.load_cpx(&path, ScalarField::Rho).unwrap();

    assert_eq!(net.acps().len(), reloaded.acps().len());
    assert_eq!(net.bcps().len(), reloaded.bcps().len());
    for (a, b) in net.acps().iter().zip(reloaded.acps()) {
        assert_eq!(a.label, b.label);
        assert_eq!((a.posit - b.posit).magnitude(), 0.);
    }
    for (a, b) in net.bcps().iter().zip(reloaded.bcps()) {
        assert_eq!(a.label, b.label);
        assert_eq!((a.posit - b.posit).magnitude(), 0.);
        assert_eq!(a.attractors, b.attractors);
    }
    for (a, b) in net.bond_paths().iter().zip(reloaded.bond_paths()) {
        assert_eq!(a.bcp, b.bcp);
        assert_eq!(a.points.len(), b.points.len());
        for (pa, pb) in a.points.iter().zip(&b.points) {
            assert_eq!((*pa - *pb).magnitude(), 0.);
        }
    }

    // A second export of the reloaded tables must be byte-identical.
    let path_2 = std::env::temp_dir().join("qtaim_h2_round_trip_2.cpx");
    reloaded.write_cpx(&path_2).unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        std::fs::read_to_string(&path_2).unwrap()
    );

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(&path_2);
}

#[test]
fn coordinate_dumps_written() {
    let wf = h2();
    let mut net = CritPtNetwork::new(&wf);
    net.set_critical_points(ScalarField::Rho).unwrap();
    net.set_bond_paths().unwrap();

    let base = std::env::temp_dir().join("qtaim_h2_coords");
    net.write_coord_files(&base).unwrap();

    for suffix in ["-ATCrds.dat", "-CPCrds.dat", "-BPCrds.dat"] {
        let mut path = base.as_os_str().to_os_string();
        path.push(suffix);
        let text = std::fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first.split_whitespace().count(), 3, "{suffix}");
        let _ = std::fs::remove_file(&path);
    }
}

#[test]
fn lol_network_finds_attractors() {
    let wf = h2();
    let mut net = CritPtNetwork::with_config(
        &wf,
        Config {
            extended_search: true,
            ..Default::default()
        },
    );
    net.set_critical_points(ScalarField::Lol).unwrap();

    // The LOL maxima of this system sit near the density attractors; the
    // nuclear seeds must find both. (Extended search may add shell structure
    // on top; exact counts depend on the basis.)
    assert!(net.acps().len() >= 2);
    for cp in net.acps() {
        assert_eq!(cp.signature, CpKind::Acp.signature());
        assert!(cp.value > 0. && cp.value <= 1.);
    }

    let near = |z: f64| {
        net.acps()
            .iter()
            .any(|cp| (cp.posit - Vec3::new(0., 0., z)).magnitude() < 0.15)
    };
    assert!(near(-NUC_Z) || near(-0.62));
    assert!(near(NUC_Z) || near(0.62));

    // Dedup holds across whatever the probes added.
    for table in [net.acps(), net.bcps(), net.rcps(), net.ccps()] {
        for (i, a) in table.iter().enumerate() {
            for b in &table[i + 1..] {
                assert!((a.posit - b.posit).magnitude() >= qtaim::EPS_CP_DUP);
            }
        }
    }

    // Probe-discovered BCPs must not break the emission order that
    // bond-path tracing and the exporters iterate in.
    let keys: Vec<(usize, usize)> = net
        .bcps()
        .iter()
        .map(|cp| match cp.attractors {
            Some([a, b]) => (a.min(b), a.max(b)),
            None => (usize::MAX, usize::MAX),
        })
        .collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));

    net.set_bond_paths().unwrap();
    assert_eq!(net.bond_paths().len(), net.bcps().len());
    for (i, bp) in net.bond_paths().iter().enumerate() {
        assert_eq!(bp.bcp, i);
    }
}

#[test]
fn cancellation_keeps_already_accepted_cps() {
    let wf = h2();
    let mut net = CritPtNetwork::new(&wf);

    // Cancel before the run: nothing gets accepted, and nothing panics.
    net.cancel_handle().store(true, std::sync::atomic::Ordering::Relaxed);
    net.set_critical_points(ScalarField::Rho).unwrap();
    assert!(net.acps().is_empty());
}

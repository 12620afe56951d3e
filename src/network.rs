//! The critical-point network orchestrator: seeds the kind-specific searches,
//! owns the ACP/BCP/RCP/CCP tables, assembles bond paths, and enforces the
//! topological census. The wavefunction is a read-only borrow for the life of
//! the network.
//!
//! Seeds scatter across rayon workers (the field evaluator is pure); worker
//! threads return candidate lists, and every table append, dedup scan
//! included, happens on the calling thread.

use std::{
    collections::HashSet,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use lin_alg::f64::Vec3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    BondPath, CpKind, CritPoint, ScalarField,
    cpx::{Cpx, CpxRecord},
    eigen::eigen_sym3,
    error::{Result, TopologyWarning},
    eval::{field_grad_hess, field_value},
    grad_path::{self, PathEnd},
    search::{Converged, SearchOutcome, newton_search},
    wavefunction::{Wavefunction, split_label},
};

/// Two CPs of the same kind closer than this are considered the same point.
pub const EPS_CP_DUP: f64 = 0.02;

/// An ACP inherits a nucleus label only when it sits within this distance of
/// the nucleus; otherwise it is a non-nuclear attractor.
const EPS_NUC_LABEL: f64 = 0.3;

/// Converged points with field values below this are far-field ghosts: out
/// there the gradient and all curvatures are numerically zero, which an
/// escaping search can mistake for a minimum.
const MIN_CP_FIELD_VALUE: f64 = 1e-10;

/// Radius of the probe shell placed around each nucleus for the ACP pass.
const ACP_SEED_RADIUS: f64 = 0.04;

/// Shell radii used by the extended search: the tight one picks up shell
/// structure around attractors (e.g. the LOL shell of a free atom), the wide
/// one interstitial saddles.
const EXT_SEARCH_RADIUS_TIGHT: f64 = 0.3;
const EXT_SEARCH_RADIUS_WIDE: f64 = 1.0;

const V5: f64 = 0.5257311121191336;
const V8: f64 = 0.8506508083520399;

/// Probe directions for `seek_cps_around`: the origin, the 12 vertices of a
/// regular icosahedron (unit circumradius, reproduced to better than 1e-12 by
/// the V5/V8 constants), and the three Cartesian axes.
pub const PROBE_VERTICES: [Vec3; 16] = [
    Vec3::new(0., 0., 0.),
    Vec3::new(0., V5, V8),
    Vec3::new(0., -V5, V8),
    Vec3::new(0., V5, -V8),
    Vec3::new(0., -V5, -V8),
    Vec3::new(V5, V8, 0.),
    Vec3::new(-V5, V8, 0.),
    Vec3::new(V5, -V8, 0.),
    Vec3::new(-V5, -V8, 0.),
    Vec3::new(V8, 0., V5),
    Vec3::new(-V8, 0., V5),
    Vec3::new(V8, 0., -V5),
    Vec3::new(-V8, 0., -V5),
    Vec3::new(1., 0., 0.),
    Vec3::new(0., 1., 0.),
    Vec3::new(0., 0., 1.),
];

/// Recognized options. Everything has a working default; construct with
/// `..Default::default()`.
#[derive(Clone, Debug)]
pub struct Config {
    pub max_iterations_acp: usize,
    pub max_iterations_bcp: usize,
    pub max_iterations_rcp: usize,
    pub max_iterations_ccp: usize,
    /// Probe icosahedral shells around discovered CPs after the bond-network
    /// seeding pass.
    pub extended_search: bool,
    /// ACP pairs farther apart than this are not seeded for a BCP.
    pub bcp_pair_cutoff: f64,
    /// Initial RK5 step (and BCP launch offset) for bond paths.
    pub bond_path_step: f64,
    // Visualization inclusion flags, read by the scene emitter through the
    // accessors below.
    pub draw_nuclei: bool,
    pub draw_bonds: bool,
    pub draw_bgps: bool,
    /// Render bond paths as tubes rather than point-sampled spheres.
    pub tube_style_bgp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations_acp: CpKind::Acp.default_max_iterations(),
            max_iterations_bcp: CpKind::Bcp.default_max_iterations(),
            max_iterations_rcp: CpKind::Rcp.default_max_iterations(),
            max_iterations_ccp: CpKind::Ccp.default_max_iterations(),
            extended_search: false,
            bcp_pair_cutoff: 4.0,
            bond_path_step: 0.02,
            draw_nuclei: true,
            draw_bonds: true,
            draw_bgps: false,
            tube_style_bgp: false,
        }
    }
}

pub struct CritPtNetwork<'a> {
    wf: &'a Wavefunction,
    pub cfg: Config,
    field: ScalarField,

    acps: Vec<CritPoint>,
    bcps: Vec<CritPoint>,
    rcps: Vec<CritPoint>,
    ccps: Vec<CritPoint>,
    bond_paths: Vec<BondPath>,

    /// ACP index pairs from an external bond-network collaborator, exposed to
    /// the visualization handoff.
    bonds: Vec<(usize, usize)>,

    /// Mean of the nuclear coordinates; stored for I/O-facing exports, never
    /// applied to the tables.
    centering: Vec3,

    warnings: Vec<TopologyWarning>,
    cancel: Arc<AtomicBool>,
    n_nonnuclear: usize,
}

impl<'a> CritPtNetwork<'a> {
    pub fn new(wf: &'a Wavefunction) -> Self {
        Self::with_config(wf, Config::default())
    }

    pub fn with_config(wf: &'a Wavefunction, cfg: Config) -> Self {
        Self {
            wf,
            cfg,
            field: ScalarField::Rho,
            acps: Vec::new(),
            bcps: Vec::new(),
            rcps: Vec::new(),
            ccps: Vec::new(),
            bond_paths: Vec::new(),
            bonds: Vec::new(),
            centering: wf.nuclear_centroid(),
            warnings: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            n_nonnuclear: 0,
        }
    }

    /// Raise the returned flag from another thread to stop the run at the
    /// next seed or optimizer iteration; already-accepted CPs are kept.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn field(&self) -> ScalarField {
        self.field
    }

    pub fn acps(&self) -> &[CritPoint] {
        &self.acps
    }

    pub fn bcps(&self) -> &[CritPoint] {
        &self.bcps
    }

    pub fn rcps(&self) -> &[CritPoint] {
        &self.rcps
    }

    pub fn ccps(&self) -> &[CritPoint] {
        &self.ccps
    }

    pub fn bond_paths(&self) -> &[BondPath] {
        &self.bond_paths
    }

    pub fn nuclei(&self) -> &[crate::Nucleus] {
        &self.wf.nuclei
    }

    /// Bond list (pairs of ACP indices) from the external bond network.
    pub fn bonds(&self) -> &[(usize, usize)] {
        &self.bonds
    }

    pub fn set_bonds(&mut self, bonds: Vec<(usize, usize)>) {
        self.bonds = bonds;
    }

    pub fn bcp_positions(&self) -> Vec<Vec3> {
        self.bcps.iter().map(|cp| cp.posit).collect()
    }

    /// Translation that would center the molecule for export.
    pub fn centering(&self) -> Vec3 {
        self.centering
    }

    pub fn warnings(&self) -> &[TopologyWarning] {
        &self.warnings
    }

    pub fn poincare_hopf_sum(&self) -> i32 {
        self.acps.len() as i32 - self.bcps.len() as i32 + self.rcps.len() as i32
            - self.ccps.len() as i32
    }

    fn max_iterations(&self, kind: CpKind) -> usize {
        match kind {
            CpKind::Acp => self.cfg.max_iterations_acp,
            CpKind::Bcp => self.cfg.max_iterations_bcp,
            CpKind::Rcp => self.cfg.max_iterations_rcp,
            CpKind::Ccp => self.cfg.max_iterations_ccp,
        }
    }

    fn table(&self, kind: CpKind) -> &Vec<CritPoint> {
        match kind {
            CpKind::Acp => &self.acps,
            CpKind::Bcp => &self.bcps,
            CpKind::Rcp => &self.rcps,
            CpKind::Ccp => &self.ccps,
        }
    }

    /// Scatter seeds over the rayon pool; collect only candidates that
    /// converged with the target signature. Numerical errors abort.
    fn run_seeds(&self, kind: CpKind, seeds: &[Vec3]) -> Result<Vec<Converged>> {
        let max_it = self.max_iterations(kind);
        let cancel: &AtomicBool = &self.cancel;

        let outcomes: Result<Vec<SearchOutcome>> = seeds
            .par_iter()
            .map(|&seed| newton_search(self.wf, self.field, kind, seed, max_it, cancel))
            .collect();

        let mut found = Vec::new();
        let mut failed = 0;
        for outcome in outcomes? {
            match outcome {
                SearchOutcome::Converged(c) if c.value < MIN_CP_FIELD_VALUE => {
                    debug!("discarding far-field ghost at {:?}", c.posit);
                }
                SearchOutcome::Converged(c) if c.signature == kind.signature() => found.push(c),
                // Converged onto a stationary point of some other kind; its
                // own search pass will find it.
                SearchOutcome::Converged(_) => {}
                SearchOutcome::NoConvergence => failed += 1,
                SearchOutcome::Cancelled => {}
            }
        }

        if failed > 0 {
            warn!(
                "{kind} search: {failed} of {} seeds discarded (iteration cap {max_it})",
                seeds.len()
            );
        }

        Ok(found)
    }

    /// Dedup scan + labeled append. Returns false when the candidate
    /// duplicates an existing CP of the same kind.
    fn try_add(&mut self, kind: CpKind, cand: &Converged, label_hint: Option<&str>) -> bool {
        if self
            .table(kind)
            .iter()
            .any(|cp| (cp.posit - cand.posit).magnitude() < EPS_CP_DUP)
        {
            return false;
        }

        let (label, attractors) = match kind {
            CpKind::Acp => {
                let nearest = self
                    .wf
                    .nuclei
                    .iter()
                    .map(|n| ((n.posit - cand.posit).magnitude(), &n.label))
                    .min_by(|a, b| a.0.total_cmp(&b.0));

                match nearest {
                    Some((dist, lbl)) if dist < EPS_NUC_LABEL => (lbl.clone(), None),
                    _ => {
                        self.n_nonnuclear += 1;
                        let prefix = label_hint.unwrap_or("NNACP");
                        (format!("{prefix}{}", self.n_nonnuclear), None)
                    }
                }
            }
            CpKind::Bcp => match self.two_nearest_acps(cand.posit) {
                Some([i, j]) => {
                    let (la, lb) = (&self.acps[i].label, &self.acps[j].label);
                    let label = if la <= lb {
                        format!("{la}-{lb}")
                    } else {
                        format!("{lb}-{la}")
                    };
                    (label, Some([i, j]))
                }
                None => (format!("BCP{}", self.bcps.len() + 1), None),
            },
            CpKind::Rcp => (format!("RCP{}", self.rcps.len() + 1), None),
            CpKind::Ccp => (format!("CCP{}", self.ccps.len() + 1), None),
        };

        debug!("new {kind} \"{label}\" at {:?} (f = {:.6e})", cand.posit, cand.value);

        let cp = CritPoint {
            posit: cand.posit,
            value: cand.value,
            signature: cand.signature,
            label,
            attractors,
        };
        match kind {
            CpKind::Acp => self.acps.push(cp),
            CpKind::Bcp => self.bcps.push(cp),
            CpKind::Rcp => self.rcps.push(cp),
            CpKind::Ccp => self.ccps.push(cp),
        }

        true
    }

    /// Indices of the two ACPs nearest a point.
    fn two_nearest_acps(&self, x: Vec3) -> Option<[usize; 2]> {
        if self.acps.len() < 2 {
            return None;
        }

        let mut dists: Vec<(usize, f64)> = self
            .acps
            .iter()
            .enumerate()
            .map(|(i, cp)| (i, (cp.posit - x).magnitude()))
            .collect();
        dists.sort_by(|a, b| a.1.total_cmp(&b.1));

        Some([dists[0].0, dists[1].0])
    }

    /// Seed a kind-specific search from `center` and up to `n_vertices`
    /// icosahedral shell points of the given radius around it, then fold the
    /// converged candidates into the kind's table. Returns the number of new
    /// CPs accepted.
    pub fn seek_cps_around(
        &mut self,
        kind: CpKind,
        center: Vec3,
        radius: f64,
        label: &str,
        n_vertices: usize,
    ) -> Result<usize> {
        let n = 1 + n_vertices.min(PROBE_VERTICES.len() - 1);
        let seeds: Vec<Vec3> = PROBE_VERTICES[..n]
            .iter()
            .map(|&v| center + v * radius)
            .collect();

        let hint = if label.is_empty() { None } else { Some(label) };
        let mut added = 0;
        for cand in self.run_seeds(kind, &seeds)? {
            if self.try_add(kind, &cand, hint) {
                added += 1;
            }
        }

        Ok(added)
    }

    /// Full search pass over the chosen field: ACPs from nuclei, BCPs from
    /// ACP-pair midpoints, RCPs from connected-triple centroids, CCPs from
    /// connected-quadruple centroids, then (optionally) the extended probe
    /// pass, and finally the Poincaré–Hopf census.
    pub fn set_critical_points(&mut self, field: ScalarField) -> Result<()> {
        self.field = field;
        self.acps.clear();
        self.bcps.clear();
        self.rcps.clear();
        self.ccps.clear();
        self.bond_paths.clear();
        self.warnings.clear();
        self.n_nonnuclear = 0;

        info!("Searching {field} critical points ({} nuclei)", self.wf.nnuc());

        let wf = self.wf;

        // ACPs: every nucleus, plus a tight shell around it.
        for nuc in &wf.nuclei {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(());
            }
            self.seek_cps_around(CpKind::Acp, nuc.posit, ACP_SEED_RADIUS, "", 15)?;
        }
        info!("{} ACPs", self.acps.len());

        // BCPs: midpoints of every ACP pair within the cutoff.
        let acp_pos: Vec<Vec3> = self.acps.iter().map(|cp| cp.posit).collect();
        let mut seeds = Vec::new();
        for i in 0..acp_pos.len() {
            for j in (i + 1)..acp_pos.len() {
                if (acp_pos[i] - acp_pos[j]).magnitude() < self.cfg.bcp_pair_cutoff {
                    seeds.push((acp_pos[i] + acp_pos[j]) * 0.5);
                }
            }
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        for cand in self.run_seeds(CpKind::Bcp, &seeds)? {
            self.try_add(CpKind::Bcp, &cand, None);
        }
        info!("{} BCPs", self.bcps.len());

        // RCPs from triangle centroids of BCP-connected ACP triples, CCPs
        // from tetrahedral centroids of connected quadruples.
        let linked = self.linked_acp_pairs();
        let is_linked = |a: usize, b: usize| linked.contains(&(a.min(b), a.max(b)));

        let mut seeds = Vec::new();
        for i in 0..acp_pos.len() {
            for j in (i + 1)..acp_pos.len() {
                for k in (j + 1)..acp_pos.len() {
                    let n_linked = [(i, j), (i, k), (j, k)]
                        .iter()
                        .filter(|&&(a, b)| is_linked(a, b))
                        .count();
                    if n_linked >= 2 {
                        seeds.push((acp_pos[i] + acp_pos[j] + acp_pos[k]) / 3.);
                    }
                }
            }
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        for cand in self.run_seeds(CpKind::Rcp, &seeds)? {
            self.try_add(CpKind::Rcp, &cand, None);
        }
        info!("{} RCPs", self.rcps.len());

        let mut seeds = Vec::new();
        for i in 0..acp_pos.len() {
            for j in (i + 1)..acp_pos.len() {
                for k in (j + 1)..acp_pos.len() {
                    for l in (k + 1)..acp_pos.len() {
                        let n_linked = [(i, j), (i, k), (i, l), (j, k), (j, l), (k, l)]
                            .iter()
                            .filter(|&&(a, b)| is_linked(a, b))
                            .count();
                        if n_linked >= 3 {
                            seeds.push((acp_pos[i] + acp_pos[j] + acp_pos[k] + acp_pos[l]) / 4.);
                        }
                    }
                }
            }
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        for cand in self.run_seeds(CpKind::Ccp, &seeds)? {
            self.try_add(CpKind::Ccp, &cand, None);
        }
        info!("{} CCPs", self.ccps.len());

        if self.cfg.extended_search {
            self.extended_search()?;
        }

        // Emission order: BCPs by (min ACP index, max ACP index), covering
        // any the extended probes appended. ACPs are already in nuclear
        // order, RCPs/CCPs stay in discovery order.
        self.sort_bcps();

        self.check_topology();

        Ok(())
    }

    /// Restore the BCP emission order. Must run before bond paths are
    /// traced: `set_bond_paths` and the exporters iterate the table as is.
    fn sort_bcps(&mut self) {
        self.bcps.sort_by_key(|cp| match cp.attractors {
            Some([a, b]) => (a.min(b), a.max(b)),
            None => (usize::MAX, usize::MAX),
        });
    }

    /// ACP pairs joined by a BCP.
    fn linked_acp_pairs(&self) -> HashSet<(usize, usize)> {
        self.bcps
            .iter()
            .filter_map(|cp| cp.attractors)
            .map(|[a, b]| (a.min(b), a.max(b)))
            .collect()
    }

    /// One extra probe pass over the tables as they stand: shells around
    /// ACPs hunt shell/bond structure the midpoint seeding cannot see, shells
    /// around BCPs/RCPs/CCPs hunt non-nuclear attractors and interstitial
    /// saddles. Newly found CPs are appended and do not themselves spawn
    /// probes within this call.
    pub fn extended_search(&mut self) -> Result<usize> {
        let snapshot = |t: &[CritPoint]| t.iter().map(|cp| cp.posit).collect::<Vec<_>>();
        let (acp_pos, bcp_pos, rcp_pos, ccp_pos) = (
            snapshot(&self.acps),
            snapshot(&self.bcps),
            snapshot(&self.rcps),
            snapshot(&self.ccps),
        );

        let mut added = 0;
        added += self.probe_shells(CpKind::Bcp, &acp_pos, EXT_SEARCH_RADIUS_TIGHT)?;
        added += self.probe_shells(CpKind::Acp, &bcp_pos, EXT_SEARCH_RADIUS_WIDE)?;
        added += self.probe_shells(CpKind::Rcp, &bcp_pos, EXT_SEARCH_RADIUS_WIDE)?;
        added += self.probe_shells(CpKind::Bcp, &rcp_pos, EXT_SEARCH_RADIUS_WIDE)?;
        added += self.probe_shells(CpKind::Ccp, &rcp_pos, EXT_SEARCH_RADIUS_WIDE)?;
        added += self.probe_shells(CpKind::Rcp, &ccp_pos, EXT_SEARCH_RADIUS_WIDE)?;

        // Probe-discovered BCPs land at the end of the table; restore the
        // emission order before anything traces or exports it.
        self.sort_bcps();

        if added > 0 {
            info!("Extended search found {added} additional CPs");
        }

        Ok(added)
    }

    fn probe_shells(&mut self, kind: CpKind, centers: &[Vec3], radius: f64) -> Result<usize> {
        let mut n = 0;
        for &c in centers {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(n);
            }
            n += self.seek_cps_around(kind, c, radius, "", 15)?;
        }
        Ok(n)
    }

    /// Trace both sides of every BCP's bond path.
    pub fn set_bond_paths(&mut self) -> Result<()> {
        self.bond_paths.clear();

        let wf = self.wf;
        let field = self.field;
        let acp_positions: Vec<Vec3> = self.acps.iter().map(|cp| cp.posit).collect();
        let offset = self.cfg.bond_path_step;

        for i in 0..self.bcps.len() {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(());
            }

            let pos = self.bcps[i].posit;
            let sample = field_grad_hess(wf, field, pos)?;
            let (_, vecs) = eigen_sym3(sample.hessian);
            // The single positive-curvature direction at a (3,−1) point.
            let dir = Vec3::new(vecs[2][0], vecs[2][1], vecs[2][2]);

            let up = grad_path::trace(wf, field, pos + dir * offset, offset, &acp_positions)?;
            let down = grad_path::trace(wf, field, pos - dir * offset, offset, &acp_positions)?;

            // Store ACP → BCP → ACP: the uphill side reversed, the saddle,
            // then the downhill side.
            let mut points: Vec<Vec3> = up.points.iter().rev().copied().collect();
            points.push(pos);
            points.extend(down.points.iter().copied());

            let complete =
                matches!(up.end, PathEnd::Acp(_)) && matches!(down.end, PathEnd::Acp(_));
            if up.end == PathEnd::Stagnated || down.end == PathEnd::Stagnated {
                warn!("bond path from BCP {i} ({}) stagnated", self.bcps[i].label);
                self.warnings.push(TopologyWarning::NonNormalBcp { bcp: i });
            }

            self.bond_paths.push(BondPath { bcp: i, points, complete });
        }

        Ok(())
    }

    /// Poincaré–Hopf census; a mismatch is reported, not fatal. Isolated
    /// molecules have χ = 1.
    fn check_topology(&mut self) {
        let sum = self.poincare_hopf_sum();
        if sum != 1 {
            warn!(
                "Poincaré–Hopf violated: {} − {} + {} − {} = {sum} (expected 1)",
                self.acps.len(),
                self.bcps.len(),
                self.rcps.len(),
                self.ccps.len()
            );
            self.warnings.push(TopologyWarning::PoincareHopf { sum, expected: 1 });
        }

        for (i, bcp) in self.bcps.iter().enumerate() {
            if bcp.attractors.is_none() {
                warn!("BCP {i} ({}) has no associated attractor pair", bcp.label);
                self.warnings.push(TopologyWarning::NonNormalBcp { bcp: i });
            }
        }
    }

    /// Multi-line human-readable summary, in the spirit of the terminal
    /// status display.
    pub fn status(&self) -> String {
        let mut out = format!("Critical-point network, field {}\n", self.field);
        out.push_str(&format!(
            "  ACP: {}  BCP: {}  RCP: {}  CCP: {}  bond paths: {}\n",
            self.acps.len(),
            self.bcps.len(),
            self.rcps.len(),
            self.ccps.len(),
            self.bond_paths.len(),
        ));
        out.push_str(&format!(
            "  Poincaré–Hopf: {} ({} warnings)",
            self.poincare_hopf_sum(),
            self.warnings.len()
        ));
        out
    }

    /// Coordinate listing for one kind, one `label  x y z` line per CP.
    pub fn cp_coords_text(&self, kind: CpKind) -> String {
        let mut out = String::new();
        for cp in self.table(kind) {
            out.push_str(&format!(
                "{:<10} {:>14.8} {:>14.8} {:>14.8}\n",
                cp.label, cp.posit.x, cp.posit.y, cp.posit.z
            ));
        }
        out
    }

    /// Export the tables as a `.cpx` file.
    pub fn write_cpx(&self, path: &Path) -> Result<()> {
        let to_rec = |cp: &CritPoint| CpxRecord {
            label: cp.label.clone(),
            posit: cp.posit,
            attractors: cp.attractors,
        };

        let file = Cpx {
            acps: self.acps.iter().map(to_rec).collect(),
            bcps: self.bcps.iter().map(to_rec).collect(),
            rcps: self.rcps.iter().map(to_rec).collect(),
            ccps: self.ccps.iter().map(to_rec).collect(),
            bond_paths: self
                .bond_paths
                .iter()
                .map(|bp| (bp.bcp, bp.points.clone()))
                .collect(),
        };

        file.save(path)?;
        Ok(())
    }

    /// Rebuild the tables from a `.cpx` file. Field values are re-evaluated
    /// against the borrowed wavefunction; the file stores geometry only.
    pub fn load_cpx(&mut self, path: &Path, field: ScalarField) -> Result<()> {
        let file = Cpx::load(path)
            .map_err(|e| crate::Error::Input(format!("{}: {e}", path.display())))?;
        self.field = field;

        let wf = self.wf;
        let from_rec = |kind: CpKind, rec: CpxRecord| CritPoint {
            value: field_value(wf, field, rec.posit),
            posit: rec.posit,
            signature: kind.signature(),
            label: rec.label,
            attractors: rec.attractors,
        };

        self.acps = file.acps.into_iter().map(|r| from_rec(CpKind::Acp, r)).collect();
        self.bcps = file.bcps.into_iter().map(|r| from_rec(CpKind::Bcp, r)).collect();
        self.rcps = file.rcps.into_iter().map(|r| from_rec(CpKind::Rcp, r)).collect();
        self.ccps = file.ccps.into_iter().map(|r| from_rec(CpKind::Ccp, r)).collect();
        self.bond_paths = file
            .bond_paths
            .into_iter()
            .map(|(bcp, points)| BondPath { bcp, points, complete: true })
            .collect();
        self.warnings.clear();
        // Resume non-nuclear numbering after the highest NNACP label on
        // file; counting them would re-issue labels if the numbering has
        // gaps.
        self.n_nonnuclear = self
            .acps
            .iter()
            .map(|cp| split_label(&cp.label))
            .filter(|(sym, _)| sym == "NNACP")
            .map(|(_, num)| num as usize)
            .max()
            .unwrap_or(0);

        Ok(())
    }

    /// Write the three-column coordinate files consumed by the plotting
    /// collaborators: `{base}-ATCrds.dat`, `{base}-CPCrds.dat`,
    /// `{base}-BPCrds.dat`.
    pub fn write_coord_files(&self, base: &Path) -> Result<()> {
        let nuclei: Vec<Vec<Vec3>> = vec![self.wf.nuclei.iter().map(|n| n.posit).collect()];
        crate::cpx::write_coord_groups(&with_suffix(base, "-ATCrds.dat"), &nuclei)?;

        let cps: Vec<Vec<Vec3>> = CpKind::ALL
            .iter()
            .map(|&kind| self.table(kind).iter().map(|cp| cp.posit).collect())
            .collect();
        crate::cpx::write_coord_groups(&with_suffix(base, "-CPCrds.dat"), &cps)?;

        let paths: Vec<Vec<Vec3>> = self.bond_paths.iter().map(|bp| bp.points.clone()).collect();
        crate::cpx::write_coord_groups(&with_suffix(base, "-BPCrds.dat"), &paths)?;

        Ok(())
    }
}

fn with_suffix(base: &Path, suffix: &str) -> std::path::PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    std::path::PathBuf::from(s)
}

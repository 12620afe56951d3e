//! For reading and writing `.cpx` files: the plain-text, line-based record of
//! a critical-point network (CP tables plus optional bond-path polylines),
//! and the three-column `.dat` coordinate dumps consumed by plotting
//! collaborators.
//!
//! Coordinates are written with Rust's shortest-round-trip float formatting,
//! so a write → read → write cycle is byte-identical.

use std::{
    fs,
    fs::File,
    io::{self, ErrorKind, Write},
    path::Path,
};

use lin_alg::f64::Vec3;

const MAGIC: &str = "#CPXv1";

/// One CP record as persisted: geometry and labeling only. Field values and
/// signatures are recovered from the kind and the wavefunction on load.
#[derive(Clone, Debug)]
pub struct CpxRecord {
    pub label: String,
    pub posit: Vec3,
    /// BCP records carry their two attractor (ACP) indices.
    pub attractors: Option<[usize; 2]>,
}

#[derive(Clone, Debug, Default)]
pub struct Cpx {
    pub acps: Vec<CpxRecord>,
    pub bcps: Vec<CpxRecord>,
    pub rcps: Vec<CpxRecord>,
    pub ccps: Vec<CpxRecord>,
    /// (BCP index, polyline) per traced bond path.
    pub bond_paths: Vec<(usize, Vec<Vec3>)>,
}

fn invalid(line: usize, msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, format!("CPX line {line}: {msg}"))
}

fn parse_f64(tok: &str, line: usize) -> io::Result<f64> {
    tok.parse()
        .map_err(|_| invalid(line, &format!("invalid coordinate {tok:?}")))
}

fn parse_usize(tok: &str, line: usize) -> io::Result<usize> {
    tok.parse()
        .map_err(|_| invalid(line, &format!("invalid index or count {tok:?}")))
}

impl Cpx {
    pub fn new(text: &str) -> io::Result<Self> {
        // Blank lines are insignificant; keep original line numbers for
        // diagnostics.
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (n, magic) = lines
            .next()
            .ok_or_else(|| invalid(0, "empty file"))?;
        if magic != MAGIC {
            return Err(invalid(n, &format!("bad magic {magic:?}; expected {MAGIC}")));
        }

        let (n, counts_line) = lines
            .next()
            .ok_or_else(|| invalid(n, "missing counts line"))?;
        let counts: Vec<usize> = counts_line
            .split_whitespace()
            .map(|t| parse_usize(t, n))
            .collect::<io::Result<_>>()?;
        let [n_acp, n_bcp, n_rcp, n_ccp, n_bgp] = counts[..] else {
            return Err(invalid(n, "counts line must hold nACP nBCP nRCP nCCP nBGP"));
        };

        let mut read_block = |count: usize, with_attractors: bool| -> io::Result<Vec<CpxRecord>> {
            let mut records = Vec::with_capacity(count);
            for i in 0..count {
                let (n, line) = lines
                    .next()
                    .ok_or_else(|| invalid(0, "unexpected end of file in CP block"))?;
                let toks: Vec<&str> = line.split_whitespace().collect();
                let expected = if with_attractors { 7 } else { 5 };
                if toks.len() != expected {
                    return Err(invalid(
                        n,
                        &format!("expected {expected} fields, found {}", toks.len()),
                    ));
                }

                let idx = parse_usize(toks[0], n)?;
                if idx != i {
                    return Err(invalid(n, &format!("index {idx} out of order (expected {i})")));
                }

                let posit = Vec3::new(
                    parse_f64(toks[2], n)?,
                    parse_f64(toks[3], n)?,
                    parse_f64(toks[4], n)?,
                );
                let attractors = if with_attractors {
                    Some([parse_usize(toks[5], n)?, parse_usize(toks[6], n)?])
                } else {
                    None
                };

                records.push(CpxRecord { label: toks[1].to_owned(), posit, attractors });
            }
            Ok(records)
        };

        let acps = read_block(n_acp, false)?;
        let bcps = read_block(n_bcp, true)?;
        let rcps = read_block(n_rcp, false)?;
        let ccps = read_block(n_ccp, false)?;

        for (i, rec) in bcps.iter().enumerate() {
            if let Some([a, b]) = rec.attractors {
                if a >= acps.len() || b >= acps.len() {
                    return Err(invalid(
                        0,
                        &format!(
                            "BCP {i} references ACP {}/{}, but only {} exist",
                            a,
                            b,
                            acps.len()
                        ),
                    ));
                }
            }
        }

        let mut bond_paths = Vec::with_capacity(n_bgp);
        for _ in 0..n_bgp {
            let (n, line) = lines
                .next()
                .ok_or_else(|| invalid(0, "unexpected end of file in bond-path block"))?;
            let toks: Vec<&str> = line.split_whitespace().collect();
            if toks.len() < 2 {
                return Err(invalid(n, "bond-path record needs a BCP index and a point count"));
            }

            let bcp = parse_usize(toks[0], n)?;
            if bcp >= bcps.len() {
                return Err(invalid(n, &format!("bond path references BCP {bcp} of {}", bcps.len())));
            }
            let count = parse_usize(toks[1], n)?;
            if toks.len() != 2 + 3 * count {
                return Err(invalid(
                    n,
                    &format!("expected {} coordinates, found {}", 3 * count, toks.len() - 2),
                ));
            }

            let mut points = Vec::with_capacity(count);
            for c in 0..count {
                points.push(Vec3::new(
                    parse_f64(toks[2 + 3 * c], n)?,
                    parse_f64(toks[3 + 3 * c], n)?,
                    parse_f64(toks[4 + 3 * c], n)?,
                ));
            }
            bond_paths.push((bcp, points));
        }

        Ok(Self { acps, bcps, rcps, ccps, bond_paths })
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let data_str = fs::read_to_string(path).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", path.display()))
        })?;
        Self::new(&data_str)
    }

    pub fn make_text(&self) -> String {
        let mut out = String::new();

        out.push_str(MAGIC);
        out.push('\n');
        out.push_str(&format!(
            "{} {} {} {} {}\n",
            self.acps.len(),
            self.bcps.len(),
            self.rcps.len(),
            self.ccps.len(),
            self.bond_paths.len()
        ));

        for block in [&self.acps, &self.bcps, &self.rcps, &self.ccps] {
            for (i, rec) in block.iter().enumerate() {
                out.push_str(&format!(
                    "{i} {} {} {} {}",
                    rec.label, rec.posit.x, rec.posit.y, rec.posit.z
                ));
                if let Some([a, b]) = rec.attractors {
                    out.push_str(&format!(" {a} {b}"));
                }
                out.push('\n');
            }
        }

        for (bcp, points) in &self.bond_paths {
            out.push_str(&format!("{bcp} {}", points.len()));
            for p in points {
                out.push_str(&format!(" {} {} {}", p.x, p.y, p.z));
            }
            out.push('\n');
        }

        out
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "{}", self.make_text())
    }
}

/// Write groups of points as `x y z` lines with a blank line between groups
/// (the `-ATCrds.dat` / `-CPCrds.dat` / `-BPCrds.dat` plotting format).
pub fn write_coord_groups(path: &Path, groups: &[Vec<Vec3>]) -> io::Result<()> {
    let mut file = File::create(path)?;

    for (gi, group) in groups.iter().enumerate() {
        for p in group {
            writeln!(file, "{:>14.8} {:>14.8} {:>14.8}", p.x, p.y, p.z)?;
        }
        if gi + 1 != groups.len() {
            writeln!(file)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Cpx {
        Cpx {
            acps: vec![
                CpxRecord {
                    label: "H1".to_owned(),
                    posit: Vec3::new(0., 0., -0.7),
                    attractors: None,
                },
                CpxRecord {
                    label: "H2".to_owned(),
                    posit: Vec3::new(0., 0., 0.7),
                    attractors: None,
                },
            ],
            bcps: vec![CpxRecord {
                label: "H1-H2".to_owned(),
                posit: Vec3::new(0., 0., 1e-16),
                attractors: Some([0, 1]),
            }],
            rcps: Vec::new(),
            ccps: Vec::new(),
            bond_paths: vec![(0, vec![
                Vec3::new(0., 0., -0.7),
                Vec3::new(0., 0., 0.),
                Vec3::new(0., 0., 0.7),
            ])],
        }
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let orig = sample();
        let text = orig.make_text();

        let parsed = Cpx::new(&text).unwrap();
        assert_eq!(parsed.make_text(), text);
        assert_eq!(parsed.bcps[0].attractors, Some([0, 1]));
        assert_eq!(parsed.bond_paths[0].1.len(), 3);
    }

    #[test]
    fn tolerates_blank_lines() {
        let text = sample().make_text().replace('\n', "\n\n");
        let parsed = Cpx::new(&text).unwrap();
        assert_eq!(parsed.make_text(), sample().make_text());
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(Cpx::new("#CPXv2\n0 0 0 0 0\n").is_err());
    }

    #[test]
    fn rejects_dangling_attractor_index() {
        let text = "#CPXv1\n1 1 0 0 0\n0 H1 0 0 0\n0 H1-H9 0 0 0 0 7\n";
        assert!(Cpx::new(text).is_err());
    }

    #[test]
    fn rejects_short_record() {
        let text = "#CPXv1\n1 0 0 0 0\n0 H1 0 0\n";
        assert!(Cpx::new(text).is_err());
    }
}

//! Immutable storage for a Gaussian-type molecular wavefunction: nuclei, the
//! primitive table, and molecular-orbital coefficients. Concrete WFN/WFX
//! readers live outside this crate; they hand their parsed arrays to
//! [`Wavefunction::new`].
//!
//! At construction we derive the symmetric primitive–primitive density matrix
//! Cab[a][b] = Σ_μ occ[μ]·c[μ,a]·c[μ,b], which is what every field evaluation
//! actually contracts against.

use std::str::FromStr;

use lin_alg::f64::Vec3;
use na_seq::Element;

use crate::error::{Error, Result};

/// Angular exponent triples (l, m, n) for primitive type codes 1..=56, in the
/// standard WFN/WFX type-assignment order (s, p, d, f, g, h shells). The
/// ordering is fixed by existing wavefunction files; do not reorder.
pub const ANG_EXPONENTS: [[i32; 3]; 56] = [
    // s
    [0, 0, 0],
    // p
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    // d
    [2, 0, 0],
    [0, 2, 0],
    [0, 0, 2],
    [1, 1, 0],
    [1, 0, 1],
    [0, 1, 1],
    // f
    [3, 0, 0],
    [0, 3, 0],
    [0, 0, 3],
    [2, 1, 0],
    [2, 0, 1],
    [0, 2, 1],
    [1, 2, 0],
    [1, 0, 2],
    [0, 1, 2],
    [1, 1, 1],
    // g
    [0, 0, 4],
    [0, 1, 3],
    [0, 2, 2],
    [0, 3, 1],
    [0, 4, 0],
    [1, 0, 3],
    [1, 1, 2],
    [1, 2, 1],
    [1, 3, 0],
    [2, 0, 2],
    [2, 1, 1],
    [2, 2, 0],
    [3, 0, 1],
    [3, 1, 0],
    [4, 0, 0],
    // h
    [0, 0, 5],
    [0, 1, 4],
    [0, 2, 3],
    [0, 3, 2],
    [0, 4, 1],
    [0, 5, 0],
    [1, 0, 4],
    [1, 1, 3],
    [1, 2, 2],
    [1, 3, 1],
    [1, 4, 0],
    [2, 0, 3],
    [2, 1, 2],
    [2, 2, 1],
    [2, 3, 0],
    [3, 0, 2],
    [3, 1, 1],
    [3, 2, 0],
    [4, 0, 1],
    [4, 1, 0],
    [5, 0, 0],
];

#[derive(Clone, Debug)]
pub struct Nucleus {
    /// As labeled in the wavefunction file, e.g. "O1", "H2".
    pub label: String,
    /// Parsed from the label's leading letters where possible.
    pub element: Option<Element>,
    pub charge: f64,
    pub posit: Vec3,
}

impl Nucleus {
    pub fn new(label: &str, charge: f64, posit: Vec3) -> Self {
        let symbol: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();

        Self {
            label: label.to_owned(),
            element: Element::from_letter(&symbol).ok(),
            charge,
            posit,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Wavefunction {
    pub nuclei: Vec<Nucleus>,
    /// Per primitive: index into `nuclei`. Must be grouped contiguously by
    /// center; the evaluators' outer loops run over centers.
    pub prim_centers: Vec<usize>,
    /// Per primitive: type code 1..=56; see [`ANG_EXPONENTS`].
    pub prim_types: Vec<u8>,
    /// Per primitive: Gaussian exponent α.
    pub prim_exps: Vec<f64>,
    /// Row-major, nMOr × nPri.
    pub mo_coeffs: Vec<f64>,
    /// Occupation number per molecular orbital.
    pub mo_occ: Vec<f64>,

    /// Symmetric primitive–primitive density matrix, nPri × nPri row-major.
    cab: Vec<f64>,
    /// Number of primitives on each nuclear center, in center order.
    prims_per_center: Vec<usize>,
}

impl Wavefunction {
    pub fn new(
        nuclei: Vec<Nucleus>,
        prim_centers: Vec<usize>,
        prim_types: Vec<u8>,
        prim_exps: Vec<f64>,
        mo_coeffs: Vec<f64>,
        mo_occ: Vec<f64>,
    ) -> Result<Self> {
        let npri = prim_centers.len();
        let nmor = mo_occ.len();

        if nuclei.is_empty() || npri == 0 || nmor == 0 {
            return Err(Error::Input(
                "Wavefunction requires at least one nucleus, primitive, and orbital".to_owned(),
            ));
        }
        if prim_types.len() != npri || prim_exps.len() != npri {
            return Err(Error::Input(format!(
                "Primitive table length mismatch: {npri} centers, {} types, {} exponents",
                prim_types.len(),
                prim_exps.len()
            )));
        }
        if mo_coeffs.len() != nmor * npri {
            return Err(Error::Input(format!(
                "Expected {nmor} × {npri} MO coefficients; got {}",
                mo_coeffs.len()
            )));
        }

        for (i, &ty) in prim_types.iter().enumerate() {
            if ty == 0 || ty as usize > ANG_EXPONENTS.len() {
                return Err(Error::Input(format!(
                    "Primitive {i} has unsupported type code {ty} (supported: 1..={})",
                    ANG_EXPONENTS.len()
                )));
            }
        }

        // Contiguous center grouping, so evaluation can share one Δr per
        // center instead of recomputing it per primitive pair.
        let mut prims_per_center = vec![0; nuclei.len()];
        let mut prev = 0;
        for (i, &c) in prim_centers.iter().enumerate() {
            if c >= nuclei.len() {
                return Err(Error::Input(format!(
                    "Primitive {i} references center {c}, but there are {} nuclei",
                    nuclei.len()
                )));
            }
            if c < prev {
                return Err(Error::Input(format!(
                    "Primitives must be grouped contiguously by center (primitive {i} on center \
                     {c} follows center {prev})"
                )));
            }
            prims_per_center[c] += 1;
            prev = c;
        }

        let mut result = Self {
            nuclei,
            prim_centers,
            prim_types,
            prim_exps,
            mo_coeffs,
            mo_occ,
            cab: Vec::new(),
            prims_per_center,
        };
        result.calc_cab();

        Ok(result)
    }

    /// Cab[a][b] = Σ_μ occ[μ]·c[μ,a]·c[μ,b]. Computed once; symmetric.
    fn calc_cab(&mut self) {
        let npri = self.npri();
        let mut cab = vec![0.; npri * npri];

        for (mu, &occ) in self.mo_occ.iter().enumerate() {
            if occ == 0. {
                continue;
            }
            let row = &self.mo_coeffs[mu * npri..(mu + 1) * npri];
            for a in 0..npri {
                let oc_a = occ * row[a];
                for b in a..npri {
                    cab[a * npri + b] += oc_a * row[b];
                }
            }
        }
        // Mirror the upper triangle.
        for a in 1..npri {
            for b in 0..a {
                cab[a * npri + b] = cab[b * npri + a];
            }
        }

        self.cab = cab;
    }

    pub fn nnuc(&self) -> usize {
        self.nuclei.len()
    }

    pub fn npri(&self) -> usize {
        self.prim_centers.len()
    }

    pub fn nmor(&self) -> usize {
        self.mo_occ.len()
    }

    #[inline]
    pub fn cab(&self, a: usize, b: usize) -> f64 {
        self.cab[a * self.npri() + b]
    }

    /// MO coefficient c[μ, a].
    #[inline]
    pub fn coeff(&self, mo: usize, prim: usize) -> f64 {
        self.mo_coeffs[mo * self.npri() + prim]
    }

    /// Angular exponents (l, m, n) of a primitive.
    #[inline]
    pub fn ang_exponents(&self, prim: usize) -> [i32; 3] {
        ANG_EXPONENTS[self.prim_types[prim] as usize - 1]
    }

    pub fn prims_per_center(&self) -> &[usize] {
        &self.prims_per_center
    }

    /// Global index of the first primitive on a center.
    pub fn center_prim_offset(&self, center: usize) -> usize {
        self.prims_per_center[..center].iter().sum()
    }

    pub fn total_nuclear_charge(&self) -> f64 {
        self.nuclei.iter().map(|n| n.charge).sum()
    }

    /// True when every molecular orbital carries the same occupation number.
    pub fn same_occupations(&self) -> bool {
        self.mo_occ.windows(2).all(|w| w[0] == w[1])
    }

    /// Arithmetic mean of the nuclear coordinates.
    pub fn nuclear_centroid(&self) -> Vec3 {
        let mut sum = Vec3::new_zero();
        for nuc in &self.nuclei {
            sum = sum + nuc.posit;
        }
        sum / self.nnuc() as f64
    }
}

/// Parse a nuclear label like "O1" or "C10" into (symbol, sequence number).
/// Labels missing a numeric suffix get sequence 0.
pub fn split_label(label: &str) -> (String, u32) {
    let sym: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let num = u32::from_str(&label[sym.len()..]).unwrap_or(0);
    (sym, num)
}

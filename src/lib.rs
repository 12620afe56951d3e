//! Locates the critical-point network of a molecular scalar field (the
//! electron density ρ, or the Localized Orbital Locator, LOL) derived from a
//! Gaussian-type wavefunction, classifies each critical point by its Hessian
//! signature, and traces the bond paths connecting attractors through bond
//! critical points.
//!
//! The wavefunction itself comes from outside: WFN/WFX readers parse their
//! arrays and hand them to [`Wavefunction::new`]. From there,
//! [`CritPtNetwork::set_critical_points`] runs the eigenvector-following
//! searches, `set_bond_paths` integrates the gradient paths, and the tables
//! can be persisted to the plain-text `.cpx` format.

pub mod cpx;
mod eigen;
pub mod error;
pub mod eval;
pub mod grad_path;
mod network;
pub mod search;
pub mod wavefunction;

use std::fmt::{self, Display, Formatter};

use lin_alg::f64::Vec3;

pub use error::{Error, Result, TopologyWarning};
pub use eval::{FieldProperties, FieldSample, field_properties};
pub use grad_path::{GRAD_PATH_MAX_PTS, GradPath, PathEnd};
pub use network::{Config, CritPtNetwork, EPS_CP_DUP};
pub use wavefunction::{Nucleus, Wavefunction};

/// The scalar field a critical-point analysis runs over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalarField {
    /// Electron density ρ.
    #[default]
    Rho,
    /// Localized Orbital Locator γ ∈ [0, 1].
    Lol,
}

impl Display for ScalarField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = match self {
            Self::Rho => "Rho",
            Self::Lol => "LOL",
        };
        write!(f, "{val}")
    }
}

/// Critical-point kinds, one per Hessian signature in a 3D field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CpKind {
    /// Attractor (field maximum), signature −3.
    Acp,
    /// Bond CP (1-saddle), signature −1.
    Bcp,
    /// Ring CP (2-saddle), signature +1.
    Rcp,
    /// Cage CP (field minimum), signature +3.
    Ccp,
}

impl CpKind {
    pub const ALL: [Self; 4] = [Self::Acp, Self::Bcp, Self::Rcp, Self::Ccp];

    /// Number of negative minus positive Hessian eigenvalues at a CP of this
    /// kind.
    pub fn signature(self) -> i8 {
        match self {
            Self::Acp => -3,
            Self::Bcp => -1,
            Self::Rcp => 1,
            Self::Ccp => 3,
        }
    }

    pub fn from_signature(sig: i8) -> Option<Self> {
        match sig {
            -3 => Some(Self::Acp),
            -1 => Some(Self::Bcp),
            1 => Some(Self::Rcp),
            3 => Some(Self::Ccp),
            _ => None,
        }
    }
}

impl Display for CpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = match self {
            Self::Acp => "ACP",
            Self::Bcp => "BCP",
            Self::Rcp => "RCP",
            Self::Ccp => "CCP",
        };
        write!(f, "{val}")
    }
}

/// One converged, classified critical point.
#[derive(Clone, Debug)]
pub struct CritPoint {
    pub posit: Vec3,
    /// Field value at `posit`.
    pub value: f64,
    pub signature: i8,
    /// ACPs carry the nearest nucleus label (or "NNACPn"); BCPs the joined
    /// labels of their attractors; RCPs/CCPs "RCPn"/"CCPn".
    pub label: String,
    /// For BCPs: ACP-table indices of the two attractors it connects.
    pub attractors: Option<[usize; 2]>,
}

/// A bond path: the steepest-ascent polyline through a BCP, stored running
/// ACP → BCP → ACP.
#[derive(Clone, Debug)]
pub struct BondPath {
    /// Index into the BCP table.
    pub bcp: usize,
    pub points: Vec<Vec3>,
    /// False when a side was truncated at the point cap or stagnated before
    /// reaching an attractor.
    pub complete: bool,
}

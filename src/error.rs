//! Error types for the critical-point engine.

use lin_alg::f64::Vec3;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported wavefunction data, or a malformed CPX/coordinate file.
    /// Aborts the run with a diagnostic naming the offending input.
    #[error("Input error: {0}")]
    Input(String),

    /// The field evaluator produced a non-finite value. Aborts the run.
    #[error("Non-finite field value at {point:?}")]
    Numerical { point: Vec3 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// An optimizer or integrator running out of iterations is not an `Error`:
// the seed is simply discarded (`SearchOutcome::NoConvergence`, a truncated
// `PathEnd`) and the orchestrator logs a warning.

/// Poincaré–Hopf mismatches and unassociated BCPs are reported, not fatal.
/// The network records them and emits a `tracing` warning.
#[derive(Clone, Debug, PartialEq)]
pub enum TopologyWarning {
    /// #ACP − #BCP + #RCP − #CCP differs from the expected characteristic.
    PoincareHopf { sum: i32, expected: i32 },
    /// A bond path from this BCP terminated away from any ACP.
    NonNormalBcp { bcp: usize },
}

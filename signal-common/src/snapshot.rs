use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// A snapshot of the simulation state at a specific time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation time (in seconds) at which the snapshot was taken.
    pub time: f64,
    /// Number of completed simulation steps.
    pub step: u32,
    /// Grid dimensions shared by every signal grid below.
    pub grid_width: usize,
    pub grid_height: usize,
    /// Signal names in id order.
    pub signal_names: Vec<String>,
    /// Row-major concentrations for each signal, without the halo.
    pub signal_grids: Vec<Vec<f64>>,
    /// Intracellular molecule counts, one map per cell.
    pub cell_molecules: Vec<BTreeMap<String, u64>>,
    /// Reactions fired since the start of the run.
    pub total_firings: u64,
}

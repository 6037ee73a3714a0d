use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // World & Grid
    pub world_width: f32,
    pub world_height: f32,
    pub grid_dim_x: usize,
    pub grid_dim_y: usize,
    pub cell_step_x: f32, // World length covered by one grid cell along x
    pub cell_step_y: f32,

    // Time
    pub dt: f64,
    pub total_steps: u32,
    pub record_interval_steps: u32,

    // Reactions
    pub env_unit_conversion: f64, // Molecule count -> field concentration factor
    pub reaction_seed: u64,

    /// Largest `diffusion_rate * dt / step^2` over all signals. The explicit
    /// scheme is only stable while this stays at or below 0.25.
    pub max_diffusion_number: f64,
}

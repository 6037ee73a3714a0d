pub mod config;
pub mod shape;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    SimulationConfig, UniverseConfig, TimingConfig, DiffusionConfig, SignalConfig, ObstacleConfig,
    SourceConfig,
    ReactionsConfig, ProgramConfig, RuleConfig, ConditionConfig, CellConfig, OutputConfig,
};
pub use shape::{Footprint, Shape};
pub use sim_params::SimParams;
pub use snapshot::Snapshot;
pub use vecmath::Vec2;

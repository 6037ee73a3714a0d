use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::shape::{Footprint, Shape};
use crate::sim_params::SimParams;
use crate::vecmath::Vec2;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// Configuration for universe properties
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UniverseConfig {
    pub width_um: f32,
    pub height_um: f32,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub dt_s: f64,
    pub total_time_s: f64,
    pub record_interval_s: f64,
}

// One diffusible signal species
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SignalConfig {
    pub name: String,
    pub diffusion_rate: f64, // um^2/s
    #[serde(default)]
    pub degradation_rate: f64, // 1/s
    #[serde(default)]
    pub color: Option<[u8; 3]>,
}

// Static object whose shapes block diffusion
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ObstacleConfig {
    pub position: Vec2,
    #[serde(default)]
    pub rotation: f32,
    pub shapes: Vec<Shape>,
}

// Rectangle producing a signal at a constant rate
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SourceConfig {
    pub signal: String,
    pub position: Vec2,
    pub size: Vec2,
    pub production: f64, // amount/s
    /// Iteration ranges such as "10-20 30"; always active when absent.
    #[serde(default)]
    pub active: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DiffusionConfig {
    pub grid: [usize; 2],
    /// Optional CSV file receiving the whole grid after every update.
    #[serde(default)]
    pub data_out: Option<String>,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

// Inequality guard attached to the most recent rule
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConditionConfig {
    pub molecule: String,
    pub requirement: f64,
    #[serde(default)]
    pub less: bool,
    #[serde(default)]
    pub clone: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuleConfig {
    #[serde(default)]
    pub reactants: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    pub rate: f64,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

// A named reaction program that cells can reference
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProgramConfig {
    pub name: String,
    pub rules: Vec<RuleConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReactionsConfig {
    #[serde(default)]
    pub seed: u64,
    /// Factor applied to molecule deltas written into the field.
    #[serde(default = "default_env_unit_conversion")]
    pub env_unit_conversion: f64,
    #[serde(default)]
    pub footprint: Footprint,
    #[serde(default)]
    pub programs: Vec<ProgramConfig>,
}

impl Default for ReactionsConfig {
    fn default() -> Self {
        ReactionsConfig {
            seed: 0,
            env_unit_conversion: default_env_unit_conversion(),
            footprint: Footprint::Border,
            programs: Vec::new(),
        }
    }
}

fn default_env_unit_conversion() -> f64 {
    1.0
}

// Initial placement and contents of one cell
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub position: Vec2,
    #[serde(default)]
    pub rotation: f32,
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub molecules: BTreeMap<String, u64>,
    #[serde(default)]
    pub program: Option<String>,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub save_cell_counts: bool, // Final molecule counts per cell as CSV
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub universe: UniverseConfig,
    pub timing: TimingConfig,
    pub diffusion: DiffusionConfig,
    #[serde(default)]
    pub reactions: ReactionsConfig,
    #[serde(default)]
    pub cells: Vec<CellConfig>,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.universe.width_um <= 0.0 || self.universe.height_um <= 0.0 {
            anyhow::bail!("universe width_um and height_um must be positive.");
        }
        if self.timing.dt_s <= 0.0 {
            anyhow::bail!("dt_s must be positive.");
        }
        if self.timing.total_time_s < 0.0 {
            anyhow::bail!("total_time_s must not be negative.");
        }
        if self.diffusion.grid[0] == 0 || self.diffusion.grid[1] == 0 {
            anyhow::bail!("diffusion grid must be at least 1x1.");
        }

        let mut names = HashSet::new();
        for signal in &self.diffusion.signals {
            if !names.insert(signal.name.as_str()) {
                anyhow::bail!("signal '{}' is defined more than once.", signal.name);
            }
            if signal.diffusion_rate < 0.0 || signal.degradation_rate < 0.0 {
                anyhow::bail!("signal '{}' has a negative rate.", signal.name);
            }
        }

        for source in &self.diffusion.sources {
            if !names.contains(source.signal.as_str()) {
                anyhow::bail!("source references unknown signal '{}'.", source.signal);
            }
            if source.production < 0.0 {
                anyhow::bail!("source of '{}' has negative production {}.", source.signal, source.production);
            }
        }

        let mut programs = HashSet::new();
        for program in &self.reactions.programs {
            if !programs.insert(program.name.as_str()) {
                anyhow::bail!("reaction program '{}' is defined more than once.", program.name);
            }
            if let Some(rule) = program.rules.iter().find(|rule| rule.rate < 0.0) {
                anyhow::bail!("program '{}' has a rule with negative rate {}.", program.name, rule.rate);
            }
        }

        for (idx, cell) in self.cells.iter().enumerate() {
            if let Some(program) = &cell.program {
                if !programs.contains(program.as_str()) {
                    anyhow::bail!("cell {} references unknown program '{}'.", idx, program);
                }
            }
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let world_width = self.universe.width_um;
        let world_height = self.universe.height_um;
        let [grid_dim_x, grid_dim_y] = self.diffusion.grid;
        let cell_step_x = world_width / grid_dim_x as f32;
        let cell_step_y = world_height / grid_dim_y as f32;

        let dt = self.timing.dt_s;
        let total_steps = (self.timing.total_time_s / dt).ceil() as u32;
        let record_interval_steps = (self.timing.record_interval_s.max(0.0) / dt).round().max(1.0) as u32;

        // Stability of the explicit scheme is governed by the finer axis.
        let min_step = cell_step_x.min(cell_step_y) as f64;
        let max_diffusion_number = self.diffusion.signals.iter()
            .map(|s| s.diffusion_rate * dt / (min_step * min_step))
            .fold(0.0, f64::max);

        SimParams {
            world_width,
            world_height,
            grid_dim_x,
            grid_dim_y,
            cell_step_x,
            cell_step_y,
            dt,
            total_steps,
            record_interval_steps,
            env_unit_conversion: self.reactions.env_unit_conversion,
            reaction_seed: self.reactions.seed,
            max_diffusion_number,
        }
    }
}

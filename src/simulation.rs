use crate::agent::Cell;
use crate::diffusion::DiffusionField;
use crate::export::DiffusionExporter;
use crate::generator::SignalGenerator;
use crate::reactions::{compile_program, StepContext, StochasticReactions};
use anyhow::{Context, Result};
use log::{debug, info, trace};
use rand::prelude::*;
use signal_common::{SimParams, SimulationConfig, Snapshot, Vec2};
use std::collections::HashMap;
use std::fs::File;

/// Owns the diffusion field, the cells with their reaction programs and the
/// random stream shared by all of them.
pub struct Simulation {
    /// The simulation configuration the state was built from.
    config: SimulationConfig,
    params: SimParams,
    field: DiffusionField,
    generator: SignalGenerator,
    cells: Vec<Cell>,
    /// Reaction engine per cell, `None` for cells without a program.
    programs: Vec<Option<StochasticReactions>>,
    /// Single stream for every reaction step; cells are visited in a fixed
    /// order so a seed reproduces a run.
    rng: StdRng,
    /// The current simulation time step number.
    current_time_step: u32,
    total_firings: u64,
    exporter: Option<DiffusionExporter<File>>,
    recorded_snapshots: Vec<Snapshot>,
}

impl Simulation {
    /// Builds the field, obstacles and cells described by `config`.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let params = config.get_sim_params();
        let world_size = Vec2::new(params.world_width, params.world_height);
        let field = DiffusionField::from_config(&config.diffusion, world_size);
        let generator = SignalGenerator::from_config(&config.diffusion.sources, &field)
            .context("configuring signal sources")?;

        // Compile each program once; cells get their own copy of the engine
        let mut compiled = HashMap::new();
        for program in &config.reactions.programs {
            let reactions = compile_program(program, config.reactions.footprint)?;
            compiled.insert(program.name.as_str(), reactions);
        }

        let mut cells = Vec::with_capacity(config.cells.len());
        let mut programs = Vec::with_capacity(config.cells.len());
        for (idx, cell_config) in config.cells.iter().enumerate() {
            let program = match &cell_config.program {
                Some(name) => Some(
                    compiled
                        .get(name.as_str())
                        .cloned()
                        .with_context(|| format!("cell {} references unknown program '{}'", idx, name))?,
                ),
                None => None,
            };
            cells.push(Cell::from_config(idx, cell_config));
            programs.push(program);
        }
        info!(
            "Placed {} cells, {} with a reaction program.",
            cells.len(),
            programs.iter().filter(|p| p.is_some()).count()
        );

        let exporter = match &config.diffusion.data_out {
            Some(path) => Some(DiffusionExporter::create(path, &field)?),
            None => None,
        };

        let rng = StdRng::seed_from_u64(params.reaction_seed);

        Ok(Self {
            config,
            params,
            field,
            generator,
            cells,
            programs,
            rng,
            current_time_step: 0,
            total_firings: 0,
            exporter,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances the simulation by one time step: sources and diffusion first,
    /// then the reactions of every cell in order.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.params.dt;

        // --- 1. Diffusion ---
        let iteration = self.current_time_step as u64 + 1;
        self.generator.apply(&mut self.field, iteration, dt);
        self.field.update(dt);
        if let Some(exporter) = &mut self.exporter {
            let time = (self.current_time_step + 1) as f64 * dt;
            exporter.write(&self.field, time)?;
        }

        // --- 2. Reactions ---
        let mut firings = 0;
        for (cell, program) in self.cells.iter_mut().zip(self.programs.iter_mut()) {
            let Some(reactions) = program else { continue };
            let mut ctx = StepContext::new(&mut self.field, self.params.env_unit_conversion);
            let report = reactions.step(cell, &mut ctx, dt, &mut self.rng);
            trace!("Cell '{}': {} firings in {:.4} s", cell.name, report.firings, report.elapsed);
            firings += report.firings;
        }
        self.total_firings += firings;

        self.current_time_step += 1;
        Ok(())
    }

    /// Stores the current grids and molecule counts as a snapshot.
    pub fn record_snapshot(&mut self) -> Result<()> {
        let time = self.current_time();
        debug!("Recording snapshot at {:.3} s...", time);

        let mut signal_names = Vec::with_capacity(self.field.signal_count());
        let mut signal_grids = Vec::with_capacity(self.field.signal_count());
        for id in self.field.signal_ids() {
            signal_names.push(self.field.signal_name(id)?.to_string());
            signal_grids.push(self.field.interior(id)?);
        }

        let size = self.field.grid_size();
        self.recorded_snapshots.push(Snapshot {
            time,
            step: self.current_time_step,
            grid_width: size.width,
            grid_height: size.height,
            signal_names,
            signal_grids,
            cell_molecules: self.cells.iter().map(|c| c.molecules.clone()).collect(),
            total_firings: self.total_firings,
        });
        Ok(())
    }

    /// Flushes the diffusion data export, if any.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(exporter) = &mut self.exporter {
            exporter.flush()?;
        }
        Ok(())
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn field(&self) -> &DiffusionField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut DiffusionField {
        &mut self.field
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn program(&self, cell: usize) -> Option<&StochasticReactions> {
        self.programs.get(cell).and_then(Option::as_ref)
    }

    pub fn current_time_step(&self) -> u32 {
        self.current_time_step
    }

    pub fn current_time(&self) -> f64 {
        self.current_time_step as f64 * self.params.dt
    }

    pub fn total_firings(&self) -> u64 {
        self.total_firings
    }

    /// Provides access to the recorded snapshots.
    pub fn get_recorded_snapshots(&self) -> &Vec<Snapshot> {
        &self.recorded_snapshots
    }
}

//! Diffusing signal fields coupled to stochastic reactions inside cells.
//!
//! A [`DiffusionField`] holds one concentration grid per signal and advances
//! it with an explicit finite-difference step. Each cell carrying a reaction
//! program owns a [`StochasticReactions`] engine that exchanges molecules with
//! the grid cells under the cell's [`cell_footprint`].

pub mod agent;
pub mod diffusion;
pub mod export;
pub mod generator;
pub mod grid;
pub mod rasterizer;
pub mod reactions;
pub mod simulation;

pub use agent::{Agent, Cell};
pub use diffusion::{DiffusionField, FieldError, SignalId};
pub use export::DiffusionExporter;
pub use generator::{ActiveRanges, SignalGenerator, SignalSource, SourceError};
pub use grid::{Coordinate, GridMetrics, GridSize};
pub use rasterizer::{cell_footprint, rasterize_shape};
pub use reactions::{compile_program, Phase, ReactionError, StepContext, StepReport, StochasticReactions};
pub use simulation::Simulation;

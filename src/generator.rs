//! Constant-rate signal sources.

use crate::diffusion::{DiffusionField, FieldError, SignalId};
use crate::grid::Coordinate;
use crate::rasterizer::rasterize_shape;
use log::{debug, info};
use signal_common::{Footprint, Shape, SourceConfig, Vec2};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("invalid active range '{0}', expected 'n' or 'a-b'")]
    InvalidRange(String),
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Inclusive iteration ranges during which a source produces.
///
/// Parsed from whitespace-separated tokens like `"10-20 30"`. No ranges
/// means the source is always active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveRanges(Vec<(u64, u64)>);

impl ActiveRanges {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn contains(&self, iteration: u64) -> bool {
        self.0.is_empty() || self.0.iter().any(|&(first, last)| (first..=last).contains(&iteration))
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.0
    }
}

impl FromStr for ActiveRanges {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |token: &str| SourceError::InvalidRange(token.to_string());
        let mut ranges = Vec::new();
        for token in s.split_whitespace() {
            let range = match token.split_once('-') {
                Some((first, last)) => (
                    first.parse().map_err(|_| invalid(token))?,
                    last.parse().map_err(|_| invalid(token))?,
                ),
                None => {
                    let single = token.parse().map_err(|_| invalid(token))?;
                    (single, single)
                }
            };
            if range.0 > range.1 {
                return Err(invalid(token));
            }
            ranges.push(range);
        }
        Ok(Self(ranges))
    }
}

/// Axis-aligned rectangle adding `production` units of a signal per time.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSource {
    pub signal: SignalId,
    pub position: Vec2,
    pub size: Vec2,
    pub production: f64,
    pub active: ActiveRanges,
}

/// All sources of a simulation, applied once per step ahead of diffusion.
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    sources: Vec<SignalSource>,
    coords: Vec<Coordinate>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `[[diffusion.sources]]` against the registered signals.
    pub fn from_config(configs: &[SourceConfig], field: &DiffusionField) -> Result<Self, SourceError> {
        let mut generator = Self::new();
        for config in configs {
            let active = match &config.active {
                Some(text) => text.parse()?,
                None => ActiveRanges::always(),
            };
            generator.add(SignalSource {
                signal: field.require_signal_id(&config.signal)?,
                position: config.position,
                size: config.size,
                production: config.production,
                active,
            });
        }
        if !generator.is_empty() {
            info!("[diffusion] {} signal sources", generator.len());
        }
        Ok(generator)
    }

    pub fn add(&mut self, source: SignalSource) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[SignalSource] {
        &self.sources
    }

    /// Spreads `production * dt` of every source active at `iteration`
    /// evenly over the cells under its rectangle.
    pub fn apply(&mut self, field: &mut DiffusionField, iteration: u64, dt: f64) {
        let metrics = *field.metrics();
        for source in &self.sources {
            if !source.active.contains(iteration) {
                continue;
            }
            let Some(center) = metrics.coordinate_of(source.position) else {
                continue;
            };

            self.coords.clear();
            rasterize_shape(
                &Shape::rectangle(source.size),
                source.position,
                0.0,
                &metrics,
                Footprint::Solid,
                &mut self.coords,
            );
            self.coords.sort_unstable();
            self.coords.dedup();
            if self.coords.is_empty() {
                self.coords.push(center);
            }

            let amount = source.production * dt / self.coords.len() as f64;
            for coord in &self.coords {
                field.add(source.signal, *coord, amount);
            }
            debug!(
                "[diffusion] Source of {} added {} over {} cells at iteration {}",
                source.signal,
                source.production * dt,
                self.coords.len(),
                iteration
            );
        }
    }
}

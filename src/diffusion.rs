use crate::grid::{Coordinate, GridMetrics, GridSize, PingPongGrid, HALO};
use crate::rasterizer::rasterize_shape;
use log::{debug, info, trace};
use signal_common::{DiffusionConfig, Footprint, Shape, Vec2};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Dense signal identifier, assigned in registration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub u32);

impl SignalId {
    #[inline(always)]
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration-time failures of the diffusion field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown signal '{0}'")]
    UnknownSignalName(String),
    #[error("unknown signal id {0}")]
    UnknownSignalId(SignalId),
}

/// One diffusible species and its grids.
#[derive(Debug, Clone)]
struct Signal {
    name: String,
    diffusion_rate: f64,   // length^2 / time
    degradation_rate: f64, // fraction / time
    color: Option<[u8; 3]>,
    grid: PingPongGrid,
}

/// Concentration grids for every registered signal, advanced by explicit
/// finite differences.
///
/// All grids share the same [`GridMetrics`]. The boundary is closed: the halo
/// mirrors the outermost cells before every update, so without degradation
/// the total amount of each signal is conserved. Obstacle cells keep their
/// value and behave like walls for their neighbours.
#[derive(Debug, Clone)]
pub struct DiffusionField {
    metrics: GridMetrics,
    signals: Vec<Signal>,
    names: HashMap<String, SignalId>,
    /// Padded obstacle mask; the halo entries are always `false`.
    obstacles: Vec<bool>,
    iteration: u64,
}

impl DiffusionField {
    pub fn new(world_size: Vec2, grid_size: GridSize) -> Self {
        Self {
            metrics: GridMetrics::new(world_size, grid_size),
            signals: Vec::new(),
            names: HashMap::new(),
            obstacles: vec![false; padded_len(grid_size)],
            iteration: 0,
        }
    }

    /// Builds the field described by the `[diffusion]` configuration section.
    pub fn from_config(config: &DiffusionConfig, world_size: Vec2) -> Self {
        let grid_size = GridSize::new(config.grid[0], config.grid[1]);
        let mut field = Self::new(world_size, grid_size);

        for signal in &config.signals {
            let id = field.register_signal(&signal.name, signal.diffusion_rate, signal.degradation_rate);
            field.signals[id.index()].color = signal.color;
        }
        for obstacle in &config.obstacles {
            field.mark_obstacle_shapes(obstacle.position, obstacle.rotation, &obstacle.shapes);
        }

        info!("[diffusion] Grid size: {}x{}", grid_size.width, grid_size.height);
        for signal in &field.signals {
            info!("[diffusion] Signal '{}':", signal.name);
            info!("[diffusion]   Diffusion rate: {} um2/s", signal.diffusion_rate);
            info!("[diffusion]   Degradation rate: {} /s", signal.degradation_rate);
        }
        if !config.obstacles.is_empty() {
            info!(
                "[diffusion] {} obstacle cells from {} objects",
                field.obstacles.iter().filter(|o| **o).count(),
                config.obstacles.len()
            );
        }
        field
    }

    /// Registers a signal, or returns the existing id if `name` is taken.
    pub fn register_signal(&mut self, name: &str, diffusion_rate: f64, degradation_rate: f64) -> SignalId {
        if let Some(&id) = self.names.get(name) {
            debug!("[diffusion] Signal '{}' already registered as {}", name, id);
            return id;
        }
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(Signal {
            name: name.to_string(),
            diffusion_rate,
            degradation_rate,
            color: None,
            grid: PingPongGrid::new(self.metrics.grid_size()),
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Reallocates every grid for `grid_size`. Existing concentrations and
    /// obstacles are discarded.
    pub fn resize(&mut self, grid_size: GridSize) {
        self.metrics = GridMetrics::new(self.metrics.world_size(), grid_size);
        for signal in &mut self.signals {
            signal.grid = PingPongGrid::new(grid_size);
        }
        self.obstacles = vec![false; padded_len(grid_size)];
    }

    #[inline(always)]
    pub fn metrics(&self) -> &GridMetrics { &self.metrics }

    #[inline(always)]
    pub fn grid_size(&self) -> GridSize { self.metrics.grid_size() }

    #[inline(always)]
    pub fn signal_count(&self) -> usize { self.signals.len() }

    /// Number of completed updates.
    #[inline(always)]
    pub fn iteration(&self) -> u64 { self.iteration }

    pub fn signal_ids(&self) -> impl Iterator<Item = SignalId> {
        (0..self.signals.len() as u32).map(SignalId)
    }

    pub fn signal_id(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    pub fn require_signal_id(&self, name: &str) -> Result<SignalId, FieldError> {
        self.signal_id(name).ok_or_else(|| FieldError::UnknownSignalName(name.to_string()))
    }

    pub fn signal_name(&self, id: SignalId) -> Result<&str, FieldError> {
        self.signal(id).map(|s| s.name.as_str())
    }

    pub fn diffusion_rate(&self, id: SignalId) -> Result<f64, FieldError> {
        self.signal(id).map(|s| s.diffusion_rate)
    }

    pub fn degradation_rate(&self, id: SignalId) -> Result<f64, FieldError> {
        self.signal(id).map(|s| s.degradation_rate)
    }

    pub fn signal_color(&self, id: SignalId) -> Result<Option<[u8; 3]>, FieldError> {
        self.signal(id).map(|s| s.color)
    }

    pub fn set_diffusion_rate(&mut self, id: SignalId, rate: f64) -> Result<(), FieldError> {
        self.signal_mut(id)?.diffusion_rate = rate;
        Ok(())
    }

    pub fn set_degradation_rate(&mut self, id: SignalId, rate: f64) -> Result<(), FieldError> {
        self.signal_mut(id)?.degradation_rate = rate;
        Ok(())
    }

    pub fn set_signal_color(&mut self, id: SignalId, color: Option<[u8; 3]>) -> Result<(), FieldError> {
        self.signal_mut(id)?.color = color;
        Ok(())
    }

    /// Concentration at `coord` in the current buffer.
    ///
    /// # Panics
    /// If `id` was never registered or `coord` lies outside the grid.
    #[inline(always)]
    pub fn get(&self, id: SignalId, coord: Coordinate) -> f64 {
        self.signals[id.index()].grid.get(coord)
    }

    /// Overwrites the concentration at `coord`. Panics like [`Self::get`].
    #[inline(always)]
    pub fn set(&mut self, id: SignalId, coord: Coordinate, value: f64) {
        self.signals[id.index()].grid.set(coord, value);
    }

    /// Adds `delta` to the concentration at `coord`. Panics like [`Self::get`].
    #[inline(always)]
    pub fn add(&mut self, id: SignalId, coord: Coordinate, delta: f64) {
        *self.signals[id.index()].grid.get_mut(coord) += delta;
    }

    pub fn get_named(&self, name: &str, coord: Coordinate) -> Result<f64, FieldError> {
        Ok(self.get(self.require_signal_id(name)?, coord))
    }

    pub fn set_named(&mut self, name: &str, coord: Coordinate, value: f64) -> Result<(), FieldError> {
        let id = self.require_signal_id(name)?;
        self.set(id, coord, value);
        Ok(())
    }

    /// Mean concentration over `coords`, zero for an empty set.
    pub fn mean(&self, id: SignalId, coords: &[Coordinate]) -> f64 {
        if coords.is_empty() {
            return 0.0;
        }
        let grid = &self.signals[id.index()].grid;
        coords.iter().map(|c| grid.get(*c)).sum::<f64>() / coords.len() as f64
    }

    /// Sum of a signal over the whole grid.
    pub fn total(&self, id: SignalId) -> Result<f64, FieldError> {
        self.signal(id).map(|s| s.grid.sum())
    }

    /// Row-major copy of a signal's grid without the halo.
    pub fn interior(&self, id: SignalId) -> Result<Vec<f64>, FieldError> {
        self.signal(id).map(|s| s.grid.interior())
    }

    pub fn set_obstacle(&mut self, coord: Coordinate, obstacle: bool) {
        let idx = self.padded_index(coord);
        self.obstacles[idx] = obstacle;
    }

    pub fn is_obstacle(&self, coord: Coordinate) -> bool {
        self.obstacles[self.padded_index(coord)]
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.fill(false);
    }

    /// Marks every cell covered by the shapes of a static object.
    pub fn mark_obstacle_shapes(&mut self, position: Vec2, rotation: f32, shapes: &[Shape]) {
        let mut coords = Vec::new();
        for shape in shapes {
            rasterize_shape(shape, position, rotation, &self.metrics, Footprint::Solid, &mut coords);
        }
        for coord in coords {
            self.set_obstacle(coord, true);
        }
    }

    /// Advances every signal by one forward-Euler step of length `dt`.
    ///
    /// New value: `(v + D*dt/hx^2 * lap_x + D*dt/hy^2 * lap_y) * (1 - k*dt)`.
    /// Stability requires `D*dt/h^2 <= 0.25`; this is not checked.
    pub fn update(&mut self, dt: f64) {
        let start = Instant::now();
        let step = self.metrics.cell_step();
        let size = self.metrics.grid_size();
        let obstacles = &self.obstacles;

        if !size.is_empty() {
            for signal in &mut self.signals {
                let coeff_x = signal.diffusion_rate * dt / (step.x as f64 * step.x as f64);
                let coeff_y = signal.diffusion_rate * dt / (step.y as f64 * step.y as f64);
                let decay = 1.0 - signal.degradation_rate * dt;
                update_signal(&mut signal.grid, obstacles, coeff_x, coeff_y, decay);
            }
        }
        self.iteration += 1;

        trace!(
            "[diffusion] Update {} of {} signals took {:.3} ms",
            self.iteration,
            self.signals.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    fn signal(&self, id: SignalId) -> Result<&Signal, FieldError> {
        self.signals.get(id.index()).ok_or(FieldError::UnknownSignalId(id))
    }

    fn signal_mut(&mut self, id: SignalId) -> Result<&mut Signal, FieldError> {
        self.signals.get_mut(id.index()).ok_or(FieldError::UnknownSignalId(id))
    }

    #[inline(always)]
    fn padded_index(&self, coord: Coordinate) -> usize {
        let size = self.metrics.grid_size();
        debug_assert!(coord.x < size.width && coord.y < size.height);
        (coord.y + HALO) * (size.width + 2 * HALO) + coord.x + HALO
    }
}

fn padded_len(size: GridSize) -> usize {
    (size.width + 2 * HALO) * (size.height + 2 * HALO)
}

/// 4-neighbour stencil from the front buffer into the back buffer, then swap.
fn update_signal(grid: &mut PingPongGrid, obstacles: &[bool], coeff_x: f64, coeff_y: f64, decay: f64) {
    let size = grid.size();
    let stride = grid.stride();
    grid.mirror_halo();

    {
        let (front, back) = grid.split();
        for y in HALO..size.height + HALO {
            for x in HALO..size.width + HALO {
                let i = y * stride + x;
                let v = front[i];
                if obstacles[i] {
                    back[i] = v;
                    continue;
                }
                // Walls reflect: an obstacle neighbour contributes no flux
                let at = |j: usize| if obstacles[j] { v } else { front[j] };
                let lap_x = at(i - 1) + at(i + 1) - 2.0 * v;
                let lap_y = at(i - stride) + at(i + stride) - 2.0 * v;
                back[i] = (v + coeff_x * lap_x + coeff_y * lap_y) * decay;
            }
        }
    }

    grid.swap();
}

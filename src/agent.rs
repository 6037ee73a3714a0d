use signal_common::{CellConfig, Shape, Vec2};
use std::collections::BTreeMap;

/// What the reaction engine needs from the entity it runs in.
///
/// Molecule counts are looked up by name; a name the agent has never seen
/// reads as zero.
pub trait Agent {
    fn position(&self) -> Vec2;
    fn rotation(&self) -> f32;
    fn shapes(&self) -> &[Shape];
    fn molecule_count(&self, name: &str) -> u64;
    fn change_molecule_count(&mut self, name: &str, delta: i64);
}

/// A static cell with an intracellular molecule inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub position: Vec2,
    pub rotation: f32,
    pub shapes: Vec<Shape>,
    pub molecules: BTreeMap<String, u64>,
}

impl Cell {
    pub fn new(name: impl Into<String>, position: Vec2, shapes: Vec<Shape>) -> Self {
        Self {
            name: name.into(),
            position,
            rotation: 0.0,
            shapes,
            molecules: BTreeMap::new(),
        }
    }

    pub fn from_config(idx: usize, config: &CellConfig) -> Self {
        Self {
            name: config.name.clone().unwrap_or_else(|| format!("cell{}", idx)),
            position: config.position,
            rotation: config.rotation,
            shapes: config.shapes.clone(),
            molecules: config.molecules.clone(),
        }
    }

    pub fn with_molecule(mut self, name: &str, count: u64) -> Self {
        self.molecules.insert(name.to_string(), count);
        self
    }
}

impl Agent for Cell {
    #[inline(always)]
    fn position(&self) -> Vec2 { self.position }

    #[inline(always)]
    fn rotation(&self) -> f32 { self.rotation }

    #[inline(always)]
    fn shapes(&self) -> &[Shape] { &self.shapes }

    fn molecule_count(&self, name: &str) -> u64 {
        self.molecules.get(name).copied().unwrap_or(0)
    }

    /// Counts saturate at zero.
    fn change_molecule_count(&mut self, name: &str, delta: i64) {
        if delta == 0 {
            return;
        }
        let count = self.molecules.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add_signed(delta);
    }
}

use signal_common::Vec2; // Use shared crate

/// Width of the padding border around every signal grid.
pub const HALO: usize = 1;

/// Integer cell index in un-padded grid space, `[0, size)` on both axes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    pub x: usize,
    pub y: usize,
}

impl Coordinate {
    #[inline(always)]
    pub fn new(x: usize, y: usize) -> Self { Self { x, y } }
}

/// Logical grid dimensions (without the halo).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    #[inline(always)]
    pub fn new(width: usize, height: usize) -> Self { Self { width, height } }

    #[inline(always)]
    pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 }

    /// Checks a signed grid position against `[0, width) x [0, height)`.
    #[inline(always)]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Iterates all coordinates in row-major order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Coordinate::new(x, y)))
    }
}

/// Relation between the continuous world and the discrete grid.
///
/// The world is centred on the origin, so the grid's (0, 0) cell starts at
/// `-world_size / 2`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridMetrics {
    world_size: Vec2,
    grid_size: GridSize,
}

impl GridMetrics {
    pub fn new(world_size: Vec2, grid_size: GridSize) -> Self {
        Self { world_size, grid_size }
    }

    #[inline(always)]
    pub fn world_size(&self) -> Vec2 { self.world_size }

    #[inline(always)]
    pub fn grid_size(&self) -> GridSize { self.grid_size }

    /// World length covered by one grid cell on each axis.
    #[inline(always)]
    pub fn cell_step(&self) -> Vec2 {
        self.world_size.div(Vec2::new(self.grid_size.width as f32, self.grid_size.height as f32))
    }

    #[inline(always)]
    pub fn world_origin(&self) -> Vec2 { self.world_size.scale(-0.5) }

    /// Converts a world position into continuous grid units (not floored).
    #[inline(always)]
    pub fn to_grid_space(&self, pos: Vec2) -> Vec2 {
        pos.sub(self.world_origin()).div(self.cell_step())
    }

    /// Maps a world position onto its grid cell, or `None` outside the world.
    pub fn coordinate_of(&self, pos: Vec2) -> Option<Coordinate> {
        if self.grid_size.is_empty() { return None; } // No grid, no cells
        let rel = pos.sub(self.world_origin());
        if !rel.in_range(Vec2::zero(), self.world_size) {
            return None;
        }
        let g = rel.div(self.cell_step());
        // Clamp to grid dimensions to absorb rounding at the upper edge
        let x = (g.x.floor() as usize).min(self.grid_size.width - 1);
        let y = (g.y.floor() as usize).min(self.grid_size.height - 1);
        Some(Coordinate::new(x, y))
    }
}

/// Halo-padded scalar grid with two buffers.
///
/// The front buffer is the authoritative state; the back buffer receives the
/// next state during an update and `swap` flips which one is current.
#[derive(Debug, Clone)]
pub struct PingPongGrid {
    size: GridSize,
    stride: usize,
    buffers: [Vec<f64>; 2],
    front: usize,
}

impl PingPongGrid {
    pub fn new(size: GridSize) -> Self {
        let stride = size.width + 2 * HALO;
        let len = stride * (size.height + 2 * HALO);
        Self {
            size,
            stride,
            buffers: [vec![0.0; len], vec![0.0; len]],
            front: 0,
        }
    }

    #[inline(always)]
    pub fn size(&self) -> GridSize { self.size }

    /// Row length of the padded storage.
    #[inline(always)]
    pub fn stride(&self) -> usize { self.stride }

    /// Storage index of a logical coordinate.
    #[inline(always)]
    pub fn index(&self, coord: Coordinate) -> usize {
        debug_assert!(coord.x < self.size.width && coord.y < self.size.height);
        (coord.y + HALO) * self.stride + coord.x + HALO
    }

    #[inline(always)]
    pub fn get(&self, coord: Coordinate) -> f64 {
        self.buffers[self.front][self.index(coord)]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, coord: Coordinate) -> &mut f64 {
        let idx = self.index(coord);
        &mut self.buffers[self.front][idx]
    }

    #[inline(always)]
    pub fn set(&mut self, coord: Coordinate, value: f64) {
        *self.get_mut(coord) = value;
    }

    /// Current buffer together with the scratch buffer for the next state.
    pub fn split(&mut self) -> (&[f64], &mut [f64]) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.front == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    /// Makes the back buffer current.
    #[inline(always)]
    pub fn swap(&mut self) {
        self.front ^= 1;
    }

    /// Copies every edge value into the adjacent halo cell so the stencil sees
    /// a zero-gradient (closed) boundary.
    pub fn mirror_halo(&mut self) {
        let GridSize { width, height } = self.size;
        if width == 0 || height == 0 { return; }
        let stride = self.stride;
        let grid = &mut self.buffers[self.front];

        for x in HALO..width + HALO {
            grid[x] = grid[stride + x];
            grid[(height + HALO) * stride + x] = grid[height * stride + x];
        }
        for y in HALO..height + HALO {
            grid[y * stride] = grid[y * stride + HALO];
            grid[y * stride + width + HALO] = grid[y * stride + width];
        }
    }

    /// Row-major copy of the front buffer without the halo.
    pub fn interior(&self) -> Vec<f64> {
        self.size.coordinates().map(|c| self.get(c)).collect()
    }

    /// Sum of the front buffer over the logical extent.
    pub fn sum(&self) -> f64 {
        self.size.coordinates().map(|c| self.get(c)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_10() -> GridMetrics {
        GridMetrics::new(Vec2::new(10.0, 10.0), GridSize::new(10, 10))
    }

    #[test]
    fn world_centre_maps_to_middle_cell() {
        let m = metrics_10();
        assert_eq!(m.coordinate_of(Vec2::zero()), Some(Coordinate::new(5, 5)));
        assert_eq!(m.coordinate_of(Vec2::new(-5.0, -5.0)), Some(Coordinate::new(0, 0)));
        assert_eq!(m.coordinate_of(Vec2::new(4.99, -0.5)), Some(Coordinate::new(9, 4)));
    }

    #[test]
    fn positions_outside_world_have_no_cell() {
        let m = metrics_10();
        assert_eq!(m.coordinate_of(Vec2::new(5.0, 0.0)), None);
        assert_eq!(m.coordinate_of(Vec2::new(0.0, -5.01)), None);
    }

    #[test]
    fn anisotropic_cell_step() {
        let m = GridMetrics::new(Vec2::new(20.0, 10.0), GridSize::new(4, 10));
        assert_eq!(m.cell_step(), Vec2::new(5.0, 1.0));
    }

    #[test]
    fn swap_exchanges_front_and_back() {
        let mut grid = PingPongGrid::new(GridSize::new(3, 2));
        let c = Coordinate::new(2, 1);
        grid.set(c, 4.0);
        {
            let idx = grid.index(c);
            let (front, back) = grid.split();
            back[idx] = front[idx] * 2.0;
        }
        assert_eq!(grid.get(c), 4.0);
        grid.swap();
        assert_eq!(grid.get(c), 8.0);
    }

    #[test]
    fn halo_mirrors_edges() {
        let mut grid = PingPongGrid::new(GridSize::new(2, 2));
        grid.set(Coordinate::new(0, 0), 1.0);
        grid.set(Coordinate::new(1, 1), 3.0);
        grid.mirror_halo();
        let stride = grid.stride();
        let (front, _) = grid.split();
        assert_eq!(front[1], 1.0); // above (0, 0)
        assert_eq!(front[stride], 1.0); // left of (0, 0)
        assert_eq!(front[3 * stride + 2], 3.0); // below (1, 1)
        assert_eq!(front[2 * stride + 3], 3.0); // right of (1, 1)
    }

    #[test]
    fn interior_skips_halo() {
        let mut grid = PingPongGrid::new(GridSize::new(3, 2));
        grid.set(Coordinate::new(1, 0), 2.0);
        grid.set(Coordinate::new(2, 1), 5.0);
        assert_eq!(grid.interior(), vec![0.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        assert_eq!(grid.sum(), 7.0);
    }
}

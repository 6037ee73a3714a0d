//! Mapping of continuous shapes onto grid coordinates.
//!
//! Every function here is pure. Positions are world-space, rotations are in
//! radians, and the output only ever contains coordinates inside the grid.

use crate::grid::{Coordinate, GridMetrics, GridSize};
use signal_common::{Footprint, Shape, Vec2};

/// Collects in-range grid positions, silently dropping the rest.
struct CoordSink<'a> {
    size: GridSize,
    out: &'a mut Vec<Coordinate>,
}

impl CoordSink<'_> {
    #[inline(always)]
    fn put(&mut self, x: i64, y: i64) {
        if self.size.contains(x, y) {
            self.out.push(Coordinate::new(x as usize, y as usize));
        }
    }
}

/// Appends the grid cells covered (or bordered) by `shape` to `out`.
///
/// `position` and `rotation` belong to the object owning the shape. The
/// output may contain duplicates; see [`cell_footprint`] for a deduplicated
/// set.
pub fn rasterize_shape(
    shape: &Shape,
    position: Vec2,
    rotation: f32,
    metrics: &GridMetrics,
    mode: Footprint,
    out: &mut Vec<Coordinate>,
) {
    let step = metrics.cell_step();
    let origin = metrics.to_grid_space(position);
    let mut sink = CoordSink { size: metrics.grid_size(), out };

    match shape {
        Shape::Circle { center, radius } => {
            let c = origin.add(center.rotated(rotation).div(step));
            let r = Vec2::splat(*radius).div(step);
            match mode {
                Footprint::Solid => fill_ellipse(&mut sink, c, r),
                Footprint::Border => trace_ellipse(&mut sink, c, r),
            }
        }
        Shape::Rectangle { center, size } => {
            let half = size.scale(0.5);
            let corners = [
                Vec2::new(-half.x, -half.y),
                Vec2::new(half.x, -half.y),
                Vec2::new(half.x, half.y),
                Vec2::new(-half.x, half.y),
            ];
            let vertices: Vec<Vec2> = corners
                .iter()
                .map(|corner| origin.add(center.add(*corner).rotated(rotation).div(step)))
                .collect();
            polygon(&mut sink, &vertices, mode);
        }
        Shape::Edges { vertices } => {
            let vertices: Vec<Vec2> = vertices
                .iter()
                .map(|v| origin.add(v.rotated(rotation).div(step)))
                .collect();
            polygon(&mut sink, &vertices, mode);
        }
    }
}

/// Unique grid coordinates an agent couples to, sorted.
///
/// Returns an empty set when `position` lies outside the world: such an agent
/// has no environment. When the agent is inside but its shapes are too small to
/// reach any cell, its own cell is returned.
pub fn cell_footprint(
    position: Vec2,
    rotation: f32,
    shapes: &[Shape],
    metrics: &GridMetrics,
    mode: Footprint,
) -> Vec<Coordinate> {
    let Some(center) = metrics.coordinate_of(position) else {
        return Vec::new();
    };

    let mut coords = Vec::new();
    for shape in shapes {
        rasterize_shape(shape, position, rotation, metrics, mode, &mut coords);
    }
    coords.sort_unstable();
    coords.dedup();

    if coords.is_empty() {
        coords.push(center);
    }
    coords
}

/// Every cell whose offset from the centre cell lies inside the ellipse with
/// radii `r` (in grid steps).
fn fill_ellipse(sink: &mut CoordSink<'_>, center: Vec2, r: Vec2) {
    if !(r.x > 0.0 && r.y > 0.0) {
        return;
    }
    let cx = center.x.floor() as i64;
    let cy = center.y.floor() as i64;
    let ext_x = r.x.floor() as i64;
    let ext_y = r.y.floor() as i64;
    // Only offsets landing on the grid
    let (w, h) = (sink.size.width as i64, sink.size.height as i64);
    let dx_range = (-ext_x).max(-cx)..=ext_x.min(w - 1 - cx);
    let dy_range = (-ext_y).max(-cy)..=ext_y.min(h - 1 - cy);

    for dy in dy_range {
        for dx in dx_range.clone() {
            let nx = dx as f32 / r.x;
            let ny = dy as f32 / r.y;
            if nx * nx + ny * ny <= 1.0 {
                sink.put(cx + dx, cy + dy);
            }
        }
    }
}

/// Midpoint ellipse outline (Kennedy's algorithm), plotted in all four
/// quadrants around the centre cell.
fn trace_ellipse(sink: &mut CoordSink<'_>, center: Vec2, r: Vec2) {
    if !(r.x > 0.0 && r.y > 0.0) {
        return;
    }
    let cx = center.x.floor() as i64;
    let cy = center.y.floor() as i64;
    let a = r.x.round() as i64;
    let b = r.y.round() as i64;

    // Sub-cell radius: the outline degenerates to the centre cell.
    if a == 0 || b == 0 {
        sink.put(cx, cy);
        return;
    }

    let mut plot4 = |x: i64, y: i64| {
        sink.put(cx + x, cy + y);
        sink.put(cx - x, cy + y);
        sink.put(cx - x, cy - y);
        sink.put(cx + x, cy - y);
    };

    let a2 = a * a;
    let b2 = b * b;
    let two_a2 = 2 * a2;
    let two_b2 = 2 * b2;

    // Region where the slope is steeper than -1, walking up from (a, 0).
    let (mut x, mut y) = (a, 0);
    let mut change_x = b2 * (1 - 2 * a);
    let mut change_y = a2;
    let mut error = 0;
    let mut stop_x = two_b2 * a;
    let mut stop_y = 0;
    while stop_x >= stop_y {
        plot4(x, y);
        y += 1;
        stop_y += two_a2;
        error += change_y;
        change_y += two_a2;
        if 2 * error + change_x > 0 {
            x -= 1;
            stop_x -= two_b2;
            error += change_x;
            change_x += two_b2;
        }
    }

    // Remaining region, walking right from (0, b).
    let (mut x, mut y) = (0, b);
    let mut change_x = b2;
    let mut change_y = a2 * (1 - 2 * b);
    let mut error = 0;
    let mut stop_x = 0;
    let mut stop_y = two_a2 * b;
    while stop_x <= stop_y {
        plot4(x, y);
        x += 1;
        stop_x += two_b2;
        error += change_x;
        change_x += two_b2;
        if 2 * error + change_y > 0 {
            y -= 1;
            stop_y -= two_a2;
            error += change_y;
            change_y += two_a2;
        }
    }
}

/// Outline (and optionally interior) of a vertex list in grid space.
///
/// Two vertices form a segment; three or more form a closed polygon.
fn polygon(sink: &mut CoordSink<'_>, vertices: &[Vec2], mode: Footprint) {
    match vertices.len() {
        0 => {}
        1 => sink.put(vertices[0].x.floor() as i64, vertices[0].y.floor() as i64),
        2 => line(sink, vertices[0], vertices[1]),
        n => {
            for i in 0..n {
                line(sink, vertices[i], vertices[(i + 1) % n]);
            }
            if mode == Footprint::Solid {
                scanline_fill(sink, vertices);
            }
        }
    }
}

/// Bresenham segment between the cells containing `from` and `to`.
fn line(sink: &mut CoordSink<'_>, from: Vec2, to: Vec2) {
    let (mut x0, mut y0) = (from.x.floor() as i64, from.y.floor() as i64);
    let (x1, y1) = (to.x.floor() as i64, to.y.floor() as i64);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        sink.put(x0, y0);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Even-odd scanline fill sampling cell centres.
fn scanline_fill(sink: &mut CoordSink<'_>, vertices: &[Vec2]) {
    let size = sink.size;
    let (min_y, max_y) = vertices
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));

    let row_start = (min_y.floor() as i64).max(0);
    let row_end = (max_y.ceil() as i64).min(size.height as i64);
    let mut nodes: Vec<f32> = Vec::with_capacity(8);

    for row in row_start..row_end {
        let yc = row as f32 + 0.5;
        nodes.clear();

        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (vi, vj) = (vertices[i], vertices[j]);
            if (vi.y < yc && vj.y >= yc) || (vj.y < yc && vi.y >= yc) {
                nodes.push(vi.x + (yc - vi.y) / (vj.y - vi.y) * (vj.x - vi.x));
            }
            j = i;
        }
        nodes.sort_unstable_by(|a, b| a.total_cmp(b));

        for pair in nodes.chunks_exact(2) {
            let first = ((pair[0] - 0.5).ceil() as i64).max(0);
            let last = ((pair[1] - 0.5).floor() as i64).min(size.width as i64 - 1);
            for col in first..=last {
                sink.put(col, row);
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use crate::vecmath::Vec2;

/// Geometry of an agent or static object, in object-local coordinates.
///
/// Every variant carries an offset from the owning object's position; the
/// offset rotates with the object.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Circle {
        #[serde(default)]
        center: Vec2,
        radius: f32,
    },
    Rectangle {
        #[serde(default)]
        center: Vec2,
        size: Vec2,
    },
    /// Closed polygon (three or more vertices) or a single segment (two).
    Edges {
        vertices: Vec<Vec2>,
    },
}

impl Shape {
    pub fn circle(radius: f32) -> Self {
        Shape::Circle { center: Vec2::zero(), radius }
    }

    pub fn rectangle(size: Vec2) -> Self {
        Shape::Rectangle { center: Vec2::zero(), size }
    }
}

/// Which grid cells of a shape take part in environment coupling.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Footprint {
    /// Only the cells on the shape outline (membrane transport).
    #[default]
    Border,
    /// Every cell covered by the shape.
    Solid,
}

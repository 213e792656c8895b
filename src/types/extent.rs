//! 2D bounding box math

use serde::{Deserialize, Serialize};

/// Axis-aligned 2D bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Minimum corner `[x, y]`
    pub min: [f64; 2],
    /// Maximum corner `[x, y]`
    pub max: [f64; 2],
}

impl Extent {
    /// Create an extent from opposite corners
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Self { min, max }
    }

    /// A degenerate extent covering a single point
    pub fn point(loc: [f64; 2]) -> Self {
        Self {
            min: loc,
            max: loc,
        }
    }

    /// Grow this extent to cover `other`
    pub fn extend(&mut self, other: &Extent) {
        self.min[0] = self.min[0].min(other.min[0]);
        self.min[1] = self.min[1].min(other.min[1]);
        self.max[0] = self.max[0].max(other.max[0]);
        self.max[1] = self.max[1].max(other.max[1]);
    }

    /// `true` if the two extents overlap (boundary contact counts)
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min[0] <= other.max[0]
            && self.max[0] >= other.min[0]
            && self.min[1] <= other.max[1]
            && self.max[1] >= other.min[1]
    }

    /// `true` if `loc` lies inside this extent
    pub fn contains_point(&self, loc: [f64; 2]) -> bool {
        loc[0] >= self.min[0]
            && loc[0] <= self.max[0]
            && loc[1] >= self.min[1]
            && loc[1] <= self.max[1]
    }

    /// Width along the x axis
    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    /// Height along the y axis
    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }
}

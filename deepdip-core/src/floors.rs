//! Floor geometry: maps a cumulative climb height to the floor it lies on.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::constants::{DEFAULT_FLOOR_HEIGHTS, NO_FLOOR};

/// Signed floor index; [`NO_FLOOR`] (`-1`) means "not on any known floor".
pub type FloorIndex = i32;

/// Errors raised when floor thresholds violate the map invariants.
#[derive(Debug, Error, PartialEq)]
pub enum FloorMapError {
    #[error("floor {floor} threshold must be finite (got {value})")]
    NonFinite { floor: u16, value: f64 },
    #[error(
        "floor thresholds must increase with index: floor {floor} at {value:.1} is not above floor {prev_floor} at {prev_value:.1}"
    )]
    NotIncreasing {
        floor: u16,
        value: f64,
        prev_floor: u16,
        prev_value: f64,
    },
}

/// Ordered lookup from floor index to the minimum height of that floor.
///
/// A height `h` is on floor `i` iff thresholds for both `i` and `i + 1`
/// exist and `threshold[i] < h < threshold[i + 1]`. Everything else,
/// including exact threshold hits and gaps left by missing indices, is
/// [`NO_FLOOR`]. The highest defined index therefore only acts as the
/// ceiling of the floor below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u16, f64>", into = "BTreeMap<u16, f64>")]
pub struct FloorMap {
    thresholds: BTreeMap<u16, f64>,
}

impl FloorMap {
    /// Build a floor map from designer-supplied thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if a threshold is not finite or if thresholds do not
    /// strictly increase with floor index.
    pub fn new(thresholds: BTreeMap<u16, f64>) -> Result<Self, FloorMapError> {
        let mut prev: Option<(u16, f64)> = None;
        for (&floor, &value) in &thresholds {
            if !value.is_finite() {
                return Err(FloorMapError::NonFinite { floor, value });
            }
            if let Some((prev_floor, prev_value)) = prev
                && value <= prev_value
            {
                return Err(FloorMapError::NotIncreasing {
                    floor,
                    value,
                    prev_floor,
                    prev_value,
                });
            }
            prev = Some((floor, value));
        }
        Ok(Self { thresholds })
    }

    /// Build a floor map from contiguous thresholds starting at floor 0.
    ///
    /// # Errors
    ///
    /// Same as [`FloorMap::new`].
    pub fn from_heights(heights: &[f64]) -> Result<Self, FloorMapError> {
        let thresholds = heights
            .iter()
            .zip(0_u16..)
            .map(|(&height, floor)| (floor, height))
            .collect();
        Self::new(thresholds)
    }

    /// Classify a height into a floor index, or [`NO_FLOOR`].
    #[must_use]
    pub fn classify(&self, height: f64) -> FloorIndex {
        for (&floor, &lower) in &self.thresholds {
            let Some(next) = floor.checked_add(1) else {
                break;
            };
            let Some(&upper) = self.thresholds.get(&next) else {
                continue;
            };
            if height > lower && height < upper {
                return FloorIndex::from(floor);
            }
        }
        NO_FLOOR
    }

    /// Minimum height of `floor`, if defined.
    #[must_use]
    pub fn threshold(&self, floor: u16) -> Option<f64> {
        self.thresholds.get(&floor).copied()
    }

    /// Number of defined thresholds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Highest floor index that [`FloorMap::classify`] can return.
    #[must_use]
    pub fn top_floor(&self) -> Option<FloorIndex> {
        self.thresholds
            .keys()
            .rev()
            .find(|&&floor| {
                floor
                    .checked_add(1)
                    .is_some_and(|next| self.thresholds.contains_key(&next))
            })
            .map(|&floor| FloorIndex::from(floor))
    }
}

impl Default for FloorMap {
    fn default() -> Self {
        let thresholds = DEFAULT_FLOOR_HEIGHTS
            .iter()
            .zip(0_u16..)
            .map(|(&height, floor)| (floor, height))
            .collect();
        Self { thresholds }
    }
}

impl TryFrom<BTreeMap<u16, f64>> for FloorMap {
    type Error = FloorMapError;

    fn try_from(thresholds: BTreeMap<u16, f64>) -> Result<Self, Self::Error> {
        Self::new(thresholds)
    }
}

impl From<FloorMap> for BTreeMap<u16, f64> {
    fn from(map: FloorMap) -> Self {
        map.thresholds
    }
}

use crate::config::FeatureWeights;
use crate::constants::MAX_FRAGILITY;
use crate::error::{AppError, Result};
use crate::models::{Coordinates, EcosystemType, Location};
use serde::Serialize;
use std::collections::HashMap;

/// Derived, per-location feature vector. All ratios are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineeredFeatures {
    pub location_id: u32,
    /// Inverse mapping of fragility: 1.0 for fragility 1, 0.2 for fragility 5
    pub sustainability: f64,
    /// 1.0 at the reference city, 0.0 for the most remote location
    pub accessibility: f64,
    /// Log-scaled capacity, a proxy for how many people visit
    pub popularity: f64,
    pub relative_capacity: f64,
    pub relative_cost: f64,
    pub composite_attractiveness: f64,
    /// Min-max scaled coordinates, only used for clustering
    pub normalized_lat: f64,
    pub normalized_lng: f64,
    pub fragility: u8,
    pub entry_fee: f64,
    pub ecosystem: EcosystemType,
}

impl EngineeredFeatures {
    /// Vector clustered by k-means: engineered features plus normalized coordinates.
    pub fn clustering_vector(&self) -> [f64; 7] {
        [
            self.sustainability,
            self.accessibility,
            self.composite_attractiveness,
            self.relative_capacity,
            self.relative_cost,
            self.normalized_lat,
            self.normalized_lng,
        ]
    }
}

/// Catalog with its engineered features, indexed by location id.
/// Built once per `load` and then shared read-only.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    locations: Vec<Location>,
    features: Vec<EngineeredFeatures>,
    index: HashMap<u32, usize>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn features(&self) -> &[EngineeredFeatures] {
        &self.features
    }

    pub fn location(&self, id: u32) -> Option<&Location> {
        self.index.get(&id).map(|&i| &self.locations[i])
    }

    pub fn feature(&self, id: u32) -> Option<&EngineeredFeatures> {
        self.index.get(&id).map(|&i| &self.features[i])
    }

    /// Locations paired with their features, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&Location, &EngineeredFeatures)> {
        self.locations.iter().zip(self.features.iter())
    }
}

/// Turns raw catalog records into [`EngineeredFeatures`].
pub struct FeatureEngineer {
    weights: FeatureWeights,
    reference: Coordinates,
}

impl FeatureEngineer {
    pub fn new(weights: FeatureWeights, reference: Coordinates) -> Self {
        Self { weights, reference }
    }

    /// Validate the catalog and derive features for every location.
    /// Pure function of its input; the caller's slice is never modified.
    pub fn compute(&self, catalog: &[Location]) -> Result<FeatureTable> {
        let mut index = HashMap::with_capacity(catalog.len());
        for (i, location) in catalog.iter().enumerate() {
            location.validate().map_err(AppError::Validation)?;
            if index.insert(location.id, i).is_some() {
                return Err(AppError::Validation(format!(
                    "duplicate location id {}",
                    location.id
                )));
            }
        }

        let locations: Vec<Location> = catalog
            .iter()
            .cloned()
            .map(|l| l.with_reference_distance(&self.reference))
            .collect();

        let max_distance = max_of(locations.iter().map(|l| l.distance_to_reference_km));
        let max_capacity = max_of(locations.iter().map(|l| l.daily_capacity as f64));
        let max_fee = max_of(locations.iter().map(|l| l.entry_fee));
        let (min_lat, max_lat) = bounds(locations.iter().map(|l| l.coordinates.lat));
        let (min_lng, max_lng) = bounds(locations.iter().map(|l| l.coordinates.lng));

        let features: Vec<EngineeredFeatures> = locations
            .iter()
            .map(|location| {
                let sustainability = (MAX_FRAGILITY + 1 - location.fragility) as f64
                    / MAX_FRAGILITY as f64;
                let accessibility = if max_distance > 0.0 {
                    1.0 - location.distance_to_reference_km / max_distance
                } else {
                    1.0
                };
                let capacity = location.daily_capacity as f64;
                let popularity = if max_capacity > 0.0 {
                    capacity.ln_1p() / max_capacity.ln_1p()
                } else {
                    0.0
                };
                let relative_capacity = ratio(capacity, max_capacity);
                let relative_cost = ratio(location.entry_fee, max_fee);

                let composite_attractiveness = self.weights.sustainability * sustainability
                    + self.weights.capacity * relative_capacity
                    + self.weights.popularity * popularity
                    + self.weights.accessibility * accessibility
                    + self.weights.cost * (1.0 - relative_cost);

                EngineeredFeatures {
                    location_id: location.id,
                    sustainability,
                    accessibility,
                    popularity,
                    relative_capacity,
                    relative_cost,
                    composite_attractiveness,
                    normalized_lat: min_max(location.coordinates.lat, min_lat, max_lat),
                    normalized_lng: min_max(location.coordinates.lng, min_lng, max_lng),
                    fragility: location.fragility,
                    entry_fee: location.entry_fee,
                    ecosystem: location.ecosystem,
                }
            })
            .collect();

        tracing::debug!(count = features.len(), "Engineered location features");

        Ok(FeatureTable {
            locations,
            features,
            index,
        })
    }
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        value / max
    } else {
        0.0
    }
}

fn min_max(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        (value - min) / (max - min)
    } else {
        0.5
    }
}

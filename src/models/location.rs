use crate::constants::{MAX_FRAGILITY, MIN_FRAGILITY};
use crate::models::Coordinates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EcosystemType {
    Savanna,
    Forest,
    Desert,
    Coastal,
    Mountain,
    Wetland,
    River,
    Marine,
}

impl EcosystemType {
    pub const ALL: [EcosystemType; 8] = [
        EcosystemType::Savanna,
        EcosystemType::Forest,
        EcosystemType::Desert,
        EcosystemType::Coastal,
        EcosystemType::Mountain,
        EcosystemType::Wetland,
        EcosystemType::River,
        EcosystemType::Marine,
    ];

    /// Stable ordinal used as a model feature.
    pub fn code(&self) -> usize {
        *self as usize
    }

    /// How strongly the ecosystem appeals to adventure-seeking travellers (0-1)
    pub fn adventure_affinity(&self) -> f64 {
        match self {
            EcosystemType::Forest => 0.9,
            EcosystemType::Mountain => 1.0,
            EcosystemType::Desert => 0.8,
            EcosystemType::River => 0.7,
            EcosystemType::Marine => 0.6,
            EcosystemType::Savanna => 0.5,
            EcosystemType::Wetland => 0.4,
            EcosystemType::Coastal => 0.3,
        }
    }

    /// How strongly the ecosystem appeals to culture-oriented travellers (0-1)
    pub fn culture_affinity(&self) -> f64 {
        match self {
            EcosystemType::Savanna => 0.8,
            EcosystemType::Coastal => 0.9,
            EcosystemType::River => 0.6,
            EcosystemType::Wetland => 0.4,
            EcosystemType::Forest => 0.4,
            EcosystemType::Mountain => 0.3,
            EcosystemType::Desert => 0.5,
            EcosystemType::Marine => 0.2,
        }
    }
}

impl fmt::Display for EcosystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EcosystemType::Savanna => "savanna",
            EcosystemType::Forest => "forest",
            EcosystemType::Desert => "desert",
            EcosystemType::Coastal => "coastal",
            EcosystemType::Mountain => "mountain",
            EcosystemType::Wetland => "wetland",
            EcosystemType::River => "river",
            EcosystemType::Marine => "marine",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EcosystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "savanna" | "savana" => Ok(EcosystemType::Savanna),
            "forest" | "floresta" => Ok(EcosystemType::Forest),
            "desert" | "deserto" => Ok(EcosystemType::Desert),
            "coastal" | "costeiro" | "litoral" => Ok(EcosystemType::Coastal),
            "mountain" | "montanha" | "montanhoso" => Ok(EcosystemType::Mountain),
            "wetland" | "pantano" | "zona_humida" => Ok(EcosystemType::Wetland),
            "river" | "rio" | "fluvial" => Ok(EcosystemType::River),
            "marine" | "marinho" => Ok(EcosystemType::Marine),
            _ => Err(format!("Invalid ecosystem type: {}", s)),
        }
    }
}

/// A catalog entry. Immutable once the catalog is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: u32,
    pub name: String,
    pub province: String,
    pub coordinates: Coordinates,
    /// Ecological fragility from 1 (robust) to 5 (very fragile)
    pub fragility: u8,
    /// Visitors the site can absorb per day. Signed so that corrupt records
    /// can be reported rather than silently wrapped.
    pub daily_capacity: i64,
    /// Entry fee in local currency units
    pub entry_fee: f64,
    pub ecosystem: EcosystemType,
    #[serde(default)]
    pub description: String,
    /// Great-circle distance to the reference city, filled in on load
    #[serde(default)]
    pub distance_to_reference_km: f64,
}

impl Location {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        province: impl Into<String>,
        coordinates: Coordinates,
        fragility: u8,
        daily_capacity: i64,
        entry_fee: f64,
        ecosystem: EcosystemType,
    ) -> Self {
        Location {
            id,
            name: name.into(),
            province: province.into(),
            coordinates,
            fragility,
            daily_capacity,
            entry_fee,
            ecosystem,
            description: String::new(),
            distance_to_reference_km: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Copy of this location with the reference distance computed from `reference`.
    pub fn with_reference_distance(mut self, reference: &Coordinates) -> Self {
        self.distance_to_reference_km = self.coordinates.distance_to(reference);
        self
    }

    /// Check the record against the catalog invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_FRAGILITY..=MAX_FRAGILITY).contains(&self.fragility) {
            return Err(format!(
                "location {} ({}): fragility {} outside {}-{}",
                self.id, self.name, self.fragility, MIN_FRAGILITY, MAX_FRAGILITY
            ));
        }
        if self.daily_capacity < 0 {
            return Err(format!(
                "location {} ({}): negative daily capacity {}",
                self.id, self.name, self.daily_capacity
            ));
        }
        if !self.entry_fee.is_finite() || self.entry_fee < 0.0 {
            return Err(format!(
                "location {} ({}): invalid entry fee {}",
                self.id, self.name, self.entry_fee
            ));
        }
        if !self.coordinates.is_valid() {
            return Err(format!(
                "location {} ({}): missing or invalid coordinates ({}, {})",
                self.id, self.name, self.coordinates.lat, self.coordinates.lng
            ));
        }
        if self.name.trim().is_empty() {
            return Err(format!("location {}: empty name", self.id));
        }
        Ok(())
    }
}

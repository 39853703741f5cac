use crate::models::{EcosystemType, Location};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of a loaded catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStatistics {
    pub location_count: usize,
    pub province_count: usize,
    pub ecosystem_count: usize,
    pub mean_fragility: f64,
    pub mean_entry_fee: f64,
    pub mean_daily_capacity: f64,
    pub min_entry_fee: f64,
    pub max_entry_fee: f64,
    pub by_fragility: BTreeMap<u8, usize>,
    pub by_province: BTreeMap<String, usize>,
    pub by_ecosystem: BTreeMap<EcosystemType, usize>,
}

impl CatalogStatistics {
    pub fn compute(locations: &[Location]) -> Self {
        let count = locations.len();
        let denominator = count.max(1) as f64;

        let mut by_fragility = BTreeMap::new();
        let mut by_province = BTreeMap::new();
        let mut by_ecosystem = BTreeMap::new();
        for location in locations {
            *by_fragility.entry(location.fragility).or_insert(0) += 1;
            *by_province.entry(location.province.clone()).or_insert(0) += 1;
            *by_ecosystem.entry(location.ecosystem).or_insert(0) += 1;
        }

        let fees = locations.iter().map(|l| l.entry_fee);
        let (min_entry_fee, max_entry_fee) = if count == 0 {
            (0.0, 0.0)
        } else {
            fees.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), fee| {
                (lo.min(fee), hi.max(fee))
            })
        };

        CatalogStatistics {
            location_count: count,
            province_count: by_province.len(),
            ecosystem_count: by_ecosystem.len(),
            mean_fragility: locations.iter().map(|l| l.fragility as f64).sum::<f64>()
                / denominator,
            mean_entry_fee: locations.iter().map(|l| l.entry_fee).sum::<f64>() / denominator,
            mean_daily_capacity: locations
                .iter()
                .map(|l| l.daily_capacity as f64)
                .sum::<f64>()
                / denominator,
            min_entry_fee,
            max_entry_fee,
            by_fragility,
            by_province,
            by_ecosystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    fn location(id: u32, province: &str, fragility: u8, fee: f64, eco: EcosystemType) -> Location {
        Location::new(
            id,
            format!("Site {}", id),
            province,
            Coordinates::new(-10.0, 14.0).unwrap(),
            fragility,
            100 * id as i64,
            fee,
            eco,
        )
    }

    #[test]
    fn test_statistics() {
        let stats = CatalogStatistics::compute(&[
            location(1, "Luanda", 2, 1_000.0, EcosystemType::Coastal),
            location(2, "Luanda", 4, 3_000.0, EcosystemType::Savanna),
            location(3, "Namibe", 3, 5_000.0, EcosystemType::Desert),
        ]);

        assert_eq!(stats.location_count, 3);
        assert_eq!(stats.province_count, 2);
        assert_eq!(stats.ecosystem_count, 3);
        assert_eq!(stats.mean_fragility, 3.0);
        assert_eq!(stats.mean_entry_fee, 3_000.0);
        assert_eq!(stats.mean_daily_capacity, 200.0);
        assert_eq!(stats.min_entry_fee, 1_000.0);
        assert_eq!(stats.max_entry_fee, 5_000.0);
        assert_eq!(stats.by_province["Luanda"], 2);
        assert_eq!(stats.by_fragility[&3], 1);
        assert_eq!(stats.by_ecosystem[&EcosystemType::Desert], 1);
    }

    #[test]
    fn test_statistics_serialize_with_string_keys() {
        let stats = CatalogStatistics::compute(&[location(
            1,
            "Benguela",
            1,
            0.0,
            EcosystemType::Marine,
        )]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_ecosystem"]["marine"], 1);
        assert_eq!(json["by_fragility"]["1"], 1);
    }

    #[test]
    fn test_empty_catalog() {
        let stats = CatalogStatistics::compute(&[]);
        assert_eq!(stats.location_count, 0);
        assert_eq!(stats.mean_fragility, 0.0);
        assert_eq!(stats.max_entry_fee, 0.0);
    }
}

use crate::config::ClusteringConfig;
use crate::constants::MIN_LOCATIONS_PER_CLUSTER;
use crate::error::{AppError, Result};
use crate::models::EcosystemType;
use crate::services::features::FeatureTable;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Descriptive view of one cluster, for reports and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub mean_fragility: f64,
    pub mean_entry_fee: f64,
    pub provinces: Vec<String>,
    pub ecosystems: Vec<EcosystemType>,
    pub location_names: Vec<String>,
}

/// Location id to cluster id, plus centroids in clustering-feature space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub k: usize,
    pub assignments: BTreeMap<u32, usize>,
    pub centroids: Vec<Vec<f64>>,
    pub summaries: Vec<ClusterSummary>,
}

impl ClusterAssignment {
    pub fn cluster_of(&self, location_id: u32) -> Option<usize> {
        self.assignments.get(&location_id).copied()
    }

    /// Ids of all locations in `cluster`, ascending.
    pub fn members(&self, cluster: usize) -> Vec<u32> {
        self.assignments
            .iter()
            .filter(|&(_, &c)| c == cluster)
            .map(|(&id, _)| id)
            .collect()
    }
}

/// Seeded k-means over engineered features and normalized coordinates.
pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl ClusteringEngine {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Number of clusters used for a catalog of `n` locations: the configured
    /// count, reduced so that clusters hold two locations on average.
    pub fn effective_k(&self, n: usize) -> usize {
        self.config
            .cluster_count
            .min((n / MIN_LOCATIONS_PER_CLUSTER).max(1))
    }

    /// Fit `k` clusters. Identical input and seed always yield an identical
    /// assignment.
    pub fn fit(&self, table: &FeatureTable, k: usize) -> Result<ClusterAssignment> {
        if k == 0 {
            return Err(AppError::Validation(
                "cluster count must be at least 1".to_string(),
            ));
        }
        if table.len() < k {
            return Err(AppError::InsufficientData(format!(
                "{} locations cannot form {} clusters",
                table.len(),
                k
            )));
        }

        let rows: Vec<f64> = table
            .features()
            .iter()
            .flat_map(|f| f.clustering_vector())
            .collect();
        let width = rows.len() / table.len();
        let records = Array2::from_shape_vec((table.len(), width), rows)
            .map_err(|e| AppError::Clustering(e.to_string()))?;
        let dataset = DatasetBase::from(records.clone());

        let rng = StdRng::seed_from_u64(self.config.seed);
        let model = KMeans::params_with_rng(k, rng)
            .n_runs(self.config.runs.max(1))
            .max_n_iterations(self.config.max_iterations)
            .tolerance(self.config.tolerance)
            .fit(&dataset)
            .map_err(|e| AppError::Clustering(e.to_string()))?;

        let labels = model.predict(&records);

        let assignments: BTreeMap<u32, usize> = table
            .features()
            .iter()
            .zip(labels.iter())
            .map(|(f, &cluster)| (f.location_id, cluster))
            .collect();

        let centroids: Vec<Vec<f64>> = model
            .centroids()
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();

        let summaries = summarize(table, &assignments, k);

        tracing::info!(
            k = k,
            locations = table.len(),
            seed = self.config.seed,
            "Clustered catalog"
        );
        for summary in &summaries {
            tracing::debug!(
                cluster = summary.cluster_id,
                size = summary.size,
                mean_fragility = summary.mean_fragility,
                "Cluster summary"
            );
        }

        Ok(ClusterAssignment {
            k,
            assignments,
            centroids,
            summaries,
        })
    }
}

fn summarize(
    table: &FeatureTable,
    assignments: &BTreeMap<u32, usize>,
    k: usize,
) -> Vec<ClusterSummary> {
    (0..k)
        .map(|cluster_id| {
            let members: Vec<_> = table
                .locations()
                .iter()
                .filter(|l| assignments.get(&l.id) == Some(&cluster_id))
                .collect();
            let size = members.len();
            let denominator = size.max(1) as f64;

            ClusterSummary {
                cluster_id,
                size,
                mean_fragility: members.iter().map(|l| l.fragility as f64).sum::<f64>()
                    / denominator,
                mean_entry_fee: members.iter().map(|l| l.entry_fee).sum::<f64>() / denominator,
                provinces: members
                    .iter()
                    .map(|l| l.province.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                ecosystems: members
                    .iter()
                    .map(|l| l.ecosystem)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                location_names: members.iter().map(|l| l.name.clone()).collect(),
            }
        })
        .collect()
}

use crate::config::MlConfig;
use crate::ml::synthetic::SyntheticCorpus;
use crate::models::UserProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub user_id: u32,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedUser {
    user_id: u32,
    vector: [f64; 5],
    /// (location id, rating) pairs at or above the high-rating threshold
    liked: Vec<(u32, f64)>,
}

/// Nearest-neighbor index over synthetic users. An empty corpus yields an
/// empty index whose queries return nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeFilter {
    users: Vec<IndexedUser>,
    /// Number of high ratings each location received across the corpus
    popularity: HashMap<u32, usize>,
    neighbors: usize,
    limit: usize,
}

impl CollaborativeFilter {
    pub fn build(corpus: &SyntheticCorpus, config: &MlConfig) -> Self {
        let mut popularity: HashMap<u32, usize> = HashMap::new();
        let users: Vec<IndexedUser> = corpus
            .users
            .iter()
            .map(|user| {
                let liked: Vec<(u32, f64)> = user
                    .interactions
                    .iter()
                    .filter(|i| i.rating >= config.high_rating_threshold)
                    .map(|i| (i.location_id, i.rating))
                    .collect();
                for (location_id, _) in &liked {
                    *popularity.entry(*location_id).or_insert(0) += 1;
                }
                IndexedUser {
                    user_id: user.user_id,
                    vector: user.profile.normalized_vector(),
                    liked,
                }
            })
            .collect();

        tracing::debug!(
            users = users.len(),
            liked_locations = popularity.len(),
            "Built collaborative index"
        );

        Self {
            users,
            popularity,
            neighbors: config.neighbors,
            limit: config.recommendations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The `k` synthetic users most similar to `profile`, most similar first.
    /// Equal similarities are ordered by user id.
    pub fn neighbors(&self, profile: &UserProfile, k: usize) -> Vec<Neighbor> {
        let query = profile.normalized_vector();
        let mut scored: Vec<Neighbor> = self
            .users
            .iter()
            .map(|u| Neighbor {
                user_id: u.user_id,
                similarity: cosine_similarity(&query, &u.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.user_id.cmp(&b.user_id))
        });
        scored.truncate(k);
        scored
    }

    /// Location ids liked by the nearest neighbors, best first. A location's
    /// strength is the highest rating any neighbor gave it; ties go to the
    /// location with more high ratings corpus-wide, then to the lower id.
    pub fn recommend(&self, profile: &UserProfile) -> Vec<u32> {
        let neighbors = self.neighbors(profile, self.neighbors);
        let by_id: HashMap<u32, &IndexedUser> =
            self.users.iter().map(|u| (u.user_id, u)).collect();

        let mut best: HashMap<u32, f64> = HashMap::new();
        for neighbor in &neighbors {
            let Some(user) = by_id.get(&neighbor.user_id) else {
                continue;
            };
            for &(location_id, rating) in &user.liked {
                let entry = best.entry(location_id).or_insert(rating);
                if rating > *entry {
                    *entry = rating;
                }
            }
        }

        let mut ranked: Vec<(u32, f64)> = best.into_iter().collect();
        ranked.sort_by(|(id_a, ra), (id_b, rb)| {
            rb.total_cmp(ra)
                .then_with(|| self.popularity_of(*id_b).cmp(&self.popularity_of(*id_a)))
                .then(id_a.cmp(id_b))
        });
        ranked.truncate(self.limit);
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    fn popularity_of(&self, location_id: u32) -> usize {
        self.popularity.get(&location_id).copied().unwrap_or(0)
    }
}

/// Cosine of the angle between two vectors; 0 when either is all zeros.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

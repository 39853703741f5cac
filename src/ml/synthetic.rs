use crate::config::MlConfig;
use crate::constants::*;
use crate::error::{AppError, Result};
use crate::models::UserProfile;
use crate::services::features::{EngineeredFeatures, FeatureTable};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use rand_distr::{Beta, Distribution, Normal};
use serde::Serialize;

/// Standard deviation of the noise added to every synthetic rating.
const RATING_NOISE_STD: f64 = 0.2;
/// A location whose fee exceeds this share of the budget feels expensive.
const EXPENSIVE_FEE_SHARE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub location_id: u32,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticUser {
    pub user_id: u32,
    pub profile: UserProfile,
    pub interactions: Vec<Interaction>,
}

/// Generated training corpus. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyntheticCorpus {
    pub users: Vec<SyntheticUser>,
}

impl SyntheticCorpus {
    /// Generate `size` users, each rating a random subset of the catalog.
    /// The same table, size and seed always produce the same corpus.
    pub fn generate(
        table: &FeatureTable,
        size: usize,
        config: &MlConfig,
        seed: u64,
    ) -> Result<Self> {
        if table.is_empty() {
            return Err(AppError::InsufficientData(
                "cannot generate interactions for an empty catalog".to_string(),
            ));
        }

        let preference = Beta::new(2.0, 2.0).map_err(|e| AppError::Internal(e.to_string()))?;
        let noise = Normal::new(0.0, RATING_NOISE_STD)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(seed);

        let features = table.features();
        let min_visits = config.min_visits_per_user.max(1).min(features.len());
        let max_visits = config.max_visits_per_user.max(min_visits).min(features.len());

        let users: Vec<SyntheticUser> = (0..size)
            .map(|user_id| {
                let profile = UserProfile {
                    age: rng.gen_range(MIN_PROFILE_AGE..=SYNTHETIC_MAX_AGE),
                    max_budget: rng
                        .gen_range(SYNTHETIC_MIN_BUDGET..=SYNTHETIC_MAX_BUDGET)
                        .round(),
                    sustainability: preference.sample(&mut rng),
                    adventure: preference.sample(&mut rng),
                    culture: preference.sample(&mut rng),
                };

                let visits = rng.gen_range(min_visits..=max_visits);
                let mut visited = index::sample(&mut rng, features.len(), visits).into_vec();
                visited.sort_unstable();

                let interactions = visited
                    .into_iter()
                    .map(|i| {
                        let f = &features[i];
                        Interaction {
                            location_id: f.location_id,
                            rating: synthetic_rating(&profile, f, noise.sample(&mut rng)),
                        }
                    })
                    .collect();

                SyntheticUser {
                    user_id: user_id as u32,
                    profile,
                    interactions,
                }
            })
            .collect();

        let corpus = SyntheticCorpus { users };
        tracing::info!(
            users = corpus.users.len(),
            interactions = corpus.interaction_count(),
            seed = seed,
            "Generated synthetic corpus"
        );
        Ok(corpus)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn interaction_count(&self) -> usize {
        self.users.iter().map(|u| u.interactions.len()).sum()
    }

    /// Every (profile, location id, rating) triple in user order.
    pub fn interactions(&self) -> impl Iterator<Item = (&UserProfile, u32, f64)> {
        self.users.iter().flat_map(|u| {
            u.interactions
                .iter()
                .map(move |i| (&u.profile, i.location_id, i.rating))
        })
    }
}

/// Ground-truth taste model behind the corpus: travellers who value
/// sustainability favour robust sites, adventurers favour wild ecosystems,
/// culture seekers favour inhabited landscapes, and a fee above 30% of the
/// budget costs 0.6 stars. Clamped to the rating scale.
pub fn synthetic_rating(profile: &UserProfile, features: &EngineeredFeatures, noise: f64) -> f64 {
    let age_factor = (profile.age.saturating_sub(MIN_PROFILE_AGE)) as f64
        / (MAX_PROFILE_AGE - MIN_PROFILE_AGE) as f64;

    let mut rating = 2.4
        + 1.6 * profile.sustainability * features.sustainability
        + 1.2 * profile.adventure * features.ecosystem.adventure_affinity()
        + 1.0 * profile.culture * features.ecosystem.culture_affinity()
        + 0.4 * features.accessibility * age_factor;

    if features.entry_fee > profile.max_budget * EXPENSIVE_FEE_SHARE {
        rating -= 0.6;
    }

    (rating + noise).clamp(MIN_RATING, MAX_RATING)
}

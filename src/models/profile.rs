use crate::constants::{MAX_PROFILE_AGE, MIN_PROFILE_AGE, PROFILE_BUDGET_NORMALISER};
use serde::{Deserialize, Serialize};

/// Traveller profile supplied with a personalization request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub age: u32,
    pub max_budget: f64,
    /// Preference weights in [0, 1]
    pub sustainability: f64,
    pub adventure: f64,
    pub culture: f64,
}

impl UserProfile {
    pub fn new(
        age: u32,
        max_budget: f64,
        sustainability: f64,
        adventure: f64,
        culture: f64,
    ) -> Self {
        UserProfile {
            age,
            max_budget,
            sustainability,
            adventure,
            culture,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_PROFILE_AGE..=MAX_PROFILE_AGE).contains(&self.age) {
            return Err(format!(
                "age must be between {} and {} (got {})",
                MIN_PROFILE_AGE, MAX_PROFILE_AGE, self.age
            ));
        }
        if !self.max_budget.is_finite() || self.max_budget <= 0.0 {
            return Err(format!("max_budget must be positive (got {})", self.max_budget));
        }
        for (name, value) in [
            ("sustainability", self.sustainability),
            ("adventure", self.adventure),
            ("culture", self.culture),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} preference must be in [0, 1] (got {})", name, value));
            }
        }
        Ok(())
    }

    /// Numeric vector used for similarity: age and budget scaled to roughly
    /// [0, 1], preference weights as-is.
    pub fn normalized_vector(&self) -> [f64; 5] {
        let age_span = (MAX_PROFILE_AGE - MIN_PROFILE_AGE) as f64;
        let age = (self.age.saturating_sub(MIN_PROFILE_AGE) as f64 / age_span).clamp(0.0, 1.0);
        let budget = (self.max_budget / PROFILE_BUDGET_NORMALISER).clamp(0.0, 1.0);
        [age, budget, self.sustainability, self.adventure, self.culture]
    }
}

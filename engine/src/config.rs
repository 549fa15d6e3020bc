/// Engine tunables. Defaults are the published behavior; deployments override
/// individual knobs through the api binary's environment, never per request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Secondary domains below this confidence are dropped.
    pub secondary_floor: f64,
    /// Secondary domain list cap.
    pub secondary_cap: usize,
    /// Domains within this distance of the top confidence compete on priority.
    pub tie_window: f64,
    /// Candidates below this confidence become missing-info instead of factors.
    pub factor_commit_floor: f64,
    /// Clarifying questions allowed per user per UTC day.
    pub daily_follow_up_cap: u8,
    /// Ranked constraint list cap (top-K).
    pub top_constraints_k: usize,
    /// Mean factor confidence below this forces the uncertainty band high.
    pub uncertainty_high_below: f64,
    /// Mean factor confidence below this keeps the uncertainty band moderate.
    pub uncertainty_moderate_below: f64,
    /// what_matters highlight cap.
    pub what_matters_cap: usize,
    /// Action chip budget per response.
    pub chip_budget: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secondary_floor: 0.3,
            secondary_cap: 3,
            tie_window: 0.05,
            factor_commit_floor: 0.35,
            daily_follow_up_cap: 2,
            top_constraints_k: 5,
            uncertainty_high_below: 0.45,
            uncertainty_moderate_below: 0.65,
            what_matters_cap: 3,
            chip_budget: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn defaults_match_published_behavior() {
        let config = EngineConfig::default();
        assert_eq!(config.daily_follow_up_cap, 2);
        assert_eq!(config.top_constraints_k, 5);
        assert_eq!(config.chip_budget, 3);
        assert_eq!(config.what_matters_cap, 3);
        assert!(config.factor_commit_floor > config.secondary_floor);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domains::Domain;
use crate::factors::{Factor, FactorCode, Modifiability};

/// One ranked entry in the profile's top constraints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RankedConstraint {
    pub code: FactorCode,
    pub domain: Domain,
    pub confidence: f64,
    pub modifiability: Modifiability,
    /// `confidence × domain_priority_weight × modifiability_weight`
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Acute/chronic coverage counters for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DomainCoverage {
    pub domain: Domain,
    pub acute: u32,
    pub chronic: u32,
}

/// The aggregated picture of a user's situation, derived from the factor log.
///
/// A rebuildable read model, never independently authored: replaying the
/// factor log must reproduce it exactly. Old factors are retained in the log
/// for audit; this index only repoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComplexityProfile {
    pub user_id: Uuid,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency stamp; bumped on every fold.
    pub version: i64,
    /// Last entry whose pipeline result was applied. Classification results
    /// for older entries are discarded (last-submission-wins).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_accepted_entry_id: Option<Uuid>,
    /// Most-recent factor per code, sorted by code for stable output.
    pub active_factors: Vec<Factor>,
    /// Top-K active factors ranked by constraint score, descending.
    pub top_constraints: Vec<RankedConstraint>,
    /// Per-domain acute/chronic counters. Only domains with counts appear.
    pub coverage: Vec<DomainCoverage>,
    /// IDs of every factor ever folded, in fold order. Makes re-folds
    /// idempotent and records exactly what this read model has absorbed.
    pub folded_factor_ids: Vec<Uuid>,
}

impl ComplexityProfile {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            updated_at: now,
            version: 0,
            latest_accepted_entry_id: None,
            active_factors: Vec::new(),
            top_constraints: Vec::new(),
            coverage: Vec::new(),
            folded_factor_ids: Vec::new(),
        }
    }

    pub fn active_factor(&self, code: FactorCode) -> Option<&Factor> {
        self.active_factors.iter().find(|f| f.code == code)
    }

    pub fn has_folded(&self, factor_id: Uuid) -> bool {
        self.folded_factor_ids.contains(&factor_id)
    }

    /// Domains currently represented by at least one active factor.
    pub fn active_domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self.active_factors.iter().map(|f| f.domain).collect();
        domains.sort();
        domains.dedup();
        domains
    }

    pub fn coverage_for(&self, domain: Domain) -> Option<&DomainCoverage> {
        self.coverage.iter().find(|c| c.domain == domain)
    }
}

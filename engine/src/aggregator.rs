use chrono::{DateTime, Utc};
use uuid::Uuid;

use compass_core::factors::{Factor, Modifiability, TimeHorizon};
use compass_core::profile::{ComplexityProfile, DomainCoverage, RankedConstraint};

use crate::config::EngineConfig;

/// Fold newly committed factors into a profile.
///
/// The factor log itself is insert-only and lives with the caller; this folds
/// the derived read model: repoints the latest-by-code index, bumps coverage
/// counters, and re-ranks the top constraints. Factors already folded (same
/// id) are skipped, so replays and retried submissions cannot double-count.
pub fn fold(
    profile: &mut ComplexityProfile,
    factors: &[Factor],
    accepted_entry_id: Uuid,
    now: DateTime<Utc>,
    config: &EngineConfig,
) {
    for factor in factors {
        if profile.has_folded(factor.id) {
            tracing::debug!(factor_id = %factor.id, "skipping already-folded factor");
            continue;
        }
        profile.folded_factor_ids.push(factor.id);

        match factor.time_horizon {
            TimeHorizon::Acute => bump_coverage(profile, factor, true),
            TimeHorizon::Chronic | TimeHorizon::LifeCourse => bump_coverage(profile, factor, false),
            TimeHorizon::Unknown => {}
        }

        // Repoint the latest-by-code index. The superseded record stays in
        // the caller's log untouched.
        match profile
            .active_factors
            .iter_mut()
            .find(|f| f.code == factor.code)
        {
            Some(existing) => {
                if factor.created_at >= existing.created_at {
                    *existing = factor.clone();
                }
            }
            None => profile.active_factors.push(factor.clone()),
        }
    }

    profile.active_factors.sort_by_key(|f| f.code);
    profile.top_constraints = rank_constraints(&profile.active_factors, config.top_constraints_k);
    profile.latest_accepted_entry_id = Some(accepted_entry_id);
    profile.updated_at = now;
    profile.version += 1;
}

/// Replay a full factor log into a fresh profile. Produces the same derived
/// state as incremental folding in log order.
pub fn rebuild(
    user_id: Uuid,
    log: &[Factor],
    latest_accepted_entry_id: Option<Uuid>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> ComplexityProfile {
    let mut ordered: Vec<&Factor> = log.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut profile = ComplexityProfile::new(user_id, now);
    for factor in ordered {
        fold(
            &mut profile,
            std::slice::from_ref(factor),
            factor.source_entry_id,
            now,
            config,
        );
    }
    profile.latest_accepted_entry_id = latest_accepted_entry_id;
    profile
}

/// Derived-state equality, ignoring version and timestamps. Used to verify a
/// replayed profile against the incrementally maintained one.
pub fn same_derived_state(a: &ComplexityProfile, b: &ComplexityProfile) -> bool {
    let factors_match = a.active_factors.len() == b.active_factors.len()
        && a.active_factors
            .iter()
            .zip(&b.active_factors)
            .all(|(x, y)| x.id == y.id && x.code == y.code);
    let constraints_match = a.top_constraints.len() == b.top_constraints.len()
        && a.top_constraints
            .iter()
            .zip(&b.top_constraints)
            .all(|(x, y)| x.code == y.code);
    factors_match && constraints_match && coverage_sorted(a) == coverage_sorted(b)
}

fn coverage_sorted(profile: &ComplexityProfile) -> Vec<DomainCoverage> {
    let mut coverage = profile.coverage.clone();
    coverage.sort_by_key(|c| c.domain);
    coverage
}

fn bump_coverage(profile: &mut ComplexityProfile, factor: &Factor, acute: bool) {
    if !profile.coverage.iter().any(|c| c.domain == factor.domain) {
        profile.coverage.push(DomainCoverage {
            domain: factor.domain,
            acute: 0,
            chronic: 0,
        });
        profile.coverage.sort_by_key(|c| c.domain);
    }
    if let Some(entry) = profile.coverage.iter_mut().find(|c| c.domain == factor.domain) {
        if acute {
            entry.acute += 1;
        } else {
            entry.chronic += 1;
        }
    }
}

/// Rank active factors by `confidence × domain_priority_weight ×
/// modifiability_weight`, descending, ties broken by most recent `created_at`.
/// Low modifiability weighs up: persistent constraints are the ones worth
/// surfacing.
pub fn rank_constraints(active: &[Factor], k: usize) -> Vec<RankedConstraint> {
    let mut ranked: Vec<RankedConstraint> = active
        .iter()
        .map(|factor| RankedConstraint {
            code: factor.code,
            domain: factor.domain,
            confidence: factor.confidence,
            modifiability: factor.modifiability,
            score: constraint_score(factor),
            created_at: factor.created_at,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    ranked.truncate(k);
    ranked
}

pub fn constraint_score(factor: &Factor) -> f64 {
    factor.confidence * domain_priority_weight(factor) * modifiability_weight(factor.modifiability)
}

fn domain_priority_weight(factor: &Factor) -> f64 {
    1.0 + (13 - factor.domain.priority()) as f64 * 0.05
}

fn modifiability_weight(modifiability: Modifiability) -> f64 {
    match modifiability {
        Modifiability::Low => 1.3,
        Modifiability::Medium => 1.15,
        Modifiability::High | Modifiability::Unknown => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::domains::Domain;
    use compass_core::factors::{FactorCode, FactorKind, FactorValue};

    fn factor(code: FactorCode, confidence: f64, at: DateTime<Utc>) -> Factor {
        Factor {
            id: Uuid::now_v7(),
            domain: code.domain(),
            kind: code.allowed_kinds()[0],
            code,
            value: FactorValue::Bool(true),
            confidence,
            time_horizon: code.default_time_horizon(),
            modifiability: code.default_modifiability(),
            source_entry_id: Uuid::now_v7(),
            created_at: at,
        }
    }

    #[test]
    fn fold_appends_and_repoints_latest_by_code() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut profile = ComplexityProfile::new(Uuid::now_v7(), now);

        let old = factor(FactorCode::LowEnergy, 0.5, now);
        let newer = factor(FactorCode::LowEnergy, 0.8, now + chrono::Duration::hours(1));

        fold(&mut profile, &[old.clone()], Uuid::now_v7(), now, &config);
        fold(&mut profile, &[newer.clone()], Uuid::now_v7(), now, &config);

        assert_eq!(profile.active_factors.len(), 1);
        assert_eq!(profile.active_factor(FactorCode::LowEnergy).unwrap().id, newer.id);
        // Both folds are remembered even though only one factor is active
        assert_eq!(profile.folded_factor_ids.len(), 2);
        assert_eq!(profile.version, 2);
    }

    #[test]
    fn refolding_same_factor_id_does_not_double_count_coverage() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut profile = ComplexityProfile::new(Uuid::now_v7(), now);

        let f = factor(FactorCode::LowEnergy, 0.6, now);
        fold(&mut profile, &[f.clone()], Uuid::now_v7(), now, &config);
        fold(&mut profile, &[f.clone()], Uuid::now_v7(), now, &config);

        let coverage = profile.coverage_for(Domain::CapacityEnergy).unwrap();
        assert_eq!(coverage.acute, 1);
        assert_eq!(coverage.chronic, 0);
        assert_eq!(profile.folded_factor_ids.len(), 1);
    }

    #[test]
    fn life_course_counts_as_chronic_and_unknown_is_excluded() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut profile = ComplexityProfile::new(Uuid::now_v7(), now);

        // chronic_condition defaults to life_course
        fold(
            &mut profile,
            &[factor(FactorCode::ChronicCondition, 0.7, now)],
            Uuid::now_v7(),
            now,
            &config,
        );
        let medical = profile.coverage_for(Domain::MedicalContext).unwrap();
        assert_eq!(medical.chronic, 1);
        assert_eq!(medical.acute, 0);

        // unclassified_note defaults to unknown horizon: no counter moves
        fold(
            &mut profile,
            &[factor(FactorCode::UnclassifiedNote, 0.5, now)],
            Uuid::now_v7(),
            now,
            &config,
        );
        assert!(profile.coverage_for(Domain::UnknownOther).is_none());
    }

    #[test]
    fn top_constraints_are_capped_sorted_and_tie_broken_by_recency() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let mut profile = ComplexityProfile::new(Uuid::now_v7(), now);

        let codes = [
            FactorCode::RecurringSymptom,
            FactorCode::ChronicCondition,
            FactorCode::LowMood,
            FactorCode::LowEnergy,
            FactorCode::CostBarrier,
            FactorCode::FinancialStrain,
            FactorCode::SocialIsolation,
        ];
        for (i, code) in codes.into_iter().enumerate() {
            fold(
                &mut profile,
                &[factor(code, 0.6, now + chrono::Duration::minutes(i as i64))],
                Uuid::now_v7(),
                now,
                &config,
            );
        }

        assert_eq!(profile.top_constraints.len(), config.top_constraints_k);
        for pair in profile.top_constraints.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn low_modifiability_outranks_high_at_equal_confidence() {
        let now = Utc::now();
        // Same domain priority (both medical_context), same confidence:
        // chronic_condition (low modifiability) must outrank medication_burden
        // (medium).
        let chronic = factor(FactorCode::ChronicCondition, 0.6, now);
        let meds = factor(FactorCode::MedicationBurden, 0.6, now);
        assert!(constraint_score(&chronic) > constraint_score(&meds));
    }

    #[test]
    fn rebuild_replays_to_identical_derived_state() {
        let now = Utc::now();
        let config = EngineConfig::default();
        let user_id = Uuid::now_v7();
        let mut incremental = ComplexityProfile::new(user_id, now);

        let mut log = Vec::new();
        let codes = [
            FactorCode::LowEnergy,
            FactorCode::CostBarrier,
            FactorCode::LowEnergy,
            FactorCode::SocialIsolation,
        ];
        for (i, code) in codes.into_iter().enumerate() {
            let f = factor(code, 0.5 + i as f64 * 0.1, now + chrono::Duration::minutes(i as i64));
            fold(&mut incremental, &[f.clone()], f.source_entry_id, now, &config);
            log.push(f);
        }

        let replayed = rebuild(
            user_id,
            &log,
            incremental.latest_accepted_entry_id,
            now,
            &config,
        );
        assert!(same_derived_state(&incremental, &replayed));
    }
}

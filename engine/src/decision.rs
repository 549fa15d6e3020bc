use chrono::{DateTime, Utc};
use uuid::Uuid;

use compass_core::domains::{Domain, DomainClassification};
use compass_core::entries::{Entry, EntryIntent, SaveMode};
use compass_core::profile::ComplexityProfile;
use compass_core::snapshot::{
    FrictionBand, NextActionKind, PendingFollowUp, RiskBand, StateSnapshot, UncertaintyBand,
};

use crate::config::EngineConfig;
use crate::extractor::ExtractedPayload;
use crate::safety::{self, SafetyCheck};

/// Inputs to one decision. All state the chain reads is here; the function
/// itself is pure.
pub struct DecisionContext<'a> {
    pub entry: &'a Entry,
    pub safety: &'a SafetyCheck,
    pub classification: &'a DomainClassification,
    pub payload: &'a ExtractedPayload,
    /// Profile after this entry's factors were folded in.
    pub profile: &'a ComplexityProfile,
    pub pending: Option<&'a PendingFollowUp>,
    /// Clarifying questions already asked for this user today (UTC day).
    pub follow_ups_asked_today: u8,
    /// The oracle call failed or timed out; uncertainty is forced high.
    pub oracle_unavailable: bool,
    pub now: DateTime<Utc>,
}

/// A snapshot plus the follow-up to open, if the chain chose to ask.
pub struct Decision {
    pub snapshot: StateSnapshot,
    pub follow_up: Option<PendingFollowUp>,
}

/// The decision chain. Ordered, first match terminal:
/// safety short-circuit, then band computation, then next-action selection,
/// then highlights. No branch after a match executes.
pub fn decide(ctx: &DecisionContext, config: &EngineConfig) -> Decision {
    let used_factors = ctx.payload.factors.iter().map(|f| f.code).collect::<Vec<_>>();
    let symptom_key = ctx.payload.symptoms.first().copied();

    // 1. Safety short-circuit. Primary domain, the override flag, and the
    // committed factors are all consulted — no single layer is trusted alone.
    let factor_flagged = ctx.payload.factors.iter().any(|f| f.code.is_safety_flagged());
    if ctx.classification.is_safety() || factor_flagged {
        tracing::warn!(entry_id = %ctx.entry.id, "decision: safety escalation");
        return Decision {
            snapshot: StateSnapshot {
                entry_id: ctx.entry.id,
                created_at: ctx.now,
                intent: ctx.entry.intent,
                risk_band: RiskBand::Urgent,
                friction_band: friction_band(ctx.profile),
                uncertainty_band: UncertaintyBand::Low,
                next_action: NextActionKind::SafetyEscalation,
                what_matters: vec!["Your safety comes first right now.".to_string()],
                followup_question: None,
                safety_copy: Some(safety::safety_copy(&ctx.safety.flags)),
                used_factors,
                symptom_key,
                follow_up_count: ctx.follow_ups_asked_today,
            },
            follow_up: None,
        };
    }

    // 2. Band computation.
    let risk_band = risk_band(ctx.profile);
    let friction_band = friction_band(ctx.profile);
    let uncertainty_band = uncertainty_band(ctx, config);

    // 3. Next-action selection. Once the daily cap is reached the engine must
    // answer with what it has rather than ask again.
    let mut follow_up = None;
    let mut followup_question = None;
    let next_action = if uncertainty_band == UncertaintyBand::High
        && !ctx.payload.missing_info.is_empty()
        && ctx.follow_ups_asked_today < config.daily_follow_up_cap
    {
        let missing = &ctx.payload.missing_info[0];
        followup_question = Some(missing.question.clone());
        follow_up = Some(PendingFollowUp {
            id: Uuid::now_v7(),
            parent_entry_id: ctx.entry.id,
            question: missing.question.clone(),
            missing_info_key: missing.key,
            created_at: ctx.now,
            follow_up_count: ctx.follow_ups_asked_today + 1,
            symptom_key,
        });
        NextActionKind::AskFollowup
    } else if ctx.entry.intent == EntryIntent::LogOnly
        || ctx.entry.save_mode == SaveMode::SaveFactorsOnly
    {
        NextActionKind::LogOnly
    } else {
        NextActionKind::Answer
    };

    let follow_up_count = match next_action {
        NextActionKind::AskFollowup => ctx.follow_ups_asked_today + 1,
        _ => ctx.follow_ups_asked_today,
    };

    tracing::debug!(
        entry_id = %ctx.entry.id,
        risk = ?risk_band,
        friction = ?friction_band,
        uncertainty = ?uncertainty_band,
        next_action = ?next_action,
        "decision computed"
    );

    Decision {
        snapshot: StateSnapshot {
            entry_id: ctx.entry.id,
            created_at: ctx.now,
            intent: ctx.entry.intent,
            risk_band,
            friction_band,
            uncertainty_band,
            next_action,
            what_matters: what_matters(ctx.profile, config),
            followup_question,
            safety_copy: None,
            used_factors,
            symptom_key,
            follow_up_count,
        },
        follow_up,
    }
}

/// Risk from the highest severity among current top constraints.
fn risk_band(profile: &ComplexityProfile) -> RiskBand {
    let mut band = RiskBand::Low;
    for constraint in &profile.top_constraints {
        let severity = if constraint.code.is_safety_flagged() {
            // A standing safety factor keeps risk elevated even when the
            // current entry did not re-trigger the short-circuit.
            RiskBand::High
        } else if constraint.domain.priority() <= 4 && constraint.confidence >= 0.6 {
            RiskBand::High
        } else if constraint.domain.priority() <= 6 && constraint.confidence >= 0.5 {
            RiskBand::Moderate
        } else {
            RiskBand::Low
        };
        band = band.max(severity);
    }
    band
}

/// Friction from the count and weight of access/resource constraint factors.
fn friction_band(profile: &ComplexityProfile) -> FrictionBand {
    let constrained: Vec<f64> = profile
        .active_factors
        .iter()
        .filter(|f| {
            matches!(
                f.domain,
                Domain::AccessToCare | Domain::ResourcesConstraints
            )
        })
        .map(|f| f.confidence)
        .collect();
    let weight: f64 = constrained.iter().sum();
    if constrained.len() >= 2 || weight >= 1.0 {
        FrictionBand::High
    } else if !constrained.is_empty() {
        FrictionBand::Moderate
    } else {
        FrictionBand::Low
    }
}

/// Uncertainty from the mean confidence of factors used this entry and the
/// presence of unresolved missing-info. An unavailable oracle forces high.
fn uncertainty_band(ctx: &DecisionContext, config: &EngineConfig) -> UncertaintyBand {
    if ctx.oracle_unavailable {
        return UncertaintyBand::High;
    }
    let has_missing = !ctx.payload.missing_info.is_empty();
    if ctx.payload.factors.is_empty() {
        return if has_missing {
            UncertaintyBand::High
        } else {
            UncertaintyBand::Moderate
        };
    }
    let mean = ctx.payload.factors.iter().map(|f| f.confidence).sum::<f64>()
        / ctx.payload.factors.len() as f64;
    if mean < config.uncertainty_high_below
        || (has_missing && mean < config.uncertainty_moderate_below)
    {
        UncertaintyBand::High
    } else if has_missing || mean < config.uncertainty_moderate_below {
        UncertaintyBand::Moderate
    } else {
        UncertaintyBand::Low
    }
}

/// Short highlight per top-constraint domain, deduplicated, capped.
fn what_matters(profile: &ComplexityProfile, config: &EngineConfig) -> Vec<String> {
    let mut highlights: Vec<String> = Vec::new();
    for constraint in &profile.top_constraints {
        let line = domain_highlight(constraint.domain).to_string();
        if !highlights.contains(&line) {
            highlights.push(line);
        }
        if highlights.len() == config.what_matters_cap {
            break;
        }
    }
    highlights
}

fn domain_highlight(domain: Domain) -> &'static str {
    match domain {
        Domain::SafetyRisk => "Your safety comes first right now.",
        Domain::SymptomsBodySignals => "A symptom that keeps showing up.",
        Domain::MedicalContext => "An ongoing medical situation in the background.",
        Domain::MentalEmotionalState => "The emotional load you're carrying.",
        Domain::DurationPattern => "How long this has been going on.",
        Domain::CapacityEnergy => "Your energy is a limited resource right now.",
        Domain::AccessToCare => "Getting to care is harder than it should be.",
        Domain::EnvironmentExposures => "Something in your surroundings may be contributing.",
        Domain::SocialSupportContext => "The support around you is stretched thin.",
        Domain::ResourcesConstraints => "Money pressure is narrowing your options.",
        Domain::KnowledgeBeliefsPreferences => "A gap in information is adding friction.",
        Domain::GoalsIntent => "Something you've said you want to change.",
        Domain::UnknownOther => "The picture is still incomplete.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator;
    use crate::classifier::classify;
    use crate::extractor::extract;
    use crate::lexicon::DomainLexicon;
    use crate::safety::SafetyMatcher;
    use crate::vocabulary::VocabularyRegistry;
    use compass_core::entries::EntryMetadata;

    fn entry(intent: EntryIntent, save_mode: SaveMode, text: &str) -> Entry {
        Entry {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            created_at: Utc::now(),
            parent_entry_id: None,
            intent,
            save_mode,
            raw_text: Some(text.to_string()),
            metadata: EntryMetadata {
                source: Some("test".to_string()),
                agent: None,
                idempotency_key: Uuid::now_v7().to_string(),
            },
        }
    }

    struct Harness {
        lexicon: DomainLexicon,
        vocabulary: VocabularyRegistry,
        matcher: SafetyMatcher,
        config: EngineConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                lexicon: DomainLexicon::new(),
                vocabulary: VocabularyRegistry::new(),
                matcher: SafetyMatcher::new(),
                config: EngineConfig::default(),
            }
        }

        fn decide_for(
            &self,
            entry: &Entry,
            profile: &mut ComplexityProfile,
            asked_today: u8,
        ) -> Decision {
            let now = Utc::now();
            let text = entry.raw_text.as_deref().unwrap_or_default();
            let safety = self.matcher.scan(text, false);
            let classification = classify(&self.lexicon, &safety, text, None, &self.config);
            let payload = extract(
                &self.lexicon,
                &self.vocabulary,
                &safety,
                &classification,
                text,
                None,
                entry.id,
                now,
                &self.config,
            );
            aggregator::fold(profile, &payload.factors, entry.id, now, &self.config);
            decide(
                &DecisionContext {
                    entry,
                    safety: &safety,
                    classification: &classification,
                    payload: &payload,
                    profile,
                    pending: None,
                    follow_ups_asked_today: asked_today,
                    oracle_unavailable: false,
                    now,
                },
                &self.config,
            )
        }
    }

    #[test]
    fn safety_trigger_short_circuits_everything() {
        let harness = Harness::new();
        let e = entry(EntryIntent::LogOnly, SaveMode::SaveFactorsOnly, "can't breathe, chest hurts");
        let mut profile = ComplexityProfile::new(e.user_id, Utc::now());
        let decision = harness.decide_for(&e, &mut profile, 0);

        // log_only intent and save mode notwithstanding
        assert_eq!(decision.snapshot.next_action, NextActionKind::SafetyEscalation);
        assert_eq!(decision.snapshot.risk_band, RiskBand::Urgent);
        assert!(decision.snapshot.safety_copy.is_some());
        assert!(decision.follow_up.is_none());
    }

    #[test]
    fn vague_entries_ask_followup_until_the_daily_cap_then_answer() {
        let harness = Harness::new();
        let user_id = Uuid::now_v7();
        let mut profile = ComplexityProfile::new(user_id, Utc::now());
        let mut asked = 0u8;

        // Scenario: three consecutive low-confidence entries, cap of 2.
        let mut actions = Vec::new();
        for _ in 0..3 {
            let mut e = entry(EntryIntent::Ask, SaveMode::SaveJournal, "feeling a bit off");
            e.user_id = user_id;
            let decision = harness.decide_for(&e, &mut profile, asked);
            if decision.snapshot.next_action == NextActionKind::AskFollowup {
                asked = decision.snapshot.follow_up_count;
            }
            actions.push(decision.snapshot.next_action);
        }
        assert_eq!(
            actions,
            vec![
                NextActionKind::AskFollowup,
                NextActionKind::AskFollowup,
                NextActionKind::Answer
            ]
        );
        assert!(asked <= harness.config.daily_follow_up_cap);
    }

    #[test]
    fn log_only_intent_yields_log_only_when_confident() {
        let harness = Harness::new();
        let e = entry(
            EntryIntent::LogOnly,
            SaveMode::SaveJournal,
            "headaches every day for weeks, can't afford the gp gap fee",
        );
        let mut profile = ComplexityProfile::new(e.user_id, Utc::now());
        let decision = harness.decide_for(&e, &mut profile, 2);
        assert_eq!(decision.snapshot.next_action, NextActionKind::LogOnly);
    }

    #[test]
    fn followup_carries_idempotency_inputs() {
        let harness = Harness::new();
        let e = entry(EntryIntent::Ask, SaveMode::SaveJournal, "woke up with a headache");
        let mut profile = ComplexityProfile::new(e.user_id, Utc::now());
        let decision = harness.decide_for(&e, &mut profile, 0);

        assert_eq!(decision.snapshot.next_action, NextActionKind::AskFollowup);
        let follow_up = decision.follow_up.expect("follow-up opened");
        assert_eq!(follow_up.parent_entry_id, e.id);
        assert_eq!(follow_up.follow_up_count, 1);
        assert_eq!(
            decision.snapshot.followup_question.as_deref(),
            Some(follow_up.question.as_str())
        );
    }

    #[test]
    fn what_matters_is_deduplicated_and_capped() {
        let harness = Harness::new();
        let e = entry(
            EntryIntent::Journal,
            SaveMode::SaveJournal,
            "headaches for weeks, exhausted, can't afford the doctor, rent is late, \
             completely alone with this",
        );
        let mut profile = ComplexityProfile::new(e.user_id, Utc::now());
        let decision = harness.decide_for(&e, &mut profile, 2);

        assert!(decision.snapshot.what_matters.len() <= 3);
        let mut deduped = decision.snapshot.what_matters.clone();
        deduped.dedup();
        assert_eq!(deduped, decision.snapshot.what_matters);
    }

    #[test]
    fn oracle_outage_forces_high_uncertainty() {
        let harness = Harness::new();
        let e = entry(
            EntryIntent::Ask,
            SaveMode::SaveJournal,
            "headaches every day for weeks now",
        );
        let now = Utc::now();
        let text = e.raw_text.as_deref().unwrap();
        let safety = harness.matcher.scan(text, false);
        let classification = classify(&harness.lexicon, &safety, text, None, &harness.config);
        let payload = extract(
            &harness.lexicon,
            &harness.vocabulary,
            &safety,
            &classification,
            text,
            None,
            e.id,
            now,
            &harness.config,
        );
        let mut profile = ComplexityProfile::new(e.user_id, now);
        aggregator::fold(&mut profile, &payload.factors, e.id, now, &harness.config);

        let decision = decide(
            &DecisionContext {
                entry: &e,
                safety: &safety,
                classification: &classification,
                payload: &payload,
                profile: &profile,
                pending: None,
                follow_ups_asked_today: 2,
                oracle_unavailable: true,
                now,
            },
            &harness.config,
        );
        assert_eq!(decision.snapshot.uncertainty_band, UncertaintyBand::High);
        // Cap already reached: the engine answers with what it has.
        assert_eq!(decision.snapshot.next_action, NextActionKind::Answer);
    }

    #[test]
    fn friction_rises_with_access_and_resource_constraints() {
        let harness = Harness::new();
        let e = entry(
            EntryIntent::Journal,
            SaveMode::SaveJournal,
            "can't afford the gap fee and the clinic is booked out for weeks",
        );
        let mut profile = ComplexityProfile::new(e.user_id, Utc::now());
        let decision = harness.decide_for(&e, &mut profile, 2);
        assert!(decision.snapshot.friction_band >= FrictionBand::Moderate);
    }
}

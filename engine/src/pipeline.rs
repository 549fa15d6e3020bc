use chrono::{DateTime, Utc};

use compass_core::domains::DomainClassification;
use compass_core::entries::Entry;
use compass_core::oracle::OracleOutcome;
use compass_core::profile::ComplexityProfile;
use compass_core::response::{Recurrence, ResponseModel, SituationalSignals};
use compass_core::snapshot::{PendingFollowUp, StateSnapshot};

use crate::aggregator;
use crate::catalog::NudgeCatalog;
use crate::classifier;
use crate::config::EngineConfig;
use crate::decision::{self, DecisionContext};
use crate::extractor::{self, ExtractedPayload};
use crate::lexicon::DomainLexicon;
use crate::patterns::{self, ComputedInsight, EntryFacts, PatternError};
use crate::safety::{SafetyCheck, SafetyMatcher};
use crate::selector::{self, SelectorContext};
use crate::signals::{self, SignalContext};
use crate::vocabulary::VocabularyRegistry;

/// The deterministic per-entry pipeline plus the pattern scan, behind one
/// constructed-once façade. Everything here is synchronous; the oracle call
/// happens outside and its outcome is an input.
pub struct Engine {
    config: EngineConfig,
    lexicon: DomainLexicon,
    vocabulary: VocabularyRegistry,
    safety: SafetyMatcher,
    catalog: NudgeCatalog,
}

/// Everything the pipeline needs for one entry.
pub struct PipelineInput<'a> {
    pub entry: &'a Entry,
    pub oracle: OracleOutcome,
    /// Profile state before this entry. The pipeline folds into it and
    /// returns the updated copy.
    pub profile: ComplexityProfile,
    pub pending: Option<&'a PendingFollowUp>,
    /// Clarifying questions already asked for this user today.
    pub follow_ups_asked_today: u8,
    /// Risk flag raised upstream (client screen, transport metadata).
    pub upstream_risk_flag: bool,
    /// Recent entry facts for recurrence detection, newest last. Should not
    /// include this entry.
    pub recent: Vec<EntryFacts>,
    /// One-line summary of a stored insight relevant to this entry, if any.
    pub remembered: Option<String>,
    pub now: DateTime<Utc>,
}

/// Everything one entry produced.
pub struct PipelineOutput {
    pub safety: SafetyCheck,
    pub classification: DomainClassification,
    pub payload: ExtractedPayload,
    pub profile: ComplexityProfile,
    pub snapshot: StateSnapshot,
    pub signals: SituationalSignals,
    pub response: ResponseModel,
    pub follow_up: Option<PendingFollowUp>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            lexicon: DomainLexicon::new(),
            vocabulary: VocabularyRegistry::new(),
            safety: SafetyMatcher::new(),
            catalog: NudgeCatalog::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The local safety scan, exposed so callers can run it before the
    /// oracle call: a slow or dead oracle never delays crisis detection.
    pub fn check_safety(&self, text: &str, upstream_risk_flag: bool) -> SafetyCheck {
        self.safety.scan(text, upstream_risk_flag)
    }

    /// Symptom keys detected in a text, for persisting alongside the entry.
    pub fn detect_symptoms(&self, text: &str) -> Vec<compass_core::factors::SymptomKey> {
        self.lexicon.detect_symptoms(text)
    }

    /// Classifier → extractor → aggregator → decision engine → response
    /// selector, in order, for one entry.
    pub fn process(&self, input: PipelineInput) -> PipelineOutput {
        let text = input.entry.raw_text.as_deref().unwrap_or_default();
        let now = input.now;

        // Safety first, locally, regardless of what the oracle said or
        // whether it answered at all.
        let safety = self.safety.scan(text, input.upstream_risk_flag);

        let classification = classifier::classify(
            &self.lexicon,
            &safety,
            text,
            input.oracle.response(),
            &self.config,
        );

        let payload = extractor::extract(
            &self.lexicon,
            &self.vocabulary,
            &safety,
            &classification,
            text,
            input.oracle.response(),
            input.entry.id,
            now,
            &self.config,
        );

        // Memory is "used" when the response can draw on anything beyond
        // this entry: prior profile facts or a recalled insight.
        let memory_used = input.remembered.is_some() || !input.profile.active_factors.is_empty();

        let mut profile = input.profile;
        aggregator::fold(&mut profile, &payload.factors, input.entry.id, now, &self.config);

        let decision = decision::decide(
            &DecisionContext {
                entry: input.entry,
                safety: &safety,
                classification: &classification,
                payload: &payload,
                profile: &profile,
                pending: input.pending,
                follow_ups_asked_today: input.follow_ups_asked_today,
                oracle_unavailable: input.oracle.is_unavailable(),
                now,
            },
            &self.config,
        );

        let recurrence = self.recurrence(&input.recent, &payload, input.entry, now);

        let signals = signals::derive(
            &self.lexicon,
            &SignalContext {
                entry: input.entry,
                text,
                snapshot: &decision.snapshot,
                profile: &profile,
                safety: &safety,
                recurrence,
                memory_used,
            },
        );

        let response = selector::select(
            &self.catalog,
            &SelectorContext {
                entry: input.entry,
                snapshot: &decision.snapshot,
                signals: &signals,
                classification: &classification,
                payload: &payload,
                profile: &profile,
                remembered: input.remembered.clone(),
            },
            &self.config,
        );

        PipelineOutput {
            safety,
            classification,
            payload,
            profile,
            snapshot: decision.snapshot,
            signals,
            response,
            follow_up: decision.follow_up,
        }
    }

    /// The pattern scan over one user's recent entries. Pure and idempotent;
    /// identity and dismissed/bookmarked state are merged by the caller.
    pub fn detect_patterns(
        &self,
        entries: &[EntryFacts],
        now: DateTime<Utc>,
    ) -> Result<Vec<ComputedInsight>, PatternError> {
        patterns::detect(entries, now)
    }

    /// Canonical recurrence for this entry's lead symptom across recent
    /// entries plus this one.
    fn recurrence(
        &self,
        recent: &[EntryFacts],
        payload: &ExtractedPayload,
        entry: &Entry,
        now: DateTime<Utc>,
    ) -> Recurrence {
        let Some(symptom) = payload.symptoms.first() else {
            return Recurrence::None;
        };
        let mut all = recent.to_vec();
        all.push(EntryFacts {
            entry_id: entry.id,
            created_at: now,
            symptoms: payload.symptoms.clone(),
            factor_codes: payload.factors.iter().map(|f| f.code).collect(),
        });
        patterns::recurrence_for(&all, *symptom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use compass_core::entries::{EntryIntent, EntryMetadata, SaveMode};
    use compass_core::factors::SymptomKey;
    use compass_core::response::{AddOn, EscalationTier, ResponseShape};
    use compass_core::snapshot::{NextActionKind, RiskBand};
    use uuid::Uuid;

    fn entry(user_id: Uuid, intent: EntryIntent, text: &str) -> Entry {
        Entry {
            id: Uuid::now_v7(),
            user_id,
            created_at: Utc::now(),
            parent_entry_id: None,
            intent,
            save_mode: SaveMode::SaveJournal,
            raw_text: Some(text.to_string()),
            metadata: EntryMetadata {
                source: Some("test".to_string()),
                agent: None,
                idempotency_key: Uuid::now_v7().to_string(),
            },
        }
    }

    fn input<'a>(e: &'a Entry, profile: ComplexityProfile) -> PipelineInput<'a> {
        PipelineInput {
            entry: e,
            oracle: OracleOutcome::Unavailable,
            profile,
            pending: None,
            follow_ups_asked_today: 0,
            upstream_risk_flag: false,
            recent: Vec::new(),
            remembered: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn scenario_a_crisis_text_escalates_end_to_end() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let e = entry(user_id, EntryIntent::Ask, "can't breathe, chest hurts");
        let profile = ComplexityProfile::new(user_id, Utc::now());

        let output = engine.process(input(&e, profile));

        assert!(output.classification.is_safety());
        assert_eq!(output.snapshot.next_action, NextActionKind::SafetyEscalation);
        assert_eq!(output.snapshot.risk_band, RiskBand::Urgent);
        assert_eq!(output.response.shape, ResponseShape::EscalationSupport);
        assert_eq!(output.response.escalation_tier, EscalationTier::Crisis);
        assert!(output.response.chips.len() <= 3);
    }

    #[test]
    fn scenario_b_reflection_with_agency_gets_reflection_plus_next_step() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let e = entry(
            user_id,
            EntryIntent::Journal,
            "bit worried about how tired I've been for weeks, but tomorrow I will \
             start winding down earlier",
        );
        let profile = ComplexityProfile::new(user_id, Utc::now());

        let output = engine.process(PipelineInput {
            oracle: OracleOutcome::Ok(compass_core::oracle::OracleResponse {
                domains: Vec::new(),
                factors: Vec::new(),
                missing_info: Vec::new(),
                rationale: None,
            }),
            ..input(&e, profile)
        });

        assert_eq!(output.response.shape, ResponseShape::GentleReflection);
        assert_eq!(output.response.escalation_tier, EscalationTier::None);
        assert!(output.response.next_step.is_some());
        assert!(output
            .response
            .chips
            .iter()
            .any(|c| c.kind == compass_core::response::ChipKind::Save));
    }

    #[test]
    fn scenario_c_frequent_symptom_with_memory_recalls_pattern() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let now = Utc::now();
        let e = entry(user_id, EntryIntent::Journal, "headache again today");

        let recent: Vec<EntryFacts> = [8i64, 4, 2]
            .into_iter()
            .map(|days| EntryFacts {
                entry_id: Uuid::now_v7(),
                created_at: now - Duration::days(days),
                symptoms: vec![SymptomKey::Headache],
                factor_codes: Vec::new(),
            })
            .collect();

        let output = engine.process(PipelineInput {
            recent,
            remembered: Some("Headaches have shown up 3 times in 8 days.".to_string()),
            oracle: OracleOutcome::Ok(compass_core::oracle::OracleResponse {
                domains: Vec::new(),
                factors: Vec::new(),
                missing_info: Vec::new(),
                rationale: None,
            }),
            ..input(&e, ComplexityProfile::new(user_id, now))
        });

        assert_eq!(output.signals.recurrence, Recurrence::Frequent);
        assert!(output.signals.memory_used);
        assert!(output.response.add_ons.contains(&AddOn::PatternRecall));
        assert!(output.response.remembered_summary.is_some());
    }

    #[test]
    fn scenario_d_followup_cap_is_honored_across_consecutive_entries() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let mut profile = ComplexityProfile::new(user_id, Utc::now());
        let mut asked = 0u8;
        let mut actions = Vec::new();

        for _ in 0..3 {
            let e = entry(user_id, EntryIntent::Ask, "feeling kind of off");
            let output = engine.process(PipelineInput {
                follow_ups_asked_today: asked,
                ..input(&e, profile)
            });
            profile = output.profile;
            asked = output.snapshot.follow_up_count;
            actions.push(output.snapshot.next_action);
        }

        assert_eq!(
            actions,
            vec![
                NextActionKind::AskFollowup,
                NextActionKind::AskFollowup,
                NextActionKind::Answer
            ]
        );
    }

    #[test]
    fn oracle_outage_never_suppresses_safety() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let e = entry(user_id, EntryIntent::LogOnly, "thinking about hurting myself");
        let output = engine.process(input(&e, ComplexityProfile::new(user_id, Utc::now())));

        assert_eq!(output.snapshot.next_action, NextActionKind::SafetyEscalation);
        assert_eq!(output.response.escalation_tier, EscalationTier::Crisis);
    }

    #[test]
    fn upstream_risk_flag_alone_escalates() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let e = entry(user_id, EntryIntent::Journal, "rough day");
        let output = engine.process(PipelineInput {
            upstream_risk_flag: true,
            ..input(&e, ComplexityProfile::new(user_id, Utc::now()))
        });
        assert_eq!(output.snapshot.next_action, NextActionKind::SafetyEscalation);
    }

    #[test]
    fn profile_updates_survive_across_entries() {
        let engine = Engine::new(EngineConfig::default());
        let user_id = Uuid::now_v7();
        let mut profile = ComplexityProfile::new(user_id, Utc::now());

        let first = entry(
            user_id,
            EntryIntent::Journal,
            "headaches every day for weeks and I can't afford the gp",
        );
        let output = engine.process(input(&first, profile));
        profile = output.profile;
        assert!(!profile.active_factors.is_empty());
        let version_after_first = profile.version;

        let second = entry(user_id, EntryIntent::Journal, "still exhausted");
        let output = engine.process(input(&second, profile));
        profile = output.profile;
        assert!(profile.version > version_after_first);
        assert_eq!(profile.latest_accepted_entry_id, Some(second.id));
    }
}

use compass_core::domains::DomainClassification;
use compass_core::entries::{Entry, SaveMode};
use compass_core::profile::ComplexityProfile;
use compass_core::response::{
    AddOn, Agency, Chip, ChipKind, ComplexityLevel, EscalationTier, FactorChip, Recurrence,
    ResponseControls, ResponseModel, ResponseShape, SignalIntent, SignalLevel, SituationalSignals,
    StatusLine, StatusLineKind,
};
use compass_core::snapshot::{NextActionKind, StateSnapshot};

use crate::catalog::NudgeCatalog;
use crate::config::EngineConfig;
use crate::extractor::ExtractedPayload;
use crate::safety;

/// Inputs to response selection.
pub struct SelectorContext<'a> {
    pub entry: &'a Entry,
    pub snapshot: &'a StateSnapshot,
    pub signals: &'a SituationalSignals,
    pub classification: &'a DomainClassification,
    pub payload: &'a ExtractedPayload,
    pub profile: &'a ComplexityProfile,
    /// One-line summary of the recalled pattern, when memory was used.
    pub remembered: Option<String>,
}

/// Map situational signals to a response shape and escalation tier, then
/// assemble the outward response model.
///
/// Escalation is evaluated top-down, first match terminal. The crisis check
/// runs before the log_only short-circuit: even a log-only entry can contain
/// crisis language.
pub fn select(catalog: &NudgeCatalog, ctx: &SelectorContext, config: &EngineConfig) -> ResponseModel {
    // Tier 3: crisis. Non-safety chips suppressed, no hedging language.
    if !ctx.signals.risk_flags.is_empty()
        || ctx.snapshot.next_action == NextActionKind::SafetyEscalation
    {
        return crisis_response(ctx, config);
    }

    // log_only short-circuit: minimal acknowledgement, no shaping.
    if ctx.snapshot.next_action == NextActionKind::LogOnly {
        return log_only_response(ctx, config);
    }

    let tier = escalation_tier(ctx.signals);
    let shape = match tier {
        EscalationTier::DirectedSupport => ResponseShape::EscalationSupport,
        _ => base_shape(ctx),
    };

    let mut model = base_model(ctx, shape, tier);

    match shape {
        ResponseShape::ClarifyingQuestion => {
            model.confirmation = "Got it — one quick question so the answer actually fits."
                .to_string();
            model.follow_up_plan = ctx
                .snapshot
                .followup_question
                .clone()
                .or_else(|| ctx.payload.missing_info.first().map(|m| m.question.clone()));
        }
        ResponseShape::GentleReflection => {
            model.confirmation = "Thanks for putting this into words.".to_string();
            model.answer = Some(reflection_text(ctx));
            if ctx.signals.agency == Agency::CanActNow {
                let nudge = catalog.next_step(ctx.classification.primary.domain);
                model.next_step = Some(format!("{} — {}", nudge.title, nudge.description));
            }
        }
        ResponseShape::ConcreteNextStep => {
            model.confirmation = "Here's one thing worth doing next.".to_string();
            let nudge = catalog.next_step(ctx.classification.primary.domain);
            model.next_step = Some(format!("{} — {}", nudge.title, nudge.description));
        }
        ResponseShape::OptionComparison => {
            model.confirmation = "There's more than one way through this.".to_string();
            model.answer = Some(option_comparison_text(catalog, ctx));
        }
        ResponseShape::EscalationSupport => {
            model.confirmation = "Let's take this seriously together.".to_string();
            model.answer = Some(
                "This sounds like more than anyone should carry alone. Two things that help \
                 right now: tell one person you trust what you told me, and book a \
                 professional — your GP, or a counsellor — this week."
                    .to_string(),
            );
            model.safety_net = Some(
                "If it gets heavier before then, crisis lines answer around the clock."
                    .to_string(),
            );
        }
        ResponseShape::PatternRecall => {
            model.confirmation = "This connects to something you've logged before.".to_string();
            model.answer = ctx.remembered.clone();
        }
    }

    if tier == EscalationTier::SoftSupport {
        model.add_ons.push(AddOn::SoftSupportPrompt);
        model.safety_net = Some(
            "If this keeps weighing on you, talking it through with someone — a friend or a \
             professional — is a reasonable next step, not an overreaction."
                .to_string(),
        );
    }

    apply_add_ons(&mut model, ctx);
    model.chips = chips(ctx, shape, tier, config);
    model
}

/// Reflective acknowledgement grounded in what the profile already holds.
fn reflection_text(ctx: &SelectorContext) -> String {
    match ctx.snapshot.what_matters.first() {
        Some(highlight) => format!(
            "Reading this back, one thing stands out: {}",
            lowercase_first(highlight)
        ),
        None => "Sometimes naming it is the step. Nothing to fix right now.".to_string(),
    }
}

/// Two ways forward, drawn from the catalog for the top two active domains.
fn option_comparison_text(catalog: &NudgeCatalog, ctx: &SelectorContext) -> String {
    let mut domains: Vec<_> = ctx
        .snapshot
        .used_factors
        .iter()
        .map(|code| code.domain())
        .collect();
    domains.push(ctx.classification.primary.domain);
    domains.dedup();

    let first = catalog.next_step(domains[0]);
    let second = domains
        .get(1)
        .map(|d| catalog.next_step(*d))
        .filter(|n| n.title != first.title);

    match second {
        Some(second) => format!(
            "Two ways into this, and either is fine: {} Or, start from the other side: {}",
            first.description, second.description
        ),
        None => format!(
            "One path is the smallest possible version: {} The other is to park it and ask \
             someone who can see the whole picture.",
            first.description
        ),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Escalation tiers 2 and 1; tier 3 and the log_only path are handled before
/// shape selection.
fn escalation_tier(signals: &SituationalSignals) -> EscalationTier {
    let high_load_blocked =
        signals.emotional_load == SignalLevel::High && signals.agency == Agency::Blocked;
    let isolated_under_pressure = signals.isolation
        && signals.time_pressure == SignalLevel::High
        && signals.risk_flags.is_empty();
    if high_load_blocked || isolated_under_pressure {
        return EscalationTier::DirectedSupport;
    }

    let high_load_low_agency =
        signals.emotional_load == SignalLevel::High && signals.agency != Agency::CanActNow;
    let frequent_and_stuck = signals.recurrence == Recurrence::Frequent && signals.stuckness;
    if high_load_low_agency || frequent_and_stuck {
        return EscalationTier::SoftSupport;
    }

    EscalationTier::None
}

/// Tier-0 shape mapping, in priority order.
fn base_shape(ctx: &SelectorContext) -> ResponseShape {
    let signals = ctx.signals;

    // The decision engine chose to ask; the response leads with the question.
    if ctx.snapshot.next_action == NextActionKind::AskFollowup {
        return ResponseShape::ClarifyingQuestion;
    }

    match signals.intent_type {
        SignalIntent::Question => {
            if signals.alternatives_present {
                ResponseShape::OptionComparison
            } else {
                ResponseShape::ClarifyingQuestion
            }
        }
        SignalIntent::Uncertainty => {
            if signals.emotional_load >= SignalLevel::Medium {
                ResponseShape::GentleReflection
            } else {
                ResponseShape::ClarifyingQuestion
            }
        }
        SignalIntent::Reflection => {
            if signals.recurrence == Recurrence::Frequent && signals.memory_used {
                ResponseShape::PatternRecall
            } else {
                ResponseShape::GentleReflection
            }
        }
        SignalIntent::Request => {
            if signals.complexity == ComplexityLevel::Systemic {
                ResponseShape::OptionComparison
            } else {
                ResponseShape::ConcreteNextStep
            }
        }
        SignalIntent::Statement => {
            if signals.complexity == ComplexityLevel::Systemic || signals.agency == Agency::Blocked
            {
                ResponseShape::OptionComparison
            } else if signals.recurrence == Recurrence::Frequent && signals.memory_used {
                ResponseShape::PatternRecall
            } else {
                ResponseShape::GentleReflection
            }
        }
    }
}

fn crisis_response(ctx: &SelectorContext, config: &EngineConfig) -> ResponseModel {
    let mut model = base_model(ctx, ResponseShape::EscalationSupport, EscalationTier::Crisis);
    model.confirmation = "Stopping everything else for a moment.".to_string();
    model.answer = Some(
        ctx.snapshot
            .safety_copy
            .clone()
            .unwrap_or_else(|| safety::safety_copy(&ctx.signals.risk_flags)),
    );
    model.safety_net = Some(
        "Emergency services and crisis lines are available right now, around the clock."
            .to_string(),
    );
    // Non-safety chips are suppressed in the crisis flow.
    model.chips = vec![Chip {
        kind: ChipKind::GetSupport,
        label: "Get support now".to_string(),
    }];
    model.chips.truncate(config.chip_budget);
    model.status_lines.push(StatusLine {
        kind: StatusLineKind::NotMedicalAdvice,
        text: "This isn't medical advice.".to_string(),
    });
    model
}

fn log_only_response(ctx: &SelectorContext, config: &EngineConfig) -> ResponseModel {
    let mut model = base_model(ctx, ResponseShape::GentleReflection, EscalationTier::None);
    model.confirmation = match ctx.entry.save_mode {
        SaveMode::SaveFactorsOnly => "Noted — kept what matters, not the words.".to_string(),
        _ => "Noted and saved.".to_string(),
    };
    model.status_lines.push(StatusLine {
        kind: StatusLineKind::Saved,
        text: "Saved to your log.".to_string(),
    });
    if health_touching(ctx) {
        model.status_lines.push(StatusLine {
            kind: StatusLineKind::NotMedicalAdvice,
            text: "This isn't medical advice.".to_string(),
        });
    }
    model.chips = chips(ctx, ResponseShape::GentleReflection, EscalationTier::None, config);
    model
}

fn base_model(ctx: &SelectorContext, shape: ResponseShape, tier: EscalationTier) -> ResponseModel {
    let factor_chips: Vec<FactorChip> = ctx
        .payload
        .factors
        .iter()
        .map(|f| FactorChip {
            code: f.code,
            domain: f.domain,
            label: f.code.label().to_string(),
            confidence: f.confidence,
        })
        .collect();

    ResponseModel {
        shape,
        escalation_tier: tier,
        confirmation: String::new(),
        answer: None,
        next_step: None,
        follow_up_plan: None,
        safety_net: None,
        what_matters: ctx.snapshot.what_matters.clone(),
        chips: Vec::new(),
        status_lines: Vec::new(),
        add_ons: Vec::new(),
        controls: ResponseControls {
            show_why: !factor_chips.is_empty(),
            save_to_journal: ctx.entry.save_mode == SaveMode::Transient,
            pause_followups: ctx.snapshot.follow_up_count >= 1,
        },
        factor_chips,
        remembered_summary: None,
    }
}

/// Secondary add-ons, independent of tier and shape.
fn apply_add_ons(model: &mut ResponseModel, ctx: &SelectorContext) {
    if ctx.signals.recurrence == Recurrence::Frequent && ctx.signals.memory_used {
        model.add_ons.push(AddOn::PatternRecall);
        model.remembered_summary = ctx.remembered.clone();
    }
    if ctx.signals.memory_used {
        model.add_ons.push(AddOn::MemoryFooter);
    }
    if ctx.entry.save_mode != SaveMode::Transient {
        model.status_lines.push(StatusLine {
            kind: StatusLineKind::Saved,
            text: "Saved to your log.".to_string(),
        });
    }
    if health_touching(ctx) {
        model.status_lines.push(StatusLine {
            kind: StatusLineKind::NotMedicalAdvice,
            text: "This isn't medical advice.".to_string(),
        });
    }
}

fn health_touching(ctx: &SelectorContext) -> bool {
    ctx.classification.primary.domain.touches_health()
        || ctx
            .classification
            .secondary
            .iter()
            .any(|t| t.domain.touches_health())
}

/// Chip candidates under the budget. Overflow drops in priority order:
/// get_support, then clarify, then save.
fn chips(
    ctx: &SelectorContext,
    shape: ResponseShape,
    tier: EscalationTier,
    config: &EngineConfig,
) -> Vec<Chip> {
    let mut chips = Vec::new();
    if tier >= EscalationTier::SoftSupport {
        chips.push(Chip {
            kind: ChipKind::GetSupport,
            label: "Get support".to_string(),
        });
    }
    if shape == ResponseShape::ClarifyingQuestion {
        chips.push(Chip {
            kind: ChipKind::Clarify,
            label: "Answer the question".to_string(),
        });
    }
    let reflective = matches!(
        ctx.signals.intent_type,
        SignalIntent::Reflection | SignalIntent::Statement
    ) || ctx.entry.save_mode != SaveMode::Transient;
    if reflective {
        chips.push(Chip {
            kind: ChipKind::Save,
            label: "Save this".to_string(),
        });
    }
    chips.truncate(config.chip_budget);
    chips
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use compass_core::domains::{Domain, DomainTag};
    use compass_core::entries::{EntryIntent, EntryMetadata};
    use compass_core::response::RiskFlag;
    use compass_core::snapshot::{FrictionBand, RiskBand, UncertaintyBand};
    use uuid::Uuid;

    fn entry(intent: EntryIntent, save_mode: SaveMode) -> Entry {
        Entry {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            created_at: Utc::now(),
            parent_entry_id: None,
            intent,
            save_mode,
            raw_text: Some("text".to_string()),
            metadata: EntryMetadata {
                source: None,
                agent: None,
                idempotency_key: "k".to_string(),
            },
        }
    }

    fn classification(domain: Domain) -> DomainClassification {
        DomainClassification {
            primary: DomainTag {
                domain,
                confidence: 0.8,
            },
            secondary: Vec::new(),
            rationale: None,
            safety_override: false,
        }
    }

    fn snapshot(entry: &Entry, next_action: NextActionKind) -> StateSnapshot {
        StateSnapshot {
            entry_id: entry.id,
            created_at: Utc::now(),
            intent: entry.intent,
            risk_band: RiskBand::Low,
            friction_band: FrictionBand::Low,
            uncertainty_band: UncertaintyBand::Low,
            next_action,
            what_matters: vec!["A symptom that keeps showing up.".to_string()],
            followup_question: None,
            safety_copy: None,
            used_factors: Vec::new(),
            symptom_key: None,
            follow_up_count: 0,
        }
    }

    fn signals() -> SituationalSignals {
        SituationalSignals {
            intent_type: SignalIntent::Reflection,
            emotional_load: SignalLevel::Low,
            time_pressure: SignalLevel::Low,
            complexity: ComplexityLevel::Simple,
            agency: Agency::Limited,
            social_determinants: false,
            risk_flags: Vec::new(),
            recurrence: Recurrence::None,
            memory_used: false,
            stuckness: false,
            isolation: false,
            alternatives_present: false,
        }
    }

    struct Fixture {
        entry: Entry,
        snapshot: StateSnapshot,
        signals: SituationalSignals,
        classification: DomainClassification,
        payload: ExtractedPayload,
        profile: ComplexityProfile,
    }

    impl Fixture {
        fn new() -> Self {
            let entry = entry(EntryIntent::Journal, SaveMode::SaveJournal);
            let snapshot = snapshot(&entry, NextActionKind::Answer);
            let profile = ComplexityProfile::new(entry.user_id, Utc::now());
            Self {
                snapshot,
                signals: signals(),
                classification: classification(Domain::SymptomsBodySignals),
                payload: ExtractedPayload::default(),
                profile,
                entry,
            }
        }

        fn select(&self, remembered: Option<String>) -> ResponseModel {
            select(
                &NudgeCatalog::new(),
                &SelectorContext {
                    entry: &self.entry,
                    snapshot: &self.snapshot,
                    signals: &self.signals,
                    classification: &self.classification,
                    payload: &self.payload,
                    profile: &self.profile,
                    remembered,
                },
                &EngineConfig::default(),
            )
        }
    }

    #[test]
    fn crisis_flags_force_tier_three_and_suppress_non_safety_chips() {
        let mut fixture = Fixture::new();
        fixture.signals.risk_flags = vec![RiskFlag::SelfHarm];
        // Everything else points at a calm reflection; the flags win anyway.
        let model = fixture.select(None);
        assert_eq!(model.shape, ResponseShape::EscalationSupport);
        assert_eq!(model.escalation_tier, EscalationTier::Crisis);
        assert_eq!(model.chips.len(), 1);
        assert_eq!(model.chips[0].kind, ChipKind::GetSupport);
        assert!(model.safety_net.is_some());
    }

    #[test]
    fn log_only_entries_still_get_the_crisis_check() {
        let mut fixture = Fixture::new();
        fixture.entry = entry(EntryIntent::LogOnly, SaveMode::SaveJournal);
        fixture.snapshot = snapshot(&fixture.entry, NextActionKind::LogOnly);
        fixture.signals.risk_flags = vec![RiskFlag::ImminentDanger];
        let model = fixture.select(None);
        assert_eq!(model.escalation_tier, EscalationTier::Crisis);
        assert_eq!(model.shape, ResponseShape::EscalationSupport);
    }

    #[test]
    fn log_only_without_risk_gets_minimal_acknowledgement() {
        let mut fixture = Fixture::new();
        fixture.entry = entry(EntryIntent::LogOnly, SaveMode::SaveJournal);
        fixture.snapshot = snapshot(&fixture.entry, NextActionKind::LogOnly);
        fixture.signals.intent_type = SignalIntent::Statement;
        let model = fixture.select(None);
        assert_eq!(model.escalation_tier, EscalationTier::None);
        assert!(model
            .status_lines
            .iter()
            .any(|s| s.kind == StatusLineKind::Saved));
        assert!(model.answer.is_none());
    }

    #[test]
    fn high_load_and_blocked_agency_reach_tier_two() {
        let mut fixture = Fixture::new();
        fixture.signals.emotional_load = SignalLevel::High;
        fixture.signals.agency = Agency::Blocked;
        let model = fixture.select(None);
        assert_eq!(model.escalation_tier, EscalationTier::DirectedSupport);
        assert_eq!(model.shape, ResponseShape::EscalationSupport);
        assert!(model.answer.as_deref().unwrap_or_default().contains("trust"));
    }

    #[test]
    fn high_load_with_limited_agency_reaches_tier_one_and_keeps_shape() {
        let mut fixture = Fixture::new();
        fixture.signals.emotional_load = SignalLevel::High;
        fixture.signals.agency = Agency::Limited;
        let model = fixture.select(None);
        assert_eq!(model.escalation_tier, EscalationTier::SoftSupport);
        assert_eq!(model.shape, ResponseShape::GentleReflection);
        assert!(model.add_ons.contains(&AddOn::SoftSupportPrompt));
        assert!(model.chips.iter().any(|c| c.kind == ChipKind::GetSupport));
    }

    #[test]
    fn reflection_with_agency_appends_concrete_next_step() {
        // Scenario: reflection intent, medium emotional load, can act now.
        let mut fixture = Fixture::new();
        fixture.signals.intent_type = SignalIntent::Reflection;
        fixture.signals.emotional_load = SignalLevel::Medium;
        fixture.signals.agency = Agency::CanActNow;
        let model = fixture.select(None);
        assert_eq!(model.shape, ResponseShape::GentleReflection);
        assert_eq!(model.escalation_tier, EscalationTier::None);
        assert!(model.next_step.is_some());
        assert!(model.chips.iter().any(|c| c.kind == ChipKind::Save));
    }

    #[test]
    fn question_with_alternatives_compares_options() {
        let mut fixture = Fixture::new();
        fixture.signals.intent_type = SignalIntent::Question;
        fixture.signals.alternatives_present = true;
        let model = fixture.select(None);
        assert_eq!(model.shape, ResponseShape::OptionComparison);
    }

    #[test]
    fn uncertainty_with_medium_load_softens_to_reflection() {
        let mut fixture = Fixture::new();
        fixture.signals.intent_type = SignalIntent::Uncertainty;
        fixture.signals.emotional_load = SignalLevel::Medium;
        let model = fixture.select(None);
        assert_eq!(model.shape, ResponseShape::GentleReflection);
    }

    #[test]
    fn systemic_request_compares_options() {
        let mut fixture = Fixture::new();
        fixture.signals.intent_type = SignalIntent::Request;
        fixture.signals.complexity = ComplexityLevel::Systemic;
        let model = fixture.select(None);
        assert_eq!(model.shape, ResponseShape::OptionComparison);
    }

    #[test]
    fn pattern_recall_addon_fires_with_memory_and_recurrence() {
        // Scenario: frequent recurrence, memory used, no risk flags.
        let mut fixture = Fixture::new();
        fixture.signals.recurrence = Recurrence::Frequent;
        fixture.signals.memory_used = true;
        let model = fixture.select(Some("Headaches have shown up 4 times in 10 days.".to_string()));
        assert!(model.add_ons.contains(&AddOn::PatternRecall));
        assert!(model.add_ons.contains(&AddOn::MemoryFooter));
        assert!(model.remembered_summary.is_some());
    }

    #[test]
    fn chip_budget_holds_for_every_combination() {
        let config = EngineConfig::default();
        let loads = [SignalLevel::Low, SignalLevel::Medium, SignalLevel::High];
        let agencies = [Agency::CanActNow, Agency::Limited, Agency::Blocked];
        let intents = [
            SignalIntent::Question,
            SignalIntent::Uncertainty,
            SignalIntent::Reflection,
            SignalIntent::Request,
            SignalIntent::Statement,
        ];
        for load in loads {
            for agency in agencies {
                for intent in intents {
                    let mut fixture = Fixture::new();
                    fixture.signals.emotional_load = load;
                    fixture.signals.agency = agency;
                    fixture.signals.intent_type = intent;
                    fixture.signals.stuckness = true;
                    fixture.signals.recurrence = Recurrence::Frequent;
                    let model = fixture.select(None);
                    assert!(model.chips.len() <= config.chip_budget);
                }
            }
        }
    }

    #[test]
    fn health_domains_carry_the_not_medical_advice_line() {
        let fixture = Fixture::new();
        let model = fixture.select(None);
        assert!(model
            .status_lines
            .iter()
            .any(|s| s.kind == StatusLineKind::NotMedicalAdvice));
    }
}

use compass_core::domains::Domain;
use compass_core::entries::{Entry, EntryIntent};
use compass_core::profile::ComplexityProfile;
use compass_core::response::{
    Agency, ComplexityLevel, Recurrence, SignalIntent, SituationalSignals,
};
use compass_core::snapshot::{FrictionBand, StateSnapshot};

use crate::lexicon::DomainLexicon;
use crate::safety::SafetyCheck;

const REQUEST_TERMS: &[&str] = &[
    "help me", "what should i do", "what do i do", "i need", "how do i", "how can i",
];

const ALTERNATIVE_TERMS: &[&str] = &[" or ", "either", "option", "versus", " vs ", "instead of"];

/// Inputs for signal derivation.
pub struct SignalContext<'a> {
    pub entry: &'a Entry,
    pub text: &'a str,
    pub snapshot: &'a StateSnapshot,
    pub profile: &'a ComplexityProfile,
    pub safety: &'a SafetyCheck,
    /// Canonical recurrence: frequent means ≥3 occurrences within 14 days,
    /// the same rule the pattern detector uses for significance.
    pub recurrence: Recurrence,
    /// Stored profile facts or insights informed this response.
    pub memory_used: bool,
}

/// Derive the situational signal set the response selector consumes.
/// Distinct from the decision bands, but informed by them.
pub fn derive(lexicon: &DomainLexicon, ctx: &SignalContext) -> SituationalSignals {
    let lower = ctx.text.to_lowercase();

    SituationalSignals {
        intent_type: intent_type(lexicon, ctx.entry, &lower),
        emotional_load: lexicon.emotional_load(ctx.text),
        time_pressure: lexicon.time_pressure(ctx.text),
        complexity: complexity(ctx.profile, ctx.snapshot),
        agency: agency(lexicon, ctx.text),
        social_determinants: social_determinants(ctx.profile),
        risk_flags: ctx.safety.flags.clone(),
        recurrence: ctx.recurrence,
        memory_used: ctx.memory_used,
        stuckness: lexicon.has_stuckness(ctx.text),
        isolation: lexicon.has_isolation(ctx.text),
        alternatives_present: ALTERNATIVE_TERMS.iter().filter(|t| lower.contains(*t)).count() >= 1
            && lower.contains(" or "),
    }
}

fn intent_type(lexicon: &DomainLexicon, entry: &Entry, lower: &str) -> SignalIntent {
    match entry.intent {
        EntryIntent::Ask | EntryIntent::Mixed => {
            if lexicon.has_uncertainty(lower) {
                SignalIntent::Uncertainty
            } else if REQUEST_TERMS.iter().any(|t| lower.contains(t)) {
                SignalIntent::Request
            } else if lower.contains('?') || entry.intent == EntryIntent::Ask {
                SignalIntent::Question
            } else {
                SignalIntent::Reflection
            }
        }
        EntryIntent::Journal => SignalIntent::Reflection,
        EntryIntent::FollowUp | EntryIntent::LogOnly => SignalIntent::Statement,
    }
}

/// Systemic: several domains active at once, or structural friction on top of
/// a multi-domain picture. Simple: one domain, no friction.
fn complexity(profile: &ComplexityProfile, snapshot: &StateSnapshot) -> ComplexityLevel {
    let domains = profile.active_domains().len();
    if domains >= 3 || (domains >= 2 && snapshot.friction_band == FrictionBand::High) {
        ComplexityLevel::Systemic
    } else if domains >= 2 {
        ComplexityLevel::Compound
    } else {
        ComplexityLevel::Simple
    }
}

fn agency(lexicon: &DomainLexicon, text: &str) -> Agency {
    if lexicon.has_blocked_language(text) {
        Agency::Blocked
    } else if lexicon.has_action_readiness(text) {
        Agency::CanActNow
    } else {
        Agency::Limited
    }
}

fn social_determinants(profile: &ComplexityProfile) -> bool {
    profile.active_factors.iter().any(|f| {
        matches!(
            f.domain,
            Domain::AccessToCare | Domain::ResourcesConstraints | Domain::SocialSupportContext
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use compass_core::entries::{EntryMetadata, SaveMode};
    use compass_core::snapshot::{NextActionKind, RiskBand, UncertaintyBand};
    use uuid::Uuid;

    fn entry(intent: EntryIntent, text: &str) -> Entry {
        Entry {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            created_at: Utc::now(),
            parent_entry_id: None,
            intent,
            save_mode: SaveMode::SaveJournal,
            raw_text: Some(text.to_string()),
            metadata: EntryMetadata {
                source: None,
                agent: None,
                idempotency_key: "k".to_string(),
            },
        }
    }

    fn snapshot(entry: &Entry, friction: FrictionBand) -> StateSnapshot {
        StateSnapshot {
            entry_id: entry.id,
            created_at: Utc::now(),
            intent: entry.intent,
            risk_band: RiskBand::Low,
            friction_band: friction,
            uncertainty_band: UncertaintyBand::Low,
            next_action: NextActionKind::Answer,
            what_matters: Vec::new(),
            followup_question: None,
            safety_copy: None,
            used_factors: Vec::new(),
            symptom_key: None,
            follow_up_count: 0,
        }
    }

    fn derive_for(intent: EntryIntent, text: &str) -> SituationalSignals {
        let lexicon = DomainLexicon::new();
        let e = entry(intent, text);
        let snap = snapshot(&e, FrictionBand::Low);
        let profile = ComplexityProfile::new(e.user_id, Utc::now());
        let safety = SafetyCheck::default();
        derive(
            &lexicon,
            &SignalContext {
                entry: &e,
                text,
                snapshot: &snap,
                profile: &profile,
                safety: &safety,
                recurrence: Recurrence::None,
                memory_used: false,
            },
        )
    }

    #[test]
    fn ask_with_uncertainty_language_reads_as_uncertainty() {
        let signals = derive_for(EntryIntent::Ask, "not sure if this headache is normal?");
        assert_eq!(signals.intent_type, SignalIntent::Uncertainty);
    }

    #[test]
    fn ask_for_help_reads_as_request() {
        let signals = derive_for(EntryIntent::Ask, "help me sort out a gp appointment");
        assert_eq!(signals.intent_type, SignalIntent::Request);
    }

    #[test]
    fn journal_reads_as_reflection() {
        let signals = derive_for(EntryIntent::Journal, "long day, but got through it");
        assert_eq!(signals.intent_type, SignalIntent::Reflection);
    }

    #[test]
    fn blocked_language_sets_agency_blocked() {
        let signals = derive_for(EntryIntent::Journal, "there's no way to fix this, out of options");
        assert_eq!(signals.agency, Agency::Blocked);
    }

    #[test]
    fn readiness_language_sets_agency_can_act_now() {
        let signals = derive_for(EntryIntent::Journal, "tomorrow I will book the appointment");
        assert_eq!(signals.agency, Agency::CanActNow);
    }

    #[test]
    fn alternatives_require_an_or() {
        let signals = derive_for(EntryIntent::Ask, "should I see the gp or try telehealth first?");
        assert!(signals.alternatives_present);
        let none = derive_for(EntryIntent::Ask, "should I see the gp?");
        assert!(!none.alternatives_present);
    }

    #[test]
    fn safety_flags_pass_through() {
        let lexicon = DomainLexicon::new();
        let e = entry(EntryIntent::Ask, "text");
        let snap = snapshot(&e, FrictionBand::Low);
        let profile = ComplexityProfile::new(e.user_id, Utc::now());
        let matcher = crate::safety::SafetyMatcher::new();
        let safety = matcher.scan("I want to die", false);
        let signals = derive(
            &lexicon,
            &SignalContext {
                entry: &e,
                text: "text",
                snapshot: &snap,
                profile: &profile,
                safety: &safety,
                recurrence: Recurrence::None,
                memory_used: false,
            },
        );
        assert!(!signals.risk_flags.is_empty());
    }
}

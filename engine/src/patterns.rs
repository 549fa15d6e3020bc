use chrono::{DateTime, Utc};
use uuid::Uuid;

use compass_core::factors::{FactorCode, SymptomKey};
use compass_core::insights::{CoOccurrence, CoOccurrenceKey, CorrelationBand};
use compass_core::response::Recurrence;

/// The canonical recurrence rule. "Frequent" everywhere in the system —
/// selector signals and insight significance alike — means at least this many
/// occurrences inside a window of at most this many days.
pub const RECURRENCE_MIN_COUNT: usize = 3;
pub const RECURRENCE_WINDOW_DAYS: i64 = 14;
/// An insight stops showing once the last occurrence is older than this.
pub const INSIGHT_RECENT_DAYS: i64 = 7;

/// What the detector sees of one entry: identity, time, and the facts that
/// were extracted from it.
#[derive(Debug, Clone)]
pub struct EntryFacts {
    pub entry_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub symptoms: Vec<SymptomKey>,
    pub factor_codes: Vec<FactorCode>,
}

/// A recomputed insight, before identity and interaction state are merged in.
/// Identical entry sets produce identical computed insights.
#[derive(Debug, Clone)]
pub struct ComputedInsight {
    pub symptom_key: SymptomKey,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub occurrence_count: u32,
    pub day_span: u32,
    pub co_occurrences: Vec<CoOccurrence>,
    pub insight: String,
    pub connection: String,
    pub suggestions: Vec<String>,
    pub source_entry_ids: Vec<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// An entry is timestamped in the future; the scan window cannot be trusted.
    #[error("corrupt scan window: entry {entry_id} is timestamped in the future")]
    CorruptWindow { entry_id: Uuid },
}

/// Generic codes that ride along with every symptom report. Counting them as
/// co-occurrences would only restate the symptom itself.
const SYMPTOM_DERIVED_CODES: &[FactorCode] = &[
    FactorCode::RecurringSymptom,
    FactorCode::AcuteSymptom,
    FactorCode::SymptomRecurrence,
    FactorCode::AcuteRiskLanguage,
    FactorCode::UnclassifiedNote,
];

/// Scan one user's recent entries for symptom patterns.
///
/// Degrades to no insights on insufficient data; a corrupt window is an
/// error and produces nothing rather than a partial result. Recomputing over
/// the same entry set is idempotent.
pub fn detect(entries: &[EntryFacts], now: DateTime<Utc>) -> Result<Vec<ComputedInsight>, PatternError> {
    if let Some(bad) = entries.iter().find(|e| e.created_at > now) {
        return Err(PatternError::CorruptWindow {
            entry_id: bad.entry_id,
        });
    }
    if entries.len() < RECURRENCE_MIN_COUNT {
        tracing::debug!(entries = entries.len(), "insufficient data for pattern scan");
        return Ok(Vec::new());
    }

    let mut ordered: Vec<&EntryFacts> = entries.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.entry_id.cmp(&b.entry_id)));

    let mut insights = Vec::new();
    for symptom in SymptomKey::ALL {
        if let Some(insight) = detect_symptom(&ordered, symptom) {
            insights.push(insight);
        }
    }
    Ok(insights)
}

/// Densest qualifying window ending at the most recent occurrence.
fn detect_symptom(ordered: &[&EntryFacts], symptom: SymptomKey) -> Option<ComputedInsight> {
    let occurrences: Vec<&&EntryFacts> = ordered
        .iter()
        .filter(|e| e.symptoms.contains(&symptom))
        .collect();
    if occurrences.len() < RECURRENCE_MIN_COUNT {
        return None;
    }

    // Walk backwards from the latest occurrence, extending the window while
    // it stays inside the day limit.
    let window_end_entry = *occurrences.last().expect("non-empty occurrences");
    let mut window: Vec<&&EntryFacts> = Vec::new();
    for occurrence in occurrences.iter().rev().copied() {
        let span = window_end_entry
            .created_at
            .signed_duration_since(occurrence.created_at)
            .num_days();
        if span <= RECURRENCE_WINDOW_DAYS {
            window.push(occurrence);
        } else {
            break;
        }
    }
    window.reverse();
    if window.len() < RECURRENCE_MIN_COUNT {
        return None;
    }

    let window_start = window.first().expect("non-empty window").created_at;
    let window_end = window_end_entry.created_at;
    let day_span = window_end.signed_duration_since(window_start).num_days().max(0) as u32;
    let occurrence_count = window.len() as u32;

    let co_occurrences = co_occurrences(&window, symptom);
    let suggestions = suggestions(symptom, &co_occurrences);
    let connection = connection_text(symptom, &co_occurrences);

    Some(ComputedInsight {
        symptom_key: symptom,
        window_start,
        window_end,
        occurrence_count,
        day_span,
        insight: format!(
            "{} showed up {} times across {} days.",
            capitalize(symptom.label()),
            occurrence_count,
            day_span.max(1)
        ),
        connection,
        suggestions,
        source_entry_ids: window.iter().map(|e| e.entry_id).collect(),
        co_occurrences,
    })
}

/// Correlation of the target symptom against every other fact seen in its
/// window: (entries containing both) / (entries containing the symptom).
/// The symptom itself never appears in its own list.
fn co_occurrences(window: &[&&EntryFacts], symptom: SymptomKey) -> Vec<CoOccurrence> {
    let total = window.len() as f64;
    let mut keys: Vec<CoOccurrenceKey> = Vec::new();
    for entry in window {
        for other in &entry.symptoms {
            if *other != symptom {
                push_unique(&mut keys, CoOccurrenceKey::Symptom(*other));
            }
        }
        for code in &entry.factor_codes {
            if !SYMPTOM_DERIVED_CODES.contains(code) {
                push_unique(&mut keys, CoOccurrenceKey::Factor(*code));
            }
        }
    }

    let mut out: Vec<CoOccurrence> = keys
        .into_iter()
        .map(|key| {
            let count = window
                .iter()
                .filter(|entry| match key {
                    CoOccurrenceKey::Symptom(s) => entry.symptoms.contains(&s),
                    CoOccurrenceKey::Factor(c) => entry.factor_codes.contains(&c),
                })
                .count() as u32;
            let correlation = (count as f64 / total).clamp(0.0, 1.0);
            CoOccurrence {
                factor_key: key,
                co_occurrence_count: count,
                correlation,
                band: CorrelationBand::from_correlation(correlation),
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.correlation
            .total_cmp(&a.correlation)
            .then(b.co_occurrence_count.cmp(&a.co_occurrence_count))
    });
    out
}

fn push_unique(keys: &mut Vec<CoOccurrenceKey>, key: CoOccurrenceKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

/// Symptom template plus templates for the top two strong co-occurrences,
/// deduplicated, capped, always ending with professional consultation.
fn suggestions(symptom: SymptomKey, co_occurrences: &[CoOccurrence]) -> Vec<String> {
    let mut out: Vec<String> = vec![symptom_suggestion(symptom).to_string()];
    for co in co_occurrences
        .iter()
        .filter(|c| c.band == CorrelationBand::Strong)
        .take(2)
    {
        let suggestion = co_suggestion(symptom, co.factor_key);
        if !out.contains(&suggestion) {
            out.push(suggestion);
        }
    }
    out.truncate(SUGGESTION_CAP - 1);
    out.push(PROFESSIONAL_SUGGESTION.to_string());
    out
}

pub const SUGGESTION_CAP: usize = 4;

const PROFESSIONAL_SUGGESTION: &str =
    "If this pattern continues, bring it to a GP or clinician you trust.";

fn symptom_suggestion(symptom: SymptomKey) -> &'static str {
    match symptom {
        SymptomKey::Headache => "Note what the hours before a headache looked like.",
        SymptomKey::Fatigue => "Protect one early night this week.",
        SymptomKey::Pain => "Note when the pain is at its worst.",
        SymptomKey::Breathing => "Note what you were doing when breathing got harder.",
        SymptomKey::Digestive => "A simple food note alongside symptoms can reveal triggers.",
        SymptomKey::PoorSleep => "Keep the hour before bed screen-free.",
        SymptomKey::LowMood => "One small pleasant activity a day counts.",
        SymptomKey::Anxiety => "Try a 2-minute breathing exercise when it spikes.",
    }
}

fn co_suggestion(symptom: SymptomKey, key: CoOccurrenceKey) -> String {
    let co_label = co_key_label(key);
    format!(
        "{} and {} keep appearing together — tracking them side by side may show which leads.",
        capitalize(symptom.label()),
        co_label
    )
}

fn connection_text(symptom: SymptomKey, co_occurrences: &[CoOccurrence]) -> String {
    match co_occurrences.iter().find(|c| c.band == CorrelationBand::Strong) {
        Some(strongest) => format!(
            "{} tended to come alongside {}.",
            capitalize(symptom.label()),
            co_key_label(strongest.factor_key)
        ),
        None => format!(
            "No single companion stands out for {} yet.",
            symptom.label()
        ),
    }
}

fn co_key_label(key: CoOccurrenceKey) -> &'static str {
    match key {
        CoOccurrenceKey::Symptom(s) => s.label(),
        CoOccurrenceKey::Factor(c) => c.label(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Canonical recurrence signal for one symptom, used by the response selector.
pub fn recurrence_for(entries: &[EntryFacts], symptom: SymptomKey) -> Recurrence {
    let mut times: Vec<DateTime<Utc>> = entries
        .iter()
        .filter(|e| e.symptoms.contains(&symptom))
        .map(|e| e.created_at)
        .collect();
    times.sort();
    if times.len() >= RECURRENCE_MIN_COUNT {
        let last = *times.last().expect("non-empty times");
        let in_window = times
            .iter()
            .filter(|t| last.signed_duration_since(**t).num_days() <= RECURRENCE_WINDOW_DAYS)
            .count();
        if in_window >= RECURRENCE_MIN_COUNT {
            return Recurrence::Frequent;
        }
    }
    if times.is_empty() {
        Recurrence::None
    } else {
        Recurrence::Occasional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn facts(
        days_ago: i64,
        symptoms: &[SymptomKey],
        codes: &[FactorCode],
        now: DateTime<Utc>,
    ) -> EntryFacts {
        EntryFacts {
            entry_id: Uuid::now_v7(),
            created_at: now - Duration::days(days_ago),
            symptoms: symptoms.to_vec(),
            factor_codes: codes.to_vec(),
        }
    }

    #[test]
    fn three_occurrences_in_fourteen_days_are_significant() {
        let now = Utc::now();
        let entries = vec![
            facts(10, &[SymptomKey::Headache], &[], now),
            facts(5, &[SymptomKey::Headache], &[], now),
            facts(1, &[SymptomKey::Headache], &[], now),
        ];
        let insights = detect(&entries, now).unwrap();
        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.symptom_key, SymptomKey::Headache);
        assert_eq!(insight.occurrence_count, 3);
        assert!(insight.day_span <= 14);
        assert_eq!(insight.source_entry_ids.len(), 3);
    }

    #[test]
    fn sparse_occurrences_do_not_qualify() {
        let now = Utc::now();
        let entries = vec![
            facts(40, &[SymptomKey::Headache], &[], now),
            facts(25, &[SymptomKey::Headache], &[], now),
            facts(1, &[SymptomKey::Headache], &[], now),
        ];
        let insights = detect(&entries, now).unwrap();
        assert!(insights.is_empty());
    }

    #[test]
    fn dense_recent_cluster_qualifies_despite_old_history() {
        let now = Utc::now();
        let entries = vec![
            facts(60, &[SymptomKey::Headache], &[], now),
            facts(9, &[SymptomKey::Headache], &[], now),
            facts(4, &[SymptomKey::Headache], &[], now),
            facts(1, &[SymptomKey::Headache], &[], now),
        ];
        let insights = detect(&entries, now).unwrap();
        assert_eq!(insights.len(), 1);
        // Only the dense window counts, not the 60-day-old outlier.
        assert_eq!(insights[0].occurrence_count, 3);
    }

    #[test]
    fn correlations_stay_in_range_and_exclude_the_symptom_itself() {
        let now = Utc::now();
        let entries = vec![
            facts(6, &[SymptomKey::Headache, SymptomKey::PoorSleep], &[FactorCode::LowEnergy], now),
            facts(4, &[SymptomKey::Headache, SymptomKey::PoorSleep], &[], now),
            facts(2, &[SymptomKey::Headache], &[FactorCode::LowEnergy], now),
        ];
        let insights = detect(&entries, now).unwrap();
        let headache = insights
            .iter()
            .find(|i| i.symptom_key == SymptomKey::Headache)
            .unwrap();
        for co in &headache.co_occurrences {
            assert!((0.0..=1.0).contains(&co.correlation));
            assert_ne!(co.factor_key, CoOccurrenceKey::Symptom(SymptomKey::Headache));
        }
        let sleep = headache
            .co_occurrences
            .iter()
            .find(|c| c.factor_key == CoOccurrenceKey::Symptom(SymptomKey::PoorSleep))
            .unwrap();
        assert_eq!(sleep.co_occurrence_count, 2);
        assert!((sleep.correlation - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(sleep.band, CorrelationBand::Strong);
    }

    #[test]
    fn suggestions_are_capped_and_end_with_professional_consultation() {
        let now = Utc::now();
        let entries = vec![
            facts(
                6,
                &[SymptomKey::Headache, SymptomKey::PoorSleep, SymptomKey::Fatigue],
                &[FactorCode::LowEnergy, FactorCode::TimeScarcity],
                now,
            ),
            facts(
                4,
                &[SymptomKey::Headache, SymptomKey::PoorSleep, SymptomKey::Fatigue],
                &[FactorCode::LowEnergy, FactorCode::TimeScarcity],
                now,
            ),
            facts(
                2,
                &[SymptomKey::Headache, SymptomKey::PoorSleep, SymptomKey::Fatigue],
                &[FactorCode::LowEnergy, FactorCode::TimeScarcity],
                now,
            ),
        ];
        let insights = detect(&entries, now).unwrap();
        let headache = insights
            .iter()
            .find(|i| i.symptom_key == SymptomKey::Headache)
            .unwrap();
        assert!(headache.suggestions.len() <= SUGGESTION_CAP);
        assert_eq!(
            headache.suggestions.last().map(String::as_str),
            Some(PROFESSIONAL_SUGGESTION)
        );
        let mut deduped = headache.suggestions.clone();
        deduped.dedup();
        assert_eq!(deduped, headache.suggestions);
    }

    #[test]
    fn future_timestamps_are_a_corrupt_window() {
        let now = Utc::now();
        let mut entries = vec![
            facts(5, &[SymptomKey::Headache], &[], now),
            facts(3, &[SymptomKey::Headache], &[], now),
            facts(1, &[SymptomKey::Headache], &[], now),
        ];
        entries.push(EntryFacts {
            entry_id: Uuid::now_v7(),
            created_at: now + Duration::days(2),
            symptoms: vec![SymptomKey::Headache],
            factor_codes: Vec::new(),
        });
        assert!(detect(&entries, now).is_err());
    }

    #[test]
    fn recompute_is_idempotent_over_the_same_entry_set() {
        let now = Utc::now();
        let entries = vec![
            facts(6, &[SymptomKey::Anxiety], &[FactorCode::TimeScarcity], now),
            facts(3, &[SymptomKey::Anxiety], &[FactorCode::TimeScarcity], now),
            facts(1, &[SymptomKey::Anxiety], &[], now),
        ];
        let first = detect(&entries, now).unwrap();
        let second = detect(&entries, now).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.symptom_key, b.symptom_key);
            assert_eq!(a.occurrence_count, b.occurrence_count);
            assert_eq!(a.insight, b.insight);
            assert_eq!(a.suggestions, b.suggestions);
            assert_eq!(a.source_entry_ids, b.source_entry_ids);
        }
    }

    #[test]
    fn recurrence_rule_matches_detector_significance() {
        let now = Utc::now();
        let frequent = vec![
            facts(10, &[SymptomKey::Headache], &[], now),
            facts(5, &[SymptomKey::Headache], &[], now),
            facts(1, &[SymptomKey::Headache], &[], now),
        ];
        assert_eq!(recurrence_for(&frequent, SymptomKey::Headache), Recurrence::Frequent);

        let occasional = vec![facts(3, &[SymptomKey::Headache], &[], now)];
        assert_eq!(
            recurrence_for(&occasional, SymptomKey::Headache),
            Recurrence::Occasional
        );
        assert_eq!(recurrence_for(&occasional, SymptomKey::Pain), Recurrence::None);
    }
}

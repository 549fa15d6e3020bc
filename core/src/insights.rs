use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::factors::{FactorCode, SymptomKey};

/// Correlation strength bucket for a co-occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationBand {
    Strong,
    Moderate,
    Weak,
}

impl CorrelationBand {
    /// strong ≥ 0.6, moderate [0.4, 0.6), weak < 0.4
    pub fn from_correlation(correlation: f64) -> Self {
        if correlation >= 0.6 {
            CorrelationBand::Strong
        } else if correlation >= 0.4 {
            CorrelationBand::Moderate
        } else {
            CorrelationBand::Weak
        }
    }
}

/// What a symptom co-occurred with: a committed factor or another symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum CoOccurrenceKey {
    Factor(FactorCode),
    Symptom(SymptomKey),
}

/// The fraction of a symptom's occurrences that coincide with another factor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoOccurrence {
    pub factor_key: CoOccurrenceKey,
    pub co_occurrence_count: u32,
    /// (entries containing both) / (entries containing the symptom), in [0, 1]
    pub correlation: f64,
    pub band: CorrelationBand,
}

/// A time-windowed, recurrence-based observation linking a symptom to
/// co-occurring factors. Produced by the recompute job; never hard-deleted,
/// only flagged dismissed. Everything except `dismissed`/`bookmarked` is
/// reproducible from the same entry set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatternInsight {
    pub id: Uuid,
    pub user_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub symptom_key: SymptomKey,
    pub occurrence_count: u32,
    /// Days between first and last occurrence in the window
    pub day_span: u32,
    pub co_occurrences: Vec<CoOccurrence>,
    /// What was noticed
    pub insight: String,
    /// The suggested link between symptom and co-occurring factors
    pub connection: String,
    /// At most 4; the last is always a professional-consultation suggestion
    pub suggestions: Vec<String>,
    pub dismissed: bool,
    pub bookmarked: bool,
    pub source_entry_ids: Vec<Uuid>,
    pub computed_at: DateTime<Utc>,
}

impl PatternInsight {
    /// Visible while significant, recent (last occurrence within 7 days of
    /// `now`), and not dismissed.
    pub fn should_show(&self, now: DateTime<Utc>) -> bool {
        let recent = now.signed_duration_since(self.window_end).num_days() <= 7;
        let significant = self.occurrence_count >= 3 && self.day_span <= 14;
        significant && recent && !self.dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn insight(now: DateTime<Utc>, end_days_ago: i64, count: u32, span: u32) -> PatternInsight {
        PatternInsight {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            window_start: now - Duration::days(end_days_ago + span as i64),
            window_end: now - Duration::days(end_days_ago),
            symptom_key: SymptomKey::Headache,
            occurrence_count: count,
            day_span: span,
            co_occurrences: Vec::new(),
            insight: String::new(),
            connection: String::new(),
            suggestions: Vec::new(),
            dismissed: false,
            bookmarked: false,
            source_entry_ids: Vec::new(),
            computed_at: now,
        }
    }

    #[test]
    fn correlation_bands_split_at_published_thresholds() {
        assert_eq!(CorrelationBand::from_correlation(0.6), CorrelationBand::Strong);
        assert_eq!(CorrelationBand::from_correlation(0.59), CorrelationBand::Moderate);
        assert_eq!(CorrelationBand::from_correlation(0.4), CorrelationBand::Moderate);
        assert_eq!(CorrelationBand::from_correlation(0.39), CorrelationBand::Weak);
        assert_eq!(CorrelationBand::from_correlation(0.0), CorrelationBand::Weak);
        assert_eq!(CorrelationBand::from_correlation(1.0), CorrelationBand::Strong);
    }

    #[test]
    fn should_show_requires_significance_and_recency() {
        let now = Utc::now();
        assert!(insight(now, 3, 3, 10).should_show(now));
        // Too few occurrences
        assert!(!insight(now, 3, 2, 10).should_show(now));
        // Spread over too many days
        assert!(!insight(now, 3, 4, 20).should_show(now));
        // Stale: more than 7 days past the window end, thresholds still met
        assert!(!insight(now, 8, 5, 10).should_show(now));
    }

    #[test]
    fn dismissed_insights_never_show() {
        let now = Utc::now();
        let mut i = insight(now, 1, 5, 7);
        assert!(i.should_show(now));
        i.dismissed = true;
        assert!(!i.should_show(now));
    }
}

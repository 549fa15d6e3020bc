use compass_core::response::RiskFlag;
use regex::Regex;

/// Result of the local safety scan for one text.
#[derive(Debug, Clone, Default)]
pub struct SafetyCheck {
    pub flags: Vec<RiskFlag>,
    /// The phrases that fired, for audit logs (never shown to the user)
    pub matched: Vec<String>,
}

impl SafetyCheck {
    pub fn triggered(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Local, synchronous crisis-language matcher.
///
/// Runs before and independent of any oracle call, and its result is
/// re-checked at every later stage — no single layer is trusted alone.
/// Patterns err toward matching: a false escalation costs a gentler screen,
/// a miss costs far more.
pub struct SafetyMatcher {
    patterns: Vec<(Regex, RiskFlag)>,
}

const SELF_HARM_PATTERNS: &[&str] = &[
    r"(?i)\bhurt(ing)? myself\b",
    r"(?i)\bkill(ing)? myself\b",
    r"(?i)\bsuicid",
    r"(?i)\bend (my life|it all)\b",
    r"(?i)\bself[- ]harm",
    r"(?i)\bwant(ed)? to die\b",
    r"(?i)\bno reason to (live|go on)\b",
    r"(?i)\bbetter off dead\b",
    r"(?i)\boverdos",
];

const HARM_TO_OTHERS_PATTERNS: &[&str] = &[
    r"(?i)\bhurt (him|her|them|someone|somebody|people)\b",
    r"(?i)\bkill (him|her|them|someone|somebody|people)\b",
    r"(?i)\bgoing to hurt\b",
    r"(?i)\bwant(ed)? to hurt\b",
];

const IMMINENT_DANGER_PATTERNS: &[&str] = &[
    r"(?i)\bcan.?t breathe?\b",
    r"(?i)\bcannot breathe?\b",
    r"(?i)\bchest (hurts|pain|tight)",
    r"(?i)\bpassing out\b",
    r"(?i)\bunconscious\b",
    r"(?i)\bbleeding (badly|a lot|won.?t stop)\b",
    r"(?i)\bheart attack\b",
    r"(?i)\bstroke\b",
    r"(?i)\banaphyla",
    r"(?i)\bnot safe (here|at home|right now)\b",
];

impl SafetyMatcher {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        for raw in SELF_HARM_PATTERNS {
            patterns.push((compile(raw), RiskFlag::SelfHarm));
        }
        for raw in HARM_TO_OTHERS_PATTERNS {
            patterns.push((compile(raw), RiskFlag::HarmToOthers));
        }
        for raw in IMMINENT_DANGER_PATTERNS {
            patterns.push((compile(raw), RiskFlag::ImminentDanger));
        }
        Self { patterns }
    }

    /// Scan text plus an upstream risk flag. The upstream flag alone is
    /// enough to trigger: a client-side screen that fired is never ignored.
    pub fn scan(&self, text: &str, upstream_risk: bool) -> SafetyCheck {
        let mut check = SafetyCheck::default();
        for (pattern, flag) in &self.patterns {
            if let Some(found) = pattern.find(text) {
                if !check.flags.contains(flag) {
                    check.flags.push(*flag);
                }
                check.matched.push(found.as_str().to_string());
            }
        }
        if upstream_risk && check.flags.is_empty() {
            check.flags.push(RiskFlag::ImminentDanger);
            check.matched.push("upstream_risk_flag".to_string());
        }
        if check.triggered() {
            tracing::warn!(
                flags = ?check.flags,
                "safety matcher triggered, overriding classification"
            );
        }
        check
    }
}

impl Default for SafetyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(raw: &str) -> Regex {
    // Patterns are compile-time constants; an invalid one is a programmer
    // error caught by the exhaustive test below.
    Regex::new(raw).unwrap_or_else(|e| panic!("invalid safety pattern {raw}: {e}"))
}

/// Copy shown alongside a safety escalation. Deliberately plain; the
/// presentation layer localizes and attaches region-specific crisis lines.
pub fn safety_copy(flags: &[RiskFlag]) -> String {
    if flags.contains(&RiskFlag::ImminentDanger) {
        "What you're describing could need urgent help. If this is happening right now, \
         please call emergency services or go to the nearest emergency department."
            .to_string()
    } else if flags.contains(&RiskFlag::HarmToOthers) {
        "It sounds like things have reached a dangerous point. Please reach out to a crisis \
         line or emergency services now — talking to someone immediately matters more than \
         anything else on this screen."
            .to_string()
    } else {
        "It sounds like you're carrying something really heavy right now. You don't have to \
         manage this alone — a crisis line or emergency services can help immediately, and \
         they're available around the clock."
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        let matcher = SafetyMatcher::new();
        assert_eq!(
            matcher.patterns.len(),
            SELF_HARM_PATTERNS.len() + HARM_TO_OTHERS_PATTERNS.len() + IMMINENT_DANGER_PATTERNS.len()
        );
    }

    #[test]
    fn detects_self_harm_language() {
        let matcher = SafetyMatcher::new();
        let check = matcher.scan("I keep thinking about hurting myself", false);
        assert!(check.triggered());
        assert!(check.flags.contains(&RiskFlag::SelfHarm));
    }

    #[test]
    fn detects_imminent_danger_language() {
        let matcher = SafetyMatcher::new();
        let check = matcher.scan("can't breathe, chest hurts", false);
        assert!(check.triggered());
        assert!(check.flags.contains(&RiskFlag::ImminentDanger));
    }

    #[test]
    fn upstream_flag_triggers_without_text_match() {
        let matcher = SafetyMatcher::new();
        let check = matcher.scan("feeling okay today", true);
        assert!(check.triggered());
        assert_eq!(check.flags, vec![RiskFlag::ImminentDanger]);
    }

    #[test]
    fn benign_text_does_not_trigger() {
        let matcher = SafetyMatcher::new();
        let check = matcher.scan("slept badly and my head aches a bit", false);
        assert!(!check.triggered());
        assert!(check.flags.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = SafetyMatcher::new();
        assert!(matcher.scan("I WANT TO DIE", false).triggered());
    }

    #[test]
    fn safety_copy_prioritizes_imminent_danger() {
        let copy = safety_copy(&[RiskFlag::SelfHarm, RiskFlag::ImminentDanger]);
        assert!(copy.contains("emergency"));
    }
}

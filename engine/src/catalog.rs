use compass_core::domains::Domain;

/// One entry in the static nudge catalog. Content is editorial and maintained
/// outside the core; the engine only reads it.
#[derive(Debug, Clone, Copy)]
pub struct Nudge {
    pub domain: Domain,
    pub title: &'static str,
    pub description: &'static str,
}

/// Read-only keyed lookup over the nudge catalog. Every nudge here is
/// deliberately low-effort: the catalog is consulted exactly when capacity
/// is in question.
pub struct NudgeCatalog;

const NUDGES: &[Nudge] = &[
    Nudge {
        domain: Domain::SymptomsBodySignals,
        title: "Jot down when it happens",
        description: "A quick note each time the symptom shows up makes the pattern visible.",
    },
    Nudge {
        domain: Domain::SymptomsBodySignals,
        title: "Drink a glass of water",
        description: "Small sips throughout the day add up.",
    },
    Nudge {
        domain: Domain::MedicalContext,
        title: "Write down your top question",
        description: "One written question makes the next appointment count.",
    },
    Nudge {
        domain: Domain::MentalEmotionalState,
        title: "Try a 2-minute breathing exercise",
        description: "Deep breaths calm the nervous system.",
    },
    Nudge {
        domain: Domain::MentalEmotionalState,
        title: "Check in with how you're feeling",
        description: "Noticing your mood is the first step.",
    },
    Nudge {
        domain: Domain::DurationPattern,
        title: "Note roughly when this started",
        description: "Even an approximate date helps make sense of a pattern.",
    },
    Nudge {
        domain: Domain::CapacityEnergy,
        title: "Step outside for natural light",
        description: "Daylight helps regulate your energy.",
    },
    Nudge {
        domain: Domain::CapacityEnergy,
        title: "Wind down 30 minutes earlier",
        description: "A consistent bedtime improves sleep quality.",
    },
    Nudge {
        domain: Domain::AccessToCare,
        title: "Ask about telehealth when you call",
        description: "A phone or video appointment can skip the waitlist.",
    },
    Nudge {
        domain: Domain::SocialSupportContext,
        title: "Send one message to someone you trust",
        description: "You don't need the full story ready — one line is enough to start.",
    },
    Nudge {
        domain: Domain::ResourcesConstraints,
        title: "Name the one cost that worries you most",
        description: "Bulk-billed and community options exist for more than people expect.",
    },
    Nudge {
        domain: Domain::KnowledgeBeliefsPreferences,
        title: "Write the question in your own words",
        description: "Plain words make it easier to ask, and easier to answer.",
    },
    Nudge {
        domain: Domain::GoalsIntent,
        title: "Pick the smallest version of the goal",
        description: "Incremental changes work best.",
    },
];

impl NudgeCatalog {
    pub fn new() -> Self {
        Self
    }

    /// All nudges for a domain, catalog order.
    pub fn for_domain(&self, domain: Domain) -> Vec<&'static Nudge> {
        NUDGES.iter().filter(|n| n.domain == domain).collect()
    }

    /// First catalog match for the domain. Domains without their own entries
    /// fall back to the top of the catalog so a next step is always available.
    pub fn next_step(&self, domain: Domain) -> &'static Nudge {
        NUDGES
            .iter()
            .find(|n| n.domain == domain)
            .unwrap_or_else(|| &NUDGES[0])
    }
}

impl Default for NudgeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_nudge_domain_resolves() {
        let catalog = NudgeCatalog::new();
        for nudge in NUDGES {
            assert!(!catalog.for_domain(nudge.domain).is_empty());
        }
    }

    #[test]
    fn next_step_always_returns_something() {
        let catalog = NudgeCatalog::new();
        for domain in Domain::ALL {
            let nudge = catalog.next_step(domain);
            assert!(!nudge.title.is_empty());
        }
    }
}

//! Periodic memory hygiene.
//!
//! The reasoner calls [`Housekeeper::run`] every `hygiene_interval_tasks`
//! finished tasks.  Nothing here runs implicitly during dispatch; the sweep
//! is an explicit, counted step that reports what it removed.

use tracing::info;

use reagent_config::MemoryConfig;

use crate::store::MemoryStores;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub pruned_experiences: usize,
    pub pruned_lessons: usize,
    pub pruned_strategies: usize,
    pub pruned_facts: usize,
    pub pruned_errors: usize,
}

impl SweepReport {
    pub fn total_removed(&self) -> usize {
        self.expired
            + self.pruned_experiences
            + self.pruned_lessons
            + self.pruned_strategies
            + self.pruned_facts
            + self.pruned_errors
    }
}

pub struct Housekeeper;

impl Housekeeper {
    /// Age out old unsuccessful records, then enforce per-collection size
    /// caps (oldest first).  Facts have no age limit — they are durable user
    /// statements — but they are still size-capped.
    pub fn run(stores: &MemoryStores, config: &MemoryConfig) -> SweepReport {
        let mut report = SweepReport::default();

        for collection in [&stores.experiences, &stores.lessons, &stores.strategies, &stores.errors]
        {
            report.expired += collection.cleanup_old(config.max_age_days, true);
        }

        report.pruned_experiences = stores.experiences.limit_size(config.max_experiences);
        report.pruned_lessons = stores.lessons.limit_size(config.max_lessons);
        report.pruned_strategies = stores.strategies.limit_size(config.max_strategies);
        report.pruned_facts = stores.facts.limit_size(config.max_facts);
        report.pruned_errors = stores.errors.limit_size(config.max_errors);

        info!(
            expired = report.expired,
            pruned_experiences = report.pruned_experiences,
            pruned_lessons = report.pruned_lessons,
            pruned_strategies = report.pruned_strategies,
            pruned_facts = report.pruned_facts,
            pruned_errors = report.pruned_errors,
            "memory hygiene sweep complete"
        );
        report
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

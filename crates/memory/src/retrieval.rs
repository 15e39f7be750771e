//! Context retrieval for a new task.
//!
//! Produces a typed bundle — the full rule set plus the top-k semantically
//! similar records from each collection — and renders it as one stable,
//! labeled block for system-prompt injection.  When the similarity backend
//! has nothing (or is absent), the semantic sections come back empty while
//! rules are always returned in full.

use crate::rules::RuleEngine;
use crate::schema::{MetaValue, Rule, StoredRecord};
use crate::store::MemoryStores;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalLimits {
    pub facts: usize,
    pub experiences: usize,
    pub lessons: usize,
    pub strategies: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            facts: 5,
            experiences: 3,
            lessons: 3,
            strategies: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub rules: Vec<Rule>,
    pub facts: Vec<StoredRecord>,
    pub experiences: Vec<StoredRecord>,
    pub lessons: Vec<StoredRecord>,
    pub strategies: Vec<StoredRecord>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && self.facts.is_empty()
            && self.experiences.is_empty()
            && self.lessons.is_empty()
            && self.strategies.is_empty()
    }
}

pub struct Retriever {
    limits: RetrievalLimits,
}

impl Retriever {
    pub fn new(limits: RetrievalLimits) -> Self {
        Self { limits }
    }

    pub fn for_task(&self, task: &str, rules: &RuleEngine, stores: &MemoryStores) -> ContextBundle {
        let take = |hits: Vec<(StoredRecord, f32)>| -> Vec<StoredRecord> {
            hits.into_iter().map(|(record, _)| record).collect()
        };
        ContextBundle {
            rules: rules.all(),
            facts: take(stores.facts.query(task, self.limits.facts)),
            experiences: take(stores.experiences.query(task, self.limits.experiences)),
            lessons: take(stores.lessons.query(task, self.limits.lessons)),
            strategies: take(stores.strategies.query(task, self.limits.strategies)),
        }
    }

    /// Render the bundle as a labeled block.  Sections appear only when
    /// non-empty; ordering and labels are stable so prompts stay cacheable.
    pub fn render(&self, bundle: &ContextBundle) -> String {
        if bundle.is_empty() {
            return String::new();
        }

        let mut out = String::from("MEMORY CONTEXT:\n");

        if !bundle.rules.is_empty() {
            out.push_str("STANDING RULES:\n");
            for rule in &bundle.rules {
                out.push_str(&format!(
                    "- when input {} \"{}\": respond \"{}\"\n",
                    match rule.trigger_kind {
                        crate::schema::TriggerKind::Exact => "equals",
                        crate::schema::TriggerKind::Contains => "contains",
                        crate::schema::TriggerKind::Regex => "matches",
                    },
                    rule.trigger,
                    rule.response
                ));
            }
        }

        render_section(&mut out, "KNOWN FACTS:", &bundle.facts, |record| {
            record.document.clone()
        });
        render_section(&mut out, "PAST EXPERIENCES:", &bundle.experiences, |record| {
            let tag = if record.is_successful() { "ok" } else { "failed" };
            format!("[{tag}] {}", record.document)
        });
        render_section(&mut out, "LESSONS:", &bundle.lessons, |record| {
            record.document.clone()
        });
        render_section(&mut out, "STRATEGIES:", &bundle.strategies, |record| {
            let rate = record
                .metadata
                .get("success_rate")
                .and_then(MetaValue::as_num)
                .unwrap_or(0.0);
            format!("{} (success rate {:.0}%)", record.document, rate * 100.0)
        });

        out.trim_end().to_string()
    }
}

fn render_section<F>(out: &mut String, label: &str, records: &[StoredRecord], line: F)
where
    F: Fn(&StoredRecord) -> String,
{
    if records.is_empty() {
        return;
    }
    out.push_str(label);
    out.push('\n');
    for record in records {
        out.push_str("- ");
        out.push_str(&line(record));
        out.push('\n');
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Fact, Metadata, StoredRecord, TriggerKind};

    fn retriever() -> Retriever {
        Retriever::new(RetrievalLimits::default())
    }

    #[test]
    fn rules_always_returned_in_full() {
        let rules = RuleEngine::ephemeral();
        rules.add("cekrek", TriggerKind::Contains, "memori terbaca", 0).unwrap();
        rules.add("ping", TriggerKind::Exact, "pong", 0).unwrap();
        let stores = MemoryStores::ephemeral();

        let bundle = retriever().for_task("unrelated task text", &rules, &stores);
        assert_eq!(bundle.rules.len(), 2);
        assert!(bundle.facts.is_empty());
    }

    #[test]
    fn fact_is_retrieved_and_rendered() {
        let rules = RuleEngine::ephemeral();
        let stores = MemoryStores::ephemeral();
        let fact = Fact::new("User's name is Budi", "name", "Budi");
        stores.facts.upsert(fact.to_record("Nama saya Budi"));

        let bundle = retriever().for_task("Siapa nama saya?", &rules, &stores);
        assert_eq!(bundle.facts.len(), 1);

        let rendered = retriever().render(&bundle);
        assert!(rendered.contains("KNOWN FACTS:"));
        assert!(rendered.contains("User's name is Budi"));
    }

    #[test]
    fn empty_bundle_renders_empty() {
        let bundle = ContextBundle::default();
        assert_eq!(retriever().render(&bundle), "");
    }

    #[test]
    fn sections_appear_only_when_non_empty() {
        let rules = RuleEngine::ephemeral();
        rules.add("x", TriggerKind::Contains, "y", 0).unwrap();
        let stores = MemoryStores::ephemeral();

        let bundle = retriever().for_task("anything", &rules, &stores);
        let rendered = retriever().render(&bundle);
        assert!(rendered.contains("STANDING RULES:"));
        assert!(!rendered.contains("KNOWN FACTS:"));
        assert!(!rendered.contains("PAST EXPERIENCES:"));
    }

    #[test]
    fn experience_lines_carry_outcome_tag() {
        let rules = RuleEngine::ephemeral();
        let stores = MemoryStores::ephemeral();
        let mut record = StoredRecord::new("e1", "deploy service => rollback needed", Metadata::new());
        record.metadata.insert("success".into(), false.into());
        stores.experiences.upsert(record);

        let bundle = retriever().for_task("deploy the service again", &rules, &stores);
        let rendered = retriever().render(&bundle);
        assert!(rendered.contains("[failed] deploy service => rollback needed"));
    }
}

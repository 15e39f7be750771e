//! Deterministic trigger→response rules, checked before any LLM call.
//!
//! Matching is evaluated solely on the raw user input.  Rules are ordered by
//! `(priority desc, created_at desc)` and the first match wins; duplicate
//! triggers are allowed, the ordering keeps lookups deterministic.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use reagent_core::AgentError;

use crate::schema::{Rule, TriggerKind};

/// The persisted shape: one keyed list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleFile {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: String,
    pub response: String,
}

pub struct RuleEngine {
    path: Option<PathBuf>,
    rules: Mutex<Vec<Rule>>,
}

impl RuleEngine {
    /// Open the rule list at `<data_dir>/rules.json`.  An absent or corrupt
    /// file starts empty.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join("rules.json");
        let rules = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RuleFile>(&raw) {
                Ok(file) => file.rules,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "corrupt rule file — starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path: Some(path),
            rules: Mutex::new(rules),
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            path: None,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Add a rule.  Regex triggers are compiled here so an invalid pattern is
    /// rejected at add time rather than at match time.
    pub fn add(
        &self,
        trigger: impl Into<String>,
        trigger_kind: TriggerKind,
        response: impl Into<String>,
        priority: i32,
    ) -> Result<String, AgentError> {
        let trigger = trigger.into();
        if trigger.trim().is_empty() {
            return Err(AgentError::validation("rule trigger must not be empty"));
        }
        if trigger_kind == TriggerKind::Regex {
            compile_trigger(&trigger)?;
        }

        let rule = Rule {
            id: Uuid::new_v4().to_string(),
            trigger,
            trigger_kind,
            response: response.into(),
            priority,
            created_at: Utc::now(),
        };
        let id = rule.id.clone();

        let mut rules = self.rules.lock().expect("rule mutex poisoned");
        rules.push(rule);
        self.persist(&rules);
        debug!(rule_id = %id, "rule added");
        Ok(id)
    }

    pub fn remove(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.lock().expect("rule mutex poisoned");
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        let removed = rules.len() < before;
        if removed {
            self.persist(&rules);
        }
        removed
    }

    /// Highest-priority (then most recent) matching rule for `input`, or
    /// `None`.  Rules that fail to compile at match time (only possible if
    /// the persisted file was edited by hand) are skipped.
    pub fn match_input(&self, input: &str) -> Option<RuleMatch> {
        let rules = self.rules.lock().expect("rule mutex poisoned");
        let mut ordered: Vec<&Rule> = rules.iter().collect();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });

        for rule in ordered {
            let hit = match rule.trigger_kind {
                TriggerKind::Exact => input.trim().eq_ignore_ascii_case(rule.trigger.trim()),
                TriggerKind::Contains => input
                    .to_lowercase()
                    .contains(&rule.trigger.to_lowercase()),
                TriggerKind::Regex => match compile_trigger(&rule.trigger) {
                    Ok(re) => re.is_match(input),
                    Err(_) => {
                        warn!(rule_id = %rule.id, "skipping rule with invalid persisted regex");
                        false
                    }
                },
            };
            if hit {
                return Some(RuleMatch {
                    rule_id: rule.id.clone(),
                    response: rule.response.clone(),
                });
            }
        }
        None
    }

    pub fn all(&self) -> Vec<Rule> {
        self.rules.lock().expect("rule mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.rules.lock().expect("rule mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic rewrite of the rule file on every mutation.
    fn persist(&self, rules: &[Rule]) {
        let Some(path) = &self.path else { return };
        let file = RuleFile {
            rules: rules.to_vec(),
        };
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp_path = path.with_extension("json.tmp");
            fs::write(&tmp_path, serde_json::to_vec_pretty(&file)?)?;
            if let Err(err) = fs::rename(&tmp_path, path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(err.into());
            }
            Ok(())
        })();
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to persist rules");
        }
    }
}

fn compile_trigger(pattern: &str) -> Result<regex::Regex, AgentError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|err| {
            AgentError::validation(format!("invalid rule regex: {err}"))
                .with_detail("pattern", pattern)
        })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_match_is_case_insensitive() {
        let engine = RuleEngine::ephemeral();
        engine
            .add("cekrek", TriggerKind::Contains, "memori terbaca", 0)
            .unwrap();

        let hit = engine.match_input("CekRek").unwrap();
        assert_eq!(hit.response, "memori terbaca");
        assert!(engine.match_input("something else").is_none());
    }

    #[test]
    fn exact_ignores_surrounding_whitespace() {
        let engine = RuleEngine::ephemeral();
        engine.add("ping", TriggerKind::Exact, "pong", 0).unwrap();
        assert!(engine.match_input("  PING  ").is_some());
        assert!(engine.match_input("ping me later").is_none());
    }

    #[test]
    fn regex_match_multiline_case_insensitive() {
        let engine = RuleEngine::ephemeral();
        engine
            .add(r"^status:\s*\w+$", TriggerKind::Regex, "noted", 0)
            .unwrap();
        assert!(engine.match_input("intro\nSTATUS: green").is_some());
    }

    #[test]
    fn invalid_regex_rejected_at_add() {
        let engine = RuleEngine::ephemeral();
        let err = engine
            .add("([unclosed", TriggerKind::Regex, "x", 0)
            .unwrap_err();
        assert_eq!(err.kind, reagent_core::ErrorKind::ToolValidation);
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn priority_beats_recency() {
        let engine = RuleEngine::ephemeral();
        engine
            .add("hello", TriggerKind::Contains, "low", 0)
            .unwrap();
        engine
            .add("hello", TriggerKind::Contains, "high", 5)
            .unwrap();
        assert_eq!(engine.match_input("hello there").unwrap().response, "high");
    }

    #[test]
    fn recency_breaks_priority_ties() {
        let engine = RuleEngine::ephemeral();
        engine
            .add("hello", TriggerKind::Contains, "older", 0)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        engine
            .add("hello", TriggerKind::Contains, "newer", 0)
            .unwrap();
        assert_eq!(engine.match_input("hello").unwrap().response, "newer");
    }

    #[test]
    fn remove_by_id() {
        let engine = RuleEngine::ephemeral();
        let id = engine.add("x", TriggerKind::Contains, "y", 0).unwrap();
        assert!(engine.remove(&id));
        assert!(!engine.remove(&id));
        assert!(engine.match_input("x").is_none());
    }

    #[test]
    fn persistence_roundtrip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let engine = RuleEngine::open(dir.path());
            engine.add("cekrek", TriggerKind::Contains, "memori terbaca", 0)?;
        }
        let reopened = RuleEngine::open(dir.path());
        assert_eq!(reopened.len(), 1);
        let hit = reopened.match_input("ya cekrek dong").unwrap();
        assert_eq!(hit.response, "memori terbaca");
        Ok(())
    }

    #[test]
    fn corrupt_file_starts_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("rules.json"), "{broken")?;
        let engine = RuleEngine::open(dir.path());
        assert!(engine.is_empty());
        Ok(())
    }
}

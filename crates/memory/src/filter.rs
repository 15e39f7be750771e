//! Deterministic interaction classifier.
//!
//! Decides, from surface patterns and counts alone, whether a finished
//! interaction becomes a rule, a fact, an experience, or nothing.  Runs after
//! every task and never calls the LLM, so classification is reproducible.
//!
//! Pattern order matters: useless → rule template → fact template →
//! experience signal → useless.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

fn pattern(re: &str) -> Regex {
    RegexBuilder::new(re)
        .case_insensitive(true)
        .build()
        .expect("static classifier pattern must compile")
}

// ── Surface patterns ─────────────────────────────────────────────────────────

/// Greetings, acknowledgements, and bare yes/no in English and Indonesian.
static USELESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        pattern(r"^(hi|hello|hey|halo|hai|yo|pagi|siang|malam)[\s.!?]*$"),
        pattern(r"^(ok|okay|oke|okey|sip|siap|mantap|good|nice|cool)[\s.!?]*$"),
        pattern(r"^(yes|no|ya|iya|yup|nope|tidak|nggak|gak|bukan)[\s.!?]*$"),
        pattern(r"^(thanks|thank you|thx|makasih|terima kasih)[\s.!?]*$"),
        pattern(r"^(test|tes|ping)[\s.!?]*$"),
    ]
});

/// "if X then Y" rule templates.  Each entry is `(regex, trigger_group,
/// response_group)` since some variants capture response before trigger.
static RULE_TEMPLATES: LazyLock<Vec<(Regex, usize, usize)>> = LazyLock::new(|| {
    vec![
        (pattern(r"^if\s+(?:i\s+(?:say|type|write)\s+)?(.+?)\s*,?\s+then\s+(?:say\s+|respond\s+(?:with\s+)?|answer\s+)?(.+)$"), 1, 2),
        (pattern(r"^jika\s+(?:saya\s+(?:bilang|ketik|tulis)\s+)?(.+?)\s*,?\s+maka\s+(?:jawab\s+|balas\s+)?(.+)$"), 1, 2),
        (pattern(r"^kalau\s+(?:saya\s+(?:bilang|ketik)\s+)?(.+?)\s*,?\s+(?:jawab|balas)\s+(.+)$"), 1, 2),
        (pattern(r"^always\s+(?:respond|reply|answer)\s+(?:with\s+)?(.+?)\s+when\s+(?:i\s+say\s+)?(.+)$"), 2, 1),
    ]
});

/// Durable user-fact templates: `(regex, value_group, category, rendering)`.
static FACT_TEMPLATES: LazyLock<Vec<(Regex, &'static str, &'static str)>> = LazyLock::new(|| {
    vec![
        (pattern(r"^(?:my\s+name\s+is|nama\s+saya(?:\s+adalah)?|namaku)\s+(.+)$"), "name", "User's name is {value}"),
        (pattern(r"^(?:call\s+me|panggil\s+(?:saya|aku))\s+(.+)$"), "nickname", "User wants to be called {value}"),
        (pattern(r"^(?:i\s+prefer|saya\s+lebih\s+suka)\s+(.+)$"), "preference", "User prefers {value}"),
        (pattern(r"^(?:i\s+like|saya\s+suka|aku\s+suka)\s+(.+)$"), "preference", "User likes {value}"),
        (pattern(r"^(?:i\s+work\s+(?:as|at)|saya\s+bekerja\s+(?:sebagai|di))\s+(.+)$"), "work", "User works as/at {value}"),
        (pattern(r"^(?:i\s+live\s+in|saya\s+tinggal\s+di)\s+(.+)$"), "location", "User lives in {value}"),
    ]
});

/// Structured-answer signals in the assistant text: fenced code or an
/// enumerated step list.
static SOLUTION_SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(```|^\s*\d+\.\s)").expect("static pattern must compile"));

// ── Classification result ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Useless,
    Rule {
        trigger: String,
        response: String,
    },
    Fact {
        category: String,
        value: String,
        /// Rendered sentence ready for prompt injection.
        fact: String,
    },
    Experience,
}

// ── Filter ───────────────────────────────────────────────────────────────────

pub struct MemoryFilter {
    min_task_chars: usize,
}

impl MemoryFilter {
    pub fn new(min_task_chars: usize) -> Self {
        Self { min_task_chars }
    }

    /// Classify a finished interaction.  `actions_count` is the number of
    /// tool calls the task executed.
    pub fn classify(
        &self,
        user_input: &str,
        assistant_text: &str,
        success: bool,
        actions_count: usize,
    ) -> Classification {
        let input = user_input.trim();

        if input.len() < self.min_task_chars || USELESS.iter().any(|re| re.is_match(input)) {
            return Classification::Useless;
        }

        for (re, trigger_group, response_group) in RULE_TEMPLATES.iter() {
            if let Some(caps) = re.captures(input) {
                let trigger = clean_fragment(&caps[*trigger_group]);
                let response = clean_fragment(&caps[*response_group]);
                if !trigger.is_empty() && !response.is_empty() {
                    return Classification::Rule { trigger, response };
                }
            }
        }

        for (re, category, rendering) in FACT_TEMPLATES.iter() {
            if let Some(caps) = re.captures(input) {
                let value = clean_fragment(&caps[1]);
                if !value.is_empty() {
                    return Classification::Fact {
                        category: category.to_string(),
                        value: value.clone(),
                        fact: rendering.replace("{value}", &value),
                    };
                }
            }
        }

        if actions_count >= 1 || !success || SOLUTION_SIGNAL.is_match(assistant_text) {
            return Classification::Experience;
        }

        Classification::Useless
    }
}

/// Strip surrounding quotes and trailing punctuation from a captured fragment.
fn clean_fragment(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(|c: char| ".,!?".contains(c))
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_end_matches(|c: char| ".,!?".contains(c))
        .trim()
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> MemoryFilter {
        MemoryFilter::new(3)
    }

    #[test]
    fn greetings_are_useless() {
        for input in ["halo", "Hi!", "hey", "ok", "oke", "thanks", "terima kasih", "ya"] {
            assert_eq!(
                filter().classify(input, "hello!", true, 0),
                Classification::Useless,
                "{input:?} should be useless"
            );
        }
    }

    #[test]
    fn tiny_inputs_are_useless() {
        assert_eq!(filter().classify(" a ", "?", true, 0), Classification::Useless);
    }

    #[test]
    fn if_then_extracts_rule() {
        let got = filter().classify("if cekrek then say memori terbaca", "noted", true, 0);
        assert_eq!(
            got,
            Classification::Rule {
                trigger: "cekrek".into(),
                response: "memori terbaca".into(),
            }
        );
    }

    #[test]
    fn jika_maka_extracts_rule() {
        let got = filter().classify("jika saya bilang cekrek maka jawab memori terbaca", "ok", true, 0);
        assert_eq!(
            got,
            Classification::Rule {
                trigger: "cekrek".into(),
                response: "memori terbaca".into(),
            }
        );
    }

    #[test]
    fn always_respond_when_reverses_capture_order() {
        let got = filter().classify("always respond with pong when I say ping", "ok", true, 0);
        assert_eq!(
            got,
            Classification::Rule {
                trigger: "ping".into(),
                response: "pong".into(),
            }
        );
    }

    #[test]
    fn name_fact_in_indonesian() {
        let got = filter().classify("Nama saya Budi", "Senang berkenalan!", true, 0);
        assert_eq!(
            got,
            Classification::Fact {
                category: "name".into(),
                value: "Budi".into(),
                fact: "User's name is Budi".into(),
            }
        );
    }

    #[test]
    fn preference_fact_in_english() {
        let got = filter().classify("I prefer dark mode", "Noted.", true, 0);
        match got {
            Classification::Fact { category, value, fact } => {
                assert_eq!(category, "preference");
                assert_eq!(value, "dark mode");
                assert_eq!(fact, "User prefers dark mode");
            }
            other => panic!("expected fact, got {other:?}"),
        }
    }

    #[test]
    fn tool_use_makes_experience() {
        let got = filter().classify("baca file README.md", "The file says...", true, 1);
        assert_eq!(got, Classification::Experience);
    }

    #[test]
    fn failure_makes_experience() {
        let got = filter().classify("deploy the service", "I could not finish", false, 0);
        assert_eq!(got, Classification::Experience);
    }

    #[test]
    fn code_block_makes_experience() {
        let answer = "Here you go:\n```python\nprint('hi')\n```";
        let got = filter().classify("tulis kode python hello world", answer, true, 0);
        assert_eq!(got, Classification::Experience);
    }

    #[test]
    fn plain_chat_without_signals_is_useless() {
        let got = filter().classify("what do you think about mornings", "They are fine.", true, 0);
        assert_eq!(got, Classification::Useless);
    }

    #[test]
    fn quotes_and_punctuation_are_stripped() {
        let got = filter().classify("if \"cekrek\" then say \"memori terbaca\".", "ok", true, 0);
        assert_eq!(
            got,
            Classification::Rule {
                trigger: "cekrek".into(),
                response: "memori terbaca".into(),
            }
        );
    }
}

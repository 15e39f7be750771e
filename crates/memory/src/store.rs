//! Collection store with a text-overlap similarity fallback.
//!
//! Each collection is a mutex-serialized list of [`StoredRecord`]s persisted
//! as one JSONL file under `<data_dir>/<collection>/records.jsonl`.  The file
//! is rewritten atomically (tmp sibling + rename) on every mutation and read
//! leniently: corrupt lines are skipped with a warning so one bad record
//! never takes the whole collection down.  When no persistence directory is
//! configured the collection is purely in-memory and documents that to the
//! caller via [`Collection::is_persistent`].

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::warn;

use crate::schema::StoredRecord;

// ── Tokenization for the fallback matcher ────────────────────────────────────

/// High-frequency words excluded from overlap scoring.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "was", "has", "are", "not", "this", "that", "with", "from", "have",
    "you", "can", "its", "will", "but", "they", "all", "been", "also", "into", "more", "than",
    "when", "who", "what", "how", "out", "our", "new", "now", "yang", "dan", "untuk", "dengan",
    "adalah", "itu", "ini",
];

pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

// ── Collection ───────────────────────────────────────────────────────────────

pub struct Collection {
    name: String,
    path: Option<PathBuf>,
    records: Mutex<Vec<StoredRecord>>,
}

impl Collection {
    /// Open (or create) a persisted collection under `data_dir/<name>/`.
    pub fn open(data_dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let dir = data_dir.as_ref().join(&name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating collection dir {}", dir.display()))?;
        let path = dir.join("records.jsonl");
        let records = load_records(&path, &name)?;
        Ok(Self {
            name,
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// Purely in-memory collection; persistence is a no-op.
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// Insert or replace the record with the same id.
    pub fn upsert(&self, record: StoredRecord) {
        let mut records = self.records.lock().expect("collection mutex poisoned");
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            records.push(record);
        }
        self.persist(&records);
    }

    /// Similarity query: smaller distance = more similar.  The fallback
    /// matcher scores token overlap between the query and each record's
    /// document plus its string metadata, so structured context (paths,
    /// source utterances) still matches.  Records with zero overlap are
    /// excluded entirely.
    pub fn query(&self, text: &str, n: usize) -> Vec<(StoredRecord, f32)> {
        let query_terms = tokenize(text);
        if query_terms.is_empty() || n == 0 {
            return Vec::new();
        }
        let records = self.records.lock().expect("collection mutex poisoned");
        let mut scored: Vec<(StoredRecord, f32)> = records
            .iter()
            .filter_map(|record| {
                let mut haystack = record.document.clone();
                for value in record.metadata.values() {
                    if let Some(s) = value.as_str() {
                        haystack.push(' ');
                        haystack.push_str(s);
                    }
                }
                let record_terms = tokenize(&haystack);
                let overlap = query_terms.intersection(&record_terms).count() as f32;
                if overlap == 0.0 {
                    return None;
                }
                let distance = 1.0 - (overlap / query_terms.len() as f32).min(1.0);
                Some((record.clone(), distance))
            })
            .collect();
        scored.sort_by(|(ar, ad), (br, bd)| ad.total_cmp(bd).then(br.ts.cmp(&ar.ts)));
        scored.truncate(n);
        scored
    }

    pub fn get(&self, id: &str) -> Option<StoredRecord> {
        let records = self.records.lock().expect("collection mutex poisoned");
        records.iter().find(|r| r.id == id).cloned()
    }

    pub fn delete(&self, ids: &[String]) -> usize {
        let mut records = self.records.lock().expect("collection mutex poisoned");
        let before = records.len();
        records.retain(|r| !ids.contains(&r.id));
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records);
        }
        removed
    }

    pub fn delete_by_filter<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&StoredRecord) -> bool,
    {
        let mut records = self.records.lock().expect("collection mutex poisoned");
        let before = records.len();
        records.retain(|r| !predicate(r));
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.records.lock().expect("collection mutex poisoned").len()
    }

    pub fn all(&self) -> Vec<StoredRecord> {
        self.records.lock().expect("collection mutex poisoned").clone()
    }

    /// Drop records older than `max_age_days`.  With `keep_successful`,
    /// records whose `success` metadata is true (or absent) survive
    /// regardless of age.
    pub fn cleanup_old(&self, max_age_days: i64, keep_successful: bool) -> usize {
        let cutoff = Utc::now() - Duration::days(max_age_days);
        self.delete_by_filter(|record| {
            record.ts < cutoff && !(keep_successful && record.is_successful())
        })
    }

    /// Reduce the collection to at most `max_count` records, dropping the
    /// oldest `ts` first.
    pub fn limit_size(&self, max_count: usize) -> usize {
        let mut records = self.records.lock().expect("collection mutex poisoned");
        if records.len() <= max_count {
            return 0;
        }
        records.sort_by(|a, b| a.ts.cmp(&b.ts));
        let excess = records.len() - max_count;
        records.drain(..excess);
        self.persist(&records);
        excess
    }

    fn persist(&self, records: &[StoredRecord]) {
        let Some(path) = &self.path else { return };
        if let Err(err) = write_records_atomic(path, records) {
            warn!(collection = %self.name, error = %err, "failed to persist collection");
        }
    }
}

/// Write the full record list to a `.tmp` sibling, then rename over the
/// original.  A crash before the rename leaves the previous file intact.
fn write_records_atomic(path: &Path, records: &[StoredRecord]) -> Result<()> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

fn load_records(path: &Path, name: &str) -> Result<Vec<StoredRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut corrupt = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(&line) {
            Ok(record) => records.push(record),
            Err(_) => corrupt += 1,
        }
    }
    if corrupt > 0 {
        warn!(collection = name, corrupt_lines = corrupt, "skipped corrupt records while loading");
    }
    Ok(records)
}

// ── The five collections as one unit ─────────────────────────────────────────

pub struct MemoryStores {
    pub experiences: Collection,
    pub lessons: Collection,
    pub strategies: Collection,
    pub facts: Collection,
    pub errors: Collection,
}

impl MemoryStores {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        Ok(Self {
            experiences: Collection::open(dir, "experiences")?,
            lessons: Collection::open(dir, "lessons")?,
            strategies: Collection::open(dir, "strategies")?,
            facts: Collection::open(dir, "facts")?,
            errors: Collection::open(dir, "errors")?,
        })
    }

    pub fn ephemeral() -> Self {
        Self {
            experiences: Collection::ephemeral("experiences"),
            lessons: Collection::ephemeral("lessons"),
            strategies: Collection::ephemeral("strategies"),
            facts: Collection::ephemeral("facts"),
            errors: Collection::ephemeral("errors"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Metadata, MetaValue, StoredRecord};
    use chrono::Duration;

    fn record(id: &str, document: &str) -> StoredRecord {
        StoredRecord::new(id, document, Metadata::new())
    }

    fn aged(id: &str, document: &str, days_old: i64, success: bool) -> StoredRecord {
        let mut r = record(id, document);
        r.ts = Utc::now() - Duration::days(days_old);
        r.metadata.insert("success".into(), MetaValue::Bool(success));
        r
    }

    #[test]
    fn upsert_is_idempotent_by_id() {
        let c = Collection::ephemeral("test");
        c.upsert(record("a", "first version"));
        c.upsert(record("a", "second version"));
        assert_eq!(c.count(), 1);
        assert_eq!(c.get("a").unwrap().document, "second version");
    }

    #[test]
    fn query_ranks_by_overlap() {
        let c = Collection::ephemeral("test");
        c.upsert(record("a", "rust async performance tuning"));
        c.upsert(record("b", "grocery shopping list"));
        c.upsert(record("c", "rust compiler internals"));

        let hits = c.query("rust async tips", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "a");
        assert!(hits[0].1 < hits[1].1, "closer match must have smaller distance");
    }

    #[test]
    fn query_matches_string_metadata() {
        let c = Collection::ephemeral("facts");
        let mut r = record("f1", "User's name is Budi");
        r.metadata.insert("source".into(), MetaValue::from("Nama saya Budi"));
        c.upsert(r);

        let hits = c.query("Siapa nama saya?", 5);
        assert_eq!(hits.len(), 1, "source metadata should make the fact reachable");
        assert_eq!(hits[0].0.id, "f1");
    }

    #[test]
    fn query_excludes_zero_overlap() {
        let c = Collection::ephemeral("test");
        c.upsert(record("a", "completely unrelated subject"));
        assert!(c.query("quantum chromodynamics", 5).is_empty());
    }

    #[test]
    fn delete_by_ids() {
        let c = Collection::ephemeral("test");
        c.upsert(record("a", "one"));
        c.upsert(record("b", "two"));
        let removed = c.delete(&["a".to_string(), "missing".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn cleanup_old_keeps_successful() {
        let c = Collection::ephemeral("experiences");
        c.upsert(aged("old-ok", "succeeded long ago", 90, true));
        c.upsert(aged("old-bad", "failed long ago", 90, false));
        c.upsert(aged("new-bad", "failed recently", 1, false));

        let removed = c.cleanup_old(30, true);
        assert_eq!(removed, 1);
        assert!(c.get("old-ok").is_some(), "old successful record must survive");
        assert!(c.get("old-bad").is_none());
        assert!(c.get("new-bad").is_some());
    }

    #[test]
    fn cleanup_old_without_keep_drops_all_old() {
        let c = Collection::ephemeral("experiences");
        c.upsert(aged("old-ok", "succeeded long ago", 90, true));
        c.upsert(aged("old-bad", "failed long ago", 90, false));
        assert_eq!(c.cleanup_old(30, false), 2);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn limit_size_drops_oldest_first() {
        let c = Collection::ephemeral("test");
        c.upsert(aged("oldest", "a", 10, true));
        c.upsert(aged("middle", "b", 5, true));
        c.upsert(aged("newest", "c", 1, true));

        let pruned = c.limit_size(2);
        assert_eq!(pruned, 1);
        assert!(c.get("oldest").is_none());
        assert!(c.get("newest").is_some());
    }

    #[test]
    fn persistence_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let c = Collection::open(dir.path(), "facts")?;
            c.upsert(record("f1", "User's name is Budi"));
            c.upsert(record("f2", "User prefers dark mode"));
        }
        let reopened = Collection::open(dir.path(), "facts")?;
        assert_eq!(reopened.count(), 2);
        assert_eq!(reopened.get("f1").unwrap().document, "User's name is Budi");
        Ok(())
    }

    #[test]
    fn corrupt_lines_are_skipped_on_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let c = Collection::open(dir.path(), "facts")?;
            c.upsert(record("f1", "good record"));
        }
        let path = dir.path().join("facts").join("records.jsonl");
        let mut file = fs::OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{{not valid json")?;

        let reopened = Collection::open(dir.path(), "facts")?;
        assert_eq!(reopened.count(), 1);
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::CrashError;
use crate::reader::{ChannelQuery, EventSource};
use crate::record::{Channel, LogRecord};
use crate::root::{base_name, file_stem, GameRoot};
use crate::similarity::{SequenceRatio, Similarity};

/// Ratios must be strictly above this to count as a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 0.6;
/// Combined cap on records accepted by the general sweep across all channels.
pub const SWEEP_QUOTA: usize = 10;
const MIN_FOLDER_LEN: usize = 3;
const MIN_ROOT_LEN: usize = 10;
const MIN_WORD_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier { ExactName, ExactNameNoExt, FuzzySource, FolderName, PathContainment, FuzzyWord, General }

impl MatchTier {
    pub fn label(self) -> &'static str {
        match self {
            MatchTier::ExactName => "exact name",
            MatchTier::ExactNameNoExt => "exact name (no extension)",
            MatchTier::FuzzySource => "similar source",
            MatchTier::FolderName => "game folder name",
            MatchTier::PathContainment => "game folder path",
            MatchTier::FuzzyWord => "similar word",
            MatchTier::General => "general match",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub record: LogRecord,
    pub tier: MatchTier,
    pub detail: String,
}

/// Lowercases and folds every run of `/` or `\` into a single `/`.
pub fn normalize_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_sep = false;
    for c in s.chars() {
        if c == '/' || c == '\\' {
            if !last_sep { out.push('/'); }
            last_sep = true;
        } else {
            out.extend(c.to_lowercase());
            last_sep = false;
        }
    }
    out
}

/// What a record is compared against, precomputed in lowercase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub file_name: String,
    pub stem: String,
    pub folder: String,
    pub root_path: String,
}

impl Target {
    pub fn new(exe_path: &str, root: &GameRoot) -> Self {
        let file_name = base_name(exe_path).to_lowercase();
        let stem = file_stem(&file_name).to_string();
        Self { file_name, stem, folder: root.folder_name.to_lowercase(), root_path: normalize_path(&root.path) }
    }

    fn folder_in(&self, msg_lower: &str) -> bool {
        self.folder.chars().count() > MIN_FOLDER_LEN && msg_lower.contains(&self.folder)
    }

    fn root_in(&self, msg_norm: &str) -> bool {
        self.root_path.chars().count() > MIN_ROOT_LEN && msg_norm.contains(&self.root_path)
    }
}

pub struct MatchEngine {
    similarity: Box<dyn Similarity>,
    deep_scan: bool,
}

impl Default for MatchEngine {
    fn default() -> Self { Self { similarity: Box::new(SequenceRatio), deep_scan: true } }
}

impl MatchEngine {
    pub fn new() -> Self { Self::default() }

    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self { self.similarity = similarity; self }

    /// With deep scan off the two fuzzy tiers are skipped.
    pub fn deep_scan(mut self, on: bool) -> Self { self.deep_scan = on; self }

    /// First tier the record satisfies, with a human-readable reason.
    pub fn classify(&self, target: &Target, rec: &LogRecord) -> Option<(MatchTier, String)> {
        let source = rec.source.to_lowercase();
        let msg = rec.message().to_lowercase();
        let found_in = |needle: &str| -> Option<&'static str> {
            if needle.is_empty() { None }
            else if source.contains(needle) { Some("source") }
            else if msg.contains(needle) { Some("message") }
            else { None }
        };
        if let Some(place) = found_in(&target.file_name) {
            return Some((MatchTier::ExactName, format!("'{}' found in {}", target.file_name, place)));
        }
        if let Some(place) = found_in(&target.stem) {
            return Some((MatchTier::ExactNameNoExt, format!("'{}' found in {}", target.stem, place)));
        }
        if self.deep_scan && !target.stem.is_empty() {
            let ratio = self.similarity.ratio(&target.stem, &source);
            if ratio > FUZZY_THRESHOLD {
                return Some((MatchTier::FuzzySource, format!("source '{}' is {:.0}% similar to '{}'", rec.source, ratio * 100.0, target.stem)));
            }
        }
        if target.folder_in(&msg) {
            return Some((MatchTier::FolderName, format!("folder '{}' found in message", target.folder)));
        }
        if target.root_in(&normalize_path(&msg)) {
            return Some((MatchTier::PathContainment, format!("path '{}' found in message", target.root_path)));
        }
        if self.deep_scan && !target.stem.is_empty() {
            for word in msg.split_whitespace().filter(|w| w.chars().count() > MIN_WORD_LEN) {
                let ratio = self.similarity.ratio(&target.stem, word);
                if ratio > FUZZY_THRESHOLD {
                    return Some((MatchTier::FuzzyWord, format!("word '{}' is {:.0}% similar to '{}'", word, ratio * 100.0, target.stem)));
                }
            }
        }
        None
    }

    pub fn match_records(&self, target: &Target, records: &[LogRecord]) -> Vec<MatchResult> {
        let mut out = Vec::new();
        for rec in records {
            match self.classify(target, rec) {
                Some((tier, detail)) => {
                    log::info!("{} event {} at {} matched: {}", rec.source, rec.event_id, rec.time, detail);
                    out.push(MatchResult { record: rec.clone(), tier, detail });
                }
                None => log::debug!("{} event {} at {} did not match", rec.source, rec.event_id, rec.time),
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub matches: Vec<MatchResult>,
    pub scanned: usize,
    /// Records scanned in each channel the sweep opened.
    pub per_channel: Vec<(Channel, usize)>,
    pub errors: Vec<CrashError>,
}

impl SweepOutcome {
    pub fn scanned_in(&self, channel: Channel) -> usize {
        self.per_channel.iter().filter(|(c, _)| *c == channel).map(|(_, n)| n).sum()
    }
}

/// Last-resort search: every Error record of Application then System that mentions the
/// game folder or its path, at most [`SWEEP_QUOTA`] in total. No tiering.
pub fn general_sweep(source: &mut dyn EventSource, cutoff: DateTime<Utc>, target: &Target) -> SweepOutcome {
    let mut out = SweepOutcome::default();
    for channel in [Channel::Application, Channel::System] {
        let remaining = SWEEP_QUOTA - out.matches.len();
        if remaining == 0 { break; }
        let read = ChannelQuery::new(channel, cutoff).quota(remaining).read_matching(source, |rec| {
            let msg = rec.message().to_lowercase();
            target.folder_in(&msg) || target.root_in(&normalize_path(&msg))
        });
        out.scanned += read.scanned;
        out.per_channel.push((channel, read.scanned));
        out.matches.extend(read.records.into_iter().map(|record| MatchResult { record, tier: MatchTier::General, detail: MatchTier::General.label().to_string() }));
        if let Some(err) = read.error {
            let fatal = err.is_fatal();
            out.errors.push(err);
            if fatal { break; }
        }
    }
    log::info!("general sweep found {} records", out.matches.len());
    out
}

use std::fmt;
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::matcher::MatchTier;
use crate::Diagnosis;

const MESSAGE_LIMIT: usize = 800;
const PAYLOAD_LIMIT: usize = 100;
const RULE: &str = "------------------------------------------------------------";

/// Positional meaning of the insert strings of Application Error events.
pub const FAULT_FIELD_LABELS: [&str; 13] = [
    "Faulting application name",
    "Application version",
    "Application timestamp",
    "Faulting module name",
    "Module version",
    "Module timestamp",
    "Exception code",
    "Fault offset",
    "Faulting process ID",
    "Application start time",
    "Faulting application path",
    "Faulting module path",
    "Report ID",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone { #[default] Local, Utc }

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions {
    pub time_zone: TimeZone,
}

/// Rendered blocks plus the closing summary line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub blocks: Vec<String>,
    pub summary: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.blocks { writeln!(f, "{}", b)?; }
        write!(f, "{}", self.summary)
    }
}

pub fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn format_time(t: DateTime<Utc>, tz: TimeZone) -> String {
    match tz {
        TimeZone::Local => t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        TimeZone::Utc => t.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

pub fn render(d: &Diagnosis, opts: RenderOptions) -> Report {
    let mut blocks = Vec::new();
    let h = &d.header;
    let mut head = String::new();
    head.push_str("==================== CRASH DETECTIVE ====================\n");
    head.push_str(&format!("File: {}\n", h.exe_name));
    head.push_str(&format!("Path: {}\n", h.exe_path));
    match &h.root {
        Some(r) => head.push_str(&format!("Game root: {} ({})\n", r.path, r.folder_name)),
        None => head.push_str("Game root: (not resolved)\n"),
    }
    head.push_str(&format!("Period: last {} days", h.window.days()));
    blocks.push(head);

    for e in &d.errors { blocks.push(format!("ERROR: {}", e)); }

    if d.findings.is_empty() && !d.errors.iter().any(|e| e.is_fatal()) {
        blocks.push(format!("No crash events found for {} in the last {} days.", h.exe_name, h.window.days()));
    }

    for (i, f) in d.findings.iter().enumerate() {
        let m = &f.result;
        let r = &m.record;
        let mut b = String::new();
        b.push_str(RULE);
        b.push('\n');
        b.push_str(&format!("#{}  {}  {}  (Event ID {}, {})\n", i + 1, format_time(r.time, opts.time_zone), r.source, r.event_id, r.channel));
        if m.tier == MatchTier::General {
            b.push_str(&format!("Match: {}\n", MatchTier::General.label()));
        } else {
            b.push_str(&format!("Match: {} - {}\n", m.tier.label(), m.detail));
        }
        if r.is_crash_event() {
            for (label, value) in FAULT_FIELD_LABELS.iter().zip(r.fields.iter()) {
                b.push_str(&format!("  {}: {}\n", label, value));
            }
        }
        b.push_str(&format!("Message: {}\n", truncate(&r.message().replace(['\r', '\n'], " "), MESSAGE_LIMIT)));
        let payload = r.payload_text();
        if !payload.is_empty() {
            b.push_str(&format!("Data: {}\n", truncate(&payload.replace(['\r', '\n'], " "), PAYLOAD_LIMIT)));
        }
        b.push_str("Likely cause:");
        for line in &f.interpretations {
            b.push_str("\n  - ");
            b.push_str(line);
        }
        blocks.push(b);
    }

    let mut summary = format!("Summary: {} crash event(s) matched out of {} record(s) scanned", d.findings.len(), d.scanned);
    if d.fallback_used { summary.push_str(" (general sweep)"); }
    Report { blocks, summary }
}

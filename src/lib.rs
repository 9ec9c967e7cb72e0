//! Finds out why a program crashed by searching the Windows event log for its
//! crash records and explaining the fault codes they carry.
//!
//! The building blocks can be used on their own: [`root::resolve`] for the game root,
//! [`reader::ChannelQuery`] for filtered record retrieval and
//! [`signatures::SignatureTable::interpret`] for fault explanations. [`Diagnoser`]
//! chains them into one search.

pub mod config;
pub mod error;
pub mod event_xml;
pub mod evtx_source;
pub mod matcher;
pub mod reader;
pub mod record;
pub mod report;
pub mod root;
pub mod signatures;
pub mod similarity;
#[cfg(windows)]
pub mod windows_live;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::error::CrashError;
use crate::matcher::{general_sweep, MatchEngine, MatchResult, Target};
use crate::reader::{ChannelQuery, EventSource};
use crate::record::{Channel, CRASH_EVENT_IDS};
use crate::report::{render, RenderOptions, Report};
use crate::root::{base_name, GameRoot, RootTables};
use crate::signatures::SignatureTable;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum LookbackWindow {
    #[default]
    #[value(name = "2")]
    TwoDays,
    #[value(name = "3")]
    ThreeDays,
    #[value(name = "7")]
    Week,
    #[value(name = "14")]
    TwoWeeks,
}

impl LookbackWindow {
    pub fn days(self) -> i64 {
        match self { LookbackWindow::TwoDays => 2, LookbackWindow::ThreeDays => 3, LookbackWindow::Week => 7, LookbackWindow::TwoWeeks => 14 }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        match days { 2 => Some(Self::TwoDays), 3 => Some(Self::ThreeDays), 7 => Some(Self::Week), 14 => Some(Self::TwoWeeks), _ => None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportHeader {
    pub exe_name: String,
    pub exe_path: String,
    pub root: Option<GameRoot>,
    pub window: LookbackWindow,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub result: MatchResult,
    pub interpretations: Vec<String>,
}

/// Outcome of one search: whatever was found plus every error met on the way.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnosis {
    pub header: ReportHeader,
    pub findings: Vec<Finding>,
    pub scanned: usize,
    pub fallback_used: bool,
    pub errors: Vec<CrashError>,
}

impl Diagnosis {
    pub fn has_fatal_error(&self) -> bool { self.errors.iter().any(|e| e.is_fatal()) }
}

/// Rejects an empty path or one that does not exist.
pub fn validate_executable(exe_path: &str) -> Result<(), CrashError> {
    if exe_path.trim().is_empty() { return Err(CrashError::input("Please select an executable file.")); }
    if !std::path::Path::new(exe_path).exists() { return Err(CrashError::input(format!("File does not exist: {}", exe_path))); }
    Ok(())
}

pub struct Diagnoser {
    source: Box<dyn EventSource>,
    tables: RootTables,
    signatures: SignatureTable,
    engine: MatchEngine,
}

impl Diagnoser {
    pub fn new(source: Box<dyn EventSource>) -> Self {
        Self { source, tables: RootTables::default(), signatures: SignatureTable::builtin(), engine: MatchEngine::new() }
    }

    pub fn root_tables(mut self, tables: RootTables) -> Self { self.tables = tables; self }

    pub fn signatures(mut self, signatures: SignatureTable) -> Self { self.signatures = signatures; self }

    pub fn engine(mut self, engine: MatchEngine) -> Self { self.engine = engine; self }

    /// Checks the executable exists, then searches up to now.
    pub fn diagnose(&mut self, exe_path: &str, window: LookbackWindow) -> Diagnosis {
        if let Err(e) = validate_executable(exe_path) { return Self::rejected(exe_path, window, e); }
        self.investigate(exe_path, window, Utc::now())
    }

    /// [`diagnose`](Self::diagnose) followed by rendering.
    pub fn report(&mut self, exe_path: &str, window: LookbackWindow, opts: RenderOptions) -> Report {
        render(&self.diagnose(exe_path, window), opts)
    }

    /// The search itself, with the clock supplied and no filesystem checks.
    pub fn investigate(&mut self, exe_path: &str, window: LookbackWindow, now: DateTime<Utc>) -> Diagnosis {
        if exe_path.trim().is_empty() {
            return Self::rejected(exe_path, window, CrashError::input("Please select an executable file."));
        }
        let root = self.tables.resolve(exe_path);
        log::info!("resolved game root {:?} for {}", root.path, exe_path);
        let target = Target::new(exe_path, &root);
        let mut d = Diagnosis {
            header: ReportHeader { exe_name: base_name(exe_path).to_string(), exe_path: exe_path.to_string(), root: Some(root), window },
            findings: Vec::new(),
            scanned: 0,
            fallback_used: false,
            errors: Vec::new(),
        };
        let cutoff = now - Duration::days(window.days());

        let read = ChannelQuery::new(Channel::Application, cutoff).ids(&CRASH_EVENT_IDS).read(self.source.as_mut());
        d.scanned += read.scanned;
        if let Some(e) = read.error {
            let fatal = e.is_fatal();
            d.errors.push(e);
            if fatal { return d; }
        }
        log::info!("{} crash records within {} days", read.records.len(), window.days());
        let mut matches = self.engine.match_records(&target, &read.records);

        if matches.is_empty() {
            log::info!("no direct match, falling back to a general sweep");
            let sweep = general_sweep(self.source.as_mut(), cutoff, &target);
            // the sweep re-reads Application over the same window
            d.scanned = d.scanned.max(sweep.scanned_in(Channel::Application)) + sweep.scanned_in(Channel::System);
            d.errors.extend(sweep.errors);
            d.fallback_used = !sweep.matches.is_empty();
            matches = sweep.matches;
        }

        d.findings = matches
            .into_iter()
            .map(|m| {
                let text = format!("{} {}", m.record.message(), m.record.payload_text());
                let interpretations = self.signatures.interpret(&text);
                Finding { result: m, interpretations }
            })
            .collect();
        d
    }

    fn rejected(exe_path: &str, window: LookbackWindow, e: CrashError) -> Diagnosis {
        log::error!("{}", e);
        Diagnosis {
            header: ReportHeader { exe_name: base_name(exe_path).to_string(), exe_path: exe_path.to_string(), root: None, window },
            findings: Vec::new(),
            scanned: 0,
            fallback_used: false,
            errors: vec![e],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::matcher::MatchTier;
    use crate::reader::MemorySource;
    use crate::reader::tests::{now, rec};
    use crate::record::{LogRecord, Severity};
    use crate::report::TimeZone;
    use crate::signatures::NO_RECOGNIZED_PATTERN;

    const EXE: &str = "C:/Games/MyGame/Binaries/Win64/game.exe";

    fn crash(mins_ago: i64, fields: &[&str]) -> LogRecord { rec(Channel::Application, mins_ago, 1000, Severity::Error, "Application Error", fields) }

    #[test]
    fn finds_and_explains_a_crash() {
        let src = MemorySource::new().with_records(Channel::Application, vec![
            crash(10, &["game.exe", "1.0.0.0", "65f1a2b3", "nvwgf2umx.dll", "31.0.15.3713", "64a1b2c3", "0xc0000005", "0x00000000001d2a3f"]),
            crash(20, &["explorer.exe", "10.0", "0", "ntdll.dll"]),
            rec(Channel::Application, 30, 1026, Severity::Error, ".NET Runtime", &["game.exe"]),
        ]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(d.errors.is_empty());
        assert!(!d.fallback_used);
        assert_eq!(d.scanned, 3);
        assert_eq!(d.findings.len(), 1);
        let f = &d.findings[0];
        assert_eq!(f.result.tier, MatchTier::ExactName);
        assert_eq!(f.interpretations.len(), 2);
        assert!(f.interpretations[0].starts_with("Access violation"));
        assert!(f.interpretations[1].starts_with("NVIDIA DirectX"));
    }

    #[test]
    fn window_excludes_old_crashes() {
        let src = MemorySource::new()
            .with_records(Channel::Application, vec![crash(60 * 24 * 3, &["game.exe"])])
            .with_records(Channel::System, vec![]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(d.findings.is_empty());
        let src = MemorySource::new().with_records(Channel::Application, vec![crash(60 * 24 * 3, &["game.exe"])]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::Week, now());
        assert_eq!(d.findings.len(), 1);
    }

    #[test]
    fn falls_back_to_general_sweep() {
        let src = MemorySource::new()
            .with_records(Channel::Application, vec![crash(5, &["other.exe"])])
            .with_records(Channel::System, vec![rec(Channel::System, 7, 7031, Severity::Error, "Service Control Manager", &["MyGame Anti-Cheat", "1"])]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(d.fallback_used);
        assert_eq!(d.findings.len(), 1);
        assert_eq!(d.findings[0].result.tier, MatchTier::General);
        assert_eq!(d.findings[0].interpretations, vec![NO_RECOGNIZED_PATTERN.to_string()]);
        let text = render(&d, RenderOptions { time_zone: TimeZone::Utc }).to_string();
        assert!(text.contains("Match: general match"));
        assert!(text.ends_with("Summary: 1 crash event(s) matched out of 2 record(s) scanned (general sweep)"));
    }

    #[test]
    fn sweep_does_not_recount_application_records() {
        let src = MemorySource::new()
            .with_records(Channel::Application, vec![crash(5, &["other.exe"])])
            .with_records(Channel::System, vec![]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(d.findings.is_empty());
        assert_eq!(d.scanned, 1);
    }

    #[test]
    fn access_denied_ends_the_search() {
        let src = MemorySource::new().with_failure(Channel::Application, SourceError::AccessDenied);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(d.has_fatal_error());
        assert_eq!(d.errors.len(), 1);
        let text = render(&d, RenderOptions { time_zone: TimeZone::Utc }).to_string();
        assert!(text.contains("ERROR: Access denied opening the Application log"));
    }

    #[test]
    fn primary_channel_error_still_sweeps_system() {
        let src = MemorySource::new()
            .with_failure(Channel::Application, SourceError::Unavailable("log service stopped".into()))
            .with_records(Channel::System, vec![rec(Channel::System, 1, 10016, Severity::Error, "DistributedCOM", &["C:\\Games\\MyGame\\game.exe"])]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert!(!d.has_fatal_error());
        assert_eq!(d.errors.len(), 2);
        assert_eq!(d.findings.len(), 1);
    }

    #[test]
    fn payload_text_feeds_interpretation() {
        let mut r = crash(1, &["game.exe"]);
        r.payload = b"AppHangB1 d3d11.dll".to_vec();
        let src = MemorySource::new().with_records(Channel::Application, vec![r]);
        let d = Diagnoser::new(Box::new(src)).investigate(EXE, LookbackWindow::TwoDays, now());
        assert_eq!(d.findings[0].interpretations.len(), 2);
        assert!(d.findings[0].interpretations[0].starts_with("Direct3D 11"));
    }

    #[test]
    fn empty_path_is_rejected_without_scanning() {
        let d = Diagnoser::new(Box::new(MemorySource::new())).investigate("  ", LookbackWindow::TwoDays, now());
        assert_eq!(d.scanned, 0);
        assert!(matches!(d.errors.as_slice(), [CrashError::Input { .. }]));
        assert!(d.header.root.is_none());
    }

    #[test]
    fn input_errors_serialize_to_json() {
        let d = Diagnoser::new(Box::new(MemorySource::new())).diagnose("", LookbackWindow::TwoDays);
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["errors"][0]["kind"], "input");
        assert_eq!(v["errors"][0]["message"], "Please select an executable file.");
        assert_eq!(v["findings"], serde_json::json!([]));
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.exe");
        let d = Diagnoser::new(Box::new(MemorySource::new())).diagnose(&missing.to_string_lossy(), LookbackWindow::Week);
        assert!(matches!(&d.errors[..], [CrashError::Input { message }] if message.starts_with("File does not exist")));
        let exe = dir.path().join("game.exe");
        std::fs::write(&exe, b"MZ").unwrap();
        assert!(validate_executable(&exe.to_string_lossy()).is_ok());
    }

    #[test]
    fn report_always_renders() {
        let rep = Diagnoser::new(Box::new(MemorySource::new())).report("", LookbackWindow::ThreeDays, RenderOptions::default());
        assert_eq!(rep.blocks[1], "ERROR: Please select an executable file.");
        assert!(rep.summary.starts_with("Summary: 0 crash event(s)"));
    }

    #[test]
    fn window_days() {
        assert_eq!(LookbackWindow::from_days(14), Some(LookbackWindow::TwoWeeks));
        assert_eq!(LookbackWindow::from_days(5), None);
        assert_eq!(LookbackWindow::default().days(), 2);
    }
}

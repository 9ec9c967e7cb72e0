use std::path::{Path, PathBuf};
use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::report::TimeZone;
use crate::root::RootTables;
use crate::signatures::SignatureEntry;
use crate::LookbackWindow;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "CrashDetective.toml";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFmt { #[default] Text, Json }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat { Text, Json }

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub days: Option<u32>,
    pub output: Option<OutputFmt>,
    pub time_zone: Option<TimeZone>,
    pub quick: Option<bool>,
    pub evtx_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub log_path: Option<PathBuf>,
    pub container_keywords: Option<Vec<String>>,
    pub generic_folders: Option<Vec<String>>,
    #[serde(default)]
    pub signatures: Vec<SignatureEntry>,
}

impl AppConfig {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// `days` as a window; only 2, 3, 7 and 14 are accepted.
    pub fn window(&self) -> anyhow::Result<Option<LookbackWindow>> {
        match self.days {
            None => Ok(None),
            Some(d) => match LookbackWindow::from_days(d) {
                Some(w) => Ok(Some(w)),
                None => bail!("days must be one of 2, 3, 7 or 14 (got {})", d),
            },
        }
    }

    /// Built-in resolver tables with any list given here swapped in whole.
    pub fn root_tables(&self) -> RootTables {
        let mut t = RootTables::default();
        if let Some(v) = self.container_keywords.as_ref() { t.container_keywords = v.iter().map(|s| s.to_lowercase()).collect(); }
        if let Some(v) = self.generic_folders.as_ref() { t.generic_folders = v.iter().map(|s| s.to_lowercase()).collect(); }
        t
    }
}

/// Loads `path` when given (failing if it cannot be read), otherwise
/// [`DEFAULT_CONFIG_FILE`] if it exists in `dir`.
pub fn load_config(path: Option<&Path>, dir: &Path) -> anyhow::Result<Option<AppConfig>> {
    let (p, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (dir.join(DEFAULT_CONFIG_FILE), false),
    };
    if !required && !p.exists() { return Ok(None); }
    let s = std::fs::read_to_string(&p).with_context(|| format!("reading config {}", p.to_string_lossy()))?;
    let cfg = AppConfig::parse(&s).with_context(|| format!("parsing config {}", p.to_string_lossy()))?;
    log::debug!("loaded config from {}", p.to_string_lossy());
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let cfg = AppConfig::parse(r#"
days = 7
output = "json"
time_zone = "utc"
quick = true
evtx_dir = "C:/exported"
log_format = "json"
container_keywords = ["Bin", "x64"]

[[signatures]]
pattern = "reshade"
explanation = "ReShade injector involved"
"#).unwrap();
        assert_eq!(cfg.window().unwrap(), Some(LookbackWindow::Week));
        assert_eq!(cfg.output, Some(OutputFmt::Json));
        assert_eq!(cfg.time_zone, Some(TimeZone::Utc));
        assert_eq!(cfg.quick, Some(true));
        assert_eq!(cfg.log_format, Some(LogFormat::Json));
        assert_eq!(cfg.signatures.len(), 1);
        let t = cfg.root_tables();
        assert_eq!(t.container_keywords, vec!["bin".to_string(), "x64".to_string()]);
        assert_eq!(t.generic_folders, RootTables::default().generic_folders);
    }

    #[test]
    fn invalid_days_are_rejected() {
        let cfg = AppConfig::parse("days = 5").unwrap();
        assert!(cfg.window().is_err());
        assert_eq!(AppConfig::default().window().unwrap(), None);
    }

    #[test]
    fn unknown_keys_fail() {
        assert!(AppConfig::parse("colour = true").is_err());
    }

    #[test]
    fn default_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(None, dir.path()).unwrap(), None);
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "days = 14\n").unwrap();
        let cfg = load_config(None, dir.path()).unwrap().unwrap();
        assert_eq!(cfg.days, Some(14));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing), dir.path()).is_err());
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "days = ").unwrap();
        assert!(load_config(Some(&bad), dir.path()).is_err());
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use evtx::EvtxParser;
use crate::error::SourceError;
use crate::event_xml::parse_record;
use crate::reader::{ChannelCursor, EventSource, SliceCursor};
use crate::record::{Channel, LogRecord};

/// Exported `.evtx` files in one directory, named after their channel
/// (`Application.evtx`, `System.evtx`).
pub struct EvtxSource {
    dir: PathBuf,
    loaded: HashMap<Channel, Vec<LogRecord>>,
}

impl EvtxSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into(), loaded: HashMap::new() } }

    pub fn channel_path(&self, channel: Channel) -> PathBuf { self.dir.join(format!("{}.evtx", channel.name())) }
}

fn load(path: &Path, channel: Channel) -> Result<Vec<LogRecord>, SourceError> {
    if !path.exists() { return Err(SourceError::Unavailable(format!("missing {}", path.to_string_lossy()))); }
    if let Err(e) = std::fs::File::open(path) {
        if e.kind() == std::io::ErrorKind::PermissionDenied { return Err(SourceError::AccessDenied); }
        return Err(SourceError::Unavailable(format!("{}: {}", path.to_string_lossy(), e)));
    }
    let mut parser = EvtxParser::from_path(path).map_err(|e| SourceError::Unavailable(format!("{}: {}", path.to_string_lossy(), e)))?;
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for r in parser.records() {
        let r = match r { Ok(r) => r, Err(e) => { log::debug!("skipping unreadable record in {}: {}", path.to_string_lossy(), e); skipped += 1; continue } };
        match parse_record(&r.data, channel) { Some(rec) => out.push(rec), None => skipped += 1 }
    }
    // files are stored oldest first; readers expect newest first
    out.sort_by(|a, b| b.time.cmp(&a.time));
    log::debug!("loaded {} records from {} ({} skipped)", out.len(), path.to_string_lossy(), skipped);
    Ok(out)
}

impl EventSource for EvtxSource {
    fn open(&mut self, channel: Channel) -> Result<Box<dyn ChannelCursor + '_>, SourceError> {
        if !self.loaded.contains_key(&channel) {
            let records = load(&self.channel_path(channel), channel)?;
            self.loaded.insert(channel, records);
        }
        match self.loaded.get(&channel) {
            Some(records) => Ok(Box::new(SliceCursor::new(records))),
            None => Err(SourceError::Unavailable(channel.to_string())),
        }
    }
}

//! Backward, batched retrieval of records from a log channel.
//!
//! The OS log service sits behind [`EventSource`]/[`ChannelCursor`]; [`ChannelQuery`]
//! applies the cutoff, the event-ID filter and the quota on top of it.

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use crate::error::{CrashError, SourceError};
use crate::record::{Channel, LogRecord, Severity};

pub const BATCH_SIZE: usize = 64;

pub trait EventSource {
    fn open(&mut self, channel: Channel) -> Result<Box<dyn ChannelCursor + '_>, SourceError>;
}

/// An open channel handle. Dropping it closes the channel.
pub trait ChannelCursor {
    /// Next batch of at most `max` records, newest first. An empty batch means the
    /// channel is exhausted.
    fn read_backward(&mut self, max: usize) -> Result<Vec<LogRecord>, SourceError>;
}

#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub records: Vec<LogRecord>,
    /// Records observed before the read stopped, whatever their filter outcome.
    pub scanned: usize,
    pub error: Option<CrashError>,
}

#[derive(Clone, Debug)]
pub struct ChannelQuery<'a> {
    pub channel: Channel,
    pub cutoff: DateTime<Utc>,
    pub ids: Option<&'a [u16]>,
    pub quota: Option<usize>,
    pub batch_size: usize,
}

impl<'a> ChannelQuery<'a> {
    pub fn new(channel: Channel, cutoff: DateTime<Utc>) -> Self {
        Self { channel, cutoff, ids: None, quota: None, batch_size: BATCH_SIZE }
    }

    pub fn ids(mut self, ids: &'a [u16]) -> Self { self.ids = Some(ids); self }

    pub fn quota(mut self, quota: usize) -> Self { self.quota = Some(quota); self }

    pub fn read(&self, source: &mut dyn EventSource) -> ReadOutcome { self.read_matching(source, |_| true) }

    /// Like [`read`](Self::read) but only records accepted by `keep` count against
    /// the quota and are returned.
    pub fn read_matching<F>(&self, source: &mut dyn EventSource, mut keep: F) -> ReadOutcome
    where F: FnMut(&LogRecord) -> bool {
        let mut out = ReadOutcome::default();
        if self.quota == Some(0) { return out; }
        let mut cursor = match source.open(self.channel) {
            Ok(c) => c,
            Err(e) => {
                let err = CrashError::from_source(self.channel, e);
                if err.is_fatal() { log::error!("{}", err); } else { log::warn!("{}", err); }
                out.error = Some(err);
                return out;
            }
        };
        loop {
            let batch = match cursor.read_backward(self.batch_size.max(1)) {
                Ok(b) => b,
                Err(e) => {
                    let err = CrashError::from_source(self.channel, e);
                    log::warn!("{} (kept {} records)", err, out.records.len());
                    out.error = Some(err);
                    return out;
                }
            };
            if batch.is_empty() {
                log::debug!("{}: end of channel after {} records", self.channel, out.scanned);
                return out;
            }
            for rec in batch {
                if rec.time < self.cutoff {
                    log::debug!("{}: reached cutoff {} after {} records", self.channel, self.cutoff, out.scanned);
                    return out;
                }
                out.scanned += 1;
                if rec.severity != Severity::Error { continue; }
                if let Some(ids) = self.ids && !ids.contains(&rec.event_id) { continue; }
                if !keep(&rec) { continue; }
                out.records.push(rec);
                if self.quota.is_some_and(|q| out.records.len() >= q) {
                    log::debug!("{}: quota of {} reached", self.channel, out.records.len());
                    return out;
                }
            }
        }
    }
}

/// Channel contents held in memory, newest first. Also remembers which channels
/// were opened, in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    channels: HashMap<Channel, Result<Vec<LogRecord>, SourceError>>,
    opened: Vec<Channel>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    /// Stores `records` for `channel`, sorted newest first.
    pub fn with_records(mut self, channel: Channel, mut records: Vec<LogRecord>) -> Self {
        records.sort_by(|a, b| b.time.cmp(&a.time));
        self.channels.insert(channel, Ok(records));
        self
    }

    pub fn with_failure(mut self, channel: Channel, e: SourceError) -> Self {
        self.channels.insert(channel, Err(e));
        self
    }

    pub fn opened(&self) -> &[Channel] { &self.opened }
}

impl EventSource for MemorySource {
    fn open(&mut self, channel: Channel) -> Result<Box<dyn ChannelCursor + '_>, SourceError> {
        self.opened.push(channel);
        match self.channels.get(&channel) {
            Some(Ok(records)) => Ok(Box::new(SliceCursor { records, pos: 0 })),
            Some(Err(e)) => Err(e.clone()),
            None => Err(SourceError::Unavailable(format!("no {} log", channel))),
        }
    }
}

/// Serves an already-ordered slice in batches.
pub struct SliceCursor<'a> {
    records: &'a [LogRecord],
    pos: usize,
}

impl<'a> SliceCursor<'a> {
    pub fn new(records: &'a [LogRecord]) -> Self { Self { records, pos: 0 } }
}

impl ChannelCursor for SliceCursor<'_> {
    fn read_backward(&mut self, max: usize) -> Result<Vec<LogRecord>, SourceError> {
        let end = (self.pos + max).min(self.records.len());
        let batch = self.records[self.pos..end].to_vec();
        self.pos = end;
        Ok(batch)
    }
}

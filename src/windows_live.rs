use std::ptr;
use windows_sys::Win32::Foundation::{GetLastError, ERROR_ACCESS_DENIED};
use windows_sys::Win32::System::EventLog::*;
use crate::error::SourceError;
use crate::event_xml::parse_record;
use crate::reader::{ChannelCursor, EventSource};
use crate::record::{Channel, LogRecord};

const ERROR_NO_MORE_ITEMS: u32 = 259;
const ERROR_TIMEOUT: u32 = 1460;
const NEXT_TIMEOUT_MS: u32 = 1000;

struct Handle(EVT_HANDLE);
impl Drop for Handle { fn drop(&mut self) { unsafe { EvtClose(self.0); } } }

fn w(s: &str) -> Vec<u16> { let mut v = s.encode_utf16().collect::<Vec<u16>>(); v.push(0); v }

/// The local machine's Windows Event Log.
#[derive(Default)]
pub struct LiveSource;

impl LiveSource {
    pub fn new() -> Self { LiveSource }
}

impl EventSource for LiveSource {
    fn open(&mut self, channel: Channel) -> Result<Box<dyn ChannelCursor + '_>, SourceError> {
        let path = w(channel.name());
        let query = w("*");
        let h = unsafe { EvtQuery(0, path.as_ptr(), query.as_ptr(), EvtQueryChannelPath | EvtQueryReverseDirection) };
        if h == 0 {
            let code = unsafe { GetLastError() };
            if code == ERROR_ACCESS_DENIED { return Err(SourceError::AccessDenied); }
            return Err(SourceError::Unavailable(format!("EvtQuery failed for {}: {}", channel, code)));
        }
        Ok(Box::new(LiveCursor { handle: Handle(h), channel }))
    }
}

struct LiveCursor {
    handle: Handle,
    channel: Channel,
}

impl ChannelCursor for LiveCursor {
    fn read_backward(&mut self, max: usize) -> Result<Vec<LogRecord>, SourceError> {
        // an empty result ends the read, so keep going while whole batches fail to render
        loop {
            let mut arr: Vec<EVT_HANDLE> = vec![0; max];
            let mut returned: u32 = 0;
            let ok = unsafe { EvtNext(self.handle.0, arr.len() as u32, arr.as_mut_ptr(), NEXT_TIMEOUT_MS, 0, &mut returned) };
            if ok == 0 {
                let code = unsafe { GetLastError() };
                log::debug!("{}: EvtNext stopped with {}", self.channel, code);
                return match next_failure(code) { Some(e) => Err(e), None => Ok(Vec::new()) };
            }
            if returned == 0 { return Ok(Vec::new()); }
            let mut out = Vec::with_capacity(returned as usize);
            for &ev in arr.iter().take(returned as usize) {
                let ev = Handle(ev);
                let xml = match unsafe { render_xml(ev.0) } {
                    Ok(x) => x,
                    Err(code) => { log::debug!("{}: skipping event, EvtRender failed with {}", self.channel, code); continue; }
                };
                match parse_record(&xml, self.channel) {
                    Some(rec) => out.push(rec),
                    None => log::debug!("{}: skipping event with unparseable XML", self.channel),
                }
            }
            if !out.is_empty() { return Ok(out); }
        }
    }
}

/// Error for a failed `EvtNext`, or `None` when the code just means the channel is done.
fn next_failure(code: u32) -> Option<SourceError> {
    match code {
        0 | ERROR_NO_MORE_ITEMS | ERROR_TIMEOUT => None,
        ERROR_ACCESS_DENIED => Some(SourceError::AccessDenied),
        _ => Some(SourceError::Read(format!("EvtNext error: {}", code))),
    }
}

/// Event XML, or the Win32 error code that stopped the render.
unsafe fn render_xml(ev: EVT_HANDLE) -> Result<String, u32> {
    let mut used: u32 = 0;
    let mut count: u32 = 0;
    let sized = unsafe { EvtRender(0, ev, EvtRenderEventXml, 0, ptr::null_mut(), &mut used, &mut count) };
    if sized != 0 || used == 0 {
        return Err(if sized != 0 { 0 } else { unsafe { GetLastError() } });
    }
    let mut buf: Vec<u16> = vec![0u16; (used as usize).div_ceil(2)];
    let size = used;
    if unsafe { EvtRender(0, ev, EvtRenderEventXml, size, buf.as_mut_ptr() as *mut _, &mut used, &mut count) } == 0 {
        return Err(unsafe { GetLastError() });
    }
    Ok(String::from_utf16_lossy(&buf).trim_matches(char::from(0)).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_exhaustion_end_the_channel() {
        assert_eq!(next_failure(ERROR_NO_MORE_ITEMS), None);
        assert_eq!(next_failure(ERROR_TIMEOUT), None);
        assert_eq!(next_failure(0), None);
        assert_eq!(next_failure(ERROR_ACCESS_DENIED), Some(SourceError::AccessDenied));
        assert!(matches!(next_failure(1784), Some(SourceError::Read(_))));
    }
}

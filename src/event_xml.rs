use chrono::{DateTime, SubsecRound, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use crate::record::{mask_event_id, Channel, LogRecord, Severity};

#[derive(Default)]
struct Parsed {
    time: Option<DateTime<Utc>>,
    level: u8,
    source_name: String,
    provider_name: String,
    event_id: u32,
    qualifiers: u32,
    fields: Vec<String>,
    binary: String,
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    for a in e.attributes().flatten() {
        if a.key.as_ref() == key.as_bytes() && let Ok(v) = a.unescape_value() { return Some(v.to_string()); }
    }
    None
}

fn on_tag(e: &BytesStart<'_>, p: &mut Parsed, in_event_data: bool) {
    match e.name().as_ref() {
        b"TimeCreated" => { if let Some(v) = attr(e, "SystemTime") { p.time = parse_system_time(&v); } }
        b"Provider" => {
            if let Some(v) = attr(e, "Name") { p.provider_name = v; }
            if let Some(v) = attr(e, "EventSourceName") { p.source_name = v; }
        }
        b"EventID" => { if let Some(q) = attr(e, "Qualifiers").and_then(|s| s.trim().parse::<u32>().ok()) { p.qualifiers = q; } }
        b"Data" if in_event_data => p.fields.push(String::new()),
        _ => {}
    }
}

/// Parses one rendered event into a record. Returns `None` when the XML is malformed
/// or carries no creation time.
pub fn parse_record(xml: &str, channel: Channel) -> Option<LogRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut p = Parsed::default();
    let mut cur = String::new();
    let mut in_event_data = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                cur = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if cur == "EventData" { in_event_data = true; }
                on_tag(&e, &mut p, in_event_data);
            }
            Ok(XmlEvent::Empty(e)) => {
                on_tag(&e, &mut p, in_event_data);
                cur.clear();
            }
            Ok(XmlEvent::End(e)) => {
                if e.name().as_ref() == b"EventData" { in_event_data = false; }
                cur.clear();
            }
            Ok(XmlEvent::Text(t)) => {
                let v = t.unescape().map(|c| c.into_owned()).unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                match cur.as_str() {
                    "Level" => { if let Ok(n) = v.trim().parse::<u8>() { p.level = n; } }
                    "EventID" => { if let Ok(n) = v.trim().parse::<u32>() { p.event_id = n; } }
                    "Data" if in_event_data => { if let Some(last) = p.fields.last_mut() { last.push_str(&v); } }
                    "Binary" if in_event_data => p.binary.push_str(v.trim()),
                    _ => {}
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => { log::debug!("malformed event xml: {}", e); return None; }
            _ => {}
        }
        buf.clear();
    }
    let time = p.time?;
    let source = if p.source_name.is_empty() { p.provider_name } else { p.source_name };
    Some(LogRecord {
        time,
        channel,
        source,
        event_id: mask_event_id((p.qualifiers << 16) | (p.event_id & 0xFFFF)),
        severity: Severity::from_level(p.level),
        fields: p.fields,
        payload: decode_hex(&p.binary),
    })
}

/// Best-effort hex decode; stops at the first invalid pair.
pub fn decode_hex(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let Ok(hex) = std::str::from_utf8(pair) else { break };
        match u8::from_str_radix(hex, 16) { Ok(b) => out.push(b), Err(_) => break }
    }
    out
}

pub fn parse_system_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc).trunc_subsecs(0)); }
    let mut alt = s.replace(' ', "T");
    if !alt.ends_with('Z') && !alt.contains('+') { alt.push('Z'); }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&alt) { return Some(dt.with_timezone(&Utc).trunc_subsecs(0)); }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") { return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).trunc_subsecs(0)); }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const APP_ERROR: &str = "<Event xmlns=\"http://schemas.microsoft.com/win/2004/08/events/event\"><System><Provider Name=\"Application Error\"/><EventID Qualifiers=\"0\">1000</EventID><Level>2</Level><TimeCreated SystemTime=\"2026-10-14T08:15:42.1234567Z\"/><Channel>Application</Channel></System><EventData><Data>game.exe</Data><Data>1.0.2.0</Data><Data>65f1a2b3</Data><Data>nvwgf2umx.dll</Data><Data/><Data>0xc0000005</Data><Binary>6F6B00</Binary></EventData></Event>";

    #[test]
    fn parses_application_error_event() {
        let r = parse_record(APP_ERROR, Channel::Application).unwrap();
        assert_eq!(r.source, "Application Error");
        assert_eq!(r.event_id, 1000);
        assert_eq!(r.severity, Severity::Error);
        assert_eq!(r.time, Utc.with_ymd_and_hms(2026, 10, 14, 8, 15, 42).unwrap());
        assert_eq!(r.fields, vec!["game.exe", "1.0.2.0", "65f1a2b3", "nvwgf2umx.dll", "", "0xc0000005"]);
        assert_eq!(r.payload, vec![b'o', b'k', 0]);
    }

    #[test]
    fn qualifiers_are_masked_off() {
        let xml = "<Event><System><Provider Name=\"Service Control Manager\" EventSourceName=\"Service Control Manager\"/><EventID Qualifiers=\"49152\">7031</EventID><Level>2</Level><TimeCreated SystemTime=\"2026-10-14 08:00:00\"/></System><EventData><Data Name=\"param1\">Steam Client Service</Data></EventData></Event>";
        let r = parse_record(xml, Channel::System).unwrap();
        assert_eq!(r.event_id, 7031);
        assert_eq!(r.fields, vec!["Steam Client Service"]);
        assert!(r.payload.is_empty());
    }

    #[test]
    fn event_source_name_wins_over_provider_name() {
        let xml = "<Event><System><Provider Name=\"Microsoft-Windows-Foo\" EventSourceName=\"Foo\"/><EventID>1</EventID><Level>2</Level><TimeCreated SystemTime=\"2026-10-14T08:00:00Z\"/></System></Event>";
        assert_eq!(parse_record(xml, Channel::System).unwrap().source, "Foo");
    }

    #[test]
    fn missing_time_is_rejected() {
        let xml = "<Event><System><Provider Name=\"X\"/><EventID>1000</EventID><Level>2</Level></System></Event>";
        assert!(parse_record(xml, Channel::Application).is_none());
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let xml = "<Event><System><Provider Name=\"X\"/><EventID>1000</EventID><Level>2</Level><TimeCreated SystemTime=\"2026-10-14T08:00:00Z\"/></System><EventData><Data>a &amp; b</Data></EventData></Event>";
        assert_eq!(parse_record(xml, Channel::Application).unwrap().fields, vec!["a & b"]);
    }

    #[test]
    fn hex_decode_stops_at_garbage() {
        assert_eq!(decode_hex("4142zz43"), vec![0x41, 0x42]);
        assert!(decode_hex("").is_empty());
    }
}

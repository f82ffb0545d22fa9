// Text framing of the local control port.
//
// `list` replies are `key: value [annotations]` lines, for example:
//
//     domestic_temperature: 120
//     set_domestic_temperature: +120 {r/w}
//     schedule_holiday: +false {70d}
//     m02_outlet_temperature: 118 'F'
//
// `sysinfo` replies carry one JSON line, and `set` replies echo
// `#? set '<property>' to <value>`.

use serde_json::Value;

use crate::model::{PropertyMap, PropertyValue, SysInfo};

/// Parse a `list` reply. Lines without a `key:` prefix are ignored.
pub fn parse_list(reply: &str) -> PropertyMap {
    let mut props = PropertyMap::new();

    for line in reply.lines() {
        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') || key.contains(char::is_whitespace) {
            continue;
        }
        let raw = raw.trim();

        let value = match key {
            "set_domestic_temperature" => {
                if raw.to_ascii_lowercase().contains("null") {
                    PropertyValue::Null
                } else {
                    first_number(raw).map_or_else(|| PropertyValue::parse_token(raw), PropertyValue::Int)
                }
            }
            "schedule_holiday" => PropertyValue::parse_token(&strip_annotations(&raw.replace('+', ""))),
            _ => {
                let token = raw.split_whitespace().next().unwrap_or_default();
                PropertyValue::parse_token(&token.replace('\'', ""))
            }
        };
        props.insert(key.to_owned(), value);
    }

    // A null setpoint means "same as the current domestic temperature".
    if matches!(props.get("set_domestic_temperature"), Some(PropertyValue::Null)) {
        if let Some(current) = props.get("domestic_temperature").cloned() {
            props.insert("set_domestic_temperature".to_owned(), current);
        }
    }

    props
}

/// Parse a `sysinfo` reply. `None` when no JSON line carries a serial.
pub fn parse_sysinfo(reply: &str) -> Option<SysInfo> {
    let json = reply
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<Value>(l).ok())?;
    let info = json.get("sysinfo").unwrap_or(&json);

    let serial = scalar_text(info.get("serial-number")?)?;
    let firmware = info.get("fw-version").and_then(scalar_text);
    Some(SysInfo { serial, firmware })
}

/// Whether a `set` reply acknowledges `property`.
pub fn check_ack(reply: &str, property: &str) -> bool {
    reply.contains(&format!("set '{property}'"))
}

fn first_number(raw: &str) -> Option<i64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Drop `{...}` annotation groups.
fn strip_annotations(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0_u32;
    for c in raw.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_owned()
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

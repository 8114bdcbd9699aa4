//! Event scripts for replaying switch traffic
//!
//! One event per line, `#` starts a comment:
//!
//! ```text
//! connect <switch>
//! packet <switch> <in_port> <buffer_id|-> <hex frame> [total_len]
//! ```

use super::{ControllerEvent, PacketInEvent};
use crate::{Error, Result};
use std::path::Path;

/// Read and parse an event script
pub async fn load_events(path: &Path) -> Result<Vec<ControllerEvent>> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_events(&content)
}

pub fn parse_events(content: &str) -> Result<Vec<ControllerEvent>> {
    let mut events = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        let event = parse_line(line).map_err(|e| Error::Parse(format!("line {}: {}", idx + 1, e)))?;
        events.push(event);
    }

    Ok(events)
}

fn parse_line(line: &str) -> std::result::Result<ControllerEvent, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    match fields.as_slice() {
        ["connect", switch] => Ok(ControllerEvent::SwitchConnected {
            switch_id: parse_num(switch, "switch id")?,
        }),
        ["packet", switch, in_port, buffer, frame, rest @ ..] if rest.len() <= 1 => {
            let data = hex::decode(frame).map_err(|e| format!("invalid frame hex: {}", e))?;
            let buffer_id = match *buffer {
                "-" => None,
                id => Some(parse_num(id, "buffer id")?),
            };
            let total_len = match rest.first() {
                Some(len) => parse_num(len, "total length")?,
                None => data.len(),
            };

            Ok(ControllerEvent::PacketIn(PacketInEvent {
                switch_id: parse_num(switch, "switch id")?,
                in_port: parse_num(in_port, "port")?,
                data,
                buffer_id,
                total_len,
            }))
        }
        [kind, ..] => Err(format!("unrecognized event '{}'", kind)),
        [] => Err("empty event".to_string()),
    }
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {} '{}'", what, value))
}

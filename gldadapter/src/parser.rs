/// Parsers for simulator debugger output
///
/// Free functions that turn single framed lines into model types. Lines
/// that do not match a recognized shape are rejected rather than
/// partially parsed, so callers can pass them through as plain output.
use crate::types::{GldObject, GlobalList, ObjectProperties, ServiceStatus, SyncStatus};

/// Minimum length of a parseable object listing line
const LISTING_MIN_LEN: usize = 55;

/// Parse one fixed-column line of a `list` response.
///
/// Columns: flags 0-5, rank 7-10, clock 12-35, name 37-52, parent 54+.
/// Returns None for headers, separators, and anything too short.
pub fn parse_object_listing(msg: &str) -> Option<GldObject> {
    if msg.len() < LISTING_MIN_LEN {
        return None;
    }
    let bytes = msg.as_bytes();
    let rank = msg.get(7..11)?.trim().parse::<i32>().ok()?;

    let mut obj = GldObject::new(msg.get(37..53)?.trim());
    obj.service = ServiceStatus::from_code(bytes[0] as char);
    obj.presync = SyncStatus::from_code(bytes[1] as char);
    obj.sync = SyncStatus::from_code(bytes[2] as char);
    obj.postsync = SyncStatus::from_code(bytes[3] as char);
    obj.locked = bytes[4] == b'1';
    obj.has_plc = bytes[5] == b'x';
    obj.rank = rank;
    obj.clock = msg.get(12..36)?.trim().to_string();
    obj.parent_name = msg.get(54..)?.trim().to_string();
    Some(obj)
}

/// Parse one line of a `globals` response into the list.
///
/// The name column is padded to a fixed width, so the separator is the
/// first colon at or past offset 30. One surrounding layer of double
/// quotes is stripped from the value.
pub fn parse_global_line(globals: &mut GlobalList, msg: &str) {
    let msg = msg.trim();
    let index = match msg.get(30..).and_then(|tail| tail.find(':')) {
        Some(i) => i + 30,
        None => return,
    };
    let name = msg[..index].trim();
    let mut value = msg[index + 1..].trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }
    globals.add(name, value);
}

/// Parse one line of a `print` response into the accumulator.
///
/// `DEBUG: object <name> {` opens the dump and names the object,
/// `<type> <name> = <value>;` lines carry typed properties, and bare
/// two-token lines carry untyped ones. `...` continuations are dropped.
pub fn parse_property_line(props: &mut ObjectProperties, msg: &str) {
    let msg = msg.trim();
    if let Some(rest) = msg.strip_prefix("DEBUG: object") {
        if let Some(brace) = rest.find('{') {
            props.object_name = rest[..brace].trim().to_string();
        }
    } else if msg.starts_with("...") {
        // continuation noise from verbose property dumps
    } else if let Some(eq) = msg.find('=') {
        let mut value = msg[eq + 1..].trim();
        value = value.strip_suffix(';').unwrap_or(value);
        let left = msg[..eq].trim();
        let tokens: Vec<&str> = left.split_whitespace().collect();
        if tokens.len() > 1 {
            props.add(tokens[1], value, Some(tokens[0]));
        } else {
            props.add(left, value, None);
        }
    } else {
        let tokens: Vec<&str> = msg.split_whitespace().collect();
        if tokens.len() == 2 {
            props.add(tokens[0], tokens[1], None);
        }
    }
}

/// One classified line of step-status output
#[derive(Debug, Clone, PartialEq)]
pub enum StepLine<'a> {
    /// Clock position, from a `DEBUG: time` line
    Clock(&'a str),
    /// Scheduler position, from a `DEBUG: pass` line
    Pass {
        pass: &'a str,
        rank: i32,
        object: &'a str,
        iteration: i32,
    },
    /// Recognized chatter with no fields worth keeping
    Consumed,
    /// Not step-status output at all
    Unrecognized,
}

/// Classify one line of the output that follows `run` and `next`.
pub fn parse_step_line(msg: &str) -> StepLine<'_> {
    if let Some(rest) = msg.strip_prefix("DEBUG: time") {
        return StepLine::Clock(rest.trim());
    }
    if let Some(rest) = msg.strip_prefix("DEBUG: pass") {
        return parse_pass_segments(rest).unwrap_or(StepLine::Unrecognized);
    }
    if msg.starts_with("DEBUG: ") && msg.contains(" next sync ") {
        return StepLine::Consumed;
    }
    if msg.trim().is_empty() {
        return StepLine::Consumed;
    }
    StepLine::Unrecognized
}

/// `DEBUG: pass BOTTOMUP, rank 0, object house:1, iteration 1`
fn parse_pass_segments(rest: &str) -> Option<StepLine<'_>> {
    let mut segments = rest.trim().split(',');
    let pass = segments.next()?.trim();
    let rank = second_token(segments.next()?)?.parse().ok()?;
    let object = second_token(segments.next()?)?;
    let iteration = second_token(segments.next()?)?.parse().ok()?;
    Some(StepLine::Pass {
        pass,
        rank,
        object,
        iteration,
    })
}

fn second_token(segment: &str) -> Option<&str> {
    segment.split_whitespace().nth(1)
}

/// Value of a dotted context line (`DEBUG: Global clock...... <value>`).
///
/// Scans forward from the first dot to the first space and returns the
/// trimmed remainder.
pub fn parse_dotted_value(msg: &str) -> Option<&str> {
    let bytes = msg.as_bytes();
    let mut index = msg.find('.')?;
    while index + 1 < bytes.len() {
        index += 1;
        if bytes[index] == b' ' {
            return Some(msg[index + 1..].trim());
        }
    }
    None
}

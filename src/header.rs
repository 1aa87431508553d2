//! Reading and writing the C offset header.
//!
//! The native side of the service consumes the layout as a header of
//! `#define NAME VALUE` lines. [`render_header`] produces that text from the
//! built-in table, [`parse_header`] and [`slots_from_header`] read it back,
//! and [`check_header`] reports the first difference between a header found
//! on disk and the table compiled into this crate.
//!
//! ```rust
//! use mmsperf::header::{check_header, render_header, slots_from_header};
//!
//! let text = render_header();
//! assert!(text.contains("#define PERF_MAX_COUNTER"));
//!
//! let parsed = slots_from_header(&text).unwrap();
//! assert_eq!(parsed.slots.len(), 56);
//! assert_eq!(parsed.max, 110);
//!
//! check_header(&text).unwrap();
//! ```

use std::fmt::Write as _;

use crate::error::{HeaderError, PerfError};
use crate::layout::{self, offsets, CounterId, CounterSlot, SLOTS};

/// Name of the bound define.
pub const MAX_COUNTER_NAME: &str = "PERF_MAX_COUNTER";

const NAME_WIDTH: usize = 51;
const VALUE_WIDTH: usize = 3;

/// One `#define` read from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDefine {
    /// 1-based line number.
    pub line: usize,
    pub name: String,
    pub value: u16,
    /// Trailing `//` comment, trimmed.
    pub comment: Option<String>,
}

/// A layout read from header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Slots in the order the header declares them.
    pub slots: Vec<CounterSlot>,
    /// The declared `PERF_MAX_COUNTER`.
    pub max: u16,
}

impl HeaderLayout {
    /// Runs [`layout::validate`] on the parsed table.
    pub fn validate(&self) -> Result<(), crate::error::LayoutError> {
        layout::validate(&self.slots, self.max)
    }
}

/// Reads every `#define NAME VALUE` line, in order.
///
/// Blank lines, `//` and `/* */` comments and other preprocessor
/// directives are skipped, and so are defines without a value such as
/// include guards. Values may be decimal or `0x` hexadecimal.
pub fn parse_header(text: &str) -> Result<Vec<HeaderDefine>, HeaderError> {
    let mut defines = Vec::new();
    let mut in_block_comment = false;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let stripped = strip_block_comments(raw, &mut in_block_comment);
        let rest = stripped.trim();

        if rest.is_empty() || rest.starts_with("//") {
            continue;
        }

        let Some(directive) = rest.strip_prefix('#') else {
            tracing::warn!(line, text = rest, "skipping unexpected header line");
            continue;
        };
        let directive = directive.trim_start();
        let Some(body) = directive.strip_prefix("define") else {
            tracing::trace!(line, directive, "skipping preprocessor directive");
            continue;
        };

        let (body, comment) = match body.split_once("//") {
            Some((body, comment)) => (body, Some(comment.trim().to_string())),
            None => (body, None),
        };
        let mut words = body.split_whitespace();
        let Some(name) = words.next() else {
            return Err(HeaderError::InvalidValue {
                line,
                name: String::new(),
                value: String::new(),
            });
        };
        let value_text = words.collect::<Vec<_>>().join(" ");
        if value_text.is_empty() {
            tracing::trace!(line, name, "skipping define without value");
            continue;
        }
        let value = parse_value(&value_text).ok_or_else(|| HeaderError::InvalidValue {
            line,
            name: name.to_string(),
            value: value_text.clone(),
        })?;

        defines.push(HeaderDefine {
            line,
            name: name.to_string(),
            value,
            comment: comment.filter(|c| !c.is_empty()),
        });
    }

    Ok(defines)
}

/// Drops `/* */` spans from one line, tracking comments left open across
/// lines. A `/*` after a `//` is part of the line comment.
fn strip_block_comments(raw: &str, in_block_comment: &mut bool) -> String {
    let mut out = String::new();
    let mut rest = raw;
    loop {
        if *in_block_comment {
            match rest.find("*/") {
                Some(end) => {
                    *in_block_comment = false;
                    rest = &rest[end + 2..];
                }
                None => return out,
            }
        }
        let line_comment = rest.find("//");
        match rest.find("/*") {
            Some(start) if line_comment.map_or(true, |lc| start < lc) => {
                out.push_str(&rest[..start]);
                out.push(' ');
                rest = &rest[start + 2..];
                *in_block_comment = true;
            }
            _ => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn parse_value(text: &str) -> Option<u16> {
    let text = text.trim().trim_start_matches('(').trim_end_matches(')');
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Parses header text and resolves every define against [`CounterId`].
///
/// The slot's category, kind and description come from the built-in table;
/// the offset is the one the header declares. An unknown name fails, so a
/// header from a newer build is rejected rather than silently truncated.
pub fn slots_from_header(text: &str) -> Result<HeaderLayout, HeaderError> {
    let mut slots = Vec::new();
    let mut max = None;

    for define in parse_header(text)? {
        if define.name == MAX_COUNTER_NAME {
            max = Some(define.value);
            continue;
        }
        let id: CounterId = define
            .name
            .parse()
            .map_err(|_| HeaderError::UnknownName {
                line: define.line,
                name: define.name.clone(),
            })?;
        slots.push(CounterSlot {
            offset: define.value,
            ..*id.slot()
        });
    }

    let max = max.ok_or(HeaderError::MissingBound)?;
    Ok(HeaderLayout { slots, max })
}

/// Renders the built-in table as header text.
///
/// Each category is its own paragraph, values are right aligned, and the
/// documented slots carry their description as a trailing comment.
pub fn render_header() -> String {
    let mut out = String::new();
    out.push_str("//////////////////////////////////////////////////////////////////////////////\n");
    out.push_str("//\n");
    out.push_str("//      Performance counter offsets of the synchronization service.\n");
    out.push_str("//      Generated by mmsperf; offsets must not be renumbered.\n");
    out.push_str("//\n");
    out.push_str("//////////////////////////////////////////////////////////////////////////////\n");
    out.push_str("\n#pragma once\n");

    let mut category = None;
    for slot in SLOTS {
        if category != Some(slot.category) {
            out.push('\n');
            category = Some(slot.category);
        }
        push_define(&mut out, slot.name, slot.offset, slot.description);
    }

    out.push('\n');
    push_define(
        &mut out,
        MAX_COUNTER_NAME,
        offsets::PERF_MAX_COUNTER,
        Some("Note: same as highest counter value"),
    );
    out
}

fn push_define(out: &mut String, name: &str, value: u16, comment: Option<&str>) {
    // Writing to a String cannot fail.
    let _ = write!(out, "#define {name:<NAME_WIDTH$}{value:>VALUE_WIDTH$}");
    if let Some(comment) = comment {
        let _ = write!(out, " // {comment}");
    }
    out.push('\n');
}

/// Parses `text`, validates it and compares it with the built-in table.
///
/// Returns the first difference found: a header that fails
/// [`layout::validate`], another bound, a slot the header lacks or a slot
/// at another offset.
pub fn check_header(text: &str) -> Result<(), PerfError> {
    let parsed = slots_from_header(text)?;
    parsed.validate()?;

    if parsed.max != offsets::PERF_MAX_COUNTER {
        let err = HeaderError::OffsetMismatch {
            name: MAX_COUNTER_NAME.to_string(),
            expected: offsets::PERF_MAX_COUNTER,
            found: parsed.max,
        };
        tracing::warn!(%err, "offset header does not match built-in layout");
        return Err(err.into());
    }

    for expected in SLOTS {
        let found = parsed.slots.iter().find(|s| s.id == expected.id);
        let err = match found {
            None => HeaderError::MissingCounter {
                name: expected.name.to_string(),
            },
            Some(slot) if slot.offset != expected.offset => HeaderError::OffsetMismatch {
                name: expected.name.to_string(),
                expected: expected.offset,
                found: slot.offset,
            },
            Some(_) => continue,
        };
        tracing::warn!(%err, "offset header does not match built-in layout");
        return Err(err.into());
    }

    tracing::debug!(slots = parsed.slots.len(), max = parsed.max, "offset header matches");
    Ok(())
}

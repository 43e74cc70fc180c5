use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DamageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid range literal {0:?} (expected START:LENGTH)")]
    InvalidRange(String),

    #[error("Mapfile line {line}: {reason}")]
    InvalidMapfile { line: usize, reason: String },
}

/// One damaged byte interval on the device, `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadRange {
    pub start: u64,
    pub length: u64,
}

impl BadRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    /// Parses a `START:LENGTH` literal; both fields take decimal or `0x` hex.
    pub fn parse(literal: &str) -> Result<Self, DamageError> {
        let (start, length) = literal
            .split_once(':')
            .ok_or_else(|| DamageError::InvalidRange(literal.to_string()))?;
        let start =
            parse_u64(start.trim()).ok_or_else(|| DamageError::InvalidRange(literal.to_string()))?;
        let length = parse_u64(length.trim())
            .ok_or_else(|| DamageError::InvalidRange(literal.to_string()))?;
        Ok(Self { start, length })
    }
}

fn parse_u64(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// The set of damaged byte ranges. Immutable after load; queries are a linear
/// scan, which is fine for the handful of ranges a damaged disk produces.
#[derive(Debug, Default)]
pub struct DamageMap {
    ranges: Vec<BadRange>,
}

impl DamageMap {
    pub fn new(ranges: Vec<BadRange>) -> Self {
        Self { ranges }
    }

    /// Loads the non-finished extents of a GNU ddrescue mapfile. Any status
    /// other than `+` (bad, non-tried, non-trimmed, non-scraped) counts as
    /// damaged.
    pub fn from_mapfile(path: impl AsRef<Path>) -> Result<Self, DamageError> {
        let text = fs::read_to_string(path)?;
        let mut ranges = Vec::new();
        let mut saw_status_line = false;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // The first non-comment line is the current-position status line.
            if !saw_status_line {
                saw_status_line = true;
                continue;
            }

            let mut fields = line.split_whitespace();
            let (pos, size, status) = match (fields.next(), fields.next(), fields.next()) {
                (Some(p), Some(s), Some(st)) => (p, s, st),
                _ => {
                    return Err(DamageError::InvalidMapfile {
                        line: idx + 1,
                        reason: format!("expected `pos size status`, got {line:?}"),
                    });
                }
            };

            let start = parse_u64(pos).ok_or_else(|| DamageError::InvalidMapfile {
                line: idx + 1,
                reason: format!("bad position {pos:?}"),
            })?;
            let length = parse_u64(size).ok_or_else(|| DamageError::InvalidMapfile {
                line: idx + 1,
                reason: format!("bad size {size:?}"),
            })?;

            if status != "+" {
                ranges.push(BadRange { start, length });
            }
        }

        Ok(Self { ranges })
    }

    pub fn extend(&mut self, ranges: impl IntoIterator<Item = BadRange>) {
        self.ranges.extend(ranges);
    }

    /// True iff `[start, end)` intersects any damaged range.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.ranges
            .iter()
            .any(|r| end > r.start && start < r.end())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

//! In-place rewriting of weight literals in dispatch files.
//!
//! Substitution is textual and scoped to the first function with the given
//! name. Patching is best-effort: an axis whose syntax is not found is
//! reported and skipped, never guessed.
use crate::error::WeightCheckError;
use crate::literals::{literal_regions, READS_RE, READS_WRITES_RE, WEIGHT_RE, WRITES_RE};
use crate::numeric::{group_digits, normalize};
use crate::scope;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;

/// New literal values for one extrinsic; `None` leaves an axis alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub weight: Option<u64>,
    pub reads: Option<u64>,
    pub writes: Option<u64>,
}

impl Correction {
    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.reads.is_none() && self.writes.is_none()
    }
}

/// Corrections for every failing extrinsic of one pallet, keyed by name.
pub type PatchSet = BTreeMap<String, Correction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Weight,
    Reads,
    Writes,
}

impl Axis {
    fn as_str(self) -> &'static str {
        match self {
            Axis::Weight => "weight",
            Axis::Reads => "reads",
            Axis::Writes => "writes",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of patching one function in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub text: String,
    pub changed: bool,
    /// Requested axes for which no known literal syntax was found.
    pub unmatched: Vec<Axis>,
}

/// A literal occurrence: byte range of the number and its current value.
struct Site {
    range: Range<usize>,
    value: u64,
}

/// Rewrite the literals of the first function named `name` in `source`.
pub fn patch_source(source: &str, name: &str, correction: &Correction) -> PatchOutcome {
    let mut text = source.to_string();
    let mut unmatched = Vec::new();
    let requested = [
        (Axis::Weight, correction.weight),
        (Axis::Reads, correction.reads),
        (Axis::Writes, correction.writes),
    ];

    for (axis, target) in requested {
        let Some(target) = target else {
            continue;
        };
        // Offsets shift after every substitution, so locate again per axis.
        let site = scope::locate(&text, name).and_then(|scope| {
            literal_regions(&text, &scope)
                .into_iter()
                .find_map(|region| find_site(&text, region, axis))
        });
        match site {
            Some(site) if site.value == target => {}
            Some(site) => text.replace_range(site.range, &group_digits(target)),
            None => unmatched.push(axis),
        }
    }

    let changed = text != source;
    PatchOutcome {
        text,
        changed,
        unmatched,
    }
}

/// The last literal for `axis` inside `region`, in the syntaxes the
/// extractor recognizes.
fn find_site(text: &str, region: Range<usize>, axis: Axis) -> Option<Site> {
    let slice = &text[region.clone()];
    let site = match axis {
        Axis::Weight => last_capture(&WEIGHT_RE, slice, 1),
        Axis::Reads => rightmost(
            last_capture(&READS_WRITES_RE, slice, 1),
            last_capture(&READS_RE, slice, 1),
        ),
        Axis::Writes => rightmost(
            last_capture(&READS_WRITES_RE, slice, 2),
            last_capture(&WRITES_RE, slice, 1),
        ),
    }?;
    Some(Site {
        range: region.start + site.range.start..region.start + site.range.end,
        value: site.value,
    })
}

fn last_capture(re: &Regex, slice: &str, group: usize) -> Option<Site> {
    let found = re.captures_iter(slice).last()?.get(group)?;
    Some(Site {
        range: found.range(),
        value: normalize(found.as_str()),
    })
}

fn rightmost(a: Option<Site>, b: Option<Site>) -> Option<Site> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.range.start > a.range.start { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Patch one extrinsic in `path`; returns whether the file changed.
pub fn patch_file(path: &Path, name: &str, correction: &Correction) -> Result<bool> {
    let patches = PatchSet::from([(name.to_string(), *correction)]);
    apply_patch_set(path, &patches)
}

/// Apply every correction in `patches` to `path`, writing once.
///
/// Returns whether the file content changed; an unchanged file is not
/// rewritten.
pub fn apply_patch_set(path: &Path, patches: &PatchSet) -> Result<bool> {
    let original =
        fs::read_to_string(path).with_context(|| format!("read dispatch file {}", path.display()))?;
    let mut text = original.clone();

    for (name, correction) in patches {
        let outcome = patch_source(&text, name, correction);
        for axis in &outcome.unmatched {
            let warning = WeightCheckError::PatchApplication {
                path: path.to_path_buf(),
                extrinsic: name.clone(),
                axis: axis.as_str(),
            };
            tracing::warn!("{warning}");
        }
        if outcome.changed {
            tracing::info!(
                file = %path.display(),
                extrinsic = %name,
                weight = ?correction.weight,
                reads = ?correction.reads,
                writes = ?correction.writes,
                "patched literals"
            );
        }
        text = outcome.text;
    }

    if text == original {
        return Ok(false);
    }
    fs::write(path, text.as_bytes())
        .with_context(|| format!("write dispatch file {}", path.display()))?;
    Ok(true)
}

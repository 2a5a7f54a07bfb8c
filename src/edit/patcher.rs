// SPDX-License-Identifier: MIT

//! Approximate find-and-replace
//!
//! Locates an excerpt inside a document even when it was quoted with small
//! transcription differences, and replaces it. Lengths and edit distances
//! are counted in Unicode scalar values.

use serde::{Deserialize, Serialize};

use crate::error::PatchNotFound;

/// Default minimum similarity for a fuzzy match
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Targets shorter than this only match verbatim
pub const MIN_FUZZY_LEN: usize = 10;

/// Targets longer than this get at most `LONG_TARGET_MAX_DISTANCE` edits
pub const LONG_TARGET_LEN: usize = 100;
pub const LONG_TARGET_MAX_DISTANCE: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchResult {
    /// Patched document, or the original one on failure
    pub document: String,
    pub success: bool,
    /// Original text of the replaced span
    pub matched_text: Option<String>,
    /// `1 - distance / len(target)` on success, 0.0 on failure
    pub similarity: f64,
    /// Edit budget the search ran with
    pub max_distance: usize,
}

impl PatchResult {
    fn not_found(document: &str, max_distance: usize) -> Self {
        Self {
            document: document.to_string(),
            success: false,
            matched_text: None,
            similarity: 0.0,
            max_distance,
        }
    }

    pub fn ok_or_not_found(self) -> Result<PatchResult, PatchNotFound> {
        if self.success {
            Ok(self)
        } else {
            Err(PatchNotFound {
                max_distance: self.max_distance,
            })
        }
    }
}

/// Edit budget for a target of `len` characters
pub fn max_edit_distance(len: usize, threshold: f64) -> usize {
    let threshold = if threshold.is_finite() {
        threshold.clamp(0.0, 1.0)
    } else {
        DEFAULT_THRESHOLD
    };
    let budget = ((len as f64) * (1.0 - threshold)).round() as usize;
    let budget = budget.max(1);
    if len > LONG_TARGET_LEN {
        budget.min(LONG_TARGET_MAX_DISTANCE)
    } else {
        budget
    }
}

/// Replace the first span of `document` within the edit budget of `target`.
///
/// A verbatim occurrence always wins. Otherwise the left-most start offset
/// that has any qualifying span is used, and from there the closest span,
/// preferring the length nearest the target's on ties.
pub fn patch(document: &str, target: &str, replacement: &str, threshold: f64) -> PatchResult {
    let target_len = target.chars().count();
    if target_len == 0 {
        return PatchResult::not_found(document, 0);
    }

    if target_len < MIN_FUZZY_LEN {
        return match document.find(target) {
            Some(at) => exact(document, at, target, replacement, 0),
            None => PatchResult::not_found(document, 0),
        };
    }

    let max_distance = max_edit_distance(target_len, threshold);
    if let Some(at) = document.find(target) {
        return exact(document, at, target, replacement, max_distance);
    }

    let doc: Vec<char> = document.chars().collect();
    let pattern: Vec<char> = target.chars().collect();

    let Some((start, len, distance)) = find_span(&doc, &pattern, max_distance) else {
        log::debug!(
            "No span within {} edits of a {}-char excerpt",
            max_distance,
            target_len
        );
        return PatchResult::not_found(document, max_distance);
    };

    // Char offsets to byte offsets
    let byte_at = |idx: usize| {
        document
            .char_indices()
            .nth(idx)
            .map_or(document.len(), |(b, _)| b)
    };
    let (from, to) = (byte_at(start), byte_at(start + len));

    let mut patched = String::with_capacity(document.len() + replacement.len());
    patched.push_str(&document[..from]);
    patched.push_str(replacement);
    patched.push_str(&document[to..]);

    PatchResult {
        document: patched,
        success: true,
        matched_text: Some(document[from..to].to_string()),
        similarity: 1.0 - distance as f64 / target_len as f64,
        max_distance,
    }
}

fn exact(
    document: &str,
    at: usize,
    target: &str,
    replacement: &str,
    max_distance: usize,
) -> PatchResult {
    let mut patched = String::with_capacity(document.len() + replacement.len());
    patched.push_str(&document[..at]);
    patched.push_str(replacement);
    patched.push_str(&document[at + target.len()..]);
    PatchResult {
        document: patched,
        success: true,
        matched_text: Some(target.to_string()),
        similarity: 1.0,
        max_distance,
    }
}

/// `(start, len, distance)` in chars of the chosen span.
///
/// The left-most qualifying start opens a window over its best span; a
/// start inside that window replaces it only with a strictly smaller
/// distance, so a candidate padded with neighbouring characters loses to
/// the tighter one it overlaps.
fn find_span(doc: &[char], pattern: &[char], max_distance: usize) -> Option<(usize, usize, usize)> {
    let best_from = best_distance_by_start(doc, pattern);

    let (first, (len, distance)) = (0..doc.len())
        .filter(|&start| best_from[start] <= max_distance)
        .find_map(|start| anchored_best(&doc[start..], pattern, max_distance).map(|s| (start, s)))?;

    let mut chosen = (first, len, distance);
    for start in first + 1..first + len {
        if best_from[start] >= chosen.2 {
            continue;
        }
        if let Some((len, distance)) = anchored_best(&doc[start..], pattern, max_distance) {
            if distance < chosen.2 {
                chosen = (start, len, distance);
            }
        }
    }
    Some(chosen)
}

/// For every start offset, the smallest edit distance between `pattern` and
/// any span of `doc` beginning there.
///
/// Runs the substring-matching DP over both sequences reversed, so a span
/// ending at reversed column `j` is a span starting at `doc.len() - j`.
fn best_distance_by_start(doc: &[char], pattern: &[char]) -> Vec<usize> {
    let n = pattern.len();
    let m = doc.len();
    let mut best = vec![usize::MAX; m + 1];

    // column[i]: distance of pattern suffix of length i against the best
    // reversed span ending at the current column
    let mut column: Vec<usize> = (0..=n).collect();
    best[m] = column[n];

    for j in 1..=m {
        let c = doc[m - j];
        let mut prev_diag = column[0];
        column[0] = 0;
        for i in 1..=n {
            let cost = usize::from(pattern[n - i] != c);
            let value = (prev_diag + cost)
                .min(column[i] + 1)
                .min(column[i - 1] + 1);
            prev_diag = column[i];
            column[i] = value;
        }
        best[m - j] = column[n];
    }
    best
}

/// Closest non-empty span at the head of `doc`. Equal distances go to the
/// span whose length is nearest the pattern's, the shorter one on a tie.
fn anchored_best(doc: &[char], pattern: &[char], max_distance: usize) -> Option<(usize, usize)> {
    let n = pattern.len();
    let longest = doc.len().min(n + max_distance);

    let mut column: Vec<usize> = (0..=n).collect();
    let mut best: Option<(usize, usize)> = None;

    for len in 1..=longest {
        let c = doc[len - 1];
        let mut prev_diag = column[0];
        column[0] = len;
        for i in 1..=n {
            let cost = usize::from(pattern[i - 1] != c);
            let value = (prev_diag + cost)
                .min(column[i] + 1)
                .min(column[i - 1] + 1);
            prev_diag = column[i];
            column[i] = value;
        }
        let distance = column[n];
        let better = match best {
            None => true,
            Some((best_len, d)) => {
                distance < d || (distance == d && len.abs_diff(n) < best_len.abs_diff(n))
            }
        };
        if distance <= max_distance && better {
            best = Some((len, distance));
        }
    }
    best
}

//! State comparison
//!
//! Produces a line-oriented, two-pane diff between two state snapshots. The
//! comparison is purely textual: JSON content is first normalized to a stable
//! pretty-printed form so that line differences track value differences, but
//! nothing here understands Terraform state semantics.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Normalize raw state content for line diffing.
///
/// Valid JSON is re-serialized with two-space indentation and a trailing
/// newline. Anything else is passed through as (lossily decoded) text.
pub fn prepare_for_diff(raw: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(mut text) => {
                text.push('\n');
                text
            }
            Err(e) => {
                debug!("re-serialization failed, diffing raw text: {}", e);
                String::from_utf8_lossy(raw).into_owned()
            }
        },
        Err(e) => {
            debug!("content is not JSON, diffing raw text: {}", e);
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

/// Diff two snapshots. Returns `None` when either side is blank after
/// normalization, since there is nothing meaningful to show.
pub fn build_diff(left: &[u8], right: &[u8]) -> Option<DiffResult> {
    let left = prepare_for_diff(left);
    let right = prepare_for_diff(right);
    if left.trim().is_empty() || right.trim().is_empty() {
        return None;
    }

    let a: Vec<&str> = left.lines().collect();
    let b: Vec<&str> = right.lines().collect();
    let rows = pair_rows(&a, &b, &myers(&a, &b));

    Some(DiffResult {
        rows,
        options: DisplayOptions::default(),
    })
}

/// How a diff should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Side-by-side panes
    pub split_view: bool,
    /// Show unchanged sections instead of folding them
    pub expand_all: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            split_view: true,
            expand_all: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Equal,
    Modified,
    Removed,
    Added,
}

/// One side of a diff row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// 1-based line number within that side's normalized text
    pub number: usize,
    pub text: String,
}

/// A row of the two-pane view. `Removed` rows have no right side, `Added`
/// rows have no left side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRow {
    pub kind: ChangeKind,
    pub left: Option<DiffLine>,
    pub right: Option<DiffLine>,
}

/// A contiguous run of rows, used when unchanged sections are folded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub rows: Vec<DiffRow>,
    /// Unchanged rows folded away before this hunk
    pub skipped_before: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub rows: Vec<DiffRow>,
    pub options: DisplayOptions,
}

impl DiffResult {
    /// Number of rows that differ between the two sides
    pub fn changed_lines(&self) -> usize {
        self.rows.iter().filter(|r| r.kind != ChangeKind::Equal).count()
    }

    pub fn is_identical(&self) -> bool {
        self.changed_lines() == 0
    }

    /// Group changed rows with `context` unchanged rows around them.
    /// With `expand_all` set the whole diff is a single hunk.
    pub fn hunks(&self, context: usize) -> Vec<Hunk> {
        if self.options.expand_all {
            return vec![Hunk {
                rows: self.rows.clone(),
                skipped_before: 0,
            }];
        }

        let changed: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind != ChangeKind::Equal)
            .map(|(i, _)| i)
            .collect();

        // Merge overlapping [start, end) windows around each change
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for i in changed {
            let start = i.saturating_sub(context);
            let end = (i + context + 1).min(self.rows.len());
            match ranges.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => ranges.push((start, end)),
            }
        }

        let mut hunks = Vec::with_capacity(ranges.len());
        let mut cursor = 0;
        for (start, end) in ranges {
            hunks.push(Hunk {
                rows: self.rows[start..end].to_vec(),
                skipped_before: start - cursor,
            });
            cursor = end;
        }
        hunks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Upper bound on diagonal steps spent searching for a minimal script.
/// Past it, whatever is still unresolved is reported as replaced wholesale.
const SEARCH_BUDGET: usize = 10_000_000;

/// Line diff in linear space: divide-and-conquer Myers, splitting on the
/// middle snake so only two diagonal vectors are live at a time.
fn myers(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let mut differ = Differ {
        a,
        b,
        budget: SEARCH_BUDGET,
        edits: Vec::with_capacity(a.len().max(b.len())),
    };
    differ.diff_range(0, a.len(), 0, b.len());
    if differ.budget == 0 {
        debug!(
            "diff search budget exhausted ({} vs {} lines), falling back to coarse replace",
            a.len(),
            b.len()
        );
    }
    differ.edits
}

struct Differ<'a> {
    a: &'a [&'a str],
    b: &'a [&'a str],
    budget: usize,
    edits: Vec<Edit>,
}

impl Differ<'_> {
    fn diff_range(&mut self, mut a_lo: usize, mut a_hi: usize, mut b_lo: usize, mut b_hi: usize) {
        while a_lo < a_hi && b_lo < b_hi && self.a[a_lo] == self.b[b_lo] {
            self.edits.push(Edit::Equal(a_lo, b_lo));
            a_lo += 1;
            b_lo += 1;
        }
        let mut suffix = 0;
        while a_lo < a_hi - suffix
            && b_lo < b_hi - suffix
            && self.a[a_hi - suffix - 1] == self.b[b_hi - suffix - 1]
        {
            suffix += 1;
        }
        a_hi -= suffix;
        b_hi -= suffix;

        if a_lo == a_hi {
            self.edits.extend((b_lo..b_hi).map(Edit::Insert));
        } else if b_lo == b_hi {
            self.edits.extend((a_lo..a_hi).map(Edit::Delete));
        } else {
            match self.middle_snake(a_lo, a_hi, b_lo, b_hi) {
                Some((x, y)) => {
                    self.diff_range(a_lo, x, b_lo, y);
                    self.diff_range(x, a_hi, y, b_hi);
                }
                None => {
                    self.edits.extend((a_lo..a_hi).map(Edit::Delete));
                    self.edits.extend((b_lo..b_hi).map(Edit::Insert));
                }
            }
        }

        for i in 0..suffix {
            self.edits.push(Edit::Equal(a_hi + i, b_hi + i));
        }
    }

    /// Run the forward and reverse searches towards each other and return
    /// the absolute split point where they meet. `None` when both sides are
    /// entirely different or the search budget ran out.
    fn middle_snake(
        &mut self,
        a_lo: usize,
        a_hi: usize,
        b_lo: usize,
        b_hi: usize,
    ) -> Option<(usize, usize)> {
        let (a, b) = (self.a, self.b);
        let a = &a[a_lo..a_hi];
        let b = &b[b_lo..b_hi];
        let n = a.len() as isize;
        let m = b.len() as isize;
        let max_d = (n + m + 1) / 2;
        let offset = max_d;
        let len = 2 * max_d + 2;
        let mut forward = vec![-1isize; len as usize];
        let mut reverse = vec![-1isize; len as usize];
        forward[(offset + 1) as usize] = 0;
        reverse[(offset + 1) as usize] = 0;

        let delta = n - m;
        // With an odd delta the paths can only meet on a forward step
        let odd = delta % 2 != 0;
        let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0isize, 0isize, 0isize, 0isize);

        for d in 0..max_d {
            if self.budget == 0 {
                return None;
            }

            let mut k1 = -d + k1_start;
            while k1 <= d - k1_end {
                self.budget = self.budget.saturating_sub(1);
                let i = (offset + k1) as usize;
                let mut x1 = if k1 == -d || (k1 != d && forward[i - 1] < forward[i + 1]) {
                    forward[i + 1]
                } else {
                    forward[i - 1] + 1
                };
                let mut y1 = x1 - k1;
                while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                    x1 += 1;
                    y1 += 1;
                }
                forward[i] = x1;
                if x1 > n {
                    k1_end += 2;
                } else if y1 > m {
                    k1_start += 2;
                } else if odd {
                    let j = offset + delta - k1;
                    if j >= 0 && j < len && reverse[j as usize] != -1 && x1 >= n - reverse[j as usize] {
                        return Some((a_lo + x1 as usize, b_lo + y1 as usize));
                    }
                }
                k1 += 2;
            }

            let mut k2 = -d + k2_start;
            while k2 <= d - k2_end {
                self.budget = self.budget.saturating_sub(1);
                let i = (offset + k2) as usize;
                let mut x2 = if k2 == -d || (k2 != d && reverse[i - 1] < reverse[i + 1]) {
                    reverse[i + 1]
                } else {
                    reverse[i - 1] + 1
                };
                let mut y2 = x2 - k2;
                while x2 < n && y2 < m && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize] {
                    x2 += 1;
                    y2 += 1;
                }
                reverse[i] = x2;
                if x2 > n {
                    k2_end += 2;
                } else if y2 > m {
                    k2_start += 2;
                } else if !odd {
                    let j = offset + delta - k2;
                    if j >= 0 && j < len && forward[j as usize] != -1 {
                        let x1 = forward[j as usize];
                        let y1 = offset + x1 - j;
                        if x1 >= n - x2 {
                            return Some((a_lo + x1 as usize, b_lo + y1 as usize));
                        }
                    }
                }
                k2 += 2;
            }
        }
        None
    }
}

/// Lay an edit script out as two-pane rows, pairing each run of deletions
/// with the insertions that follow it.
fn pair_rows(a: &[&str], b: &[&str], edits: &[Edit]) -> Vec<DiffRow> {
    let left = |i: usize| DiffLine {
        number: i + 1,
        text: a[i].to_string(),
    };
    let right = |j: usize| DiffLine {
        number: j + 1,
        text: b[j].to_string(),
    };

    let mut rows = Vec::with_capacity(edits.len());
    let mut deleted: Vec<usize> = Vec::new();
    let mut inserted: Vec<usize> = Vec::new();

    let flush = |rows: &mut Vec<DiffRow>, deleted: &mut Vec<usize>, inserted: &mut Vec<usize>| {
        let paired = deleted.len().min(inserted.len());
        for (&i, &j) in deleted.iter().zip(inserted.iter()) {
            rows.push(DiffRow {
                kind: ChangeKind::Modified,
                left: Some(left(i)),
                right: Some(right(j)),
            });
        }
        for &i in &deleted[paired..] {
            rows.push(DiffRow {
                kind: ChangeKind::Removed,
                left: Some(left(i)),
                right: None,
            });
        }
        for &j in &inserted[paired..] {
            rows.push(DiffRow {
                kind: ChangeKind::Added,
                left: None,
                right: Some(right(j)),
            });
        }
        deleted.clear();
        inserted.clear();
    };

    for edit in edits {
        match *edit {
            Edit::Delete(i) => deleted.push(i),
            Edit::Insert(j) => inserted.push(j),
            Edit::Equal(i, j) => {
                flush(&mut rows, &mut deleted, &mut inserted);
                rows.push(DiffRow {
                    kind: ChangeKind::Equal,
                    left: Some(left(i)),
                    right: Some(right(j)),
                });
            }
        }
    }
    flush(&mut rows, &mut deleted, &mut inserted);
    rows
}

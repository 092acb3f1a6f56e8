//! Line-structured diffs: Myers by default, Patience for semantic mode.

use std::collections::HashMap;

use crate::editor::edit::{DiffOp, StructuredDiffLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
}

/// Compute a line diff between two contents.
pub fn diff_lines(old: &str, new: &str, algorithm: DiffAlgorithm) -> Vec<StructuredDiffLine> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let ops = match algorithm {
        DiffAlgorithm::Myers => myers(&a, &b),
        DiffAlgorithm::Patience => patience(&a, &b),
    };
    let mut out = Vec::with_capacity(ops.len());
    let (mut old_line, mut new_line) = (1usize, 1usize);
    for op in ops {
        match op {
            RawOp::Equal(i, _) => {
                out.push(StructuredDiffLine {
                    op: DiffOp::Equal,
                    old_line: Some(old_line),
                    new_line: Some(new_line),
                    text: a[i].to_string(),
                });
                old_line += 1;
                new_line += 1;
            }
            RawOp::Remove(i) => {
                out.push(StructuredDiffLine {
                    op: DiffOp::Remove,
                    old_line: Some(old_line),
                    new_line: None,
                    text: a[i].to_string(),
                });
                old_line += 1;
            }
            RawOp::Add(j) => {
                out.push(StructuredDiffLine {
                    op: DiffOp::Add,
                    old_line: None,
                    new_line: Some(new_line),
                    text: b[j].to_string(),
                });
                new_line += 1;
            }
        }
    }
    out
}

/// Added/removed line counts.
pub fn counts(diff: &[StructuredDiffLine]) -> (usize, usize) {
    let added = diff.iter().filter(|l| l.op == DiffOp::Add).count();
    let removed = diff.iter().filter(|l| l.op == DiffOp::Remove).count();
    (added, removed)
}

/// Render with `+`/`-`/space prefixes.
pub fn render(diff: &[StructuredDiffLine]) -> String {
    let mut out = String::new();
    for line in diff {
        let prefix = match line.op {
            DiffOp::Equal => ' ',
            DiffOp::Add => '+',
            DiffOp::Remove => '-',
        };
        out.push(prefix);
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum RawOp {
    Equal(usize, usize),
    Remove(usize),
    Add(usize),
}

/// Classic greedy Myers with a full trace.
fn myers(a: &[&str], b: &[&str]) -> Vec<RawOp> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }
    let offset = max;
    let width = (2 * max + 1) as usize;
    let mut v = vec![0isize; width];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack.
    let mut ops: Vec<RawOp> = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (0..trace.len() as isize).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;
        while x > prev_x && y > prev_y {
            ops.push(RawOp::Equal((x - 1) as usize, (y - 1) as usize));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(RawOp::Add((y - 1) as usize));
                y -= 1;
            } else {
                ops.push(RawOp::Remove((x - 1) as usize));
                x -= 1;
            }
        }
    }
    while x > 0 && y > 0 {
        ops.push(RawOp::Equal((x - 1) as usize, (y - 1) as usize));
        x -= 1;
        y -= 1;
    }
    ops.reverse();
    ops
}

/// Patience: anchor on lines unique to both sides, recurse between anchors.
fn patience(a: &[&str], b: &[&str]) -> Vec<RawOp> {
    patience_range(a, b, 0, a.len(), 0, b.len())
}

fn patience_range(
    a: &[&str],
    b: &[&str],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> Vec<RawOp> {
    let anchors = unique_common_anchors(a, b, a_lo, a_hi, b_lo, b_hi);
    if anchors.is_empty() {
        // No unique common lines left: fall back to Myers on the slice.
        let sub = myers(&a[a_lo..a_hi], &b[b_lo..b_hi]);
        return sub
            .into_iter()
            .map(|op| match op {
                RawOp::Equal(i, j) => RawOp::Equal(i + a_lo, j + b_lo),
                RawOp::Remove(i) => RawOp::Remove(i + a_lo),
                RawOp::Add(j) => RawOp::Add(j + b_lo),
            })
            .collect();
    }

    let lis = longest_increasing(&anchors);
    let mut ops = Vec::new();
    let (mut prev_a, mut prev_b) = (a_lo, b_lo);
    for &(ai, bi) in &lis {
        ops.extend(patience_range(a, b, prev_a, ai, prev_b, bi));
        ops.push(RawOp::Equal(ai, bi));
        prev_a = ai + 1;
        prev_b = bi + 1;
    }
    ops.extend(patience_range(a, b, prev_a, a_hi, prev_b, b_hi));
    ops
}

fn unique_common_anchors(
    a: &[&str],
    b: &[&str],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> Vec<(usize, usize)> {
    let mut a_counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for i in a_lo..a_hi {
        let entry = a_counts.entry(a[i]).or_insert((0, i));
        entry.0 += 1;
        entry.1 = i;
    }
    let mut b_counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for j in b_lo..b_hi {
        let entry = b_counts.entry(b[j]).or_insert((0, j));
        entry.0 += 1;
        entry.1 = j;
    }
    let mut anchors: Vec<(usize, usize)> = Vec::new();
    for (line, (count_a, i)) in a_counts {
        if count_a != 1 {
            continue;
        }
        if let Some((1, j)) = b_counts.get(line) {
            anchors.push((i, *j));
        }
    }
    anchors.sort();
    anchors
}

/// Longest increasing subsequence on the b-side of (a, b) anchor pairs.
fn longest_increasing(anchors: &[(usize, usize)]) -> Vec<(usize, usize)> {
    if anchors.is_empty() {
        return Vec::new();
    }
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; anchors.len()];
    let mut tail_idx: Vec<usize> = Vec::new();
    for (idx, &(_, bj)) in anchors.iter().enumerate() {
        let pos = tails.partition_point(|&t| anchors[t].1 < bj);
        if pos > 0 {
            prev[idx] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(idx);
            tail_idx.push(idx);
        } else {
            tails[pos] = idx;
        }
    }
    let mut out = Vec::new();
    let mut cur = tails.last().copied();
    while let Some(i) = cur {
        out.push(anchors[i]);
        cur = prev[i];
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_contents_produce_equal_ops() {
        let diff = diff_lines("a\nb\n", "a\nb\n", DiffAlgorithm::Myers);
        assert!(diff.iter().all(|l| l.op == DiffOp::Equal));
        assert_eq!(counts(&diff), (0, 0));
    }

    #[test]
    fn single_line_change() {
        let diff = diff_lines("a\nb\nc\n", "a\nB\nc\n", DiffAlgorithm::Myers);
        assert_eq!(counts(&diff), (1, 1));
        let rendered = render(&diff);
        assert!(rendered.contains("-b\n"));
        assert!(rendered.contains("+B\n"));
        assert!(rendered.contains(" a\n"));
    }

    #[test]
    fn pure_insertion_and_deletion() {
        let diff = diff_lines("a\n", "a\nb\n", DiffAlgorithm::Myers);
        assert_eq!(counts(&diff), (1, 0));
        let diff = diff_lines("a\nb\n", "a\n", DiffAlgorithm::Myers);
        assert_eq!(counts(&diff), (0, 1));
    }

    #[test]
    fn line_numbers_track_both_sides() {
        let diff = diff_lines("a\nb\n", "a\nc\n", DiffAlgorithm::Myers);
        let removed = diff.iter().find(|l| l.op == DiffOp::Remove).unwrap();
        assert_eq!(removed.old_line, Some(2));
        assert_eq!(removed.new_line, None);
        let added = diff.iter().find(|l| l.op == DiffOp::Add).unwrap();
        assert_eq!(added.new_line, Some(2));
    }

    #[test]
    fn patience_matches_myers_on_simple_input() {
        let old = "fn a() {}\nfn b() {}\n";
        let new = "fn a() {}\nfn c() {}\n";
        let m = diff_lines(old, new, DiffAlgorithm::Myers);
        let p = diff_lines(old, new, DiffAlgorithm::Patience);
        assert_eq!(counts(&m), counts(&p));
    }

    #[test]
    fn patience_anchors_unique_lines() {
        let old = "start\nsame\nold1\nunique\nold2\nend\n";
        let new = "start\nnew1\nsame\nunique\nnew2\nend\n";
        let diff = diff_lines(old, new, DiffAlgorithm::Patience);
        // Unique anchors stay equal; surrounding churn is add/remove.
        let equal: Vec<&str> = diff
            .iter()
            .filter(|l| l.op == DiffOp::Equal)
            .map(|l| l.text.as_str())
            .collect();
        assert!(equal.contains(&"unique"));
        assert!(equal.contains(&"start"));
        assert!(equal.contains(&"end"));
    }

    #[test]
    fn empty_to_content() {
        let diff = diff_lines("", "a\nb\n", DiffAlgorithm::Myers);
        assert_eq!(counts(&diff), (2, 0));
    }
}

//! Content-package sampling
//!
//! Large files are summarized by keeping a few windows of content packages
//! and collapsing every run of dropped packages into one skip marker.

use crate::layout::{ContentPackage, EssenceItem, Layout};
use crate::ul::SKIP_MARKER_KEY;
use std::ops::Range;

/// Description carried by skip markers.
pub const SKIP_DESCRIPTION: &str = "Skipped content packages";

fn centered(center: usize, width: usize, count: usize) -> Range<usize> {
    let start = center.saturating_sub(width / 2);
    let end = (center + (width + 1) / 2).min(count);
    start.min(end)..end
}

/// Index ranges to keep out of `count` packages, or `None` when everything
/// is kept.
///
/// One width keeps a window centered on `count / 2`. Two widths keep the
/// head and the tail. With more, the first and last keep the head and the
/// tail and interior width `i` is centered on `i * count / (n - 1)`.
pub fn keep_ranges(count: usize, limits: &[usize]) -> Option<Vec<Range<usize>>> {
    let requested: usize = limits.iter().fold(0usize, |acc, w| acc.saturating_add(*w));
    if limits.is_empty() || requested >= count {
        return None;
    }

    let n = limits.len();
    let ranges = match n {
        1 => vec![centered(count / 2, limits[0], count)],
        _ => {
            let mut ranges = Vec::with_capacity(n);
            ranges.push(0..limits[0]);
            for (i, &width) in limits.iter().enumerate().take(n - 1).skip(1) {
                ranges.push(centered(i * count / (n - 1), width, count));
            }
            ranges.push(count - limits[n - 1]..count);
            ranges
        }
    };
    Some(ranges)
}

/// Per-package keep flags.
pub fn keep_mask(count: usize, limits: &[usize]) -> Vec<bool> {
    match keep_ranges(count, limits) {
        None => vec![true; count],
        Some(ranges) => {
            let mut mask = vec![false; count];
            for range in ranges {
                for keep in &mut mask[range] {
                    *keep = true;
                }
            }
            mask
        }
    }
}

fn skip_marker(run: &[ContentPackage]) -> ContentPackage {
    let file_offset = run
        .first()
        .and_then(|package| package.items.first())
        .map_or(0, |item| item.file_offset);

    ContentPackage {
        items: vec![EssenceItem {
            key: SKIP_MARKER_KEY.to_string(),
            symbol: None,
            description: SKIP_DESCRIPTION.to_string(),
            file_offset,
            length: 0,
            total_byte_count: run.iter().map(ContentPackage::total_length).sum(),
            total_container_count: Some(run.len() as u64),
        }],
    }
}

/// Apply keep windows to the packages of every partition, in file order.
///
/// Dropped runs never span partitions. Package counts and statistics keep
/// describing the whole file.
pub fn apply_limits(layout: &mut Layout, limits: &[usize]) {
    let total = layout.content_package_total();
    let mask = keep_mask(total, limits);
    if mask.iter().all(|&keep| keep) {
        return;
    }

    let mut flags = mask.into_iter();
    let mut skipped = 0usize;
    for partition in &mut layout.partitions {
        let packages = std::mem::take(&mut partition.content_packages);
        let mut out = Vec::new();
        let mut run = Vec::new();

        for package in packages {
            if flags.next().unwrap_or(true) {
                if !run.is_empty() {
                    out.push(skip_marker(&run));
                    run.clear();
                }
                out.push(package);
            } else {
                skipped += 1;
                run.push(package);
            }
        }
        if !run.is_empty() {
            out.push(skip_marker(&run));
        }
        partition.content_packages = out;
    }

    tracing::debug!(total, skipped, windows = limits.len(), "applied content package limits");
}

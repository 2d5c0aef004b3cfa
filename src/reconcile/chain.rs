//! Glue-and-repair chain merger.
//!
//! Validates suggested token merges against a geometry guard, collapses
//! overlapping groups into disjoint ones and applies them to the token
//! stream.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::suggester::{MergeGroup, MergeSuggester, PageImage};
use crate::error::{Issue, IssueKind};
use crate::layout::merged_id;
use crate::model::{cmp_f32, BoundingBox, ExtractedElement};

/// Geometry guard thresholds.
///
/// Spreads and gaps are expressed as multiples of the group's reference
/// height, which is the tallest member but never below `min_ref_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainGuardConfig {
    /// Floor for the reference height
    pub min_ref_height: f32,

    /// A group is vertical when its height exceeds this multiple of its width
    pub vertical_aspect: f32,

    /// Maximum X-center spread of a vertical group
    pub vertical_x_spread: f32,

    /// Maximum Y-center spread of a horizontal group
    pub horizontal_y_spread: f32,

    /// Horizontal gap above which an adjacent pair counts as scattered
    pub pair_gap: f32,

    /// Vertical skew above which an adjacent pair counts as scattered
    pub pair_skew: f32,

    /// Fraction of scattered pairs above which the group is rejected
    pub max_scattered_ratio: f32,
}

impl Default for ChainGuardConfig {
    fn default() -> Self {
        Self {
            min_ref_height: 12.0,
            vertical_aspect: 2.0,
            vertical_x_spread: 2.0,
            horizontal_y_spread: 1.5,
            pair_gap: 10.0,
            pair_skew: 2.0,
            max_scattered_ratio: 0.6,
        }
    }
}

/// Why the guard rejected a group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardRejection {
    /// A member id does not name a token on the page.
    #[error("unknown member id {0}")]
    UnknownMember(String),

    /// A member has degenerate geometry.
    #[error("member {0} has an invalid bounding box")]
    InvalidGeometry(String),

    /// Members span several pages.
    #[error("members span several pages")]
    CrossPage,

    /// Vertical group drifts sideways.
    #[error("vertical group X-center spread {spread:.1} exceeds {limit:.1}")]
    VerticalSpread { spread: f32, limit: f32 },

    /// Horizontal group drifts up or down.
    #[error("horizontal group Y-center spread {spread:.1} exceeds {limit:.1}")]
    HorizontalSpread { spread: f32, limit: f32 },

    /// Too many adjacent pairs are far apart or skewed.
    #[error("{scattered} of {pairs} adjacent pairs are scattered")]
    Scattered { scattered: usize, pairs: usize },
}

/// Group orientation inferred from the union box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

fn orientation_of(bbox: &BoundingBox, config: &ChainGuardConfig) -> Orientation {
    if bbox.height() > config.vertical_aspect * bbox.width() {
        Orientation::Vertical
    } else {
        Orientation::Horizontal
    }
}

fn sort_by_orientation(members: &mut [&ExtractedElement], orientation: Orientation) {
    match orientation {
        Orientation::Horizontal => members.sort_by(|a, b| {
            cmp_f32(a.bbox.x0, b.bbox.x0).then(cmp_f32(a.bbox.y0, b.bbox.y0))
        }),
        Orientation::Vertical => members.sort_by(|a, b| {
            cmp_f32(a.bbox.y0, b.bbox.y0).then(cmp_f32(a.bbox.x0, b.bbox.x0))
        }),
    }
}

/// Check that a group of tokens is plausibly one visual word.
pub fn check_geometry(
    members: &[&ExtractedElement],
    config: &ChainGuardConfig,
) -> Result<(), GuardRejection> {
    if let Some(bad) = members.iter().find(|m| !m.validate()) {
        return Err(GuardRejection::InvalidGeometry(bad.id.clone()));
    }
    if members.windows(2).any(|w| w[0].page != w[1].page) {
        return Err(GuardRejection::CrossPage);
    }
    let Some(union) = BoundingBox::union_all(members.iter().map(|m| &m.bbox)) else {
        return Ok(());
    };

    let ref_h = members
        .iter()
        .map(|m| m.bbox.height())
        .fold(config.min_ref_height, f32::max);
    let orientation = orientation_of(&union, config);

    match orientation {
        Orientation::Vertical => {
            let spread = spread(members.iter().map(|m| m.bbox.center_x()));
            let limit = config.vertical_x_spread * ref_h;
            if spread > limit {
                return Err(GuardRejection::VerticalSpread { spread, limit });
            }
        }
        Orientation::Horizontal => {
            let spread = spread(members.iter().map(|m| m.bbox.center_y()));
            let limit = config.horizontal_y_spread * ref_h;
            if spread > limit {
                return Err(GuardRejection::HorizontalSpread { spread, limit });
            }
        }
    }

    let mut ordered = members.to_vec();
    sort_by_orientation(&mut ordered, orientation);
    let pairs = ordered.len().saturating_sub(1);
    if pairs == 0 {
        return Ok(());
    }

    let scattered = ordered
        .windows(2)
        .filter(|w| {
            let gap = w[0].bbox.h_gap(&w[1].bbox);
            let skew = (w[0].bbox.center_y() - w[1].bbox.center_y()).abs();
            gap > config.pair_gap * ref_h || skew > config.pair_skew * ref_h
        })
        .count();

    if scattered as f32 > config.max_scattered_ratio * pairs as f32 {
        return Err(GuardRejection::Scattered { scattered, pairs });
    }
    Ok(())
}

fn spread(values: impl Iterator<Item = f32>) -> f32 {
    let (min, max) = values.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        0.0
    } else {
        max - min
    }
}

/// Disjoint-set forest over group indices.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Pick between two corrected texts: non-empty beats empty, longer beats
/// shorter, and `current` wins ties.
pub(crate) fn prefer_text(current: Option<String>, candidate: Option<String>) -> Option<String> {
    let current = current.filter(|t| !t.trim().is_empty());
    let candidate = candidate.filter(|t| !t.trim().is_empty());
    match (current, candidate) {
        (Some(c), Some(n)) => {
            if n.chars().count() > c.chars().count() {
                Some(n)
            } else {
                Some(c)
            }
        }
        (c, n) => c.or(n),
    }
}

/// Union groups sharing any member until all groups are disjoint.
///
/// Output groups are ordered by their earliest input group.
pub fn chain_merge(groups: Vec<MergeGroup>) -> Vec<MergeGroup> {
    let mut sets = DisjointSet::new(groups.len());
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (i, group) in groups.iter().enumerate() {
        for id in &group.member_ids {
            match owner.get(id.as_str()) {
                Some(&j) => sets.union(i, j),
                None => {
                    owner.insert(id.as_str(), i);
                }
            }
        }
    }

    let roots: Vec<usize> = (0..groups.len()).map(|i| sets.find(i)).collect();
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut merged: Vec<MergeGroup> = Vec::new();

    for (group, root) in groups.into_iter().zip(roots) {
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            merged.push(MergeGroup::default());
            merged.len() - 1
        });
        let target = &mut merged[slot];
        target.member_ids.extend(group.member_ids);
        target.corrected_text = prefer_text(target.corrected_text.take(), group.corrected_text);
    }

    merged
}

/// Output of the chain merger for one page.
#[derive(Debug, Clone, Default)]
pub struct ChainMergeOutput {
    /// Tokens after merging, in input order
    pub elements: Vec<ExtractedElement>,

    /// Number of merged elements built
    pub applied: usize,

    /// Number of suggested groups rejected by the guard
    pub rejected: usize,

    /// Whether the suggester failed and the page passed through
    pub degraded: bool,

    /// Problems found while merging
    pub issues: Vec<Issue>,
}

/// Validates and applies suggested merges.
pub struct ChainMerger {
    config: ChainGuardConfig,
}

impl ChainMerger {
    /// Create a merger with default guard thresholds.
    pub fn new() -> Self {
        Self::with_config(ChainGuardConfig::default())
    }

    /// Create a merger with custom guard thresholds.
    pub fn with_config(config: ChainGuardConfig) -> Self {
        Self { config }
    }

    /// Ask the suggester for groups and apply the ones that pass the guard.
    ///
    /// Suggester failure leaves the tokens untouched.
    pub fn run(
        &self,
        page: i32,
        tokens: &[ExtractedElement],
        image: Option<&PageImage>,
        suggester: &dyn MergeSuggester,
    ) -> ChainMergeOutput {
        if tokens.len() < 2 {
            return ChainMergeOutput {
                elements: tokens.to_vec(),
                ..Default::default()
            };
        }

        let groups = match suggester.suggest(tokens, image) {
            Ok(groups) => groups,
            Err(e) => {
                log::warn!(
                    "ChainMerger: suggester '{}' failed on page {}: {}; passing tokens through",
                    suggester.name(),
                    page,
                    e
                );
                return ChainMergeOutput {
                    elements: tokens.to_vec(),
                    degraded: true,
                    ..Default::default()
                };
            }
        };

        let mut output = ChainMergeOutput::default();
        let accepted = self.validate(page, tokens, groups, &mut output);
        let merged = chain_merge(accepted);
        let (elements, applied) = apply_merges(tokens, &merged);

        log::debug!(
            "ChainMerger: page {} applied {} merges, rejected {}",
            page,
            applied,
            output.rejected
        );

        output.elements = elements;
        output.applied = applied;
        output
    }

    /// Keep the groups that pass the geometry guard.
    pub fn validate(
        &self,
        page: i32,
        tokens: &[ExtractedElement],
        groups: Vec<MergeGroup>,
        output: &mut ChainMergeOutput,
    ) -> Vec<MergeGroup> {
        let by_id: HashMap<&str, &ExtractedElement> =
            tokens.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut accepted = Vec::with_capacity(groups.len());

        for group in groups {
            if group.len() < 2 {
                continue;
            }
            let verdict = group
                .member_ids
                .iter()
                .map(|id| {
                    by_id
                        .get(id.as_str())
                        .copied()
                        .ok_or_else(|| GuardRejection::UnknownMember(id.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
                .and_then(|members| check_geometry(&members, &self.config));

            match verdict {
                Ok(()) => accepted.push(group),
                Err(reason) => {
                    let label = group.member_ids.iter().cloned().collect::<Vec<_>>().join(",");
                    log::trace!("ChainMerger: rejected {{{}}}: {}", label, reason);
                    output.rejected += 1;
                    output.issues.push(
                        Issue::new(IssueKind::MergeRejected, reason.to_string())
                            .on_page(page)
                            .for_item(label),
                    );
                }
            }
        }

        accepted
    }
}

impl Default for ChainMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply disjoint groups to the token stream.
///
/// Each merged element takes the place of its earliest member. Ids already
/// consumed by an earlier group are skipped; a group left with fewer than
/// two members is not applied. Returns the new stream and the number of
/// merged elements built.
pub fn apply_merges(tokens: &[ExtractedElement], groups: &[MergeGroup]) -> (Vec<ExtractedElement>, usize) {
    let position: HashMap<&str, usize> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut ordered: Vec<(usize, &MergeGroup)> = groups
        .iter()
        .filter_map(|g| {
            g.member_ids
                .iter()
                .filter_map(|id| position.get(id.as_str()).copied())
                .min()
                .map(|first| (first, g))
        })
        .collect();
    ordered.sort_by_key(|(first, _)| *first);

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut replacement: HashMap<usize, ExtractedElement> = HashMap::new();

    for (_, group) in ordered {
        let members: BTreeSet<usize> = group
            .member_ids
            .iter()
            .filter_map(|id| position.get(id.as_str()).copied())
            .filter(|i| !consumed.contains(i))
            .collect();
        if members.len() < 2 {
            continue;
        }

        let refs: Vec<&ExtractedElement> = members.iter().map(|&i| &tokens[i]).collect();
        if let Some(merged) = build_merged(&refs, group.corrected_text.as_deref()) {
            consumed.extend(members.iter().copied());
            if let Some(&first) = members.iter().next() {
                replacement.insert(first, merged);
            }
        }
    }

    let applied = replacement.len();
    let mut result = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if let Some(merged) = replacement.remove(&i) {
            result.push(merged);
        } else if !consumed.contains(&i) {
            result.push(token.clone());
        }
    }

    (result, applied)
}

fn build_merged(members: &[&ExtractedElement], corrected: Option<&str>) -> Option<ExtractedElement> {
    let bbox = BoundingBox::union_all(members.iter().map(|m| &m.bbox))?;
    let mut ordered = members.to_vec();
    sort_by_orientation(&mut ordered, orientation_of(&bbox, &ChainGuardConfig::default()));

    let text = match corrected.filter(|t| !t.trim().is_empty()) {
        Some(t) => t.to_string(),
        None => ordered.iter().map(|m| m.text()).collect::<String>(),
    };
    let first = ordered[0];
    let ids: Vec<String> = ordered.iter().map(|m| m.id.clone()).collect();
    let confidence = ordered.iter().map(|m| m.confidence).fold(1.0, f32::min);

    Some(
        ExtractedElement::new(merged_id(&ids), text, first.page, bbox, first.kind, first.source)
            .with_confidence(confidence)
            .with_merged_from(ids),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SuggestError;
    use crate::reconcile::suggester::NoopSuggester;

    fn token(id: &str, text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> ExtractedElement {
        ExtractedElement::word(id, text, 0, BoundingBox::new(x0, y0, x1, y1))
    }

    struct FixedSuggester(Vec<MergeGroup>);

    impl MergeSuggester for FixedSuggester {
        fn name(&self) -> &str {
            "fixed"
        }

        fn suggest(
            &self,
            _tokens: &[ExtractedElement],
            _image: Option<&PageImage>,
        ) -> Result<Vec<MergeGroup>, SuggestError> {
            Ok(self.0.clone())
        }
    }

    struct ImageOnlySuggester;

    impl MergeSuggester for ImageOnlySuggester {
        fn name(&self) -> &str {
            "vision"
        }

        fn suggest(
            &self,
            _tokens: &[ExtractedElement],
            image: Option<&PageImage>,
        ) -> Result<Vec<MergeGroup>, SuggestError> {
            image.ok_or(SuggestError::ImageRequired)?;
            Ok(Vec::new())
        }
    }

    /// Repeatedly merge any two overlapping groups until none overlap.
    fn naive_fixed_point(mut groups: Vec<MergeGroup>) -> Vec<MergeGroup> {
        loop {
            let mut changed = false;
            'scan: for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    if groups[i].overlaps(&groups[j]) {
                        let other = groups.remove(j);
                        groups[i].member_ids.extend(other.member_ids);
                        groups[i].corrected_text =
                            prefer_text(groups[i].corrected_text.take(), other.corrected_text);
                        changed = true;
                        break 'scan;
                    }
                }
            }
            if !changed {
                return groups;
            }
        }
    }

    fn partition(groups: &[MergeGroup]) -> BTreeSet<BTreeSet<String>> {
        groups.iter().map(|g| g.member_ids.clone()).collect()
    }

    #[test]
    fn test_chain_merge_overlapping_pair() {
        let merged = chain_merge(vec![MergeGroup::new(["1", "2"]), MergeGroup::new(["2", "3"])]);
        assert_eq!(merged, vec![MergeGroup::new(["1", "2", "3"])]);
    }

    #[test]
    fn test_chain_merge_matches_fixed_point() {
        let groups = vec![
            MergeGroup::new(["a", "b"]),
            MergeGroup::new(["x", "y"]),
            MergeGroup::new(["c", "d"]).with_text("cd"),
            MergeGroup::new(["b", "c"]).with_text("bcd!"),
            MergeGroup::new(["z"]),
            MergeGroup::new(["y", "q"]),
        ];

        let fast = chain_merge(groups.clone());
        let slow = naive_fixed_point(groups);
        assert_eq!(partition(&fast), partition(&slow));

        let mut seen = HashSet::new();
        for group in &fast {
            for id in &group.member_ids {
                assert!(seen.insert(id.clone()), "{} appears twice", id);
            }
        }

        let abcd = fast.iter().find(|g| g.member_ids.contains("a")).unwrap();
        assert_eq!(abcd.corrected_text.as_deref(), Some("bcd!"));
    }

    #[test]
    fn test_prefer_text() {
        assert_eq!(prefer_text(None, Some("x".into())), Some("x".into()));
        assert_eq!(prefer_text(Some("".into()), Some("x".into())), Some("x".into()));
        assert_eq!(prefer_text(Some("ab".into()), Some("c".into())), Some("ab".into()));
        assert_eq!(prefer_text(Some("ab".into()), Some("cd".into())), Some("ab".into()));
        assert_eq!(prefer_text(None, None), None);
    }

    #[test]
    fn test_guard_rejects_vertical_offset_in_horizontal_group() {
        let a = token("a", "A", 0.0, 0.0, 40.0, 10.0);
        let b = token("b", "B", 45.0, 50.0, 85.0, 60.0);
        let result = check_geometry(&[&a, &b], &ChainGuardConfig::default());
        assert!(matches!(result, Err(GuardRejection::HorizontalSpread { .. })));
    }

    #[test]
    fn test_guard_accepts_aligned_word() {
        let a = token("a", "A", 0.0, 0.0, 8.0, 10.0);
        let b = token("b", "B", 8.0, 1.0, 16.0, 11.0);
        assert!(check_geometry(&[&a, &b], &ChainGuardConfig::default()).is_ok());
    }

    #[test]
    fn test_guard_vertical_group() {
        let a = token("a", "縦", 0.0, 0.0, 10.0, 10.0);
        let b = token("b", "書", 0.0, 12.0, 10.0, 22.0);
        let c = token("c", "き", 1.0, 24.0, 11.0, 34.0);
        assert!(check_geometry(&[&a, &b, &c], &ChainGuardConfig::default()).is_ok());

        // A tall column whose last glyph drifts 26 units right (limit 2 x 12)
        let column: Vec<ExtractedElement> = (0..8)
            .map(|i| {
                let y0 = i as f32 * 12.0;
                let x0 = if i == 7 { 26.0 } else { 0.0 };
                token(&format!("v{}", i), "x", x0, y0, x0 + 10.0, y0 + 10.0)
            })
            .collect();
        let refs: Vec<&ExtractedElement> = column.iter().collect();
        let result = check_geometry(&refs, &ChainGuardConfig::default());
        assert!(matches!(result, Err(GuardRejection::VerticalSpread { .. })));
    }

    #[test]
    fn test_guard_rejects_scattered_pairs() {
        let a = token("a", "A", 0.0, 0.0, 10.0, 10.0);
        let b = token("b", "B", 200.0, 0.0, 210.0, 10.0);
        let c = token("c", "C", 400.0, 0.0, 410.0, 10.0);
        let result = check_geometry(&[&a, &b, &c], &ChainGuardConfig::default());
        assert_eq!(result, Err(GuardRejection::Scattered { scattered: 2, pairs: 2 }));
    }

    #[test]
    fn test_run_merges_abc() {
        let tokens = vec![
            token("A", "A", 0.0, 0.0, 6.0, 10.0),
            token("B", "B", 6.0, 0.0, 12.0, 10.0),
            token("C", "C", 12.0, 0.0, 18.0, 10.0),
        ];
        let suggester = FixedSuggester(vec![MergeGroup::new(["A", "B", "C"]).with_text("ABC")]);

        let output = ChainMerger::new().run(0, &tokens, None, &suggester);

        assert_eq!(output.applied, 1);
        assert_eq!(output.elements.len(), 1);
        assert_eq!(output.elements[0].text(), "ABC");
        assert_eq!(output.elements[0].bbox, BoundingBox::new(0.0, 0.0, 18.0, 10.0));
        assert_eq!(output.elements[0].metadata.merged_from, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_run_concatenates_by_position_without_correction() {
        let tokens = vec![
            token("2", "lo", 6.0, 0.0, 12.0, 10.0),
            token("1", "Hel", 0.0, 0.0, 6.0, 10.0),
            token("3", "!", 30.0, 0.0, 34.0, 10.0),
        ];
        let suggester = FixedSuggester(vec![MergeGroup::new(["1", "2"])]);

        let output = ChainMerger::new().run(0, &tokens, None, &suggester);

        assert_eq!(output.elements.len(), 2);
        assert_eq!(output.elements[0].text(), "Hello");
        assert_eq!(output.elements[1].text(), "!");
    }

    #[test]
    fn test_run_rejects_and_reports() {
        let tokens = vec![
            token("a", "A", 0.0, 0.0, 40.0, 10.0),
            token("b", "B", 45.0, 50.0, 85.0, 60.0),
        ];
        let suggester = FixedSuggester(vec![
            MergeGroup::new(["a", "b"]),
            MergeGroup::new(["a", "ghost"]),
        ]);

        let output = ChainMerger::new().run(0, &tokens, None, &suggester);

        assert_eq!(output.rejected, 2);
        assert_eq!(output.elements, tokens);
        assert!(output.issues.iter().all(|i| i.kind == IssueKind::MergeRejected));
    }

    #[test]
    fn test_missing_image_passes_through() {
        let tokens = vec![
            token("a", "A", 0.0, 0.0, 6.0, 10.0),
            token("b", "B", 6.0, 0.0, 12.0, 10.0),
        ];
        let output = ChainMerger::new().run(0, &tokens, None, &ImageOnlySuggester);
        assert!(output.degraded);
        assert_eq!(output.elements, tokens);
    }

    #[test]
    fn test_noop_suggester_is_identity() {
        let tokens = vec![
            token("a", "A", 0.0, 0.0, 6.0, 10.0),
            token("b", "B", 6.0, 0.0, 12.0, 10.0),
        ];
        let output = ChainMerger::new().run(0, &tokens, None, &NoopSuggester);
        assert_eq!(output.elements, tokens);
        assert_eq!(output.applied, 0);
    }

    #[test]
    fn test_apply_skips_consumed_ids() {
        let tokens = vec![
            token("a", "a", 0.0, 0.0, 5.0, 10.0),
            token("b", "b", 5.0, 0.0, 10.0, 10.0),
            token("c", "c", 10.0, 0.0, 15.0, 10.0),
        ];
        // Not disjoint on purpose: the second group loses "b" and is left with one member
        let groups = vec![MergeGroup::new(["a", "b"]), MergeGroup::new(["b", "c"])];

        let (elements, applied) = apply_merges(&tokens, &groups);

        assert_eq!(applied, 1);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].text(), "ab");
        assert_eq!(elements[1].id, "c");
    }
}

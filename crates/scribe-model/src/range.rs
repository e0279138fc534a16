use serde::{Deserialize, Serialize};

use crate::document::ChangeKind;
use crate::error::ModelError;
use crate::node::{Model, NodeId};
use crate::position::{CompareResult, Position, PositionJson};

/// A span between two positions in the same root, `start` before or equal to
/// `end`. Like positions, ranges are value objects over offset paths and may
/// dangle after the tree changes underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Serialized shape of a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeJson {
    pub start: PositionJson,
    pub end: PositionJson,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Collapsed range, both ends at `position`.
    pub fn collapsed(position: Position) -> Self {
        Self {
            end: position.clone(),
            start: position,
        }
    }

    /// Range starting at `position` and spanning `how_many` offsets of its
    /// parent.
    pub fn from_position_and_shift(position: &Position, how_many: usize) -> Self {
        Self {
            start: position.clone(),
            end: position.shifted_by(how_many as isize),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start.is_equal(&self.end)
    }

    /// True when both ends sit in the same parent, so the range spans a plain
    /// run of offsets.
    pub fn is_flat(&self) -> bool {
        self.start.parent_path() == self.end.parent_path()
    }

    pub fn root(&self) -> NodeId {
        self.start.root()
    }

    pub fn is_equal(&self, other: &Range) -> bool {
        self.start.is_equal(&other.start) && self.end.is_equal(&other.end)
    }

    /// True when `position` lies strictly inside the range. Both boundaries
    /// are excluded.
    pub fn contains_position(&self, position: &Position) -> bool {
        self.start.is_before(position) && position.is_before(&self.end)
    }

    /// True when `other` lies inside this range. With `loose` set, a shared
    /// boundary still counts as contained; collapsed ranges are always
    /// checked strictly.
    pub fn contains_range(&self, other: &Range, loose: bool) -> bool {
        let loose = loose && !other.is_collapsed();
        let contains_start =
            self.contains_position(&other.start) || (loose && self.start.is_equal(&other.start));
        let contains_end =
            self.contains_position(&other.end) || (loose && self.end.is_equal(&other.end));
        contains_start && contains_end
    }

    /// True when `node` sits inside the range, judged by the position right
    /// before it.
    pub fn contains_item(&self, node: NodeId, model: &Model) -> Result<bool, ModelError> {
        let before = Position::before(model, node)?;
        Ok(self.contains_position(&before) || self.start.is_equal(&before))
    }

    /// True when the two ranges share at least one offset. Merely touching
    /// boundaries do not intersect.
    pub fn is_intersecting(&self, other: &Range) -> bool {
        self.start.is_before(&other.end) && other.start.is_before(&self.end)
    }

    /// Parts of this range not covered by `other`: zero, one or two ranges.
    pub fn get_difference(&self, other: &Range) -> Vec<Range> {
        let mut ranges = Vec::new();
        if self.is_intersecting(other) {
            if self.contains_position(&other.start) {
                ranges.push(Range::new(self.start.clone(), other.start.clone()));
            }
            if self.contains_position(&other.end) {
                ranges.push(Range::new(other.end.clone(), self.end.clone()));
            }
        } else {
            ranges.push(self.clone());
        }
        ranges
    }

    /// Common part of the two ranges, or `None` when they do not intersect.
    pub fn get_intersection(&self, other: &Range) -> Option<Range> {
        if !self.is_intersecting(other) {
            return None;
        }
        let start = if self.contains_position(&other.start) {
            &other.start
        } else {
            &self.start
        };
        let end = if self.contains_position(&other.end) {
            &other.end
        } else {
            &self.end
        };
        Some(Range::new(start.clone(), end.clone()))
    }

    /// Single range covering both, or `None` when they neither intersect nor
    /// share a boundary.
    pub fn get_joined(&self, other: &Range) -> Option<Range> {
        let adjacent = if self.start.is_before(&other.start) {
            self.end.is_equal(&other.start)
        } else {
            other.end.is_equal(&self.start)
        };
        if !self.is_intersecting(other) && !adjacent {
            return None;
        }
        let start = if self.start.is_before(&other.start) || self.start.is_equal(&other.start) {
            &self.start
        } else {
            &other.start
        };
        let end = if other.end.is_before(&self.end) {
            &self.end
        } else {
            &other.end
        };
        Some(Range::new(start.clone(), end.clone()))
    }

    /// Combines transform output back into one range.
    ///
    /// The first range is the reference: the result keeps its bounds and is
    /// widened only through neighbours whose boundary exactly meets it, in
    /// document order. Detached pieces (content moved elsewhere) are dropped.
    /// `None` only for an empty input.
    pub fn from_ranges(ranges: &[Range]) -> Option<Range> {
        let reference = ranges.first()?;
        if ranges.len() == 1 {
            return Some(reference.clone());
        }

        let mut sorted: Vec<&Range> = ranges.iter().collect();
        sorted.sort_by(|a, b| match a.start.compare_with(&b.start) {
            CompareResult::After => std::cmp::Ordering::Greater,
            CompareResult::Before => std::cmp::Ordering::Less,
            _ => std::cmp::Ordering::Equal,
        });
        let ref_index = sorted
            .iter()
            .position(|range| std::ptr::eq(*range, reference))?;

        let mut result = reference.clone();
        for range in sorted[..ref_index].iter().rev() {
            if range.end.is_equal(&result.start) {
                result.start = range.start.clone();
            } else {
                break;
            }
        }
        for range in &sorted[ref_index + 1..] {
            if range.start.is_equal(&result.end) {
                result.end = range.end.clone();
            } else {
                break;
            }
        }
        Some(result)
    }

    // ------------------------------------------------- operation transform

    /// Transform under an insertion. With `spread` set, an insertion landing
    /// strictly inside the range splits it in two around the new content
    /// instead of absorbing it.
    pub fn transformed_by_insertion(
        &self,
        insert_position: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if spread && self.contains_position(insert_position) {
            return vec![
                Range::new(self.start.clone(), insert_position.clone()),
                Range::new(
                    insert_position.shifted_by(how_many as isize),
                    self.end.transformed_by_insertion(insert_position, how_many),
                ),
            ];
        }
        vec![Range::new(
            self.start.transformed_by_insertion(insert_position, how_many),
            self.end.transformed_by_insertion(insert_position, how_many),
        )]
    }

    /// Transform under a deletion. A boundary swallowed by the deletion
    /// collapses onto the deletion point; `None` when the whole range is
    /// gone.
    pub fn transformed_by_deletion(
        &self,
        delete_position: &Position,
        how_many: usize,
    ) -> Option<Range> {
        let start = self.start.transformed_by_deletion(delete_position, how_many);
        let end = self.end.transformed_by_deletion(delete_position, how_many);
        match (start, end) {
            (None, None) => None,
            (start, end) => Some(Range::new(
                start.unwrap_or_else(|| delete_position.clone()),
                end.unwrap_or_else(|| delete_position.clone()),
            )),
        }
    }

    /// Transform under a move of `how_many` offsets from `source` to
    /// `target`. May produce up to three ranges: the part left behind before
    /// the gap, the part that travelled with the content, and the part left
    /// behind after the gap. Results are in document order.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if self.is_collapsed() {
            return vec![Range::collapsed(
                self.start.transformed_by_move(source, target, how_many),
            )];
        }

        let move_range = Range::from_position_and_shift(source, how_many);
        let insert_position = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());

        // Content dropped strictly inside the range: the range stretches over
        // it and stays in one piece.
        if self.contains_position(target) && !move_range.contains_range(self, true) {
            return vec![Range::new(
                self.start.transformed_by_move(source, target, how_many),
                self.end.transformed_by_move(source, target, how_many),
            )];
        }

        let difference_set = self.get_difference(&move_range);
        let common = self.get_intersection(&move_range);

        let difference = match difference_set.len() {
            1 => Some(Range::new(
                difference_set[0]
                    .start
                    .transformed_by_deletion(source, how_many)
                    .unwrap_or_else(|| source.clone()),
                difference_set[0]
                    .end
                    .transformed_by_deletion(source, how_many)
                    .unwrap_or_else(|| source.clone()),
            )),
            // The moved chunk was strictly inside: what remains is the range
            // with the gap closed up.
            2 => Some(Range::new(
                self.start.clone(),
                self.end
                    .transformed_by_deletion(source, how_many)
                    .unwrap_or_else(|| source.clone()),
            )),
            _ => None,
        };

        let mut result = match &difference {
            Some(difference) => difference.transformed_by_insertion(
                &insert_position,
                how_many,
                common.is_some() || spread,
            ),
            None => Vec::new(),
        };

        if let Some(common) = common {
            let travelled = Range::new(
                common.start.combined(&move_range.start, &insert_position),
                common.end.combined(&move_range.start, &insert_position),
            );
            if result.len() == 2 {
                result.insert(1, travelled);
            } else {
                result.push(travelled);
            }
        }
        result
    }

    /// Transform under one applied document change, as broadcast to live
    /// ranges. Insertions never spread here; the move family routes through
    /// [`Range::transformed_by_move`].
    pub fn transformed_by_document_change(
        &self,
        kind: ChangeKind,
        target_position: &Position,
        how_many: usize,
        source_position: Option<&Position>,
    ) -> Vec<Range> {
        match (kind, source_position) {
            (ChangeKind::Insert, _) => {
                self.transformed_by_insertion(target_position, how_many, false)
            }
            (
                ChangeKind::Move | ChangeKind::Remove | ChangeKind::Reinsert,
                Some(source_position),
            ) => self.transformed_by_move(source_position, target_position, how_many, false),
            _ => vec![self.clone()],
        }
    }

    // ------------------------------------------------------- serialization

    pub fn to_json(&self, model: &Model) -> RangeJson {
        RangeJson {
            start: self.start.to_json(model),
            end: self.end.to_json(model),
        }
    }

    pub fn from_json(json: &RangeJson, model: &Model) -> Result<Self, ModelError> {
        Ok(Self {
            start: Position::from_json(&json.start, model)?,
            end: Position::from_json(&json.end, model)?,
        })
    }
}

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::node::{Model, NodeId, GRAVEYARD_ROOT_NAME};
use crate::operation::{MergeOperation, Operation, SplitOperation};

/// Tie-break rule for a position caught on the boundary of an insertion or
/// move: does it stick to the content before it, after it, or neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stickiness {
    #[default]
    ToNone,
    ToNext,
    ToPrevious,
}

/// Result of comparing two positions in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Same,
    Before,
    After,
    /// The positions live in different roots and have no common order.
    Different,
}

/// Placement for the [`Position::at_node`] factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    /// Inside the node, at the given offset.
    Offset(usize),
    /// Inside the node, at its max offset.
    End,
    /// In the node's parent, right before the node.
    Before,
    /// In the node's parent, right after the node.
    After,
}

pub(crate) enum PathRelation {
    Same,
    /// The first path is a strict prefix of the second.
    Prefix,
    /// The second path is a strict prefix of the first.
    Extension,
    /// Paths diverge at the contained index.
    DivergesAt(usize),
}

pub(crate) fn compare_paths(a: &[usize], b: &[usize]) -> PathRelation {
    for (index, (left, right)) in a.iter().zip(b.iter()).enumerate() {
        if left != right {
            return PathRelation::DivergesAt(index);
        }
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => PathRelation::Same,
        std::cmp::Ordering::Less => PathRelation::Prefix,
        std::cmp::Ordering::Greater => PathRelation::Extension,
    }
}

/// An offset-path address into the model tree.
///
/// The `path` holds one offset per tree level, from a direct root child down
/// to the position's own parent; the last entry is the position's offset in
/// that parent. A position may address a location that no longer exists (a
/// dangling path); that is legal and load-bearing for the operation
/// transform bookkeeping. Only `parent` resolution fails on dangling paths;
/// comparison and every transform are pure path arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    root: NodeId,
    path: Vec<usize>,
    pub stickiness: Stickiness,
}

/// Serialized shape of a position: root name, offset path and stickiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionJson {
    pub root: String,
    pub path: Vec<usize>,
    pub stickiness: Stickiness,
}

impl Position {
    /// Creates a position rooted at `root` with the given offset path.
    ///
    /// When `root` is a nested element rather than a root node, the path is
    /// normalized: the element's own path is prepended and the root is
    /// replaced by the element's root. Fails with [`ModelError::PositionRootInvalid`]
    /// for text nodes and [`ModelError::PositionPathIncorrectFormat`] for an
    /// empty path.
    pub fn new(
        model: &Model,
        root: NodeId,
        path: Vec<usize>,
        stickiness: Stickiness,
    ) -> Result<Self, ModelError> {
        if !model.is_element(root) {
            return Err(ModelError::PositionRootInvalid);
        }
        if path.is_empty() {
            return Err(ModelError::PositionPathIncorrectFormat);
        }
        if model.parent(root).is_some() {
            let mut full = model.path(root);
            full.extend(path);
            return Ok(Self {
                root: model.root_of(root),
                path: full,
                stickiness,
            });
        }
        Ok(Self {
            root,
            path,
            stickiness,
        })
    }

    /// Internal constructor for paths already known to be root-relative.
    pub(crate) fn from_parts(root: NodeId, path: Vec<usize>, stickiness: Stickiness) -> Self {
        debug_assert!(!path.is_empty());
        Self {
            root,
            path,
            stickiness,
        }
    }

    /// Creates a position relative to a node.
    ///
    /// Mirrors the loose factory shape consumers expect: `offset` is required
    /// when placing inside an element ([`ModelError::PositionCreateAtOffsetRequired`]
    /// otherwise), and placing *inside* a text node is rejected with
    /// [`ModelError::PositionParentIncorrect`].
    pub fn at_node(model: &Model, node: NodeId, place: Option<Place>) -> Result<Self, ModelError> {
        match place {
            None => Err(ModelError::PositionCreateAtOffsetRequired),
            Some(Place::Before) => Self::before(model, node),
            Some(Place::After) => Self::after(model, node),
            Some(place @ (Place::Offset(_) | Place::End)) => {
                if !model.is_element(node) {
                    return Err(ModelError::PositionParentIncorrect);
                }
                let offset = match place {
                    Place::Offset(offset) => offset,
                    _ => model.max_offset(node),
                };
                let mut path = model.path(node);
                path.push(offset);
                Ok(Self::from_parts(
                    model.root_of(node),
                    path,
                    Stickiness::ToNone,
                ))
            }
        }
    }

    /// Position right before `node` in its parent.
    pub fn before(model: &Model, node: NodeId) -> Result<Self, ModelError> {
        if model.parent(node).is_none() {
            return Err(ModelError::PositionBeforeRoot);
        }
        Ok(Self::from_parts(
            model.root_of(node),
            model.path(node),
            Stickiness::ToNone,
        ))
    }

    /// Position right after `node` in its parent.
    pub fn after(model: &Model, node: NodeId) -> Result<Self, ModelError> {
        if model.parent(node).is_none() {
            return Err(ModelError::PositionAfterRoot);
        }
        let mut path = model.path(node);
        if let Some(last) = path.last_mut() {
            *last += model.offset_size(node);
        }
        Ok(Self::from_parts(
            model.root_of(node),
            path,
            Stickiness::ToNone,
        ))
    }

    // ----------------------------------------------------------- accessors

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Offset in the position's parent, the last path entry.
    pub fn offset(&self) -> usize {
        *self.path.last().unwrap_or(&0)
    }

    pub fn set_offset(&mut self, offset: usize) {
        if let Some(last) = self.path.last_mut() {
            *last = offset;
        }
    }

    /// Descends one tree level, making the current offset a parent step.
    pub(crate) fn push_level(&mut self, offset: usize) {
        self.path.push(offset);
    }

    /// Ascends one tree level; the parent step becomes the offset. Keeps at
    /// least one path entry.
    pub(crate) fn pop_level(&mut self) {
        if self.path.len() > 1 {
            self.path.pop();
        }
    }

    /// Path without the final offset, addressing the position's parent.
    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Resolves the element the position points into.
    ///
    /// Computed on every access because the path may have been rewritten or
    /// may dangle. Fails with [`ModelError::PositionPathIncorrect`] when any
    /// step finds no child or resolves into a text node.
    pub fn parent(&self, model: &Model) -> Result<NodeId, ModelError> {
        let mut current = self.root;
        for &offset in self.parent_path() {
            let index = model.offset_to_index(current, offset).map_err(|_| {
                ModelError::PositionPathIncorrect {
                    path: self.path.clone(),
                }
            })?;
            let child =
                model
                    .child_at(current, index)
                    .ok_or_else(|| ModelError::PositionPathIncorrect {
                        path: self.path.clone(),
                    })?;
            if !model.is_element(child) {
                return Err(ModelError::PositionPathIncorrect {
                    path: self.path.clone(),
                });
            }
            current = child;
        }
        Ok(current)
    }

    /// Child index corresponding to this position's offset.
    pub fn index(&self, model: &Model) -> Result<usize, ModelError> {
        let parent = self.parent(model)?;
        model.offset_to_index(parent, self.offset())
    }

    /// Text node the position falls strictly inside of, if any.
    pub fn text_node(&self, model: &Model) -> Result<Option<NodeId>, ModelError> {
        let parent = self.parent(model)?;
        Ok(model.text_containing(parent, self.offset()))
    }

    /// Node directly after the position; `None` inside a text run or at the
    /// parent's end.
    pub fn node_after(&self, model: &Model) -> Result<Option<NodeId>, ModelError> {
        let parent = self.parent(model)?;
        if model.text_containing(parent, self.offset()).is_some() {
            return Ok(None);
        }
        let index = model.offset_to_index(parent, self.offset())?;
        Ok(model.child_at(parent, index))
    }

    /// Node directly before the position; `None` inside a text run or at the
    /// parent's start.
    pub fn node_before(&self, model: &Model) -> Result<Option<NodeId>, ModelError> {
        let parent = self.parent(model)?;
        if model.text_containing(parent, self.offset()).is_some() {
            return Ok(None);
        }
        if self.offset() == 0 {
            return Ok(None);
        }
        let index = model.offset_to_index(parent, self.offset())?;
        Ok(model.child_at(parent, index.saturating_sub(1)))
    }

    pub fn is_at_start(&self) -> bool {
        self.offset() == 0
    }

    pub fn is_at_end(&self, model: &Model) -> Result<bool, ModelError> {
        let parent = self.parent(model)?;
        Ok(self.offset() == model.max_offset(parent))
    }

    // ------------------------------------------------------------ ordering

    /// Total order over positions sharing a root; safe on dangling paths.
    ///
    /// A path that is a strict prefix of another denotes an ancestor-level
    /// position and sorts before anything inside that subtree.
    pub fn compare_with(&self, other: &Position) -> CompareResult {
        if self.root != other.root {
            return CompareResult::Different;
        }
        match compare_paths(&self.path, &other.path) {
            PathRelation::Same => CompareResult::Same,
            PathRelation::Prefix => CompareResult::Before,
            PathRelation::Extension => CompareResult::After,
            PathRelation::DivergesAt(index) => {
                if self.path[index] < other.path[index] {
                    CompareResult::Before
                } else {
                    CompareResult::After
                }
            }
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare_with(other) == CompareResult::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare_with(other) == CompareResult::After
    }

    pub fn is_equal(&self, other: &Position) -> bool {
        self.compare_with(other) == CompareResult::Same
    }

    /// True when no content lies strictly between the two positions: walking
    /// from the lower to the higher one crosses only element boundaries that
    /// are immediately adjacent.
    pub fn is_touching(&self, other: &Position, model: &Model) -> Result<bool, ModelError> {
        let (mut left, mut right) = match self.compare_with(other) {
            CompareResult::Same => return Ok(true),
            CompareResult::Before => (self.clone(), other.clone()),
            CompareResult::After => (other.clone(), self.clone()),
            CompareResult::Different => return Ok(false),
        };

        let mut left_parent = left.parent(model)?;
        while !left.path.is_empty() || !right.path.is_empty() {
            if left.is_equal(&right) {
                return Ok(true);
            }
            if left.path.len() > right.path.len() {
                // Stepping out forward is free only from the parent's end.
                if left.offset() != model.max_offset(left_parent) {
                    return Ok(false);
                }
                left.path.pop();
                left_parent = match model.parent(left_parent) {
                    Some(parent) => parent,
                    None => return Ok(false),
                };
                if let Some(last) = left.path.last_mut() {
                    *last += 1;
                }
            } else {
                // Stepping out backward is free only from offset zero.
                if right.offset() != 0 {
                    return Ok(false);
                }
                right.path.pop();
            }
        }
        Ok(false)
    }

    /// Copy with the offset shifted by `shift`, clamped at zero.
    pub fn shifted_by(&self, shift: isize) -> Position {
        let mut shifted = self.clone();
        let offset = self.offset() as isize + shift;
        shifted.set_offset(offset.max(0) as usize);
        shifted
    }

    // ------------------------------------------------- operation transform

    /// Re-derives this position's address after `operation` was applied
    /// elsewhere in the tree. Pure path arithmetic, safe on dangling paths.
    pub fn transformed_by_operation(&self, operation: &Operation) -> Position {
        match operation {
            Operation::Insert(op) => self.transformed_by_insertion(&op.position, op.how_many()),
            Operation::Move(op) | Operation::Remove(op) | Operation::Reinsert(op) => {
                self.transformed_by_move(&op.source_position, &op.target_position, op.how_many)
            }
            Operation::Split(op) => self.transformed_by_split(op),
            Operation::Merge(op) => self.transformed_by_merge(op),
            // Operations that relocate no nodes leave positions untouched.
            Operation::Attribute(_) => self.clone(),
        }
    }

    /// Transform under an insertion of `how_many` offsets at `insert_position`.
    ///
    /// A tie at the same level is resolved toward "pushed" unless this
    /// position sticks to the preceding content. At ancestor levels the
    /// ancestor is pushed whenever the insertion lands at or before it.
    pub fn transformed_by_insertion(
        &self,
        insert_position: &Position,
        how_many: usize,
    ) -> Position {
        let mut transformed = self.clone();
        if self.root != insert_position.root {
            return transformed;
        }
        match compare_paths(insert_position.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                if insert_position.offset() < self.offset()
                    || (insert_position.offset() == self.offset()
                        && self.stickiness != Stickiness::ToPrevious)
                {
                    transformed.set_offset(self.offset() + how_many);
                }
            }
            PathRelation::Prefix => {
                let depth = insert_position.path.len() - 1;
                if insert_position.offset() <= self.path[depth] {
                    transformed.path[depth] += how_many;
                }
            }
            _ => {}
        }
        transformed
    }

    /// Transform under a deletion of `how_many` offsets at `delete_position`.
    /// Returns `None` when this position's anchor fell inside the deleted
    /// span and no longer exists.
    pub fn transformed_by_deletion(
        &self,
        delete_position: &Position,
        how_many: usize,
    ) -> Option<Position> {
        let mut transformed = self.clone();
        if self.root != delete_position.root {
            return Some(transformed);
        }
        match compare_paths(delete_position.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                if delete_position.offset() < self.offset() {
                    if delete_position.offset() + how_many > self.offset() {
                        return None;
                    }
                    transformed.set_offset(self.offset() - how_many);
                }
            }
            PathRelation::Prefix => {
                let depth = delete_position.path.len() - 1;
                if delete_position.offset() <= self.path[depth] {
                    if delete_position.offset() + how_many > self.path[depth] {
                        return None;
                    }
                    transformed.path[depth] -= how_many;
                }
            }
            _ => {}
        }
        Some(transformed)
    }

    /// Transform under a move of `how_many` offsets from `source` to `target`.
    ///
    /// The target is first re-anchored against the implied deletion at the
    /// source. A position inside the moved span, or hugging its boundary
    /// with matching stickiness, travels with the content via [`Position::combined`].
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
    ) -> Position {
        let target = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        if source.is_equal(&target) {
            return self.clone();
        }

        let hugging = (source.is_equal(self) && self.stickiness == Stickiness::ToNext)
            || (source.shifted_by(how_many as isize).is_equal(self)
                && self.stickiness == Stickiness::ToPrevious);

        match self.transformed_by_deletion(source, how_many) {
            Some(transformed) if !hugging => transformed.transformed_by_insertion(&target, how_many),
            _ => self.combined(source, &target),
        }
    }

    /// Splices this position onto `target`: it was `k` offsets into the moved
    /// range starting at `source`, so it is now at `target + k`, keeping
    /// whatever sub-path it had below the source level.
    pub fn combined(&self, source: &Position, target: &Position) -> Position {
        let depth = source.path.len() - 1;
        let at_depth = self.path.get(depth).copied().unwrap_or(source.offset());

        let mut path = target.path.clone();
        if let Some(last) = path.last_mut() {
            *last += at_depth.saturating_sub(source.offset());
        }
        if depth + 1 < self.path.len() {
            path.extend_from_slice(&self.path[depth + 1..]);
        }
        Position {
            root: target.root,
            path,
            stickiness: self.stickiness,
        }
    }

    /// Transform under a split: content after the split point travels into
    /// the new element, everything else sees one node inserted (or reinserted
    /// from the graveyard) after the split element.
    pub fn transformed_by_split(&self, operation: &SplitOperation) -> Position {
        let in_moved_part = operation.moved_range.contains_position(self)
            || (operation.moved_range.start.is_equal(self)
                && self.stickiness == Stickiness::ToNext);
        if in_moved_part {
            return self.combined(&operation.split_position, &operation.move_target_position);
        }
        match &operation.graveyard_position {
            Some(graveyard) => {
                self.transformed_by_move(graveyard, &operation.insertion_position, 1)
            }
            None => self.transformed_by_insertion(&operation.insertion_position, 1),
        }
    }

    /// Transform under a merge: content of the merged element lands at the
    /// merge target; the emptied element itself is deleted from its parent.
    pub fn transformed_by_merge(&self, operation: &MergeOperation) -> Position {
        let deletion = operation.deletion_position();
        let inside_merged = self.root == operation.source_position.root
            && self.path.len() > deletion.path.len()
            && self.path[..deletion.path.len()] == deletion.path[..];
        if inside_merged {
            return self.combined(&operation.source_position, &operation.target_position);
        }
        match self.transformed_by_deletion(&deletion, 1) {
            Some(transformed) => transformed,
            // The anchor pointed through the removed element; follow it to
            // the graveyard.
            None => self.combined(&deletion, &operation.graveyard_position),
        }
    }

    // ------------------------------------------------------- serialization

    pub fn to_json(&self, model: &Model) -> PositionJson {
        PositionJson {
            root: model
                .root_name(self.root)
                .unwrap_or("$fragment")
                .to_string(),
            path: self.path.clone(),
            stickiness: self.stickiness,
        }
    }

    /// Reconstructs a position against a live model. `$graveyard` resolves to
    /// the model's graveyard root; any other unknown root name fails with
    /// [`ModelError::PositionFromJsonNoRoot`].
    pub fn from_json(json: &PositionJson, model: &Model) -> Result<Self, ModelError> {
        let root = if json.root == GRAVEYARD_ROOT_NAME {
            model.graveyard()
        } else {
            model
                .root(&json.root)
                .ok_or_else(|| ModelError::PositionFromJsonNoRoot {
                    root: json.root.clone(),
                })?
        };
        if json.path.is_empty() {
            return Err(ModelError::PositionPathIncorrectFormat);
        }
        Ok(Self::from_parts(root, json.path.clone(), json.stickiness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{InsertOperation, NewNode};
    use crate::range::Range;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Builds `<main><paragraph>foobar</paragraph></main>` and returns the
    /// model plus ids of the root, paragraph and text run.
    fn foobar_model() -> (Model, NodeId, NodeId, NodeId) {
        let mut model = Model::new();
        let root = model.create_root("main");
        let p = model.create_element("paragraph");
        let t = model.create_text("foobar");
        model.append(p, t);
        model.append(root, p);
        (model, root, p, t)
    }

    fn pos(model: &Model, root: NodeId, path: &[usize]) -> Position {
        Position::new(model, root, path.to_vec(), Stickiness::ToNone).unwrap()
    }

    #[test]
    fn rejects_text_roots_and_empty_paths() {
        let (model, root, _, t) = foobar_model();
        assert!(matches!(
            Position::new(&model, t, vec![0], Stickiness::ToNone),
            Err(ModelError::PositionRootInvalid)
        ));
        assert!(matches!(
            Position::new(&model, root, vec![], Stickiness::ToNone),
            Err(ModelError::PositionPathIncorrectFormat)
        ));
    }

    #[test]
    fn nested_root_normalizes_to_a_root_relative_path() {
        let (model, root, p, _) = foobar_model();
        let position = Position::new(&model, p, vec![3], Stickiness::ToNone).unwrap();
        assert_eq!(position.root(), root);
        assert_eq!(position.path(), &[0, 3]);
    }

    #[test]
    fn accessors_resolve_against_the_tree() {
        let (model, root, p, t) = foobar_model();
        let inside = pos(&model, root, &[0, 3]);

        assert_eq!(inside.parent(&model).unwrap(), p);
        assert_eq!(inside.offset(), 3);
        assert_eq!(inside.text_node(&model).unwrap(), Some(t));
        assert_eq!(inside.node_after(&model).unwrap(), None);
        assert_eq!(inside.node_before(&model).unwrap(), None);

        let at_start = pos(&model, root, &[0, 0]);
        assert!(at_start.is_at_start());
        assert_eq!(at_start.text_node(&model).unwrap(), None);
        assert_eq!(at_start.node_after(&model).unwrap(), Some(t));

        let at_end = pos(&model, root, &[0, 6]);
        assert!(at_end.is_at_end(&model).unwrap());
        assert_eq!(at_end.node_before(&model).unwrap(), Some(t));
    }

    #[test]
    fn dangling_parent_resolution_fails_but_comparison_works() {
        let (model, root, _, _) = foobar_model();
        let dangling = pos(&model, root, &[4, 2, 1]);
        assert!(matches!(
            dangling.parent(&model),
            Err(ModelError::PositionPathIncorrect { .. })
        ));
        // Comparison never dereferences the tree.
        assert!(dangling.is_after(&pos(&model, root, &[0, 3])));
    }

    #[rstest]
    #[case(&[0, 3], &[0, 3], CompareResult::Same)]
    #[case(&[0, 2], &[0, 3], CompareResult::Before)]
    #[case(&[0, 4], &[0, 3], CompareResult::After)]
    #[case(&[0], &[0, 3], CompareResult::Before)] // ancestor level sorts first
    #[case(&[0, 3, 1], &[0, 3], CompareResult::After)]
    fn compare_with_orders_paths(
        #[case] left: &[usize],
        #[case] right: &[usize],
        #[case] expected: CompareResult,
    ) {
        let (model, root, _, _) = foobar_model();
        assert_eq!(
            pos(&model, root, left).compare_with(&pos(&model, root, right)),
            expected
        );
    }

    #[test]
    fn different_roots_never_compare() {
        let (mut model, root, _, _) = foobar_model();
        let other = model.create_root("other");
        assert_eq!(
            pos(&model, root, &[0]).compare_with(&pos(&model, other, &[0])),
            CompareResult::Different
        );
    }

    #[test]
    fn touching_across_adjacent_paragraph_boundary() {
        let (mut model, root, _, _) = foobar_model();
        let p2 = model.create_element("paragraph");
        let t2 = model.create_text("x");
        model.append(p2, t2);
        model.append(root, p2);

        let end_of_first = pos(&model, root, &[0, 6]);
        let start_of_second = pos(&model, root, &[1, 0]);
        let inside_first = pos(&model, root, &[0, 5]);

        assert!(end_of_first.is_touching(&start_of_second, &model).unwrap());
        assert!(!inside_first.is_touching(&start_of_second, &model).unwrap());
        assert!(end_of_first
            .is_touching(&pos(&model, root, &[1]), &model)
            .unwrap());
        assert!(!pos(&model, root, &[0])
            .is_touching(&pos(&model, root, &[2]), &model)
            .unwrap());
    }

    #[test]
    fn insertion_pushes_on_tie_unless_sticking_to_previous() {
        let (model, root, _, _) = foobar_model();
        let at = pos(&model, root, &[0, 3]);

        // Insertion before: pushed.
        let moved = at.transformed_by_insertion(&pos(&model, root, &[0, 1]), 2);
        assert_eq!(moved.path(), &[0, 5]);

        // Tie with default stickiness: pushed.
        let moved = at.transformed_by_insertion(&pos(&model, root, &[0, 3]), 2);
        assert_eq!(moved.path(), &[0, 5]);

        // Tie sticking to previous content: unchanged.
        let mut sticky = at.clone();
        sticky.stickiness = Stickiness::ToPrevious;
        let kept = sticky.transformed_by_insertion(&pos(&model, root, &[0, 3]), 2);
        assert_eq!(kept.path(), &[0, 3]);

        // Insertion after: unchanged.
        let kept = at.transformed_by_insertion(&pos(&model, root, &[0, 4]), 2);
        assert_eq!(kept.path(), &[0, 3]);
    }

    #[test]
    fn insertion_at_ancestor_level_shifts_the_ancestor_component() {
        let (model, root, _, _) = foobar_model();
        let inside = pos(&model, root, &[0, 3]);

        // Inserting a sibling before (or at) the paragraph shifts the path.
        let shifted = inside.transformed_by_insertion(&pos(&model, root, &[0]), 1);
        assert_eq!(shifted.path(), &[1, 3]);

        // Inserting after the paragraph does not.
        let kept = inside.transformed_by_insertion(&pos(&model, root, &[1]), 1);
        assert_eq!(kept.path(), &[0, 3]);
    }

    #[test]
    fn insertion_of_zero_nodes_is_identity() {
        let (model, root, _, _) = foobar_model();
        let at = pos(&model, root, &[0, 3]);
        assert!(at
            .transformed_by_insertion(&pos(&model, root, &[0, 0]), 0)
            .is_equal(&at));
    }

    #[test]
    fn deletion_covering_the_position_returns_none() {
        let (model, root, _, _) = foobar_model();
        let at = pos(&model, root, &[0, 3]);

        assert!(at
            .transformed_by_deletion(&pos(&model, root, &[0, 0]), 6)
            .is_none());
        // Deletion ending exactly at the position keeps it.
        let kept = at
            .transformed_by_deletion(&pos(&model, root, &[0, 0]), 3)
            .unwrap();
        assert_eq!(kept.path(), &[0, 0]);
        // Deletion starting at the position keeps it in place.
        let kept = at
            .transformed_by_deletion(&pos(&model, root, &[0, 3]), 3)
            .unwrap();
        assert_eq!(kept.path(), &[0, 3]);
        // Deleting the ancestor element severs the anchor.
        assert!(at
            .transformed_by_deletion(&pos(&model, root, &[0]), 1)
            .is_none());
    }

    #[test]
    fn move_carries_positions_inside_the_moved_span() {
        let (mut model, root, _, _) = foobar_model();
        let p2 = model.create_element("paragraph");
        model.append(root, p2);

        // "oba" moves to the second paragraph; a position inside it follows.
        let inside = pos(&model, root, &[0, 3]);
        let moved = inside.transformed_by_move(
            &pos(&model, root, &[0, 2]),
            &pos(&model, root, &[1, 0]),
            3,
        );
        assert_eq!(moved.path(), &[1, 1]);

        // A position after the moved span shifts left.
        let after = pos(&model, root, &[0, 6]);
        let shifted = after.transformed_by_move(
            &pos(&model, root, &[0, 2]),
            &pos(&model, root, &[1, 0]),
            3,
        );
        assert_eq!(shifted.path(), &[0, 3]);
    }

    #[test]
    fn move_respects_boundary_stickiness() {
        let (model, root, _, _) = foobar_model();
        let source = pos(&model, root, &[0, 2]);
        let target = pos(&model, root, &[1]);

        let mut to_next = pos(&model, root, &[0, 2]);
        to_next.stickiness = Stickiness::ToNext;
        let carried = to_next.transformed_by_move(&source, &target, 3);
        assert_eq!(carried.path(), &[1]);

        let mut to_previous = pos(&model, root, &[0, 5]);
        to_previous.stickiness = Stickiness::ToPrevious;
        let carried = to_previous.transformed_by_move(&source, &target, 3);
        assert_eq!(carried.path(), &[4]);

        // Default stickiness stays behind at the collapsed source.
        let neutral = pos(&model, root, &[0, 2]);
        let kept = neutral.transformed_by_move(&source, &target, 3);
        assert_eq!(kept.path(), &[0, 2]);
    }

    #[test]
    fn combined_splices_the_suffix_path_onto_the_target() {
        let (model, root, _, _) = foobar_model();
        let inside = pos(&model, root, &[0, 4, 2]);
        let combined = inside.combined(&pos(&model, root, &[0, 2]), &pos(&model, root, &[3, 1]));
        assert_eq!(combined.path(), &[3, 3, 2]);
    }

    #[test]
    fn transform_by_operation_identity_for_attribute_ops() {
        let (model, root, _, _) = foobar_model();
        let at = pos(&model, root, &[0, 3]);
        let op = Operation::Attribute(crate::operation::AttributeOperation {
            range: Range::new(pos(&model, root, &[0, 0]), pos(&model, root, &[0, 6])),
            key: "bold".into(),
            value: Some("true".into()),
        });
        assert!(at.transformed_by_operation(&op).is_equal(&at));
    }

    #[test]
    fn transform_by_insert_operation_matches_primitive() {
        let (model, root, _, _) = foobar_model();
        let at = pos(&model, root, &[0, 3]);
        let op = Operation::Insert(InsertOperation {
            position: pos(&model, root, &[0, 1]),
            nodes: vec![NewNode::text("xy")],
        });
        assert_eq!(at.transformed_by_operation(&op).path(), &[0, 5]);
    }

    #[test]
    fn json_round_trip_preserves_the_address() {
        let (model, root, _, _) = foobar_model();
        let mut original = pos(&model, root, &[0, 3]);
        original.stickiness = Stickiness::ToPrevious;

        let json = original.to_json(&model);
        assert_eq!(json.root, "main");
        let text = serde_json::to_string(&json).unwrap();
        assert!(text.contains("\"toPrevious\""));

        let parsed: PositionJson = serde_json::from_str(&text).unwrap();
        let restored = Position::from_json(&parsed, &model).unwrap();
        assert!(restored.is_equal(&original));
        assert_eq!(restored.stickiness, Stickiness::ToPrevious);
    }

    #[test]
    fn json_graveyard_and_unknown_roots() {
        let (model, _, _, _) = foobar_model();
        let json = PositionJson {
            root: GRAVEYARD_ROOT_NAME.to_string(),
            path: vec![0],
            stickiness: Stickiness::ToNone,
        };
        let restored = Position::from_json(&json, &model).unwrap();
        assert_eq!(restored.root(), model.graveyard());

        let unknown = PositionJson {
            root: "nope".to_string(),
            path: vec![0],
            stickiness: Stickiness::ToNone,
        };
        assert!(matches!(
            Position::from_json(&unknown, &model),
            Err(ModelError::PositionFromJsonNoRoot { root }) if root == "nope"
        ));
    }

    #[test]
    fn factory_helpers_enforce_their_contracts() {
        let (model, root, p, t) = foobar_model();

        assert!(matches!(
            Position::at_node(&model, p, None),
            Err(ModelError::PositionCreateAtOffsetRequired)
        ));
        assert!(matches!(
            Position::at_node(&model, t, Some(Place::Offset(1))),
            Err(ModelError::PositionParentIncorrect)
        ));
        assert!(matches!(
            Position::before(&model, root),
            Err(ModelError::PositionBeforeRoot)
        ));
        assert!(matches!(
            Position::after(&model, root),
            Err(ModelError::PositionAfterRoot)
        ));

        let end = Position::at_node(&model, p, Some(Place::End)).unwrap();
        assert_eq!(end.path(), &[0, 6]);
        let before = Position::before(&model, t).unwrap();
        assert_eq!(before.path(), &[0, 0]);
        let after = Position::after(&model, t).unwrap();
        assert_eq!(after.path(), &[0, 6]);
        let after_p = Position::after(&model, p).unwrap();
        assert_eq!(after_p.path(), &[1]);
    }
}

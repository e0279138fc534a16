use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::emitter::{Emitter, ListenerId};
use crate::error::ModelError;
use crate::liverange::{self, LiveRange, LiveRangeState};
use crate::marker::MarkerCollection;
use crate::node::{Model, NodeId};
use crate::operation::{
    AttributeOperation, InsertOperation, MergeOperation, MoveOperation, NewNode, Operation,
    SplitOperation,
};
use crate::position::{Position, Stickiness};
use crate::range::Range;
use crate::treewalker::{TreeWalker, TreeWalkerOptions, WalkerItem};

/// What a broadcast change did to the tree. Split and merge decompose into
/// these on apply, so consumers only ever see the four structural kinds plus
/// attribute changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Move,
    Remove,
    Reinsert,
    Attribute,
}

/// One applied change, as seen by listeners and live ranges.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Content touched by the change, in post-change coordinates. For the
    /// move family this is where the content landed.
    pub range: Range,
    /// For the move family, where the content was taken from, in pre-change
    /// coordinates.
    pub source_position: Option<Position>,
    pub version: u64,
}

/// Result of applying one operation.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Touched regions, in post-change coordinates, in the order the change
    /// was decomposed.
    pub changed: Vec<Range>,
    pub version: u64,
}

/// The document: a node tree plus the change pipeline around it.
///
/// All edits go through [`Document::apply`], which mutates the tree,
/// re-anchors every tracked live range and marker, and then broadcasts the
/// change to listeners. Direct access to the [`Model`] is read-only except
/// for [`Document::model_mut`], which exists for loading initial content.
pub struct Document {
    pub(crate) model: Model,
    pub(crate) version: u64,
    pub(crate) emitter: Emitter<ChangeEvent>,
    pub(crate) live_ranges: Vec<Weak<RefCell<LiveRangeState>>>,
    pub(crate) markers: MarkerCollection,
}

impl Document {
    pub fn new() -> Self {
        Self {
            model: Model::new(),
            version: 0,
            emitter: Emitter::new(),
            live_ranges: Vec::new(),
            markers: MarkerCollection::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Mutable tree access for building initial content. Changes made here
    /// are invisible to live ranges, markers and listeners.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Registers a change listener. Live ranges and markers are already
    /// re-anchored by the time listeners run.
    pub fn on_change(&mut self, callback: impl FnMut(&ChangeEvent) + 'static) -> ListenerId {
        self.emitter.on(callback)
    }

    pub fn off_change(&mut self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    /// Starts tracking `range`: the returned handle follows every applied
    /// change until dropped or detached.
    pub fn track(&mut self, range: Range) -> LiveRange {
        let (live, weak) = LiveRange::create(range);
        self.live_ranges.push(weak);
        live
    }

    // ----------------------------------------------------------- operations

    /// Applies one operation: mutates the tree, bumps the version, re-anchors
    /// live ranges and markers, then notifies change listeners.
    pub fn apply(&mut self, operation: Operation) -> Result<Patch, ModelError> {
        debug!(
            op = operation.kind(),
            version = self.version,
            "applying operation"
        );
        self.version += 1;
        let events = match &operation {
            Operation::Insert(op) => vec![self.apply_insert(op)?],
            Operation::Move(op) => vec![self.apply_move(op, ChangeKind::Move)?],
            Operation::Remove(op) => vec![self.apply_move(op, ChangeKind::Remove)?],
            Operation::Reinsert(op) => vec![self.apply_move(op, ChangeKind::Reinsert)?],
            Operation::Split(op) => self.apply_split(op)?,
            Operation::Merge(op) => self.apply_merge(op)?,
            Operation::Attribute(op) => vec![self.apply_attribute(op)?],
        };

        let changed = events.iter().map(|event| event.range.clone()).collect();
        for event in events {
            self.broadcast(event);
        }
        Ok(Patch {
            changed,
            version: self.version,
        })
    }

    fn check_root(&self, position: &Position) -> Result<(), ModelError> {
        if self.model.root_name(position.root()).is_none() {
            return Err(ModelError::OperationRootMissing);
        }
        Ok(())
    }

    fn apply_insert(&mut self, op: &InsertOperation) -> Result<ChangeEvent, ModelError> {
        self.check_root(&op.position)?;
        let parent = op.position.parent(&self.model)?;
        let how_many = op.how_many();

        let ids: Vec<NodeId> = op
            .nodes
            .iter()
            .map(|node| match node {
                NewNode::Element { name } => self.model.create_element(name),
                NewNode::Text { data } => self.model.create_text(data),
            })
            .collect();
        self.model.splice_in(parent, op.position.offset(), &ids)?;

        Ok(ChangeEvent {
            kind: ChangeKind::Insert,
            range: Range::from_position_and_shift(&op.position, how_many),
            source_position: None,
            version: self.version,
        })
    }

    fn apply_move(
        &mut self,
        op: &MoveOperation,
        kind: ChangeKind,
    ) -> Result<ChangeEvent, ModelError> {
        self.check_root(&op.source_position)?;
        self.check_root(&op.target_position)?;
        let source_parent = op.source_position.parent(&self.model)?;

        let moved = Range::from_position_and_shift(&op.source_position, op.how_many);
        if moved.contains_position(&op.target_position) {
            return Err(ModelError::MoveTargetInsideMovedRange);
        }
        let insert_at = op
            .target_position
            .transformed_by_deletion(&op.source_position, op.how_many)
            .ok_or(ModelError::MoveTargetInsideMovedRange)?;

        let nodes =
            self.model
                .extract_span(source_parent, op.source_position.offset(), op.how_many)?;
        let target_parent = insert_at.parent(&self.model)?;
        self.model
            .splice_in(target_parent, insert_at.offset(), &nodes)?;

        Ok(ChangeEvent {
            kind,
            range: Range::from_position_and_shift(&insert_at, op.how_many),
            source_position: Some(op.source_position.clone()),
            version: self.version,
        })
    }

    /// A split is two changes: the new element appears after the split one,
    /// then the trailing content moves into it.
    fn apply_split(&mut self, op: &SplitOperation) -> Result<Vec<ChangeEvent>, ModelError> {
        self.check_root(&op.split_position)?;
        let element = op.split_position.parent(&self.model)?;
        if self.model.parent(element).is_none() {
            return Err(ModelError::OperationAtRootLevel);
        }

        let max = self.model.max_offset(element);
        if op.split_position.offset() > max {
            return Err(ModelError::OffsetOutOfBounds {
                offset: op.split_position.offset(),
                max,
            });
        }
        let how_many = max - op.split_position.offset();

        let new_element = match &op.graveyard_position {
            Some(graveyard_position) => {
                let graveyard = self.model.graveyard();
                let nodes = self.model.extract_span(graveyard, graveyard_position.offset(), 1)?;
                nodes
                    .into_iter()
                    .next()
                    .ok_or_else(|| ModelError::PositionPathIncorrect {
                        path: graveyard_position.path().to_vec(),
                    })?
            }
            None => self.model.clone_element_shell(element),
        };
        let insertion_parent = op.insertion_position.parent(&self.model)?;
        self.model
            .splice_in(insertion_parent, op.insertion_position.offset(), &[new_element])?;

        let first = ChangeEvent {
            kind: if op.graveyard_position.is_some() {
                ChangeKind::Reinsert
            } else {
                ChangeKind::Insert
            },
            range: Range::from_position_and_shift(&op.insertion_position, 1),
            source_position: op.graveyard_position.clone(),
            version: self.version,
        };

        let nodes = self
            .model
            .extract_span(element, op.split_position.offset(), how_many)?;
        self.model.splice_in(new_element, 0, &nodes)?;

        let second = ChangeEvent {
            kind: ChangeKind::Move,
            range: Range::from_position_and_shift(&op.move_target_position, how_many),
            source_position: Some(op.split_position.clone()),
            version: self.version,
        };
        Ok(vec![first, second])
    }

    /// A merge is two changes: the merged element's content moves to the
    /// target, then the emptied element is removed to the graveyard.
    fn apply_merge(&mut self, op: &MergeOperation) -> Result<Vec<ChangeEvent>, ModelError> {
        self.check_root(&op.source_position)?;
        self.check_root(&op.target_position)?;
        let merged = op.source_position.parent(&self.model)?;
        let target_parent = op.target_position.parent(&self.model)?;
        let merged_parent = match self.model.parent(merged) {
            Some(parent) => parent,
            None => return Err(ModelError::OperationAtRootLevel),
        };
        let deletion = op.deletion_position();
        let how_many = self.model.max_offset(merged);

        let nodes = self.model.extract_span(merged, 0, how_many)?;
        self.model
            .splice_in(target_parent, op.target_position.offset(), &nodes)?;
        let first = ChangeEvent {
            kind: ChangeKind::Move,
            range: Range::from_position_and_shift(&op.target_position, how_many),
            source_position: Some(op.source_position.clone()),
            version: self.version,
        };

        let graveyard = self.model.graveyard();
        let removed = self
            .model
            .extract_span(merged_parent, deletion.offset(), 1)?;
        self.model
            .splice_in(graveyard, op.graveyard_position.offset(), &removed)?;
        let second = ChangeEvent {
            kind: ChangeKind::Remove,
            range: Range::from_position_and_shift(&op.graveyard_position, 1),
            source_position: Some(deletion),
            version: self.version,
        };
        Ok(vec![first, second])
    }

    fn apply_attribute(&mut self, op: &AttributeOperation) -> Result<ChangeEvent, ModelError> {
        self.check_root(&op.range.start)?;
        let walker = TreeWalker::new(
            &self.model,
            TreeWalkerOptions {
                boundaries: Some(op.range.clone()),
                ignore_element_end: true,
                ..Default::default()
            },
        )?;
        let targets: Vec<NodeId> = walker
            .filter_map(|step| match step.item {
                WalkerItem::Node(node) => Some(node),
                WalkerItem::Text(_) => None,
            })
            .collect();
        for node in targets {
            self.model.set_attr(node, &op.key, op.value.as_deref());
        }

        Ok(ChangeEvent {
            kind: ChangeKind::Attribute,
            range: op.range.clone(),
            source_position: None,
            version: self.version,
        })
    }

    /// Re-anchors live ranges first, then notifies change listeners, so that
    /// listeners always observe settled ranges and markers.
    fn broadcast(&mut self, event: ChangeEvent) {
        trace!(kind = ?event.kind, version = event.version, "broadcasting change");
        self.live_ranges.retain(|weak| weak.strong_count() > 0);
        let tracked: Vec<Rc<RefCell<LiveRangeState>>> = self
            .live_ranges
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for state in tracked {
            liverange::apply_change(&state, &event);
        }

        let mut emitter = self.emitter.take();
        emitter.fire(&event);
        self.emitter.restore(emitter);
    }

    // ---------------------------------------------------------- conveniences

    /// Offset width of a flat range. A range spanning parents has no single
    /// width and is rejected.
    fn flat_width(range: &Range) -> Result<usize, ModelError> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }
        Ok(range.end.offset() - range.start.offset())
    }

    /// Inserts content at `position`.
    pub fn insert(&mut self, position: Position, nodes: Vec<NewNode>) -> Result<Patch, ModelError> {
        self.apply(Operation::Insert(InsertOperation { position, nodes }))
    }

    /// Removes a flat range (both ends in the same parent) to the graveyard.
    pub fn remove(&mut self, range: Range) -> Result<Patch, ModelError> {
        let how_many = Self::flat_width(&range)?;
        let graveyard = self.model.graveyard();
        let target = Position::from_parts(
            graveyard,
            vec![self.model.max_offset(graveyard)],
            Stickiness::ToNone,
        );
        self.apply(Operation::Remove(MoveOperation {
            source_position: range.start,
            target_position: target,
            how_many,
        }))
    }

    /// Moves a flat range so that it starts at `target`.
    pub fn move_range(&mut self, range: Range, target: Position) -> Result<Patch, ModelError> {
        let how_many = Self::flat_width(&range)?;
        self.apply(Operation::Move(MoveOperation {
            source_position: range.start,
            target_position: target,
            how_many,
        }))
    }

    /// Splits the element that `position` points into.
    pub fn split(&mut self, position: Position) -> Result<Patch, ModelError> {
        let element = position.parent(&self.model)?;
        let how_many = self.model.max_offset(element) - position.offset();
        self.apply(Operation::Split(SplitOperation::new(
            position, how_many, None,
        )?))
    }

    /// Merges the element that `position` points before into the element
    /// right before it.
    pub fn merge(&mut self, position: Position) -> Result<Patch, ModelError> {
        let merged = position
            .node_after(&self.model)?
            .ok_or(ModelError::PositionParentIncorrect)?;
        let survivor = position
            .node_before(&self.model)?
            .ok_or(ModelError::PositionParentIncorrect)?;

        let mut source_path = position.path().to_vec();
        source_path.push(0);
        let source = Position::from_parts(position.root(), source_path, Stickiness::ToNone);

        let mut target_path = self.model.path(survivor);
        target_path.push(self.model.max_offset(survivor));
        let target = Position::from_parts(position.root(), target_path, Stickiness::ToNone);

        let graveyard = self.model.graveyard();
        let graveyard_position = Position::from_parts(
            graveyard,
            vec![self.model.max_offset(graveyard)],
            Stickiness::ToNone,
        );
        let how_many = self.model.max_offset(merged);

        self.apply(Operation::Merge(MergeOperation::new(
            source,
            how_many,
            target,
            graveyard_position,
        )?))
    }

    /// Sets (`Some`) or removes (`None`) an attribute on elements covered by
    /// `range`.
    pub fn set_attribute(
        &mut self,
        range: Range,
        key: &str,
        value: Option<&str>,
    ) -> Result<Patch, ModelError> {
        self.apply(Operation::Attribute(AttributeOperation {
            range,
            key: key.to_string(),
            value: value.map(str::to_string),
        }))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("live_ranges", &self.live_ranges.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc_with_paragraph(text: &str) -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let model = doc.model_mut();
        let root = model.create_root("main");
        let p = model.create_element("paragraph");
        let t = model.create_text(text);
        model.append(p, t);
        model.append(root, p);
        (doc, root, p)
    }

    fn pos(doc: &Document, root: NodeId, path: &[usize]) -> Position {
        Position::new(doc.model(), root, path.to_vec(), Stickiness::ToNone).unwrap()
    }

    fn range(doc: &Document, root: NodeId, start: &[usize], end: &[usize]) -> Range {
        Range::new(pos(doc, root, start), pos(doc, root, end))
    }

    /// Concatenated text of an element's children, elements rendered by name.
    fn content(doc: &Document, parent: NodeId) -> String {
        doc.model()
            .children(parent)
            .iter()
            .map(|child| match doc.model().text_data(*child) {
                Some(data) => data.to_string(),
                None => format!("<{}>", doc.model().name(*child).unwrap_or("?")),
            })
            .collect()
    }

    #[test]
    fn insert_splices_text_and_reports_the_patch() {
        let (mut doc, root, p) = doc_with_paragraph("foobar");
        let patch = doc
            .insert(pos(&doc, root, &[0, 3]), vec![NewNode::text("xy")])
            .unwrap();

        assert_eq!(content(&doc, p), "fooxybar");
        assert_eq!(doc.model().max_offset(p), 8);
        assert_eq!(patch.version, 1);
        assert_eq!(patch.changed, vec![range(&doc, root, &[0, 3], &[0, 5])]);
    }

    #[test]
    fn remove_relocates_content_to_the_graveyard() {
        let (mut doc, root, p) = doc_with_paragraph("foobar");
        let patch = doc.remove(range(&doc, root, &[0, 2], &[0, 5])).unwrap();

        assert_eq!(content(&doc, p), "for");
        let graveyard = doc.model().graveyard();
        assert_eq!(doc.model().max_offset(graveyard), 3);
        assert_eq!(content(&doc, graveyard), "oba");
        assert_eq!(patch.changed.len(), 1);
        assert_eq!(patch.changed[0].start.root(), graveyard);
    }

    #[test]
    fn move_between_parents() {
        let (mut doc, root, p1) = doc_with_paragraph("foobar");
        let p2 = doc.model_mut().create_element("paragraph");
        doc.model_mut().append(root, p2);

        doc.move_range(
            range(&doc, root, &[0, 2], &[0, 4]),
            pos(&doc, root, &[1, 0]),
        )
        .unwrap();
        assert_eq!(content(&doc, p1), "foar");
        assert_eq!(content(&doc, p2), "ob");
    }

    #[test]
    fn remove_and_move_reject_ranges_spanning_parents() {
        let (mut doc, root, p1) = doc_with_paragraph("foobar");
        let p2 = doc.model_mut().create_element("paragraph");
        let t2 = doc.model_mut().create_text("xy");
        doc.model_mut().append(p2, t2);
        doc.model_mut().append(root, p2);

        // Valid range (start before end), but the ends live in different
        // paragraphs, so it has no single offset width.
        let spanning = range(&doc, root, &[0, 5], &[1, 1]);
        assert!(matches!(
            doc.remove(spanning.clone()),
            Err(ModelError::RangeNotFlat)
        ));
        assert!(matches!(
            doc.move_range(spanning, pos(&doc, root, &[1, 2])),
            Err(ModelError::RangeNotFlat)
        ));
        // Nothing moved.
        assert_eq!(content(&doc, p1), "foobar");
        assert_eq!(content(&doc, p2), "xy");
    }

    #[test]
    fn move_target_inside_the_moved_span_is_rejected() {
        let (mut doc, root, _) = doc_with_paragraph("foobar");
        let result = doc.move_range(
            range(&doc, root, &[0, 1], &[0, 5]),
            pos(&doc, root, &[0, 3]),
        );
        assert!(matches!(
            result,
            Err(ModelError::MoveTargetInsideMovedRange)
        ));
    }

    #[test]
    fn operations_on_foreign_roots_are_rejected() {
        let (mut doc, _, _) = doc_with_paragraph("foobar");
        let mut other = Model::new();
        for _ in 0..8 {
            other.create_element("filler");
        }
        let foreign_root = other.create_root("other");
        // An id minted by another arena is not a root of this document.
        let position = Position::new(&other, foreign_root, vec![0], Stickiness::ToNone).unwrap();
        let result = doc.insert(position, vec![NewNode::text("x")]);
        assert!(matches!(result, Err(ModelError::OperationRootMissing)));
    }

    #[test]
    fn split_creates_a_sibling_with_the_trailing_content() {
        let (mut doc, root, p1) = doc_with_paragraph("foobar");
        doc.model_mut().set_attr(p1, "align", Some("right"));

        let patch = doc.split(pos(&doc, root, &[0, 3])).unwrap();

        assert_eq!(content(&doc, p1), "foo");
        let p2 = doc.model().child_at(root, 1).unwrap();
        assert_eq!(content(&doc, p2), "bar");
        assert_eq!(doc.model().name(p2), Some("paragraph"));
        assert_eq!(doc.model().attr(p2, "align"), Some("right"));
        assert_eq!(
            patch.changed,
            vec![
                range(&doc, root, &[1], &[2]),
                range(&doc, root, &[1, 0], &[1, 3]),
            ]
        );
    }

    #[test]
    fn merge_joins_a_paragraph_into_its_predecessor() {
        let (mut doc, root, p1) = doc_with_paragraph("foo");
        let p2 = doc.model_mut().create_element("paragraph");
        let t2 = doc.model_mut().create_text("bar");
        doc.model_mut().append(p2, t2);
        doc.model_mut().append(root, p2);

        let patch = doc.merge(pos(&doc, root, &[1])).unwrap();

        assert_eq!(content(&doc, p1), "foobar");
        assert_eq!(doc.model().child_count(root), 1);
        // The emptied element sits in the graveyard.
        assert_eq!(doc.model().parent(p2), Some(doc.model().graveyard()));
        assert_eq!(patch.changed.len(), 2);
        assert_eq!(patch.changed[0], range(&doc, root, &[0, 3], &[0, 6]));
    }

    #[test]
    fn attribute_change_covers_elements_in_range() {
        let (mut doc, root, p1) = doc_with_paragraph("foo");
        let p2 = doc.model_mut().create_element("paragraph");
        doc.model_mut().append(root, p2);

        doc.set_attribute(range(&doc, root, &[0], &[2]), "dir", Some("rtl"))
            .unwrap();
        assert_eq!(doc.model().attr(p1, "dir"), Some("rtl"));
        assert_eq!(doc.model().attr(p2, "dir"), Some("rtl"));

        doc.set_attribute(range(&doc, root, &[0], &[1]), "dir", None)
            .unwrap();
        assert_eq!(doc.model().attr(p1, "dir"), None);
        assert_eq!(doc.model().attr(p2, "dir"), Some("rtl"));
    }

    #[test]
    fn listeners_see_every_decomposed_event_with_the_new_version() {
        let (mut doc, root, _) = doc_with_paragraph("foobar");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        doc.on_change(move |event| {
            sink.borrow_mut().push((event.kind, event.version));
        });

        doc.split(pos(&doc, root, &[0, 3])).unwrap();
        doc.insert(pos(&doc, root, &[0, 0]), vec![NewNode::text("x")])
            .unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (ChangeKind::Insert, 1),
                (ChangeKind::Move, 1),
                (ChangeKind::Insert, 2),
            ]
        );
    }

    #[test]
    fn removed_listener_stops_firing() {
        let (mut doc, root, _) = doc_with_paragraph("foobar");
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        let id = doc.on_change(move |_| *sink.borrow_mut() += 1);

        doc.insert(pos(&doc, root, &[0, 0]), vec![NewNode::text("x")])
            .unwrap();
        assert!(doc.off_change(id));
        doc.insert(pos(&doc, root, &[0, 0]), vec![NewNode::text("y")])
            .unwrap();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn failed_operations_leave_the_version_visible_in_patches_consistent() {
        let (mut doc, root, _) = doc_with_paragraph("foobar");
        assert!(doc
            .insert(pos(&doc, root, &[0, 99]), vec![NewNode::text("x")])
            .is_err());
        let patch = doc
            .insert(pos(&doc, root, &[0, 0]), vec![NewNode::text("x")])
            .unwrap();
        assert_eq!(patch.version, doc.version());
    }
}

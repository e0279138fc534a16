use crate::error::ModelError;
use crate::position::{Position, Stickiness};
use crate::range::Range;

/// Atomic document change. Every structural edit is expressed through these
/// so that positions, ranges and markers can be re-derived with pure path
/// arithmetic after the fact.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert(InsertOperation),
    /// Relocates a span of offsets between two parents.
    Move(MoveOperation),
    /// A move whose target is the graveyard root.
    Remove(MoveOperation),
    /// A move out of the graveyard, back into a document root.
    Reinsert(MoveOperation),
    Split(SplitOperation),
    Merge(MergeOperation),
    Attribute(AttributeOperation),
}

impl Operation {
    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert(_) => "insert",
            Operation::Move(_) => "move",
            Operation::Remove(_) => "remove",
            Operation::Reinsert(_) => "reinsert",
            Operation::Split(_) => "split",
            Operation::Merge(_) => "merge",
            Operation::Attribute(_) => "attribute",
        }
    }
}

/// Blueprint for a node inserted by an [`InsertOperation`]. The operation
/// carries values, not arena handles; nodes are materialized on apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewNode {
    Element { name: String },
    Text { data: String },
}

impl NewNode {
    pub fn element(name: &str) -> Self {
        NewNode::Element {
            name: name.to_string(),
        }
    }

    pub fn text(data: &str) -> Self {
        NewNode::Text {
            data: data.to_string(),
        }
    }

    /// Offset width the node will occupy in its parent.
    pub fn offset_size(&self) -> usize {
        match self {
            NewNode::Element { .. } => 1,
            NewNode::Text { data } => data.chars().count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertOperation {
    pub position: Position,
    pub nodes: Vec<NewNode>,
}

impl InsertOperation {
    /// Total offset width of the inserted content.
    pub fn how_many(&self) -> usize {
        self.nodes.iter().map(NewNode::offset_size).sum()
    }
}

#[derive(Debug, Clone)]
pub struct MoveOperation {
    /// Start of the moved span, in pre-move coordinates.
    pub source_position: Position,
    /// Where the span lands, in pre-move coordinates.
    pub target_position: Position,
    pub how_many: usize,
}

/// Splits an element in two at `split_position`.
///
/// Everything after the split point travels into a fresh sibling inserted
/// right after the split element. When the new element is pulled back out of
/// the graveyard instead of being created (undo of a merge),
/// `graveyard_position` holds where it came from.
#[derive(Debug, Clone)]
pub struct SplitOperation {
    pub split_position: Position,
    /// Offset width of the content moved into the new element.
    pub how_many: usize,
    /// Position of the new element in the split element's parent.
    pub insertion_position: Position,
    /// Start of the new element's content, where moved content lands.
    pub move_target_position: Position,
    /// Everything from the split point to the end of the split element.
    pub moved_range: Range,
    pub graveyard_position: Option<Position>,
}

impl SplitOperation {
    pub fn new(
        split_position: Position,
        how_many: usize,
        graveyard_position: Option<Position>,
    ) -> Result<Self, ModelError> {
        let insertion_position = Self::insertion_position_for(&split_position)?;

        let mut target_path = insertion_position.path().to_vec();
        target_path.push(0);
        let move_target_position =
            Position::from_parts(insertion_position.root(), target_path, Stickiness::ToNone);

        // Open-ended toward the split element's end: offsets never reach this
        // bound, so the comparison arithmetic treats it as "everything after".
        let mut moved_end = split_position.clone();
        moved_end.set_offset(usize::MAX);
        let moved_range = Range::new(split_position.clone(), moved_end);

        Ok(Self {
            split_position,
            how_many,
            insertion_position,
            move_target_position,
            moved_range,
            graveyard_position,
        })
    }

    /// Position right after the element that `split_position` points into.
    fn insertion_position_for(split_position: &Position) -> Result<Position, ModelError> {
        let mut path = split_position.parent_path().to_vec();
        match path.last_mut() {
            Some(last) => *last += 1,
            None => return Err(ModelError::OperationAtRootLevel),
        }
        Ok(Position::from_parts(
            split_position.root(),
            path,
            Stickiness::ToNone,
        ))
    }
}

/// Merges an element into the one before it.
///
/// The element's content moves to `target_position`; the emptied element is
/// relocated to `graveyard_position`.
#[derive(Debug, Clone)]
pub struct MergeOperation {
    /// Start of the merged element's content.
    pub source_position: Position,
    /// Offset width of the merged element's content.
    pub how_many: usize,
    /// Where the content lands inside the surviving element.
    pub target_position: Position,
    /// Where the emptied element goes.
    pub graveyard_position: Position,
}

impl MergeOperation {
    pub fn new(
        source_position: Position,
        how_many: usize,
        target_position: Position,
        graveyard_position: Position,
    ) -> Result<Self, ModelError> {
        if source_position.parent_path().is_empty() {
            return Err(ModelError::OperationAtRootLevel);
        }
        Ok(Self {
            source_position,
            how_many,
            target_position,
            graveyard_position,
        })
    }

    /// Position right before the merged element, where one offset disappears
    /// from its parent.
    pub fn deletion_position(&self) -> Position {
        Position::from_parts(
            self.source_position.root(),
            self.source_position.parent_path().to_vec(),
            Stickiness::ToNone,
        )
    }
}

/// Sets or removes (`value: None`) an attribute on the elements covered by
/// `range`. Relocates nothing, so positions pass through it unchanged.
#[derive(Debug, Clone)]
pub struct AttributeOperation {
    pub range: Range,
    pub key: String,
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Model, NodeId};
    use pretty_assertions::assert_eq;

    fn pos(model: &Model, root: NodeId, path: &[usize]) -> Position {
        Position::new(model, root, path.to_vec(), Stickiness::ToNone).unwrap()
    }

    #[test]
    fn insert_width_sums_elements_and_characters() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let op = InsertOperation {
            position: pos(&model, root, &[0]),
            nodes: vec![
                NewNode::text("ab"),
                NewNode::element("image"),
                NewNode::text("c"),
            ],
        };
        assert_eq!(op.how_many(), 4);
    }

    #[test]
    fn split_derives_its_geometry_from_the_split_position() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let p = model.create_element("paragraph");
        let t = model.create_text("foobar");
        model.append(p, t);
        model.append(root, p);

        let op = SplitOperation::new(pos(&model, root, &[0, 3]), 3, None).unwrap();
        assert_eq!(op.insertion_position.path(), &[1]);
        assert_eq!(op.move_target_position.path(), &[1, 0]);
        assert_eq!(op.moved_range.start.path(), &[0, 3]);
        assert!(op.moved_range.contains_position(&pos(&model, root, &[0, 5])));
        assert!(!op.moved_range.contains_position(&pos(&model, root, &[0, 3])));
        assert!(!op.moved_range.contains_position(&pos(&model, root, &[1, 0])));
    }

    #[test]
    fn split_and_merge_reject_root_level_positions() {
        let mut model = Model::new();
        let root = model.create_root("main");
        assert!(matches!(
            SplitOperation::new(pos(&model, root, &[0]), 0, None),
            Err(ModelError::OperationAtRootLevel)
        ));
        let graveyard = pos(&model, model.graveyard(), &[0]);
        assert!(matches!(
            MergeOperation::new(pos(&model, root, &[0]), 0, pos(&model, root, &[0]), graveyard),
            Err(ModelError::OperationAtRootLevel)
        ));
    }

    #[test]
    fn merge_deletion_position_drops_the_final_path_entry() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let p = model.create_element("paragraph");
        model.append(root, p);
        let graveyard = pos(&model, model.graveyard(), &[0]);

        let op = MergeOperation::new(
            pos(&model, root, &[1, 0]),
            4,
            pos(&model, root, &[0, 6]),
            graveyard,
        )
        .unwrap();
        assert_eq!(op.deletion_position().path(), &[1]);
    }
}

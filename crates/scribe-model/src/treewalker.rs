use std::str::FromStr;

use crate::error::ModelError;
use crate::node::{Model, NodeId};
use crate::position::Position;
use crate::range::Range;

/// Walk direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl FromStr for Direction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            other => Err(ModelError::UnknownDirection {
                direction: other.to_string(),
            }),
        }
    }
}

/// What a walker step crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    ElementStart,
    ElementEnd,
    Text,
}

/// A run of characters inside one text node, without copying the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFragment {
    pub node: NodeId,
    /// Character offset of the fragment inside the text node.
    pub offset_in_text: usize,
    pub length: usize,
}

impl TextFragment {
    /// The fragment's characters, borrowed from the model.
    pub fn data<'a>(&self, model: &'a Model) -> &'a str {
        let data = model.text_data(self.node).unwrap_or("");
        let start = data
            .char_indices()
            .nth(self.offset_in_text)
            .map(|(byte, _)| byte)
            .unwrap_or(data.len());
        let end = data
            .char_indices()
            .nth(self.offset_in_text + self.length)
            .map(|(byte, _)| byte)
            .unwrap_or(data.len());
        &data[start..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerItem {
    Node(NodeId),
    Text(TextFragment),
}

/// One step of a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub item: WalkerItem,
    pub previous_position: Position,
    pub next_position: Position,
    /// Offset width crossed by the step; `None` for element ends, which are
    /// zero-width.
    pub length: Option<usize>,
}

/// Configuration for a [`TreeWalker`]. At least one of `boundaries` and
/// `start_position` must be given.
#[derive(Debug, Clone, Default)]
pub struct TreeWalkerOptions {
    pub direction: Direction,
    /// Range the walk is confined to. Text steps are clipped to it.
    pub boundaries: Option<Range>,
    /// Where to start; defaults to the boundary matching the direction.
    pub start_position: Option<Position>,
    /// Emit text character by character instead of in maximal runs.
    pub single_characters: bool,
    /// Do not descend into elements.
    pub shallow: bool,
    /// Skip the closing side of elements, visiting each node exactly once.
    pub ignore_element_end: bool,
}

/// Depth-first iterator over tree positions.
///
/// The walker is a cursor: a current position plus the element whose contents
/// are being visited. Element starts and ends are separate steps, so a range
/// maps to a flat sequence of steps and back.
#[derive(Debug)]
pub struct TreeWalker<'a> {
    model: &'a Model,
    direction: Direction,
    boundaries: Option<Range>,
    position: Position,
    visited_parent: NodeId,
    boundary_start_parent: Option<NodeId>,
    boundary_end_parent: Option<NodeId>,
    single_characters: bool,
    shallow: bool,
    ignore_element_end: bool,
}

impl<'a> TreeWalker<'a> {
    pub fn new(model: &'a Model, options: TreeWalkerOptions) -> Result<Self, ModelError> {
        let position = match (&options.start_position, &options.boundaries) {
            (Some(position), _) => position.clone(),
            (None, Some(boundaries)) => match options.direction {
                Direction::Forward => boundaries.start.clone(),
                Direction::Backward => boundaries.end.clone(),
            },
            (None, None) => return Err(ModelError::NoStartPosition),
        };

        let (boundary_start_parent, boundary_end_parent) = match &options.boundaries {
            Some(boundaries) => (
                Some(boundaries.start.parent(model)?),
                Some(boundaries.end.parent(model)?),
            ),
            None => (None, None),
        };
        let visited_parent = position.parent(model)?;

        Ok(Self {
            model,
            direction: options.direction,
            boundaries: options.boundaries,
            position,
            visited_parent,
            boundary_start_parent,
            boundary_end_parent,
            single_characters: options.single_characters,
            shallow: options.shallow,
            ignore_element_end: options.ignore_element_end,
        })
    }

    /// Current cursor position. Between steps it equals the last step's
    /// `next_position`.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Advances while `keep_skipping` accepts the step, then rolls back to
    /// just before the first rejected step.
    pub fn skip(&mut self, mut keep_skipping: impl FnMut(&Step) -> bool) {
        loop {
            let saved_position = self.position.clone();
            let saved_parent = self.visited_parent;
            match self.next() {
                Some(step) if keep_skipping(&step) => continue,
                Some(_) => {
                    self.position = saved_position;
                    self.visited_parent = saved_parent;
                    return;
                }
                None => return,
            }
        }
    }

    /// Moves the cursor to `position`, clamped into the boundaries. The walk
    /// continues from there as if it had just arrived.
    pub fn jump_to(&mut self, position: &Position) -> Result<(), ModelError> {
        let mut position = position.clone();
        if let Some(boundaries) = &self.boundaries {
            if position.is_before(&boundaries.start) {
                position = boundaries.start.clone();
            } else if position.is_after(&boundaries.end) {
                position = boundaries.end.clone();
            }
        }
        self.visited_parent = position.parent(self.model)?;
        self.position = position;
        Ok(())
    }

    fn step_forward(&mut self) -> Option<Step> {
        let previous_position = self.position.clone();
        let mut position = self.position.clone();
        let parent = self.visited_parent;

        // End of the root.
        if self.model.parent(parent).is_none()
            && position.offset() == self.model.max_offset(parent)
        {
            return None;
        }
        // End of the boundary range.
        if let (Some(boundaries), Some(end_parent)) = (&self.boundaries, self.boundary_end_parent) {
            if parent == end_parent && position.offset() == boundaries.end.offset() {
                return None;
            }
        }

        let text_at_position = self.model.text_containing(parent, position.offset());
        let node = text_at_position.or_else(|| self.model.node_starting_at(parent, position.offset()));

        match node {
            Some(node) if self.model.is_element(node) => {
                if self.shallow {
                    if let Some(boundaries) = &self.boundaries {
                        if boundaries.end.is_before(&position) {
                            return None;
                        }
                    }
                    position.set_offset(position.offset() + 1);
                } else {
                    position.push_level(0);
                    self.visited_parent = node;
                }
                self.position = position.clone();
                Some(Step {
                    kind: StepKind::ElementStart,
                    item: WalkerItem::Node(node),
                    previous_position,
                    next_position: position,
                    length: Some(1),
                })
            }
            Some(node) => {
                let count = if self.single_characters {
                    1
                } else {
                    let mut end = self.model.end_offset(node).unwrap_or(0);
                    if let (Some(boundaries), Some(end_parent)) =
                        (&self.boundaries, self.boundary_end_parent)
                    {
                        if end_parent == parent && boundaries.end.offset() < end {
                            end = boundaries.end.offset();
                        }
                    }
                    end - position.offset()
                };
                let offset_in_text =
                    position.offset() - self.model.start_offset(node).unwrap_or(0);
                position.set_offset(position.offset() + count);
                self.position = position.clone();
                Some(Step {
                    kind: StepKind::Text,
                    item: WalkerItem::Text(TextFragment {
                        node,
                        offset_in_text,
                        length: count,
                    }),
                    previous_position,
                    next_position: position,
                    length: Some(count),
                })
            }
            // Nothing after the position: step out of the visited parent.
            None => {
                position.pop_level();
                position.set_offset(position.offset() + 1);
                self.position = position.clone();
                self.visited_parent = self.model.parent(parent)?;
                if self.ignore_element_end {
                    return self.step_forward();
                }
                Some(Step {
                    kind: StepKind::ElementEnd,
                    item: WalkerItem::Node(parent),
                    previous_position,
                    next_position: position,
                    length: None,
                })
            }
        }
    }

    fn step_backward(&mut self) -> Option<Step> {
        let previous_position = self.position.clone();
        let mut position = self.position.clone();
        let parent = self.visited_parent;

        // Start of the root.
        if self.model.parent(parent).is_none() && position.offset() == 0 {
            return None;
        }
        // Start of the boundary range.
        if let (Some(boundaries), Some(start_parent)) =
            (&self.boundaries, self.boundary_start_parent)
        {
            if parent == start_parent && position.offset() == boundaries.start.offset() {
                return None;
            }
        }

        let text_at_position = self.model.text_containing(parent, position.offset());
        let node =
            text_at_position.or_else(|| self.node_ending_at(parent, position.offset()));

        match node {
            Some(node) if self.model.is_element(node) => {
                position.set_offset(position.offset() - 1);
                if self.shallow {
                    self.position = position.clone();
                    return Some(Step {
                        kind: StepKind::ElementStart,
                        item: WalkerItem::Node(node),
                        previous_position,
                        next_position: position,
                        length: Some(1),
                    });
                }
                position.push_level(self.model.max_offset(node));
                self.position = position.clone();
                self.visited_parent = node;
                if self.ignore_element_end {
                    return self.step_backward();
                }
                Some(Step {
                    kind: StepKind::ElementEnd,
                    item: WalkerItem::Node(node),
                    previous_position,
                    next_position: position,
                    length: None,
                })
            }
            Some(node) => {
                let count = if self.single_characters {
                    1
                } else {
                    let mut start = self.model.start_offset(node).unwrap_or(0);
                    if let (Some(boundaries), Some(start_parent)) =
                        (&self.boundaries, self.boundary_start_parent)
                    {
                        if start_parent == parent && boundaries.start.offset() > start {
                            start = boundaries.start.offset();
                        }
                    }
                    position.offset() - start
                };
                let offset_in_text =
                    position.offset() - self.model.start_offset(node).unwrap_or(0) - count;
                position.set_offset(position.offset() - count);
                self.position = position.clone();
                Some(Step {
                    kind: StepKind::Text,
                    item: WalkerItem::Text(TextFragment {
                        node,
                        offset_in_text,
                        length: count,
                    }),
                    previous_position,
                    next_position: position,
                    length: Some(count),
                })
            }
            // Nothing before the position: step out to before the visited
            // parent.
            None => {
                position.pop_level();
                self.position = position.clone();
                self.visited_parent = self.model.parent(parent)?;
                Some(Step {
                    kind: StepKind::ElementStart,
                    item: WalkerItem::Node(parent),
                    previous_position,
                    next_position: position,
                    length: Some(1),
                })
            }
        }
    }

    /// Child of `parent` whose span ends exactly at `offset`, excluding text
    /// runs the offset falls inside of.
    fn node_ending_at(&self, parent: NodeId, offset: usize) -> Option<NodeId> {
        let mut current = 0;
        for child in self.model.children(parent) {
            current += self.model.offset_size(*child);
            if current == offset {
                return Some(*child);
            }
            if current > offset {
                return None;
            }
        }
        None
    }
}

impl Iterator for TreeWalker<'_> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        match self.direction {
            Direction::Forward => self.step_forward(),
            Direction::Backward => self.step_backward(),
        }
    }
}

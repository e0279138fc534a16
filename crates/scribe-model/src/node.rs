use std::collections::BTreeMap;

use crate::error::ModelError;

/// Name of the detached root that removed content is relocated to.
pub const GRAVEYARD_ROOT_NAME: &str = "$graveyard";

/// Handle into the model's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attrs: BTreeMap<String, String>,
        children: Vec<NodeId>,
    },
    Text {
        data: String,
    },
}

/// Arena-backed node tree addressed by offsets.
///
/// An element child occupies exactly one offset in its parent; a text child
/// occupies one offset per character. The model keeps named roots (parentless
/// elements) plus the graveyard root that removed content moves through.
///
/// Node handles are plain ids, so detached subtrees and the graveyard stay
/// addressable without reference cycles.
#[derive(Debug, Clone)]
pub struct Model {
    nodes: Vec<NodeData>,
    roots: BTreeMap<String, NodeId>,
    graveyard: NodeId,
}

impl Model {
    pub fn new() -> Self {
        let mut model = Self {
            nodes: Vec::new(),
            roots: BTreeMap::new(),
            graveyard: NodeId(0),
        };
        let graveyard = model.create_element(GRAVEYARD_ROOT_NAME);
        model.graveyard = graveyard;
        model.roots.insert(GRAVEYARD_ROOT_NAME.to_string(), graveyard);
        model
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    // ---------------------------------------------------------------- roots

    /// Creates and registers a named root element.
    pub fn create_root(&mut self, name: &str) -> NodeId {
        let id = self.create_element(name);
        self.roots.insert(name.to_string(), id);
        id
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).copied()
    }

    pub fn graveyard(&self) -> NodeId {
        self.graveyard
    }

    /// Name under which `id` is registered as a root, if it is one.
    pub fn root_name(&self, id: NodeId) -> Option<&str> {
        self.roots
            .iter()
            .find(|(_, root)| **root == id)
            .map(|(name, _)| name.as_str())
    }

    /// Topmost ancestor of `id` (itself when parentless).
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current
    }

    // ----------------------------------------------------------- structure

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData {
            parent: None,
            kind: NodeKind::Element {
                name: name.to_string(),
                attrs: BTreeMap::new(),
                children: Vec::new(),
            },
        })
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.push(NodeData {
            parent: None,
            kind: NodeKind::Text {
                data: data.to_string(),
            },
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text { .. })
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn text_data(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { data } => Some(data),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { attrs, .. } => attrs.get(key).map(String::as_str),
            NodeKind::Text { .. } => None,
        }
    }

    /// Sets (`Some`) or removes (`None`) an attribute on an element. No-op on
    /// text nodes.
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: Option<&str>) {
        if let NodeKind::Element { attrs, .. } = &mut self.node_mut(id).kind {
            match value {
                Some(value) => {
                    attrs.insert(key.to_string(), value.to_string());
                }
                None => {
                    attrs.remove(key);
                }
            }
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element { children, .. } => children,
            NodeKind::Text { .. } => &[],
        }
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    /// Fresh detached element with the same name and attributes as `id`, no
    /// children. Text nodes are copied whole.
    pub fn clone_element_shell(&mut self, id: NodeId) -> NodeId {
        match self.node(id).kind.clone() {
            NodeKind::Element { name, attrs, .. } => self.push(NodeData {
                parent: None,
                kind: NodeKind::Element {
                    name,
                    attrs,
                    children: Vec::new(),
                },
            }),
            NodeKind::Text { data } => self.create_text(&data),
        }
    }

    /// Appends a detached node to an element's children.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none());
        if let NodeKind::Element { children, .. } = &mut self.node_mut(parent).kind {
            children.push(child);
        }
        self.node_mut(child).parent = Some(parent);
    }

    /// Ancestors from the root down to `id`'s parent, or down to `id` itself
    /// when `include_self` is set.
    pub fn ancestors(&self, id: NodeId, include_self: bool) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = if include_self {
            Some(id)
        } else {
            self.node(id).parent
        };
        while let Some(node) = current {
            chain.push(node);
            current = self.node(node).parent;
        }
        chain.reverse();
        chain
    }

    // ------------------------------------------------------------- offsets

    /// Width of `id` inside its parent: 1 for elements, character count for
    /// text nodes.
    pub fn offset_size(&self, id: NodeId) -> usize {
        match &self.node(id).kind {
            NodeKind::Element { .. } => 1,
            NodeKind::Text { data } => data.chars().count(),
        }
    }

    /// Total offset width of an element's content.
    pub fn max_offset(&self, id: NodeId) -> usize {
        self.children(id)
            .iter()
            .map(|child| self.offset_size(*child))
            .sum()
    }

    /// Offset at which `id` starts inside its parent. `None` for detached
    /// nodes.
    pub fn start_offset(&self, id: NodeId) -> Option<usize> {
        let parent = self.node(id).parent?;
        let mut offset = 0;
        for child in self.children(parent) {
            if *child == id {
                return Some(offset);
            }
            offset += self.offset_size(*child);
        }
        None
    }

    pub fn end_offset(&self, id: NodeId) -> Option<usize> {
        Some(self.start_offset(id)? + self.offset_size(id))
    }

    /// Child index of `id` inside its parent.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.node(id).parent?;
        self.children(parent).iter().position(|child| *child == id)
    }

    /// Index of the child containing `offset`. An offset on a child boundary
    /// maps to the child starting there; `max_offset` maps to the index past
    /// the last child; an offset strictly inside a text run maps to that text
    /// node's index.
    pub fn offset_to_index(&self, parent: NodeId, offset: usize) -> Result<usize, ModelError> {
        let mut current = 0;
        for (index, child) in self.children(parent).iter().enumerate() {
            let size = self.offset_size(*child);
            if offset < current + size {
                return Ok(index);
            }
            current += size;
        }
        if offset == current {
            Ok(self.child_count(parent))
        } else {
            Err(ModelError::OffsetOutOfBounds {
                offset,
                max: current,
            })
        }
    }

    pub fn index_to_offset(&self, parent: NodeId, index: usize) -> Result<usize, ModelError> {
        let children = self.children(parent);
        if index > children.len() {
            return Err(ModelError::OffsetOutOfBounds {
                offset: index,
                max: children.len(),
            });
        }
        Ok(children[..index]
            .iter()
            .map(|child| self.offset_size(*child))
            .sum())
    }

    /// Text child that `offset` falls strictly inside of (not at its start or
    /// end boundary).
    pub fn text_containing(&self, parent: NodeId, offset: usize) -> Option<NodeId> {
        let mut current = 0;
        for child in self.children(parent) {
            let size = self.offset_size(*child);
            if offset > current && offset < current + size {
                return self.is_text(*child).then_some(*child);
            }
            current += size;
        }
        None
    }

    /// Child starting exactly at `offset`, if any.
    pub fn node_starting_at(&self, parent: NodeId, offset: usize) -> Option<NodeId> {
        let mut current = 0;
        for child in self.children(parent) {
            if current == offset {
                return Some(*child);
            }
            if current > offset {
                return None;
            }
            current += self.offset_size(*child);
        }
        None
    }

    /// Offsets from the root down to `id`'s own start offset.
    pub fn path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            if let Some(offset) = self.start_offset(current) {
                path.push(offset);
            }
            current = parent;
        }
        path.reverse();
        path
    }

    // ------------------------------------------------------------ mutation

    /// Splits a text node at `at_char` (counted from the node's start) and
    /// returns the trailing half. `at_char` must be strictly inside the run.
    pub fn split_text(&mut self, text: NodeId, at_char: usize) -> NodeId {
        let (head, tail) = {
            let data = match &self.node(text).kind {
                NodeKind::Text { data } => data,
                NodeKind::Element { .. } => return text,
            };
            let byte = data
                .char_indices()
                .nth(at_char)
                .map(|(byte, _)| byte)
                .unwrap_or(data.len());
            (data[..byte].to_string(), data[byte..].to_string())
        };

        let tail_id = self.create_text(&tail);
        if let NodeKind::Text { data } = &mut self.node_mut(text).kind {
            *data = head;
        }
        if let Some(parent) = self.node(text).parent {
            let index = self.index_of(text).map(|i| i + 1).unwrap_or(0);
            if let NodeKind::Element { children, .. } = &mut self.node_mut(parent).kind {
                children.insert(index, tail_id);
            }
            self.node_mut(tail_id).parent = Some(parent);
        }
        tail_id
    }

    /// Makes `offset` a node boundary inside `parent`, splitting a text child
    /// when needed, and returns the child index at that boundary.
    pub fn ensure_boundary(&mut self, parent: NodeId, offset: usize) -> Result<usize, ModelError> {
        if let Some(text) = self.text_containing(parent, offset) {
            let start = self.start_offset(text).unwrap_or(0);
            self.split_text(text, offset - start);
        }
        self.offset_to_index(parent, offset)
    }

    /// Detaches the children of `parent` covering `[offset, offset + how_many)`.
    /// Text runs straddling either edge are split first.
    pub fn extract_span(
        &mut self,
        parent: NodeId,
        offset: usize,
        how_many: usize,
    ) -> Result<Vec<NodeId>, ModelError> {
        let max = self.max_offset(parent);
        if offset + how_many > max {
            return Err(ModelError::OffsetOutOfBounds {
                offset: offset + how_many,
                max,
            });
        }
        self.ensure_boundary(parent, offset + how_many)?;
        let start_index = self.ensure_boundary(parent, offset)?;
        let end_index = self.offset_to_index(parent, offset + how_many)?;

        let extracted: Vec<NodeId> =
            if let NodeKind::Element { children, .. } = &mut self.node_mut(parent).kind {
                children.drain(start_index..end_index).collect()
            } else {
                Vec::new()
            };
        for id in &extracted {
            self.node_mut(*id).parent = None;
        }
        Ok(extracted)
    }

    /// Inserts detached nodes into `parent` at `offset`, splitting a text run
    /// at the insertion point when needed.
    pub fn splice_in(
        &mut self,
        parent: NodeId,
        offset: usize,
        nodes: &[NodeId],
    ) -> Result<(), ModelError> {
        let index = self.ensure_boundary(parent, offset)?;
        if let NodeKind::Element { children, .. } = &mut self.node_mut(parent).kind {
            children.splice(index..index, nodes.iter().copied());
        }
        for id in nodes {
            self.node_mut(*id).parent = Some(parent);
        }
        Ok(())
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paragraph_with_text(model: &mut Model, root: NodeId, text: &str) -> (NodeId, NodeId) {
        let p = model.create_element("paragraph");
        let t = model.create_text(text);
        model.append(p, t);
        model.append(root, p);
        (p, t)
    }

    #[test]
    fn offsets_count_characters_not_children() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let (p, t) = paragraph_with_text(&mut model, root, "foobar");

        assert_eq!(model.offset_size(p), 1);
        assert_eq!(model.offset_size(t), 6);
        assert_eq!(model.max_offset(p), 6);
        assert_eq!(model.max_offset(root), 1);
    }

    #[test]
    fn offset_to_index_maps_boundaries_and_text_interior() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let p = model.create_element("paragraph");
        let a = model.create_text("ab");
        let img = model.create_element("image");
        let b = model.create_text("cd");
        model.append(p, a);
        model.append(p, img);
        model.append(p, b);
        model.append(root, p);

        assert_eq!(model.offset_to_index(p, 0).unwrap(), 0);
        assert_eq!(model.offset_to_index(p, 1).unwrap(), 0); // inside "ab"
        assert_eq!(model.offset_to_index(p, 2).unwrap(), 1); // the image
        assert_eq!(model.offset_to_index(p, 3).unwrap(), 2);
        assert_eq!(model.offset_to_index(p, 5).unwrap(), 3); // max offset
        assert!(matches!(
            model.offset_to_index(p, 6),
            Err(ModelError::OffsetOutOfBounds { offset: 6, max: 5 })
        ));

        assert_eq!(model.text_containing(p, 1), Some(a));
        assert_eq!(model.text_containing(p, 2), None);
        assert_eq!(model.node_starting_at(p, 2), Some(img));
        assert_eq!(model.node_starting_at(p, 4), None);
    }

    #[test]
    fn path_walks_offsets_from_root() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let (_p1, _) = paragraph_with_text(&mut model, root, "a");
        let (p2, t2) = paragraph_with_text(&mut model, root, "b");

        assert_eq!(model.path(root), Vec::<usize>::new());
        assert_eq!(model.path(p2), vec![1]);
        assert_eq!(model.path(t2), vec![1, 0]);
        assert_eq!(model.root_of(t2), root);
    }

    #[test]
    fn split_text_divides_a_run_in_place() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let (p, t) = paragraph_with_text(&mut model, root, "foobar");

        let tail = model.split_text(t, 3);
        assert_eq!(model.text_data(t), Some("foo"));
        assert_eq!(model.text_data(tail), Some("bar"));
        assert_eq!(model.children(p), &[t, tail]);
        assert_eq!(model.max_offset(p), 6);
    }

    #[test]
    fn extract_and_splice_preserve_offset_arithmetic() {
        let mut model = Model::new();
        let root = model.create_root("main");
        let (p1, _) = paragraph_with_text(&mut model, root, "foobar");
        let (p2, _) = paragraph_with_text(&mut model, root, "x");

        let extracted = model.extract_span(p1, 2, 3).unwrap();
        assert_eq!(model.max_offset(p1), 3);
        model.splice_in(p2, 1, &extracted).unwrap();
        assert_eq!(model.max_offset(p2), 4);
        assert_eq!(model.parent(extracted[0]), Some(p2));
    }

    #[test]
    fn graveyard_exists_from_the_start() {
        let model = Model::new();
        let graveyard = model.graveyard();
        assert_eq!(model.root(GRAVEYARD_ROOT_NAME), Some(graveyard));
        assert_eq!(model.root_name(graveyard), Some(GRAVEYARD_ROOT_NAME));
        assert_eq!(model.max_offset(graveyard), 0);
    }
}

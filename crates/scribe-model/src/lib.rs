//! Document model core: an offset-addressed node tree with an operation
//! pipeline around it.
//!
//! Locations in the tree are [`Position`]s, lists of offsets from a root down
//! to a parent. Offsets count element children as one and text children per
//! character, so a position can sit between any two characters without
//! referencing a node. Positions and [`Range`]s are plain values; after the
//! tree changes they can be re-derived with the `transformed_by_*` family,
//! which is pure path arithmetic and never fails on stale input.
//!
//! A [`Document`] owns the tree and applies [`Operation`]s, broadcasting each
//! change. [`LiveRange`]s and [`Marker`]s subscribe to that stream and
//! re-anchor themselves before ordinary listeners run. [`TreeWalker`]
//! iterates the tree position by position, in either direction.

pub mod document;
pub mod emitter;
pub mod error;
pub mod liverange;
pub mod marker;
pub mod node;
pub mod operation;
pub mod position;
pub mod range;
pub mod treewalker;

pub use document::{ChangeEvent, ChangeKind, Document, Patch};
pub use emitter::{Emitter, ListenerId};
pub use error::ModelError;
pub use liverange::{LiveRange, LiveRangeEvent};
pub use marker::{Marker, MarkerCollection, MarkerUpdate};
pub use node::{Model, NodeId, GRAVEYARD_ROOT_NAME};
pub use operation::{
    AttributeOperation, InsertOperation, MergeOperation, MoveOperation, NewNode, Operation,
    SplitOperation,
};
pub use position::{CompareResult, Place, Position, PositionJson, Stickiness};
pub use range::{Range, RangeJson};
pub use treewalker::{
    Direction, Step, StepKind, TextFragment, TreeWalker, TreeWalkerOptions, WalkerItem,
};

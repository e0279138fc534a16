use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::document::{ChangeEvent, ChangeKind};
use crate::emitter::{Emitter, ListenerId};
use crate::position::Position;
use crate::range::Range;

/// Notification from a live range.
#[derive(Debug, Clone)]
pub enum LiveRangeEvent {
    /// The boundaries moved.
    Boundary { old_range: Range, new_range: Range },
    /// Content inside the range changed; the boundaries held still.
    Content { range: Range },
}

pub(crate) struct LiveRangeState {
    pub(crate) range: Range,
    pub(crate) detached: bool,
    pub(crate) emitter: Emitter<LiveRangeEvent>,
}

/// A range that follows the document.
///
/// Created through [`crate::document::Document::track`]. After every applied
/// change the boundaries are re-derived with the transform algebra, before
/// any document change listener runs. Handles are cheap clones of one shared
/// state; tracking stops when the last handle is dropped or [`LiveRange::detach`]
/// is called.
#[derive(Clone)]
pub struct LiveRange {
    state: Rc<RefCell<LiveRangeState>>,
}

impl LiveRange {
    pub(crate) fn create(range: Range) -> (Self, Weak<RefCell<LiveRangeState>>) {
        let state = Rc::new(RefCell::new(LiveRangeState {
            range,
            detached: false,
            emitter: Emitter::new(),
        }));
        let weak = Rc::downgrade(&state);
        (Self { state }, weak)
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<LiveRangeState>> {
        &self.state
    }

    /// Snapshot of the current boundaries as a plain range.
    pub fn range(&self) -> Range {
        self.state.borrow().range.clone()
    }

    /// Stops following the document. The last known boundaries remain
    /// readable.
    pub fn detach(&self) {
        let mut state = self.state.borrow_mut();
        state.detached = true;
        state.emitter.clear();
    }

    pub fn is_detached(&self) -> bool {
        self.state.borrow().detached
    }

    pub fn on(&self, callback: impl FnMut(&LiveRangeEvent) + 'static) -> ListenerId {
        self.state.borrow_mut().emitter.on(callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.state.borrow_mut().emitter.off(id)
    }
}

impl std::fmt::Debug for LiveRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LiveRange")
            .field("range", &state.range)
            .field("detached", &state.detached)
            .finish()
    }
}

/// Re-anchors one live range against an applied change and fires its events.
/// Listener callbacks run without any borrow of the state held, so they may
/// read the range or manage listeners freely.
pub(crate) fn apply_change(state: &Rc<RefCell<LiveRangeState>>, event: &ChangeEvent) {
    let outcome = {
        let state = state.borrow();
        if state.detached {
            return;
        }
        transform(&state.range, event)
    };

    match outcome {
        Outcome::Boundary(new_range) => {
            let (old_range, mut emitter) = {
                let mut state = state.borrow_mut();
                let old = std::mem::replace(&mut state.range, new_range.clone());
                (old, state.emitter.take())
            };
            trace!(?old_range, ?new_range, "live range re-anchored");
            emitter.fire(&LiveRangeEvent::Boundary {
                old_range,
                new_range,
            });
            state.borrow_mut().emitter.restore(emitter);
        }
        Outcome::Content => {
            let (range, mut emitter) = {
                let mut state = state.borrow_mut();
                (state.range.clone(), state.emitter.take())
            };
            emitter.fire(&LiveRangeEvent::Content { range });
            state.borrow_mut().emitter.restore(emitter);
        }
        Outcome::Unaffected => {}
    }
}

enum Outcome {
    Boundary(Range),
    Content,
    Unaffected,
}

fn transform(range: &Range, event: &ChangeEvent) -> Outcome {
    let target_range = &event.range;
    let how_many = target_range
        .end
        .offset()
        .saturating_sub(target_range.start.offset());
    let move_like = matches!(
        event.kind,
        ChangeKind::Move | ChangeKind::Remove | ChangeKind::Reinsert
    );

    // The event's target range is in post-change coordinates; the transform
    // wants the move target before the source content disappeared.
    let target_position = match (&event.source_position, move_like) {
        (Some(source), true) => target_range.start.transformed_by_insertion(source, how_many),
        _ => target_range.start.clone(),
    };

    let mut result = range.transformed_by_document_change(
        event.kind,
        &target_position,
        how_many,
        event.source_position.as_ref(),
    );
    // Three pieces mean the middle one is exactly the moved content; its
    // final address is the event's target range.
    if move_like && result.len() == 3 {
        result[1] = target_range.clone();
    }

    let updated = match Range::from_ranges(&result) {
        Some(updated) => updated,
        None => return Outcome::Unaffected,
    };
    if !updated.is_equal(range) {
        return Outcome::Boundary(updated);
    }
    if changes_content(range, event, &target_position) {
        return Outcome::Content;
    }
    Outcome::Unaffected
}

/// Whether a change that left the boundaries alone still touched nodes
/// inside the range.
fn changes_content(range: &Range, event: &ChangeEvent, target_position: &Position) -> bool {
    match (event.kind, &event.source_position) {
        (ChangeKind::Insert, _) => range.contains_position(&event.range.start),
        (ChangeKind::Move | ChangeKind::Remove | ChangeKind::Reinsert, Some(source)) => {
            range.contains_position(source)
                || range.start.is_equal(source)
                || range.contains_position(target_position)
        }
        _ => false,
    }
}

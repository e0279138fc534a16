use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::document::Document;
use crate::emitter::{Emitter, ListenerId};
use crate::error::ModelError;
use crate::liverange::{LiveRange, LiveRangeEvent};
use crate::position::Position;
use crate::range::Range;

/// Fired whenever a marker appears, moves or disappears. `old_range` is
/// `None` for a freshly added marker, `new_range` is `None` for a removed
/// one; a refresh repeats the current range on both sides.
#[derive(Debug, Clone)]
pub struct MarkerUpdate {
    pub name: String,
    pub old_range: Option<Range>,
    pub new_range: Option<Range>,
}

struct MarkerState {
    name: String,
    /// `None` once the marker is destroyed.
    live: Option<LiveRange>,
    managed_using_operations: bool,
    affects_data: bool,
}

/// A named, tracked range over the document.
///
/// Handles are cheap clones of one shared state. A handle kept across
/// [`Document::remove_marker`] still answers [`Marker::name`] but every other
/// accessor reports [`ModelError::MarkerDestroyed`].
#[derive(Clone)]
pub struct Marker {
    state: Rc<RefCell<MarkerState>>,
}

impl Marker {
    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    /// Current boundaries.
    pub fn range(&self) -> Result<Range, ModelError> {
        self.with_live(|live| live.range())
    }

    /// Current start boundary.
    pub fn start(&self) -> Result<Position, ModelError> {
        self.with_live(|live| live.range().start)
    }

    /// Current end boundary.
    pub fn end(&self) -> Result<Position, ModelError> {
        self.with_live(|live| live.range().end)
    }

    /// Whether changes to this marker go through operations, so that undo and
    /// collaboration see them.
    pub fn is_managed_using_operations(&self) -> Result<bool, ModelError> {
        let state = self.state.borrow();
        if state.live.is_none() {
            return Err(ModelError::MarkerDestroyed {
                name: state.name.clone(),
            });
        }
        Ok(state.managed_using_operations)
    }

    /// Whether the marker is part of the document data, as opposed to a
    /// purely visual decoration.
    pub fn affects_data(&self) -> Result<bool, ModelError> {
        let state = self.state.borrow();
        if state.live.is_none() {
            return Err(ModelError::MarkerDestroyed {
                name: state.name.clone(),
            });
        }
        Ok(state.affects_data)
    }

    /// Subscribes to the marker's boundary and content events.
    pub fn on(
        &self,
        callback: impl FnMut(&LiveRangeEvent) + 'static,
    ) -> Result<ListenerId, ModelError> {
        self.with_live(|live| live.on(callback))
    }

    pub fn off(&self, id: ListenerId) -> Result<bool, ModelError> {
        self.with_live(|live| live.off(id))
    }

    fn with_live<T>(&self, f: impl FnOnce(&LiveRange) -> T) -> Result<T, ModelError> {
        let state = self.state.borrow();
        match &state.live {
            Some(live) => Ok(f(live)),
            None => Err(ModelError::MarkerDestroyed {
                name: state.name.clone(),
            }),
        }
    }

    /// Detaches the live range and leaves the handle destroyed.
    fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(live) = state.live.take() {
            live.detach();
        }
    }
}

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Marker")
            .field("name", &state.name)
            .field("destroyed", &state.live.is_none())
            .finish()
    }
}

/// All markers of one document, addressable by name.
pub struct MarkerCollection {
    markers: HashMap<String, Marker>,
    emitter: Rc<RefCell<Emitter<MarkerUpdate>>>,
}

impl MarkerCollection {
    pub(crate) fn new() -> Self {
        Self {
            markers: HashMap::new(),
            emitter: Rc::new(RefCell::new(Emitter::new())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Marker> {
        self.markers.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Markers named `group:*`.
    pub fn markers_group(&self, group: &str) -> Vec<Marker> {
        let prefix = format!("{group}:");
        self.markers
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, marker)| marker.clone())
            .collect()
    }

    /// Markers whose range contains `position` strictly.
    pub fn markers_at_position(&self, position: &Position) -> Vec<Marker> {
        self.markers
            .values()
            .filter(|marker| {
                marker
                    .range()
                    .map(|range| range.contains_position(position))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Markers whose range shares at least one offset with `range`.
    pub fn markers_intersecting_range(&self, range: &Range) -> Vec<Marker> {
        self.markers
            .values()
            .filter(|marker| {
                marker
                    .range()
                    .map(|own| own.is_intersecting(range))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Subscribes to add, move, refresh and remove updates for all markers.
    pub fn on_update(&self, callback: impl FnMut(&MarkerUpdate) + 'static) -> ListenerId {
        self.emitter.borrow_mut().on(callback)
    }

    pub fn off_update(&self, id: ListenerId) -> bool {
        self.emitter.borrow_mut().off(id)
    }

    fn fire(&self, update: &MarkerUpdate) {
        fire_update(&self.emitter, update);
    }
}

fn fire_update(emitter: &Rc<RefCell<Emitter<MarkerUpdate>>>, update: &MarkerUpdate) {
    let mut taken = emitter.borrow_mut().take();
    taken.fire(update);
    emitter.borrow_mut().restore(taken);
}

fn check_name(name: &str) -> Result<(), ModelError> {
    if name.contains(',') {
        return Err(ModelError::IncorrectMarkerName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl Document {
    pub fn markers(&self) -> &MarkerCollection {
        &self.markers
    }

    /// Adds a marker, or moves an existing one to `range`.
    ///
    /// Re-setting a marker to its current range and flags is a no-op and
    /// returns the existing handle without firing an update.
    pub fn set_marker(
        &mut self,
        name: &str,
        range: Range,
        managed_using_operations: bool,
        affects_data: bool,
    ) -> Result<Marker, ModelError> {
        check_name(name)?;

        if let Some(existing) = self.markers.get(name) {
            let unchanged = existing.range()? == range
                && existing.is_managed_using_operations()? == managed_using_operations
                && existing.affects_data()? == affects_data;
            if unchanged {
                return Ok(existing.clone());
            }

            let old_range = existing.range()?;
            let marker = existing.clone();
            marker.destroy();
            let live = self.track(range.clone());
            self.attach_forwarder(&live, name);
            {
                let mut state = marker.state.borrow_mut();
                state.live = Some(live);
                state.managed_using_operations = managed_using_operations;
                state.affects_data = affects_data;
            }
            debug!(name, "marker moved");
            self.markers.fire(&MarkerUpdate {
                name: name.to_string(),
                old_range: Some(old_range),
                new_range: Some(range),
            });
            return Ok(marker);
        }

        let live = self.track(range.clone());
        self.attach_forwarder(&live, name);
        let marker = Marker {
            state: Rc::new(RefCell::new(MarkerState {
                name: name.to_string(),
                live: Some(live),
                managed_using_operations,
                affects_data,
            })),
        };
        self.markers.markers.insert(name.to_string(), marker.clone());
        debug!(name, "marker added");
        self.markers.fire(&MarkerUpdate {
            name: name.to_string(),
            old_range: None,
            new_range: Some(range),
        });
        Ok(marker)
    }

    pub fn get_marker(&self, name: &str) -> Option<Marker> {
        self.markers.get(name)
    }

    /// Removes a marker. Returns `false` if it did not exist. Retained
    /// handles are left destroyed.
    pub fn remove_marker(&mut self, name: &str) -> bool {
        let Some(marker) = self.markers.markers.remove(name) else {
            return false;
        };
        let old_range = marker.range().ok();
        marker.destroy();
        debug!(name, "marker removed");
        self.markers.fire(&MarkerUpdate {
            name: name.to_string(),
            old_range,
            new_range: None,
        });
        true
    }

    /// Re-announces a marker without changing it, forcing downstream
    /// consumers to re-render it.
    pub fn refresh_marker(&mut self, name: &str) -> Result<(), ModelError> {
        let marker = self
            .markers
            .get(name)
            .ok_or_else(|| ModelError::RefreshMarkerNotExists {
                name: name.to_string(),
            })?;
        let range = marker.range()?;
        self.markers.fire(&MarkerUpdate {
            name: name.to_string(),
            old_range: Some(range.clone()),
            new_range: Some(range),
        });
        Ok(())
    }

    /// Drops every marker at once, without firing updates. For document
    /// teardown.
    pub fn destroy_markers(&mut self) {
        for marker in self.markers.markers.values() {
            marker.destroy();
        }
        self.markers.markers.clear();
        self.markers.emitter.borrow_mut().clear();
    }

    /// Forwards the live range's boundary events as marker updates on the
    /// collection.
    fn attach_forwarder(&self, live: &LiveRange, name: &str) {
        let emitter = Rc::clone(&self.markers.emitter);
        let name = name.to_string();
        live.on(move |event| {
            if let LiveRangeEvent::Boundary {
                old_range,
                new_range,
            } = event
            {
                fire_update(
                    &emitter,
                    &MarkerUpdate {
                        name: name.clone(),
                        old_range: Some(old_range.clone()),
                        new_range: Some(new_range.clone()),
                    },
                );
            }
        });
    }
}

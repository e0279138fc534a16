/// Identifies a registered listener so it can later be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<E> {
    id: ListenerId,
    callback: Box<dyn FnMut(&E)>,
}

/// Minimal observer-pattern component.
///
/// Types that need to broadcast events hold an `Emitter` by value instead of
/// inheriting event behavior. Delegation is explicit: a forwarding listener
/// registered on the source emitter pushes events into the destination.
pub struct Emitter<E> {
    listeners: Vec<Listener<E>>,
    next_id: u64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn on(&mut self, callback: impl FnMut(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a listener. Returns `false` if the id was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() < before
    }

    /// Removes every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Calls every listener with `event`, in registration order.
    pub fn fire(&mut self, event: &E) {
        for listener in &mut self.listeners {
            (listener.callback)(event);
        }
    }

    /// Moves the listeners out so the owner can fire them without holding its
    /// own borrow. Id allocation continues in `self`, so listeners registered
    /// while taken out do not collide with the taken ones.
    pub fn take(&mut self) -> Emitter<E> {
        Emitter {
            listeners: std::mem::take(&mut self.listeners),
            next_id: self.next_id,
        }
    }

    /// Puts back listeners previously moved out with [`Emitter::take`].
    /// Listeners added in the meantime are kept after the restored ones.
    pub fn restore(&mut self, mut taken: Emitter<E>) {
        taken.listeners.append(&mut self.listeners);
        self.listeners = taken.listeners;
        self.next_id = self.next_id.max(taken.next_id);
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

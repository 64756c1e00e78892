use alloc::{boxed::Box, vec::Vec};

/// The events a node fans out to its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// An NMT command changed the operating state
    StateChange,
    /// A frame arrived in the PDO range
    Pdo,
    /// An SDO request addressed to this node arrived
    SdoRequest,
    /// An SDO response addressed to this node arrived
    SdoResponse,
}

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// An ordered, append-only list of callbacks for one kind of event.
///
/// Several logical consumers sharing one physical bus each register their
/// own listener. Listeners are invoked in registration order, synchronously,
/// in the context that delivered the frame (usually the CAN receive
/// interrupt), so they must not block.
pub struct Listeners<E> {
    slots: Vec<Listener<E>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. There is no way to remove it again.
    pub fn register(&mut self, listener: impl FnMut(&E) + Send + 'static) {
        self.slots.push(Box::new(listener));
    }

    /// Invokes every listener with `event`, returning how many ran
    pub fn dispatch(&mut self, event: &E) -> usize {
        for listener in self.slots.iter_mut() {
            listener(event);
        }

        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<E> core::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::Listeners;

    #[test]
    fn dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::<u8>::new();

        for tag in ["first", "second", "third"] {
            let log = log.clone();
            listeners.register(move |value: &u8| log.lock().unwrap().push((tag, *value)));
        }

        assert_eq!(listeners.len(), 3);
        assert_eq!(listeners.dispatch(&7), 3);

        assert_eq!(
            *log.lock().unwrap(),
            [("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn empty_dispatch() {
        let mut listeners = Listeners::<()>::default();

        assert!(listeners.is_empty());
        assert_eq!(listeners.dispatch(&()), 0);
    }
}

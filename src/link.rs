//! Single-slot handoff links between pipeline stages.
//!
//! A link pairs a capacity-1 [`Slot`] with a coalescing [`WakeSignal`].
//! The producer end ([`LinkTx`]) places an item and then raises the wake;
//! the consumer end ([`LinkRx`]) waits for the wake and then drains the
//! slot. Neither end is `Clone`: each link has exactly one producer and one
//! consumer.
//!
//! Every blocking call takes an explicit bound. A full slot is never
//! overwritten; the producer gets its item back and decides to drop it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// Which of the two pipeline links an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkId {
    /// Monitor → Classifier
    Observations,
    /// Classifier → Alerter
    Verdicts,
}

impl LinkId {
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkId::Observations => "link12",
            LinkId::Verdicts => "link23",
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slot stayed full for the whole wait. Carries the rejected item.
#[derive(Debug, PartialEq, Eq)]
pub struct SendTimeout<T>(pub T);

impl<T> SendTimeout<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for SendTimeout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link full, send timed out")
    }
}

impl<T: fmt::Debug> std::error::Error for SendTimeout<T> {}

/// Capacity-1 buffer with bounded waits on both ends.
#[derive(Debug)]
pub struct Slot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Place `item` once the slot is empty, waiting at most `wait`.
    pub fn send_within(&self, item: T, wait: Duration) -> Result<(), SendTimeout<T>> {
        // Both channel ends live here, so the only failure is a timeout.
        self.tx
            .send_timeout(item, wait)
            .map_err(|e| SendTimeout(e.into_inner()))
    }

    /// Take the item, waiting at most `wait` for one to arrive.
    pub fn recv_within(&self, wait: Duration) -> Option<T> {
        self.rx.recv_timeout(wait).ok()
    }

    /// Discard any pending item. Returns it if there was one.
    pub fn reset(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn is_occupied(&self) -> bool {
        self.tx.is_full()
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary, coalescing wake-up.
///
/// A capacity-1 channel of `()`: raising an already pending signal finds
/// the channel full and does nothing, so a burst of raises before a wait
/// yields exactly one wake.
#[derive(Debug)]
pub struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Returns false if a wake was already pending (coalesced).
    pub fn raise(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Consume a pending wake, waiting at most `wait`. Returns false on
    /// timeout.
    pub fn wait_within(&self, wait: Duration) -> bool {
        self.rx.recv_timeout(wait).is_ok()
    }

    /// Drop a pending wake without consuming it through a wait.
    pub fn clear(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Shared<T> {
    id: LinkId,
    slot: Slot<T>,
    wake: WakeSignal,
}

/// Create a link. Both ends must be moved into their stages.
pub fn link<T>(id: LinkId) -> (LinkTx<T>, LinkRx<T>) {
    let shared = Arc::new(Shared {
        id,
        slot: Slot::new(),
        wake: WakeSignal::new(),
    });
    (
        LinkTx {
            shared: Arc::clone(&shared),
        },
        LinkRx { shared },
    )
}

/// Producer end of a link.
#[derive(Debug)]
pub struct LinkTx<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LinkTx<T> {
    pub fn id(&self) -> LinkId {
        self.shared.id
    }

    /// Send, then raise the wake. The wake is only raised once the item is
    /// in the slot, so a woken consumer normally finds it there.
    pub fn hand_off(&self, item: T, wait: Duration) -> Result<(), SendTimeout<T>> {
        self.shared.slot.send_within(item, wait)?;
        self.shared.wake.raise();
        Ok(())
    }

    /// Raise the wake without sending anything.
    ///
    /// Not used by the stages; lets callers reproduce the wake-without-item
    /// race the consumer has to recover from.
    pub fn raise_only(&self) -> bool {
        self.shared.wake.raise()
    }

    pub fn is_full(&self) -> bool {
        self.shared.slot.is_occupied()
    }
}

/// Consumer end of a link.
#[derive(Debug)]
pub struct LinkRx<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LinkRx<T> {
    pub fn id(&self) -> LinkId {
        self.shared.id
    }

    pub fn wait_wake(&self, wait: Duration) -> bool {
        self.shared.wake.wait_within(wait)
    }

    pub fn recv_within(&self, wait: Duration) -> Option<T> {
        self.shared.slot.recv_within(wait)
    }

    /// Clear the link's pending state: any item in the slot and any
    /// pending wake. Returns true if an item was discarded.
    pub fn reset(&self) -> bool {
        let discarded = self.shared.slot.reset().is_some();
        self.shared.wake.clear();
        discarded
    }

    pub fn is_pending(&self) -> bool {
        self.shared.slot.is_occupied()
    }
}

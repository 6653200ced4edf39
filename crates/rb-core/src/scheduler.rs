//! Single-threaded stimulus queue
//!
//! Three producers feed the queue: structural-change notifications, timer
//! ticks and storage change notifications. One consumer (the engine) drains
//! it. Nothing orders one producer relative to another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Default delay before the first full scan, letting the host page settle.
pub const INITIAL_DELAY: Duration = Duration::from_millis(2000);

/// Default period of the safety-net scan.
pub const SCAN_INTERVAL: Duration = Duration::from_millis(5000);

/// Work item for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus<E> {
    /// Subtrees inserted into the observed document, one batch per
    /// notification.
    NodesAdded(Vec<E>),
    /// Periodic full-document sweep.
    Tick,
    /// The settings record changed somewhere.
    SettingsChanged,
}

/// Timer configuration for the two periodic producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            interval: SCAN_INTERVAL,
        }
    }
}

/// FIFO of pending stimuli.
///
/// Queued `Tick`s and `SettingsChanged`s are coalesced: pushing one while an
/// identical item is still waiting is a no-op, since running it twice in a
/// row does nothing the first run did not.
pub struct StimulusQueue<E> {
    items: Rc<RefCell<VecDeque<Stimulus<E>>>>,
}

impl<E> Default for StimulusQueue<E> {
    fn default() -> Self {
        Self {
            items: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<E> StimulusQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A producer handle feeding this queue.
    pub fn sender(&self) -> StimulusSender<E> {
        StimulusSender {
            items: Rc::clone(&self.items),
        }
    }

    pub fn pop(&self) -> Option<Stimulus<E>> {
        self.items.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

/// Cloneable producer side of a [`StimulusQueue`].
pub struct StimulusSender<E> {
    items: Rc<RefCell<VecDeque<Stimulus<E>>>>,
}

impl<E> Clone for StimulusSender<E> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<E> StimulusSender<E> {
    /// Enqueue a stimulus. Returns `false` if it was coalesced away.
    pub fn send(&self, stimulus: Stimulus<E>) -> bool {
        let mut items = self.items.borrow_mut();
        let duplicate = match &stimulus {
            Stimulus::NodesAdded(nodes) => nodes.is_empty(),
            Stimulus::Tick => items.iter().any(|s| matches!(s, Stimulus::Tick)),
            Stimulus::SettingsChanged => {
                items.iter().any(|s| matches!(s, Stimulus::SettingsChanged))
            }
        };
        if duplicate {
            return false;
        }
        items.push_back(stimulus);
        true
    }
}

//! Arena of resumable frames with parent links.
//!
//! Nested delegation is represented as an explicit frame stack rather than
//! language-level nesting: each frame points at its parent, and completion
//! propagates upward through those links so the event loop only ever deals
//! with leaf-level suspensions.

use crate::suspend::Suspendable;

/// One entry in a computation's frame stack.
pub(crate) struct Frame {
    pub(crate) body: Box<dyn Suspendable>,
    pub(crate) parent: Option<usize>,
}

/// Slab-style arena storing frames under stable indices with free-list
/// reuse.
pub(crate) struct FrameArena {
    slots: Vec<Option<Frame>>,
    free: Vec<usize>,
}

impl FrameArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, frame: Frame) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(frame);
                index
            }
            None => {
                self.slots.push(Some(frame));
                self.slots.len() - 1
            }
        }
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<Frame> {
        let frame = self.slots.get_mut(index)?.take();
        if frame.is_some() {
            self.free.push(index);
        }
        frame
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.slots.get_mut(index)?.as_mut()
    }
}

//! Ring position and active-frame state for a set of frames.
//!
//! [`FrameCursor`] is pure bookkeeping: which slot is current, whether a
//! frame is open, and which slot was finished last. The context pairs it
//! with the actual [`RenderFrame`](crate::RenderFrame) vector.

use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
    count: usize,
    active: bool,
    last_rendered: Option<usize>,
}

impl FrameCursor {
    pub fn new(count: usize) -> Self {
        Self {
            index: 0,
            count,
            active: false,
            last_rendered: None,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Opens a frame. `acquired` re-seats the cursor on a swapchain image
    /// index; `None` keeps the ring position.
    pub fn begin(&mut self, acquired: Option<usize>) -> RenderResult<usize> {
        self.require_inactive("begin a frame")?;
        if self.count == 0 {
            return Err(RenderError::precondition(
                "cannot begin a frame before the context is prepared",
            ));
        }
        if let Some(index) = acquired {
            if index >= self.count {
                return Err(RenderError::precondition(format!(
                    "acquired image {} but only {} frames exist",
                    index, self.count
                )));
            }
            self.index = index;
        }
        self.active = true;
        Ok(self.index)
    }

    /// Closes the active frame and advances to the next slot.
    pub fn end(&mut self) -> RenderResult<usize> {
        self.require_active("end a frame")?;
        self.last_rendered = Some(self.index);
        self.index = (self.index + 1) % self.count;
        self.active = false;
        Ok(self.index)
    }

    /// The slot most recently closed by [`end`](Self::end).
    pub fn last_rendered(&self) -> RenderResult<usize> {
        self.require_inactive("query the last rendered frame")?;
        self.last_rendered
            .ok_or_else(|| RenderError::precondition("no frame has been rendered yet"))
    }

    /// Adopts a new frame count, keeping the position when it still exists.
    pub fn resize(&mut self, count: usize) {
        self.count = count;
        if self.index >= count {
            self.index = 0;
        }
        self.last_rendered = self.last_rendered.filter(|&i| i < count);
    }

    pub fn require_active(&self, action: &str) -> RenderResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(RenderError::precondition(format!(
                "cannot {} while no frame is active",
                action
            )))
        }
    }

    pub fn require_inactive(&self, action: &str) -> RenderResult<()> {
        if self.active {
            Err(RenderError::precondition(format!(
                "cannot {} while a frame is active",
                action
            )))
        } else {
            Ok(())
        }
    }
}

/// Makes `slots` match `items` one to one: extra slots are dropped, existing
/// ones are updated in place and missing ones are created.
pub fn reconcile<T, U, E>(
    slots: &mut Vec<T>,
    items: Vec<U>,
    mut create: impl FnMut(U) -> Result<T, E>,
    mut update: impl FnMut(&mut T, U),
) -> Result<(), E> {
    slots.truncate(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match slots.get_mut(i) {
            Some(slot) => update(slot, item),
            None => slots.push(create(item)?),
        }
    }
    Ok(())
}

use crate::types::{Pt, Rect};

/// One column region on a page. Fragments stack top to bottom.
#[derive(Debug, Clone)]
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn cursor_y(&self) -> Pt {
        self.cursor_y
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    /// Moves the cursor down. Forced placements may run past the bottom;
    /// the frame then reports no remaining height.
    pub fn advance(&mut self, height: Pt) {
        self.cursor_y += height.max(Pt::ZERO);
    }
}

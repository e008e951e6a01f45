use crate::frame::Frame;
use crate::types::{Margins, Pt, Rect, Size};

/// Page geometry: a size plus the frames (columns) content flows through,
/// left to right.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    frames: Vec<Rect>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_size,
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, rect: Rect) -> Self {
        self.frames.push(rect);
        self
    }

    /// Splits the area inside `margins` into `count` equal columns.
    pub fn with_columns(mut self, margins: Margins, count: usize, gap: Pt) -> Self {
        let content = margins.content_rect(self.page_size);
        let count = count.max(1);
        let gaps = gap * (count as i32 - 1);
        let width = ((content.width - gaps) / count as i32).max(Pt::ZERO);
        for idx in 0..count {
            let x = content.x + (width + gap) * idx as i32;
            self.frames.push(Rect::new(x, content.y, width, content.height));
        }
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len().max(1)
    }

    /// A template without frames flows through the whole page.
    pub fn instantiate_frames(&self) -> Vec<Frame> {
        if self.frames.is_empty() {
            return vec![Frame::new(Rect::new(
                Pt::ZERO,
                Pt::ZERO,
                self.page_size.width,
                self.page_size.height,
            ))];
        }
        self.frames.iter().map(|rect| Frame::new(*rect)).collect()
    }
}

use crate::style::Style;
use crate::types::{Pt, Size};
use std::fmt;

/// What happened when content was asked to fit a vertical budget.
#[derive(Debug)]
pub enum BreakOutcome {
    /// Everything fits; nothing carries over.
    Fits,
    /// The content now holds only the kept portion; the remainder goes to a
    /// continuation cell on the next fragment.
    Split(Box<dyn CellContent>),
    /// The content cannot be split at this height. The caller defers the
    /// whole anchor (or truncates it when breaking is disallowed).
    NoFit,
}

/// Payload of a cell that the paginator can measure and split.
pub trait CellContent: ContentClone + fmt::Debug + Send + Sync {
    fn measure(&self, avail_width: Pt) -> Size;

    /// Narrowest width that shows the content without clipping.
    fn min_width(&self) -> Pt;

    /// Splits so that the kept portion fits `avail_height`. Mutates `self`
    /// to the kept portion on [`BreakOutcome::Split`].
    fn try_break(&mut self, avail_width: Pt, avail_height: Pt) -> BreakOutcome;

    fn text(&self) -> Option<&str> {
        None
    }

    fn is_empty(&self) -> bool;

    /// Drops everything; used when a continuation must start blank.
    fn clear(&mut self);

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait ContentClone {
    fn clone_box(&self) -> Box<dyn CellContent>;
}

impl<T> ContentClone for T
where
    T: 'static + CellContent + Clone,
{
    fn clone_box(&self) -> Box<dyn CellContent> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn CellContent> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Measurement inputs for text, derived from a [`Style`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub line_height: Pt,
    pub char_width: Pt,
    pub inset_x: Pt,
    pub inset_y: Pt,
    pub word_wrap: bool,
}

impl TextMetrics {
    pub fn from_style(style: &Style) -> Self {
        Self {
            line_height: style.effective_line_height(),
            char_width: style.char_width(),
            inset_x: style.horizontal_inset(),
            inset_y: style.vertical_inset(),
            word_wrap: style.word_wrap,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextContent {
    text: String,
    metrics: TextMetrics,
    orphans: usize,
    widows: usize,
}

impl TextContent {
    pub fn new(text: impl Into<String>, metrics: TextMetrics) -> Self {
        Self {
            text: text.into(),
            metrics,
            orphans: 1,
            widows: 1,
        }
    }

    /// Minimum lines kept before and carried after a break.
    pub fn with_orphans_widows(mut self, orphans: usize, widows: usize) -> Self {
        self.orphans = orphans.max(1);
        self.widows = widows.max(1);
        self
    }

    pub fn metrics(&self) -> TextMetrics {
        self.metrics
    }

    fn text_width(&self, text: &str) -> Pt {
        self.metrics.char_width * (text.chars().count() as i32)
    }

    fn max_chars(&self, avail_width: Pt) -> usize {
        let inner = (avail_width - self.metrics.inset_x).max(Pt::ZERO);
        let cw = self.metrics.char_width.to_milli_i64();
        if cw <= 0 {
            return usize::MAX;
        }
        ((inner.to_milli_i64() / cw) as usize).max(1)
    }

    pub fn layout_lines(&self, avail_width: Pt) -> Vec<String> {
        self.layout(avail_width)
            .into_iter()
            .map(|(_, line)| line)
            .collect()
    }

    /// Wrapped lines paired with the byte offset in `text` where each starts.
    fn layout(&self, avail_width: Pt) -> Vec<(usize, String)> {
        if self.text.is_empty() {
            return Vec::new();
        }
        let max_chars = self.max_chars(avail_width);
        let mut lines = Vec::new();
        let mut paragraph_start = 0;
        for paragraph in self.text.split('\n') {
            let base = paragraph_start;
            paragraph_start += paragraph.len() + 1;
            if !self.metrics.word_wrap {
                lines.push((base, paragraph.to_string()));
                continue;
            }
            let mut current = String::new();
            let mut current_len = 0usize;
            let mut line_start = base;
            for (word_at, word) in words(paragraph) {
                for (piece_at, piece) in split_long_word(word, max_chars) {
                    let piece_len = piece.chars().count();
                    let needed = if current_len == 0 {
                        piece_len
                    } else {
                        current_len + 1 + piece_len
                    };
                    if needed > max_chars && current_len > 0 {
                        lines.push((line_start, std::mem::take(&mut current)));
                        current_len = 0;
                        line_start = base + word_at + piece_at;
                    }
                    if current_len > 0 {
                        current.push(' ');
                        current_len += 1;
                    }
                    current.push_str(piece);
                    current_len += piece_len;
                }
            }
            lines.push((line_start, current));
        }
        lines
    }
}

fn words(paragraph: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (at, ch) in paragraph.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(from)) => {
                words.push((from, &paragraph[from..at]));
                start = None;
            }
            (false, None) => start = Some(at),
            _ => {}
        }
    }
    if let Some(from) = start {
        words.push((from, &paragraph[from..]));
    }
    words
}

/// Pieces of at most `max_chars` characters with their byte offsets.
fn split_long_word(word: &str, max_chars: usize) -> Vec<(usize, &str)> {
    let bounds: Vec<usize> = word
        .char_indices()
        .map(|(at, _)| at)
        .step_by(max_chars.max(1))
        .chain(std::iter::once(word.len()))
        .collect();
    bounds
        .windows(2)
        .map(|pair| (pair[0], &word[pair[0]..pair[1]]))
        .collect()
}

impl CellContent for TextContent {
    fn measure(&self, avail_width: Pt) -> Size {
        let lines = self.layout_lines(avail_width);
        if lines.is_empty() {
            return Size::new(self.metrics.inset_x, self.metrics.inset_y);
        }
        let width = lines
            .iter()
            .fold(Pt::ZERO, |acc, line| acc.max(self.text_width(line)));
        Size::new(
            width + self.metrics.inset_x,
            self.metrics.line_height * (lines.len() as i32) + self.metrics.inset_y,
        )
    }

    fn min_width(&self) -> Pt {
        let widest = if self.metrics.word_wrap {
            self.text
                .split_whitespace()
                .fold(Pt::ZERO, |acc, word| acc.max(self.text_width(word)))
        } else {
            self.text
                .split('\n')
                .fold(Pt::ZERO, |acc, line| acc.max(self.text_width(line)))
        };
        widest + self.metrics.inset_x
    }

    fn try_break(&mut self, avail_width: Pt, avail_height: Pt) -> BreakOutcome {
        let lines = self.layout(avail_width);
        let lh = self.metrics.line_height.to_milli_i64();
        let ah = (avail_height - self.metrics.inset_y).to_milli_i64();
        if lh <= 0 {
            return BreakOutcome::Fits;
        }
        let max_lines = if ah <= 0 { 0 } else { (ah / lh) as usize };
        let total_lines = lines.len();
        if total_lines <= max_lines {
            return BreakOutcome::Fits;
        }
        if max_lines == 0 || max_lines < self.orphans {
            return BreakOutcome::NoFit;
        }

        let mut split_at = max_lines;
        if total_lines - split_at < self.widows {
            split_at = total_lines.saturating_sub(self.widows);
        }
        if split_at < self.orphans || split_at == 0 {
            return BreakOutcome::NoFit;
        }

        // Cut the source text so the remainder keeps its own spacing.
        let at = lines[split_at].0;
        let rest = self.text.split_off(at);
        if self.text.ends_with('\n') {
            self.text.pop();
        } else {
            self.text.truncate(self.text.trim_end().len());
        }
        let remainder = TextContent {
            text: rest,
            metrics: self.metrics,
            orphans: self.orphans,
            widows: self.widows,
        };
        BreakOutcome::Split(Box::new(remainder))
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

/// An atomic object (picture, barcode, chart) with a fixed size.
#[derive(Debug, Clone)]
pub struct BlockContent {
    name: String,
    size: Size,
    cleared: bool,
}

impl BlockContent {
    pub fn new(name: impl Into<String>, size: Size) -> Self {
        Self {
            name: name.into(),
            size,
            cleared: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CellContent for BlockContent {
    fn measure(&self, _avail_width: Pt) -> Size {
        if self.cleared { Size::default() } else { self.size }
    }

    fn min_width(&self) -> Pt {
        if self.cleared { Pt::ZERO } else { self.size.width }
    }

    fn try_break(&mut self, _avail_width: Pt, avail_height: Pt) -> BreakOutcome {
        if self.cleared || self.size.height <= avail_height {
            BreakOutcome::Fits
        } else {
            BreakOutcome::NoFit
        }
    }

    fn is_empty(&self) -> bool {
        self.cleared
    }

    fn clear(&mut self) {
        self.cleared = true;
    }
}

/// Nested child objects stacked top to bottom.
#[derive(Debug, Clone, Default)]
pub struct StackContent {
    children: Vec<Box<dyn CellContent>>,
    gap: Pt,
}

impl StackContent {
    pub fn new(children: Vec<Box<dyn CellContent>>) -> Self {
        Self {
            children,
            gap: Pt::ZERO,
        }
    }

    pub fn with_gap(mut self, gap: Pt) -> Self {
        self.gap = gap;
        self
    }

    pub fn children(&self) -> &[Box<dyn CellContent>] {
        &self.children
    }

    pub fn push(&mut self, child: Box<dyn CellContent>) {
        self.children.push(child);
    }
}

impl CellContent for StackContent {
    fn measure(&self, avail_width: Pt) -> Size {
        let mut size = Size::default();
        for (idx, child) in self.children.iter().enumerate() {
            let child_size = child.measure(avail_width);
            size.width = size.width.max(child_size.width);
            size.height += child_size.height;
            if idx > 0 {
                size.height += self.gap;
            }
        }
        size
    }

    fn min_width(&self) -> Pt {
        self.children
            .iter()
            .fold(Pt::ZERO, |acc, child| acc.max(child.min_width()))
    }

    fn try_break(&mut self, avail_width: Pt, avail_height: Pt) -> BreakOutcome {
        let mut used = Pt::ZERO;
        for idx in 0..self.children.len() {
            let gap = if idx > 0 { self.gap } else { Pt::ZERO };
            let child_height = self.children[idx].measure(avail_width).height;
            if used + gap + child_height <= avail_height {
                used = used + gap + child_height;
                continue;
            }

            let room = (avail_height - used - gap).max(Pt::ZERO);
            let mut tail = self.children.split_off(idx);
            return match tail[0].try_break(avail_width, room) {
                BreakOutcome::Split(rest) => {
                    let kept = tail.remove(0);
                    self.children.push(kept);
                    tail.insert(0, rest);
                    BreakOutcome::Split(Box::new(StackContent {
                        children: tail,
                        gap: self.gap,
                    }))
                }
                BreakOutcome::Fits => {
                    // The child fits once trimmed to the room left; keep it
                    // here and carry whatever follows it.
                    let kept = tail.remove(0);
                    self.children.push(kept);
                    if tail.is_empty() {
                        BreakOutcome::Fits
                    } else {
                        BreakOutcome::Split(Box::new(StackContent {
                            children: tail,
                            gap: self.gap,
                        }))
                    }
                }
                BreakOutcome::NoFit => {
                    if idx == 0 {
                        self.children = tail;
                        BreakOutcome::NoFit
                    } else {
                        BreakOutcome::Split(Box::new(StackContent {
                            children: tail,
                            gap: self.gap,
                        }))
                    }
                }
            };
        }
        BreakOutcome::Fits
    }

    fn text(&self) -> Option<&str> {
        self.children.iter().find_map(|child| child.text())
    }

    fn is_empty(&self) -> bool {
        self.children.iter().all(|child| child.is_empty())
    }

    fn clear(&mut self) {
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> TextMetrics {
        TextMetrics {
            line_height: Pt::from_i32(10),
            char_width: Pt::from_i32(5),
            inset_x: Pt::ZERO,
            inset_y: Pt::ZERO,
            word_wrap: true,
        }
    }

    #[test]
    fn text_wraps_on_words() {
        let text = TextContent::new("aaa bbb ccc", metrics());
        // 40pt holds 8 chars per line.
        assert_eq!(text.layout_lines(Pt::from_i32(40)), vec!["aaa bbb", "ccc"]);
        assert_eq!(text.measure(Pt::from_i32(40)).height, Pt::from_i32(20));
        assert_eq!(text.min_width(), Pt::from_i32(15));
    }

    #[test]
    fn long_words_are_chunked() {
        let text = TextContent::new("abcdefghij", metrics());
        assert_eq!(
            text.layout_lines(Pt::from_i32(20)),
            vec!["abcd", "efgh", "ij"]
        );
    }

    #[test]
    fn try_break_keeps_fitting_lines_and_returns_remainder() {
        let mut text = TextContent::new("l1\nl2\nl3\nl4", metrics());
        match text.try_break(Pt::from_i32(100), Pt::from_i32(25)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(text.text(), Some("l1\nl2"));
                assert_eq!(rest.text(), Some("l3\nl4"));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn try_break_keeps_source_spacing_on_both_sides() {
        let mut text = TextContent::new("alpha  beta\n  gamma delta", metrics());
        // 8 chars per line: alpha / beta / gamma / delta.
        match text.try_break(Pt::from_i32(40), Pt::from_i32(25)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(text.text(), Some("alpha  beta"));
                assert_eq!(rest.text(), Some("  gamma delta"));
                assert_eq!(rest.measure(Pt::from_i32(100)).height, Pt::from_i32(10));
            }
            other => panic!("expected split, got {other:?}"),
        }

        let mut text = TextContent::new("one two three", metrics());
        match text.try_break(Pt::from_i32(40), Pt::from_i32(10)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(text.text(), Some("one two"));
                assert_eq!(rest.text(), Some("three"));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn try_break_reports_fit_and_no_fit() {
        let mut text = TextContent::new("l1\nl2", metrics());
        assert!(matches!(
            text.try_break(Pt::from_i32(100), Pt::from_i32(20)),
            BreakOutcome::Fits
        ));
        assert!(matches!(
            text.try_break(Pt::from_i32(100), Pt::from_i32(5)),
            BreakOutcome::NoFit
        ));
        assert_eq!(text.text(), Some("l1\nl2"));
    }

    #[test]
    fn widows_pull_lines_to_the_remainder() {
        let mut text = TextContent::new("a\nb\nc\nd", metrics()).with_orphans_widows(1, 2);
        match text.try_break(Pt::from_i32(100), Pt::from_i32(30)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(text.text(), Some("a\nb"));
                assert_eq!(rest.text(), Some("c\nd"));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn block_never_splits() {
        let mut block = BlockContent::new("logo", Size::new(Pt::from_i32(50), Pt::from_i32(40)));
        assert!(matches!(
            block.try_break(Pt::from_i32(50), Pt::from_i32(39)),
            BreakOutcome::NoFit
        ));
        assert!(matches!(
            block.try_break(Pt::from_i32(50), Pt::from_i32(40)),
            BreakOutcome::Fits
        ));
        block.clear();
        assert!(block.is_empty());
        assert_eq!(block.measure(Pt::ZERO).height, Pt::ZERO);
    }

    #[test]
    fn stack_breaks_between_children() {
        let block = |h: i32| -> Box<dyn CellContent> {
            Box::new(BlockContent::new("b", Size::new(Pt::from_i32(10), Pt::from_i32(h))))
        };
        let mut stack = StackContent::new(vec![block(10), block(10), block(10)]);
        assert_eq!(stack.measure(Pt::from_i32(10)).height, Pt::from_i32(30));
        match stack.try_break(Pt::from_i32(10), Pt::from_i32(25)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(stack.children().len(), 2);
                assert_eq!(rest.measure(Pt::from_i32(10)).height, Pt::from_i32(10));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn stack_breaks_inside_text_child() {
        let text: Box<dyn CellContent> = Box::new(TextContent::new("a\nb\nc", metrics()));
        let block: Box<dyn CellContent> =
            Box::new(BlockContent::new("b", Size::new(Pt::from_i32(10), Pt::from_i32(10))));
        let mut stack = StackContent::new(vec![block, text]);
        match stack.try_break(Pt::from_i32(100), Pt::from_i32(30)) {
            BreakOutcome::Split(rest) => {
                assert_eq!(stack.children().len(), 2);
                assert_eq!(stack.children()[1].text(), Some("a\nb"));
                assert_eq!(rest.text(), Some("c"));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn stack_with_unsplittable_first_child_reports_no_fit() {
        let block: Box<dyn CellContent> =
            Box::new(BlockContent::new("b", Size::new(Pt::from_i32(10), Pt::from_i32(50))));
        let mut stack = StackContent::new(vec![block]);
        assert!(matches!(
            stack.try_break(Pt::from_i32(10), Pt::from_i32(20)),
            BreakOutcome::NoFit
        ));
        assert_eq!(stack.children().len(), 1);
    }
}

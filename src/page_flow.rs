use crate::compositor::{PageCompositor, RegionCursor};
use crate::debug::DebugLogger;
use crate::error::GridFlowError;
use crate::frame::Frame;
use crate::metrics::{FlowMetrics, PageMetrics};
use crate::page_template::PageTemplate;
use crate::paginate::PageFragment;
use crate::types::Pt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reference compositor: pages cut from [`PageTemplate`]s, each flowing
/// through its frames left to right.
///
/// Page `n` uses template `n - 1`; the last template repeats.
pub struct PageFlow {
    templates: Vec<PageTemplate>,
    page_number: usize,
    frames: Vec<Frame>,
    frame_index: usize,
    unlimited_height: bool,
    unlimited_width: bool,
    abort: Option<Arc<AtomicBool>>,
    placed: Vec<PlacedFragment>,
    metrics: FlowMetrics,
    debug: Option<DebugLogger>,
}

/// Where a fragment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedFragment {
    pub table_id: u32,
    pub index: usize,
    pub page: usize,
    pub column: usize,
}

fn select_template(templates: &[PageTemplate], page_number: usize) -> &PageTemplate {
    let idx = page_number.saturating_sub(1).min(templates.len() - 1);
    &templates[idx]
}

impl PageFlow {
    pub fn new(templates: Vec<PageTemplate>) -> Result<Self, GridFlowError> {
        if templates.is_empty() {
            return Err(GridFlowError::InvalidConfiguration(
                "page flow needs at least one page template".to_string(),
            ));
        }
        let first = select_template(&templates, 1);
        let frames = first.instantiate_frames();
        let metrics = FlowMetrics {
            pages: vec![PageMetrics {
                page_number: 1,
                template: first.name.clone(),
                frames_used: 1,
                ..PageMetrics::default()
            }],
            total_fragments: 0,
        };
        Ok(Self {
            templates,
            page_number: 1,
            frames,
            frame_index: 0,
            unlimited_height: false,
            unlimited_width: false,
            abort: None,
            placed: Vec::new(),
            metrics,
            debug: None,
        })
    }

    /// Every table fits in one region; used when only measuring.
    pub fn with_unlimited_height(mut self, unlimited: bool) -> Self {
        self.unlimited_height = unlimited;
        self
    }

    pub fn with_unlimited_width(mut self, unlimited: bool) -> Self {
        self.unlimited_width = unlimited;
        self
    }

    /// Pagination stops at the next fragment once `flag` is set.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub(crate) fn with_debug(mut self, debug: DebugLogger) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn page_count(&self) -> usize {
        self.metrics.pages.len()
    }

    pub fn current_template(&self) -> &PageTemplate {
        select_template(&self.templates, self.page_number)
    }

    pub fn placed(&self) -> &[PlacedFragment] {
        &self.placed
    }

    pub fn metrics(&self) -> &FlowMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> FlowMetrics {
        self.metrics
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frame_index]
    }

    fn begin_page(&mut self, reason: &str) {
        let from_page = self.page_number;
        self.page_number += 1;
        let template = select_template(&self.templates, self.page_number);
        self.frames = template.instantiate_frames();
        self.frame_index = 0;
        self.metrics.pages.push(PageMetrics {
            page_number: self.page_number,
            template: template.name.clone(),
            frames_used: 1,
            ..PageMetrics::default()
        });
        if let Some(debug) = self.debug.as_ref() {
            debug.log_json(&format!(
                "{{\"type\":\"flow.page_start\",\"reason\":\"{}\",\"from_page\":{},\"to_page\":{}}}",
                reason, from_page, self.page_number
            ));
            debug.increment("flow.page_start", 1);
        }
    }
}

impl PageCompositor for PageFlow {
    fn free_height(&self) -> Pt {
        if self.unlimited_height {
            return Pt::huge();
        }
        self.current_frame().remaining_height()
    }

    fn page_width(&self) -> Pt {
        if self.unlimited_width {
            return Pt::huge();
        }
        self.current_frame().rect().width
    }

    fn start_new_page(&mut self) {
        self.begin_page("new_page");
    }

    fn end_column(&mut self) {
        if self.frame_index + 1 < self.frames.len() {
            self.frame_index += 1;
            if let Some(page) = self.metrics.pages.last_mut() {
                page.frames_used = page.frames_used.max(self.frame_index + 1);
            }
            return;
        }
        self.begin_page("frames_exhausted");
    }

    fn advance(&mut self, height: Pt) {
        let frame_index = self.frame_index;
        self.frames[frame_index].advance(height);
        if let Some(page) = self.metrics.pages.last_mut() {
            page.used_height += height;
        }
    }

    fn cursor(&self) -> RegionCursor {
        let frame = self.current_frame();
        RegionCursor {
            page: self.page_number,
            column: self.frame_index,
            x: frame.rect().x,
            y: frame.rect().y + frame.cursor_y(),
            used: frame.cursor_y(),
        }
    }

    fn is_unlimited_height(&self) -> bool {
        self.unlimited_height
    }

    fn is_unlimited_width(&self) -> bool {
        self.unlimited_width
    }

    fn is_aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn fragment_placed(&mut self, fragment: &PageFragment) {
        self.placed.push(PlacedFragment {
            table_id: fragment.table_id,
            index: fragment.index,
            page: fragment.page,
            column: fragment.column,
        });
        self.metrics.total_fragments += 1;
        if let Some(page) = self
            .metrics
            .pages
            .iter_mut()
            .rev()
            .find(|page| page.page_number == fragment.page)
        {
            page.fragment_count += 1;
        }
    }
}

use crate::compositor::PageCompositor;
use crate::content::{BreakOutcome, CellContent};
use crate::debug::{DebugLogger, table_debug_enabled};
use crate::fit::{replayed_headers, tracks_extent, tracks_fit, tracks_fit_forced};
use crate::grid::{Axis, Cell, CellAddress, CellValue, Grid, SpanRect};
use crate::perf::{PerfLogger, perf_end, perf_start};
use crate::style::Style;
use crate::types::{Pt, Rect, Size};
use std::ops::Range;
use std::sync::Arc;

/// Order in which row and column bands are laid onto pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutStrategy {
    /// Every column band of a row band gets its own page before the next
    /// row band starts.
    #[default]
    AcrossThenDown,
    /// All row bands of a column band first; a narrow band may sit beside
    /// the previous one on the same page.
    DownThenAcross,
    /// Column bands stacked in normal flow, separated by a gap.
    Wrapped,
}

/// A cell as drawn in one fragment.
#[derive(Debug, Clone)]
pub struct CellSnapshot {
    pub address: CellAddress,
    pub col_span: usize,
    pub row_span: usize,
    pub text: String,
    pub style: Arc<Style>,
    /// Relative to the fragment origin, clipped to what the fragment shows.
    pub rect: Rect,
    /// Drawn as part of a replayed header row or column.
    pub header: bool,
}

/// One rectangular piece of a table placed in one page region.
#[derive(Debug, Clone)]
pub struct PageFragment {
    pub table_id: u32,
    pub index: usize,
    pub page: usize,
    pub column: usize,
    pub x: Pt,
    pub y: Pt,
    pub rows: Range<usize>,
    pub columns: Range<usize>,
    /// Header rows replayed above `rows`; empty on the first row band.
    pub header_rows: Range<usize>,
    pub header_columns: Range<usize>,
    pub size: Size,
    pub cells: Vec<CellSnapshot>,
}

impl PageFragment {
    pub fn cell(&self, address: CellAddress) -> Option<&CellSnapshot> {
        self.cells.iter().find(|cell| cell.address == address)
    }
}

struct Window {
    rows: Range<usize>,
    columns: Range<usize>,
    /// Hold the compositor in place so the next column band can sit beside
    /// this one.
    defer_advance: bool,
}

#[derive(Debug, Clone)]
enum Transition {
    NewPage,
    NextColumn,
    /// After a column band that took a single row band: place the next band
    /// beside it when it fits, otherwise on a new page.
    BesideOrNewPage(Range<usize>),
    Gap(Pt),
}

/// Lazily lays a grid onto compositor regions, one fragment per `next()`.
///
/// Splitting mutates the grid (spans, payloads, grown sizes), so a pass
/// cannot be restarted halfway.
pub struct Paginator<'a, C: PageCompositor + ?Sized> {
    grid: &'a mut Grid,
    compositor: &'a mut C,
    strategy: LayoutStrategy,
    wrapped_gap: Pt,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
    row_start: usize,
    col_start: usize,
    band: Option<Range<usize>>,
    x_offset: Pt,
    pending_advance: Pt,
    transition: Option<Transition>,
    emitted: usize,
    done: bool,
}

impl<'a, C: PageCompositor + ?Sized> Paginator<'a, C> {
    pub fn new(grid: &'a mut Grid, compositor: &'a mut C, strategy: LayoutStrategy) -> Self {
        grid.calc_widths();
        grid.calc_heights();
        Self {
            grid,
            compositor,
            strategy,
            wrapped_gap: Pt::ZERO,
            debug: None,
            perf: None,
            row_start: 0,
            col_start: 0,
            band: None,
            x_offset: Pt::ZERO,
            pending_advance: Pt::ZERO,
            transition: None,
            emitted: 0,
            done: false,
        }
    }

    /// Vertical space between column bands under [`LayoutStrategy::Wrapped`].
    pub fn with_wrapped_gap(mut self, gap: Pt) -> Self {
        self.wrapped_gap = gap.max(Pt::ZERO);
        self
    }

    pub(crate) fn with_logs(mut self, debug: Option<DebugLogger>, perf: Option<PerfLogger>) -> Self {
        self.debug = debug;
        self.perf = perf;
        self
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn log(&self, kind: &str, fields: &[(&str, i64)]) {
        if let Some(debug) = self.debug.as_ref() {
            debug.log_event(kind, self.grid.id(), fields);
        }
    }

    fn region_fresh(&self) -> bool {
        self.pending_advance <= Pt::ZERO && self.compositor.cursor().is_fresh()
    }

    fn flush_advance(&mut self) {
        if self.pending_advance > Pt::ZERO {
            self.compositor.advance(self.pending_advance);
            self.pending_advance = Pt::ZERO;
        }
    }

    fn new_page(&mut self) {
        self.flush_advance();
        let from = self.compositor.cursor().page;
        self.compositor.start_new_page();
        self.x_offset = Pt::ZERO;
        let to = self.compositor.cursor().page;
        self.log(
            "table.page_break",
            &[("from_page", from as i64), ("to_page", to as i64)],
        );
    }

    fn next_region(&mut self) {
        self.flush_advance();
        let from = self.compositor.cursor();
        self.compositor.end_column();
        self.x_offset = Pt::ZERO;
        let to = self.compositor.cursor();
        if from.page != to.page {
            self.log(
                "table.page_break",
                &[("from_page", from.page as i64), ("to_page", to.page as i64)],
            );
        } else {
            self.log(
                "table.column_break",
                &[
                    ("page", to.page as i64),
                    ("from_column", from.column as i64),
                    ("to_column", to.column as i64),
                ],
            );
        }
    }

    fn apply_transition(&mut self) {
        match self.transition.take() {
            None => {}
            Some(Transition::NewPage) => self.new_page(),
            Some(Transition::NextColumn) => self.next_region(),
            Some(Transition::BesideOrNewPage(band)) => {
                let band_width = tracks_extent(self.grid, Axis::Columns, band.start, band.len());
                let next_x = self.x_offset + band_width;
                if self.fits_beside(band.end, next_x) {
                    self.x_offset = next_x;
                } else {
                    self.new_page();
                }
            }
            Some(Transition::Gap(gap)) => {
                self.flush_advance();
                if self.compositor.is_unlimited_height() || self.compositor.free_height() >= gap {
                    self.compositor.advance(gap);
                } else {
                    self.next_region();
                }
            }
        }
    }

    fn fits_beside(&self, next_start: usize, next_x: Pt) -> bool {
        let page_width = self.compositor.page_width();
        if next_x >= page_width {
            return false;
        }
        let room = page_width - next_x;
        let count = tracks_fit(
            self.grid,
            Axis::Columns,
            next_start,
            room,
            self.compositor.is_unlimited_width(),
        );
        if count == 0 || tracks_extent(self.grid, Axis::Columns, next_start, count) > room {
            return false;
        }
        if self.compositor.is_unlimited_height() {
            return true;
        }
        let rows = self.grid.row_count();
        let free = self.compositor.free_height();
        tracks_fit(self.grid, Axis::Rows, 0, free, false) >= rows
            && tracks_extent(self.grid, Axis::Rows, 0, rows) <= free
    }

    /// Where the region goes after a row band that stopped at `next_row`.
    fn break_before_row(&self, next_row: usize) -> Transition {
        if self.grid.track(Axis::Rows, next_row).page_break {
            Transition::NewPage
        } else {
            Transition::NextColumn
        }
    }

    fn fit_rows(&mut self, start: usize) -> usize {
        let unlimited = self.compositor.is_unlimited_height();
        let free = self.compositor.free_height();
        let count = tracks_fit(self.grid, Axis::Rows, start, free, unlimited);
        if unlimited || (count > 0 && tracks_extent(self.grid, Axis::Rows, start, count) <= free) {
            return count;
        }
        if !self.region_fresh() {
            self.next_region();
            let free = self.compositor.free_height();
            let count = tracks_fit(self.grid, Axis::Rows, start, free, false);
            if count > 0 {
                return count;
            }
        }
        self.log("table.forced_fit", &[("row", start as i64)]);
        tracks_fit_forced(self.grid, Axis::Rows, start, self.compositor.free_height())
    }

    fn fit_columns(&mut self, start: usize, avail: Pt) -> usize {
        let unlimited = self.compositor.is_unlimited_width();
        let count = tracks_fit(self.grid, Axis::Columns, start, avail, unlimited);
        if count > 0 {
            return count;
        }
        self.log("table.forced_fit", &[("column", start as i64)]);
        tracks_fit_forced(self.grid, Axis::Columns, start, avail)
    }

    fn next_across_then_down(&mut self) -> Option<Window> {
        let rows_len = self.grid.row_count();
        let cols_len = self.grid.column_count();
        if self.row_start >= rows_len || cols_len == 0 {
            return None;
        }
        self.apply_transition();
        let rows = match self.band.clone() {
            Some(rows) => rows,
            None => {
                let count = self.fit_rows(self.row_start);
                let rows = self.row_start..self.row_start + count;
                self.band = Some(rows.clone());
                self.col_start = 0;
                rows
            }
        };
        let avail = self.compositor.page_width();
        let count = self.fit_columns(self.col_start, avail);
        let columns = self.col_start..self.col_start + count;
        self.col_start = columns.end;
        if columns.end >= cols_len {
            self.band = None;
            self.row_start = rows.end;
            self.col_start = 0;
            if rows.end < rows_len {
                self.transition = Some(self.break_before_row(rows.end));
            }
        } else {
            self.transition = Some(Transition::NewPage);
        }
        Some(Window {
            rows,
            columns,
            defer_advance: false,
        })
    }

    fn next_down_then_across(&mut self) -> Option<Window> {
        let rows_len = self.grid.row_count();
        let cols_len = self.grid.column_count();
        if self.col_start >= cols_len || rows_len == 0 {
            return None;
        }
        self.apply_transition();
        let columns = match self.band.clone() {
            Some(columns) => columns,
            None => {
                let avail = (self.compositor.page_width() - self.x_offset).max(Pt::ZERO);
                let count = self.fit_columns(self.col_start, avail);
                let columns = self.col_start..self.col_start + count;
                self.band = Some(columns.clone());
                self.row_start = 0;
                columns
            }
        };
        let count = self.fit_rows(self.row_start);
        let rows = self.row_start..self.row_start + count;
        self.row_start = rows.end;
        let single_band = rows.start == 0 && rows.end >= rows_len;
        if rows.end < rows_len {
            self.transition = Some(self.break_before_row(rows.end));
        } else {
            self.band = None;
            self.col_start = columns.end;
            if columns.end < cols_len {
                self.transition = Some(if single_band {
                    Transition::BesideOrNewPage(columns.clone())
                } else {
                    Transition::NewPage
                });
            }
        }
        Some(Window {
            rows,
            columns,
            defer_advance: single_band,
        })
    }

    fn next_wrapped(&mut self) -> Option<Window> {
        let rows_len = self.grid.row_count();
        let cols_len = self.grid.column_count();
        if self.col_start >= cols_len || rows_len == 0 {
            return None;
        }
        self.apply_transition();
        let columns = match self.band.clone() {
            Some(columns) => columns,
            None => {
                let avail = self.compositor.page_width();
                let count = self.fit_columns(self.col_start, avail);
                let columns = self.col_start..self.col_start + count;
                self.band = Some(columns.clone());
                self.row_start = 0;
                columns
            }
        };
        let count = self.fit_rows(self.row_start);
        let rows = self.row_start..self.row_start + count;
        self.row_start = rows.end;
        if rows.end < rows_len {
            self.transition = Some(self.break_before_row(rows.end));
        } else {
            self.band = None;
            self.col_start = columns.end;
            if columns.end < cols_len {
                self.transition = Some(Transition::Gap(self.wrapped_gap));
            }
        }
        Some(Window {
            rows,
            columns,
            defer_advance: false,
        })
    }

    fn emit(&mut self, window: Window) -> PageFragment {
        self.split_spans(&window.rows, &window.columns);
        let grid = &*self.grid;
        let header_rows = replayed_headers(grid, Axis::Rows, window.rows.start);
        let header_columns = replayed_headers(grid, Axis::Columns, window.columns.start);
        let width = tracks_extent(grid, Axis::Columns, window.columns.start, window.columns.len());
        let height = tracks_extent(grid, Axis::Rows, window.rows.start, window.rows.len());
        let cells = snapshot(
            grid,
            &window.rows,
            &window.columns,
            &header_rows,
            &header_columns,
        );
        let cursor = self.compositor.cursor();
        let fragment = PageFragment {
            table_id: grid.id(),
            index: self.emitted,
            page: cursor.page,
            column: cursor.column,
            x: cursor.x + self.x_offset,
            y: cursor.y,
            rows: window.rows,
            columns: window.columns,
            header_rows,
            header_columns,
            size: Size::new(width, height),
            cells,
        };

        if window.defer_advance {
            self.pending_advance = self.pending_advance.max(height);
        } else {
            self.flush_advance();
            self.compositor.advance(height);
        }
        self.compositor.fragment_placed(&fragment);
        self.emitted += 1;
        self.log(
            "table.fragment",
            &[
                ("index", fragment.index as i64),
                ("page", fragment.page as i64),
                ("column", fragment.column as i64),
                ("row_start", fragment.rows.start as i64),
                ("row_end", fragment.rows.end as i64),
                ("col_start", fragment.columns.start as i64),
                ("col_end", fragment.columns.end as i64),
            ],
        );
        if table_debug_enabled() {
            eprintln!(
                "[gridflow] table={} fragment={} page={} rows={:?} cols={:?} size={}x{}",
                fragment.table_id,
                fragment.index,
                fragment.page,
                fragment.rows,
                fragment.columns,
                width.to_f32(),
                height.to_f32()
            );
        }
        fragment
    }

    fn split_spans(&mut self, rows: &Range<usize>, columns: &Range<usize>) {
        self.split_start_edge(Axis::Columns, rows, columns);
        self.split_start_edge(Axis::Rows, rows, columns);
        self.split_row_ends(rows, columns);
        self.split_column_ends(rows, columns);
    }

    /// Rectangles that began before the window get a continuation anchor at
    /// the window start. Header rectangles are drawn by replay instead.
    ///
    /// The end-edge splits of the previous fragment normally leave nothing
    /// for this to do; it only fires for a window that opens inside a span.
    fn split_start_edge(&mut self, axis: Axis, rows: &Range<usize>, columns: &Range<usize>) {
        let window_start = match axis {
            Axis::Rows => rows.start,
            Axis::Columns => columns.start,
        };
        let headers = replayed_headers(self.grid, axis, window_start);
        let rects: Vec<SpanRect> = self
            .grid
            .spanned_rects()
            .into_iter()
            .filter(|r| {
                r.intersects(columns, rows)
                    && r.start(axis) < window_start
                    && r.end(axis) > window_start
                    && !headers.contains(&r.start(axis))
            })
            .collect();
        for rect in &rects {
            let kept = window_start - rect.start(axis);
            let rest = rect.end(axis) - window_start;
            let Some(cell) = self.grid.cells_mut().get_mut(&rect.anchor) else {
                continue;
            };
            cell.set_axis_span(axis, kept);
            let payload = cell.content().clone_box();
            let mut next = continuation(cell, payload);
            next.set_axis_span(axis, rest);
            next.set_axis_span(axis.other(), rect.span(axis.other()));
            let at = rect.anchor.with(axis, window_start);
            self.grid.cells_mut().insert(at, next);
            self.log(
                "table.span_split",
                &[
                    ("col", rect.anchor.col as i64),
                    ("row", rect.anchor.row as i64),
                    ("edge", 0),
                    ("at", window_start as i64),
                ],
            );
        }
        if !rects.is_empty() {
            self.grid.invalidate();
        }
    }

    /// Truncates rectangles crossing the window's last row and hands the
    /// part of their payload that does not fit to an anchor below.
    fn split_row_ends(&mut self, rows: &Range<usize>, columns: &Range<usize>) {
        let end = rows.end;
        let rects: Vec<SpanRect> = self
            .grid
            .spanned_rects()
            .into_iter()
            .filter(|r| {
                r.intersects(columns, rows)
                    && r.start(Axis::Rows) >= rows.start
                    && r.end(Axis::Rows) > end
            })
            .collect();
        for rect in &rects {
            let anchor = rect.anchor;
            let kept_rows = end - anchor.row;
            let rest_rows = rect.end(Axis::Rows) - end;
            let avail_height = self.grid.tracks_size(Axis::Rows, anchor.row, kept_rows);
            let avail_width = self.grid.tracks_size(Axis::Columns, anchor.col, rect.col_span);
            let can_break = self.grid.row(end - 1).is_none_or(|row| row.can_break);
            let Some(cell) = self.grid.cells_mut().get_mut(&anchor) else {
                continue;
            };
            cell.set_axis_span(Axis::Rows, kept_rows);
            let (remainder, outcome) = if !can_break {
                (emptied(cell.content()), 0)
            } else {
                match cell.content_mut().try_break(avail_width, avail_height) {
                    BreakOutcome::Split(rest) => (rest, 1),
                    BreakOutcome::Fits => (emptied(cell.content()), 2),
                    BreakOutcome::NoFit => {
                        let whole = cell.content().clone_box();
                        cell.content_mut().clear();
                        (whole, 3)
                    }
                }
            };
            let mut next = continuation(cell, remainder);
            next.set_spans(rect.col_span, rest_rows);
            let needed = if next.content().is_empty() {
                Pt::ZERO
            } else {
                next.content().measure(avail_width).height
            };
            self.grid.cells_mut().insert(anchor.with(Axis::Rows, end), next);
            self.log(
                "table.span_split",
                &[
                    ("col", anchor.col as i64),
                    ("row", anchor.row as i64),
                    ("edge", 1),
                    ("at", end as i64),
                    ("outcome", outcome),
                ],
            );

            // The remainder must not lose content: grow its last row.
            let have = self.grid.tracks_size(Axis::Rows, end, rest_rows);
            if needed > have {
                let last = end + rest_rows - 1;
                let grow = needed - have;
                self.grid.track_mut(Axis::Rows, last).size += grow;
                self.log(
                    "table.row_grow",
                    &[("row", last as i64), ("grow_milli", grow.to_milli_i64())],
                );
            }
        }
        if !rects.is_empty() {
            self.grid.invalidate();
        }
    }

    /// Column overflow: truncate and clone, never break.
    fn split_column_ends(&mut self, rows: &Range<usize>, columns: &Range<usize>) {
        let end = columns.end;
        let rects: Vec<SpanRect> = self
            .grid
            .spanned_rects()
            .into_iter()
            .filter(|r| {
                r.intersects(columns, rows)
                    && r.start(Axis::Columns) >= columns.start
                    && r.end(Axis::Columns) > end
            })
            .collect();
        for rect in &rects {
            let anchor = rect.anchor;
            let kept = end - anchor.col;
            let Some(cell) = self.grid.cells_mut().get_mut(&anchor) else {
                continue;
            };
            cell.set_axis_span(Axis::Columns, kept);
            let payload = cell.content().clone_box();
            let mut next = continuation(cell, payload);
            next.set_spans(rect.end(Axis::Columns) - end, rect.row_span);
            self.grid.cells_mut().insert(anchor.with(Axis::Columns, end), next);
            self.log(
                "table.span_split",
                &[
                    ("col", anchor.col as i64),
                    ("row", anchor.row as i64),
                    ("edge", 2),
                    ("at", end as i64),
                ],
            );
            if self.grid.adjust_spanned_cells_width() {
                let grow = self
                    .grid
                    .grow_spanned_width(SpanRect::new(anchor, kept, rect.row_span));
                if grow > Pt::ZERO {
                    self.log(
                        "table.column_grow",
                        &[("column", end as i64 - 1), ("grow_milli", grow.to_milli_i64())],
                    );
                }
            }
        }
        if !rects.is_empty() {
            self.grid.invalidate();
        }
    }

    fn finish(&mut self) {
        self.flush_advance();
        self.done = true;
        if let Some(debug) = self.debug.as_ref() {
            debug.emit_summary("table.paginate");
            debug.flush();
        }
        if let Some(perf) = self.perf.as_ref() {
            perf.log_counts(
                "table.paginate",
                self.grid.id(),
                &[("fragments", self.emitted as u64)],
            );
            perf.flush();
        }
    }
}

impl<C: PageCompositor + ?Sized> Iterator for Paginator<'_, C> {
    type Item = PageFragment;

    fn next(&mut self) -> Option<PageFragment> {
        if self.done {
            return None;
        }
        if self.compositor.is_aborted() {
            self.log("table.paginate.aborted", &[("fragments", self.emitted as i64)]);
            self.finish();
            return None;
        }
        let started = perf_start(self.perf.as_ref());
        let window = match self.strategy {
            LayoutStrategy::AcrossThenDown => self.next_across_then_down(),
            LayoutStrategy::DownThenAcross => self.next_down_then_across(),
            LayoutStrategy::Wrapped => self.next_wrapped(),
        };
        let Some(window) = window else {
            self.finish();
            return None;
        };
        let fragment = self.emit(window);
        perf_end(
            self.perf.as_ref(),
            "table.paginate.fragment",
            self.grid.id(),
            started,
        );
        Some(fragment)
    }
}

impl<C: PageCompositor + ?Sized> std::iter::FusedIterator for Paginator<'_, C> {}

/// New anchor carrying on `cell` past a fragment edge. Its value stays with
/// the original so aggregates count it once.
fn continuation(cell: &Cell, payload: Box<dyn CellContent>) -> Cell {
    let mut next = cell.clone();
    next.value = CellValue::Empty;
    next.set_content(payload);
    next
}

fn emptied(content: &dyn CellContent) -> Box<dyn CellContent> {
    let mut empty = content.clone_box();
    empty.clear();
    empty
}

/// Offset and visible extent of `rect` along `axis`, or `None` when its
/// anchor is outside both the replayed headers and the window.
fn place(
    grid: &Grid,
    axis: Axis,
    rect: &SpanRect,
    headers: &Range<usize>,
    window: &Range<usize>,
    header_extent: Pt,
) -> Option<(Pt, Pt, bool)> {
    let start = rect.start(axis);
    let (segment, offset, header) = if headers.contains(&start) {
        (
            headers,
            grid.tracks_size(axis, headers.start, start - headers.start),
            true,
        )
    } else if window.contains(&start) {
        (
            window,
            header_extent + grid.tracks_size(axis, window.start, start - window.start),
            false,
        )
    } else {
        return None;
    };
    let visible = rect.end(axis).min(segment.end) - start;
    Some((offset, grid.tracks_size(axis, start, visible), header))
}

fn snapshot(
    grid: &Grid,
    rows: &Range<usize>,
    columns: &Range<usize>,
    header_rows: &Range<usize>,
    header_columns: &Range<usize>,
) -> Vec<CellSnapshot> {
    let header_height = grid.tracks_size(Axis::Rows, header_rows.start, header_rows.len());
    let header_width = grid.tracks_size(Axis::Columns, header_columns.start, header_columns.len());
    let mut cells = Vec::new();
    for rect in grid.span_index().rects() {
        let Some((y, height, header_row)) =
            place(grid, Axis::Rows, rect, header_rows, rows, header_height)
        else {
            continue;
        };
        let Some((x, width, header_col)) =
            place(grid, Axis::Columns, rect, header_columns, columns, header_width)
        else {
            continue;
        };
        let Some(cell) = grid.cell_at(rect.anchor.col, rect.anchor.row) else {
            continue;
        };
        cells.push(CellSnapshot {
            address: rect.anchor,
            col_span: rect.col_span,
            row_span: rect.row_span,
            text: cell.display_text(),
            style: cell.style().clone(),
            rect: Rect::new(x, y, width, height),
            header: header_row || header_col,
        });
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::BlockContent;
    use crate::page_flow::PageFlow;
    use crate::page_template::PageTemplate;
    use crate::style::Padding;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flow(width: i32, height: i32) -> PageFlow {
        PageFlow::new(vec![PageTemplate::new(
            "page",
            Size::new(Pt::from_i32(width), Pt::from_i32(height)),
        )])
        .unwrap()
    }

    /// Default tracks: 60pt columns, 20pt rows.
    fn grid(cols: usize, rows: usize) -> Grid {
        Grid::with_size(cols, rows)
    }

    fn plain_style(grid: &mut Grid) -> Arc<Style> {
        grid.style(Style {
            font_size: Pt::from_i32(10),
            padding: Padding::default(),
            ..Style::default()
        })
    }

    fn assert_complete(rows: usize, cols: usize, fragments: &[PageFragment]) {
        let mut hits = vec![0usize; rows * cols];
        for fragment in fragments {
            for row in fragment.rows.clone() {
                for col in fragment.columns.clone() {
                    hits[row * cols + col] += 1;
                }
            }
        }
        for (idx, hit) in hits.iter().enumerate() {
            assert_eq!(*hit, 1, "cell ({}, {}) placed {hit} times", idx % cols, idx / cols);
        }
    }

    #[test]
    fn every_strategy_places_each_cell_once() {
        for strategy in [
            LayoutStrategy::AcrossThenDown,
            LayoutStrategy::DownThenAcross,
            LayoutStrategy::Wrapped,
        ] {
            for fixed in [0, 1] {
                let mut g = grid(5, 12);
                g.set_fixed(fixed, fixed);
                let mut pages = flow(130, 100);
                let fragments: Vec<PageFragment> =
                    Paginator::new(&mut g, &mut pages, strategy).collect();
                assert_complete(12, 5, &fragments);
            }
        }
    }

    #[test]
    fn every_strategy_places_spanned_cells_once_with_headers() {
        let spans = [
            (CellAddress::new(1, 2), 2, 3, "wide"),
            (CellAddress::new(3, 4), 2, 5, "tall"),
            (CellAddress::new(1, 8), 1, 3, "low"),
        ];
        for strategy in [
            LayoutStrategy::AcrossThenDown,
            LayoutStrategy::DownThenAcross,
            LayoutStrategy::Wrapped,
        ] {
            for fixed in [0, 1] {
                let mut g = grid(5, 12);
                g.set_fixed(fixed, fixed);
                let style = plain_style(&mut g);
                for (at, cols, rows, text) in spans {
                    g.set_cell(at, Cell::text(text, style.clone())).unwrap();
                    g.set_span(at, cols, rows).unwrap();
                }
                let mut pages = flow(130, 100);
                let fragments: Vec<PageFragment> =
                    Paginator::new(&mut g, &mut pages, strategy).collect();
                assert_complete(12, 5, &fragments);

                for fragment in &fragments {
                    if fixed == 1 && fragment.rows.start > 0 {
                        assert_eq!(fragment.header_rows, 0..1, "{strategy:?}");
                    }
                    for cell in fragment.cells.iter().filter(|c| !c.header) {
                        let at = cell.address;
                        assert!(fragment.rows.contains(&at.row), "{strategy:?} {at:?}");
                        assert!(fragment.columns.contains(&at.col), "{strategy:?} {at:?}");
                        assert!(at.row + cell.row_span <= fragment.rows.end, "{strategy:?} {at:?}");
                        assert!(
                            at.col + cell.col_span <= fragment.columns.end,
                            "{strategy:?} {at:?}"
                        );
                    }
                }
                for (at, _, _, text) in spans {
                    let drawn: Vec<&CellSnapshot> = fragments
                        .iter()
                        .filter_map(|f| f.cell(at).filter(|c| !c.header))
                        .collect();
                    assert_eq!(drawn.len(), 1, "{strategy:?} fixed={fixed} {at:?}");
                    assert_eq!(drawn[0].text, text);
                }
            }
        }
    }

    #[test]
    fn across_then_down_gives_each_column_band_a_page() {
        let mut g = grid(5, 12);
        let mut pages = flow(130, 100);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        // Row bands of 5, 5, 2; column bands of 2, 2, 1.
        assert_eq!(fragments.len(), 9);
        let pages_seen: Vec<usize> = fragments.iter().map(|f| f.page).collect();
        assert_eq!(pages_seen, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(fragments[1].rows, 0..5);
        assert_eq!(fragments[1].columns, 2..4);
        assert_eq!(fragments[3].rows, 5..10);
        assert_eq!(fragments[3].columns, 0..2);
    }

    #[test]
    fn spanned_cell_is_broken_at_the_fragment_end() {
        let mut g = grid(1, 5);
        let style = plain_style(&mut g);
        g.set_cell(CellAddress::new(0, 0), Cell::text("a\nb\nc\nd\ne", style))
            .unwrap();
        g.set_span(CellAddress::new(0, 0), 1, 3).unwrap();
        let mut pages = flow(100, 40);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();

        assert_eq!(fragments[0].rows, 0..2);
        let kept = fragments[0].cell(CellAddress::new(0, 0)).unwrap();
        assert_eq!(kept.text, "a\nb\nc");
        assert_eq!(kept.row_span, 2);
        assert_eq!(kept.rect.height, Pt::from_i32(40));

        let anchor = g.cell_at(0, 0).unwrap();
        assert_eq!(anchor.row_span(), 2);
        let rest = g.cell_at(0, 2).unwrap();
        assert_eq!(rest.row_span(), 1);
        assert_eq!(rest.display_text(), "d\ne");
        // Two 12pt lines do not fit a 20pt row; the row grows.
        assert_eq!(g.row(2).unwrap().height(), Pt::from_i32(24));

        assert_eq!(fragments[1].rows, 2..3);
        assert_eq!(fragments[1].cell(CellAddress::new(0, 2)).unwrap().text, "d\ne");
        assert_complete(5, 1, &fragments);
    }

    #[test]
    fn window_opening_inside_a_span_gets_continuation_anchors() {
        let mut g = grid(2, 5);
        let style = plain_style(&mut g);
        g.set_cell(CellAddress::new(0, 0), Cell::number(7.0, style))
            .unwrap();
        g.set_span(CellAddress::new(0, 0), 2, 4).unwrap();
        let mut pages = flow(200, 200);
        let mut paginator = Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown);
        paginator.split_start_edge(Axis::Rows, &(2..5), &(0..2));
        paginator.split_start_edge(Axis::Columns, &(2..5), &(1..2));
        drop(paginator);

        let anchor = g.cell_at(0, 0).unwrap();
        assert_eq!((anchor.col_span(), anchor.row_span()), (2, 2));
        assert_eq!(anchor.value, CellValue::Number(7.0));

        let below = g.cell_at(0, 2).unwrap();
        assert_eq!((below.col_span(), below.row_span()), (1, 2));
        assert_eq!(below.value, CellValue::Empty);
        assert_eq!(below.display_text(), "7");

        let beside = g.cell_at(1, 2).unwrap();
        assert_eq!((beside.col_span(), beside.row_span()), (1, 2));
        assert_eq!(beside.display_text(), "7");
        assert_eq!(g.effective_cell_at(1, 3).unwrap().0, CellAddress::new(1, 2));
        assert_eq!(g.effective_cell_at(1, 1).unwrap().0, CellAddress::new(0, 0));
    }

    #[test]
    fn unbreakable_row_keeps_payload_with_anchor() {
        let mut g = grid(1, 4);
        let style = plain_style(&mut g);
        g.set_cell(CellAddress::new(0, 0), Cell::text("a\nb\nc\nd\ne", style))
            .unwrap();
        g.set_span(CellAddress::new(0, 0), 1, 3).unwrap();
        g.row_mut(1).unwrap().can_break = false;
        let mut pages = flow(100, 40);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments[0].rows, 0..2);
        assert_eq!(g.cell_at(0, 0).unwrap().display_text(), "a\nb\nc\nd\ne");
        assert_eq!(g.cell_at(0, 2).unwrap().display_text(), "");
        assert_eq!(g.row(2).unwrap().height(), Pt::from_i32(20));
    }

    #[test]
    fn unsplittable_payload_moves_to_the_continuation() {
        let mut g = grid(1, 2);
        let style = g.styles().default_style();
        let block = BlockContent::new("logo", Size::new(Pt::from_i32(10), Pt::from_i32(50)));
        g.set_cell(
            CellAddress::new(0, 0),
            Cell::new(style).with_content(Box::new(block)),
        )
        .unwrap();
        g.set_span(CellAddress::new(0, 0), 1, 2).unwrap();
        let mut pages = flow(100, 20);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments.len(), 2);
        assert!(g.cell_at(0, 0).unwrap().content().is_empty());
        let moved = g.cell_at(0, 1).unwrap();
        assert_eq!(moved.content().measure(Pt::ZERO).height, Pt::from_i32(50));
        assert_eq!(g.row(1).unwrap().height(), Pt::from_i32(50));
        // Taller than any page, so it is forced onto the next one.
        assert_eq!(fragments[1].page, 2);
        assert_eq!(fragments[1].rows, 1..2);
    }

    #[test]
    fn header_rows_are_replayed_on_later_fragments() {
        let mut g = grid(2, 6);
        g.set_fixed(0, 1);
        g.set_text(0, 0, "H").unwrap();
        g.set_text(1, 0, "H2").unwrap();
        g.set_text(0, 4, "x").unwrap();
        let mut pages = flow(200, 60);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].rows, 0..3);
        assert!(fragments[0].header_rows.is_empty());
        assert_eq!(fragments[1].rows, 3..5);
        assert_eq!(fragments[1].header_rows, 0..1);
        assert_eq!(fragments[1].size.height, Pt::from_i32(60));
        let header = fragments[1].cell(CellAddress::new(0, 0)).unwrap();
        assert!(header.header);
        assert_eq!(header.rect.y, Pt::ZERO);
        let body = fragments[1].cell(CellAddress::new(0, 4)).unwrap();
        assert!(!body.header);
        assert_eq!(body.rect.y, Pt::from_i32(40));
        assert_eq!(fragments[2].rows, 5..6);
    }

    #[test]
    fn oversized_rows_are_forced_one_per_page() {
        let mut g = grid(1, 2);
        for row in 0..2 {
            g.row_mut(row).unwrap().track.size = Pt::from_i32(200);
        }
        let mut pages = flow(100, 100);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!((fragments[0].page, fragments[0].rows.clone()), (1, 0..1));
        assert_eq!((fragments[1].page, fragments[1].rows.clone()), (2, 1..2));
    }

    #[test]
    fn header_that_does_not_fit_defers_to_next_region() {
        let mut g = grid(1, 3);
        g.row_mut(0).unwrap().track.size = Pt::from_i32(50);
        g.set_fixed(0, 1);
        let mut pages = flow(100, 100);
        pages.advance(Pt::from_i32(70));
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].page, 2);
        assert_eq!(fragments[0].rows, 0..3);
    }

    #[test]
    fn down_then_across_places_narrow_band_beside_previous() {
        let mut g = grid(4, 2);
        g.column_mut(2).unwrap().track.page_break = true;
        let mut pages = flow(250, 100);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::DownThenAcross).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].columns, 0..2);
        assert_eq!(fragments[1].columns, 2..4);
        assert_eq!(fragments[1].page, 1);
        assert_eq!(fragments[1].x, Pt::from_i32(120));
        assert_eq!(fragments[1].y, Pt::ZERO);
        // The deferred advance lands once, after the last band.
        assert_eq!(pages.cursor().used, Pt::from_i32(40));
    }

    #[test]
    fn down_then_across_pages_tall_bands() {
        let mut g = grid(3, 8);
        let mut pages = flow(130, 100);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::DownThenAcross).collect();
        let windows: Vec<(Range<usize>, Range<usize>, usize)> = fragments
            .iter()
            .map(|f| (f.columns.clone(), f.rows.clone(), f.page))
            .collect();
        assert_eq!(
            windows,
            vec![(0..2, 0..5, 1), (0..2, 5..8, 2), (2..3, 0..5, 3), (2..3, 5..8, 4)]
        );
    }

    #[test]
    fn wrapped_bands_stack_with_gap() {
        let mut g = grid(4, 3);
        let mut pages = flow(130, 200);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::Wrapped)
                .with_wrapped_gap(Pt::from_i32(10))
                .collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].y, Pt::ZERO);
        assert_eq!(fragments[1].y, Pt::from_i32(70));
        assert_eq!(fragments[1].page, 1);
        assert_eq!(fragments[1].columns, 2..4);
    }

    #[test]
    fn spanned_columns_split_and_grow_when_enabled() {
        let mut g = grid(3, 1);
        g.set_adjust_spanned_cells_width(true);
        g.set_text(1, 0, "abcdefghijklmn").unwrap();
        g.set_span(CellAddress::new(1, 0), 2, 1).unwrap();
        let mut pages = flow(130, 100);
        let fragments: Vec<PageFragment> =
            Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).collect();
        assert_eq!(fragments[0].columns, 0..2);
        assert_eq!(g.cell_at(1, 0).unwrap().col_span(), 1);
        let rest = g.cell_at(2, 0).unwrap();
        assert_eq!(rest.display_text(), "abcdefghijklmn");
        assert_eq!(rest.value, CellValue::Empty);
        // 14 chars at 5pt plus 4pt padding.
        assert_eq!(g.column(1).unwrap().width(), Pt::from_i32(74));
        assert_eq!(fragments[0].size.width, Pt::from_i32(134));
        assert_complete(1, 3, &fragments);
    }

    #[test]
    fn abort_flag_stops_the_iterator() {
        let mut g = grid(1, 4);
        for row in 0..4 {
            g.row_mut(row).unwrap().track.size = Pt::from_i32(60);
        }
        let flag = Arc::new(AtomicBool::new(false));
        let mut pages = flow(100, 100).with_abort_flag(flag.clone());
        let mut paginator = Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown);
        assert!(paginator.next().is_some());
        flag.store(true, Ordering::Relaxed);
        assert!(paginator.next().is_none());
        assert!(paginator.next().is_none());
        assert_eq!(paginator.emitted(), 1);
    }

    #[test]
    fn compositor_records_placements() {
        let mut g = grid(1, 12);
        let mut pages = flow(100, 100);
        let count = Paginator::new(&mut g, &mut pages, LayoutStrategy::AcrossThenDown).count();
        assert_eq!(count, 3);
        assert_eq!(pages.placed().len(), 3);
        assert_eq!(pages.metrics().total_fragments, 3);
        assert_eq!(pages.page_count(), 3);
        assert_eq!(pages.metrics().pages[0].fragment_count, 1);
    }
}

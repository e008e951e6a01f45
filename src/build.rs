use crate::debug::DebugLogger;
use crate::error::GridFlowError;
use crate::grid::{Axis, Cell, CellAddress, CellSupplier, Grid, SpanRect};
use crate::perf::{PerfLogger, perf_end, perf_start};
use std::collections::HashMap;
use std::time::Instant;

/// Bookkeeping for one dynamic table build.
///
/// The major axis is the one the table grows along (rows when `emit_row`
/// came first). A group is a run of consecutive major emissions; minor
/// emissions copy template cells into every track of the current group.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    priority: Option<Axis>,
    group: Vec<usize>,
    group_open: bool,
    minor_cursor: usize,
    page_break_pending: bool,
    /// Template anchor -> result anchor, scoped to the current group.
    minor_spans: HashMap<CellAddress, CellAddress>,
    /// Template anchor -> result anchor, kept across groups.
    major_spans: HashMap<CellAddress, CellAddress>,
    major_sources: Vec<usize>,
    minor_sources: Vec<usize>,
}

impl BuildState {
    /// `None` until the first emission (or [`IncrementalBuild::with_priority`]).
    pub fn priority(&self) -> Option<Axis> {
        self.priority
    }

    /// Result indices of the major tracks in the current group.
    pub fn group(&self) -> &[usize] {
        &self.group
    }

    pub fn minor_cursor(&self) -> usize {
        self.minor_cursor
    }

    pub fn page_break_pending(&self) -> bool {
        self.page_break_pending
    }
}

fn address(major_axis: Axis, major: usize, minor: usize) -> CellAddress {
    match major_axis {
        Axis::Rows => CellAddress::new(minor, major),
        Axis::Columns => CellAddress::new(major, minor),
    }
}

fn grown(rect: &SpanRect, axis: Axis) -> (usize, usize) {
    match axis {
        Axis::Rows => (rect.col_span, rect.row_span + 1),
        Axis::Columns => (rect.col_span + 1, rect.row_span),
    }
}

/// Grows a result grid from a template by explicit `emit_row` /
/// `emit_column` calls.
pub struct IncrementalBuild<'t> {
    template: &'t Grid,
    result: Grid,
    state: BuildState,
    supplier: Option<Box<dyn CellSupplier + 't>>,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
    started: Option<Instant>,
}

impl<'t> IncrementalBuild<'t> {
    pub fn new(template: &'t Grid) -> Self {
        let mut result = Grid::new();
        result.set_repeat_headers(template.repeat_headers());
        result.set_adjust_spanned_cells_width(template.adjust_spanned_cells_width());
        Self {
            template,
            result,
            state: BuildState::default(),
            supplier: None,
            debug: None,
            perf: None,
            started: None,
        }
    }

    /// Fixes the major axis before the first emission.
    pub fn with_priority(mut self, axis: Axis) -> Self {
        self.state.priority.get_or_insert(axis);
        self
    }

    /// Hook run once on every copied cell.
    pub fn with_supplier(mut self, supplier: impl CellSupplier + 't) -> Self {
        self.supplier = Some(Box::new(supplier));
        self
    }

    pub(crate) fn with_logs(mut self, debug: Option<DebugLogger>, perf: Option<PerfLogger>) -> Self {
        self.started = perf_start(perf.as_ref());
        self.debug = debug;
        self.perf = perf;
        self
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn result(&self) -> &Grid {
        &self.result
    }

    pub fn emit_row(&mut self, template_row: usize) -> Result<(), GridFlowError> {
        self.emit(Axis::Rows, template_row)
    }

    pub fn emit_column(&mut self, template_column: usize) -> Result<(), GridFlowError> {
        self.emit(Axis::Columns, template_column)
    }

    /// Emits every template row in order.
    pub fn emit_rows(&mut self) -> Result<(), GridFlowError> {
        for row in 0..self.template.row_count() {
            self.emit_row(row)?;
        }
        Ok(())
    }

    pub fn emit_columns(&mut self) -> Result<(), GridFlowError> {
        for column in 0..self.template.column_count() {
            self.emit_column(column)?;
        }
        Ok(())
    }

    /// The next emitted row or column starts a new page.
    pub fn mark_page_break(&mut self) {
        self.state.page_break_pending = true;
    }

    /// Hands back the result grid. Leading tracks copied from template
    /// headers become the result's headers.
    pub fn finish(mut self) -> Grid {
        let major = self.state.priority.unwrap_or(Axis::Rows);
        let leading = |sources: &[usize], fixed: usize| {
            sources.iter().take_while(|&&source| source < fixed).count()
        };
        let fixed_major = leading(&self.state.major_sources, self.template.fixed(major));
        let fixed_minor = leading(&self.state.minor_sources, self.template.fixed(major.other()));
        match major {
            Axis::Rows => self.result.set_fixed(fixed_minor, fixed_major),
            Axis::Columns => self.result.set_fixed(fixed_major, fixed_minor),
        }
        let table_id = self.result.id();
        self.log(
            "table.build.finish",
            &[
                ("rows", self.result.row_count() as i64),
                ("columns", self.result.column_count() as i64),
                ("cells", self.result.cell_count() as i64),
            ],
        );
        if let Some(debug) = self.debug.as_ref() {
            debug.emit_summary("table.build");
            debug.flush();
        }
        perf_end(self.perf.as_ref(), "table.build.finish", table_id, self.started);
        self.result
    }

    fn log(&self, kind: &str, fields: &[(&str, i64)]) {
        if let Some(debug) = self.debug.as_ref() {
            debug.log_event(kind, self.result.id(), fields);
        }
    }

    fn emit(&mut self, axis: Axis, index: usize) -> Result<(), GridFlowError> {
        let len = self.template.len(axis);
        if index >= len {
            return Err(GridFlowError::OutOfBounds { axis, index, len });
        }
        let major = *self.state.priority.get_or_insert(axis);
        if axis == major {
            self.emit_major(major, index);
            Ok(())
        } else {
            self.emit_minor(major, index)
        }
    }

    fn emit_major(&mut self, major: Axis, index: usize) {
        let result_index = match major {
            Axis::Rows => {
                let mut row = self.template.rows()[index].clone();
                row.track.page_break |= std::mem::take(&mut self.state.page_break_pending);
                self.result.add_row(row)
            }
            Axis::Columns => {
                let mut column = self.template.columns()[index].clone();
                column.track.page_break |= std::mem::take(&mut self.state.page_break_pending);
                self.result.add_column(column)
            }
        };
        if !self.state.group_open {
            self.state.group.clear();
        }
        self.state.minor_spans.clear();
        self.state.group.push(result_index);
        self.state.group_open = true;
        self.state.major_sources.push(index);
        self.log(
            "table.build.major",
            &[("template", index as i64), ("result", result_index as i64)],
        );
    }

    fn emit_minor(&mut self, major: Axis, index: usize) -> Result<(), GridFlowError> {
        if self.state.group.is_empty() {
            return Err(GridFlowError::IncrementalBuildNotStarted { axis: major });
        }
        let minor = major.other();
        if self.state.group_open {
            self.state.minor_cursor = 0;
            self.state.group_open = false;
        } else {
            self.state.minor_cursor += 1;
        }
        let cursor = self.state.minor_cursor;
        let stamp = std::mem::take(&mut self.state.page_break_pending);
        if cursor >= self.result.len(minor) {
            match minor {
                Axis::Rows => {
                    self.result.add_row(self.template.rows()[index].clone());
                }
                Axis::Columns => {
                    self.result.add_column(self.template.columns()[index].clone());
                }
            }
            self.state.minor_sources.push(index);
        }
        if stamp {
            self.result.track_mut(minor, cursor).page_break = true;
        }
        self.log(
            "table.build.minor",
            &[("template", index as i64), ("result", cursor as i64)],
        );

        let group = self.state.group.clone();
        for result_major in group {
            let template_major = self.state.major_sources[result_major];
            let from = address(major, template_major, index);
            let to = address(major, result_major, cursor);
            self.copy_cell(major, from, to);
        }
        Ok(())
    }

    fn copy_cell(&mut self, major: Axis, from: CellAddress, to: CellAddress) {
        let template = self.template;
        let Some((anchor, cell)) = template.effective_cell_at(from.col, from.row) else {
            return;
        };
        if anchor == from {
            let Some(cell) = cell else {
                return;
            };
            let spanned = cell.col_span() > 1 || cell.row_span() > 1;
            self.place_copy(cell, from, to);
            if spanned {
                self.state.minor_spans.insert(from, to);
                self.state.major_spans.insert(from, to);
            }
            return;
        }

        let minor = major.other();
        let tracked = [
            self.state.minor_spans.get(&anchor).copied(),
            self.state.major_spans.get(&anchor).copied(),
        ];
        for result_anchor in tracked.into_iter().flatten() {
            let Some(result_cell) = self.result.cell_at(result_anchor.col, result_anchor.row) else {
                continue;
            };
            let rect = SpanRect::new(result_anchor, result_cell.col_span(), result_cell.row_span());
            if rect.contains(to) {
                return;
            }
            let (col_span, row_span) = if to.get(minor) == rect.end(minor)
                && rect.range(major).contains(&to.get(major))
            {
                grown(&rect, minor)
            } else if to.get(major) == rect.end(major) && rect.range(minor).contains(&to.get(minor))
            {
                grown(&rect, major)
            } else {
                continue;
            };
            match self.result.set_span(result_anchor, col_span, row_span) {
                Ok(()) => {
                    self.log(
                        "table.build.span_extend",
                        &[
                            ("col", result_anchor.col as i64),
                            ("row", result_anchor.row as i64),
                            ("col_span", col_span as i64),
                            ("row_span", row_span as i64),
                        ],
                    );
                    return;
                }
                Err(_) => {
                    self.log(
                        "table.build.span_fallback",
                        &[("col", to.col as i64), ("row", to.row as i64)],
                    );
                    break;
                }
            }
        }

        // Not adjacent to anything tracked: copy whatever the template stores
        // beneath its span as a plain cell.
        if let Some(raw) = template.cell_at(from.col, from.row) {
            self.place_copy(raw, from, to);
        }
    }

    fn place_copy(&mut self, cell: &Cell, from: CellAddress, to: CellAddress) {
        let mut copy = cell.clone();
        copy.set_spans(1, 1);
        copy.set_origin(Some(from));
        let style = self.result.styles_mut().add_shared(cell.style());
        copy.set_style(style);
        if let Some(supplier) = self.supplier.as_mut() {
            supplier.populate(from, &mut copy);
        }
        if self.result.set_cell(to, copy).is_err() {
            self.log(
                "table.build.cell_skipped",
                &[("col", to.col as i64), ("row", to.row as i64)],
            );
        }
    }
}

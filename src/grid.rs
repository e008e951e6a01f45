use crate::content::{CellContent, TextContent, TextMetrics};
use crate::error::GridFlowError;
use crate::style::{Style, StyleCache};
use crate::types::Pt;
use rayon::prelude::*;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Rows,
    Columns,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::Rows => Axis::Columns,
            Axis::Columns => Axis::Rows,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Rows => "rows",
            Axis::Columns => "columns",
        }
    }

    pub fn item_name(self) -> &'static str {
        match self {
            Axis::Rows => "row",
            Axis::Columns => "column",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub col: usize,
    pub row: usize,
}

impl CellAddress {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    pub fn get(self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.row,
            Axis::Columns => self.col,
        }
    }

    pub fn with(self, axis: Axis, value: usize) -> Self {
        match axis {
            Axis::Rows => Self {
                row: value,
                ..self
            },
            Axis::Columns => Self {
                col: value,
                ..self
            },
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Rectangle owned by an anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanRect {
    pub anchor: CellAddress,
    pub col_span: usize,
    pub row_span: usize,
}

impl SpanRect {
    pub fn new(anchor: CellAddress, col_span: usize, row_span: usize) -> Self {
        Self {
            anchor,
            col_span,
            row_span,
        }
    }

    pub fn start(&self, axis: Axis) -> usize {
        self.anchor.get(axis)
    }

    pub fn span(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.row_span,
            Axis::Columns => self.col_span,
        }
    }

    pub fn end(&self, axis: Axis) -> usize {
        self.start(axis) + self.span(axis)
    }

    pub fn range(&self, axis: Axis) -> Range<usize> {
        self.start(axis)..self.end(axis)
    }

    pub fn is_spanned(&self) -> bool {
        self.col_span > 1 || self.row_span > 1
    }

    pub fn contains(&self, address: CellAddress) -> bool {
        self.range(Axis::Columns).contains(&address.col)
            && self.range(Axis::Rows).contains(&address.row)
    }

    pub fn overlaps(&self, other: &SpanRect) -> bool {
        ranges_overlap(&self.range(Axis::Columns), &other.range(Axis::Columns))
            && ranges_overlap(&self.range(Axis::Rows), &other.range(Axis::Rows))
    }

    pub fn intersects(&self, cols: &Range<usize>, rows: &Range<usize>) -> bool {
        ranges_overlap(&self.range(Axis::Columns), cols)
            && ranges_overlap(&self.range(Axis::Rows), rows)
    }
}

pub(crate) fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Sizing and flow properties shared by rows and columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub size: Pt,
    pub min_size: Pt,
    /// Zero means unbounded.
    pub max_size: Pt,
    pub auto_size: bool,
    /// Start a new fragment before this track.
    pub page_break: bool,
    /// Number of tracks, starting here, that must stay on one fragment.
    pub keep_count: usize,
}

impl Track {
    pub fn new(size: Pt) -> Self {
        Self {
            size,
            min_size: Pt::ZERO,
            max_size: Pt::ZERO,
            auto_size: false,
            page_break: false,
            keep_count: 1,
        }
    }

    pub fn clamped(&self, size: Pt) -> Pt {
        size.clamp_to(self.min_size, self.max_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub track: Track,
    /// Cell content in this row may be split across fragments.
    pub can_break: bool,
}

impl Row {
    pub fn new(height: Pt) -> Self {
        Self {
            track: Track::new(height),
            can_break: true,
        }
    }

    pub fn auto(min_height: Pt) -> Self {
        let mut row = Self::new(min_height);
        row.track.auto_size = true;
        row.track.min_size = min_height;
        row
    }

    pub fn height(&self) -> Pt {
        self.track.size
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new(Pt::from_i32(20))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub track: Track,
}

impl Column {
    pub fn new(width: Pt) -> Self {
        Self {
            track: Track::new(width),
        }
    }

    pub fn auto(min_width: Pt) -> Self {
        let mut column = Self::new(min_width);
        column.track.auto_size = true;
        column.track.min_size = min_width;
        column
    }

    pub fn width(&self) -> Pt {
        self.track.size
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new(Pt::from_i32(60))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Numbers, or text that reads as a number (`"$1,234.56"` included).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Empty => None,
            CellValue::Number(value) => Some(*value),
            CellValue::Text(text) => crate::aggregate::parse_number(text),
        }
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(value) => value.to_string(),
            CellValue::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub value: CellValue,
    content: Box<dyn CellContent>,
    col_span: usize,
    row_span: usize,
    style: Arc<Style>,
    origin: Option<CellAddress>,
}

impl Cell {
    pub fn new(style: Arc<Style>) -> Self {
        let metrics = TextMetrics::from_style(&style);
        Self {
            value: CellValue::Empty,
            content: Box::new(TextContent::new(String::new(), metrics)),
            col_span: 1,
            row_span: 1,
            style,
            origin: None,
        }
    }

    pub fn text(text: impl Into<String>, style: Arc<Style>) -> Self {
        let mut cell = Self::new(style);
        cell.set_text(text);
        cell
    }

    pub fn number(value: f64, style: Arc<Style>) -> Self {
        let mut cell = Self::new(style);
        cell.set_value(CellValue::Number(value));
        cell
    }

    pub fn with_content(mut self, content: Box<dyn CellContent>) -> Self {
        self.content = content;
        self
    }

    /// Replaces value and payload with plain text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.content = Box::new(TextContent::new(
            text.clone(),
            TextMetrics::from_style(&self.style),
        ));
        self.value = CellValue::Text(text);
    }

    /// Sets the value and shows its display text.
    pub fn set_value(&mut self, value: CellValue) {
        self.content = Box::new(TextContent::new(
            value.display(),
            TextMetrics::from_style(&self.style),
        ));
        self.value = value;
    }

    pub fn content(&self) -> &dyn CellContent {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> &mut Box<dyn CellContent> {
        &mut self.content
    }

    pub fn set_content(&mut self, content: Box<dyn CellContent>) {
        self.content = content;
    }

    /// No value and no payload.
    pub fn is_blank(&self) -> bool {
        let no_value = match &self.value {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            CellValue::Number(_) => false,
        };
        no_value && self.content.is_empty()
    }

    pub fn display_text(&self) -> String {
        match self.content.text() {
            Some(text) => text.to_string(),
            None => self.value.display(),
        }
    }

    pub fn col_span(&self) -> usize {
        self.col_span
    }

    pub fn row_span(&self) -> usize {
        self.row_span
    }

    pub fn span(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.row_span,
            Axis::Columns => self.col_span,
        }
    }

    pub(crate) fn set_spans(&mut self, col_span: usize, row_span: usize) {
        self.col_span = col_span.max(1);
        self.row_span = row_span.max(1);
    }

    pub(crate) fn set_axis_span(&mut self, axis: Axis, span: usize) {
        match axis {
            Axis::Rows => self.row_span = span.max(1),
            Axis::Columns => self.col_span = span.max(1),
        }
    }

    pub fn style(&self) -> &Arc<Style> {
        &self.style
    }

    pub fn set_style(&mut self, style: Arc<Style>) {
        self.style = style;
    }

    /// Template address this cell was copied from, for dynamic tables.
    pub fn origin(&self) -> Option<CellAddress> {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: Option<CellAddress>) {
        self.origin = origin;
    }
}

/// Host hook that fills a cell's value and payload once per print pass.
pub trait CellSupplier {
    fn populate(&mut self, source: CellAddress, cell: &mut Cell);
}

impl<F> CellSupplier for F
where
    F: FnMut(CellAddress, &mut Cell),
{
    fn populate(&mut self, source: CellAddress, cell: &mut Cell) {
        self(source, cell)
    }
}

/// Derived view of every anchor rectangle and which rectangle owns each
/// address.
#[derive(Debug, Clone)]
pub struct SpanIndex {
    rects: Vec<SpanRect>,
    owner: Vec<u32>,
    columns: usize,
}

impl SpanIndex {
    fn build(columns: usize, rows: usize, cells: &HashMap<CellAddress, Cell>) -> Self {
        let mut addresses: Vec<CellAddress> = cells.keys().copied().collect();
        addresses.sort_by_key(|a| (a.row, a.col));
        let mut claimed = vec![false; columns * rows];
        let mut rects = Vec::with_capacity(addresses.len());

        // Multi-cell rectangles claim their area first so the covered
        // leftovers stored beneath them do not register as anchors.
        for address in addresses.iter().copied() {
            let cell = &cells[&address];
            if cell.col_span == 1 && cell.row_span == 1 {
                continue;
            }
            if claimed[address.row * columns + address.col] {
                continue;
            }
            let rect = SpanRect::new(address, cell.col_span, cell.row_span);
            for row in rect.range(Axis::Rows) {
                for col in rect.range(Axis::Columns) {
                    claimed[row * columns + col] = true;
                }
            }
            rects.push(rect);
        }
        for address in addresses {
            if !claimed[address.row * columns + address.col] {
                rects.push(SpanRect::new(address, 1, 1));
            }
        }
        rects.sort_by_key(|r| (r.anchor.row, r.anchor.col));

        let mut owner = vec![0u32; columns * rows];
        for (idx, rect) in rects.iter().enumerate() {
            for row in rect.range(Axis::Rows) {
                for col in rect.range(Axis::Columns) {
                    owner[row * columns + col] = idx as u32 + 1;
                }
            }
        }
        Self {
            rects,
            owner,
            columns,
        }
    }

    /// Stored anchors in row-major order, 1x1 anchors included.
    pub fn rects(&self) -> &[SpanRect] {
        &self.rects
    }

    /// Only the rectangles covering more than one address.
    pub fn spanned(&self) -> impl Iterator<Item = &SpanRect> {
        self.rects.iter().filter(|r| r.is_spanned())
    }

    /// Rectangle owning `address`, if a stored anchor covers it.
    pub fn owner_of(&self, address: CellAddress) -> Option<&SpanRect> {
        let slot = address.row * self.columns + address.col;
        match self.owner.get(slot).copied() {
            Some(id) if id > 0 => self.rects.get(id as usize - 1),
            _ => None,
        }
    }
}

static TABLE_COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);

/// Rows x columns of cells with non-overlapping span rectangles.
#[derive(Debug, Clone)]
pub struct Grid {
    id: u32,
    rows: Vec<Row>,
    columns: Vec<Column>,
    cells: HashMap<CellAddress, Cell>,
    fixed_rows: usize,
    fixed_columns: usize,
    repeat_headers: bool,
    adjust_spanned_cells_width: bool,
    styles: StyleCache,
    span_index: OnceCell<SpanIndex>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    pub fn new() -> Self {
        Self {
            id: TABLE_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            rows: Vec::new(),
            columns: Vec::new(),
            cells: HashMap::new(),
            fixed_rows: 0,
            fixed_columns: 0,
            repeat_headers: true,
            adjust_spanned_cells_width: false,
            styles: StyleCache::new(),
            span_index: OnceCell::new(),
        }
    }

    /// Grid of `columns x rows` default-sized tracks and no cells.
    pub fn with_size(columns: usize, rows: usize) -> Self {
        let mut grid = Self::new();
        grid.columns = vec![Column::default(); columns];
        grid.rows = vec![Row::default(); rows];
        grid
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.rows.len(),
            Axis::Columns => self.columns.len(),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub fn track(&self, axis: Axis, index: usize) -> &Track {
        match axis {
            Axis::Rows => &self.rows[index].track,
            Axis::Columns => &self.columns[index].track,
        }
    }

    pub fn track_mut(&mut self, axis: Axis, index: usize) -> &mut Track {
        match axis {
            Axis::Rows => &mut self.rows[index].track,
            Axis::Columns => &mut self.columns[index].track,
        }
    }

    pub fn add_row(&mut self, row: Row) -> usize {
        self.rows.push(row);
        self.invalidate();
        self.rows.len() - 1
    }

    pub fn add_column(&mut self, column: Column) -> usize {
        self.columns.push(column);
        self.invalidate();
        self.columns.len() - 1
    }

    pub fn fixed_rows(&self) -> usize {
        self.fixed_rows
    }

    pub fn fixed_columns(&self) -> usize {
        self.fixed_columns
    }

    pub fn fixed(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.fixed_rows,
            Axis::Columns => self.fixed_columns,
        }
    }

    /// Header rows and columns; clamped to the current grid size.
    pub fn set_fixed(&mut self, fixed_columns: usize, fixed_rows: usize) {
        self.fixed_columns = fixed_columns.min(self.columns.len());
        self.fixed_rows = fixed_rows.min(self.rows.len());
    }

    pub fn repeat_headers(&self) -> bool {
        self.repeat_headers
    }

    pub fn set_repeat_headers(&mut self, repeat: bool) {
        self.repeat_headers = repeat;
    }

    pub fn adjust_spanned_cells_width(&self) -> bool {
        self.adjust_spanned_cells_width
    }

    pub fn set_adjust_spanned_cells_width(&mut self, enabled: bool) {
        self.adjust_spanned_cells_width = enabled;
    }

    pub fn styles(&self) -> &StyleCache {
        &self.styles
    }

    pub fn styles_mut(&mut self) -> &mut StyleCache {
        &mut self.styles
    }

    /// Interns `style` in this grid's cache.
    pub fn style(&mut self, style: Style) -> Arc<Style> {
        self.styles.add(style)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Raw lookup; covered addresses return whatever is stored beneath the span.
    pub fn cell_at(&self, col: usize, row: usize) -> Option<&Cell> {
        self.cells.get(&CellAddress::new(col, row))
    }

    pub fn cell_mut(&mut self, col: usize, row: usize) -> Option<&mut Cell> {
        self.cells.get_mut(&CellAddress::new(col, row))
    }

    /// Anchor owning `(col, row)` and the cell stored there, if any.
    pub fn effective_cell_at(
        &self,
        col: usize,
        row: usize,
    ) -> Option<(CellAddress, Option<&Cell>)> {
        if col >= self.columns.len() || row >= self.rows.len() {
            return None;
        }
        let address = CellAddress::new(col, row);
        let anchor = self
            .span_index()
            .owner_of(address)
            .map(|rect| rect.anchor)
            .unwrap_or(address);
        Some((anchor, self.cells.get(&anchor)))
    }

    /// Stores `cell` at `address`, keeping the spans it carries.
    pub fn set_cell(&mut self, address: CellAddress, cell: Cell) -> Result<(), GridFlowError> {
        self.check_address(address)?;
        self.check_span(address, cell.col_span, cell.row_span)?;
        self.cells.insert(address, cell);
        self.invalidate();
        Ok(())
    }

    pub fn take_cell(&mut self, address: CellAddress) -> Option<Cell> {
        let cell = self.cells.remove(&address);
        if cell.is_some() {
            self.invalidate();
        }
        cell
    }

    /// Convenience for authoring: a text cell in the grid's default style.
    pub fn set_text(&mut self, col: usize, row: usize, text: &str) -> Result<(), GridFlowError> {
        let address = CellAddress::new(col, row);
        self.check_address(address)?;
        self.check_uncovered(address, 1, 1)?;
        let style = self.styles.default_style();
        match self.cells.get_mut(&address) {
            Some(cell) => cell.set_text(text),
            None => {
                self.cells.insert(address, Cell::text(text, style));
                self.invalidate();
            }
        }
        Ok(())
    }

    pub fn set_span(
        &mut self,
        address: CellAddress,
        col_span: usize,
        row_span: usize,
    ) -> Result<(), GridFlowError> {
        self.check_span(address, col_span, row_span)?;
        let style = self.styles.default_style();
        self.cells
            .entry(address)
            .or_insert_with(|| Cell::new(style))
            .set_spans(col_span, row_span);
        self.invalidate();
        Ok(())
    }

    fn check_address(&self, address: CellAddress) -> Result<(), GridFlowError> {
        if address.col >= self.columns.len() {
            return Err(GridFlowError::OutOfBounds {
                axis: Axis::Columns,
                index: address.col,
                len: self.columns.len(),
            });
        }
        if address.row >= self.rows.len() {
            return Err(GridFlowError::OutOfBounds {
                axis: Axis::Rows,
                index: address.row,
                len: self.rows.len(),
            });
        }
        Ok(())
    }

    fn check_span(
        &self,
        address: CellAddress,
        col_span: usize,
        row_span: usize,
    ) -> Result<(), GridFlowError> {
        let invalid = |reason| GridFlowError::InvalidSpan {
            address,
            col_span,
            row_span,
            reason,
        };
        if col_span == 0 || row_span == 0 {
            return Err(invalid("spans must be at least 1"));
        }
        if address.col + col_span > self.columns.len() || address.row + row_span > self.rows.len()
        {
            return Err(invalid("rectangle exceeds the grid"));
        }
        let rect = SpanRect::new(address, col_span, row_span);
        self.check_uncovered(address, col_span, row_span)?;
        let overlapping = self
            .span_index()
            .spanned()
            .any(|other| other.anchor != address && other.overlaps(&rect));
        if overlapping {
            return Err(invalid("rectangle overlaps another span"));
        }
        // Blank placeholders may end up beneath a span; content may not.
        let hides_content = rect.range(Axis::Rows).any(|row| {
            rect.range(Axis::Columns).any(|col| {
                let at = CellAddress::new(col, row);
                at != address && self.cells.get(&at).is_some_and(|cell| !cell.is_blank())
            })
        });
        if hides_content {
            return Err(invalid("rectangle would hide a stored cell"));
        }
        Ok(())
    }

    fn check_uncovered(
        &self,
        address: CellAddress,
        col_span: usize,
        row_span: usize,
    ) -> Result<(), GridFlowError> {
        match self.span_index().owner_of(address) {
            Some(owner) if owner.anchor != address && owner.is_spanned() => {
                Err(GridFlowError::InvalidSpan {
                    address,
                    col_span,
                    row_span,
                    reason: "address is covered by another span",
                })
            }
            _ => Ok(()),
        }
    }

    pub fn span_index(&self) -> &SpanIndex {
        self.span_index
            .get_or_init(|| SpanIndex::build(self.columns.len(), self.rows.len(), &self.cells))
    }

    pub(crate) fn invalidate(&mut self) {
        self.span_index = OnceCell::new();
    }

    /// Anchor addresses in row-major order.
    pub fn anchors(&self) -> Vec<CellAddress> {
        self.span_index().rects().iter().map(|r| r.anchor).collect()
    }

    /// Anchor rectangles with more than one address.
    pub fn spanned_rects(&self) -> Vec<SpanRect> {
        self.span_index().spanned().copied().collect()
    }

    pub fn insert_row(&mut self, index: usize) -> Result<(), GridFlowError> {
        self.insert_track(Axis::Rows, index)
    }

    pub fn remove_row(&mut self, index: usize) -> Result<Row, GridFlowError> {
        self.check_track(Axis::Rows, index)?;
        self.shift_for_remove(Axis::Rows, index);
        let row = self.rows.remove(index);
        self.fixed_rows = self.fixed_rows.min(self.rows.len());
        Ok(row)
    }

    pub fn insert_column(&mut self, index: usize) -> Result<(), GridFlowError> {
        self.insert_track(Axis::Columns, index)
    }

    pub fn remove_column(&mut self, index: usize) -> Result<Column, GridFlowError> {
        self.check_track(Axis::Columns, index)?;
        self.shift_for_remove(Axis::Columns, index);
        let column = self.columns.remove(index);
        self.fixed_columns = self.fixed_columns.min(self.columns.len());
        Ok(column)
    }

    fn check_track(&self, axis: Axis, index: usize) -> Result<(), GridFlowError> {
        let len = self.len(axis);
        if index >= len {
            return Err(GridFlowError::OutOfBounds { axis, index, len });
        }
        Ok(())
    }

    fn insert_track(&mut self, axis: Axis, index: usize) -> Result<(), GridFlowError> {
        let len = self.len(axis);
        if index > len {
            return Err(GridFlowError::OutOfBounds { axis, index, len });
        }
        match axis {
            Axis::Rows => self.rows.insert(index, Row::default()),
            Axis::Columns => self.columns.insert(index, Column::default()),
        }
        let cells = std::mem::take(&mut self.cells);
        for (address, mut cell) in cells {
            let start = address.get(axis);
            let target = if start >= index {
                address.with(axis, start + 1)
            } else {
                if start + cell.span(axis) > index {
                    let span = cell.span(axis) + 1;
                    cell.set_axis_span(axis, span);
                }
                address
            };
            self.cells.insert(target, cell);
        }
        self.invalidate();
        Ok(())
    }

    fn shift_for_remove(&mut self, axis: Axis, index: usize) {
        let cells = std::mem::take(&mut self.cells);
        let mut deferred = Vec::new();
        for (address, mut cell) in cells {
            let start = address.get(axis);
            let span = cell.span(axis);
            if start == index {
                // The anchor row/column goes away; a taller rectangle keeps its
                // remaining area by re-anchoring on the next track.
                if span > 1 {
                    cell.set_axis_span(axis, span - 1);
                    self.cells.insert(address, cell);
                }
            } else if start > index {
                deferred.push((address.with(axis, start - 1), cell));
            } else {
                if start + span > index {
                    cell.set_axis_span(axis, span - 1);
                }
                deferred.push((address, cell));
            }
        }
        for (address, cell) in deferred {
            self.cells.entry(address).or_insert(cell);
        }
        self.invalidate();
    }

    /// Top of `row`, summed from the sizes above it.
    pub fn row_top(&self, row: usize) -> Pt {
        self.rows[..row.min(self.rows.len())]
            .iter()
            .map(|r| r.track.size)
            .sum()
    }

    pub fn column_left(&self, column: usize) -> Pt {
        self.columns[..column.min(self.columns.len())]
            .iter()
            .map(|c| c.track.size)
            .sum()
    }

    /// Summed sizes of `count` tracks starting at `start`, clipped to the grid.
    pub fn tracks_size(&self, axis: Axis, start: usize, count: usize) -> Pt {
        let len = self.len(axis);
        let end = start.saturating_add(count).min(len);
        (start.min(end)..end).map(|i| self.track(axis, i).size).sum()
    }

    /// Runs `supplier` over every stored anchor, passing its template origin
    /// when it has one.
    pub fn populate(&mut self, supplier: &mut dyn CellSupplier) {
        for address in self.anchors() {
            if let Some(cell) = self.cells.get_mut(&address) {
                let source = cell.origin.unwrap_or(address);
                supplier.populate(source, cell);
            }
        }
    }

    /// Recomputes auto-size column widths, then widens the last column of a
    /// spanned cell that does not fit when `adjust_spanned_cells_width` is on.
    pub fn calc_widths(&mut self) {
        let anchors = self.span_index().rects().to_vec();
        let cells = &self.cells;
        let columns = &self.columns;
        // Measure in parallel, fold in anchor order.
        let measured: Vec<(usize, Pt)> = anchors
            .par_iter()
            .filter(|rect| rect.col_span == 1 && columns[rect.anchor.col].track.auto_size)
            .filter_map(|rect| {
                let cell = cells.get(&rect.anchor)?;
                Some((rect.anchor.col, cell.content.measure(Pt::huge()).width))
            })
            .collect();
        let mut widths: Vec<Option<Pt>> = vec![None; self.columns.len()];
        for (col, natural) in measured {
            let slot = &mut widths[col];
            *slot = Some(slot.unwrap_or(Pt::ZERO).max(natural));
        }
        for (column, width) in self.columns.iter_mut().zip(widths) {
            if let Some(width) = width {
                column.track.size = column.track.clamped(width);
            }
        }
        if self.adjust_spanned_cells_width {
            for rect in anchors.iter().filter(|r| r.col_span > 1) {
                self.grow_spanned_width(*rect);
            }
        }
    }

    /// Widens the last column under `rect` to the cell's minimum width.
    pub(crate) fn grow_spanned_width(&mut self, rect: SpanRect) -> Pt {
        let Some(cell) = self.cells.get(&rect.anchor) else {
            return Pt::ZERO;
        };
        let needed = cell.content.min_width();
        let have = self.tracks_size(Axis::Columns, rect.anchor.col, rect.col_span);
        if needed <= have {
            return Pt::ZERO;
        }
        let last = rect.end(Axis::Columns) - 1;
        let grow = needed - have;
        self.columns[last].track.size += grow;
        grow
    }

    /// Recomputes auto-size row heights from content measured at the width
    /// of the columns each cell spans.
    pub fn calc_heights(&mut self) {
        let anchors = self.span_index().rects().to_vec();
        let cells = &self.cells;
        let columns = &self.columns;
        let rows = &self.rows;
        let measured: Vec<(usize, Pt)> = anchors
            .par_iter()
            .filter(|rect| rect.row_span == 1 && rows[rect.anchor.row].track.auto_size)
            .filter_map(|rect| {
                let cell = cells.get(&rect.anchor)?;
                let width: Pt = columns[rect.range(Axis::Columns)]
                    .iter()
                    .map(|column| column.track.size)
                    .sum();
                Some((rect.anchor.row, cell.content.measure(width).height))
            })
            .collect();
        let mut heights: Vec<Option<Pt>> = vec![None; self.rows.len()];
        for (row, needed) in measured {
            let slot = &mut heights[row];
            *slot = Some(slot.unwrap_or(Pt::ZERO).max(needed));
        }
        for (row, height) in self.rows.iter_mut().zip(heights) {
            if let Some(height) = height {
                row.track.size = row.track.clamped(height);
            }
        }
        for rect in anchors.iter().filter(|r| r.row_span > 1) {
            let last = rect.end(Axis::Rows) - 1;
            if self.rows[last].track.auto_size {
                self.grow_spanned_height(*rect);
            }
        }
    }

    /// Grows the last row under `rect` until the cell's content fits.
    pub(crate) fn grow_spanned_height(&mut self, rect: SpanRect) -> Pt {
        let Some(cell) = self.cells.get(&rect.anchor) else {
            return Pt::ZERO;
        };
        let width = self.tracks_size(Axis::Columns, rect.anchor.col, rect.col_span);
        let needed = cell.content.measure(width).height;
        let have = self.tracks_size(Axis::Rows, rect.anchor.row, rect.row_span);
        if needed <= have {
            return Pt::ZERO;
        }
        let last = rect.end(Axis::Rows) - 1;
        let grow = needed - have;
        self.rows[last].track.size += grow;
        grow
    }

    pub(crate) fn cells_mut(&mut self) -> &mut HashMap<CellAddress, Cell> {
        &mut self.cells
    }

    pub(crate) fn cells(&self) -> &HashMap<CellAddress, Cell> {
        &self.cells
    }
}

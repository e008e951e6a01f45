mod aggregate;
mod build;
mod compositor;
mod content;
mod debug;
mod error;
mod fit;
mod frame;
mod grid;
mod metrics;
mod page_flow;
mod page_template;
mod paginate;
mod perf;
mod style;
mod types;

pub use aggregate::{AggregateKind, format_scaled, parse_number};
pub use build::{BuildState, IncrementalBuild};
pub use compositor::{PageCompositor, RegionCursor};
pub use content::{
    BlockContent, BreakOutcome, CellContent, ContentClone, StackContent, TextContent, TextMetrics,
};
use debug::DebugLogger;
pub use error::GridFlowError;
pub use fit::{header_size, replayed_headers, tracks_extent, tracks_fit, tracks_fit_forced};
pub use frame::Frame;
pub use grid::{
    Axis, Cell, CellAddress, CellSupplier, CellValue, Column, Grid, Row, SpanIndex, SpanRect,
    Track,
};
pub use metrics::{FlowMetrics, PageMetrics};
pub use page_flow::{PageFlow, PlacedFragment};
pub use page_template::PageTemplate;
pub use paginate::{CellSnapshot, LayoutStrategy, PageFragment, Paginator};
use perf::PerfLogger;
use std::collections::BTreeMap;
use std::path::PathBuf;
pub use style::{HorzAlign, Padding, Style, StyleCache, VertAlign};
pub use types::{Color, Margins, Pt, Rect, Size};

/// Table layout engine: builds dynamic tables and cuts grids into page
/// fragments, with optional JSONL diagnostics.
pub struct GridFlow {
    strategy: LayoutStrategy,
    wrapped_gap: Pt,
    page_size: Size,
    margins: Margins,
    page_margins: BTreeMap<usize, Margins>,
    columns: usize,
    column_gap: Pt,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
}

#[derive(Clone)]
pub struct GridFlowBuilder {
    strategy: LayoutStrategy,
    wrapped_gap: Pt,
    page_size: Size,
    margins: Margins,
    page_margins: BTreeMap<usize, Margins>,
    columns: usize,
    column_gap: Pt,
    debug_path: Option<PathBuf>,
    perf_enabled: bool,
    perf_path: Option<PathBuf>,
}

impl GridFlow {
    pub fn builder() -> GridFlowBuilder {
        GridFlowBuilder::new()
    }

    pub fn strategy(&self) -> LayoutStrategy {
        self.strategy
    }

    /// Paginates `grid` with the configured strategy.
    pub fn paginate<'a, C: PageCompositor + ?Sized>(
        &self,
        grid: &'a mut Grid,
        compositor: &'a mut C,
    ) -> Paginator<'a, C> {
        self.paginate_with(grid, compositor, self.strategy)
    }

    pub fn paginate_with<'a, C: PageCompositor + ?Sized>(
        &self,
        grid: &'a mut Grid,
        compositor: &'a mut C,
        strategy: LayoutStrategy,
    ) -> Paginator<'a, C> {
        Paginator::new(grid, compositor, strategy)
            .with_wrapped_gap(self.wrapped_gap)
            .with_logs(self.debug.clone(), self.perf.clone())
    }

    /// Starts a dynamic table built from `template`.
    pub fn incremental_build<'t>(&self, template: &'t Grid) -> IncrementalBuild<'t> {
        IncrementalBuild::new(template).with_logs(self.debug.clone(), self.perf.clone())
    }

    /// Page templates from the configured page size, margins and columns.
    /// Per-page margin overrides produce one template per page up to the
    /// highest overridden page; the last one repeats.
    pub fn page_templates(&self) -> Vec<PageTemplate> {
        let template = |name: String, margins: Margins| {
            PageTemplate::new(name, self.page_size).with_columns(
                margins,
                self.columns,
                self.column_gap,
            )
        };
        let Some(&last_page) = self.page_margins.keys().max() else {
            return vec![template("Page1".to_string(), self.margins)];
        };
        (1..=last_page)
            .map(|page_number| {
                let margins = self
                    .page_margins
                    .get(&page_number)
                    .copied()
                    .unwrap_or(self.margins);
                template(format!("Page{page_number}"), margins)
            })
            .collect()
    }

    /// Reference compositor over [`GridFlow::page_templates`].
    pub fn page_flow(&self) -> Result<PageFlow, GridFlowError> {
        self.page_flow_with(self.page_templates())
    }

    pub fn page_flow_with(&self, templates: Vec<PageTemplate>) -> Result<PageFlow, GridFlowError> {
        let flow = PageFlow::new(templates)?;
        Ok(match self.debug.clone() {
            Some(debug) => flow.with_debug(debug),
            None => flow,
        })
    }

    /// Paginates `grid` into a fresh [`PageFlow`], returning every fragment
    /// and the flow's metrics.
    pub fn layout(&self, grid: &mut Grid) -> Result<(Vec<PageFragment>, FlowMetrics), GridFlowError> {
        let mut flow = self.page_flow()?;
        let fragments: Vec<PageFragment> = self.paginate(grid, &mut flow).collect();
        Ok((fragments, flow.into_metrics()))
    }

    pub fn flush_logs(&self) {
        if let Some(debug) = self.debug.as_ref() {
            debug.flush();
        }
        if let Some(perf) = self.perf.as_ref() {
            perf.flush();
        }
    }
}

impl GridFlowBuilder {
    pub fn new() -> Self {
        Self {
            strategy: LayoutStrategy::default(),
            wrapped_gap: Pt::from_i32(12),
            page_size: Size::a4(),
            margins: Margins::all(36.0),
            page_margins: BTreeMap::new(),
            columns: 1,
            column_gap: Pt::from_i32(18),
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
        }
    }

    pub fn strategy(mut self, strategy: LayoutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    // Vertical space between column bands under `LayoutStrategy::Wrapped`.
    pub fn wrapped_gap(mut self, gap: Pt) -> Self {
        self.wrapped_gap = gap;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    // 1-based page number.
    pub fn page_margin(mut self, page_number: usize, margins: Margins) -> Self {
        self.page_margins.insert(page_number, margins);
        self
    }

    // Frames per page for the built-in page flow.
    pub fn columns(mut self, count: usize, gap: Pt) -> Self {
        self.columns = count;
        self.column_gap = gap;
        self
    }

    // Enable debug logging to a JSONL file for layout inspection.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Enable performance logging to a JSONL file for timing inspection.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_enabled = true;
        self.perf_path = Some(path.into());
        self
    }

    // Toggle performance logging (uses default file when enabled and no path is set).
    pub fn perf_enabled(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<GridFlow, GridFlowError> {
        if self.wrapped_gap < Pt::ZERO {
            return Err(GridFlowError::InvalidConfiguration(
                "wrapped_gap must not be negative".to_string(),
            ));
        }
        if self.columns == 0 {
            return Err(GridFlowError::InvalidConfiguration(
                "columns requires at least one frame per page".to_string(),
            ));
        }
        if self.column_gap < Pt::ZERO {
            return Err(GridFlowError::InvalidConfiguration(
                "column gap must not be negative".to_string(),
            ));
        }
        if self.page_margins.contains_key(&0) {
            return Err(GridFlowError::InvalidConfiguration(
                "page_margin page numbers start at 1".to_string(),
            ));
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| PathBuf::from("gridflow_perf.log"));
            Some(PerfLogger::new(path)?)
        } else {
            None
        };
        Ok(GridFlow {
            strategy: self.strategy,
            wrapped_gap: self.wrapped_gap,
            page_size: self.page_size,
            margins: self.margins,
            page_margins: self.page_margins,
            columns: self.columns,
            column_gap: self.column_gap,
            debug,
            perf,
        })
    }
}

impl Default for GridFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "gridflow_{}_{}_{name}",
            std::process::id(),
            Grid::new().id()
        ))
    }

    #[test]
    fn builder_rejects_bad_configuration() {
        let negative_gap = GridFlow::builder().wrapped_gap(Pt::from_i32(-1)).build();
        assert!(matches!(
            negative_gap,
            Err(GridFlowError::InvalidConfiguration(_))
        ));
        let no_columns = GridFlow::builder().columns(0, Pt::ZERO).build();
        assert!(matches!(no_columns, Err(GridFlowError::InvalidConfiguration(_))));
        let page_zero = GridFlow::builder().page_margin(0, Margins::all(0.0)).build();
        assert!(matches!(page_zero, Err(GridFlowError::InvalidConfiguration(_))));
    }

    #[test]
    fn unwritable_debug_log_is_an_io_error() {
        let dir = temp_path("missing_dir");
        let result = GridFlow::builder().debug_log(dir.join("nested").join("log.jsonl")).build();
        assert!(matches!(result, Err(GridFlowError::Io(_))));
    }

    #[test]
    fn page_templates_follow_margin_overrides() {
        let engine = GridFlow::builder()
            .page_size(Size::new(Pt::from_i32(200), Pt::from_i32(200)))
            .margins(Margins::all(10.0))
            .page_margin(2, Margins::all(50.0))
            .build()
            .unwrap();
        let templates = engine.page_templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name, "Page1");
        let frames = templates[1].instantiate_frames();
        assert_eq!(frames[0].remaining_height(), Pt::from_i32(100));
    }

    #[test]
    fn layout_places_every_row_once() {
        let engine = GridFlow::builder()
            .page_size(Size::new(Pt::from_i32(200), Pt::from_i32(100)))
            .margins(Margins::all(0.0))
            .build()
            .unwrap();
        let mut grid = Grid::with_size(2, 12);
        let (fragments, metrics) = engine.layout(&mut grid).unwrap();
        // 20pt rows, 100pt pages.
        assert_eq!(fragments.len(), 3);
        assert_eq!(metrics.pages.len(), 3);
        assert_eq!(metrics.total_fragments, 3);
        let rows: usize = fragments.iter().map(|f| f.rows.len()).sum();
        assert_eq!(rows, 12);
    }

    #[test]
    fn built_table_paginates_with_repeated_header() {
        let engine = GridFlow::builder()
            .page_size(Size::new(Pt::from_i32(200), Pt::from_i32(100)))
            .margins(Margins::all(0.0))
            .build()
            .unwrap();
        let mut template = Grid::with_size(2, 2);
        template.set_fixed(0, 1);
        template.set_text(0, 0, "Item").unwrap();
        template.set_text(1, 0, "Cost").unwrap();
        let mut build = engine.incremental_build(&template);
        build.emit_row(0).unwrap();
        build.emit_columns().unwrap();
        for _ in 0..8 {
            build.emit_row(1).unwrap();
            build.emit_columns().unwrap();
        }
        let mut result = build.finish();
        assert_eq!(result.fixed_rows(), 1);

        let (fragments, _) = engine.layout(&mut result).unwrap();
        // Header plus 8 rows at 20pt: 5 rows, then the header and 4 rows.
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].rows, 0..5);
        assert_eq!(fragments[1].header_rows, 0..1);
        assert_eq!(fragments[1].rows, 5..9);
        let header = fragments[1].cell(CellAddress::new(0, 0)).unwrap();
        assert!(header.header);
        assert_eq!(header.text, "Item");
    }

    #[test]
    fn debug_log_records_build_and_pagination_events() {
        let path = temp_path("debug.jsonl");
        let engine = GridFlow::builder()
            .page_size(Size::new(Pt::from_i32(200), Pt::from_i32(60)))
            .margins(Margins::all(0.0))
            .debug_log(&path)
            .build()
            .unwrap();
        let template = Grid::with_size(1, 1);
        let mut build = engine.incremental_build(&template);
        build.emit_row(0).unwrap();
        build.emit_column(0).unwrap();
        build.emit_row(0).unwrap();
        build.emit_row(0).unwrap();
        build.emit_row(0).unwrap();
        let mut result = build.finish();
        let (fragments, _) = engine.layout(&mut result).unwrap();
        assert_eq!(fragments.len(), 2);
        engine.flush_logs();

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("\"type\":\"table.build.major\""));
        assert!(log.contains("\"type\":\"table.fragment\""));
        assert!(log.contains("\"type\":\"table.page_break\""));
        assert!(log.contains("\"type\":\"flow.page_start\""));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn perf_log_writes_spans() {
        let path = temp_path("perf.jsonl");
        let engine = GridFlow::builder().perf_log(&path).build().unwrap();
        let mut grid = Grid::with_size(1, 3);
        let (fragments, _) = engine.layout(&mut grid).unwrap();
        assert_eq!(fragments.len(), 1);
        engine.flush_logs();
        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("table.paginate.fragment"));
        let _ = std::fs::remove_file(&path);
    }
}

use crate::grid::{CellAddress, Grid};
use crate::paginate::PageFragment;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

impl AggregateKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" | "average" => Some(Self::Avg),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// `Sum` and `Count` of nothing are zero; the rest have no value.
    pub fn apply(self, values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        match self {
            Self::Sum => Some(sum),
            Self::Count => Some(count as f64),
            _ if count == 0 => None,
            Self::Min => Some(min),
            Self::Max => Some(max),
            Self::Avg => Some(sum / count as f64),
        }
    }
}

/// Reads money-like text (`"$1,234.56"`, `"-0.10"`, `"1 000"`) as a number.
///
/// Grouping commas, whitespace and currency signs are skipped. Anything else
/// that is not part of a decimal number makes the text non-numeric.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut normalized = String::with_capacity(raw.len());
    let mut seen_sign = false;
    let mut seen_point = false;
    let mut seen_digit = false;

    for ch in raw.chars() {
        if !seen_sign && !seen_digit && !seen_point && (ch == '-' || ch == '+') {
            seen_sign = true;
            if ch == '-' {
                normalized.push('-');
            }
            continue;
        }
        if ch == '.' && !seen_point {
            seen_point = true;
            normalized.push('.');
            continue;
        }
        if ch.is_ascii_digit() {
            seen_digit = true;
            normalized.push(ch);
            continue;
        }
        if ch == ',' || ch.is_whitespace() || matches!(ch, '$' | '€' | '£' | '¥') {
            continue;
        }
        return None;
    }

    if !seen_digit {
        return None;
    }
    normalized.parse::<f64>().ok()
}

/// Renders `value` with `scale` fractional digits, the way totals are printed
/// back into cells.
pub fn format_scaled(value: f64, scale: usize) -> String {
    let rendered = format!("{value:.scale$}");
    // Avoid "-0.00" for tiny negative rounding residue.
    if rendered.starts_with('-') && rendered[1..].chars().all(|c| c == '0' || c == '.') {
        return rendered[1..].to_string();
    }
    rendered
}

impl Grid {
    /// Aggregates every cell generated from the same template cell as the one
    /// at `address`. A cell without a template origin aggregates alone.
    pub fn aggregate(&self, address: CellAddress, kind: AggregateKind) -> Option<f64> {
        self.aggregate_in(0..self.column_count(), 0..self.row_count(), address, kind)
    }

    /// Like [`Grid::aggregate`], restricted to anchors inside the window.
    pub fn aggregate_in(
        &self,
        columns: Range<usize>,
        rows: Range<usize>,
        address: CellAddress,
        kind: AggregateKind,
    ) -> Option<f64> {
        let cell = self.cell_at(address.col, address.row)?;
        let Some(origin) = cell.origin() else {
            let own = (columns.contains(&address.col) && rows.contains(&address.row))
                .then(|| cell.value.as_number())
                .flatten();
            return kind.apply(own);
        };
        // Row-major anchors keep floating-point sums reproducible.
        let values = self
            .span_index()
            .rects()
            .iter()
            .map(|rect| rect.anchor)
            .filter(|at| columns.contains(&at.col) && rows.contains(&at.row))
            .filter_map(|at| self.cell_at(at.col, at.row))
            .filter(|cell| cell.origin() == Some(origin))
            .filter_map(|cell| cell.value.as_number());
        kind.apply(values)
    }

    /// Page-level total: the cells of `fragment`'s body window only, so
    /// replayed headers are not counted again.
    pub fn aggregate_fragment(
        &self,
        fragment: &PageFragment,
        address: CellAddress,
        kind: AggregateKind,
    ) -> Option<f64> {
        self.aggregate_in(
            fragment.columns.clone(),
            fragment.rows.clone(),
            address,
            kind,
        )
    }
}

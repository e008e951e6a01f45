use crate::paginate::PageFragment;
use crate::types::Pt;

/// Where the next fragment would land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionCursor {
    /// 1-based page number.
    pub page: usize,
    /// 0-based column (frame) on the page.
    pub column: usize,
    /// Absolute position of the cursor on the page.
    pub x: Pt,
    pub y: Pt,
    /// Height already consumed in the current region.
    pub used: Pt,
}

impl RegionCursor {
    pub fn is_fresh(&self) -> bool {
        self.used <= Pt::ZERO
    }
}

/// Page geometry and flow, owned by the host.
///
/// The paginator asks for free space, places fragments, and moves to new
/// regions through these calls; it never decides page geometry itself.
pub trait PageCompositor {
    /// Height left in the current region.
    fn free_height(&self) -> Pt;

    /// Width of the current region.
    fn page_width(&self) -> Pt;

    fn start_new_page(&mut self);

    /// Next column of the page, or a new page when the columns are used up.
    fn end_column(&mut self);

    fn advance(&mut self, height: Pt);

    fn cursor(&self) -> RegionCursor;

    fn is_unlimited_height(&self) -> bool {
        false
    }

    fn is_unlimited_width(&self) -> bool {
        false
    }

    /// Polled once per fragment; pagination stops when this turns true.
    fn is_aborted(&self) -> bool {
        false
    }

    /// Called after a fragment is positioned and the region advanced.
    fn fragment_placed(&mut self, _fragment: &PageFragment) {}
}

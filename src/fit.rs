use crate::debug::table_debug_enabled;
use crate::grid::{Axis, Grid};
use crate::types::Pt;
use std::ops::Range;

/// Header tracks replayed in front of a fragment starting at `start`. The
/// first fragment draws its headers in place instead.
pub fn replayed_headers(grid: &Grid, axis: Axis, start: usize) -> Range<usize> {
    let fixed = grid.fixed(axis);
    if start == 0 || start < fixed || fixed == 0 || !grid.repeat_headers() {
        return 0..0;
    }
    0..fixed
}

pub fn header_size(grid: &Grid, axis: Axis, start: usize) -> Pt {
    let headers = replayed_headers(grid, axis, start);
    grid.tracks_size(axis, headers.start, headers.len())
}

/// Size of `count` tracks from `start`, replayed headers included.
pub fn tracks_extent(grid: &Grid, axis: Axis, start: usize, count: usize) -> Pt {
    header_size(grid, axis, start) + grid.tracks_size(axis, start, count)
}

/// Number of tracks from `start` that fit in `free`.
///
/// Returns 0 only for the first fragment when the header tracks do not fit;
/// the caller moves to a fresh region and retries, then falls back to
/// [`tracks_fit_forced`]. Any other call places at least one track.
pub fn tracks_fit(grid: &Grid, axis: Axis, start: usize, free: Pt, unlimited: bool) -> usize {
    fit(grid, axis, start, free, unlimited, false)
}

/// Like [`tracks_fit`] but never returns 0 while tracks remain.
pub fn tracks_fit_forced(grid: &Grid, axis: Axis, start: usize, free: Pt) -> usize {
    fit(grid, axis, start, free, false, true)
}

fn fit(grid: &Grid, axis: Axis, start: usize, free: Pt, unlimited: bool, force: bool) -> usize {
    let len = grid.len(axis);
    if start >= len {
        return 0;
    }
    if unlimited {
        return len - start;
    }
    let fixed = grid.fixed(axis);
    if !force && start == 0 && fixed > 0 && grid.tracks_size(axis, 0, fixed) > free {
        if table_debug_enabled() {
            eprintln!(
                "[gridflow] table={} {} header {} > free {}; deferring",
                grid.id(),
                axis.name(),
                grid.tracks_size(axis, 0, fixed).to_f32(),
                free.to_f32()
            );
        }
        return 0;
    }

    let mut used = header_size(grid, axis, start);
    let mut index = start;
    while index < len {
        let track = grid.track(axis, index);
        if track.page_break && index != start {
            break;
        }
        // Keep groups go in whole or not at all.
        let group = track.keep_count.max(1).min(len - index);
        let size = grid.tracks_size(axis, index, group);
        if used + size > free {
            break;
        }
        used += size;
        index += group;
    }

    let count = index - start;
    if count == 0 && table_debug_enabled() {
        eprintln!(
            "[gridflow] table={} {} {} alone exceeds free {}; forcing",
            grid.id(),
            axis.item_name(),
            start,
            free.to_f32()
        );
    }
    count.max(1)
}

impl Grid {
    /// Plain sum of row heights, headers not included.
    pub fn rows_size(&self, start: usize, count: usize) -> Pt {
        self.tracks_size(Axis::Rows, start, count)
    }

    pub fn columns_size(&self, start: usize, count: usize) -> Pt {
        self.tracks_size(Axis::Columns, start, count)
    }

    pub fn rows_height(&self, start: usize, count: usize) -> Pt {
        tracks_extent(self, Axis::Rows, start, count)
    }

    pub fn rows_fit(&self, start: usize, free: Pt) -> usize {
        tracks_fit(self, Axis::Rows, start, free, false)
    }

    pub fn columns_width(&self, start: usize, count: usize) -> Pt {
        tracks_extent(self, Axis::Columns, start, count)
    }

    pub fn columns_fit(&self, start: usize, free: Pt) -> usize {
        tracks_fit(self, Axis::Columns, start, free, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Row;

    fn rows(heights: &[i32]) -> Grid {
        let mut grid = Grid::with_size(1, 0);
        for h in heights {
            grid.add_row(Row::new(Pt::from_i32(*h)));
        }
        grid
    }

    #[test]
    fn oversized_single_row_is_force_placed() {
        let grid = rows(&[100]);
        assert_eq!(grid.rows_fit(0, Pt::from_i32(40)), 1);
    }

    #[test]
    fn first_fragment_defers_when_header_does_not_fit() {
        let mut grid = rows(&[30, 30, 30]);
        grid.set_fixed(0, 1);
        assert_eq!(grid.rows_fit(0, Pt::from_i32(20)), 0);
        assert_eq!(tracks_fit_forced(&grid, Axis::Rows, 0, Pt::from_i32(20)), 1);
        assert_eq!(grid.rows_fit(0, Pt::from_i32(65)), 2);
    }

    #[test]
    fn later_fragments_pay_for_replayed_headers() {
        let mut grid = rows(&[20, 20, 20, 20, 20]);
        grid.set_fixed(0, 1);
        assert_eq!(grid.rows_height(2, 2), Pt::from_i32(60));
        assert_eq!(grid.rows_height(0, 2), Pt::from_i32(40));
        assert_eq!(grid.rows_size(2, 2), Pt::from_i32(40));
        assert_eq!(grid.rows_fit(2, Pt::from_i32(50)), 1);
        // Forced progress even when only the header would fit.
        assert_eq!(grid.rows_fit(2, Pt::from_i32(25)), 1);

        grid.set_repeat_headers(false);
        assert_eq!(grid.rows_height(2, 2), Pt::from_i32(40));
        assert_eq!(grid.rows_fit(2, Pt::from_i32(50)), 2);
    }

    #[test]
    fn keep_groups_roll_back_whole() {
        let mut grid = rows(&[10, 10, 10, 10, 10, 10]);
        grid.row_mut(2).unwrap().track.keep_count = 3;
        assert_eq!(grid.rows_fit(0, Pt::from_i32(35)), 2);
        assert_eq!(grid.rows_fit(0, Pt::from_i32(50)), 5);
        // A group that is first in its fragment is still force-placed.
        assert_eq!(grid.rows_fit(2, Pt::from_i32(15)), 1);
    }

    #[test]
    fn page_break_flag_ends_a_fragment_except_at_its_start() {
        let mut grid = rows(&[10, 10, 10, 10]);
        grid.row_mut(2).unwrap().track.page_break = true;
        assert_eq!(grid.rows_fit(0, Pt::from_i32(1000)), 2);
        assert_eq!(grid.rows_fit(2, Pt::from_i32(1000)), 2);
    }

    #[test]
    fn unlimited_space_fits_everything() {
        let grid = rows(&[500, 500, 500]);
        assert_eq!(tracks_fit(&grid, Axis::Rows, 1, Pt::ZERO, true), 2);
        assert_eq!(tracks_fit(&grid, Axis::Rows, 3, Pt::ZERO, true), 0);
    }

    #[test]
    fn columns_fit_symmetrically() {
        let mut grid = Grid::with_size(4, 1);
        grid.set_fixed(1, 0);
        // Default columns are 60pt wide.
        assert_eq!(grid.columns_fit(0, Pt::from_i32(130)), 2);
        assert_eq!(grid.columns_width(2, 2), Pt::from_i32(180));
        assert_eq!(grid.columns_fit(2, Pt::from_i32(130)), 1);
        assert_eq!(grid.columns_fit(0, Pt::from_i32(50)), 0);
    }
}

use std::ops::Mul;

/// Number of rows in a raster. Newtype to avoid mixing up with [`Columns`] at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rows(pub i32);

/// Number of columns in a raster. Newtype to avoid mixing up with [`Rows`] at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Columns(pub i32);

impl Rows {
    pub const fn count(&self) -> i32 {
        self.0
    }
}

impl Columns {
    pub const fn count(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Columns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Mul<Columns> for Rows {
    type Output = usize;

    fn mul(self, rhs: Columns) -> usize {
        self.0.max(0) as usize * rhs.0.max(0) as usize
    }
}

/// Raster size represented by rows and columns.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterSize {
    pub rows: Rows,
    pub cols: Columns,
}

impl RasterSize {
    pub const fn with_rows_cols(rows: Rows, cols: Columns) -> Self {
        RasterSize { rows, cols }
    }

    pub const fn square(size: i32) -> Self {
        RasterSize {
            rows: Rows(size),
            cols: Columns(size),
        }
    }

    pub fn empty() -> Self {
        Self::with_rows_cols(Rows(0), Columns(0))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.count() == 0 || self.cols.count() == 0
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn max_dimension(&self) -> i32 {
        self.rows.count().max(self.cols.count())
    }
}

impl std::fmt::Display for RasterSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(rows: {}, cols: {})", self.rows, self.cols)
    }
}

impl std::fmt::Debug for RasterSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// A rectangular region of a raster addressed in pixel space, used to read or write
/// a sub-region of a raster without materializing the whole band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterWindow {
    pub row_offset: i32,
    pub col_offset: i32,
    pub rows: Rows,
    pub cols: Columns,
}

impl RasterWindow {
    pub const fn new(row_offset: i32, col_offset: i32, rows: Rows, cols: Columns) -> Self {
        RasterWindow {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    pub fn size(&self) -> RasterSize {
        RasterSize::with_rows_cols(self.rows, self.cols)
    }

    /// Clamp this window so it fits within a raster of the given size, shrinking
    /// `rows`/`cols` as needed. Returns `None` if the window does not overlap at all.
    pub fn clamped_to(&self, size: RasterSize) -> Option<RasterWindow> {
        if self.row_offset >= size.rows.count() || self.col_offset >= size.cols.count() {
            return None;
        }

        let row_offset = self.row_offset.max(0);
        let col_offset = self.col_offset.max(0);
        let rows = (self.row_offset + self.rows.count()).min(size.rows.count()) - row_offset;
        let cols = (self.col_offset + self.cols.count()).min(size.cols.count()) - col_offset;

        if rows <= 0 || cols <= 0 {
            return None;
        }

        Some(RasterWindow::new(row_offset, col_offset, Rows(rows), Columns(cols)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_count() {
        let size = RasterSize::with_rows_cols(Rows(3), Columns(4));
        assert_eq!(size.cell_count(), 12);
    }

    #[test]
    fn window_clamp_shrinks_to_raster_bounds() {
        let size = RasterSize::with_rows_cols(Rows(10), Columns(10));
        let window = RasterWindow::new(8, 8, Rows(5), Columns(5));
        let clamped = window.clamped_to(size).unwrap();
        assert_eq!(clamped.rows, Rows(2));
        assert_eq!(clamped.cols, Columns(2));
    }

    #[test]
    fn window_entirely_outside_raster_is_none() {
        let size = RasterSize::with_rows_cols(Rows(10), Columns(10));
        let window = RasterWindow::new(20, 20, Rows(5), Columns(5));
        assert!(window.clamped_to(size).is_none());
    }
}

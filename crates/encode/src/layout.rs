/// Texels per table row before wrapping.
pub const ROW_WIDTH: usize = 4096;

/// Placement of per-slot-per-side records in the row textures.
///
/// Slot `s` occupies `degree` consecutive texels starting at
/// `((s % per_row) * degree, s / per_row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub degree: usize,
    pub per_row: usize,
    pub rows: usize,
}

impl TableLayout {
    pub fn new(degree: usize, cells: usize) -> Self {
        let degree = degree.max(1);
        let per_row = ROW_WIDTH / degree;
        let rows = cells.div_ceil(per_row).max(1).next_power_of_two();
        Self {
            degree,
            per_row,
            rows,
        }
    }

    /// Texture width in texels.
    pub fn width(&self) -> usize {
        self.per_row * self.degree
    }

    pub fn texel_count(&self) -> usize {
        self.width() * self.rows
    }

    pub fn texel(&self, slot: usize, side: usize) -> (usize, usize) {
        ((slot % self.per_row) * self.degree + side, slot / self.per_row)
    }

    /// Row-major index of a texel.
    pub fn index(&self, slot: usize, side: usize) -> usize {
        let (x, y) = self.texel(slot, side);
        y * self.width() + x
    }
}

/// Selected cell of an `n`×`n` grid.
///
/// Stepping walks the grid in a single linear scan: columns wrap, and the
/// wrap carries into the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub row: usize,
    pub col: usize,
}

impl Cursor {
    pub fn new(row: usize, col: usize) -> Cursor {
        Cursor { row, col }
    }

    pub fn in_bounds(&self, n: usize) -> bool {
        self.row < n && self.col < n
    }

    /// Cursor pulled back inside an `n`×`n` grid. Unchanged when already
    /// in range or when the grid is empty.
    pub fn clamped(&self, n: usize) -> Cursor {
        if n == 0 {
            return *self;
        }
        Cursor {
            row: self.row.min(n - 1),
            col: self.col.min(n - 1),
        }
    }

    /// Cursor moved by `(d_row, d_col)` on an `n`×`n` grid, carrying column
    /// overflow and underflow into the row. `n == 0` leaves it unchanged.
    pub fn stepped(&self, d_row: isize, d_col: isize, n: usize) -> Cursor {
        if n == 0 {
            return *self;
        }
        let n = n as isize;
        let col = self.col as isize + d_col;
        let carry = col.div_euclid(n);
        Cursor {
            row: (self.row as isize + d_row + carry).rem_euclid(n) as usize,
            col: col.rem_euclid(n) as usize,
        }
    }
}

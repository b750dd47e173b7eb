use core::ops::RangeInclusive;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::partition::Band;




/// Index of the ghost row holding the upper neighbor's last owned row.
pub const UPPER_GHOST: usize = 0;




/**
 * A worker's slice of the temperature field: `local_rows` owned rows framed
 * by two ghost rows, stored row-major in one contiguous buffer of
 * `(local_rows + 2) * cols` cells.
 *
 * Rows `1..=local_rows` are owned. Row `UPPER_GHOST` and row
 * `local_rows + 1` are ghost rows; they are written only by the halo
 * exchange, or sealed at the boundary temperature on the outer edges of the
 * global grid. Ghost rows start out as NaN so a missed exchange poisons the
 * field instead of silently reading stale data.
 */
#[derive(Clone, Debug)]
pub struct Grid {
    local_rows: usize,
    cols: usize,
    data: Vec<f64>,
}




// ============================================================================
impl Grid {


    /**
     * Allocate a grid and set every owned cell to `initial`. Allocation is
     * fallible: an impossible size or a failed reservation is reported
     * rather than aborting the process.
     */
    pub fn new(local_rows: usize, cols: usize, initial: f64) -> Result<Self> {
        let elements = (local_rows + 2)
            .checked_mul(cols)
            .ok_or(Error::Allocation { elements: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(elements)
            .map_err(|_| Error::Allocation { elements })?;
        data.resize(elements, f64::NAN);

        let mut grid = Self { local_rows, cols, data };
        for i in grid.owned_rows() {
            grid.fill_row(i, initial);
        }
        Ok(grid)
    }


    /**
     * Return the logical dimensions of the backing array, ghost rows
     * included.
     */
    pub fn dim(&self) -> (usize, usize) {
        (self.local_rows + 2, self.cols)
    }


    pub fn local_rows(&self) -> usize {
        self.local_rows
    }


    pub fn cols(&self) -> usize {
        self.cols
    }


    /**
     * Index of the ghost row holding the lower neighbor's first owned row.
     */
    pub fn lower_ghost(&self) -> usize {
        self.local_rows + 1
    }


    pub fn owned_rows(&self) -> RangeInclusive<usize> {
        1..=self.local_rows
    }


    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.cols;
        &self.data[i * n..(i + 1) * n]
    }


    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let n = self.cols;
        &mut self.data[i * n..(i + 1) * n]
    }


    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.validate_index(i, j);
        self.data[i * self.cols + j]
    }


    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.validate_index(i, j);
        self.data[i * self.cols + j] = value
    }


    pub fn fill_row(&mut self, i: usize, value: f64) {
        for x in self.row_mut(i) {
            *x = value
        }
    }


    /**
     * The owned rows as one contiguous row-major slice, ghost rows excluded.
     */
    pub fn owned(&self) -> &[f64] {
        let n = self.cols;
        &self.data[n..(self.local_rows + 1) * n]
    }

    fn validate_index(&self, i: usize, j: usize) {
        if i > self.local_rows + 1 || j >= self.cols {
            panic!(
                "index ({} {}) out of range on grid ({} x {})",
                i,
                j,
                self.local_rows + 2,
                self.cols
            );
        }
    }
}




/**
 * The "current" and "next" grids of the explicit scheme. After every call to
 * `swap`, `current` holds the most recently completed step.
 */
#[derive(Debug)]
pub struct DoubleBuffer {
    current: Grid,
    next: Grid,
}




// ============================================================================
impl DoubleBuffer {


    /**
     * Allocate and initialize both grids for the given band: owned cells at
     * the initial temperature, the source cell pinned if this band owns it,
     * and ghost rows facing the outside of the global grid sealed at the
     * boundary temperature.
     */
    pub fn new(band: &Band, config: &Config) -> Result<Self> {
        let mut current = Grid::new(band.local_rows(), band.cols(), config.initial_temp)?;
        let mut next = Grid::new(band.local_rows(), band.cols(), config.initial_temp)?;

        for grid in [&mut current, &mut next].iter_mut() {
            if !band.has_upper_neighbor() {
                grid.fill_row(UPPER_GHOST, config.boundary_temp);
            }
            if !band.has_lower_neighbor() {
                let i = grid.lower_ghost();
                grid.fill_row(i, config.boundary_temp);
            }
            if let Some((i, j)) = band.source() {
                grid.set(i, j, config.source_temp);
            }
        }
        Ok(Self { current, next })
    }


    pub fn current(&self) -> &Grid {
        &self.current
    }


    pub fn current_mut(&mut self) -> &mut Grid {
        &mut self.current
    }


    /**
     * Borrow the current grid for reading and the next grid for writing.
     */
    pub fn split(&mut self) -> (&Grid, &mut Grid) {
        (&self.current, &mut self.next)
    }


    /**
     * Exchange the identities of the two grids. No cell data is copied.
     */
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{DoubleBuffer, Grid, UPPER_GHOST};
    use crate::config::Config;
    use crate::partition::Band;

    #[test]
    fn new_grid_has_nan_ghosts_and_initial_interior() {
        let grid = Grid::new(3, 4, 20.0).unwrap();
        assert_eq!(grid.dim(), (5, 4));
        assert!(grid.row(UPPER_GHOST).iter().all(|x| x.is_nan()));
        assert!(grid.row(grid.lower_ghost()).iter().all(|x| x.is_nan()));
        assert_eq!(grid.owned().len(), 12);
        assert!(grid.owned().iter().all(|&x| x == 20.0));
    }

    #[test]
    fn oversized_grid_is_an_allocation_error() {
        assert!(Grid::new(usize::MAX / 2, 4, 0.0).is_err());
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_panics() {
        Grid::new(2, 4, 0.0).unwrap().get(4, 0);
    }

    #[test]
    fn outer_ghosts_are_sealed_and_source_is_pinned() {
        let config = Config { grid_size: 8, ..Config::default() };
        let top = DoubleBuffer::new(&Band::new(0, 2, 8).unwrap(), &config).unwrap();
        let bot = DoubleBuffer::new(&Band::new(1, 2, 8).unwrap(), &config).unwrap();

        let g = top.current();
        assert!(g.row(UPPER_GHOST).iter().all(|&x| x == config.boundary_temp));
        assert!(g.row(g.lower_ghost()).iter().all(|x| x.is_nan()));

        let g = bot.current();
        assert!(g.row(UPPER_GHOST).iter().all(|x| x.is_nan()));
        assert!(g.row(g.lower_ghost()).iter().all(|&x| x == config.boundary_temp));
        assert_eq!(g.get(1, 4), config.source_temp);
    }

    #[test]
    fn swap_exchanges_buffers_without_copying() {
        let config = Config { grid_size: 4, ..Config::default() };
        let mut buffers = DoubleBuffer::new(&Band::new(0, 1, 4).unwrap(), &config).unwrap();
        let before = buffers.current().owned().as_ptr();
        {
            let (_, next) = buffers.split();
            next.set(1, 1, -1.0);
        }
        buffers.swap();
        assert_eq!(buffers.current().get(1, 1), -1.0);
        assert_ne!(buffers.current().owned().as_ptr(), before);
        buffers.swap();
        assert_eq!(buffers.current().owned().as_ptr(), before);
    }
}

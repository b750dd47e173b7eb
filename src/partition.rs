use core::ops::RangeInclusive;

use crate::error::{Error, Result};




#[derive(Clone, Debug, PartialEq, Eq)]


/**
 * The band of contiguous global rows owned by one worker in a linear chain
 * of `workers` workers. Neighbor capabilities and the local position of the
 * heat source are resolved here once, so the step loop never compares ranks.
 */
pub struct Band {
    rank: usize,
    workers: usize,
    grid_size: usize,
    local_rows: usize,
    start_row: usize,
    source: Option<(usize, usize)>,
}




// ============================================================================
impl Band {


    /**
     * Partition a square grid of `grid_size` rows among `workers` workers and
     * return the band owned by `rank`. Fails if the rows do not divide evenly;
     * every worker evaluates the same test on the same parameters, so they
     * all fail together.
     */
    pub fn new(rank: usize, workers: usize, grid_size: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("worker count must be positive".into()));
        }
        if rank >= workers {
            return Err(Error::Config(format!(
                "rank {} out of range for {} workers",
                rank, workers
            )));
        }
        if grid_size == 0 {
            return Err(Error::Config("grid size must be positive".into()));
        }
        if grid_size % workers != 0 {
            return Err(Error::Partition { grid_size, workers });
        }
        let local_rows = grid_size / workers;
        let start_row = rank * local_rows;
        let (source_row, source_col) = (grid_size / 2, grid_size / 2);
        let source = if (start_row..start_row + local_rows).contains(&source_row) {
            Some((source_row - start_row + 1, source_col))
        } else {
            None
        };

        Ok(Self {
            rank,
            workers,
            grid_size,
            local_rows,
            start_row,
            source,
        })
    }


    pub fn rank(&self) -> usize {
        self.rank
    }


    pub fn workers(&self) -> usize {
        self.workers
    }


    /**
     * Number of rows owned by this worker.
     */
    pub fn local_rows(&self) -> usize {
        self.local_rows
    }


    /**
     * Number of columns, equal to the global grid size.
     */
    pub fn cols(&self) -> usize {
        self.grid_size
    }


    /**
     * First global row owned by this worker.
     */
    pub fn start_row(&self) -> usize {
        self.start_row
    }


    /**
     * Last global row owned by this worker (inclusive).
     */
    pub fn end_row(&self) -> usize {
        self.start_row + self.local_rows - 1
    }


    /**
     * The global rows owned by this worker.
     */
    pub fn global_rows(&self) -> RangeInclusive<usize> {
        self.start_row..=self.end_row()
    }


    /**
     * Rank of the worker owning the rows above this band, if any.
     */
    pub fn upper(&self) -> Option<usize> {
        if self.rank > 0 {
            Some(self.rank - 1)
        } else {
            None
        }
    }


    /**
     * Rank of the worker owning the rows below this band, if any.
     */
    pub fn lower(&self) -> Option<usize> {
        if self.rank + 1 < self.workers {
            Some(self.rank + 1)
        } else {
            None
        }
    }


    pub fn has_upper_neighbor(&self) -> bool {
        self.upper().is_some()
    }


    pub fn has_lower_neighbor(&self) -> bool {
        self.lower().is_some()
    }


    pub fn owns_global_row(&self, row: usize) -> bool {
        self.global_rows().contains(&row)
    }


    /**
     * Convert a global row index into the local index in a grid buffer,
     * where owned rows start at 1.
     */
    pub fn to_local_row(&self, row: usize) -> Option<usize> {
        if self.owns_global_row(row) {
            Some(row - self.start_row + 1)
        } else {
            None
        }
    }


    /**
     * Local `(row, col)` of the heat source, if this band owns it.
     */
    pub fn source(&self) -> Option<(usize, usize)> {
        self.source
    }


    /**
     * Offset of this band's first owned cell in the row-major full grid.
     */
    pub fn offset(&self) -> usize {
        self.start_row * self.grid_size
    }
}

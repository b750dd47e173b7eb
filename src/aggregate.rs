use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::message::comm::Communicator;
use crate::message::ordered::OrderedCommunicator;
use crate::partition::Band;




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * The assembled temperature field of the whole grid, row-major, ghost rows
 * excluded. Only the coordinating worker ever holds one.
 */
pub struct Snapshot {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}




// ============================================================================
impl Snapshot {


    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::Communication(format!(
                "snapshot of {} x {} needs {} cells, got {}",
                rows,
                cols,
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }


    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }


    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }


    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }


    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks(self.cols)
    }


    /**
     * Largest absolute cell-wise difference to another snapshot of the same
     * shape, or `None` if the shapes differ.
     */
    pub fn max_difference(&self, other: &Self) -> Option<f64> {
        if self.dim() != other.dim() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}




/**
 * Collect every worker's owned rows onto rank 0, in band order. Rank 0
 * returns the full grid; every other rank returns `None`.
 */
pub fn gather_grid<C: Communicator>(
    comm: &OrderedCommunicator<C>,
    band: &Band,
    grid: &Grid,
) -> Result<Option<Snapshot>> {
    let bands = match comm.gather(grid.owned().to_vec())? {
        Some(bands) => bands,
        None => return Ok(None),
    };
    let cols = band.cols();
    let rows = band.local_rows() * band.workers();
    let mut data = Vec::with_capacity(rows * cols);

    for (rank, owned) in bands.into_iter().enumerate() {
        if owned.len() != band.local_rows() * cols {
            return Err(Error::Communication(format!(
                "band from worker {} has {} cells, expected {}",
                rank,
                owned.len(),
                band.local_rows() * cols
            )));
        }
        data.extend(owned);
    }
    Snapshot::new(rows, cols, data).map(Some)
}




/**
 * Reduce the per-worker elapsed seconds to their maximum on rank 0: the
 * slowest worker determines the observed run time.
 */
pub fn max_elapsed<C: Communicator>(comm: &OrderedCommunicator<C>, seconds: f64) -> Result<Option<f64>> {
    comm.reduce(f64::max, seconds)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{gather_grid, max_elapsed, Snapshot};
    use crate::grid::Grid;
    use crate::message::local::{Delivery, LocalCommunicator};
    use crate::message::ordered::OrderedCommunicator;
    use crate::partition::Band;
    use std::thread;

    #[test]
    fn bands_land_at_their_row_offset() {
        let procs: Vec<_> = LocalCommunicator::group(3, Delivery::Buffered)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let comm = OrderedCommunicator::new(comm);
                    let band = Band::new(comm.rank(), 3, 6).unwrap();
                    let mut grid = Grid::new(band.local_rows(), band.cols(), 0.0).unwrap();
                    for i in grid.owned_rows() {
                        let global = (band.start_row() + i - 1) as f64;
                        grid.fill_row(i, global);
                    }
                    let snapshot = gather_grid(&comm, &band, &grid).unwrap();
                    let elapsed = max_elapsed(&comm, comm.rank() as f64 * 0.5).unwrap();
                    (snapshot, elapsed)
                })
            })
            .collect();
        let results: Vec<_> = procs.into_iter().map(|p| p.join().unwrap()).collect();

        let (snapshot, elapsed) = &results[0];
        let snapshot = snapshot.as_ref().unwrap();
        assert_eq!(snapshot.dim(), (6, 6));
        for (i, row) in snapshot.rows().enumerate() {
            assert!(row.iter().all(|&x| x == i as f64));
        }
        assert_eq!(*elapsed, Some(1.0));
        assert!(results[1..].iter().all(|(s, e)| s.is_none() && e.is_none()));
    }

    #[test]
    fn snapshot_rejects_wrong_cell_count() {
        assert!(Snapshot::new(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn max_difference_compares_same_shapes_only() {
        let a = Snapshot::new(1, 2, vec![1.0, 2.0]).unwrap();
        let b = Snapshot::new(1, 2, vec![1.5, 2.0]).unwrap();
        let c = Snapshot::new(2, 1, vec![1.0, 2.0]).unwrap();
        assert_eq!(a.max_difference(&b), Some(0.5));
        assert_eq!(a.max_difference(&c), None);
    }
}

//! Exchange of boundary rows between row-adjacent workers.
//!
//! Every worker trades its first owned row with the worker above and its last
//! owned row with the worker below, at the start of each step and before the
//! stencil reads any ghost row. On each link the even-ranked worker sends
//! first and then receives, while the odd-ranked worker receives first and
//! then sends. Links are taken upper first, then lower. Since the two ends of
//! a link always have opposite parity, no pair of workers ever both block in
//! a send to each other, and the exchange completes even when the transport
//! does not buffer messages.

use log::trace;

use crate::error::{Error, Result};
use crate::grid::{Grid, UPPER_GHOST};
use crate::message::comm::Communicator;
use crate::message::ordered::{OrderedCommunicator, Tag};
use crate::partition::Band;

/// Which side of a band a link attaches to.
#[derive(Clone, Copy, Debug)]
enum Side {
    Upper,
    Lower,
}

/// Refresh both ghost rows of `grid` with the neighbors' boundary rows of
/// the given step. Ghost rows without a neighbor are left untouched.
pub fn exchange<C: Communicator>(
    comm: &OrderedCommunicator<C>,
    band: &Band,
    grid: &mut Grid,
    step: usize,
) -> Result<()> {
    if let Some(peer) = band.upper() {
        exchange_link(comm, band, grid, step, peer, Side::Upper)?;
    }
    if let Some(peer) = band.lower() {
        exchange_link(comm, band, grid, step, peer, Side::Lower)?;
    }
    Ok(())
}

fn exchange_link<C: Communicator>(
    comm: &OrderedCommunicator<C>,
    band: &Band,
    grid: &mut Grid,
    step: usize,
    peer: usize,
    side: Side,
) -> Result<()> {
    let (boundary, ghost) = match side {
        Side::Upper => (1, UPPER_GHOST),
        Side::Lower => (grid.local_rows(), grid.lower_ghost()),
    };
    let tag = Tag::Halo { step };

    trace!(
        "[{}] step {}: exchanging {:?} halo with worker {}",
        band.rank(),
        step,
        side,
        peer
    );
    if band.rank() % 2 == 0 {
        comm.send(peer, tag, &grid.row(boundary))?;
        receive_row(comm, grid, ghost, peer, tag)
    } else {
        receive_row(comm, grid, ghost, peer, tag)?;
        comm.send(peer, tag, &grid.row(boundary))
    }
}

fn receive_row<C: Communicator>(
    comm: &OrderedCommunicator<C>,
    grid: &mut Grid,
    ghost: usize,
    peer: usize,
    tag: Tag,
) -> Result<()> {
    let row: Vec<f64> = comm.recv(peer, tag)?;

    if row.len() != grid.cols() {
        return Err(Error::Communication(format!(
            "halo row from worker {} has {} cells, expected {}",
            peer,
            row.len(),
            grid.cols()
        )));
    }
    grid.row_mut(ghost).copy_from_slice(&row);
    Ok(())
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::exchange;
    use crate::error::Error;
    use crate::grid::{Grid, UPPER_GHOST};
    use crate::message::local::{Delivery, LocalCommunicator};
    use crate::message::ordered::{OrderedCommunicator, Tag};
    use crate::partition::Band;
    use std::thread;

    /// Each worker fills its owned rows with its rank and runs a number of
    /// exchanges; returns the final ghost rows of every worker.
    fn exchange_in_group(workers: usize, delivery: Delivery, steps: usize) -> Vec<(Vec<f64>, Vec<f64>)> {
        let procs: Vec<_> = LocalCommunicator::group(workers, delivery)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let comm = OrderedCommunicator::new(comm);
                    let band = Band::new(comm.rank(), comm.size(), 4 * comm.size()).unwrap();
                    let mut grid = Grid::new(band.local_rows(), band.cols(), 0.0).unwrap();

                    for step in 0..steps {
                        let value = (comm.rank() * 100 + step) as f64;
                        for i in grid.owned_rows() {
                            grid.fill_row(i, value);
                        }
                        exchange(&comm, &band, &mut grid, step).unwrap();
                    }
                    let lower = grid.lower_ghost();
                    (grid.row(UPPER_GHOST).to_vec(), grid.row(lower).to_vec())
                })
            })
            .collect();
        procs.into_iter().map(|p| p.join().unwrap()).collect()
    }

    #[test]
    fn two_workers_trade_rows_over_rendezvous_channels() {
        let ghosts = exchange_in_group(2, Delivery::Rendezvous, 3);
        assert!(ghosts[0].0.iter().all(|x| x.is_nan()));
        assert!(ghosts[0].1.iter().all(|&x| x == 102.0));
        assert!(ghosts[1].0.iter().all(|&x| x == 2.0));
        assert!(ghosts[1].1.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn chain_of_workers_completes_over_rendezvous_channels() {
        for &workers in [3, 4, 5].iter() {
            let ghosts = exchange_in_group(workers, Delivery::Rendezvous, 10);
            for (rank, (upper, lower)) in ghosts.iter().enumerate() {
                if rank > 0 {
                    assert!(upper.iter().all(|&x| x == ((rank - 1) * 100 + 9) as f64));
                }
                if rank + 1 < workers {
                    assert!(lower.iter().all(|&x| x == ((rank + 1) * 100 + 9) as f64));
                }
            }
        }
    }

    #[test]
    fn buffered_channels_give_the_same_ghosts() {
        assert_eq!(
            format!("{:?}", exchange_in_group(4, Delivery::Buffered, 5)),
            format!("{:?}", exchange_in_group(4, Delivery::Rendezvous, 5))
        );
    }

    #[test]
    fn single_worker_exchange_is_a_no_op() {
        let comm = OrderedCommunicator::new(LocalCommunicator::group(1, Delivery::Buffered).remove(0));
        let band = Band::new(0, 1, 4).unwrap();
        let mut grid = Grid::new(4, 4, 1.0).unwrap();
        exchange(&comm, &band, &mut grid, 0).unwrap();
        assert!(grid.row(UPPER_GHOST).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn row_of_wrong_length_is_a_communication_error() {
        let procs: Vec<_> = LocalCommunicator::group(2, Delivery::Buffered)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let comm = OrderedCommunicator::new(comm);
                    if comm.rank() == 1 {
                        comm.send(0, Tag::Halo { step: 0 }, &vec![0.0; 3]).unwrap();
                        None
                    } else {
                        let band = Band::new(0, 2, 8).unwrap();
                        let mut grid = Grid::new(band.local_rows(), band.cols(), 0.0).unwrap();
                        exchange(&comm, &band, &mut grid, 0).err()
                    }
                })
            })
            .collect();
        let results: Vec<_> = procs.into_iter().map(|p| p.join().unwrap()).collect();
        assert!(matches!(results[0], Some(Error::Communication(_))));
    }
}

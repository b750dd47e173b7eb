use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use crate::aggregate::{self, Snapshot};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::grid::{DoubleBuffer, Grid};
use crate::halo;
use crate::message::comm::Communicator;
use crate::message::ordered::OrderedCommunicator;
use crate::output::GridWriter;
use crate::partition::Band;
use crate::stencil;




/**
 * What the coordinating worker knows at the end of a run.
 */
#[derive(Clone, Debug)]
pub struct Report {
    pub snapshot: Snapshot,
    /// Wall-clock seconds of the step loop on the slowest worker.
    pub max_elapsed: f64,
    pub steps: usize,
}




/**
 * One member of a group of workers solving the heat equation on a row band
 * of the grid. The worker owns its double buffer; the only thing it shares
 * with its peers is what it sends over the communicator.
 *
 * Any error raised by a worker's own operations is announced to the group
 * before it is returned, so that no peer is left waiting on a message that
 * will never come.
 */
pub struct Worker<C: Communicator> {
    comm: OrderedCommunicator<C>,
    band: Band,
    config: Config,
    buffers: DoubleBuffer,
    step: usize,
    interrupt: Option<Arc<AtomicBool>>,
}




// ============================================================================
impl<C: Communicator> Worker<C> {


    /**
     * Validate the parameters, partition the grid and allocate the buffers.
     * No halo traffic happens before this succeeds on every worker.
     */
    pub fn new(comm: C, config: Config) -> Result<Self> {
        let comm = OrderedCommunicator::new(comm);
        let prepared = config
            .validate()
            .and_then(|()| Band::new(comm.rank(), comm.size(), config.grid_size))
            .and_then(|band| DoubleBuffer::new(&band, &config).map(|buffers| (band, buffers)));

        match prepared {
            Ok((band, buffers)) => {
                info!(
                    "[{}] Owning rows {}..={} of {}",
                    band.rank(),
                    band.start_row(),
                    band.end_row(),
                    config.grid_size
                );
                Ok(Self {
                    comm,
                    band,
                    config,
                    buffers,
                    step: 0,
                    interrupt: None,
                })
            }
            Err(e) => {
                error!("[{}] {}", comm.rank(), e);
                comm.abort();
                Err(e)
            }
        }
    }


    /**
     * Have the worker check the given flag at the start of every step and
     * give up when it is set.
     */
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }


    pub fn band(&self) -> &Band {
        &self.band
    }


    pub fn config(&self) -> &Config {
        &self.config
    }


    /**
     * The grid holding the most recently completed step.
     */
    pub fn current(&self) -> &Grid {
        self.buffers.current()
    }


    pub fn steps_taken(&self) -> usize {
        self.step
    }


    /**
     * Check that every worker runs with the parameters of worker 0.
     */
    pub fn agree_on_config(&self) -> Result<()> {
        let root = if self.comm.rank() == 0 {
            Some(self.config.clone())
        } else {
            None
        };
        let agreed = self.comm.broadcast(root).and_then(|root: Config| {
            if root == self.config {
                Ok(())
            } else {
                Err(Error::Config(format!(
                    "worker {} disagrees with worker 0 on the run parameters",
                    self.comm.rank()
                )))
            }
        });
        agreed.map_err(|e| self.fail(e))
    }


    /**
     * Advance by one step: refresh the ghost rows, apply the stencil into the
     * next buffer, re-impose the source and boundary, and swap.
     */
    pub fn step(&mut self) -> Result<()> {
        let advanced = self.advance();
        advanced.map_err(|e| self.fail(e))
    }

    fn advance(&mut self) -> Result<()> {
        if self.interrupted() {
            return Err(Error::Interrupted);
        }
        halo::exchange(&self.comm, &self.band, self.buffers.current_mut(), self.step)?;

        let (current, next) = self.buffers.split();
        stencil::diffuse(current, next, self.config.alpha);
        stencil::reapply(next, &self.band, &self.config);
        self.buffers.swap();

        self.step += 1;
        debug!("[{}] Completed step {}", self.band.rank(), self.step);
        Ok(())
    }


    /**
     * Take the remaining steps and return the wall-clock seconds spent.
     */
    pub fn run_steps(&mut self) -> Result<f64> {
        let start = Instant::now();

        while self.step < self.config.steps {
            self.step()?;
        }
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "[{}] Finished {} steps in {:.6}s",
            self.band.rank(),
            self.step,
            elapsed
        );
        Ok(elapsed)
    }


    /**
     * Reduce the elapsed time, gather the grid onto worker 0 and hand it to
     * the writer there. The outcome of the write is broadcast, so a failed
     * write fails every worker. Worker 0 returns the report; the others
     * return `None`.
     */
    pub fn finish<W: GridWriter + ?Sized>(self, elapsed: f64, writer: &W) -> Result<Option<Report>> {
        let collected = self.collect(elapsed).map_err(|e| self.fail(e))?;

        let written = collected.as_ref().map(|(snapshot, _)| match writer.write(snapshot) {
            Ok(()) => None,
            Err(Error::Output(msg)) => Some(msg),
            Err(e) => Some(e.to_string()),
        });
        let status: Option<String> = self.comm.broadcast(written).map_err(|e| self.fail(e))?;

        if let Some(msg) = status {
            error!("[{}] Output failed: {}", self.band.rank(), msg);
            return Err(Error::Output(msg));
        }
        Ok(collected.map(|(snapshot, max_elapsed)| Report {
            snapshot,
            max_elapsed,
            steps: self.step,
        }))
    }

    fn collect(&self, elapsed: f64) -> Result<Option<(Snapshot, f64)>> {
        let max_elapsed = aggregate::max_elapsed(&self.comm, elapsed)?;
        let snapshot = aggregate::gather_grid(&self.comm, &self.band, self.buffers.current())?;
        Ok(snapshot.zip(max_elapsed))
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn fail(&self, e: Error) -> Error {
        if !e.is_remote() {
            error!("[{}] {}, aborting the run", self.comm.rank(), e);
            self.comm.abort();
        }
        e
    }
}




/**
 * Run one worker from start to finish: set up, agree on the parameters, take
 * every step, then aggregate and write. Worker 0 returns the report.
 */
pub fn run<C, W>(
    comm: C,
    config: Config,
    writer: &W,
    interrupt: Option<Arc<AtomicBool>>,
) -> Result<Option<Report>>
where
    C: Communicator,
    W: GridWriter + ?Sized,
{
    let mut worker = Worker::new(comm, config)?;

    if let Some(flag) = interrupt {
        worker = worker.with_interrupt(flag);
    }
    worker.agree_on_config()?;
    let elapsed = worker.run_steps()?;
    worker.finish(elapsed, writer)
}

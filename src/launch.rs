use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use core_affinity::{get_core_ids, set_for_current, CoreId};
use log::{info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::local::{Delivery, LocalCommunicator};
use crate::output::GridWriter;
use crate::simulation::{self, Report};

/// How an in-process group of workers is set up.
///
#[derive(Clone, Copy, Debug)]
pub struct ThreadOptions {
    pub delivery: Delivery,
    pub pin_cores: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            delivery: Delivery::Buffered,
            pin_cores: false,
        }
    }
}

/// Run `workers` workers as threads of this process, each on its own band of
/// the grid, and wait for all of them. If `pin_cores` is set, worker `r` is
/// pinned to core `r` modulo the number of cores. The report of worker 0 is
/// returned. If the run failed, the error of the worker that caused it is
/// returned rather than the aborts it triggered in its peers.
///
pub fn run_threads<W>(
    config: &Config,
    workers: usize,
    options: ThreadOptions,
    writer: &W,
    interrupt: Option<Arc<AtomicBool>>,
) -> Result<Report>
where
    W: GridWriter + Sync + ?Sized,
{
    if workers == 0 {
        return Err(Error::Config("at least one worker is required".into()));
    }
    let cores = if options.pin_cores {
        let cores = get_core_ids().unwrap_or_default();
        if cores.is_empty() {
            warn!("Core affinity requested but no core ids are available");
        }
        cores
    } else {
        Vec::new()
    };
    info!("Starting {} workers ({:?} delivery)", workers, options.delivery);

    let results: Vec<Result<Option<Report>>> = thread::scope(|scope| {
        let handles: Vec<_> = LocalCommunicator::group(workers, options.delivery)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let config = config.clone();
                let interrupt = interrupt.clone();
                let core = core_for(&cores, rank);

                thread::Builder::new()
                    .name(format!("worker-{}", rank))
                    .spawn_scoped(scope, move || {
                        if let Some(core) = core {
                            set_for_current(core);
                        }
                        simulation::run(comm, config, writer, interrupt)
                    })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::Communication(format!("worker {} panicked", rank)))),
                Err(e) => Err(Error::Communication(format!("failed to start worker {}: {}", rank, e))),
            })
            .collect()
    });
    collect(results)
}

/// Install SIGINT and SIGTERM handlers and return the flag they set. The
/// first signal only sets the flag, which workers notice at their next step;
/// a second signal terminates the process with exit status 1, for when a
/// worker is stuck on a peer that will never answer.
///
pub fn interrupt_on_signals() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));

    for &signal in [SIGINT, SIGTERM].iter() {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&flag))
            .and_then(|_| signal_hook::flag::register(signal, Arc::clone(&flag)))
            .map_err(|e| Error::Config(format!("failed to install signal handler: {}", e)))?;
    }
    Ok(flag)
}

fn core_for(cores: &[CoreId], rank: usize) -> Option<CoreId> {
    if cores.is_empty() {
        None
    } else {
        Some(cores[rank % cores.len()])
    }
}

/// Reduce the per-worker outcomes to one: the first error raised by a worker
/// itself wins over errors relayed from a peer.
fn collect(results: Vec<Result<Option<Report>>>) -> Result<Report> {
    let mut report = None;
    let mut relayed = None;

    for result in results {
        match result {
            Ok(Some(r)) => report = Some(r),
            Ok(None) => {}
            Err(e) if e.is_remote() => {
                relayed.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match (relayed, report) {
        (Some(e), _) => Err(e),
        (None, Some(report)) => Ok(report),
        (None, None) => Err(Error::Communication("no worker produced a report".into())),
    }
}

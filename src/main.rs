use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heatband::config::Config;
use heatband::error::Result;
use heatband::launch::{self, ThreadOptions};
use heatband::message::local::Delivery;
use heatband::message::tcp::TcpCommunicator;
use heatband::output::{FileWriter, Format, GridWriter, NullWriter};
use heatband::simulation::{self, Report};
use log::{error, info, LevelFilter};

#[derive(Debug, Parser)]
#[clap(version, about = "Distributed 2D heat diffusion on row bands")]
struct Opts {
    #[clap(short = 'n', long, default_value = "100")]
    grid_size: usize,

    #[clap(short = 's', long, default_value = "500")]
    steps: usize,

    #[clap(short = 'a', long, default_value = "0.1")]
    alpha: f64,

    #[clap(long, default_value = "20.0")]
    initial_temp: f64,

    #[clap(long, default_value = "100.0")]
    source_temp: f64,

    #[clap(long, default_value = "20.0")]
    boundary_temp: f64,

    /// Where worker 0 writes the final grid
    #[clap(short = 'o', long, default_value = "output.txt")]
    output: PathBuf,

    /// Skip writing the final grid
    #[clap(long)]
    no_output: bool,

    /// text or cbor
    #[clap(short = 'f', long, default_value = "text")]
    format: Format,

    #[clap(long, default_value = "info")]
    log_level: LevelFilter,

    #[clap(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run every worker as a thread of this process
    Threads {
        #[clap(short = 'p', long, default_value = "1")]
        workers: usize,

        #[clap(long)]
        pin_cores: bool,

        /// Hand messages over only when the receiver is waiting
        #[clap(long)]
        rendezvous: bool,
    },
    /// Run one worker of a group connected over TCP
    Tcp {
        #[clap(short = 'r', long)]
        rank: usize,

        /// Address of every worker, in rank order
        #[clap(long = "peer", required = true)]
        peers: Vec<SocketAddr>,
    },
}

impl Opts {
    fn config(&self) -> Config {
        Config {
            grid_size: self.grid_size,
            steps: self.steps,
            alpha: self.alpha,
            initial_temp: self.initial_temp,
            source_temp: self.source_temp,
            boundary_temp: self.boundary_temp,
        }
    }

    fn writer(&self) -> Box<dyn GridWriter + Sync> {
        if self.no_output {
            Box::new(NullWriter)
        } else {
            Box::new(FileWriter::new(&self.output, self.format))
        }
    }
}

fn run(opts: &Opts) -> Result<Option<Report>> {
    let config = opts.config();
    let writer = opts.writer();
    let interrupt = launch::interrupt_on_signals()?;

    match &opts.mode {
        Mode::Threads {
            workers,
            pin_cores,
            rendezvous,
        } => {
            let options = ThreadOptions {
                delivery: if *rendezvous {
                    Delivery::Rendezvous
                } else {
                    Delivery::Buffered
                },
                pin_cores: *pin_cores,
            };
            launch::run_threads(&config, *workers, options, writer.as_ref(), Some(interrupt)).map(Some)
        }
        Mode::Tcp { rank, peers } => {
            let comm = TcpCommunicator::bind(*rank, peers.clone())?;
            simulation::run(comm, config, writer.as_ref(), Some(interrupt))
        }
    }
}

fn main() {
    let opts = Opts::parse();

    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(opts.log_level)
        .init()
    {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run(&opts) {
        Ok(Some(report)) => {
            info!("Max execution time: {:.6} seconds", report.max_elapsed);
            info!("Completed {} steps on a {} x {} grid", report.steps, opts.grid_size, opts.grid_size);
        }
        Ok(None) => {}
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

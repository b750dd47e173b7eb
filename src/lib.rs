//! Heatband solves the 2D heat equation on a square grid with a group of
//! cooperating workers. The grid is split into contiguous bands of rows, one
//! per worker; every step, neighboring workers trade their edge rows (the
//! halo) and then advance their own band with an explicit 5-point stencil.
//! The outer edges of the grid are held at a fixed temperature and one cell
//! in the middle is pinned as a heat source. At the end of the run the bands
//! are gathered onto worker 0, which writes the assembled grid.
//!
//! Workers talk only through the `message::comm::Communicator` trait, so the
//! same solver runs as threads of one process (`launch::run_threads`) or as
//! separate processes over TCP (`message::tcp::TcpCommunicator`).

pub mod aggregate;
pub mod config;
pub mod error;
pub mod grid;
pub mod halo;
pub mod launch;
pub mod message;
pub mod output;
pub mod partition;
pub mod reference;
pub mod simulation;
pub mod stencil;

pub use config::Config;
pub use error::{Error, Result};

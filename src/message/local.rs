use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::debug;

use super::comm::Communicator;
use crate::error::{Error, Result};

/// Whether the channels between in-process workers hold messages for the
/// receiver, or hand them over only when the receiver is waiting.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Buffered,
    Rendezvous,
}

/// A communicator for workers running as threads of one process. Each
/// worker owns the receiving end of its inbox and a sender into every other
/// inbox of the group; message buffers are moved, never shared.
///
/// Next to the inboxes, every worker has an unbounded alarm channel. A
/// worker giving up posts its rank to every alarm, and any blocked send or
/// receive of its peers wakes up with `Error::Aborted`, whatever the
/// delivery mode of the inboxes.
///
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Option<Sender<Vec<u8>>>>,
    inbox: Receiver<Vec<u8>>,
    alarms: Vec<Sender<usize>>,
    alarm: Receiver<usize>,
}

impl LocalCommunicator {
    /// Create a connected group of `size` communicators, one per rank.
    ///
    pub fn group(size: usize, delivery: Delivery) -> Vec<Self> {
        let (sinks, sources): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| match delivery {
                Delivery::Buffered => crossbeam_channel::unbounded(),
                Delivery::Rendezvous => crossbeam_channel::bounded(0),
            })
            .unzip();
        let (alarms, alarm_sources): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        sources
            .into_iter()
            .zip(alarm_sources)
            .enumerate()
            .map(|(rank, (inbox, alarm))| LocalCommunicator {
                rank,
                peers: sinks
                    .iter()
                    .enumerate()
                    .map(|(r, sink)| if r == rank { None } else { Some(sink.clone()) })
                    .collect(),
                inbox,
                alarms: alarms.clone(),
                alarm,
            })
            .collect()
    }

    fn peer(&self, rank: usize) -> Result<&Sender<Vec<u8>>> {
        match self.peers.get(rank) {
            Some(Some(peer)) => Ok(peer),
            Some(None) => Err(Error::Communication(format!("worker {} cannot message itself", rank))),
            None => Err(Error::Communication(format!("no peer with rank {}", rank))),
        }
    }

    /// A disconnected channel usually means a peer gave up and dropped its
    /// end; report its abort in that case rather than the hang-up.
    fn abort_or(&self, e: Error) -> Error {
        match self.alarm.try_recv() {
            Ok(rank) => Error::Aborted { rank },
            Err(_) => e,
        }
    }
}

fn alarm_raised(alarm: std::result::Result<usize, crossbeam_channel::RecvError>) -> Error {
    match alarm {
        Ok(rank) => Error::Aborted { rank },
        Err(_) => Error::Communication("alarm channel closed".into()),
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        let peer = self.peer(rank)?;

        select! {
            send(peer, message) -> sent => sent.map_err(|_| {
                self.abort_or(Error::Communication(format!("worker {} has hung up", rank)))
            }),
            recv(self.alarm) -> alarm => Err(alarm_raised(alarm)),
        }
    }

    fn try_send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        self.peer(rank)?.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                Error::Communication(format!("worker {} is not receiving", rank))
            }
            TrySendError::Disconnected(_) => {
                Error::Communication(format!("worker {} has hung up", rank))
            }
        })
    }

    fn recv(&self) -> Result<Vec<u8>> {
        select! {
            recv(self.inbox) -> message => message.map_err(|_| {
                self.abort_or(Error::Communication("all peers have hung up".into()))
            }),
            recv(self.alarm) -> alarm => Err(alarm_raised(alarm)),
        }
    }

    fn signal_abort(&self) -> bool {
        for (rank, alarm) in self.alarms.iter().enumerate().filter(|&(r, _)| r != self.rank) {
            if alarm.send(self.rank).is_err() {
                debug!("[{}] Worker {} has already exited", self.rank, rank);
            }
        }
        true
    }
}

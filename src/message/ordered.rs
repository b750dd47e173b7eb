use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
};

use log::{debug, error, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{comm::Communicator, util};
use crate::error::{Error, Result};

/// Identifies what a message is for, so that a receive can be matched to
/// the right message regardless of arrival order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Halo { step: usize },
    Broadcast,
    Reduce,
    Gather,
    Abort,
}

#[derive(Serialize, Deserialize)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub data: Vec<u8>,
}

/// Wraps a transport with source-and-tag message matching. Arriving messages
/// which are not the one currently awaited (for example a halo row from a
/// neighbor which is already one step ahead) are kept, in arrival order,
/// until a matching receive is posted. An abort notice from any peer fails
/// the pending receive and every later one.
pub struct OrderedCommunicator<C> {
    comm: C,
    buffer: RefCell<HashMap<(usize, Tag), VecDeque<Vec<u8>>>>,
    aborted_by: Cell<Option<usize>>,
}

impl<C: Communicator> OrderedCommunicator<C> {
    pub fn new(comm: C) -> Self {
        Self {
            comm,
            buffer: RefCell::new(HashMap::new()),
            aborted_by: Cell::new(None),
        }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Number of received messages waiting for a matching receive.
    pub fn buffered_len(&self) -> usize {
        self.buffer.borrow().values().map(VecDeque::len).sum()
    }

    /// Serialize a value and send it to a peer under the given tag.
    pub fn send<T: Serialize>(&self, rank: usize, tag: Tag, value: &T) -> Result<()> {
        if let Some(rank) = self.aborted_by.get() {
            return Err(Error::Aborted { rank });
        }
        let envelope = Envelope {
            source: self.rank(),
            tag,
            data: encode(value)?,
        };
        self.comm
            .send(rank, encode(&envelope)?)
            .map_err(|e| self.record_abort(e))
    }

    /// Block until the message from `source` with the given tag arrives, and
    /// deserialize it.
    pub fn recv<T: DeserializeOwned>(&self, source: usize, tag: Tag) -> Result<T> {
        decode(&self.recv_bytes(source, tag)?)
    }

    fn recv_bytes(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if let Some(rank) = self.aborted_by.get() {
            return Err(Error::Aborted { rank });
        }
        let buffered = self
            .buffer
            .borrow_mut()
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front);

        if let Some(data) = buffered {
            return Ok(data);
        }
        loop {
            let bytes = self.comm.recv().map_err(|e| self.record_abort(e))?;
            let envelope: Envelope = decode(&bytes)?;

            if envelope.tag == Tag::Abort {
                error!(
                    "[{}] Received abort notice from worker {}",
                    self.rank(),
                    envelope.source
                );
                self.aborted_by.set(Some(envelope.source));
                return Err(Error::Aborted {
                    rank: envelope.source,
                });
            } else if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.data);
            } else {
                debug!(
                    "[{}] Message from {} tagged {:?} arrived early, buffering",
                    self.rank(),
                    envelope.source,
                    envelope.tag
                );
                self.buffer
                    .borrow_mut()
                    .entry((envelope.source, envelope.tag))
                    .or_insert_with(VecDeque::new)
                    .push_back(envelope.data)
            }
        }
    }

    fn record_abort(&self, e: Error) -> Error {
        if let Error::Aborted { rank } = e {
            error!("[{}] Worker {} raised the abort alarm", self.rank(), rank);
            self.aborted_by.set(Some(rank));
        }
        e
    }

    /// Tell every peer that this worker is giving up. Transports with an
    /// alarm channel deliver this reliably. Otherwise an abort notice is
    /// queued to each peer, best effort: peers that have already exited, or
    /// that cannot take a message without blocking, are skipped.
    pub fn abort(&self) {
        if self.comm.signal_abort() {
            return;
        }
        let me = self.rank();
        for rank in (0..self.size()).filter(|&r| r != me) {
            let notice = encode(&Envelope {
                source: me,
                tag: Tag::Abort,
                data: Vec::new(),
            })
            .and_then(|bytes| self.comm.try_send(rank, bytes));

            if let Err(e) = notice {
                warn!("[{}] Could not notify worker {} of abort: {}", me, rank, e);
            }
        }
    }

    /// Implements a binomial tree broadcast from rank 0. The value must be
    /// `Some` if this is the root, and it must be `None` otherwise.
    ///
    pub fn broadcast<T>(&self, value: Option<T>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let r = self.rank();
        let p = self.size();

        let value = match (r, value) {
            (0, Some(value)) => value,
            (r, None) if r != 0 => self.recv(r - (r & r.wrapping_neg()), Tag::Broadcast)?,
            _ => {
                return Err(Error::Communication(
                    "broadcast value must be given on the root only".into(),
                ))
            }
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, Tag::Broadcast, &value)?
            }
        }
        Ok(value)
    }

    /// Implements a binomial tree reduce onto rank 0. All ranks return `None`
    /// except for the root.
    ///
    pub fn reduce<T, F>(&self, f: F, mut value: T) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(T, T) -> T,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one, Tag::Reduce)?)
                }
            } else {
                self.send(r - one, Tag::Reduce, &value)?;
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    pub fn all_reduce<T, F>(&self, f: F, value: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(T, T) -> T,
    {
        let reduced = self.reduce(f, value)?;
        self.broadcast(reduced)
    }

    /// Collect one value from every rank onto rank 0, ordered by rank. All
    /// ranks return `None` except for the root.
    ///
    pub fn gather<T>(&self, value: T) -> Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.rank() == 0 {
            let mut values = Vec::with_capacity(self.size());
            values.push(value);
            for source in 1..self.size() {
                values.push(self.recv(source, Tag::Gather)?);
            }
            Ok(Some(values))
        } else {
            self.send(0, Tag::Gather, &value)?;
            Ok(None)
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::encode::to_vec(value)
        .map_err(|e| Error::Communication(format!("failed to encode message: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::decode::from_slice(bytes)
        .map_err(|e| Error::Communication(format!("failed to decode message: {}", e)))
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{OrderedCommunicator, Tag};
    use crate::error::{Error, Result};
    use crate::message::comm::Communicator;
    use crate::message::local::{Delivery, LocalCommunicator};
    use std::thread;

    fn run_group<F, T>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(OrderedCommunicator<LocalCommunicator>) -> T + Send + Copy + 'static,
        T: Send + 'static,
    {
        let procs: Vec<_> = LocalCommunicator::group(size, Delivery::Buffered)
            .into_iter()
            .map(|comm| thread::spawn(move || f(OrderedCommunicator::new(comm))))
            .collect();
        procs.into_iter().map(|p| p.join().unwrap()).collect()
    }

    #[test]
    fn receive_matches_source_and_tag_regardless_of_arrival_order() {
        let results = run_group(2, |comm| {
            if comm.rank() == 1 {
                comm.send(0, Tag::Halo { step: 1 }, &vec![1.0]).unwrap();
                comm.send(0, Tag::Halo { step: 0 }, &vec![0.0]).unwrap();
                vec![]
            } else {
                let a: Vec<f64> = comm.recv(1, Tag::Halo { step: 0 }).unwrap();
                assert_eq!(comm.buffered_len(), 1);
                let b: Vec<f64> = comm.recv(1, Tag::Halo { step: 1 }).unwrap();
                vec![a[0], b[0]]
            }
        });
        assert_eq!(results[0], vec![0.0, 1.0]);
    }

    #[test]
    fn reduce_finds_the_maximum_for_non_power_of_two_groups() {
        for &size in [1, 2, 3, 5, 7].iter() {
            let procs: Vec<_> = LocalCommunicator::group(size, Delivery::Buffered)
                .into_iter()
                .map(|comm| {
                    thread::spawn(move || {
                        let comm = OrderedCommunicator::new(comm);
                        comm.reduce(f64::max, comm.rank() as f64).unwrap()
                    })
                })
                .collect();
            let results: Vec<_> = procs.into_iter().map(|p| p.join().unwrap()).collect();
            assert_eq!(results[0], Some((size - 1) as f64));
            assert!(results[1..].iter().all(Option::is_none));
        }
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let results = run_group(6, |comm| {
            let value = if comm.rank() == 0 { Some(String::from("hot")) } else { None };
            comm.broadcast(value).unwrap()
        });
        assert!(results.iter().all(|s| s == "hot"));
    }

    #[test]
    fn broadcast_value_on_a_non_root_is_an_error() {
        let results = run_group(2, |comm| {
            if comm.rank() == 1 {
                comm.broadcast(Some(1usize)).is_err()
            } else {
                true
            }
        });
        assert!(results[1]);
    }

    #[test]
    fn all_reduce_sums_on_every_rank() {
        let results = run_group(5, |comm| comm.all_reduce(|a, b| a + b, comm.rank()).unwrap());
        assert!(results.iter().all(|&s| s == 10));
    }

    #[test]
    fn gather_orders_values_by_rank() {
        let results = run_group(4, |comm| comm.gather(comm.rank() * 10).unwrap());
        assert_eq!(results[0], Some(vec![0, 10, 20, 30]));
        assert!(results[1..].iter().all(Option::is_none));
    }

    #[test]
    fn abort_notice_fails_pending_and_later_receives() {
        let results = run_group(3, |comm| {
            if comm.rank() == 2 {
                comm.abort();
                None
            } else {
                let first = comm.recv::<usize>(2, Tag::Gather).err();
                let later = comm.recv::<usize>(1, Tag::Gather).err();
                assert_eq!(first, later);
                first
            }
        });
        assert_eq!(results[0], Some(Error::Aborted { rank: 2 }));
        assert_eq!(results[1], Some(Error::Aborted { rank: 2 }));
    }

    /// A transport without an alarm channel, so aborts go in band.
    struct InBand(LocalCommunicator);

    impl Communicator for InBand {
        fn rank(&self) -> usize {
            self.0.rank()
        }
        fn size(&self) -> usize {
            self.0.size()
        }
        fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
            self.0.send(rank, message)
        }
        fn recv(&self) -> Result<Vec<u8>> {
            self.0.recv()
        }
    }

    #[test]
    fn in_band_abort_notice_reaches_every_peer() {
        let procs: Vec<_> = LocalCommunicator::group(3, Delivery::Buffered)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let comm = OrderedCommunicator::new(InBand(comm));
                    if comm.rank() == 0 {
                        comm.abort();
                        None
                    } else {
                        comm.recv::<usize>(0, Tag::Reduce).err()
                    }
                })
            })
            .collect();
        let results: Vec<_> = procs.into_iter().map(|p| p.join().unwrap()).collect();
        assert_eq!(results[1], Some(Error::Aborted { rank: 0 }));
        assert_eq!(results[2], Some(Error::Aborted { rank: 0 }));
    }

    #[test]
    fn sends_fail_once_a_peer_has_aborted() {
        let mut group = LocalCommunicator::group(2, Delivery::Rendezvous);
        let failing = OrderedCommunicator::new(group.pop().unwrap());
        let comm = OrderedCommunicator::new(group.pop().unwrap());

        failing.abort();
        assert_eq!(comm.recv::<usize>(1, Tag::Gather).err(), Some(Error::Aborted { rank: 1 }));
        assert_eq!(comm.send(1, Tag::Gather, &7usize).err(), Some(Error::Aborted { rank: 1 }));
    }
}

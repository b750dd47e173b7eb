use std::collections::hash_map::{Entry, HashMap};
use std::io::{self, prelude::*};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use super::{
    backoff::{ExponentialBackoff, Retry},
    comm::Communicator,
    util,
};
use crate::error::{Error, Result};

const CXN_R_TIMEOUT: Duration = Duration::from_millis(5000);
const CXN_W_TIMEOUT: Duration = Duration::from_millis(5000);
const RETRY_WAIT: Duration = Duration::from_millis(250);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(5000);
const CONNECT_ATTEMPTS: usize = 10;
const SEND_ATTEMPTS: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

type Outbound = (usize, Vec<u8>);
type Failure = Arc<Mutex<Option<String>>>;

/// The threads behind a TCP communicator: one listener accepting peer
/// connections (with one reader thread per connection), and one serial
/// sender which owns the outgoing streams. Every frame is length-prefixed
/// and acknowledged by the receiver with the number of bytes it read.
pub struct TcpHost {
    listen_thread: Option<JoinHandle<()>>,
    send_thread: Option<JoinHandle<()>>,
}

impl TcpHost {
    pub fn new(
        listener: TcpListener,
        peers: Vec<SocketAddr>,
    ) -> (Self, Sender<Outbound>, Receiver<Vec<u8>>, Failure) {
        let failure: Failure = Arc::new(Mutex::new(None));

        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let send_thread = Self::start_serial_sender(peers, send_src, Arc::clone(&failure));

        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let listen_thread = Self::start_listener(listener, recv_sink);

        (
            TcpHost {
                send_thread: Some(send_thread),
                listen_thread: Some(listen_thread),
            },
            send_sink,
            recv_src,
            failure,
        )
    }

    /// Wait for the sender to flush every queued message. The outbound
    /// channel must have been dropped first. The listener is left running;
    /// it is torn down with the process.
    pub fn join(&mut self) {
        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("TCP sender thread panicked");
            }
        }
        self.listen_thread.take();
    }

    fn start_serial_sender(
        peers: Vec<SocketAddr>,
        send_src: Receiver<Outbound>,
        failure: Failure,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut table: HashMap<usize, TcpStream> = HashMap::new();

            for (rank, message) in send_src {
                if let Err(e) = Self::deliver(&mut table, &peers, rank, &message) {
                    error!("Failed to send message to worker {}: {}", rank, e);
                    if let Ok(mut failure) = failure.lock() {
                        *failure = Some(format!("send to worker {} failed: {}", rank, e));
                    }
                    break;
                }
            }
            debug!("TCP sender shutting down");
        })
    }

    /// Write one frame to a peer and wait for its acknowledgement. Only
    /// connecting and writing are retried: once a frame is on the wire it is
    /// never sent again, since the peer may already have taken it and a
    /// second copy would be matched by a later receive.
    fn deliver(
        table: &mut HashMap<usize, TcpStream>,
        peers: &[SocketAddr],
        rank: usize,
        message: &[u8],
    ) -> io::Result<()> {
        let addr = *peers.get(rank).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no peer with rank {}", rank))
        })?;

        ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2)
            .take(SEND_ATTEMPTS)
            .retry(
                || -> io::Result<()> {
                    let client = match table.entry(rank) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => entry.insert(Self::connect_with_retry(addr)?),
                    };
                    let result = util::write_frame(client, message);
                    if result.is_err() {
                        table.remove(&rank);
                    }
                    result
                },
                |e, delay| {
                    warn!("Send to {} failed: {}, retrying in {:?}", addr, e, delay);
                    thread::sleep(delay)
                },
            )
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "no send attempts")))?;

        let acked = match table.get_mut(&rank) {
            Some(client) => Self::await_ack(client, message.len()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "connection lost")),
        };
        if acked.is_err() {
            table.remove(&rank);
        }
        acked
    }

    fn await_ack(client: &mut TcpStream, sent: usize) -> io::Result<()> {
        let ack = util::read_usize(client)?;

        if ack != sent {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("receiver acknowledged {} bytes but {} were sent", ack, sent),
            ));
        }
        Ok(())
    }

    fn start_listener(listener: TcpListener, recv_sink: Sender<Vec<u8>>) -> JoinHandle<()> {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream.and_then(|s| s.peer_addr().map(|remote| (s, remote))) {
                    Ok((stream, remote)) => Self::handle_connection(stream, remote, recv_sink.clone()),
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
        })
    }

    fn handle_connection(mut stream: TcpStream, remote: SocketAddr, recv_sink: Sender<Vec<u8>>) {
        info!("Receiving connection from {}", remote);
        thread::spawn(move || loop {
            let received = util::read_usize(&mut stream)
                .and_then(|size| util::read_bytes_vec(&mut stream, size))
                .and_then(|bytes| {
                    let num_bytes = bytes.len();
                    recv_sink
                        .send(bytes)
                        .map(|()| num_bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
                })
                .and_then(|size| stream.write_all(&size.to_le_bytes()));

            if let Err(e) = received {
                match e.kind() {
                    io::ErrorKind::UnexpectedEof => debug!("Connection from {} closed", remote),
                    _ => warn!("Connection from {} failed: {}", remote, e),
                }
                break;
            }
        });
    }

    fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
        info!("Connecting to {}", addr);

        ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2)
            .take(CONNECT_ATTEMPTS)
            .retry(
                || -> io::Result<TcpStream> {
                    let s = TcpStream::connect(addr)?;
                    s.set_read_timeout(Some(CXN_R_TIMEOUT))?;
                    s.set_write_timeout(Some(CXN_W_TIMEOUT))?;
                    s.set_nodelay(true)?;
                    Ok(s)
                },
                |e, delay| {
                    debug!("Connect to {} failed: {}", addr, e);
                    thread::sleep(delay)
                },
            )
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "no connection attempts")))
    }
}

/////////////////////////////////////////////////////
/////////////////////////////////////////////////////
/////////////////////////////////////////////////////
/////////////////////////////////////////////////////

/// A communicator for workers running as separate processes, addressed by
/// a list of socket addresses indexed by rank. Sends are queued and return
/// immediately; a sender failure is reported by the next send or receive.
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    host: TcpHost,
    send_sink: Option<Sender<Outbound>>,
    recv_src: Receiver<Vec<u8>>,
    failure: Failure,
}

impl TcpCommunicator {
    /// Listen on this rank's own address in `peers`.
    pub fn bind(rank: usize, peers: Vec<SocketAddr>) -> Result<Self> {
        let addr = *peers
            .get(rank)
            .ok_or_else(|| Error::Config(format!("no address for rank {}", rank)))?;
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Communication(format!("failed to listen on {}: {}", addr, e)))?;
        Self::from_listener(rank, listener, peers)
    }

    /// Use an already bound listener, e.g. one bound to an ephemeral port.
    pub fn from_listener(rank: usize, listener: TcpListener, peers: Vec<SocketAddr>) -> Result<Self> {
        if rank >= peers.len() {
            return Err(Error::Config(format!(
                "rank {} out of range for {} peers",
                rank,
                peers.len()
            )));
        }
        if let Ok(addr) = listener.local_addr() {
            info!("Listening to: {}", addr);
        }
        let num_peers = peers.len();
        let (host, send_sink, recv_src, failure) = TcpHost::new(listener, peers);

        Ok(Self {
            rank,
            num_peers,
            host,
            send_sink: Some(send_sink),
            recv_src,
            failure,
        })
    }

    fn check_failure(&self) -> Result<()> {
        let failure = match self.failure.lock() {
            Ok(failure) => failure.clone(),
            Err(_) => Some("TCP sender thread panicked".into()),
        };
        match failure {
            Some(msg) => Err(Error::Communication(msg)),
            None => Ok(()),
        }
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        self.check_failure()?;
        self.send_sink
            .as_ref()
            .ok_or_else(|| Error::Communication("communicator is shut down".into()))?
            .send((rank, message))
            .map_err(|_| Error::Communication("TCP sender has stopped".into()))
    }

    fn recv(&self) -> Result<Vec<u8>> {
        loop {
            match self.recv_src.recv_timeout(POLL_INTERVAL) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => self.check_failure()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Communication("TCP listener has stopped".into()))
                }
            }
        }
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        self.send_sink.take();
        self.host.join();
    }
}

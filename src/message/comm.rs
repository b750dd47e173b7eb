use crate::error::Result;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, in-process
/// channels, or a higher level abstraction like MPI.
///
/// Messages between a given pair of ranks must be delivered in the order
/// they were sent. Message matching and the collectives live in
/// [`super::ordered::OrderedCommunicator`].
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. A buffered transport
    /// returns immediately; a rendezvous transport may block until the peer
    /// receives. Callers must be deadlock-free under both.
    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()>;

    /// Send a message only if it can be done without blocking. Used for
    /// best-effort notices on the shutdown path. Buffered transports can
    /// rely on the default, which forwards to `send`.
    fn try_send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        self.send(rank, message)
    }

    /// Raise an out-of-band alarm telling every peer that this rank is
    /// giving up, so that peers blocked in a send or receive fail with
    /// `Error::Aborted`. Returns `false` if the transport has no such
    /// channel; the caller then sends an in-band notice instead.
    fn signal_abort(&self) -> bool {
        false
    }

    /// Must be implemented to receive a message from any of the peers. This
    /// method is allowed to block until a message is ready to be received.
    fn recv(&self) -> Result<Vec<u8>>;
}

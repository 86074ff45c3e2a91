//! In-memory doubles for the I/O traits

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::protocol::{decode_available, encode, Envelope};
use crate::traits::{Listener, NetworkError, PeerAddr, Stream};

#[derive(Debug, Default)]
struct MockState {
    /// Bytes sent by the peer, not yet read by the stream
    inbound: VecDeque<u8>,
    /// Bytes written by the stream, not yet taken by the peer
    outbound: Vec<u8>,
    peer_closed: bool,
    /// Max bytes accepted per write; `Some(0)` makes every write block
    write_limit: Option<usize>,
    read_error: Option<NetworkError>,
    write_error: Option<NetworkError>,
    closed: bool,
    reads: usize,
    writes: usize,
}

/// Local end handed to the code under test
#[derive(Debug)]
pub struct MockStream {
    state: Rc<RefCell<MockState>>,
}

/// Remote end driven by the test
#[derive(Debug, Clone)]
pub struct MockPeer {
    state: Rc<RefCell<MockState>>,
}

pub fn pair() -> (MockStream, MockPeer) {
    let state = Rc::new(RefCell::new(MockState::default()));
    (
        MockStream {
            state: state.clone(),
        },
        MockPeer { state },
    )
}

impl Stream for MockStream {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if let Some(e) = state.read_error {
            return Err(e);
        }
        if state.inbound.is_empty() {
            return if state.peer_closed {
                Ok(0)
            } else {
                Err(NetworkError::WouldBlock)
            };
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> Result<usize, NetworkError> {
        let mut state = self.state.borrow_mut();
        state.writes += 1;
        if let Some(e) = state.write_error {
            return Err(e);
        }
        if state.peer_closed {
            return Err(NetworkError::ConnectionClosed);
        }
        let n = match state.write_limit {
            Some(0) => return Err(NetworkError::WouldBlock),
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        state.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

impl MockPeer {
    pub fn send(&self, bytes: &[u8]) {
        self.state.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    pub fn send_envelope(&self, envelope: &Envelope) {
        let frame = encode(envelope).unwrap();
        self.send(&frame);
    }

    /// Hang up: reads see end of stream once inbound data is drained
    pub fn hang_up(&self) {
        self.state.borrow_mut().peer_closed = true;
    }

    /// Stop draining: every write on the local end would block
    pub fn stall(&self) {
        self.set_write_limit(Some(0));
    }

    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.borrow_mut().write_limit = limit;
    }

    pub fn fail_reads(&self, error: NetworkError) {
        self.state.borrow_mut().read_error = Some(error);
    }

    pub fn fail_writes(&self, error: NetworkError) {
        self.state.borrow_mut().write_error = Some(error);
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().outbound)
    }

    /// Decode every complete frame written so far, leaving partial ones
    pub fn received(&self) -> Vec<Envelope> {
        let mut state = self.state.borrow_mut();
        let batch = decode_available(&state.outbound, usize::MAX);
        assert_eq!(batch.error, None, "local end wrote a bad frame");
        state.outbound.drain(..batch.consumed);
        batch.envelopes
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }

    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }
}

#[derive(Debug, Default)]
struct ListenerState {
    pending: VecDeque<MockStream>,
    accept_error: Option<NetworkError>,
    closed: bool,
    next_peer: u32,
}

#[derive(Debug)]
pub struct MockListener {
    state: Rc<RefCell<ListenerState>>,
}

/// Test-side handle for queueing connections on a [`MockListener`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Rc<RefCell<ListenerState>>,
}

pub fn listener() -> (MockListener, MockConnector) {
    let state = Rc::new(RefCell::new(ListenerState::default()));
    (
        MockListener {
            state: state.clone(),
        },
        MockConnector { state },
    )
}

impl MockConnector {
    /// Queue a pending connection and return its remote end
    pub fn connect(&self) -> MockPeer {
        let (stream, peer) = pair();
        self.state.borrow_mut().pending.push_back(stream);
        peer
    }

    pub fn fail_accepts(&self, error: Option<NetworkError>) {
        self.state.borrow_mut().accept_error = error;
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

impl Listener for MockListener {
    type Stream = MockStream;

    fn try_accept(&mut self) -> Result<(MockStream, PeerAddr), NetworkError> {
        let mut state = self.state.borrow_mut();
        if let Some(e) = state.accept_error {
            return Err(e);
        }
        let stream = state.pending.pop_front().ok_or(NetworkError::WouldBlock)?;
        state.next_peer += 1;
        Ok((stream, PeerAddr::new(format!("mock-{}", state.next_peer))))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

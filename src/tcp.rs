//! A simulated TCP endpoint.
//!
//! The pieces compose bottom-up: [`tcp_parsing`] decodes and encodes
//! headers, [`tcb`] holds the connection state machine, [`TcpSession`]
//! drives one machine and owns its buffers, and [`Tcp`] multiplexes many
//! sessions behind one wire interface. [`TcpSocket`] is the
//! application-facing handle.

use self::tcb::Segment;
use self::tcp_parsing::{ParseError, TcpHeader};
use crate::utility::SessionId;
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub mod tcb;
pub mod tcp_parsing;

mod tcp_session;
pub use tcp_session::{InvalidOperationError, SendError, TcpSession};

mod tcp_socket;
pub use tcp_socket::{SocketError, TcpSocket};

/// Multiplexes simulated TCP connections behind a single wire interface.
///
/// Sessions are keyed by port pair. Inbound frames are routed to the
/// session for their pair; a frame with no session is offered to the
/// listener bound to its destination port, and a listener's request for a
/// new connection makes the multiplexer allocate a child session and feed
/// it the same connection request. The listener's own state never leaves
/// listening.
pub struct Tcp {
    sessions: DashMap<SessionId, Arc<Mutex<TcpSession>>>,
    listeners: DashMap<u16, Arc<Mutex<TcpSession>>>,
    accept_queues: DashMap<u16, VecDeque<SessionId>>,
    /// Replies owed to segments that matched no session, such as resets.
    replies: Mutex<VecDeque<Segment>>,
    iss: Mutex<Iss>,
}

impl Tcp {
    pub fn new(iss: Iss) -> Self {
        Self {
            sessions: Default::default(),
            listeners: Default::default(),
            accept_queues: Default::default(),
            replies: Default::default(),
            iss: Mutex::new(iss),
        }
    }

    pub fn new_shared(iss: Iss) -> Arc<Self> {
        Arc::new(Self::new(iss))
    }

    fn next_iss(&self) -> u32 {
        let mut lock = self.iss.lock().unwrap();
        let out = *lock;
        if let Iss::FromSeed(c) = *lock {
            *lock = Iss::FromSeed(c + 1);
        }
        // The block refuses sequence numbers at or past its send window, so
        // initial numbers must start in the window's lower half.
        u32::from(out) % (tcb::INITIAL_SEND_WINDOW as u32 / 2)
    }

    /// Opens an active connection from `local_port` to `remote_port`. The
    /// connection request lands on the new session's outgoing queue.
    pub fn open(&self, local_port: u16, remote_port: u16) -> Result<SessionId, OpenError> {
        let id = SessionId::new(local_port, remote_port);
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(OpenError::Existing(id)),
            Entry::Vacant(entry) => {
                let mut session = TcpSession::with_iss(id, self.next_iss());
                session.connect()?;
                entry.insert(Arc::new(Mutex::new(session)));
                Ok(id)
            }
        }
    }

    /// Binds a listener to `port`.
    pub fn listen(&self, port: u16) -> Result<(), ListenError> {
        match self.listeners.entry(port) {
            Entry::Occupied(_) => Err(ListenError::PortInUse(port)),
            Entry::Vacant(entry) => {
                let mut session = TcpSession::new(SessionId::new(port, 0));
                session.listen()?;
                entry.insert(Arc::new(Mutex::new(session)));
                self.accept_queues.insert(port, VecDeque::new());
                Ok(())
            }
        }
    }

    /// Routes one wire frame to the session it belongs to.
    pub fn demux(&self, frame: Bytes) -> Result<(), DemuxError> {
        let header = TcpHeader::from_bytes(&mut frame.iter().copied())?;
        let text = frame.slice(TcpHeader::BYTES..);
        let segment = Segment::new(header, text);
        let id = SessionId::new(header.dst_port, header.src_port);

        if let Some(session) = self.sessions.get(&id) {
            session.lock().unwrap().segment_arrives(segment);
            return Ok(());
        }

        if let Some(listener) = self.listeners.get(&header.dst_port) {
            let reaction = listener.lock().unwrap().segment_arrives(segment.clone());
            if reaction.requests_new_connection() {
                self.spawn_child(id, segment);
            }
            return Ok(());
        }

        if header.control.syn() && !header.control.ack() {
            // A connection request for a port nobody listens on
            tracing::warn!(port = header.dst_port, "connection request refused");
            return Err(DemuxError::MissingSession);
        }

        self.respond_from_closed(id, &segment);
        Err(DemuxError::MissingSession)
    }

    /// Allocates a child session for a connection a listener accepted and
    /// hands it the connection request, which it answers.
    fn spawn_child(&self, id: SessionId, segment: Segment) {
        if let Entry::Vacant(entry) = self.sessions.entry(id) {
            let mut child = TcpSession::with_iss(id, self.next_iss());
            child.segment_arrives(segment);
            entry.insert(Arc::new(Mutex::new(child)));
            if let Some(mut queue) = self.accept_queues.get_mut(&id.local) {
                queue.push_back(id);
            }
        }
    }

    /// Answers a segment for which no connection exists. A fresh block in
    /// the closed state decides the reply.
    fn respond_from_closed(&self, id: SessionId, segment: &Segment) {
        let mut orphan = TcpSession::new(id);
        orphan.segment_arrives(segment.clone());
        self.replies.lock().unwrap().extend(orphan.segments());
    }

    /// Abandons a connection: emits a reset for it and discards its
    /// session. Returns whether the session existed.
    pub fn abort(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, session)) => {
                let session = session.lock().unwrap();
                match session.rst_segment() {
                    Ok(rst) => self.replies.lock().unwrap().push_back(rst),
                    Err(e) => tracing::error!("dropping reset segment: {}", e),
                }
                true
            }
            None => false,
        }
    }

    /// Drains every segment queued for the wire across all sessions,
    /// including replies owed to unmatched segments.
    pub fn collect_segments(&self) -> Vec<Segment> {
        let mut out: Vec<Segment> = self.replies.lock().unwrap().drain(..).collect();
        for entry in self.sessions.iter() {
            out.extend(entry.value().lock().unwrap().segments());
        }
        out
    }

    /// The session for `id`, if one exists. A listener is addressed by its
    /// port with a zero remote port.
    pub fn session(&self, id: SessionId) -> Option<Arc<Mutex<TcpSession>>> {
        if id.remote == 0 {
            return self.listeners.get(&id.local).map(|s| s.clone());
        }
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Takes the oldest connection spawned for the listener on `port`.
    pub(crate) fn pop_accepted(&self, port: u16) -> Option<SessionId> {
        self.accept_queues.get_mut(&port)?.pop_front()
    }
}

/// The initial send sequence of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Iss {
    #[default]
    Random,
    FromSeed(u64),
}

impl From<Iss> for u32 {
    fn from(iss: Iss) -> Self {
        let mut rng = match iss {
            Iss::Random => SmallRng::from_entropy(),
            Iss::FromSeed(c) => SmallRng::seed_from_u64(c),
        };
        rng.next_u32()
    }
}

/// An error that occurred during [`Tcp::open`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    #[error("a session for {0:?} already exists")]
    Existing(SessionId),
    #[error("{0}")]
    Connect(#[from] InvalidOperationError),
}

/// An error that occurred during [`Tcp::listen`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ListenError {
    #[error("port {0:#06x} already has a listener")]
    PortInUse(u16),
    #[error("{0}")]
    Listen(#[from] InvalidOperationError),
}

/// An error that occurred during [`Tcp::demux`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum DemuxError {
    #[error("{0}")]
    Header(#[from] ParseError),
    #[error("failed to find a session to demux to")]
    MissingSession,
}

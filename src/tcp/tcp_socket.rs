//! Application-facing connection handles.

use super::tcb::State;
use super::tcp_session::{InvalidOperationError, SendError, TcpSession};
use super::{ListenError, OpenError, Tcp};
use crate::utility::SessionId;
use bytes::Bytes;
use std::sync::Arc;

/// A handle to one connection or listener owned by a [`Tcp`] multiplexer.
///
/// Handles are cheap to clone and address their session by port pair; a
/// handle whose session has been aborted reports [`SocketError::Closed`].
#[derive(Clone)]
pub struct TcpSocket {
    tcp: Arc<Tcp>,
    id: SessionId,
}

impl TcpSocket {
    /// Opens an active connection and returns a handle to it.
    pub fn connect(tcp: Arc<Tcp>, local_port: u16, remote_port: u16) -> Result<Self, OpenError> {
        let id = tcp.open(local_port, remote_port)?;
        Ok(Self { tcp, id })
    }

    /// Binds a listener to `port` and returns a handle to it.
    pub fn listen(tcp: Arc<Tcp>, port: u16) -> Result<Self, ListenError> {
        tcp.listen(port)?;
        Ok(Self {
            tcp,
            id: SessionId::new(port, 0),
        })
    }

    /// Takes the oldest connection spawned for this listener, if any.
    pub fn accept(&self) -> Option<TcpSocket> {
        let id = self.tcp.pop_accepted(self.id.local)?;
        Some(TcpSocket {
            tcp: self.tcp.clone(),
            id,
        })
    }

    /// Queues `text` for transmission on this connection.
    pub fn send(&self, text: impl Into<Bytes>) -> Result<(), SocketError> {
        self.with_session(|session| session.send(text.into()))?
            .map_err(SocketError::from)
    }

    /// Takes the text received in order so far.
    pub fn receive(&self) -> Result<Bytes, SocketError> {
        self.with_session(|session| session.receive())
    }

    /// Begins an orderly teardown of this connection.
    pub fn close(&self) -> Result<(), SocketError> {
        self.with_session(|session| session.close())?
            .map_err(SocketError::from)
    }

    pub fn state(&self) -> Result<State, SocketError> {
        self.with_session(|session| session.state())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut TcpSession) -> T) -> Result<T, SocketError> {
        let session = self.tcp.session(self.id).ok_or(SocketError::Closed)?;
        let mut session = session.lock().unwrap();
        Ok(f(&mut session))
    }
}

/// An error surfaced through a [`TcpSocket`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    #[error("the socket's session no longer exists")]
    Closed,
    #[error("{0}")]
    Send(#[from] SendError),
    #[error("{0}")]
    InvalidOperation(#[from] InvalidOperationError),
}

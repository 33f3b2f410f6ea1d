//! The driver for a single connection.
//!
//! A [`TcpSession`] pairs a transmission control block with the buffers the
//! block itself refuses to own: the queue of outbound segments, the text
//! accepted from the remote TCP, and the inbound segment currently being
//! processed. It is the crate's [`TcpCallbacks`] implementation; every
//! reaction a step produces is replayed against the session that produced
//! it, in composition order.

use super::tcb::{Event, Reaction, Segment, State, Tcb, TcpCallbacks};
use super::tcp_parsing::{BuildHeaderError, TcpHeaderBuilder};
use crate::logging;
use crate::utility::SessionId;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, VecDeque};

/// The session part of a simulated TCP endpoint.
#[derive(Debug)]
pub struct TcpSession {
    id: SessionId,
    tcb: Tcb,
    /// The inbound segment being processed, consumed by an Accept effect.
    current: Option<Segment>,
    /// Sequence-space length of the inbound segment being processed.
    current_len: u32,
    /// Segments ready for the wire.
    outgoing: VecDeque<Segment>,
    /// Accepted text not yet part of the in-order prefix, keyed by sequence
    /// number.
    unsequenced: BTreeMap<u32, Bytes>,
    /// In-order text awaiting the application.
    received: VecDeque<Bytes>,
    violation: Option<Violation>,
}

#[derive(Debug, Clone, Copy)]
enum Violation {
    InvalidOperation,
    OutOfWindow(u16),
}

impl TcpSession {
    /// A session for `id` in the closed state.
    pub fn new(id: SessionId) -> Self {
        Self::with_tcb(id, Tcb::new())
    }

    /// A session whose connection will open with the given initial send
    /// sequence number.
    pub fn with_iss(id: SessionId, iss: u32) -> Self {
        Self::with_tcb(id, Tcb::with_iss(iss))
    }

    fn with_tcb(id: SessionId, tcb: Tcb) -> Self {
        Self {
            id,
            tcb,
            current: None,
            current_len: 0,
            outgoing: VecDeque::new(),
            unsequenced: BTreeMap::new(),
            received: VecDeque::new(),
            violation: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> State {
        self.tcb.state()
    }

    pub fn local_window(&self) -> u16 {
        self.tcb.local_window()
    }

    pub fn peer_window(&self) -> u16 {
        self.tcb.peer_window()
    }

    /// Start accepting connection requests.
    pub fn listen(&mut self) -> Result<(), InvalidOperationError> {
        self.drive(Event::Listen, None);
        self.finish_event()
    }

    /// Initiate the connection; a SYN lands on the outgoing queue.
    pub fn connect(&mut self) -> Result<(), InvalidOperationError> {
        self.drive(Event::Connect, None);
        self.finish_event()
    }

    /// Begin an orderly teardown; a FIN lands on the outgoing queue.
    pub fn close(&mut self) -> Result<(), InvalidOperationError> {
        self.drive(Event::Close, None);
        self.finish_event()
    }

    /// Queues `text` for transmission, stamped with this connection's
    /// sequence numbers.
    pub fn send(&mut self, text: Bytes) -> Result<(), SendError> {
        let draft = TcpHeaderBuilder::new(self.id, 0)
            .window(self.tcb.local_window())
            .build(text.iter().copied())?;
        let mut segment = Segment::new(draft, text);

        self.drive(Event::Send, Some(&mut segment));
        match self.violation.take() {
            Some(Violation::OutOfWindow(window)) => Err(SendError::OutOfWindow { window }),
            Some(Violation::InvalidOperation) => Err(SendError::InvalidState),
            None => {
                // Stamping assigned the sequence numbers after the checksum
                // was computed, so rebuild the header.
                segment.header = TcpHeaderBuilder::new(self.id, segment.header.sequence)
                    .ack(segment.header.acknowledgement)
                    .window(segment.header.window)
                    .build(segment.text.iter().copied())?;
                self.push_segment(segment);
                Ok(())
            }
        }
    }

    /// Processes a segment from the remote TCP and returns the reaction it
    /// produced, after replaying it against this session.
    pub fn segment_arrives(&mut self, segment: Segment) -> Reaction {
        logging::segment_received_event(self.id, &segment.header, segment.text.len());
        let old = self.tcb.state();
        let reaction = self.tcb.segment_arrives(&segment);
        self.current_len = segment.seg_len();
        self.current = Some(segment);
        reaction.perform(self);
        self.current = None;
        self.log_state_change(old);
        reaction
    }

    /// Takes every segment queued for the wire, oldest first.
    pub fn segments(&mut self) -> Vec<Segment> {
        self.outgoing.drain(..).collect()
    }

    /// Takes the text received in order so far.
    pub fn receive(&mut self) -> Bytes {
        let mut text = BytesMut::new();
        for chunk in self.received.drain(..) {
            text.extend_from_slice(&chunk);
        }
        text.freeze()
    }

    /// The reset a driver emits when it abandons this connection.
    pub fn rst_segment(&self) -> Result<Segment, BuildHeaderError> {
        let header = self
            .header_builder(self.tcb.snd.nxt)
            .rst()
            .build([].into_iter())?;
        Ok(Segment::new(header, Bytes::new()))
    }

    fn drive(&mut self, event: Event, segment: Option<&mut Segment>) {
        let old = self.tcb.state();
        let reaction = self.tcb.on_event(event, segment);
        reaction.perform(self);
        self.log_state_change(old);
    }

    fn finish_event(&mut self) -> Result<(), InvalidOperationError> {
        match self.violation.take() {
            Some(_) => Err(InvalidOperationError),
            None => Ok(()),
        }
    }

    fn log_state_change(&self, old: State) {
        if old != self.tcb.state() {
            logging::state_change_event(self.id, old, self.tcb.state());
        }
    }

    fn header_builder(&self, sequence: u32) -> TcpHeaderBuilder {
        TcpHeaderBuilder::new(self.id, sequence)
    }

    fn emit(&mut self, builder: TcpHeaderBuilder) {
        match builder.build([].into_iter()) {
            Ok(header) => self.push_segment(Segment::new(header, Bytes::new())),
            Err(e) => tracing::error!("dropping control segment: {}", e),
        }
    }

    fn push_segment(&mut self, segment: Segment) {
        logging::segment_sent_event(self.id, &segment.header, segment.text.len());
        self.outgoing.push_back(segment);
    }

    /// Moves accepted text into the receive queue as the in-order prefix
    /// extends.
    fn deliver(&mut self) {
        while let Some((&sequence, _)) = self.unsequenced.first_key_value() {
            if sequence >= self.tcb.rcv.nxt {
                break;
            }
            if let Some(text) = self.unsequenced.remove(&sequence) {
                self.received.push_back(text);
            }
        }
    }
}

impl TcpCallbacks for TcpSession {
    fn send_syn(&mut self, seq: u32, wnd: u16) {
        self.emit(self.header_builder(seq).syn().window(wnd));
    }

    fn send_syn_ack(&mut self, seq: u32, ack: u32, wnd: u16) {
        self.emit(self.header_builder(seq).syn().ack(ack).window(wnd));
    }

    fn send_ack(&mut self, seq: u32, ack: u32, wnd: u16) {
        // A segment that occupied no sequence space needs no acknowledgment;
        // answering one would keep two endpoints acknowledging each other's
        // acknowledgments.
        if self.current_len == 0 {
            return;
        }
        self.emit(self.header_builder(seq).ack(ack).window(wnd));
    }

    fn send_fin(&mut self, seq: u32, ack: u32, wnd: u16) {
        self.emit(self.header_builder(seq).fin().ack(ack).window(wnd));
    }

    fn send_rst(&mut self, seq: u32) {
        self.emit(self.header_builder(seq).rst());
    }

    fn accept(&mut self) {
        if let Some(segment) = self.current.take() {
            // Text only matters once the connection carries data
            if self.tcb.state() == State::Established && !segment.text.is_empty() {
                self.unsequenced.insert(segment.header.sequence, segment.text);
            }
        }
        self.deliver();
    }

    fn discard(&mut self) {
        self.current = None;
    }

    fn seq_out_of_range(&mut self, wnd: u16) {
        self.violation = Some(Violation::OutOfWindow(wnd));
    }

    fn invalid_operation(&mut self) {
        self.violation = Some(Violation::InvalidOperation);
    }

    fn new_connection(&mut self) {
        // The multiplexer allocates the child; nothing to do locally.
        tracing::trace!(port = self.id.local, "connection requested");
    }
}

/// The requested operation is not legal in the connection's current state.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("the operation is not legal in the connection's current state")]
pub struct InvalidOperationError;

/// An error that occurred during [`TcpSession::send`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("the connection cannot carry data in its current state")]
    InvalidState,
    #[error("the segment would overrun the send window of {window}")]
    OutOfWindow { window: u16 },
    #[error("{0}")]
    Header(#[from] BuildHeaderError),
}

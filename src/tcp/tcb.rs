//! The transmission control block and the state machine that drives it.
//!
//! A [`Tcb`] is a deterministic automaton over the eleven connection states
//! of [`State`]. It is stepped by exactly two kinds of stimulus: a local
//! [`Event`] from the application, or an inbound [`Segment`] from the remote
//! TCP. Each step mutates the block's sequence variables, installs the
//! successor state, and returns a [`Reaction`] describing the segments to
//! emit and the local side effects to run. The machine itself performs no
//! I/O and never blocks; a step is a plain synchronous call.
//!
//! Protocol violations are part of the reaction, not errors: an event that
//! is illegal in the current state yields [`Effect::InvalidOperation`], an
//! overlong send yields [`Effect::SeqOutOfRange`], and a segment that fails
//! the acceptance predicates yields [`Effect::Discard`]. The only reset the
//! machine emits answers a non-SYN segment arriving with no connection.
//!
//! Sequence arithmetic deliberately uses plain `u32` comparisons rather
//! than modulo-2^32 ordering, and a segment is only acceptable when its
//! sequence number equals `rcv.nxt` exactly; out-of-order segments are the
//! driver's problem.

mod reaction;
mod receive_sequence_space;
mod segment;
mod send_sequence_space;
mod state;


pub use reaction::{Effect, Reaction, TcpCallbacks};
pub use segment::Segment;
pub use state::State;

use crate::tcp::tcp_parsing::TcpHeader;
use receive_sequence_space::ReceiveSequenceSpace;
use send_sequence_space::SendSequenceSpace;

/// The initial send sequence number a block chooses unless the driver
/// supplies one.
pub const INITIAL_SEND_SEQUENCE: u32 = 10;

/// The send window installed when a connection opens.
pub const INITIAL_SEND_WINDOW: u16 = 1024;

/// A stimulus from the local application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Start accepting connection requests.
    Listen,
    /// Initiate a connection to the remote TCP.
    Connect,
    /// Transmit a data segment. Carries the segment to be stamped.
    Send,
    /// Begin an orderly teardown.
    Close,
}

/// A transmission control block: the per-connection sequence variables and
/// the current state, stepped by [`on_event`](Tcb::on_event) and
/// [`segment_arrives`](Tcb::segment_arrives).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcb {
    iss: u32,
    state: State,
    pub(crate) snd: SendSequenceSpace,
    pub(crate) rcv: ReceiveSequenceSpace,
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tcb {
    /// A closed block with the default initial send sequence number.
    pub fn new() -> Self {
        Self::with_iss(INITIAL_SEND_SEQUENCE)
    }

    /// A closed block that will use `iss` when a connection opens.
    pub fn with_iss(iss: u32) -> Self {
        Self {
            iss,
            state: State::Closed,
            snd: SendSequenceSpace::default(),
            rcv: ReceiveSequenceSpace::default(),
        }
    }

    /// The current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The send window this endpoint advertises.
    pub fn local_window(&self) -> u16 {
        self.snd.wnd
    }

    /// The window most recently advertised by the remote TCP.
    pub fn peer_window(&self) -> u16 {
        self.rcv.wnd
    }

    /// Steps the machine with a local event. `segment` must be provided for
    /// [`Event::Send`] and is the segment whose header gets stamped with
    /// this connection's sequence numbers; it is ignored otherwise. The
    /// successor state is installed before this returns.
    pub fn on_event(&mut self, event: Event, segment: Option<&mut Segment>) -> Reaction {
        let current = self.state;
        let (reaction, next) = match current {
            State::Closed => self.closed_on_event(event),
            State::SynReceived => self.syn_received_on_event(event),
            State::Established => self.established_on_event(event, segment),
            State::CloseWait => self.close_wait_on_event(event),
            // No local event is legal anywhere else. In particular,
            // initiating from Listen is forbidden; connecting requires a
            // closed block.
            State::Listen
            | State::SynSent
            | State::FinWait1
            | State::FinWait2
            | State::Closing
            | State::LastAck
            | State::TimeWait => (Reaction::one(Effect::InvalidOperation), current),
        };
        self.state = next;
        reaction
    }

    /// Steps the machine with an inbound segment. The successor state is
    /// installed before this returns.
    pub fn segment_arrives(&mut self, segment: &Segment) -> Reaction {
        let (reaction, next) = match self.state {
            State::Closed => self.closed_segment_arrives(segment),
            State::Listen => self.listen_segment_arrives(segment),
            State::SynSent => self.syn_sent_segment_arrives(segment),
            State::SynReceived => self.syn_received_segment_arrives(segment),
            State::Established => self.established_segment_arrives(segment),
            State::FinWait1 => self.fin_wait_one_segment_arrives(segment),
            State::FinWait2 => self.fin_wait_two_segment_arrives(segment),
            State::CloseWait => self.close_wait_segment_arrives(segment),
            State::Closing => self.closing_segment_arrives(segment),
            State::LastAck => self.last_ack_segment_arrives(segment),
            State::TimeWait => (Reaction::one(Effect::Discard), State::TimeWait),
        };
        self.state = next;
        reaction
    }

    /// Installs the send-side variables for a freshly opened connection.
    fn open_send_space(&mut self) {
        self.snd = SendSequenceSpace {
            iss: self.iss,
            una: self.iss.wrapping_add(1),
            nxt: self.iss.wrapping_add(1),
            wnd: INITIAL_SEND_WINDOW,
        };
    }

    fn closed_on_event(&mut self, event: Event) -> (Reaction, State) {
        match event {
            Event::Listen => (Reaction::none(), State::Listen),
            Event::Connect => {
                self.open_send_space();
                let reaction = Reaction::one(Effect::SendSyn {
                    seq: self.snd.iss,
                    wnd: self.snd.wnd,
                });
                (reaction, State::SynSent)
            }
            Event::Send | Event::Close => (Reaction::one(Effect::InvalidOperation), State::Closed),
        }
    }

    fn closed_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_syn(header) {
            self.open_send_space();
            self.rcv.nxt = header.sequence.wrapping_add(1);
            self.rcv.wnd = header.window;

            let reaction = Reaction::one(Effect::Accept).then(Effect::SendSynAck {
                seq: self.snd.iss,
                ack: self.rcv.nxt,
                wnd: self.snd.wnd,
            });
            (reaction, State::SynReceived)
        } else {
            let reaction = Reaction::one(Effect::Discard).then(Effect::SendRst {
                seq: header.acknowledgement,
            });
            (reaction, State::Closed)
        }
    }

    fn listen_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let control = segment.header.control;
        if control.syn() && !control.ack() {
            // The driver allocates a child block for the connection; this
            // block never leaves Listen.
            let reaction = Reaction::one(Effect::Accept).then(Effect::NewConnection);
            (reaction, State::Listen)
        } else {
            (Reaction::one(Effect::Discard), State::Listen)
        }
    }

    fn syn_sent_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_syn(header) {
            // Simultaneous open
            self.rcv.nxt = header.sequence.wrapping_add(1);
            self.rcv.wnd = header.window;
            (self.ack_current(), State::SynReceived)
        } else if is_syn_ack(header) && self.ack_in_range(header) {
            self.rcv.nxt = header.sequence.wrapping_add(1);
            self.rcv.wnd = header.window;
            (self.ack_current(), State::Established)
        } else {
            (Reaction::one(Effect::Discard), State::SynSent)
        }
    }

    fn syn_received_on_event(&mut self, event: Event) -> (Reaction, State) {
        match event {
            Event::Close => (self.fin_current(), State::FinWait1),
            _ => (Reaction::one(Effect::InvalidOperation), State::SynReceived),
        }
    }

    fn syn_received_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) {
            self.snd.una = header.acknowledgement.wrapping_add(1);
            (Reaction::one(Effect::Accept), State::Established)
        } else {
            (Reaction::one(Effect::Discard), State::SynReceived)
        }
    }

    fn established_on_event(
        &mut self,
        event: Event,
        segment: Option<&mut Segment>,
    ) -> (Reaction, State) {
        match event {
            Event::Send => match segment {
                Some(segment) => {
                    // The send window acts as a ceiling on sequence numbers.
                    if self.snd.nxt.wrapping_add(segment.seg_len()) >= self.snd.wnd as u32 {
                        let reaction = Reaction::one(Effect::SeqOutOfRange { wnd: self.snd.wnd });
                        return (reaction, State::Established);
                    }

                    segment.header.control.set_ack(true);
                    segment.header.sequence = self.snd.nxt;
                    segment.header.acknowledgement = self.rcv.nxt;

                    self.snd.nxt = self.snd.nxt.wrapping_add(segment.seg_len());

                    (Reaction::none(), State::Established)
                }
                // A send with nothing to stamp is reported, never asserted.
                None => (Reaction::one(Effect::InvalidOperation), State::Established),
            },
            Event::Close => (self.fin_current(), State::FinWait1),
            Event::Listen | Event::Connect => {
                (Reaction::one(Effect::InvalidOperation), State::Established)
            }
        }
    }

    fn established_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) {
            self.snd.una = header.acknowledgement;
            self.rcv.nxt = header.sequence.wrapping_add(segment.seg_len());
            (self.ack_current(), State::Established)
        } else if is_fin(header) && self.seq_ack_in_range(header) {
            self.rcv.nxt = self.rcv.nxt.wrapping_add(1);
            (self.ack_current(), State::CloseWait)
        } else {
            (Reaction::one(Effect::Discard), State::Established)
        }
    }

    fn fin_wait_one_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) {
            if header.acknowledgement == self.snd.nxt {
                // Our FIN is acknowledged
                (Reaction::one(Effect::Accept), State::FinWait2)
            } else {
                (Reaction::one(Effect::Accept), State::FinWait1)
            }
        } else if is_fin(header) && self.seq_ack_in_range(header) {
            (self.ack_current(), State::Closing)
        } else {
            (Reaction::one(Effect::Discard), State::FinWait1)
        }
    }

    fn fin_wait_two_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_fin(header) && self.seq_ack_in_range(header) {
            self.rcv.nxt = header.sequence.wrapping_add(1);
            self.rcv.wnd = header.window;
            (self.ack_current(), State::TimeWait)
        } else {
            (Reaction::one(Effect::Discard), State::FinWait2)
        }
    }

    fn close_wait_on_event(&mut self, event: Event) -> (Reaction, State) {
        match event {
            Event::Close => (self.fin_current(), State::LastAck),
            _ => (Reaction::one(Effect::InvalidOperation), State::CloseWait),
        }
    }

    fn close_wait_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) {
            self.snd.una = header.acknowledgement;
            // Tracks the sequence number the peer reports, not the text end.
            self.rcv.nxt = header.sequence;
            self.rcv.wnd = header.window;
            (Reaction::one(Effect::Accept), State::CloseWait)
        } else {
            (Reaction::one(Effect::Discard), State::CloseWait)
        }
    }

    fn closing_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) && header.acknowledgement == self.snd.nxt
        {
            (Reaction::one(Effect::Accept), State::TimeWait)
        } else {
            (Reaction::one(Effect::Discard), State::Closing)
        }
    }

    fn last_ack_segment_arrives(&mut self, segment: &Segment) -> (Reaction, State) {
        let header = &segment.header;
        if is_ack(header) && self.seq_ack_in_range(header) && header.acknowledgement == self.snd.nxt
        {
            (Reaction::one(Effect::Accept), State::Closed)
        } else {
            (Reaction::one(Effect::Discard), State::LastAck)
        }
    }

    /// Accept the inbound segment and acknowledge everything received.
    fn ack_current(&self) -> Reaction {
        Reaction::one(Effect::Accept).then(Effect::SendAck {
            seq: self.snd.nxt,
            ack: self.rcv.nxt,
            wnd: self.snd.wnd,
        })
    }

    /// Claim the next sequence number for a FIN.
    fn fin_current(&mut self) -> Reaction {
        let seq = self.snd.nxt;
        self.snd.nxt = self.snd.nxt.wrapping_add(1);
        Reaction::one(Effect::SendFin {
            seq,
            ack: self.rcv.nxt,
            wnd: self.snd.wnd,
        })
    }

    fn ack_in_range(&self, header: &TcpHeader) -> bool {
        header.acknowledgement >= self.snd.una && header.acknowledgement <= self.snd.nxt
    }

    fn seq_in_range(&self, header: &TcpHeader) -> bool {
        header.sequence == self.rcv.nxt
    }

    fn seq_ack_in_range(&self, header: &TcpHeader) -> bool {
        self.ack_in_range(header) && self.seq_in_range(header)
    }
}

fn is_ack(header: &TcpHeader) -> bool {
    header.control.ack() && !header.control.syn() && !header.control.fin()
}

fn is_syn(header: &TcpHeader) -> bool {
    header.control.syn() && !header.control.ack() && !header.control.fin()
}

fn is_syn_ack(header: &TcpHeader) -> bool {
    header.control.syn() && header.control.ack() && !header.control.fin()
}

fn is_fin(header: &TcpHeader) -> bool {
    header.control.fin() && header.control.ack() && !header.control.syn()
}

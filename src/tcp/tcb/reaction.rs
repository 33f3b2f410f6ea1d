//! The deferred output of a state transition.
//!
//! A transition never performs I/O. It describes what the driver should do
//! as an ordered list of [`Effect`]s, which the driver replays against its
//! [`TcpCallbacks`] implementation with [`Reaction::perform`]. The order the
//! effects were composed in is the order the callbacks see.

/// One callback invocation recorded by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Emit a SYN segment.
    SendSyn { seq: u32, wnd: u16 },
    /// Emit a SYN+ACK segment.
    SendSynAck { seq: u32, ack: u32, wnd: u16 },
    /// Emit an ACK segment.
    SendAck { seq: u32, ack: u32, wnd: u16 },
    /// Emit a FIN+ACK segment.
    SendFin { seq: u32, ack: u32, wnd: u16 },
    /// Emit an RST segment.
    SendRst { seq: u32 },
    /// Take the inbound segment's text for delivery to the application.
    Accept,
    /// Drop the inbound segment.
    Discard,
    /// A requested send would overrun the send window.
    SeqOutOfRange { wnd: u16 },
    /// The local event is not legal in the current state.
    InvalidOperation,
    /// An incoming SYN on a listener opened a child connection.
    NewConnection,
}

/// The ordered effects of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reaction(Vec<Effect>);

impl Reaction {
    /// A transition with nothing for the driver to do.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn one(effect: Effect) -> Self {
        Self(vec![effect])
    }

    /// Appends a further effect, preserving composition order.
    pub fn then(mut self, effect: Effect) -> Self {
        self.0.push(effect);
        self
    }

    pub fn effects(&self) -> &[Effect] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the driver should allocate a child connection for the
    /// listener that produced this reaction.
    pub fn requests_new_connection(&self) -> bool {
        self.0.contains(&Effect::NewConnection)
    }

    /// Whether the transition rejected the stimulus instead of acting on it.
    pub fn reports_violation(&self) -> bool {
        self.0
            .iter()
            .any(|effect| matches!(effect, Effect::InvalidOperation | Effect::SeqOutOfRange { .. }))
    }

    /// Replays the effects against `callbacks` in composition order.
    pub fn perform(&self, callbacks: &mut impl TcpCallbacks) {
        for effect in &self.0 {
            match *effect {
                Effect::SendSyn { seq, wnd } => callbacks.send_syn(seq, wnd),
                Effect::SendSynAck { seq, ack, wnd } => callbacks.send_syn_ack(seq, ack, wnd),
                Effect::SendAck { seq, ack, wnd } => callbacks.send_ack(seq, ack, wnd),
                Effect::SendFin { seq, ack, wnd } => callbacks.send_fin(seq, ack, wnd),
                Effect::SendRst { seq } => callbacks.send_rst(seq),
                Effect::Accept => callbacks.accept(),
                Effect::Discard => callbacks.discard(),
                Effect::SeqOutOfRange { wnd } => callbacks.seq_out_of_range(wnd),
                Effect::InvalidOperation => callbacks.invalid_operation(),
                Effect::NewConnection => callbacks.new_connection(),
            }
        }
    }
}

/// The sink a [`Reaction`] is replayed against: the driver's segment
/// emitter and event reporter.
pub trait TcpCallbacks {
    fn send_syn(&mut self, seq: u32, wnd: u16);
    fn send_syn_ack(&mut self, seq: u32, ack: u32, wnd: u16);
    fn send_ack(&mut self, seq: u32, ack: u32, wnd: u16);
    fn send_fin(&mut self, seq: u32, ack: u32, wnd: u16);
    fn send_rst(&mut self, seq: u32);

    /// Take the inbound segment's text for delivery to the application.
    fn accept(&mut self);
    /// Drop the inbound segment.
    fn discard(&mut self);
    /// A requested send would overrun the send window.
    fn seq_out_of_range(&mut self, wnd: u16);
    /// The local event is not legal in the current state.
    fn invalid_operation(&mut self);
    /// An incoming SYN on a listener opened a child connection.
    fn new_connection(&mut self);

    // Mirrors of inbound stimuli for drivers that want to observe them.
    // Transitions never produce these.
    fn recv_syn(&mut self, _seq: u32, _wnd: u16) {}
    fn recv_ack(&mut self, _seq: u32, _ack: u32, _wnd: u16) {}
    fn recv_fin(&mut self, _seq: u32, _ack: u32, _wnd: u16) {}
}

//! Contains basic logging functions.
//!
//! Each function wraps one kind of event the endpoint reports: segments
//! handed to the wire, segments arriving from it, and connection state
//! changes. They are called from the session and multiplexing layers; the
//! state machine itself stays silent.

use crate::tcp::tcb::State;
use crate::tcp::tcp_parsing::TcpHeader;
use crate::utility::SessionId;
use tracing::{event, Level};

/// Segment transmission event handler. Captures the port pair, the
/// sequence numbers, the control bits, and the text length.
pub(crate) fn segment_sent_event(id: SessionId, header: &TcpHeader, text_len: usize) {
    event!(
        target: "SEGMENT_SENT",
        Level::INFO,
        local_port = format!("{:x}", id.local),
        remote_port = format!("{:x}", id.remote),
        seq = header.sequence,
        ack = header.acknowledgement,
        control = format!("{:?}", header.control),
        text_len,
    );
}

/// Segment arrival event handler. Captures the same fields as
/// [`segment_sent_event`] for the receiving direction.
pub(crate) fn segment_received_event(id: SessionId, header: &TcpHeader, text_len: usize) {
    event!(
        target: "SEGMENT_RECEIVED",
        Level::INFO,
        local_port = format!("{:x}", id.local),
        remote_port = format!("{:x}", id.remote),
        seq = header.sequence,
        ack = header.acknowledgement,
        control = format!("{:?}", header.control),
        text_len,
    );
}

/// Connection state change event handler.
pub(crate) fn state_change_event(id: SessionId, from: State, to: State) {
    event!(
        target: "STATE_CHANGE",
        Level::INFO,
        local_port = format!("{:x}", id.local),
        remote_port = format!("{:x}", id.remote),
        from = format!("{}", from),
        to = format!("{}", to),
    );
}

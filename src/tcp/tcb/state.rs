use std::fmt;

/// The state of a simulated TCP connection. The diagram below shows every
/// transition the machine performs; leaving `TimeWait` for `Closed` is
/// driven by a timer outside the machine.
///
/// ```text
///                       +--------+
///     -----Listen------ | Closed | ------Connect-----
///    |                  +--------+                   |
///    |                    |                          V
///    V                    | rcv SYN            +---------+
/// +--------+              | snd SYN,ACK        | SynSent |
/// | Listen |              |                    +---------+
/// +--------+              V         rcv SYN      |     |
///    | rcv SYN       +---------+    snd ACK      |     | rcv SYN,ACK
///    | (new child    | SynRcvd | <---------------      | snd ACK
///    |  in Closed)   +---------+                       V
///    |                 |     | rcv ACK of SYN    +-------------+
///     ------->---------      | ---------------> | Established |
///                    Close   |                   +-------------+
///                    snd FIN |                     |         |
///                            V                     | Close   | rcv FIN
///                      +----------+ <---snd FIN---          | snd ACK
///                      | FinWait1 |                          V
///                      +----------+                    +-----------+
///          rcv ACK of FIN |      | rcv FIN             | CloseWait |
///                         |      | snd ACK             +-----------+
///                         V      V                       | Close
///              +----------+    +---------+               | snd FIN
///              | FinWait2 |    | Closing |               V
///              +----------+    +---------+          +---------+
///       rcv FIN   |                 | rcv ACK       | LastAck |
///       snd ACK   |                 | of FIN        +---------+
///                 V                 V                    | rcv ACK of FIN
///              +----------+ <-------                     V
///              | TimeWait |                         +--------+
///              +----------+ ---(external timer)---> | Closed |
///                                                   +--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// No connection exists and none is being attempted.
    #[default]
    Closed,
    /// Waiting for a connection request from any remote TCP.
    Listen,
    /// Waiting for a matching connection request after having sent a
    /// connection request.
    SynSent,
    /// Waiting for a confirming connection request acknowledgment after
    /// having both received and sent a connection request.
    SynReceived,
    /// An open connection, data received can be delivered to the user. The
    /// normal state for the data transfer phase of the connection.
    Established,
    /// Waiting for a connection termination request from the remote TCP, or
    /// an acknowledgment of the connection termination request previously
    /// sent.
    FinWait1,
    /// Waiting for a connection termination request from the remote TCP.
    FinWait2,
    /// Waiting for a connection termination request from the local user.
    CloseWait,
    /// Waiting for a connection termination request acknowledgment from the
    /// remote TCP.
    Closing,
    /// Waiting for an acknowledgment of the connection termination request
    /// previously sent to the remote TCP (which includes an acknowledgment
    /// of its connection termination request).
    LastAck,
    /// Waiting for enough time to pass to be sure the remote TCP received
    /// the acknowledgment of its connection termination request.
    TimeWait,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "CLOSED"),
            State::Listen => write!(f, "LISTEN"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::SynReceived => write!(f, "SYN-RECEIVED"),
            State::Established => write!(f, "ESTABLISHED"),
            State::FinWait1 => write!(f, "FIN-WAIT-1"),
            State::FinWait2 => write!(f, "FIN-WAIT-2"),
            State::CloseWait => write!(f, "CLOSE-WAIT"),
            State::Closing => write!(f, "CLOSING"),
            State::LastAck => write!(f, "LAST-ACK"),
            State::TimeWait => write!(f, "TIME-WAIT"),
        }
    }
}

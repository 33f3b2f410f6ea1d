//! Parsing and serialization for TCP headers.
//!
//! Only twenty-byte headers are handled; segments carrying options are
//! rejected. The simulator has no network layer underneath, so the checksum
//! pseudo-header uses zeroed addresses, the TCP protocol number, and the TCP
//! length. An encoder for real TCP over IPv4 fed all-zero addresses produces
//! the same checksum, which is how the tests pin the format.

use crate::utility::{Checksum, SessionId};

/// A decoded TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub control: Control,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// The length of a TCP header without options.
    pub const BYTES: usize = 20;

    /// Parses a header from the front of `bytes` and verifies its checksum.
    /// Whatever remains on the iterator afterward was the segment text.
    pub fn from_bytes(bytes: &mut impl Iterator<Item = u8>) -> Result<Self, ParseError> {
        let mut next = || -> Result<u8, ParseError> { bytes.next().ok_or(ParseError::HeaderTooShort) };
        let mut checksum = Checksum::new();

        let src_port = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(src_port);

        let dst_port = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(dst_port);

        let sequence_bytes = [next()?, next()?, next()?, next()?];
        let sequence = u32::from_be_bytes(sequence_bytes);
        checksum.add_u32(sequence_bytes);

        let acknowledgement_bytes = [next()?, next()?, next()?, next()?];
        let acknowledgement = u32::from_be_bytes(acknowledgement_bytes);
        checksum.add_u32(acknowledgement_bytes);

        let offset_reserved_control = [next()?, next()?];
        checksum.add_u16(u16::from_be_bytes(offset_reserved_control));
        let data_offset = offset_reserved_control[0] >> 4;
        let control = Control::from(offset_reserved_control[1] & 0b11_1111);

        if data_offset as usize * 4 != Self::BYTES {
            Err(ParseError::UnexpectedOptions)?
        }

        let window = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(window);

        let expected_checksum = u16::from_be_bytes([next()?, next()?]);

        let urgent = u16::from_be_bytes([next()?, next()?]);
        checksum.add_u16(urgent);

        let text_length = checksum.accumulate_remainder(bytes);
        let tcp_length = text_length + Self::BYTES as u32;
        if tcp_length > u16::MAX as u32 {
            Err(ParseError::OverlyLongText)?
        }

        // Pseudo header: zeroed addresses, TCP protocol number, TCP length
        checksum.add_u32([0; 4]);
        checksum.add_u32([0; 4]);
        checksum.add_u8(0, 6);
        checksum.add_u16(tcp_length as u16);

        let checksum = checksum.as_u16();
        if expected_checksum == checksum {
            Ok(TcpHeader {
                src_port,
                dst_port,
                sequence,
                acknowledgement,
                control,
                window,
                checksum,
                urgent,
            })
        } else {
            Err(ParseError::InvalidChecksum {
                actual: checksum,
                expected: expected_checksum,
            })
        }
    }

    /// The wire form of the header. The stored checksum is used as-is; it is
    /// only valid over the text the header was built against.
    pub fn serialize(&self) -> [u8; Self::BYTES] {
        let mut out = [0; Self::BYTES];
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        out[8..12].copy_from_slice(&self.acknowledgement.to_be_bytes());
        out[12] = (Self::BYTES as u8 / 4) << 4;
        out[13] = self.control.into();
        out[14..16].copy_from_slice(&self.window.to_be_bytes());
        out[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        out[18..20].copy_from_slice(&self.urgent.to_be_bytes());
        out
    }
}

/// The control bits of a TCP header, stored as on the wire.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Control(u8);

impl Control {
    pub fn new(urg: bool, ack: bool, psh: bool, rst: bool, syn: bool, fin: bool) -> Self {
        Self(
            fin as u8
                | (syn as u8) << 1
                | (rst as u8) << 2
                | (psh as u8) << 3
                | (ack as u8) << 4
                | (urg as u8) << 5,
        )
    }

    /// No more data from sender
    pub fn fin(&self) -> bool {
        self.0 & 0b1 == 1
    }

    /// Synchronize sequence numbers
    pub fn syn(&self) -> bool {
        (self.0 >> 1) & 0b1 == 1
    }

    /// Reset the connection
    pub fn rst(&self) -> bool {
        (self.0 >> 2) & 0b1 == 1
    }

    /// Push Function
    pub fn psh(&self) -> bool {
        (self.0 >> 3) & 0b1 == 1
    }

    /// Acknowledgment field significant
    pub fn ack(&self) -> bool {
        (self.0 >> 4) & 0b1 == 1
    }

    /// Urgent Pointer field significant
    pub fn urg(&self) -> bool {
        (self.0 >> 5) & 0b1 == 1
    }

    /// Sets the ACK bit. Outbound data segments are stamped with it when
    /// their sequence numbers are assigned.
    pub fn set_ack(&mut self, ack: bool) {
        self.0 = self.0 & !(1 << 4) | (ack as u8) << 4;
    }
}

impl From<u8> for Control {
    fn from(n: u8) -> Self {
        Self(n)
    }
}

impl From<Control> for u8 {
    fn from(control: Control) -> Self {
        control.0
    }
}

/// Assembles a [`TcpHeader`] for one direction of a connection, computing
/// the checksum over the header and the segment text.
#[derive(Debug, Clone, Copy)]
pub struct TcpHeaderBuilder {
    id: SessionId,
    sequence: u32,
    acknowledgement: u32,
    ack: bool,
    rst: bool,
    syn: bool,
    fin: bool,
    window: u16,
}

impl TcpHeaderBuilder {
    /// Starts a header from `id.local` to `id.remote` with the given
    /// sequence number. All control bits start cleared.
    pub fn new(id: SessionId, sequence: u32) -> Self {
        Self {
            id,
            sequence,
            acknowledgement: 0,
            ack: false,
            rst: false,
            syn: false,
            fin: false,
            window: 0,
        }
    }

    /// Sets the ACK bit and the acknowledgment number.
    pub fn ack(mut self, acknowledgement: u32) -> Self {
        self.acknowledgement = acknowledgement;
        self.ack = true;
        self
    }

    pub fn rst(mut self) -> Self {
        self.rst = true;
        self
    }

    pub fn syn(mut self) -> Self {
        self.syn = true;
        self
    }

    pub fn fin(mut self) -> Self {
        self.fin = true;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn build(self, mut text: impl Iterator<Item = u8>) -> Result<TcpHeader, BuildHeaderError> {
        let control = Control::new(false, self.ack, false, self.rst, self.syn, self.fin);

        let mut checksum = Checksum::new();
        checksum.add_u16(self.id.local);
        checksum.add_u16(self.id.remote);
        checksum.add_u32(self.sequence.to_be_bytes());
        checksum.add_u32(self.acknowledgement.to_be_bytes());
        checksum.add_u8((TcpHeader::BYTES as u8 / 4) << 4, control.into());
        checksum.add_u16(self.window);
        // Checksum field itself is zero while checksumming
        checksum.add_u16(0);

        let text_length = checksum.accumulate_remainder(&mut text);
        let tcp_length = text_length + TcpHeader::BYTES as u32;
        if tcp_length > u16::MAX as u32 {
            Err(BuildHeaderError::OverlyLongText)?
        }

        checksum.add_u32([0; 4]);
        checksum.add_u32([0; 4]);
        checksum.add_u8(0, 6);
        checksum.add_u16(tcp_length as u16);

        Ok(TcpHeader {
            src_port: self.id.local,
            dst_port: self.id.remote,
            sequence: self.sequence,
            acknowledgement: self.acknowledgement,
            control,
            window: self.window,
            checksum: checksum.as_u16(),
            urgent: 0,
        })
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("the header ended before twenty bytes")]
    HeaderTooShort,
    #[error("TCP options are not supported")]
    UnexpectedOptions,
    #[error("checksum mismatch (actual {actual:#06x}, expected {expected:#06x})")]
    InvalidChecksum { actual: u16, expected: u16 },
    #[error("the segment text exceeds the sixteen-bit TCP length")]
    OverlyLongText,
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum BuildHeaderError {
    #[error("the segment text exceeds the sixteen-bit TCP length")]
    OverlyLongText,
}

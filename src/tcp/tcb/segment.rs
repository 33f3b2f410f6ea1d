use crate::tcp::tcp_parsing::TcpHeader;
use bytes::Bytes;

/// A TCP header together with the text it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: TcpHeader,
    pub text: Bytes,
}

impl Segment {
    pub fn new(header: TcpHeader, text: Bytes) -> Self {
        Self { header, text }
    }

    /// The length of the segment in sequence space: the text bytes, plus one
    /// each for SYN and FIN.
    pub fn seg_len(&self) -> u32 {
        self.text.len() as u32 + self.header.control.syn() as u32 + self.header.control.fin() as u32
    }

    /// The wire form: serialized header followed by the text.
    pub fn serialize(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(TcpHeader::BYTES + self.text.len());
        wire.extend_from_slice(&self.header.serialize());
        wire.extend_from_slice(&self.text);
        wire
    }

    pub fn into_inner(self) -> (TcpHeader, Bytes) {
        (self.header, self.text)
    }
}

//! DNS message header, question name decoding and refusal rewriting.
//!
//! Only what the sinkhole needs from RFC 1035 lives here: the fixed 12-byte
//! header, the first question's name (compression pointers included), and
//! the in-place flag rewrite that turns a query into a REFUSED reply.

use thiserror::Error;

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Upper bound on a decoded name, trailing dot included.
pub const MAX_NAME_LEN: usize = 256;

/// Labels and pointer jumps allowed while decoding a single name.
pub const MAX_DECODE_STEPS: usize = 100;

const POINTER_TAG: u8 = 0xC0;
const POINTER_HIGH_BITS: u8 = 0x3F;

/// Errors produced while reading a DNS message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    #[error("packet shorter than the 12-byte header")]
    ShortHeader,

    #[error("packet ends inside a name at offset {0}")]
    Truncated(usize),

    #[error("compression pointer targets offset {0}, outside the packet")]
    PointerOutOfBounds(usize),

    #[error("reserved label type 0x{0:02x}")]
    ReservedLabelType(u8),

    #[error("name longer than 255 bytes")]
    NameTooLong,

    #[error("name needs more than 100 decode steps")]
    TooManySteps,
}

/// Response codes from RFC 1035 section 4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Rcode {
    NoError = 0,
    FormErr = 1,
    ServFail = 2,
    NxDomain = 3,
    NotImp = 4,
    Refused = 5,
}

/// The 16-bit flags word of a DNS header.
///
/// ```text
/// |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    const QR: u16 = 0x8000;
    const OPCODE: u16 = 0x7800;
    const RD: u16 = 0x0100;
    const RCODE: u16 = 0x000F;

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_response(self) -> bool {
        self.0 & Self::QR != 0
    }

    pub fn set_response(&mut self, response: bool) {
        if response {
            self.0 |= Self::QR;
        } else {
            self.0 &= !Self::QR;
        }
    }

    pub fn opcode(self) -> u8 {
        ((self.0 & Self::OPCODE) >> 11) as u8
    }

    pub fn recursion_desired(self) -> bool {
        self.0 & Self::RD != 0
    }

    pub fn rcode(self) -> u8 {
        (self.0 & Self::RCODE) as u8
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.0 = (self.0 & !Self::RCODE) | rcode as u16;
    }
}

/// The fixed DNS message header, decoded from network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Read the header from the first 12 bytes of `packet`.
    pub fn parse(packet: &[u8]) -> Result<Self, WireError> {
        if packet.len() < HEADER_LEN {
            return Err(WireError::ShortHeader);
        }

        Ok(Self {
            id: read_u16(packet, 0),
            flags: Flags::from_bits(read_u16(packet, 2)),
            qdcount: read_u16(packet, 4),
            ancount: read_u16(packet, 6),
            nscount: read_u16(packet, 8),
            arcount: read_u16(packet, 10),
        })
    }

    /// Write the header back over the first 12 bytes of `packet`.
    pub fn write(&self, packet: &mut [u8]) -> Result<(), WireError> {
        if packet.len() < HEADER_LEN {
            return Err(WireError::ShortHeader);
        }

        let fields = [
            self.id,
            self.flags.bits(),
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount,
        ];
        for (i, field) in fields.iter().enumerate() {
            packet[i * 2..i * 2 + 2].copy_from_slice(&field.to_be_bytes());
        }

        Ok(())
    }
}

fn read_u16(packet: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([packet[at], packet[at + 1]])
}

/// A name read out of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Dot-joined labels without a trailing dot. Case is preserved.
    pub name: String,
    /// Bytes the name occupies at the position it was read from. Once a
    /// compression pointer is followed, only the pointer itself counts.
    pub consumed: usize,
}

/// Decode the name starting at `start` in `packet`.
///
/// Compression pointers are resolved against the start of `packet`. Work is
/// bounded by [`MAX_DECODE_STEPS`] so pointer cycles fail instead of spinning,
/// and names that would exceed [`MAX_NAME_LEN`] fail instead of truncating.
pub fn decode_name(packet: &[u8], start: usize) -> Result<DecodedName, WireError> {
    let mut name = Vec::with_capacity(64);
    let mut pos = start;
    let mut consumed = 0;
    let mut jumped = false;
    let mut steps = 0;

    loop {
        let len = *packet.get(pos).ok_or(WireError::Truncated(pos))?;
        if len == 0 {
            break;
        }

        if steps == MAX_DECODE_STEPS {
            return Err(WireError::TooManySteps);
        }
        steps += 1;

        match len & POINTER_TAG {
            POINTER_TAG => {
                let low = *packet.get(pos + 1).ok_or(WireError::Truncated(pos + 1))?;
                let target = (usize::from(len & POINTER_HIGH_BITS) << 8) | usize::from(low);
                if target >= packet.len() {
                    return Err(WireError::PointerOutOfBounds(target));
                }

                if !jumped {
                    consumed += 2;
                    jumped = true;
                }
                pos = target;
            }
            0 => {
                let len = usize::from(len);
                if name.len() + len + 1 >= MAX_NAME_LEN {
                    return Err(WireError::NameTooLong);
                }

                let label = packet
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(WireError::Truncated(packet.len()))?;
                name.extend_from_slice(label);
                name.push(b'.');

                pos += len + 1;
                if !jumped {
                    consumed += len + 1;
                }
            }
            _ => return Err(WireError::ReservedLabelType(len)),
        }
    }

    name.pop();
    if !jumped {
        consumed += 1;
    }

    Ok(DecodedName {
        name: String::from_utf8_lossy(&name).into_owned(),
        consumed,
    })
}

/// The first entry of a message's question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    /// `None` when the packet ends right after the name.
    pub qtype: Option<u16>,
}

impl Question {
    /// Read the first question following the header.
    pub fn parse_first(packet: &[u8]) -> Result<Self, WireError> {
        if packet.len() < HEADER_LEN {
            return Err(WireError::ShortHeader);
        }

        let decoded = decode_name(packet, HEADER_LEN)?;
        let end = HEADER_LEN + decoded.consumed;
        let qtype = packet
            .get(end..end + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]));

        Ok(Self {
            name: decoded.name,
            qtype,
        })
    }
}

/// Turn a query into a REFUSED reply in place.
///
/// Sets QR and RCODE=5. The id, opcode, RD and the question section stay as
/// the client sent them. Returns the length of the reply, which is the length
/// of the query.
pub fn refuse(packet: &mut [u8]) -> Result<usize, WireError> {
    let mut header = Header::parse(packet)?;
    header.flags.set_response(true);
    header.flags.set_rcode(Rcode::Refused);
    header.write(packet)?;

    Ok(packet.len())
}

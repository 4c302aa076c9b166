/// TCP header encoding/decoding (§4.7), grounded on `cyclone_tcp/core/tcp.h`'s
/// `TcpHeader`/`TcpOption` layout.
use common::{BufWriter, Cursor, Endian, StackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u8) -> Self {
        Self(self.0 | bit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOption {
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    Sack([(u32, u32); 4], usize),
    Nop,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dest_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    pub options: Vec<TcpOption>,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    pub fn header_len(&self) -> usize {
        20 + encoded_options_len(&self.options)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BufWriter::new(Endian::Big);
        w.u16(self.src_port);
        w.u16(self.dest_port);
        w.u32(self.seq_num);
        w.u32(self.ack_num);

        let opt_len = encoded_options_len(&self.options);
        let data_offset = ((20 + opt_len) / 4) as u8;
        w.u8(data_offset << 4);
        w.u8(self.flags.0 & 0x3F);
        w.u16(self.window);
        w.u16(self.checksum);
        w.u16(self.urgent_pointer);

        encode_options(&mut w, &self.options);
        w.bytes(&self.payload);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, StackError> {
        let mut c = Cursor::new(data, Endian::Big);
        let src_port = c.u16()?;
        let dest_port = c.u16()?;
        let seq_num = c.u32()?;
        let ack_num = c.u32()?;
        let byte12 = c.u8()?;
        let data_offset = (byte12 >> 4) as usize * 4;
        let flags = TcpFlags(c.u8()? & 0x3F);
        let window = c.u16()?;
        let checksum = c.u16()?;
        let urgent_pointer = c.u16()?;

        if data_offset < 20 || data_offset > data.len() {
            return Err(StackError::InvalidLength("TCP data offset out of range"));
        }
        let options_len = data_offset - 20;
        let options_bytes = c.bytes(options_len)?;
        let options = decode_options(options_bytes)?;
        let payload = c.bytes(c.remaining())?.to_vec();

        Ok(Self {
            src_port,
            dest_port,
            seq_num,
            ack_num,
            flags,
            window,
            checksum,
            urgent_pointer,
            options,
            payload,
        })
    }
}

fn encoded_options_len(options: &[TcpOption]) -> usize {
    let mut len = 0;
    for opt in options {
        len += match opt {
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::Sack(_, count) => 2 + count * 8,
            TcpOption::Nop | TcpOption::End => 1,
        };
    }
    // Pad to a 4-byte boundary with NOPs.
    (len + 3) / 4 * 4
}

fn encode_options(w: &mut BufWriter, options: &[TcpOption]) {
    let start = w.len();
    for opt in options {
        match opt {
            TcpOption::MaxSegmentSize(mss) => {
                w.u8(2);
                w.u8(4);
                w.u16(*mss);
            }
            TcpOption::WindowScale(shift) => {
                w.u8(3);
                w.u8(3);
                w.u8(*shift);
            }
            TcpOption::SackPermitted => {
                w.u8(4);
                w.u8(2);
            }
            TcpOption::Sack(blocks, count) => {
                w.u8(5);
                w.u8((2 + count * 8) as u8);
                for (left, right) in &blocks[..*count] {
                    w.u32(*left);
                    w.u32(*right);
                }
            }
            TcpOption::Nop => w.u8(1),
            TcpOption::End => w.u8(0),
        }
    }
    let written = w.len() - start;
    let padded = encoded_options_len(options);
    for _ in written..padded {
        w.u8(1); // NOP pad
    }
}

fn decode_options(data: &[u8]) -> Result<Vec<TcpOption>, StackError> {
    let mut options = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            0 => {
                options.push(TcpOption::End);
                break;
            }
            1 => {
                options.push(TcpOption::Nop);
                i += 1;
            }
            2 => {
                if i + 4 > data.len() {
                    return Err(StackError::InvalidLength("truncated MSS option"));
                }
                let mss = u16::from_be_bytes([data[i + 2], data[i + 3]]);
                options.push(TcpOption::MaxSegmentSize(mss));
                i += 4;
            }
            3 => {
                if i + 3 > data.len() {
                    return Err(StackError::InvalidLength("truncated window scale option"));
                }
                options.push(TcpOption::WindowScale(data[i + 2]));
                i += 3;
            }
            4 => {
                if i + 2 > data.len() {
                    return Err(StackError::InvalidLength("truncated SACK-permitted option"));
                }
                options.push(TcpOption::SackPermitted);
                i += 2;
            }
            5 => {
                if i + 1 >= data.len() {
                    return Err(StackError::InvalidLength("truncated SACK option"));
                }
                let opt_len = data[i + 1] as usize;
                if opt_len < 2 || i + opt_len > data.len() {
                    return Err(StackError::InvalidLength("invalid SACK option length"));
                }
                let block_bytes = opt_len - 2;
                if block_bytes % 8 != 0 {
                    return Err(StackError::InvalidLength("SACK option not a multiple of 8 bytes"));
                }
                let count = (block_bytes / 8).min(4);
                let mut blocks = [(0u32, 0u32); 4];
                for (k, block) in blocks.iter_mut().enumerate().take(count) {
                    let base = i + 2 + k * 8;
                    let left = u32::from_be_bytes(data[base..base + 4].try_into().unwrap());
                    let right = u32::from_be_bytes(data[base + 4..base + 8].try_into().unwrap());
                    *block = (left, right);
                }
                options.push(TcpOption::Sack(blocks, count));
                i += opt_len;
            }
            _ => {
                // Unknown option kind; skip using its length byte like an
                // unrecognized TLV.
                if i + 1 >= data.len() {
                    return Err(StackError::InvalidLength("truncated unknown option"));
                }
                let opt_len = (data[i + 1] as usize).max(2);
                i += opt_len;
            }
        }
    }
    Ok(options)
}

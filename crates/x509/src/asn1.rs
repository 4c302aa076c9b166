/// ASN.1 DER reader (§4.6): a zero-copy tag/length/value cursor supporting
/// short and long definite-length forms, rejecting indefinite lengths.
/// Extended from a plain tag byte into the full `{class, constructed, type}`
/// triple needed to validate context-specific tags (explicit version,
/// optional unique IDs, extensions) against their expected form.
use common::StackError;

pub const CLASS_UNIVERSAL: u8 = 0;
pub const CLASS_APPLICATION: u8 = 1;
pub const CLASS_CONTEXT: u8 = 2;
pub const CLASS_PRIVATE: u8 = 3;

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTF8_STRING: u8 = 0x0C;
pub const TAG_PRINTABLE_STRING: u8 = 0x13;
pub const TAG_IA5_STRING: u8 = 0x16;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x10;
pub const TAG_SET: u8 = 0x11;

/// A decoded DER tag byte, split into its three logical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: u8,
    pub constructed: bool,
    /// Tag number (low 5 bits for short form; this implementation rejects
    /// multi-byte high-tag-number forms since nothing in X.509 needs them).
    pub number: u8,
}

impl Tag {
    fn from_byte(b: u8) -> Self {
        Self {
            class: (b >> 6) & 0x03,
            constructed: b & 0x20 != 0,
            number: b & 0x1F,
        }
    }

    fn to_byte(self) -> u8 {
        (self.class << 6) | (if self.constructed { 0x20 } else { 0 }) | (self.number & 0x1F)
    }
}

/// A parsed DER TLV (tag-length-value), borrowing from the original buffer.
#[derive(Debug, Clone)]
pub struct Tlv<'a> {
    pub tag: Tag,
    /// Raw tag byte, kept for callers that compare against a universal tag
    /// constant directly (e.g. `TAG_SEQUENCE`) rather than the split form.
    pub raw_tag: u8,
    pub value: &'a [u8],
    pub header_start: usize,
    pub total_len: usize,
}

/// A zero-copy DER cursor.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn peek_tag(&self) -> Option<Tag> {
        self.data.get(self.pos).copied().map(Tag::from_byte)
    }

    pub fn peek_raw_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn skip(&mut self, n: usize) -> Result<(), StackError> {
        if self.pos + n > self.data.len() {
            return Err(StackError::InvalidLength("skip past end of DER data"));
        }
        self.pos += n;
        Ok(())
    }

    /// Read the next TLV, rejecting indefinite lengths and high-tag-number
    /// forms (`number == 0x1F`), neither of which appear in well-formed
    /// X.509.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, StackError> {
        if self.pos >= self.data.len() {
            return Err(StackError::DecodingFailed("unexpected end of DER data"));
        }

        let header_start = self.pos;
        let raw_tag = self.data[self.pos];
        let tag = Tag::from_byte(raw_tag);
        if tag.number == 0x1F {
            return Err(StackError::InvalidTag("high-tag-number form unsupported"));
        }
        self.pos += 1;

        let length = self.read_length()?;
        if self.pos + length > self.data.len() {
            return Err(StackError::InvalidLength("DER value extends past end of data"));
        }

        let value = &self.data[self.pos..self.pos + length];
        self.pos += length;

        Ok(Tlv { tag, raw_tag, value, header_start, total_len: self.pos - header_start })
    }

    fn read_length(&mut self) -> Result<usize, StackError> {
        if self.pos >= self.data.len() {
            return Err(StackError::DecodingFailed("unexpected end reading DER length"));
        }

        let first = self.data[self.pos];
        self.pos += 1;

        if first < 0x80 {
            return Ok(first as usize);
        }
        if first == 0x80 {
            return Err(StackError::InvalidLength("indefinite length not supported"));
        }

        let num_bytes = (first & 0x7F) as usize;
        if num_bytes > 4 {
            return Err(StackError::InvalidLength("DER length too large"));
        }
        if self.pos + num_bytes > self.data.len() {
            return Err(StackError::DecodingFailed("unexpected end reading DER length bytes"));
        }

        let mut length: usize = 0;
        for i in 0..num_bytes {
            length = (length << 8) | (self.data[self.pos + i] as usize);
        }
        self.pos += num_bytes;

        Ok(length)
    }
}

/// Validate a TLV's `(class, number, constructed)` against the expected
/// triple, and optionally its value against an expected OID.
pub fn check_tag(tlv: &Tlv, class: u8, number: u8, constructed: bool) -> Result<(), StackError> {
    if tlv.tag.class != class || tlv.tag.number != number || tlv.tag.constructed != constructed {
        return Err(StackError::InvalidTag("DER tag does not match expected class/number/form"));
    }
    Ok(())
}

pub fn check_oid(tlv: &Tlv, expected_oid: &[u8]) -> Result<(), StackError> {
    if tlv.tag.class != CLASS_UNIVERSAL || tlv.tag.number != TAG_OID || tlv.value != expected_oid {
        return Err(StackError::InvalidTag("unexpected OID"));
    }
    Ok(())
}

/// Decode an OID from DER bytes into a dotted-decimal string.
pub fn decode_oid(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    let first = bytes[0];
    parts.push((first / 40) as u32);
    parts.push((first % 40) as u32);

    let mut accum: u32 = 0;
    for &b in &bytes[1..] {
        accum = (accum << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            parts.push(accum);
            accum = 0;
        }
    }

    parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(".")
}

/// Encode a context-specific constructed tag number `n` as `[n]`, i.e.
/// `0xA0 | n`, used when building DER for tests.
pub fn ctx_constructed(n: u8) -> u8 {
    Tag { class: CLASS_CONTEXT, constructed: true, number: n }.to_byte()
}

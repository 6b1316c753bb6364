use crate::types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, HEADER_LEN, MAX_LABEL_LEN};

// Names are always written out in full, this writer never emits compression pointers.
struct BytePacketBuffer {
    buf: Vec<u8>,
}

impl BytePacketBuffer {
    fn new() -> BytePacketBuffer {
        BytePacketBuffer {
            buf: Vec::with_capacity(512),
        }
    }

    fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    fn write_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    // Empty labels are skipped so "example.com." and "" come out well formed.
    fn write_qname(&mut self, qname: &str) {
        for label in qname.split('.').filter(|label| !label.is_empty()) {
            debug_assert!(
                label.len() <= MAX_LABEL_LEN as usize,
                "label {:?} exceeds 63 bytes",
                label
            );

            self.write_u8(label.len() as u8);
            self.write_bytes(label.as_bytes());
        }

        self.write_u8(0);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Serializes `packet` to wire format. Header counts are written as they are, callers keep them
/// in step with the sections.
pub fn write(packet: &DnsPacket) -> Vec<u8> {
    let mut buffer = BytePacketBuffer::new();

    write_header(&packet.header, &mut buffer);

    for question in &packet.questions {
        write_question(question, &mut buffer);
    }

    for rec in &packet.answers {
        write_record(rec, &mut buffer);
    }
    for rec in &packet.authorities {
        write_record(rec, &mut buffer);
    }
    for rec in &packet.resources {
        write_record(rec, &mut buffer);
    }

    buffer.into_inner()
}

pub fn encode_header(header: &DnsHeader) -> Vec<u8> {
    let mut buffer = BytePacketBuffer::new();
    write_header(header, &mut buffer);
    buffer.into_inner()
}

pub fn encode_question(question: &DnsQuestion) -> Vec<u8> {
    let mut buffer = BytePacketBuffer::new();
    write_question(question, &mut buffer);
    buffer.into_inner()
}

pub fn encode_answer(record: &DnsRecord) -> Vec<u8> {
    encode_record(record)
}

pub fn encode_authority(record: &DnsRecord) -> Vec<u8> {
    encode_record(record)
}

pub fn encode_additional(record: &DnsRecord) -> Vec<u8> {
    encode_record(record)
}

fn encode_record(record: &DnsRecord) -> Vec<u8> {
    let mut buffer = BytePacketBuffer::new();
    write_record(record, &mut buffer);
    buffer.into_inner()
}

fn write_header(header: &DnsHeader, buffer: &mut BytePacketBuffer) {
    let start_pos = buffer.buf.len();

    buffer.write_u16(header.id);
    buffer.write_u16(header.flags());
    buffer.write_u16(header.questions);
    buffer.write_u16(header.answers);
    buffer.write_u16(header.authoritative_entries);
    buffer.write_u16(header.resource_entries);

    debug_assert_eq!(buffer.buf.len() - start_pos, HEADER_LEN);
}

fn write_question(question: &DnsQuestion, buffer: &mut BytePacketBuffer) {
    buffer.write_qname(&question.name);
    buffer.write_u16(question.qtype.to_num());
    buffer.write_u16(question.qclass.to_num());
}

fn write_record(record: &DnsRecord, buffer: &mut BytePacketBuffer) {
    debug_assert_eq!(record.data_len as usize, record.data.len());

    buffer.write_qname(&record.domain);
    buffer.write_u16(record.rtype.to_num());
    buffer.write_u16(record.class.to_num());
    buffer.write_u32(record.ttl);
    buffer.write_u16(record.data_len);
    buffer.write_bytes(&record.data);
}

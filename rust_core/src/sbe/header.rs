//! Outer package header, SBE message header and repeating-group header.

use super::reader::SbeReader;
use super::writer::SbeWriter;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// One per UDP datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHeader {
    pub payload_length: u16,
    pub channel_id: u16,
    pub sequence: u32,
}

impl PackageHeader {
    pub const SIZE: usize = 8;

    pub fn decode(reader: &mut SbeReader<'_>) -> Result<Self, DecodeError> {
        if reader.remaining() < Self::SIZE {
            // Check up front so a short datagram leaves the cursor at 0
            reader.skip(Self::SIZE)?;
        }
        Ok(Self {
            payload_length: reader.read_u16()?,
            channel_id: reader.read_u16()?,
            sequence: reader.read_u32()?,
        })
    }

    pub fn encode(&self, writer: &mut SbeWriter) {
        writer.put_u16(self.payload_length);
        writer.put_u16(self.channel_id);
        writer.put_u32(self.sequence);
    }

    /// Splits a datagram into its header and payload.
    ///
    /// The payload is clamped to the bytes actually received, so a length
    /// field that counts the header too (or a truncated datagram) still
    /// yields every message that arrived.
    pub fn split(datagram: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let mut reader = SbeReader::new(datagram);
        let header = Self::decode(&mut reader)?;
        let body = reader.rest();
        let len = (header.payload_length as usize).min(body.len());
        Ok((header, &body[..len]))
    }
}

/// Precedes every encoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
    pub num_groups: u16,
    pub num_var_data_fields: u16,
}

impl MessageHeader {
    pub const SIZE: usize = 12;

    pub fn decode(reader: &mut SbeReader<'_>) -> Result<Self, DecodeError> {
        if reader.remaining() < Self::SIZE {
            reader.skip(Self::SIZE)?;
        }
        Ok(Self {
            block_length: reader.read_u16()?,
            template_id: reader.read_u16()?,
            schema_id: reader.read_u16()?,
            version: reader.read_u16()?,
            num_groups: reader.read_u16()?,
            num_var_data_fields: reader.read_u16()?,
        })
    }

    pub fn encode(&self, writer: &mut SbeWriter) {
        writer.put_u16(self.block_length);
        writer.put_u16(self.template_id);
        writer.put_u16(self.schema_id);
        writer.put_u16(self.version);
        writer.put_u16(self.num_groups);
        writer.put_u16(self.num_var_data_fields);
    }
}

/// Repeating group dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHeader {
    pub block_length: u16,
    pub num_in_group: u16,
}

impl GroupHeader {
    /// Four bytes of dimensions plus four bytes of nested counts.
    pub const SIZE: usize = 8;

    pub fn decode(reader: &mut SbeReader<'_>) -> Result<Self, DecodeError> {
        if reader.remaining() < Self::SIZE {
            reader.skip(Self::SIZE)?;
        }
        let header = Self {
            block_length: reader.read_u16()?,
            num_in_group: reader.read_u16()?,
        };
        // numGroups + numVarDataFields, always zero in this schema
        reader.skip(4)?;
        Ok(header)
    }

    pub fn encode(&self, writer: &mut SbeWriter) {
        writer.put_u16(self.block_length);
        writer.put_u16(self.num_in_group);
        writer.put_u16(0);
        writer.put_u16(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_header_from_raw_bytes() {
        let raw = [
            0x8c, 0x00, 0xe8, 0x03, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00,
        ];
        let header = MessageHeader::decode(&mut SbeReader::new(&raw)).unwrap();
        assert_eq!(
            header,
            MessageHeader {
                block_length: 140,
                template_id: 1000,
                schema_id: 1,
                version: 1,
                num_groups: 0,
                num_var_data_fields: 1,
            }
        );
    }

    #[test]
    fn test_package_header_split() {
        let mut writer = SbeWriter::new();
        PackageHeader {
            payload_length: 3,
            channel_id: 1001,
            sequence: 65537,
        }
        .encode(&mut writer);
        writer.put_bytes(&[1, 2, 3, 4, 5]);

        let (header, payload) = PackageHeader::split(writer.as_bytes()).unwrap();
        assert_eq!(header.channel_id, 1001);
        assert_eq!(header.sequence, 65537);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn test_package_header_length_clamped() {
        let mut writer = SbeWriter::new();
        PackageHeader {
            payload_length: 500,
            channel_id: 1,
            sequence: 1,
        }
        .encode(&mut writer);
        writer.put_bytes(&[9, 9]);

        let (_, payload) = PackageHeader::split(writer.as_bytes()).unwrap();
        assert_eq!(payload, &[9, 9]);
    }

    #[test]
    fn test_short_datagram_is_end_of_stream() {
        let err = PackageHeader::split(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, DecodeError::EndOfStream { offset: 0, .. }));
    }

    #[test]
    fn test_group_header_discards_nested_counts() {
        let raw = [18, 0, 2, 0, 0, 0, 0, 0, 0xAA];
        let mut reader = SbeReader::new(&raw);
        let header = GroupHeader::decode(&mut reader).unwrap();
        assert_eq!(header.block_length, 18);
        assert_eq!(header.num_in_group, 2);
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
    }
}

// Canonical binary encoding helpers

use std::io::{self, Read};

/// Trait for types with a canonical byte encoding
pub trait Serializable {
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(data: &[u8]) -> Result<Self, String> where Self: Sized;
}

/// Append a variable-length integer (VarInt)
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffffffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes)?;
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Append bytes with length prefix (VarInt length + data)
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Upper bound on a single length-prefixed field
pub const MAX_VAR_BYTES: u64 = 4 * 1024 * 1024;

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)?;
    if len > MAX_VAR_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Field too large: {} bytes", len),
        ));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}

pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_varint_small() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 100);
        assert_eq!(buf, vec![100]);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_varint(&mut cursor).unwrap(), 100);
    }

    #[test]
    fn test_varint_widths() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 1000);
        assert_eq!(buf.len(), 3); // 0xfd + 2 bytes

        buf.clear();
        write_varint(&mut buf, 100000);
        assert_eq!(buf.len(), 5); // 0xfe + 4 bytes

        buf.clear();
        write_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 9);
        assert_eq!(read_varint(&mut Cursor::new(buf)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_var_bytes() {
        let data = b"hello world";
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, data);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_var_bytes(&mut cursor).unwrap(), data);
    }

    #[test]
    fn test_var_bytes_rejects_oversized_length() {
        let mut buf = Vec::new();
        write_varint(&mut buf, MAX_VAR_BYTES + 1);
        assert!(read_var_bytes(&mut Cursor::new(buf)).is_err());
    }
}

//! Record framing on the wire
//!
//! Packetized: `[u32 little-endian length][payload]` per record.
//! Otherwise records are written back to back.

use crate::assets::LENGTH_PREFIX_SIZE;
use bytes::{Buf, BufMut, Bytes};
use std::io::{self, Read, Write};

fn length_prefix(len: usize) -> io::Result<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(len).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("record of {len} bytes too large"))
    })?;
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    (&mut prefix[..]).put_u32_le(len);
    Ok(prefix)
}

/// Write one record, returning the number of bytes put on the wire.
pub fn write_record<W: Write + ?Sized>(writer: &mut W, payload: &[u8], packetize: bool) -> io::Result<usize> {
    let mut written = 0;
    if packetize {
        writer.write_all(&length_prefix(payload.len())?)?;
        written += LENGTH_PREFIX_SIZE;
    }
    writer.write_all(payload)?;
    Ok(written + payload.len())
}

/// Write a packet: its side payload first as a record of its own, then every
/// record of the main payload, each with its own prefix when packetized.
pub fn write_packet<W: Write + ?Sized, B: AsRef<[u8]>>(
    writer: &mut W,
    side: Option<&[u8]>,
    records: &[B],
    packetize: bool,
) -> io::Result<usize> {
    let mut written = 0;
    if let Some(side) = side {
        written += write_record(writer, side, packetize)?;
    }
    for record in records {
        written += write_record(writer, record.as_ref(), packetize)?;
    }
    writer.flush()?;
    Ok(written)
}

/// Reads packetized records back, one per call.
pub struct RecordReader<R> {
    reader: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next record, or `None` on a clean end of stream.
    ///
    /// A stream ending inside a prefix or a payload is `UnexpectedEof`. The
    /// payload is read as it arrives, never allocated from the claimed length.
    pub fn read_record(&mut self) -> io::Result<Option<Bytes>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        match filled {
            0 => return Ok(None),
            LENGTH_PREFIX_SIZE => {}
            n => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {n} bytes of a length prefix"),
                ));
            }
        }

        let len = (&prefix[..]).get_u32_le() as usize;
        let mut payload = Vec::new();
        self.reader
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record truncated at {} of {len} bytes", payload.len()),
            ));
        }
        Ok(Some(Bytes::from(payload)))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packetized_records_read_back() {
        let mut wire = Vec::new();
        write_record(&mut wire, b"first", true).unwrap();
        write_record(&mut wire, b"", true).unwrap();
        write_record(&mut wire, b"third record", true).unwrap();

        let records: Vec<Bytes> = RecordReader::new(&wire[..]).collect::<io::Result<_>>().unwrap();
        assert_eq!(
            records,
            vec![
                Bytes::from_static(b"first"),
                Bytes::new(),
                Bytes::from_static(b"third record")
            ]
        );
    }

    #[test]
    fn test_prefix_is_little_endian() {
        let mut wire = Vec::new();
        let written = write_record(&mut wire, &[0xaa; 258], true).unwrap();
        assert_eq!(written, 262);
        assert_eq!(&wire[..4], &[2, 1, 0, 0]);
    }

    #[test]
    fn test_side_payload_first() {
        let mut wire = Vec::new();
        let written = write_packet(&mut wire, Some(b"hdr"), &[b"body"], false).unwrap();
        assert_eq!(written, 7);
        assert_eq!(wire, b"hdrbody");

        let mut wire = Vec::new();
        write_packet(&mut wire, Some(b"hdr"), &[b"body"], true).unwrap();
        let mut reader = RecordReader::new(&wire[..]);
        assert_eq!(reader.read_record().unwrap().unwrap(), Bytes::from_static(b"hdr"));
        assert_eq!(reader.read_record().unwrap().unwrap(), Bytes::from_static(b"body"));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_every_record_prefixed() {
        let mut wire = Vec::new();
        let records = [Bytes::from_static(b"nal-1"), Bytes::from_static(b"nal-22")];
        write_packet(&mut wire, None, &records, true).unwrap();

        let lengths: Vec<usize> = RecordReader::new(&wire[..])
            .map(|r| r.map(|b| b.len()))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(lengths, vec![5, 6]);
    }

    #[test]
    fn test_truncated_record() {
        let wire = [10u8, 0, 0, 0, 1, 2];
        let err = RecordReader::new(&wire[..]).read_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_truncated_prefix() {
        let wire = [5u8, 0, 0, 0, b'h', b'e', b'l', b'l', b'o', 3, 0];
        let mut reader = RecordReader::new(&wire[..]);
        assert_eq!(reader.read_record().unwrap().unwrap(), Bytes::from_static(b"hello"));
        let err = reader.read_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_claim_on_short_stream() {
        let wire = [0xffu8, 0xff, 0xff, 0xff, 1, 2, 3];
        let err = RecordReader::new(&wire[..]).read_record().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    /// Writer accepting at most three bytes per call
    struct Trickle(Vec<u8>);

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_writes_completed() {
        let mut trickle = Trickle(Vec::new());
        write_packet(&mut trickle, None, &[b"0123456789"], true).unwrap();
        assert_eq!(trickle.0.len(), 14);
        assert_eq!(&trickle.0[4..], b"0123456789");
    }
}

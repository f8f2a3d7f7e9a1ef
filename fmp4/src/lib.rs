//! Fragmented MP4 media segments.
//!
//! Boxes implement [`Mp4Box`] (and [`DecodeBox`] for the ones that can be read
//! back). A [`MediaSegment`] strings a `styp`, any number of `sidx` boxes and a
//! list of [`Fragment`]s together, and knows how to size, encode, describe and
//! re-fragment them.

use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
pub use four_cc::FourCC;

mod boxes;
mod describe;
mod error;
mod fragment;
mod reader;
mod sample;
mod segment;
mod writer;

pub use boxes::*;
pub use describe::InfoLevels;
pub use error::{Error, Result};
pub use fragment::{EncodeOptimization, Fragment};
pub use sample::{FullSample, NON_SYNC_SAMPLE_FLAG};
pub use segment::{BoxRef, MediaSegment};
pub use writer::SliceWriter;

use reader::ContentReader;

/// Size of a plain box header (32-bit size + type).
pub const BOX_HEADER_SIZE: u64 = 8;

/// Size of a box header using the 64-bit `largesize` field.
pub const LARGE_BOX_HEADER_SIZE: u64 = 16;

fn get_total_box_size<B: Mp4Box + ?Sized>(boks: &B) -> u64 {
    let mut size = boks.content_size() + BOX_HEADER_SIZE;

    if boks.get_full_box_header().is_some() {
        size += FullBoxHeader::SIZE;
    }

    if size > u32::MAX as u64 {
        size += LARGE_BOX_HEADER_SIZE - BOX_HEADER_SIZE;
    }

    size
}

fn write_box_header<B: Mp4Box + ?Sized>(header: &mut [u8], size: u64) -> usize {
    if size > u32::MAX as _ {
        BigEndian::write_u32(&mut header[..], 1);
        header[4..8].copy_from_slice(&B::NAME.0);
        BigEndian::write_u64(&mut header[8..], size);

        16
    } else {
        BigEndian::write_u32(&mut header[..], size as u32);
        header[4..8].copy_from_slice(&B::NAME.0);

        8
    }
}

fn write_full_box_header(header: &mut [u8], box_header: FullBoxHeader) -> usize {
    header[0] = box_header.version;
    BigEndian::write_u24(&mut header[1..], box_header.flags);

    4
}

/// Lossy printable form of a box type.
pub fn fourcc_str(name: &FourCC) -> String {
    String::from_utf8_lossy(&name.0).into_owned()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FullBoxHeader {
    version: u8,
    flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;

    pub fn new(version: u8, flags: u32) -> Self {
        FullBoxHeader {
            version,
            flags: flags & 0x00ff_ffff,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub(crate) fn read(reader: &mut ContentReader<'_>) -> Result<Self> {
        let word = reader.read_u32()?;

        Ok(FullBoxHeader::new((word >> 24) as u8, word))
    }
}

/// Header of a box found in a byte buffer.
#[derive(Copy, Clone, Debug)]
pub struct BoxHeader {
    pub name: FourCC,
    /// Total size of the box, header included.
    pub size: u64,
    /// Number of bytes taken by the size/type fields.
    pub header_size: u64,
}

impl BoxHeader {
    /// Parses the header at the start of `data`. A size of zero means the box
    /// extends to the end of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BOX_HEADER_SIZE as usize {
            return Err(Error::Truncated {
                name: String::from("box header"),
                need: BOX_HEADER_SIZE,
                have: data.len() as u64,
            });
        }

        let mut name = [0u8; 4];
        name.copy_from_slice(&data[4..8]);
        let name = FourCC(name);

        let (size, header_size) = match BigEndian::read_u32(&data[..4]) {
            0 => (data.len() as u64, BOX_HEADER_SIZE),
            1 => {
                if data.len() < LARGE_BOX_HEADER_SIZE as usize {
                    return Err(Error::Truncated {
                        name: fourcc_str(&name),
                        need: LARGE_BOX_HEADER_SIZE,
                        have: data.len() as u64,
                    });
                }

                (BigEndian::read_u64(&data[8..16]), LARGE_BOX_HEADER_SIZE)
            }
            size => (size as u64, BOX_HEADER_SIZE),
        };

        if size < header_size {
            return Err(Error::InvalidBox {
                name: fourcc_str(&name),
                reason: format!("size {} is smaller than its header", size),
            });
        }

        if size > data.len() as u64 {
            return Err(Error::Truncated {
                name: fourcc_str(&name),
                need: size,
                have: data.len() as u64,
            });
        }

        Ok(BoxHeader {
            name,
            size,
            header_size,
        })
    }

    pub fn is(&self, name: &[u8; 4]) -> bool {
        &self.name.0 == name
    }

    /// The box contents (everything after the size/type fields).
    pub fn contents<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.header_size as usize..self.size as usize]
    }
}

/// A trait interface for a MP4 box.
pub trait Mp4Box {
    const NAME: FourCC;

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        None
    }

    fn flags(&self) -> Option<u32> {
        self.get_full_box_header().map(|h| h.flags)
    }

    /// The size of the contents of the box.
    fn content_size(&self) -> u64;

    fn size(&self) -> u64 {
        get_total_box_size::<Self>(self)
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()>;

    fn write<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        let mut header = [0u8; 20];

        let mut size = write_box_header::<Self>(&mut header, self.size());
        if let Some(box_header) = self.get_full_box_header() {
            size += write_full_box_header(&mut header[size..], box_header);
        }

        writer.put_slice(&header[..size]);

        self.write_box_contents(writer)?;

        Ok(())
    }

    /// Serializes the box and writes it to `w` in one call.
    fn encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut bytes = BytesMut::with_capacity(self.size() as usize);
        self.write(&mut bytes)?;

        w.write_all(&bytes)?;

        Ok(())
    }

    /// Serializes the box at the cursor of a pre-sized buffer.
    fn encode_sw(&self, sw: &mut SliceWriter) -> Result<()> {
        sw.write_box(self)
    }

    /// Writes fields and children below the title line. `level` is the detail
    /// level selected for this box type.
    fn describe_contents<W: io::Write + ?Sized>(
        &self,
        _w: &mut W,
        _levels: &InfoLevels,
        _level: u32,
        _indent: &str,
        _indent_step: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Writes a human readable description of the box tree.
    fn describe<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        levels: &InfoLevels,
        indent: &str,
        indent_step: &str,
    ) -> Result<()> {
        describe::write_title(w, &Self::NAME, self.size(), self.get_full_box_header(), indent)?;

        let inner = format!("{}{}", indent, indent_step);
        self.describe_contents(w, levels, levels.level_for(&Self::NAME), &inner, indent_step)
    }
}

/// A box that can be read back from its serialized form.
pub trait DecodeBox: Mp4Box + Sized {
    /// Decodes the box from its contents, i.e. the bytes after the size/type
    /// fields (including the version/flags word for full boxes).
    fn decode_box_contents(contents: &[u8]) -> Result<Self>;

    /// Decodes a box at the start of `data` and returns it with the number of
    /// bytes consumed.
    fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let header = BoxHeader::parse(data)?;

        if header.name.0 != Self::NAME.0 {
            return Err(Error::UnexpectedBox {
                name: fourcc_str(&header.name),
                context: "expected a different box type",
            });
        }

        let boks = Self::decode_box_contents(header.contents(data))
            .map_err(|e| e.in_box(&Self::NAME))?;

        Ok((boks, header.size as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parse_plain_and_large() {
        let plain = [0, 0, 0, 8, b'f', b'r', b'e', b'e'];
        let header = BoxHeader::parse(&plain).unwrap();
        assert!(header.is(b"free"));
        assert_eq!(header.size, 8);
        assert_eq!(header.header_size, 8);

        let mut large = vec![0, 0, 0, 1, b'm', b'd', b'a', b't'];
        large.extend_from_slice(&20u64.to_be_bytes());
        large.extend_from_slice(&[1, 2, 3, 4]);
        let header = BoxHeader::parse(&large).unwrap();
        assert_eq!(header.size, 20);
        assert_eq!(header.header_size, 16);
        assert_eq!(header.contents(&large), &[1, 2, 3, 4]);
    }

    #[test]
    fn header_parse_rejects_short_boxes() {
        let truncated = [0, 0, 0, 16, b'm', b'o', b'o', b'f'];
        assert!(matches!(
            BoxHeader::parse(&truncated),
            Err(Error::Truncated { need: 16, .. })
        ));

        let undersized = [0, 0, 0, 4, b'm', b'o', b'o', b'f'];
        assert!(matches!(
            BoxHeader::parse(&undersized),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn size_zero_extends_to_end() {
        let data = [0, 0, 0, 0, b'm', b'd', b'a', b't', 9, 9];
        let header = BoxHeader::parse(&data).unwrap();
        assert_eq!(header.size, 10);
    }
}

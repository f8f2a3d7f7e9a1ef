use four_cc::FourCC;

use bytes::BufMut;

use std::io;
use std::mem::size_of;

use crate::describe::write_field;
use crate::reader::ContentReader;
use crate::{fourcc_str, DecodeBox, Error, InfoLevels, Mp4Box, Result};

/// Segment type box, the `ftyp` of a media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTypeBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl SegmentTypeBox {
    pub fn new(major_brand: FourCC, minor_version: u32, compatible_brands: Vec<FourCC>) -> Self {
        SegmentTypeBox {
            major_brand,
            minor_version,
            compatible_brands,
        }
    }

    /// CMAF media segment brands.
    pub fn cmaf() -> Self {
        SegmentTypeBox::new(
            FourCC(*b"msdh"),
            0,
            vec![FourCC(*b"msdh"), FourCC(*b"msix")],
        )
    }
}

impl Mp4Box for SegmentTypeBox {
    const NAME: FourCC = FourCC(*b"styp");

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // major_brand
        size_of::<u32>() as u64 + // minor_version
        size_of::<u32>() as u64 * self.compatible_brands.len() as u64 // compatible_brands
    }

    fn write_box_contents<B: BufMut>(&self, writer: &mut B) -> Result<()> {
        writer.put_slice(&self.major_brand.0);
        writer.put_u32(self.minor_version);

        for brand in &self.compatible_brands {
            writer.put_slice(&brand.0);
        }

        Ok(())
    }

    fn describe_contents<W: io::Write + ?Sized>(
        &self,
        w: &mut W,
        _levels: &InfoLevels,
        level: u32,
        indent: &str,
        _indent_step: &str,
    ) -> Result<()> {
        if level < 1 {
            return Ok(());
        }

        write_field(w, indent, "majorBrand", fourcc_str(&self.major_brand))?;
        write_field(w, indent, "minorVersion", self.minor_version)?;

        let brands: Vec<String> = self.compatible_brands.iter().map(fourcc_str).collect();
        write_field(w, indent, "compatibleBrands", brands.join(", "))
    }
}

impl DecodeBox for SegmentTypeBox {
    fn decode_box_contents(contents: &[u8]) -> Result<Self> {
        let mut reader = ContentReader::new("styp", contents);

        let major_brand = reader.read_fourcc()?;
        let minor_version = reader.read_u32()?;

        if reader.remaining() % 4 != 0 {
            return Err(Error::invalid("styp", "brand list is not a multiple of 4 bytes"));
        }

        let mut compatible_brands = Vec::with_capacity(reader.remaining() / 4);
        while reader.remaining() > 0 {
            compatible_brands.push(reader.read_fourcc()?);
        }

        Ok(SegmentTypeBox::new(major_brand, minor_version, compatible_brands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmaf_styp_layout() {
        let styp = SegmentTypeBox::cmaf();
        let mut out = Vec::new();
        styp.encode(&mut out).unwrap();

        assert_eq!(styp.size(), 24);
        assert_eq!(out.len(), 24);
        assert_eq!(&out[4..8], b"styp");
        assert_eq!(&out[8..12], b"msdh");
        assert_eq!(&out[20..24], b"msix");

        let (decoded, used) = SegmentTypeBox::decode(&out).unwrap();
        assert_eq!(used, 24);
        assert_eq!(decoded, styp);
    }

    #[test]
    fn rejects_partial_brand() {
        let contents = [b'm', b's', b'd', b'h', 0, 0, 0, 0, b'x', b'y'];
        assert!(SegmentTypeBox::decode_box_contents(&contents).is_err());
    }
}

//! TIFF block layout, parsed from a prefix of the file.
//!
//! [`probe`] never does I/O. It is handed whatever prefix of the file the caller
//! has fetched so far, and either returns the [`TiffLayout`] of the first image
//! directory or tells the caller how long the prefix has to be for the next
//! attempt to get further ([`Probe::NeedBytes`]). Cloud optimized files keep the
//! first directory and its block offset arrays near the start of the file, so the
//! first fetch is usually enough.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIGURATION: u16 = 284;
const TAG_TILE_WIDTH: u16 = 322;
const TAG_TILE_LENGTH: u16 = 323;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;
const TAG_SAMPLE_FORMAT: u16 = 339;

/// Directories with more entries than this are assumed to be garbage.
const MAX_IFD_ENTRIES: u64 = 4096;

/// Largest block [`TiffLayout::block_range`] hands out. Byte counts above this are corrupt.
pub const MAX_BLOCK_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Planar {
    /// All bands of a pixel are stored together, one block holds every band.
    Chunky,
    /// Each band has its own set of blocks.
    Separate,
}

/// Column (`x`) and row (`y`) of a block in the block grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockIndex {
    pub x: u64,
    pub y: u64,
}

impl FromStr for BlockIndex {
    type Err = String;

    /// `x,y`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|v| v.trim().parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("expect x,y: {e}: {s:?}"))?;
        match parts[..] {
            [x, y] => Ok(BlockIndex { x, y }),
            _ => Err(format!("expect x,y: {s:?}")),
        }
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockShape {
    pub width: u64,
    pub height: u64,
}

impl FromStr for BlockShape {
    type Err = String;

    /// `WxH`, or a single number for square blocks.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('x')
            .map(|v| v.trim().parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("expect WxH: {e}: {s:?}"))?;
        match parts[..] {
            [n] => Ok(BlockShape {
                width: n,
                height: n,
            }),
            [width, height] => Ok(BlockShape { width, height }),
            _ => Err(format!("expect WxH: {s:?}")),
        }
    }
}

impl fmt::Display for BlockShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel type, named the way numpy and rasterio name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
}

impl SampleType {
    /// From TIFF `SampleFormat` and `BitsPerSample`.
    fn from_tiff(format: u64, bits: u64) -> Option<Self> {
        Some(match (format, bits) {
            (1, 8) => SampleType::Uint8,
            (2, 8) => SampleType::Int8,
            (1, 16) => SampleType::Uint16,
            (2, 16) => SampleType::Int16,
            (1, 32) => SampleType::Uint32,
            (2, 32) => SampleType::Int32,
            (1, 64) => SampleType::Uint64,
            (2, 64) => SampleType::Int64,
            (3, 32) => SampleType::Float32,
            (3, 64) => SampleType::Float64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleType::Uint8 => "uint8",
            SampleType::Int8 => "int8",
            SampleType::Uint16 => "uint16",
            SampleType::Int16 => "int16",
            SampleType::Uint32 => "uint32",
            SampleType::Int32 => "int32",
            SampleType::Uint64 => "uint64",
            SampleType::Int64 => "int64",
            SampleType::Float32 => "float32",
            SampleType::Float64 => "float64",
        }
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SampleType::Uint8,
            SampleType::Int8,
            SampleType::Uint16,
            SampleType::Int16,
            SampleType::Uint32,
            SampleType::Int32,
            SampleType::Uint64,
            SampleType::Int64,
            SampleType::Float32,
            SampleType::Float64,
        ]
        .into_iter()
        .find(|t| t.name() == s)
        .ok_or_else(|| format!("unknown pixel type: {s:?}"))
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte range of one block inside the file. `len` is zero for sparse blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub offset: u64,
    pub len: u64,
}

/// Block structure of the first image in a TIFF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffLayout {
    pub byte_order: ByteOrder,
    pub bigtiff: bool,
    pub width: u64,
    pub height: u64,
    pub block_shape: BlockShape,
    pub bands: u16,
    pub planar: Planar,
    pub sample_type: SampleType,
    pub compression: u16,
    /// `false` for strip organised files, whose blocks are full-width strips.
    pub tiled: bool,
    block_offsets: Vec<u64>,
    block_byte_counts: Vec<u64>,
}

impl TiffLayout {
    pub fn blocks_across(&self) -> u64 {
        self.width.div_ceil(self.block_shape.width)
    }

    pub fn blocks_down(&self) -> u64 {
        self.height.div_ceil(self.block_shape.height)
    }

    /// Byte range of `block` of the 1-based `band`.
    pub fn block_range(&self, band: u16, block: BlockIndex) -> Result<BlockRange> {
        if band == 0 || band > self.bands {
            return Err(Error::BandOutOfRange {
                band,
                bands: self.bands,
            });
        }
        let (across, down) = (self.blocks_across(), self.blocks_down());
        if block.x >= across || block.y >= down {
            return Err(Error::BlockOutOfRange {
                x: block.x,
                y: block.y,
                across,
                down,
            });
        }
        let plane = match self.planar {
            Planar::Chunky => 0,
            Planar::Separate => u64::from(band - 1),
        };
        let idx = across
            .checked_mul(down)
            .and_then(|per_plane| plane.checked_mul(per_plane))
            .and_then(|n| n.checked_add(block.y * across + block.x))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::UnsupportedTiff("block index overflow".to_owned()))?;
        let (offset, len) = match (self.block_offsets.get(idx), self.block_byte_counts.get(idx)) {
            (Some(&offset), Some(&len)) => (offset, len),
            _ => {
                return Err(Error::UnsupportedTiff(format!(
                    "block {idx} missing from offset table"
                )))
            }
        };
        if len > MAX_BLOCK_BYTES {
            return Err(Error::UnsupportedTiff(format!(
                "block {idx} claims {len} bytes, limit is {MAX_BLOCK_BYTES}"
            )));
        }
        if offset.checked_add(len).is_none() {
            return Err(Error::UnsupportedTiff(format!(
                "block {idx} ends past the largest file offset"
            )));
        }
        Ok(BlockRange { offset, len })
    }
}

/// Outcome of parsing a file prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Complete(TiffLayout),
    /// The prefix has to be at least this long to make progress.
    NeedBytes(u64),
}

/// Parse the first image directory out of `buf`, which holds bytes `[0, buf.len())` of the file.
pub fn probe(buf: &[u8]) -> Result<Probe> {
    match parse(buf) {
        Ok(layout) => Ok(Probe::Complete(layout)),
        Err(Stop::Need(n)) => Ok(Probe::NeedBytes(n)),
        Err(Stop::Fail(e)) => Err(e),
    }
}

enum Stop {
    Need(u64),
    Fail(Error),
}

impl From<Error> for Stop {
    fn from(e: Error) -> Self {
        Stop::Fail(e)
    }
}

fn unsupported(msg: impl Into<String>) -> Stop {
    Stop::Fail(Error::UnsupportedTiff(msg.into()))
}

struct Reader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl Reader<'_> {
    fn bytes(&self, pos: u64, len: u64) -> Result<&[u8], Stop> {
        let end = pos
            .checked_add(len)
            .ok_or_else(|| unsupported("offset overflow"))?;
        if end > self.buf.len() as u64 {
            return Err(Stop::Need(end));
        }
        Ok(&self.buf[pos as usize..end as usize])
    }

    fn uint(&self, pos: u64, size: u64) -> Result<u64, Stop> {
        let b = self.bytes(pos, size)?;
        let mut v = 0u64;
        match self.order {
            ByteOrder::LittleEndian => {
                for &byte in b.iter().rev() {
                    v = (v << 8) | u64::from(byte);
                }
            }
            ByteOrder::BigEndian => {
                for &byte in b {
                    v = (v << 8) | u64::from(byte);
                }
            }
        }
        Ok(v)
    }

    fn u16(&self, pos: u64) -> Result<u16, Stop> {
        self.uint(pos, 2).map(|v| v as u16)
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u64,
    /// Position of the value/offset field of the entry.
    value_pos: u64,
}

/// Size in bytes of one value of a TIFF field type.
fn type_size(field_type: u16) -> Option<u64> {
    Some(match field_type {
        1 | 2 | 6 | 7 => 1,
        3 | 8 => 2,
        4 | 9 | 11 | 13 => 4,
        5 | 10 | 12 | 16 | 17 | 18 => 8,
        _ => return None,
    })
}

/// Field types we can read as unsigned integers.
fn is_integer(field_type: u16) -> bool {
    matches!(field_type, 1 | 3 | 4 | 6 | 7 | 8 | 9 | 13 | 16 | 17 | 18)
}

struct Directory<'a> {
    reader: Reader<'a>,
    bigtiff: bool,
    entries: Vec<Entry>,
}

impl Directory<'_> {
    fn find(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    fn values(&self, entry: &Entry) -> Result<Vec<u64>, Stop> {
        if !is_integer(entry.field_type) {
            return Err(unsupported(format!(
                "tag {} has non-integer type {}",
                entry.tag, entry.field_type
            )));
        }
        let size = type_size(entry.field_type).ok_or_else(|| unsupported("bad field type"))?;
        let total = size
            .checked_mul(entry.count)
            .ok_or_else(|| unsupported("field size overflow"))?;
        let inline_cap = if self.bigtiff { 8 } else { 4 };
        let data_pos = if total <= inline_cap {
            entry.value_pos
        } else {
            self.reader.uint(entry.value_pos, inline_cap)?
        };
        // make sure the whole array is present before decoding any of it
        self.reader.bytes(data_pos, total)?;
        (0..entry.count)
            .map(|i| self.reader.uint(data_pos + i * size, size))
            .collect()
    }

    fn required(&self, tag: u16, name: &str) -> Result<Vec<u64>, Stop> {
        match self.find(tag) {
            Some(entry) => self.values(entry),
            None => Err(unsupported(format!("missing {name}"))),
        }
    }

    fn optional_first(&self, tag: u16, default: u64) -> Result<u64, Stop> {
        match self.find(tag) {
            Some(entry) => Ok(self.values(entry)?.first().copied().unwrap_or(default)),
            None => Ok(default),
        }
    }

    /// A per-sample tag whose values must all agree.
    fn uniform(&self, tag: u16, name: &str, default: u64) -> Result<u64, Stop> {
        let Some(entry) = self.find(tag) else {
            return Ok(default);
        };
        let values = self.values(entry)?;
        match values.split_first() {
            None => Ok(default),
            Some((first, rest)) if rest.iter().all(|v| v == first) => Ok(*first),
            Some(_) => Err(unsupported(format!("{name} differs between bands"))),
        }
    }
}

fn parse(buf: &[u8]) -> Result<TiffLayout, Stop> {
    if buf.len() < 8 {
        return Err(Stop::Need(16));
    }
    let order = match &buf[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return Err(Stop::Fail(Error::NotTiff)),
    };
    let reader = Reader { buf, order };
    let (bigtiff, ifd_offset) = match reader.u16(2)? {
        42 => (false, reader.uint(4, 4)?),
        43 => {
            if reader.u16(4)? != 8 || reader.u16(6)? != 0 {
                return Err(unsupported("bigtiff with offset size other than 8"));
            }
            (true, reader.uint(8, 8)?)
        }
        _ => return Err(Stop::Fail(Error::NotTiff)),
    };
    if ifd_offset == 0 {
        return Err(unsupported("no image directory"));
    }

    let (count, entries_pos, entry_len, count_len) = if bigtiff {
        (reader.uint(ifd_offset, 8)?, ifd_offset + 8, 20, 8)
    } else {
        (reader.uint(ifd_offset, 2)?, ifd_offset + 2, 12, 4)
    };
    if count == 0 || count > MAX_IFD_ENTRIES {
        return Err(unsupported(format!("{count} directory entries")));
    }
    reader.bytes(entries_pos, count * entry_len)?;
    let entries = (0..count)
        .map(|i| {
            let pos = entries_pos + i * entry_len;
            Ok(Entry {
                tag: reader.u16(pos)?,
                field_type: reader.u16(pos + 2)?,
                count: reader.uint(pos + 4, count_len)?,
                value_pos: pos + 4 + count_len,
            })
        })
        .collect::<Result<Vec<_>, Stop>>()?;
    let dir = Directory {
        reader,
        bigtiff,
        entries,
    };

    let width = dir.optional_first(TAG_IMAGE_WIDTH, 0)?;
    let height = dir.optional_first(TAG_IMAGE_LENGTH, 0)?;
    if width == 0 || height == 0 {
        return Err(unsupported("missing image dimensions"));
    }
    let bands = dir.optional_first(TAG_SAMPLES_PER_PIXEL, 1)?;
    let bands = u16::try_from(bands)
        .ok()
        .filter(|b| *b > 0)
        .ok_or_else(|| unsupported(format!("{bands} samples per pixel")))?;
    let bits = dir.uniform(TAG_BITS_PER_SAMPLE, "bits per sample", 1)?;
    let format = dir.uniform(TAG_SAMPLE_FORMAT, "sample format", 1)?;
    let sample_type = SampleType::from_tiff(format, bits).ok_or_else(|| {
        unsupported(format!("{bits} bit samples with sample format {format}"))
    })?;
    let planar = match dir.optional_first(TAG_PLANAR_CONFIGURATION, 1)? {
        1 => Planar::Chunky,
        2 => Planar::Separate,
        other => return Err(unsupported(format!("planar configuration {other}"))),
    };
    let compression = dir.optional_first(TAG_COMPRESSION, 1)? as u16;

    let tiled = dir.find(TAG_TILE_WIDTH).is_some();
    let (block_shape, offsets, counts) = if tiled {
        let block_shape = BlockShape {
            width: dir.optional_first(TAG_TILE_WIDTH, 0)?,
            height: dir.optional_first(TAG_TILE_LENGTH, 0)?,
        };
        let offsets = dir.required(TAG_TILE_OFFSETS, "tile offsets")?;
        let counts = dir.required(TAG_TILE_BYTE_COUNTS, "tile byte counts")?;
        (block_shape, offsets, counts)
    } else {
        let rows = dir.optional_first(TAG_ROWS_PER_STRIP, height)?;
        let block_shape = BlockShape {
            width,
            height: rows.min(height),
        };
        let offsets = dir.required(TAG_STRIP_OFFSETS, "strip offsets")?;
        let counts = dir.required(TAG_STRIP_BYTE_COUNTS, "strip byte counts")?;
        (block_shape, offsets, counts)
    };
    if block_shape.width == 0 || block_shape.height == 0 {
        return Err(unsupported("zero sized blocks"));
    }
    if offsets.len() != counts.len() {
        return Err(unsupported(format!(
            "{} block offsets but {} byte counts",
            offsets.len(),
            counts.len()
        )));
    }

    let layout = TiffLayout {
        byte_order: order,
        bigtiff,
        width,
        height,
        block_shape,
        bands,
        planar,
        sample_type,
        compression,
        tiled,
        block_offsets: offsets,
        block_byte_counts: counts,
    };
    let planes = match planar {
        Planar::Chunky => 1,
        Planar::Separate => u64::from(bands),
    };
    let expected = layout
        .blocks_across()
        .checked_mul(layout.blocks_down())
        .and_then(|n| n.checked_mul(planes))
        .ok_or_else(|| unsupported("block grid overflow"))?;
    if (layout.block_offsets.len() as u64) < expected {
        return Err(unsupported(format!(
            "expected {expected} blocks, offset table has {}",
            layout.block_offsets.len()
        )));
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TiffBuilder;

    fn complete(buf: &[u8]) -> TiffLayout {
        match probe(buf).unwrap() {
            Probe::Complete(layout) => layout,
            Probe::NeedBytes(n) => panic!("needs {n} bytes, have {}", buf.len()),
        }
    }

    #[test]
    fn parse_shape_and_xy() {
        assert_eq!(
            "512".parse::<BlockShape>().unwrap(),
            BlockShape {
                width: 512,
                height: 512
            }
        );
        assert_eq!(
            "640x480".parse::<BlockShape>().unwrap(),
            BlockShape {
                width: 640,
                height: 480
            }
        );
        assert_eq!(
            "3,4".parse::<BlockIndex>().unwrap(),
            BlockIndex { x: 3, y: 4 }
        );
        assert!("3".parse::<BlockIndex>().is_err());
        assert!("1x2x3".parse::<BlockShape>().is_err());
        assert!("axb".parse::<BlockShape>().is_err());
    }

    #[test]
    fn sample_type_names() {
        assert_eq!("uint16".parse::<SampleType>().unwrap(), SampleType::Uint16);
        assert_eq!(SampleType::Float32.to_string(), "float32");
        assert!("complex64".parse::<SampleType>().is_err());
    }

    #[test]
    fn classic_little_endian_tiled() {
        let tiff = TiffBuilder::new(100, 70).block(32, 16).build();
        let layout = complete(&tiff.bytes);
        assert_eq!(layout.byte_order, ByteOrder::LittleEndian);
        assert!(!layout.bigtiff);
        assert!(layout.tiled);
        assert_eq!((layout.width, layout.height), (100, 70));
        assert_eq!(layout.blocks_across(), 4);
        assert_eq!(layout.blocks_down(), 5);
        assert_eq!(layout.sample_type, SampleType::Uint16);

        let range = layout.block_range(1, BlockIndex { x: 2, y: 3 }).unwrap();
        let payload = &tiff.blocks[3 * 4 + 2];
        assert_eq!(range.len, payload.len() as u64);
        let start = range.offset as usize;
        assert_eq!(&tiff.bytes[start..start + payload.len()], &payload[..]);
    }

    #[test]
    fn bigtiff_big_endian() {
        let tiff = TiffBuilder::new(64, 64)
            .block(16, 16)
            .big_endian()
            .bigtiff()
            .sample(3, 32)
            .build();
        let layout = complete(&tiff.bytes);
        assert_eq!(layout.byte_order, ByteOrder::BigEndian);
        assert!(layout.bigtiff);
        assert_eq!(layout.sample_type, SampleType::Float32);
        let range = layout.block_range(1, BlockIndex { x: 3, y: 3 }).unwrap();
        let payload = tiff.blocks.last().unwrap();
        let start = range.offset as usize;
        assert_eq!(&tiff.bytes[start..start + payload.len()], &payload[..]);
    }

    #[test]
    fn strips_are_full_width_blocks() {
        let tiff = TiffBuilder::new(50, 25).strips(10).sample(1, 8).build();
        let layout = complete(&tiff.bytes);
        assert!(!layout.tiled);
        assert_eq!(
            layout.block_shape,
            BlockShape {
                width: 50,
                height: 10
            }
        );
        assert_eq!(layout.blocks_across(), 1);
        assert_eq!(layout.blocks_down(), 3);
        assert!(layout.block_range(1, BlockIndex { x: 0, y: 2 }).is_ok());
        assert!(matches!(
            layout.block_range(1, BlockIndex { x: 1, y: 0 }),
            Err(Error::BlockOutOfRange { .. })
        ));
    }

    #[test]
    fn planar_bands_have_own_blocks() {
        let tiff = TiffBuilder::new(32, 32)
            .block(16, 16)
            .bands(3)
            .separate_planes()
            .build();
        let layout = complete(&tiff.bytes);
        assert_eq!(layout.planar, Planar::Separate);
        let block = BlockIndex { x: 1, y: 0 };
        let r1 = layout.block_range(1, block).unwrap();
        let r3 = layout.block_range(3, block).unwrap();
        assert_ne!(r1, r3);
        assert_eq!(r3.len, tiff.blocks[2 * 4 + 1].len() as u64);
        assert!(matches!(
            layout.block_range(4, block),
            Err(Error::BandOutOfRange { band: 4, bands: 3 })
        ));
        assert!(layout.block_range(0, block).is_err());
    }

    #[test]
    fn chunky_bands_share_blocks() {
        let tiff = TiffBuilder::new(32, 32).block(16, 16).bands(3).build();
        let layout = complete(&tiff.bytes);
        let block = BlockIndex { x: 1, y: 1 };
        assert_eq!(
            layout.block_range(1, block).unwrap(),
            layout.block_range(3, block).unwrap()
        );
    }

    #[test]
    fn sparse_blocks_have_zero_length() {
        let tiff = TiffBuilder::new(32, 32).block(16, 16).sparse(&[1]).build();
        let layout = complete(&tiff.bytes);
        let range = layout.block_range(1, BlockIndex { x: 1, y: 0 }).unwrap();
        assert_eq!(range, BlockRange { offset: 0, len: 0 });
    }

    #[test]
    fn asks_for_more_when_arrays_are_at_the_end() {
        let tiff = TiffBuilder::new(256, 256)
            .block(16, 16)
            .arrays_at_end()
            .build();
        let mut have = 16;
        let mut rounds = 0;
        let layout = loop {
            match probe(&tiff.bytes[..have]).unwrap() {
                Probe::Complete(layout) => break layout,
                Probe::NeedBytes(n) => {
                    assert!(n as usize > have, "must ask for more than it has");
                    assert!(n as usize <= tiff.bytes.len());
                    have = n as usize;
                    rounds += 1;
                }
            }
        };
        assert!(rounds >= 2);
        assert_eq!(layout.blocks_across() * layout.blocks_down(), 256);
    }

    #[test]
    fn short_prefix_needs_header() {
        assert_eq!(probe(b"II").unwrap(), Probe::NeedBytes(16));
    }

    #[test]
    fn rejects_non_tiff() {
        assert!(matches!(
            probe(b"\x89PNG\r\n\x1a\n0000000000"),
            Err(Error::NotTiff)
        ));
        assert!(matches!(probe(b"II\x2b\x00\x04\x00\x00\x00"), Err(_)));
        assert!(matches!(probe(b"II\x00\x00\x08\x00\x00\x00"), Err(Error::NotTiff)));
    }

    /// Classic little-endian directory with one LONG or SHORT value per entry.
    fn classic_ifd(entries: &[(u16, u16, u32)]) -> Vec<u8> {
        let mut b = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        b.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(tag, field_type, value) in entries {
            b.extend_from_slice(&tag.to_le_bytes());
            b.extend_from_slice(&field_type.to_le_bytes());
            b.extend_from_slice(&1u32.to_le_bytes());
            b.extend_from_slice(&value.to_le_bytes());
        }
        b.extend_from_slice(&[0; 4]);
        b
    }

    #[test]
    fn huge_block_grid_is_rejected() {
        let b = classic_ifd(&[
            (256, 4, u32::MAX),
            (257, 4, u32::MAX),
            (258, 3, 8),
            (277, 3, 65535),
            (284, 3, 2),
            (322, 4, 1),
            (323, 4, 1),
            (324, 4, 100),
            (325, 4, 10),
        ]);
        assert!(matches!(probe(&b), Err(Error::UnsupportedTiff(_))));
    }

    #[test]
    fn corrupt_byte_counts_are_rejected() {
        let tiff = TiffBuilder::new(32, 32)
            .block(16, 16)
            .bigtiff()
            .byte_count(1, u64::MAX)
            .byte_count(2, MAX_BLOCK_BYTES + 1)
            .build();
        let layout = complete(&tiff.bytes);
        // blocks 1 and 2 of the 2x2 grid
        for block in [BlockIndex { x: 1, y: 0 }, BlockIndex { x: 0, y: 1 }] {
            assert!(matches!(
                layout.block_range(1, block),
                Err(Error::UnsupportedTiff(_))
            ));
        }
        assert!(layout.block_range(1, BlockIndex { x: 0, y: 0 }).is_ok());
    }

    #[test]
    fn rejects_mixed_bits_per_sample() {
        let tiff = TiffBuilder::new(16, 16)
            .block(16, 16)
            .bands(2)
            .bits_per_band(&[8, 16])
            .build();
        assert!(matches!(probe(&tiff.bytes), Err(Error::UnsupportedTiff(_))));
    }
}

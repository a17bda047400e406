//! Synthetic TIFF files for tests.
//!
//! Block payloads are not compressed pixels, just recognisable bytes of varying
//! length, which is all the readers look at.

use std::path::Path;

use crate::tiff::ByteOrder;

const SHORT: u16 = 3;
const LONG: u16 = 4;
const LONG8: u16 = 16;

/// A generated file and the payload of every block, in offset table order.
pub struct TestTiff {
    pub bytes: Vec<u8>,
    pub blocks: Vec<Vec<u8>>,
}

impl TestTiff {
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

#[derive(Clone)]
pub struct TiffBuilder {
    order: ByteOrder,
    bigtiff: bool,
    width: u32,
    height: u32,
    block: (u32, u32),
    tiled: bool,
    bands: u16,
    separate: bool,
    bits: Vec<u16>,
    sample_format: u16,
    arrays_at_end: bool,
    sparse: Vec<usize>,
    byte_counts: Vec<(usize, u64)>,
    seed: u8,
}

impl TiffBuilder {
    /// Little-endian classic TIFF, one uint16 band, 256x256 tiles.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            order: ByteOrder::LittleEndian,
            bigtiff: false,
            width,
            height,
            block: (256, 256),
            tiled: true,
            bands: 1,
            separate: false,
            bits: vec![16],
            sample_format: 1,
            arrays_at_end: false,
            sparse: Vec::new(),
            byte_counts: Vec::new(),
            seed: 0,
        }
    }

    pub fn block(mut self, width: u32, height: u32) -> Self {
        self.tiled = true;
        self.block = (width, height);
        self
    }

    pub fn strips(mut self, rows_per_strip: u32) -> Self {
        self.tiled = false;
        self.block = (self.width, rows_per_strip);
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.order = ByteOrder::BigEndian;
        self
    }

    pub fn bigtiff(mut self) -> Self {
        self.bigtiff = true;
        self
    }

    pub fn bands(mut self, bands: u16) -> Self {
        let bits = self.bits[0];
        self.bands = bands;
        self.bits = vec![bits; usize::from(bands)];
        self
    }

    pub fn separate_planes(mut self) -> Self {
        self.separate = true;
        self
    }

    pub fn sample(mut self, format: u16, bits: u16) -> Self {
        self.sample_format = format;
        self.bits = vec![bits; usize::from(self.bands)];
        self
    }

    pub fn bits_per_band(mut self, bits: &[u16]) -> Self {
        self.bits = bits.to_vec();
        self
    }

    /// Put the offset and byte count arrays after the block data.
    pub fn arrays_at_end(mut self) -> Self {
        self.arrays_at_end = true;
        self
    }

    pub fn sparse(mut self, blocks: &[usize]) -> Self {
        self.sparse = blocks.to_vec();
        self
    }

    /// Write `count` into the byte count table for `block` instead of its real length.
    pub fn byte_count(mut self, block: usize, count: u64) -> Self {
        self.byte_counts.push((block, count));
        self
    }

    /// Varies block contents between files built with otherwise equal settings.
    pub fn seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    fn payload(&self, i: usize) -> Vec<u8> {
        let len = 16 + (i * 7) % 64;
        (0..len)
            .map(|j| (i as u8).wrapping_mul(31).wrapping_add(j as u8) ^ self.seed)
            .collect()
    }

    pub fn build(&self) -> TestTiff {
        let across = self.width.div_ceil(self.block.0) as usize;
        let down = self.height.div_ceil(self.block.1) as usize;
        let planes = if self.separate {
            usize::from(self.bands)
        } else {
            1
        };
        let blocks: Vec<Vec<u8>> = (0..across * down * planes)
            .map(|i| {
                if self.sparse.contains(&i) {
                    Vec::new()
                } else {
                    self.payload(i)
                }
            })
            .collect();

        let offset_type = if self.bigtiff { LONG8 } else { LONG };
        let (offsets_tag, counts_tag) = if self.tiled { (324, 325) } else { (273, 279) };
        let mut entries: Vec<(u16, u16, Vec<u64>)> = vec![
            (256, LONG, vec![u64::from(self.width)]),
            (257, LONG, vec![u64::from(self.height)]),
            (258, SHORT, self.bits.iter().map(|&b| u64::from(b)).collect()),
            (259, SHORT, vec![1]),
            (277, SHORT, vec![u64::from(self.bands)]),
            (284, SHORT, vec![if self.separate { 2 } else { 1 }]),
            (
                339,
                SHORT,
                vec![u64::from(self.sample_format); usize::from(self.bands)],
            ),
            (offsets_tag, offset_type, vec![0; blocks.len()]),
            (counts_tag, offset_type, vec![0; blocks.len()]),
        ];
        if self.tiled {
            entries.push((322, LONG, vec![u64::from(self.block.0)]));
            entries.push((323, LONG, vec![u64::from(self.block.1)]));
        } else {
            entries.push((278, LONG, vec![u64::from(self.block.1)]));
        }
        entries.sort_by_key(|e| e.0);

        let inline_cap = if self.bigtiff { 8 } else { 4 };
        let size_of = |t: u16| if t == SHORT { 2 } else if t == LONG { 4 } else { 8 };
        let header_len = if self.bigtiff { 16 } else { 8 };
        let ifd_len = if self.bigtiff {
            8 + entries.len() * 20 + 8
        } else {
            2 + entries.len() * 12 + 4
        };
        let out_of_line: usize = entries
            .iter()
            .map(|(_, t, v)| size_of(*t) * v.len())
            .filter(|len| *len > inline_cap)
            .map(|len| len + len % 2)
            .sum();
        let data_len: usize = blocks.iter().map(Vec::len).sum();

        let ifd_pos = header_len;
        let (ool_pos, data_pos) = if self.arrays_at_end {
            (ifd_pos + ifd_len + data_len, ifd_pos + ifd_len)
        } else {
            (ifd_pos + ifd_len, ifd_pos + ifd_len + out_of_line)
        };

        let mut pos = data_pos as u64;
        let mut offsets = Vec::with_capacity(blocks.len());
        for block in &blocks {
            if block.is_empty() {
                offsets.push(0);
            } else {
                offsets.push(pos);
                pos += block.len() as u64;
            }
        }
        let mut counts = blocks.iter().map(|b| b.len() as u64).collect::<Vec<_>>();
        for &(block, count) in &self.byte_counts {
            counts[block] = count;
        }
        for (tag, _, values) in entries.iter_mut() {
            if *tag == offsets_tag {
                *values = offsets.clone();
            } else if *tag == counts_tag {
                *values = counts.clone();
            }
        }

        let mut out = Writer {
            order: self.order,
            buf: Vec::with_capacity(ool_pos + out_of_line + data_len),
        };
        out.buf.extend_from_slice(match self.order {
            ByteOrder::LittleEndian => b"II",
            ByteOrder::BigEndian => b"MM",
        });
        if self.bigtiff {
            out.put(43, 2);
            out.put(8, 2);
            out.put(0, 2);
            out.put(ifd_pos as u64, 8);
            out.put(entries.len() as u64, 8);
        } else {
            out.put(42, 2);
            out.put(ifd_pos as u64, 4);
            out.put(entries.len() as u64, 2);
        }

        let mut ool = Writer {
            order: self.order,
            buf: Vec::with_capacity(out_of_line),
        };
        for (tag, field_type, values) in &entries {
            let size = size_of(*field_type);
            out.put(u64::from(*tag), 2);
            out.put(u64::from(*field_type), 2);
            out.put(values.len() as u64, if self.bigtiff { 8 } else { 4 });
            if size * values.len() <= inline_cap {
                for v in values {
                    out.put(*v, size);
                }
                out.pad(inline_cap - size * values.len());
            } else {
                out.put((ool_pos + ool.buf.len()) as u64, inline_cap);
                for v in values {
                    ool.put(*v, size);
                }
                if ool.buf.len() % 2 == 1 {
                    ool.pad(1);
                }
            }
        }
        out.pad(if self.bigtiff { 8 } else { 4 });

        if self.arrays_at_end {
            out.buf.extend(blocks.iter().flatten());
            out.buf.extend_from_slice(&ool.buf);
        } else {
            out.buf.extend_from_slice(&ool.buf);
            out.buf.extend(blocks.iter().flatten());
        }

        TestTiff {
            bytes: out.buf,
            blocks,
        }
    }
}

struct Writer {
    order: ByteOrder,
    buf: Vec<u8>,
}

impl Writer {
    fn put(&mut self, v: u64, size: usize) {
        let bytes = v.to_le_bytes();
        match self.order {
            ByteOrder::LittleEndian => self.buf.extend_from_slice(&bytes[..size]),
            ByteOrder::BigEndian => self.buf.extend(bytes[..size].iter().rev()),
        }
    }

    fn pad(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }
}

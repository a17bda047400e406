//! This crate reads one block of a tiled (or stripped) TIFF without downloading the file.
//!
//! # Usage
//!
//! 1. Parse each input string into a [`Location`]: `s3://bucket/key`, `http(s)://…`,
//!    `file:///…` or a plain path.
//! 2. Build a reader from a [`SourceConfig`]: [`BlockingReader`] for OS threads,
//!    [`AsyncReader`] for tokio tasks.
//! 3. Call `read_block(location, band, block)`. It fetches the file header with
//!    as few range requests as it can, works out the byte range of the block,
//!    and fetches exactly that range.
//!
//! Header parsing does no I/O, see [`tiff::probe`] and [`HeaderFetch`]. The readers
//! only move bytes.
//!
//! ```no_run
//! use cog_range::{BlockIndex, BlockingReader, Location, SourceConfig};
//!
//! let reader = BlockingReader::new(SourceConfig::default()).unwrap();
//! let location = Location::parse("s3://landsat-pds/c1/L8/106/070/LC08_L1TP_106070_20180417_20180501_01_T1/LC08_L1TP_106070_20180417_20180501_01_T1_B1.TIF").unwrap();
//! let read = reader.read_block(&location, 1, BlockIndex { x: 7, y: 7 }).unwrap();
//! println!("{} bytes, open took {:?}", read.data.len(), read.t_open);
//! ```

mod blocking;
mod config;
mod error;
mod header;
mod http;
pub mod list;
mod location;
mod nonblocking;
pub mod tiff;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use blocking::BlockingReader;
pub use config::{default_region, SourceConfig};
pub use error::{Error, Result};
pub use header::{HeaderFetch, HeaderStep, OpenStats};
pub use location::Location;
pub use nonblocking::AsyncReader;
pub use tiff::{BlockIndex, BlockRange, BlockShape, SampleType, TiffLayout};

use std::time::Duration;

/// A block fetched by one of the readers, with the time split the benchmark reports.
#[derive(Debug, Clone)]
pub struct BlockRead {
    pub layout: TiffLayout,
    pub range: BlockRange,
    pub data: bytes::Bytes,
    pub open_stats: OpenStats,
    /// Time until the block layout was known (header fetches and parse).
    pub t_open: Duration,
    /// Time until the block bytes were in memory.
    pub t_total: Duration,
}

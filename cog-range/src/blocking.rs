use std::time::Instant;

use bytes::Bytes;
use reqwest::header::RANGE;
use tracing::trace;

use crate::{
    http::{range_body, range_header, read_file_range},
    location::Target,
    BlockIndex, BlockRead, Error, HeaderFetch, HeaderStep, Location, OpenStats, Result,
    SourceConfig, TiffLayout,
};

/// Reads blocks from the calling thread.
///
/// One instance is meant to be shared by all worker threads, the underlying
/// connection pool is reused between files. Must not be created or dropped from
/// within an async context.
pub struct BlockingReader {
    http: reqwest::blocking::Client,
    config: SourceConfig,
}

impl BlockingReader {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::blocking::Client {
        &self.http
    }

    /// Up to `len` bytes at `offset`. Fewer only when the object ends first.
    pub fn fetch(&self, location: &Location, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        match location.resolve(&self.config)? {
            Target::File(path) => read_file_range(path, offset, len),
            Target::Http(url) => {
                trace!(%url, offset, len, "range get");
                let response = self
                    .http
                    .get(url.clone())
                    .header(RANGE, range_header(offset, len)?)
                    .send()?;
                let status = response.status();
                let body = response.bytes()?;
                range_body(&url, status, offset, len, body)
            }
        }
    }

    pub fn open(&self, location: &Location) -> Result<(TiffLayout, OpenStats)> {
        let mut header = HeaderFetch::new(self.config.header_bytes, self.config.max_header_bytes);
        loop {
            match header.next_step()? {
                HeaderStep::Fetch { offset, len } => {
                    let data = self.fetch(location, offset, len)?;
                    header.push(len, &data);
                }
                HeaderStep::Done(layout) => return Ok((layout, header.stats())),
            }
        }
    }

    /// Open `location` and fetch `block` of the 1-based `band`.
    pub fn read_block(&self, location: &Location, band: u16, block: BlockIndex) -> Result<BlockRead> {
        let start = Instant::now();
        let (layout, open_stats) = self.open(location)?;
        let t_open = start.elapsed();
        let range = layout.block_range(band, block)?;
        let data = self.fetch(location, range.offset, range.len)?;
        if data.len() as u64 != range.len {
            return Err(Error::Truncated);
        }
        Ok(BlockRead {
            layout,
            range,
            data,
            open_stats,
            t_open,
            t_total: start.elapsed(),
        })
    }
}

use std::{path::PathBuf, time::Instant};

use bytes::Bytes;
use reqwest::header::RANGE;
use tracing::trace;

use crate::{
    http::{range_body, range_header, read_file_range},
    location::Target,
    BlockIndex, BlockRead, Error, HeaderFetch, HeaderStep, Location, OpenStats, Result,
    SourceConfig, TiffLayout,
};

/// Async twin of [`crate::BlockingReader`], for use from tokio tasks.
///
/// Local files are read on tokio's blocking pool.
#[derive(Clone)]
pub struct AsyncReader {
    http: reqwest::Client,
    config: SourceConfig,
}

impl AsyncReader {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub async fn fetch(&self, location: &Location, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        match location.resolve(&self.config)? {
            Target::File(path) => {
                let path: PathBuf = path.to_owned();
                tokio::task::spawn_blocking(move || read_file_range(&path, offset, len))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?
            }
            Target::Http(url) => {
                trace!(%url, offset, len, "range get");
                let response = self
                    .http
                    .get(url.clone())
                    .header(RANGE, range_header(offset, len)?)
                    .send()
                    .await?;
                let status = response.status();
                let body = response.bytes().await?;
                range_body(&url, status, offset, len, body)
            }
        }
    }

    pub async fn open(&self, location: &Location) -> Result<(TiffLayout, OpenStats)> {
        let mut header = HeaderFetch::new(self.config.header_bytes, self.config.max_header_bytes);
        loop {
            match header.next_step()? {
                HeaderStep::Fetch { offset, len } => {
                    let data = self.fetch(location, offset, len).await?;
                    header.push(len, &data);
                }
                HeaderStep::Done(layout) => return Ok((layout, header.stats())),
            }
        }
    }

    pub async fn read_block(
        &self,
        location: &Location,
        band: u16,
        block: BlockIndex,
    ) -> Result<BlockRead> {
        let start = Instant::now();
        let (layout, open_stats) = self.open(location).await?;
        let t_open = start.elapsed();
        let range = layout.block_range(band, block)?;
        let data = self.fetch(location, range.offset, range.len).await?;
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

use crate::{
    tiff::{self, Probe},
    Error, Result, TiffLayout,
};

/// What a reader has to do next to finish opening a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStep {
    Fetch { offset: u64, len: u64 },
    Done(TiffLayout),
}

/// What it took to open one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenStats {
    /// Range requests until the layout could be parsed.
    pub fetches: usize,
    /// Length of the fetched file prefix.
    pub header_bytes: u64,
}

/// Accumulates a file prefix until the TIFF layout can be parsed from it.
///
/// Shared by the blocking and the async reader, which only differ in how they
/// perform the [`HeaderStep::Fetch`] requests:
///
/// ```text
/// let mut header = HeaderFetch::new(initial, limit);
/// loop {
///     match header.next_step()? {
///         HeaderStep::Fetch { offset, len } => header.push(len, &fetch(offset, len)?),
///         HeaderStep::Done(layout) => return Ok((layout, header.stats())),
///     }
/// }
/// ```
///
/// The prefix at least doubles on every fetch so deep headers take few round trips.
#[derive(Debug)]
pub struct HeaderFetch {
    buf: Vec<u8>,
    initial: u64,
    limit: u64,
    eof: bool,
    fetches: usize,
}

impl HeaderFetch {
    pub fn new(initial: u64, limit: u64) -> Self {
        Self {
            buf: Vec::new(),
            initial: initial.max(16),
            limit: limit.max(initial),
            eof: false,
            fetches: 0,
        }
    }

    pub fn next_step(&self) -> Result<HeaderStep> {
        if self.fetches == 0 {
            return Ok(HeaderStep::Fetch {
                offset: 0,
                len: self.initial,
            });
        }
        match tiff::probe(&self.buf)? {
            Probe::Complete(layout) => Ok(HeaderStep::Done(layout)),
            Probe::NeedBytes(needed) => {
                if self.eof {
                    return Err(Error::Truncated);
                }
                if needed > self.limit {
                    return Err(Error::HeaderTooLarge {
                        needed,
                        limit: self.limit,
                    });
                }
                let have = self.buf.len() as u64;
                let want = needed.max(have * 2).min(self.limit);
                Ok(HeaderStep::Fetch {
                    offset: have,
                    len: want - have,
                })
            }
        }
    }

    /// Append the answer to the last [`HeaderStep::Fetch`] of `requested` bytes.
    pub fn push(&mut self, requested: u64, data: &[u8]) {
        if (data.len() as u64) < requested {
            self.eof = true;
        }
        self.fetches += 1;
        self.buf.extend_from_slice(data);
    }

    /// Number of fetches answered so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn prefix_len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn stats(&self) -> OpenStats {
        OpenStats {
            fetches: self.fetches,
            header_bytes: self.prefix_len(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url}: unexpected http status {status}")]
    Http { url: String, status: u16 },
    #[error("not a tiff file")]
    NotTiff,
    #[error("unsupported tiff: {0}")]
    UnsupportedTiff(String),
    #[error("file ended before the tiff header was complete")]
    Truncated,
    #[error("tiff header needs {needed} bytes, limit is {limit}")]
    HeaderTooLarge { needed: u64, limit: u64 },
    #[error("block ({x},{y}) is outside the {across}x{down} block grid")]
    BlockOutOfRange {
        x: u64,
        y: u64,
        across: u64,
        down: u64,
    },
    #[error("band {band} out of range, file has {bands} band(s)")]
    BandOutOfRange { band: u16, bands: u16 },
    #[error("byte range of {len} bytes at {offset} overflows")]
    RangeOverflow { offset: u64, len: u64 },
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("listing failed: {0}")]
    Listing(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::{os::unix::fs::FileExt, path::Path};

use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::{Error, Result};

/// `Range` header value for `len > 0` bytes starting at `offset`.
pub(crate) fn range_header(offset: u64, len: u64) -> Result<String> {
    let last = len
        .checked_sub(1)
        .and_then(|n| offset.checked_add(n))
        .ok_or(Error::RangeOverflow { offset, len })?;
    Ok(format!("bytes={offset}-{last}"))
}

/// Turn a ranged GET response into exactly the requested bytes.
///
/// Servers that ignore `Range` answer 200 with the whole object, and a range
/// starting at or past the end of the object gets 416. Both are fine for header
/// probing, which reads past short files on purpose.
pub(crate) fn range_body(
    url: &Url,
    status: StatusCode,
    offset: u64,
    len: u64,
    body: Bytes,
) -> Result<Bytes> {
    match status {
        StatusCode::PARTIAL_CONTENT => Ok(body.slice(..body.len().min(len as usize))),
        StatusCode::OK => {
            let start = (offset as usize).min(body.len());
            let end = (offset.saturating_add(len) as usize).min(body.len());
            Ok(body.slice(start..end))
        }
        StatusCode::RANGE_NOT_SATISFIABLE => Ok(Bytes::new()),
        status => Err(Error::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// Positional read of up to `len` bytes. Shorter only at end of file.
pub(crate) fn read_file_range(path: &Path, offset: u64, len: u64) -> Result<Bytes> {
    let file = std::fs::File::open(path)?;
    // never allocate past the end of the file, `len` may come from a corrupt header
    let available = file.metadata()?.len().saturating_sub(offset);
    let want = usize::try_from(len.min(available))
        .map_err(|_| Error::RangeOverflow { offset, len })?;
    let mut buf = vec![0u8; want];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

//! Listing candidate files under an S3 prefix or a local directory.
//!
//! S3 listings are anonymous `ListObjectsV2` calls, which is what public
//! datasets allow.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::{
    location::{s3_bucket_url, split_s3},
    BlockingReader, Error, Result,
};

static KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Key>([^<]*)</Key>").unwrap());
static IS_TRUNCATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<IsTruncated>\s*(true|false)\s*</IsTruncated>").unwrap());
static NEXT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>").unwrap()
});

/// Keeps listed URLs that match.
#[derive(Debug, Clone)]
pub struct Filter(Regex);

impl Filter {
    /// Shell style pattern matched against the whole URL, e.g. `*_B1.TIF`.
    pub fn glob(pattern: &str) -> Result<Self> {
        Regex::new(&glob_to_regex(pattern))
            .map(Filter)
            .map_err(|e| Error::Listing(format!("bad glob {pattern:?}: {e}")))
    }

    /// Regular expression searched for anywhere in the URL.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Filter)
            .map_err(|e| Error::Listing(format!("bad regex {pattern:?}: {e}")))
    }

    pub fn matches(&self, url: &str) -> bool {
        self.0.is_match(url)
    }
}

/// Translate a shell glob to an anchored regex: `*` any run, `?` one char,
/// `[...]` a class (`[!...]` negated), everything else literal.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?s)^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // find the closing bracket, a leading `!` or `]` is part of the class
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut class: String = chars[i + 1..j].iter().collect();
                    if let Some(rest) = class.strip_prefix('!') {
                        class = format!("^{rest}");
                    } else if class.starts_with('^') {
                        class = format!(r"\{class}");
                    }
                    out.push('[');
                    out.push_str(&class.replace('\\', r"\\"));
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ListPage {
    pub keys: Vec<String>,
    pub next_token: Option<String>,
}

pub(crate) fn parse_list_page(xml: &str) -> ListPage {
    let keys = KEY
        .captures_iter(xml)
        .map(|c| xml_unescape(&c[1]))
        .collect();
    let truncated = IS_TRUNCATED
        .captures(xml)
        .map(|c| &c[1] == "true")
        .unwrap_or(false);
    let next_token = if truncated {
        NEXT_TOKEN.captures(xml).map(|c| xml_unescape(&c[1]))
    } else {
        None
    };
    ListPage { keys, next_token }
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

impl BlockingReader {
    /// Every object below `prefix` (`s3://bucket/prefix` or a directory), sorted.
    pub fn list(&self, prefix: &str, filter: Option<&Filter>) -> Result<Vec<String>> {
        let mut urls = match prefix.strip_prefix("s3://") {
            Some(rest) => self.list_s3(rest)?,
            None => list_dir(Path::new(prefix.strip_prefix("file://").unwrap_or(prefix)))?,
        };
        if let Some(filter) = filter {
            urls.retain(|url| filter.matches(url));
        }
        urls.sort();
        Ok(urls)
    }

    fn list_s3(&self, rest: &str) -> Result<Vec<String>> {
        let (bucket, key_prefix) = split_s3(rest);
        if bucket.is_empty() {
            return Err(Error::InvalidLocation(format!("s3://{rest}: missing bucket")));
        }
        let base = s3_bucket_url(self.config(), bucket)?;
        let mut urls = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let url = list_url(&base, key_prefix, token.as_deref());
            debug!(%url, "list objects");
            let response = self.http().get(url.clone()).send()?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let page = parse_list_page(&response.text()?);
            urls.extend(page.keys.iter().map(|key| format!("s3://{bucket}/{key}")));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(urls)
    }
}

fn list_url(base: &Url, prefix: &str, token: Option<&str>) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("list-type", "2");
        if !prefix.is_empty() {
            query.append_pair("prefix", prefix);
        }
        if let Some(token) = token {
            query.append_pair("continuation-token", token);
        }
    }
    url
}

fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let root = dir.canonicalize()?;
    let mut urls = Vec::new();
    for entry in walkdir::WalkDir::new(&root) {
        let entry = entry.map_err(|e| Error::Listing(e.to_string()))?;
        if entry.file_type().is_file() {
            urls.push(entry.path().display().to_string());
        }
    }
    Ok(urls)
}

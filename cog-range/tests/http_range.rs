//! Reads over HTTP against a minimal in-process server.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use cog_range::{test_util::TiffBuilder, AsyncReader, BlockIndex, Location, SourceConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

/// Serves `body` at every path. Honours `Range` unless `ignore_range` is set.
/// Returns the base url and a counter of requests served.
async fn serve(body: Vec<u8>, ignore_range: bool) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    tokio::spawn({
        let requests = Arc::clone(&requests);
        async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let body = Arc::clone(&body);
                requests.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    let mut req = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = stream.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        req.extend_from_slice(&buf[..n]);
                    }
                    let req = String::from_utf8_lossy(&req).to_ascii_lowercase();
                    let range = req
                        .lines()
                        .find_map(|l| l.strip_prefix("range: bytes="))
                        .and_then(|r| r.trim().split_once('-'))
                        .map(|(a, b)| (a.parse::<usize>().unwrap(), b.parse::<usize>().unwrap()));
                    let (status, data) = match range {
                        Some((start, _)) if !ignore_range && start >= body.len() => {
                            ("416 Range Not Satisfiable", &body[0..0])
                        }
                        Some((start, end)) if !ignore_range => {
                            ("206 Partial Content", &body[start..(end + 1).min(body.len())])
                        }
                        _ => ("200 OK", &body[..]),
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        data.len()
                    );
                    stream.write_all(head.as_bytes()).await.unwrap();
                    stream.write_all(data).await.unwrap();
                    stream.shutdown().await.unwrap();
                });
            }
        }
    });
    (format!("http://{addr}"), requests)
}

#[tokio::test]
async fn ranged_reads_over_http() {
    let tiff = TiffBuilder::new(256, 256).block(64, 64).build();
    let (base, requests) = serve(tiff.bytes.clone(), false).await;
    let reader = AsyncReader::new(SourceConfig::default()).unwrap();
    let location = Location::parse(&format!("{base}/scene/B1.TIF")).unwrap();

    let read = reader
        .read_block(&location, 1, BlockIndex { x: 2, y: 1 })
        .await
        .unwrap();
    assert_eq!(&read.data[..], &tiff.blocks[4 + 2][..]);
    // one header fetch and one block fetch
    assert_eq!(requests.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn server_ignoring_range_still_works() {
    let tiff = TiffBuilder::new(256, 256).block(64, 64).build();
    let (base, _) = serve(tiff.bytes.clone(), true).await;
    let reader = AsyncReader::new(SourceConfig::default()).unwrap();
    let location = Location::parse(&format!("{base}/B1.TIF")).unwrap();

    let read = reader
        .read_block(&location, 1, BlockIndex { x: 3, y: 3 })
        .await
        .unwrap();
    assert_eq!(&read.data[..], &tiff.blocks[15][..]);
}

#[tokio::test]
async fn s3_locations_go_to_the_endpoint() {
    let tiff = TiffBuilder::new(128, 128)
        .block(32, 32)
        .arrays_at_end()
        .build();
    let (base, requests) = serve(tiff.bytes.clone(), false).await;
    let reader = AsyncReader::new(SourceConfig {
        endpoint: Some(base.parse().unwrap()),
        header_bytes: 64,
        ..SourceConfig::default()
    })
    .unwrap();
    let location = Location::parse("s3://bucket/path/to/B1.TIF").unwrap();
    let read = reader
        .read_block(&location, 1, BlockIndex { x: 0, y: 0 })
        .await
        .unwrap();
    assert_eq!(&read.data[..], &tiff.blocks[0][..]);
    assert!(requests.load(Ordering::Relaxed) > 2);
}

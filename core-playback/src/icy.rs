//! # ICY Metadata Framing
//!
//! Shoutcast/Icecast servers interleave metadata into the audio body when the
//! request carries `Icy-MetaData: 1`. The response header `icy-metaint: N`
//! announces the layout:
//!
//! ```text
//! [N audio bytes][L][L*16 bytes of text, NUL padded][N audio bytes][L]...
//! ```
//!
//! [`MetadataFramingReader`] strips the blocks and yields audio bytes only.
//! Decoded block text is published to an optional handler and kept as
//! [`latest_metadata`](MetadataFramingReader::latest_metadata).

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

/// Response header carrying the metadata interval.
pub const ICY_METAINT_HEADER: &str = "icy-metaint";

/// Byte counters of the framing layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingState {
    /// Audio bytes between metadata blocks; `0` disables framing.
    pub meta_interval: u32,
    /// Audio bytes returned since the last block.
    pub bytes_since_last_meta: u32,
}

type MetadataHandler = Box<dyn FnMut(&str) + Send>;

/// Parse an `icy-metaint` header value.
///
/// Missing, empty or unparseable values mean no inline metadata.
pub fn parse_meta_interval(value: Option<&str>) -> u32 {
    match value.map(str::trim) {
        None | Some("") => 0,
        Some(text) => text.parse().unwrap_or_else(|_| {
            warn!(value = text, "Ignoring unreadable icy-metaint header");
            0
        }),
    }
}

/// Async reader that removes ICY metadata blocks from a stream body.
pub struct MetadataFramingReader<R> {
    inner: R,
    state: FramingState,
    handler: Option<MetadataHandler>,
    latest: Option<String>,
}

impl<R> MetadataFramingReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R, meta_interval: u32) -> Self {
        Self {
            inner,
            state: FramingState {
                meta_interval,
                bytes_since_last_meta: 0,
            },
            handler: None,
            latest: None,
        }
    }

    /// Call `handler` with the text of every metadata block.
    pub fn on_metadata<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Text of the most recent metadata block.
    pub fn latest_metadata(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    pub fn state(&self) -> FramingState {
        self.state
    }

    /// Read audio bytes into `buf`.
    ///
    /// A single call never returns bytes from both sides of a metadata block.
    /// Returns `Ok(0)` at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let interval = self.state.meta_interval;
        if interval == 0 {
            return self.inner.read(buf).await;
        }

        if self.state.bytes_since_last_meta >= interval {
            if !self.read_block().await? {
                return Ok(0);
            }
            self.state.bytes_since_last_meta = 0;
        }

        let remaining = (interval - self.state.bytes_since_last_meta) as usize;
        let want = buf.len().min(remaining);
        let n = self.inner.read(&mut buf[..want]).await?;
        self.state.bytes_since_last_meta += n as u32;
        Ok(n)
    }

    /// Consume one length byte and its block. Returns `false` at end of stream.
    async fn read_block(&mut self) -> io::Result<bool> {
        let mut length = [0u8; 1];
        if self.inner.read(&mut length).await? == 0 {
            return Ok(false);
        }

        let block_len = length[0] as usize * 16;
        if block_len == 0 {
            return Ok(true);
        }

        let mut block = vec![0u8; block_len];
        match self.inner.read_exact(&mut block).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(expected = block_len, "Stream ended inside a metadata block");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let text = String::from_utf8_lossy(&block);
        let text = text.trim_end_matches(['\0', ' ']);

        if !text.contains('=') {
            warn!(length = block_len, "Metadata block without key=value content");
            return Ok(true);
        }

        trace!(metadata = text, "Metadata block");
        if let Some(handler) = self.handler.as_mut() {
            handler(text);
        }
        self.latest = Some(text.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn block(text: &str) -> Vec<u8> {
        let blocks = text.len().div_ceil(16);
        let mut out = vec![blocks as u8];
        out.extend_from_slice(text.as_bytes());
        out.resize(1 + blocks * 16, 0);
        out
    }

    async fn read_all<R: AsyncRead + Unpin>(
        reader: &mut MetadataFramingReader<R>,
        chunk: usize,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_parse_meta_interval() {
        assert_eq!(parse_meta_interval(Some("16000")), 16000);
        assert_eq!(parse_meta_interval(Some(" 8192 ")), 8192);
        assert_eq!(parse_meta_interval(Some("abc")), 0);
        assert_eq!(parse_meta_interval(None), 0);
    }

    #[tokio::test]
    async fn test_single_block_scenario() {
        let mut stream = vec![1u8; 10];
        stream.extend(block("StreamTitle='X';"));
        stream.extend(vec![2u8; 10]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reader = MetadataFramingReader::new(stream.as_slice(), 10)
            .on_metadata(move |text| sink.lock().unwrap().push(text.to_string()));

        let mut buf = [0u8; 64];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 10);
        assert!(buf[..10].iter().all(|b| *b == 1));

        assert_eq!(reader.read(&mut buf).await.unwrap(), 10);
        assert!(buf[..10].iter().all(|b| *b == 2));

        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["StreamTitle='X';".to_string()]);
        assert_eq!(reader.latest_metadata(), Some("StreamTitle='X';"));
    }

    #[tokio::test]
    async fn test_round_trip_many_blocks() {
        let interval = 7u32;
        let audio: Vec<u8> = (0..100u8).collect();
        let titles = ["StreamTitle='a';", "StreamTitle='longer title here';"];

        let mut stream = Vec::new();
        let mut expected_meta = Vec::new();
        for (i, chunk) in audio.chunks(interval as usize).enumerate() {
            stream.extend_from_slice(chunk);
            if chunk.len() == interval as usize {
                if i % 3 == 2 {
                    stream.push(0);
                } else {
                    let title = titles[i % 2];
                    stream.extend(block(title));
                    expected_meta.push(title.to_string());
                }
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reader = MetadataFramingReader::new(stream.as_slice(), interval)
            .on_metadata(move |text| sink.lock().unwrap().push(text.to_string()));

        assert_eq!(read_all(&mut reader, 5).await, audio);
        assert_eq!(*seen.lock().unwrap(), expected_meta);
    }

    #[tokio::test]
    async fn test_zero_interval_passes_through() {
        let stream = b"StreamTitle='not metadata';".to_vec();
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let mut reader = MetadataFramingReader::new(stream.as_slice(), 0)
            .on_metadata(move |_| *flag.lock().unwrap() = true);

        assert_eq!(read_all(&mut reader, 4).await, stream);
        assert!(!*called.lock().unwrap());
        assert_eq!(reader.latest_metadata(), None);
    }

    #[tokio::test]
    async fn test_truncated_block_ends_stream() {
        let mut stream = vec![9u8; 4];
        stream.push(2); // announces 32 bytes
        stream.extend_from_slice(b"StreamTitle='cut");

        let mut reader = MetadataFramingReader::new(stream.as_slice(), 4);
        assert_eq!(read_all(&mut reader, 16).await, vec![9u8; 4]);
        assert_eq!(reader.latest_metadata(), None);
    }

    #[tokio::test]
    async fn test_block_without_pairs_is_skipped() {
        let mut stream = vec![3u8; 4];
        stream.extend(block("garbage"));
        stream.extend(vec![4u8; 2]);

        let mut reader = MetadataFramingReader::new(stream.as_slice(), 4);
        assert_eq!(read_all(&mut reader, 16).await, vec![3, 3, 3, 3, 4, 4]);
        assert_eq!(reader.latest_metadata(), None);
        assert_eq!(reader.state().bytes_since_last_meta, 2);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let failing = tokio_test_reader();
        let mut reader = MetadataFramingReader::new(failing, 4);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert!(reader.read(&mut buf).await.is_err());
    }

    /// Four audio bytes, then a reset connection.
    fn tokio_test_reader() -> impl AsyncRead + Unpin {
        use tokio::io::AsyncReadExt as _;
        let good: &'static [u8] = &[1, 2, 3, 4];
        good.chain(FailingReader)
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset",
            )))
        }
    }
}

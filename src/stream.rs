//! Drives an HTTP response body into a bounded queue as fixed-size chunks.

use std::fmt;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::buffer::BufferAggregator;
use crate::error::{Result, TransferError};
use crate::queue::BoundedQueue;

/// Pulls a readable body stream through a [`BufferAggregator`] into a
/// [`BoundedQueue`].
///
/// The reader suspends while the queue is full and resumes on its drain
/// signal. A mid-stream body error flushes the aggregator, enqueues the
/// error as the final item, and completes the queue so the consumer can
/// decide whether to reconnect. Dropping the returned future cancels the
/// read.
#[derive(Debug, Clone, Copy)]
pub struct StreamReader {
    part_size: usize,
}

impl StreamReader {
    /// Create a reader that emits chunks of `part_size` bytes.
    pub fn new(part_size: usize) -> Self {
        Self { part_size }
    }

    /// Consume `body` to completion, pushing chunks into `queue`.
    pub async fn drive<S, E>(&self, mut body: S, queue: &BoundedQueue<Result<Bytes>>)
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        let mut aggregator = BufferAggregator::new(self.part_size);
        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    for part in aggregator.push(chunk) {
                        if !queue.push(Ok(part)) {
                            queue.drained().await;
                        }
                    }
                }
                Some(Err(err)) => {
                    if let Some(tail) = aggregator.flush() {
                        queue.push(Ok(tail));
                    }
                    tracing::warn!(error = %err, "response body failed mid-stream");
                    queue.push(Err(TransferError::Stream(err.to_string())));
                    queue.complete();
                    return;
                }
                None => {
                    if let Some(tail) = aggregator.flush() {
                        queue.push(Ok(tail));
                    }
                    queue.complete();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use futures_util::stream;

    use super::*;

    type ChunkResult = std::result::Result<Bytes, io::Error>;

    async fn collect(queue: &BoundedQueue<Result<Bytes>>) -> (Vec<Bytes>, Option<TransferError>) {
        let mut chunks = Vec::new();
        let mut error = None;
        while let Some(item) = queue.next().await {
            match item {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => error = Some(err),
            }
        }
        (chunks, error)
    }

    #[tokio::test]
    async fn emits_fixed_chunks_and_completes() {
        let body = stream::iter(vec![
            ChunkResult::Ok(Bytes::from_static(b"abc")),
            ChunkResult::Ok(Bytes::from_static(b"defgh")),
            ChunkResult::Ok(Bytes::from_static(b"ij")),
        ]);
        let queue = BoundedQueue::new(16);
        StreamReader::new(4).drive(body, &queue).await;

        let (chunks, error) = collect(&queue).await;
        assert!(error.is_none());
        let joined: Vec<u8> = chunks.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"abcdefghij");
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(chunks[1].len(), 4);
        assert_eq!(chunks[2].len(), 2);
    }

    #[tokio::test]
    async fn error_flushes_tail_then_enqueues_sentinel() {
        let body = stream::iter(vec![
            ChunkResult::Ok(Bytes::from_static(b"abcde")),
            ChunkResult::Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let queue = BoundedQueue::new(16);
        StreamReader::new(4).drive(body, &queue).await;

        let (chunks, error) = collect(&queue).await;
        // 4 full bytes plus the flushed single-byte tail precede the error.
        let joined: Vec<u8> = chunks.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"abcde");
        assert!(matches!(error, Some(TransferError::Stream(_))));
    }

    #[tokio::test]
    async fn suspends_on_full_queue_until_drained() {
        let data = vec![ChunkResult::Ok(Bytes::from_static(&[9u8; 64]))];
        let queue = BoundedQueue::<Result<Bytes>>::new(2);
        let reader = StreamReader::new(8);

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut total = 0usize;
                while let Some(item) = queue.next().await {
                    total += item.unwrap().len();
                    tokio::task::yield_now().await;
                }
                total
            })
        };

        reader.drive(stream::iter(data), &queue).await;
        assert_eq!(consumer.await.unwrap(), 64);
    }

    #[tokio::test]
    async fn empty_body_completes_immediately() {
        let body = stream::iter(Vec::<ChunkResult>::new());
        let queue = BoundedQueue::new(4);
        StreamReader::new(8).drive(body, &queue).await;
        assert_eq!(queue.next().await.map(|r| r.is_ok()), None);
    }
}

//! Chunk-to-line framing over an input pipe.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::PipeError;
use crate::pipe::MsgPipe;

/// Splits a chunked text stream into logical lines.
///
/// Chunks may contain zero or more `\n`; partial lines are buffered until the
/// terminator arrives or the producer completes, at which point the trimmed
/// tail is emitted as a final line. Lazy and not restartable.
pub struct LineStream {
    source: Arc<MsgPipe<String>>,
    buffer: String,
    pending: VecDeque<String>,
    finished: bool,
}

impl LineStream {
    pub fn new(source: Arc<MsgPipe<String>>) -> Self {
        Self {
            source,
            buffer: String::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next logical line, or `None` once the producer has completed and the
    /// tail has been flushed. A producer error is surfaced once; the stream
    /// keeps going on the read after it.
    pub async fn next_line(&mut self) -> Option<Result<String, PipeError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }

            match self.source.read().await {
                Err(error) => return Some(Err(error)),
                Ok(message) if message.done => {
                    self.finished = true;
                    let tail = self.buffer.trim().to_string();
                    self.buffer.clear();
                    if !tail.is_empty() {
                        return Some(Ok(tail));
                    }
                    return None;
                }
                Ok(message) => {
                    if let Some(chunk) = message.value {
                        self.buffer.push_str(&chunk);
                        while let Some(index) = self.buffer.find('\n') {
                            let line: String = self.buffer.drain(..=index).collect();
                            self.pending.push_back(line.trim_end_matches('\n').to_string());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_lines(stream: &mut LineStream) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(item) = stream.next_line().await {
            if let Ok(line) = item {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn splits_single_chunk_into_lines() {
        let pipe = Arc::new(MsgPipe::new());
        pipe.enqueue("one\ntwo\nthree\n".to_string());
        pipe.complete();

        let mut stream = LineStream::new(pipe);
        assert_eq!(collect_lines(&mut stream).await, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn buffers_partial_lines_across_chunks() {
        let pipe = Arc::new(MsgPipe::new());
        pipe.enqueue("hel".to_string());
        pipe.enqueue("lo\nwor".to_string());
        pipe.enqueue("ld\n".to_string());
        pipe.complete();

        let mut stream = LineStream::new(pipe);
        assert_eq!(collect_lines(&mut stream).await, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn flushes_trimmed_tail_on_completion() {
        let pipe = Arc::new(MsgPipe::new());
        pipe.enqueue("first\n  tail without newline  ".to_string());
        pipe.complete();

        let mut stream = LineStream::new(pipe);
        assert_eq!(
            collect_lines(&mut stream).await,
            vec!["first", "tail without newline"]
        );
    }

    #[tokio::test]
    async fn whitespace_only_tail_is_not_emitted() {
        let pipe = Arc::new(MsgPipe::new());
        pipe.enqueue("line\n   ".to_string());
        pipe.complete();

        let mut stream = LineStream::new(pipe);
        assert_eq!(collect_lines(&mut stream).await, vec!["line"]);
    }

    #[tokio::test]
    async fn producer_error_is_surfaced_once_then_stream_continues() {
        let pipe = Arc::new(MsgPipe::new());
        pipe.enqueue("before\n".to_string());
        let mut stream = LineStream::new(Arc::clone(&pipe));

        assert_eq!(
            stream.next_line().await.expect("line").expect("ok"),
            "before"
        );

        pipe.error("upstream failure");
        let error = stream
            .next_line()
            .await
            .expect("item")
            .expect_err("expected error");
        assert_eq!(error.message, "upstream failure");

        pipe.enqueue("after\n".to_string());
        pipe.complete();
        assert_eq!(stream.next_line().await.expect("line").expect("ok"), "after");
        assert!(stream.next_line().await.is_none());
    }

    #[tokio::test]
    async fn concat_of_chunks_round_trips_to_lines() {
        // LineStream ∘ concat(chunks) == lines(concat(chunks))
        let chunks = ["a\nbb", "\nccc\ndd", "dd\n"];
        let joined: String = chunks.concat();
        let expected: Vec<&str> = joined.split_terminator('\n').collect();

        let pipe = Arc::new(MsgPipe::new());
        for chunk in chunks {
            pipe.enqueue(chunk.to_string());
        }
        pipe.complete();

        let mut stream = LineStream::new(pipe);
        assert_eq!(collect_lines(&mut stream).await, expected);
    }
}

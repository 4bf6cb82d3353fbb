// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Incremental byte sources.
//!
//! The pipeline pulls raw chunks through [`ChunkSource`] and never looks at
//! where they come from: a spawned benchmark ([`crate::BenchmarkProcess`])
//! or any async reader such as stdin ([`ReaderSource`]).

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProcessError;

/// Pull-based byte source.
#[async_trait]
pub trait ChunkSource: Send {
    /// Prepare the source (spawn the process). Called once, before any pull.
    async fn start(&mut self) -> Result<(), ProcessError>;

    /// Next chunk in stream order, or `None` at end of stream.
    ///
    /// Must be cancel safe: if the returned future is dropped before it
    /// completes, no bytes are lost.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProcessError>;

    /// Stop producing (cancellation). The source may still be drained
    /// afterwards but is not required to yield anything.
    async fn terminate(&mut self) -> Result<(), ProcessError>;

    /// Release the source after end of stream or termination and report
    /// how it ended.
    async fn finish(&mut self) -> Result<(), ProcessError>;

    /// Short human-readable label for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    async fn start(&mut self) -> Result<(), ProcessError> {
        (**self).start().await
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProcessError> {
        (**self).next_chunk().await
    }

    async fn terminate(&mut self) -> Result<(), ProcessError> {
        (**self).terminate().await
    }

    async fn finish(&mut self) -> Result<(), ProcessError> {
        (**self).finish().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Wraps any async reader as a chunk source.
pub struct ReaderSource<R> {
    label: String,
    reader: R,
    buf: Vec<u8>,
    stopped: bool,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(label: impl Into<String>, reader: R, chunk_bytes: usize) -> Self {
        Self {
            label: label.into(),
            reader,
            buf: vec![0; chunk_bytes.max(1)],
            stopped: false,
        }
    }
}

impl ReaderSource<tokio::io::Stdin> {
    pub fn stdin(chunk_bytes: usize) -> Self {
        Self::new("stdin", tokio::io::stdin(), chunk_bytes)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderSource<R> {
    async fn start(&mut self) -> Result<(), ProcessError> {
        tracing::debug!(source = %self.label, "Reading from stream");
        Ok(())
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProcessError> {
        if self.stopped {
            return Ok(None);
        }
        let n = self.reader.read(&mut self.buf).await.map_err(ProcessError::Read)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    async fn terminate(&mut self) -> Result<(), ProcessError> {
        self.stopped = true;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), ProcessError> {
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

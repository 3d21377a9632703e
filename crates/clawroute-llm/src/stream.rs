//! Streaming completion handle
//!
//! A [`CompletionStream`] is a finite, single-consumption sequence of text
//! chunks. The producer side ([`StreamSender`]) runs in its own task and stops
//! as soon as the consumer cancels or drops the stream.
//!
//! Finish hooks run exactly once: when the producer ends, when it reports an
//! error, when the consumer calls [`CompletionStream::cancel`], or when the
//! stream is dropped unfinished, whichever comes first.

use crate::completion::TokenUsage;
use crate::error::{Error, Result};
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default channel capacity between producer and consumer
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Hook invoked once when a stream finishes
pub type StreamFinishHook = Box<dyn FnOnce(&StreamSummary) + Send>;

/// Accounting snapshot produced when a stream finishes
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// Model that produced the stream
    pub model: String,
    /// Number of text chunks delivered to the consumer
    pub chunks: usize,
    /// Number of characters delivered to the consumer
    pub chars: usize,
    /// Usage reported by the service, if any
    pub usage: Option<TokenUsage>,
    /// Time from stream creation to finish
    pub elapsed: Duration,
    /// True when the producer ran to completion
    pub completed: bool,
    /// Error reported by the producer, if any
    pub error: Option<String>,
}

enum StreamEvent {
    Delta(String),
    Usage(TokenUsage),
}

/// Producer half of a completion stream
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<Result<StreamEvent>>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Send a text chunk. Returns `false` once the consumer is gone.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Ok(StreamEvent::Delta(text.into()))).await
    }

    /// Report final usage counts
    pub async fn send_usage(&self, usage: TokenUsage) -> bool {
        self.send(Ok(StreamEvent::Usage(usage))).await
    }

    /// Report a terminal error
    pub async fn send_error(&self, error: Error) -> bool {
        self.send(Err(error)).await
    }

    /// Whether the consumer cancelled the stream
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer cancels or drops the stream
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    async fn send(&self, event: Result<StreamEvent>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            res = self.tx.send(event) => res.is_ok(),
            () = self.cancel.cancelled() => false,
        }
    }
}

/// Consumer half of a completion stream
pub struct CompletionStream {
    model: String,
    rx: mpsc::Receiver<Result<StreamEvent>>,
    cancel: CancellationToken,
    started: Instant,
    chunks: usize,
    chars: usize,
    usage: Option<TokenUsage>,
    finished: bool,
    hooks: Vec<StreamFinishHook>,
}

impl fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStream")
            .field("model", &self.model)
            .field("chunks", &self.chunks)
            .field("chars", &self.chars)
            .field("finished", &self.finished)
            .finish()
    }
}

impl CompletionStream {
    /// Create a connected producer/consumer pair
    #[must_use]
    pub fn channel(model: impl Into<String>, buffer: usize) -> (StreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let sender = StreamSender {
            tx,
            cancel: cancel.clone(),
        };
        let stream = Self {
            model: model.into(),
            rx,
            cancel,
            started: Instant::now(),
            chunks: 0,
            chars: 0,
            usage: None,
            finished: false,
            hooks: Vec::new(),
        };
        (sender, stream)
    }

    /// Build an already-complete stream from fixed chunks
    #[must_use]
    pub fn from_chunks(model: impl Into<String>, chunks: Vec<String>, usage: Option<TokenUsage>) -> Self {
        let (sender, stream) = Self::channel(model, chunks.len() + 1);
        for chunk in chunks {
            let _ = sender.tx.try_send(Ok(StreamEvent::Delta(chunk)));
        }
        if let Some(usage) = usage {
            let _ = sender.tx.try_send(Ok(StreamEvent::Usage(usage)));
        }
        stream
    }

    /// Build a stream that delivers `chunks` and then fails with `error`
    #[must_use]
    pub fn from_chunks_then_error(model: impl Into<String>, chunks: Vec<String>, error: Error) -> Self {
        let (sender, stream) = Self::channel(model, chunks.len() + 1);
        for chunk in chunks {
            let _ = sender.tx.try_send(Ok(StreamEvent::Delta(chunk)));
        }
        let _ = sender.tx.try_send(Err(error));
        stream
    }

    /// Model that produced this stream
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the stream has finished (ended, failed or cancelled)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Register a hook to run once the stream finishes
    ///
    /// If the stream already finished the hook is dropped without running.
    pub fn add_finish_hook(&mut self, hook: StreamFinishHook) {
        if !self.finished {
            self.hooks.push(hook);
        }
    }

    /// Builder form of [`add_finish_hook`](Self::add_finish_hook)
    #[must_use]
    pub fn on_finish(mut self, hook: impl FnOnce(&StreamSummary) + Send + 'static) -> Self {
        self.add_finish_hook(Box::new(hook));
        self
    }

    /// Cancel the producer and finalize accounting
    pub fn cancel(&mut self) {
        if !self.finished {
            self.cancel.cancel();
            self.finish(false, None);
        }
    }

    /// Drain the stream into a single string
    pub async fn collect_text(mut self) -> Result<String> {
        use futures::StreamExt;

        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    fn finish(&mut self, completed: bool, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.rx.close();

        let summary = StreamSummary {
            model: self.model.clone(),
            chunks: self.chunks,
            chars: self.chars,
            usage: self.usage,
            elapsed: self.started.elapsed(),
            completed,
            error,
        };
        for hook in self.hooks.drain(..) {
            hook(&summary);
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(StreamEvent::Delta(text)))) => {
                    this.chunks += 1;
                    this.chars += text.chars().count();
                    return Poll::Ready(Some(Ok(text)));
                }
                Poll::Ready(Some(Ok(StreamEvent::Usage(usage)))) => {
                    this.usage = Some(usage);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.cancel.cancel();
                    this.finish(false, Some(e.to_string()));
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finish(true, None);
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
            self.finish(false, None);
        }
    }
}

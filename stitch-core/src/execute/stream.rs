//! Stream Consolidator: fan-in merge of a dynamic set of lazy sequences into one fair stream.
//!
//! Grounded in the join-set-per-dispatch pattern used by [`super::Composer::compose`] and
//! `apollo-router`'s own incremental-delivery plumbing: one `tokio::sync::mpsc` channel shared by
//! every source, each source driven by its own spawned forwarding task, with sources addable at
//! runtime by spawning another forwarder against the same sender. The merged stream's termination
//! rides on the channel itself: `UnboundedReceiverStream` ends once every clone of the sender (one
//! per forwarder, plus the consolidator's own) has dropped, rather than a hand-tracked outstanding
//! count.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A per-item transform applied as values pass through the consolidator: transform, drop (return
/// `None`), or forward unchanged.
pub trait Processor<T, U>: Send + Sync {
    fn process(&self, item: T) -> Option<U>;
}

impl<T, U, F> Processor<T, U> for F
where
    F: Fn(T) -> Option<U> + Send + Sync,
{
    fn process(&self, item: T) -> Option<U> {
        self(item)
    }
}

struct Identity;
impl<T: Send> Processor<T, T> for Identity {
    fn process(&self, item: T) -> Option<T> {
        Some(item)
    }
}

/// Fans in any number of `Stream<Item = T>` sources into one `Stream<Item = U>`.
///
/// Sources may be added any time before [`StreamConsolidator::close`]. Dropping the returned
/// stream cancels every outstanding forwarder task, which propagates to each source's own `Drop`.
pub struct StreamConsolidator<T, U> {
    tx: mpsc::UnboundedSender<T>,
    rx: mpsc::UnboundedReceiver<T>,
    processor: Arc<dyn Processor<T, U>>,
    closed: bool,
}

impl<T: Send + 'static> StreamConsolidator<T, T> {
    pub fn new() -> Self {
        Self::with_processor(Identity)
    }
}

impl<T: Send + 'static, U: Send + 'static> StreamConsolidator<T, U> {
    pub fn with_processor(processor: impl Processor<T, U> + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            processor: Arc::new(processor),
            closed: false,
        }
    }

    /// Add a source. Its items are forwarded into the shared channel by a dedicated task until
    /// the source is exhausted or this consolidator (and every clone of its sender) is dropped.
    pub fn add_source(&self, mut source: Pin<Box<dyn Stream<Item = T> + Send>>) {
        debug_assert!(!self.closed, "add_source called after close()");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
    }

    /// No further sources will be added. The merged stream terminates once every currently-held
    /// source has been exhausted. This implementation's termination is the stream's natural end;
    /// there is no separate out-of-band termination payload to synthesize.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// The merged, processed stream.
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = U> + Send>>
    where
        T: 'static,
    {
        let StreamConsolidator { tx, rx, processor, .. } = self;
        drop(tx);
        Box::pin(
            UnboundedReceiverStream::new(rx)
                .filter_map(move |item| futures::future::ready(processor.process(item))),
        )
    }
}

impl<T: Send + 'static> Default for StreamConsolidator<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn merges_two_sources_preserving_per_source_order() {
        let consolidator = StreamConsolidator::<i32, i32>::new();
        consolidator.add_source(Box::pin(stream::iter(vec![1, 2, 3])));
        consolidator.add_source(Box::pin(stream::iter(vec![10, 20, 30])));

        let mut merged = consolidator.into_stream();
        let mut seen = Vec::new();
        while let Some(item) = merged.next().await {
            seen.push(item);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 10, 20, 30]);
    }

    #[tokio::test]
    async fn processor_can_filter_items() {
        let consolidator = StreamConsolidator::with_processor(|item: i32| if item % 2 == 0 { Some(item) } else { None });
        consolidator.add_source(Box::pin(stream::iter(vec![1, 2, 3, 4, 5])));
        let mut merged = consolidator.into_stream();
        let mut seen = Vec::new();
        while let Some(item) = merged.next().await {
            seen.push(item);
        }
        assert_eq!(seen, vec![2, 4]);
    }
}

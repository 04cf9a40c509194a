// ── Reactive state stream ──
//
// Stream adapter over the engine's `watch` channel, for consumers that
// prefer `StreamExt` combinators over `changed()` loops.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::EngineState;

/// `Stream` of [`EngineState`] snapshots.
///
/// Yields the current state immediately, then a new snapshot after every
/// engine transition. Intermediate states may be skipped if the consumer
/// lags; the latest state is never lost.
pub struct StateStream {
    inner: WatchStream<EngineState>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<EngineState>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl Stream for StateStream {
    type Item = EngineState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream is Unpin; EngineState is always Unpin.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

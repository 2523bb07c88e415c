//! Commit deadlines and ordered acknowledgment of write streams.

use couchsync_types::{RecordAck, WriteRecord};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Counts for one finished write stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub received: usize,
    pub written: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Written,
    Failed,
    TimedOut,
}

impl WriteSummary {
    fn record(&mut self, settled: Settled) {
        self.received += 1;
        match settled {
            Settled::Written => self.written += 1,
            Settled::Failed => self.failed += 1,
            Settled::TimedOut => self.timed_out += 1,
        }
    }
}

/// Bounds every write by a commit deadline and acknowledges records in
/// input order.
///
/// A write that misses the deadline is dropped, which cancels its
/// in-flight store request, and acknowledged with `"timed out"`.
#[derive(Debug, Clone, Copy)]
pub struct SlaEnforcer {
    deadline: Option<Duration>,
    max_in_flight: usize,
}

impl SlaEnforcer {
    /// `deadline` of `None` waits indefinitely. `max_in_flight` is clamped
    /// to at least one.
    pub fn new(deadline: Option<Duration>, max_in_flight: usize) -> Self {
        Self {
            deadline,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Runs one write under the deadline and turns its result into an ack.
    pub async fn commit<T, Fut>(&self, correlation_id: String, write: Fut) -> RecordAck
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        self.settle(correlation_id, write).await.0
    }

    async fn settle<T, Fut>(&self, correlation_id: String, write: Fut) -> (RecordAck, Settled)
    where
        Fut: Future<Output = EngineResult<T>>,
    {
        let result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, write).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout),
            },
            None => write.await,
        };

        match result {
            Ok(_) => (RecordAck::success(correlation_id), Settled::Written),
            Err(EngineError::Timeout) => {
                warn!(correlation_id = %correlation_id, "Write missed its commit deadline");
                (
                    RecordAck::failure(correlation_id, EngineError::Timeout.to_string()),
                    Settled::TimedOut,
                )
            }
            Err(e) => {
                warn!(correlation_id = %correlation_id, "Write failed: {}", e);
                (RecordAck::failure(correlation_id, e.to_string()), Settled::Failed)
            }
        }
    }

    /// Writes every record with `write` and sends one ack per record to
    /// `acks`, in input order.
    ///
    /// Up to `max_in_flight` writes run at once. Fails only if the ack
    /// receiver goes away.
    pub async fn run<S, F, Fut, T>(
        &self,
        records: S,
        write: F,
        acks: &mpsc::Sender<RecordAck>,
    ) -> EngineResult<WriteSummary>
    where
        S: Stream<Item = WriteRecord>,
        F: Fn(WriteRecord) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let settled = records
            .map(|record| {
                debug!(record = %record.record_id, "Got record");
                let correlation_id = record.correlation_id.clone();
                self.settle(correlation_id, write(record))
            })
            .buffered(self.max_in_flight);
        let mut settled = std::pin::pin!(settled);

        let mut summary = WriteSummary::default();
        while let Some((ack, outcome)) = settled.next().await {
            summary.record(outcome);
            acks.send(ack).await.map_err(|_| EngineError::ChannelClosed)?;
        }

        info!(
            "Wrote {} of {} records ({} failed, {} timed out)",
            summary.written, summary.received, summary.failed, summary.timed_out
        );
        Ok(summary)
    }
}

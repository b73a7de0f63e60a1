use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{merge_envelopes, VulnerabilityChecker};
use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::model::{QueryEnvelope, ReportEntry};

/// How batches are sent to the vulnerability API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// One batch at a time; the merged list follows batch order.
    Serial,
    /// Batches run concurrently, at most `max_in_flight` at once. Each
    /// batch's findings stay together and in order, but batches are merged
    /// in completion order, so callers needing a stable order should use
    /// [`QueryMode::Serial`].
    #[default]
    Parallel,
}

/// Dispatches batches to a [`VulnerabilityChecker`] and merges the outcomes.
pub struct BatchDispatcher {
    checker: Arc<dyn VulnerabilityChecker>,
    max_in_flight: usize,
}

impl BatchDispatcher {
    /// `max_in_flight` below one is treated as one.
    pub fn new(checker: Arc<dyn VulnerabilityChecker>, max_in_flight: usize) -> Self {
        Self {
            checker,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub async fn dispatch(
        &self,
        batches: Vec<Batch>,
        mode: QueryMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReportEntry>> {
        match mode {
            QueryMode::Serial => self.query_serial(&batches, cancel).await,
            QueryMode::Parallel => self.query_parallel(batches, cancel).await,
        }
    }

    pub async fn query_serial(
        &self,
        batches: &[Batch],
        cancel: &CancellationToken,
    ) -> Result<Vec<ReportEntry>> {
        let mut envelopes = Vec::with_capacity(batches.len());
        for batch in batches {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                envelope = self.checker.query_batch(batch) => envelope,
            };
            envelopes.push(envelope);
        }
        Ok(merge_envelopes(envelopes))
    }

    pub async fn query_parallel(
        &self,
        batches: Vec<Batch>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReportEntry>> {
        let total = batches.len();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut join_set = JoinSet::new();

        for batch in batches {
            let checker = Arc::clone(&self.checker);
            let permits = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return QueryEnvelope::transport("worker pool closed");
                };
                checker.query_batch(&batch).await
            });
        }
        debug!(
            checker = self.checker.name(),
            batches = total,
            max_in_flight = self.max_in_flight,
            "dispatched batches"
        );

        let mut envelopes = Vec::with_capacity(total);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    return Err(Error::Cancelled);
                }
                next = join_set.join_next() => match next {
                    Some(Ok(envelope)) => envelopes.push(envelope),
                    // A panicked task still owes its batch one entry.
                    Some(Err(e)) => envelopes.push(QueryEnvelope::transport(e)),
                    None => break,
                },
            }
        }
        Ok(merge_envelopes(envelopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::partition;
    use crate::model::{Finding, PackageCoordinate};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes every coordinate back as a finding; fails batches listed in `fail`.
    struct EchoChecker {
        fail: Vec<usize>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EchoChecker {
        fn new(fail: Vec<usize>, delay: Duration) -> Self {
            Self {
                fail,
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VulnerabilityChecker for EchoChecker {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn query_batch(&self, batch: &Batch) -> QueryEnvelope {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&batch.index()) {
                return QueryEnvelope::status(503);
            }
            QueryEnvelope::Findings(
                batch
                    .coordinates()
                    .iter()
                    .map(|c| Finding {
                        coordinates: c.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            )
        }
    }

    fn batches(n: usize) -> Vec<Batch> {
        let coords = (0..n)
            .map(|i| PackageCoordinate::maven("org.example", format!("a{}", i), "1.0"))
            .collect();
        partition(coords, 128)
    }

    fn coordinates_of(entries: &[ReportEntry]) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| match e {
                ReportEntry::Finding(f) => Some(f.coordinates.clone()),
                ReportEntry::Error(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_serial_keeps_order_and_isolates_failures() {
        let checker = Arc::new(EchoChecker::new(vec![1], Duration::ZERO));
        let dispatcher = BatchDispatcher::new(checker, 4);

        let entries = dispatcher
            .dispatch(batches(300), QueryMode::Serial, &CancellationToken::new())
            .await
            .unwrap();

        // 128 + 1 error marker + 44
        assert_eq!(entries.len(), 173);
        assert!(matches!(&entries[128], ReportEntry::Error(e) if e.http_status == Some(503)));
        let coords = coordinates_of(&entries);
        assert_eq!(coords[0], "pkg:maven/org.example/a0@1.0");
        assert_eq!(coords[128], "pkg:maven/org.example/a256@1.0");
    }

    #[tokio::test]
    async fn test_parallel_matches_serial_as_a_multiset() {
        let dispatcher = BatchDispatcher::new(Arc::new(EchoChecker::new(vec![0], Duration::ZERO)), 3);
        let cancel = CancellationToken::new();

        let serial = dispatcher.query_serial(&batches(500), &cancel).await.unwrap();
        let parallel = dispatcher.query_parallel(batches(500), &cancel).await.unwrap();

        assert_eq!(serial.len(), parallel.len());
        let mut a = coordinates_of(&serial);
        let mut b = coordinates_of(&parallel);
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(parallel.iter().filter(|e| matches!(e, ReportEntry::Error(_))).count(), 1);
    }

    #[tokio::test]
    async fn test_parallel_keeps_order_within_batch() {
        let dispatcher = BatchDispatcher::new(Arc::new(EchoChecker::new(vec![], Duration::ZERO)), 8);
        let entries = dispatcher
            .query_parallel(batches(200), &CancellationToken::new())
            .await
            .unwrap();
        let coords = coordinates_of(&entries);
        let start = coords
            .iter()
            .position(|c| c == "pkg:maven/org.example/a128@1.0")
            .unwrap();
        for (offset, coord) in coords[start..start + 72].iter().enumerate() {
            assert_eq!(coord, &format!("pkg:maven/org.example/a{}@1.0", 128 + offset));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_respects_in_flight_limit() {
        let checker = Arc::new(EchoChecker::new(vec![], Duration::from_millis(50)));
        let dispatcher = BatchDispatcher::new(checker.clone(), 2);

        let entries = dispatcher
            .query_parallel(batches(128 * 6), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(entries.len(), 128 * 6);
        assert_eq!(checker.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_parallel_dispatch() {
        let checker = Arc::new(EchoChecker::new(vec![], Duration::from_secs(3600)));
        let dispatcher = BatchDispatcher::new(checker, 2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = dispatcher.query_parallel(batches(400), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_serial_dispatch() {
        let dispatcher = BatchDispatcher::new(Arc::new(EchoChecker::new(vec![], Duration::ZERO)), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = dispatcher.query_serial(&batches(10), &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_no_batches() {
        let dispatcher = BatchDispatcher::new(Arc::new(EchoChecker::new(vec![], Duration::ZERO)), 0);
        assert_eq!(dispatcher.max_in_flight(), 1);
        let entries = dispatcher
            .dispatch(Vec::new(), QueryMode::Parallel, &CancellationToken::new())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}

//! Scheduler module: one repeating probe loop per target.

use crate::probe::Prober;
use crate::registry::{Registry, Target, TargetId};
use crate::sink::{SinkError, SinkSender};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Upper bound of the random delay before a target's first tick.
const START_JITTER_MS: u64 = 100;

/// Running loops and the sink they write to, guarded by one lock so that
/// registration and shutdown cannot interleave.
struct TaskSet {
    sink: Option<SinkSender>,
    handles: HashMap<TargetId, JoinHandle<()>>,
    stopped: bool,
}

/// The scheduler that owns every per-target probe task.
pub struct Scheduler {
    prober: Arc<dyn Prober>,
    stop_tx: broadcast::Sender<()>,
    tasks: Mutex<TaskSet>,
}

impl Scheduler {
    /// Create a new scheduler feeding results into `sink`.
    pub fn new(prober: Arc<dyn Prober>, sink: SinkSender) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            prober,
            stop_tx,
            tasks: Mutex::new(TaskSet {
                sink: Some(sink),
                handles: HashMap::new(),
                stopped: false,
            }),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, TaskSet> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start monitoring every registered target. Must run inside a tokio runtime.
    pub fn start(&self, registry: &Registry) {
        let targets = registry.list();
        tracing::info!("Starting scheduler with {} targets", targets.len());

        for target in targets {
            self.add_target(target);
        }
    }

    /// Add a target to be monitored. Already running targets are ignored.
    pub fn add_target(&self, target: Target) {
        let mut tasks = self.tasks();
        if tasks.stopped {
            tracing::warn!("Scheduler: ignoring {} after shutdown", target.url);
            return;
        }
        if tasks.handles.contains_key(&target.id) {
            return; // Already running
        }
        let sink = match tasks.sink.as_ref() {
            Some(sink) => sink.clone(),
            None => return,
        };

        tracing::info!("Monitoring: {} every {:?}", target.url, target.interval);

        // Subscribed under the lock, so the loop always sees a later stop.
        let target_id = target.id;
        let handle = tokio::spawn(run_probe_loop(
            target,
            self.prober.clone(),
            sink,
            self.stop_tx.subscribe(),
        ));
        tasks.handles.insert(target_id, handle);
    }

    /// Number of probe loops started and not yet shut down.
    pub fn running(&self) -> usize {
        self.tasks().handles.len()
    }

    /// Cancel every probe loop, wait for them to exit, then close the sink.
    pub async fn shutdown(&self) {
        let (handles, sink) = {
            let mut tasks = self.tasks();
            tasks.stopped = true;
            let _ = self.stop_tx.send(());
            let handles: Vec<(TargetId, JoinHandle<()>)> = tasks.handles.drain().collect();
            (handles, tasks.sink.take())
        };
        drop(sink);

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("Probe loop for target {} ended abnormally: {}", id, e);
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

/// Run the probe loop for a single target.
///
/// Probes are awaited inline, so one target never has two probes in
/// flight. The stop signal cancels both the wait and an in-flight probe.
async fn run_probe_loop(
    target: Target,
    prober: Arc<dyn Prober>,
    sink: SinkSender,
    mut stop_rx: broadcast::Receiver<()>,
) {
    // Spread targets registered together
    let jitter = Duration::from_millis(rand::random::<u64>() % START_JITTER_MS);
    tokio::select! {
        _ = stop_rx.recv() => return,
        _ = tokio::time::sleep(jitter) => {}
    }

    let mut interval = tokio::time::interval(target.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tracing::trace!("Target {} scheduled", target.id);
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {}
        }

        tracing::debug!("Probing {}", target.url);
        // Finished work wins over a simultaneous stop
        let result = tokio::select! {
            biased;
            result = prober.probe(&target) => result,
            _ = stop_rx.recv() => break,
        };

        let sent = tokio::select! {
            biased;
            sent = sink.send(result) => sent,
            _ = stop_rx.recv() => break,
        };

        match sent {
            Ok(()) | Err(SinkError::Full(_)) => {}
            Err(SinkError::Closed) => {
                tracing::warn!("Result sink closed, stopping probes for {}", target.url);
                break;
            }
        }
    }

    tracing::debug!("Probe loop for {} stopped", target.url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeOutcome, ProbeResult};
    use crate::sink;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::Instant;

    /// Fake prober: records probe spans and sleeps for `delay`.
    /// Targets whose url contains "hang" never finish.
    struct FakeProber {
        delay: Duration,
        spans: Mutex<Vec<(TargetId, Instant, Instant)>>,
    }

    impl FakeProber {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                spans: Mutex::new(Vec::new()),
            })
        }

        fn spans_for(&self, id: TargetId) -> Vec<(Instant, Instant)> {
            self.spans
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| *t == id)
                .map(|(_, s, e)| (*s, *e))
                .collect()
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, target: &Target) -> ProbeResult {
            if target.url.contains("hang") {
                std::future::pending::<()>().await;
            }

            let start = Instant::now();
            tokio::time::sleep(self.delay).await;
            let end = Instant::now();
            self.spans.lock().unwrap().push((target.id, start, end));

            ProbeResult {
                target_id: target.id,
                url: target.url.clone(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                response_time: end - start,
                status_code: 200,
                message: "website is up!".to_string(),
                tls_valid: true,
                outcome: ProbeOutcome::Ok,
                cert_warning: None,
            }
        }
    }

    fn registry_with(urls: &[(&str, u64)]) -> Registry {
        let registry = Registry::new();
        for (url, millis) in urls {
            registry
                .register(url, Duration::from_millis(*millis))
                .unwrap();
        }
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_never_overlap_for_one_target() {
        let prober = FakeProber::new(Duration::from_millis(300));
        let (tx, mut stream) = sink::channel(100, Duration::from_secs(1));
        let registry = registry_with(&[("slow.example.com", 100)]);

        let scheduler = Scheduler::new(prober.clone(), tx);
        scheduler.start(&registry);

        tokio::time::sleep(Duration::from_secs(3)).await;
        scheduler.shutdown().await;

        let spans = prober.spans_for(1);
        assert!(spans.len() >= 5, "only {} probes ran", spans.len());
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1, "probe started before previous finished");
        }

        let mut delivered = 0;
        while stream.next().await.is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, spans.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_target_does_not_stall_others() {
        let prober = FakeProber::new(Duration::from_millis(10));
        let (tx, mut stream) = sink::channel(100, Duration::from_secs(1));
        let registry = registry_with(&[("hang.example.com", 100), ("fast.example.com", 100)]);

        let scheduler = Scheduler::new(prober.clone(), tx);
        scheduler.start(&registry);
        assert_eq!(scheduler.running(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;

        // Shutdown must cancel the hanging probe rather than wait for it.
        scheduler.shutdown().await;
        assert_eq!(scheduler.running(), 0);

        let mut fast = 0;
        while let Some(result) = stream.next().await {
            assert_eq!(result.target_id, 2);
            fast += 1;
        }
        assert!(fast >= 8, "fast target only reported {} times", fast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_target_is_idempotent_and_refused_after_shutdown() {
        let prober = FakeProber::new(Duration::from_millis(10));
        let (tx, _stream) = sink::channel(100, Duration::from_secs(1));
        let registry = registry_with(&[("a.example.com", 1000)]);
        let target = registry.list().remove(0);

        let scheduler = Scheduler::new(prober, tx);
        scheduler.add_target(target.clone());
        scheduler.add_target(target.clone());
        assert_eq!(scheduler.running(), 1);

        scheduler.shutdown().await;
        scheduler.add_target(target);
        assert_eq!(scheduler.running(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_racing_shutdown_leaves_no_loop_behind() {
        for _ in 0..20 {
            let prober = FakeProber::new(Duration::from_millis(1));
            let (tx, mut stream) = sink::channel(1000, Duration::from_millis(100));
            let scheduler = Arc::new(Scheduler::new(prober, tx));

            let adder = {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    for id in 1..=200 {
                        scheduler.add_target(Target {
                            id,
                            url: format!("https://site{}.example.com", id),
                            interval: Duration::from_millis(5),
                        });
                        tokio::task::yield_now().await;
                    }
                })
            };

            tokio::task::yield_now().await;
            scheduler.shutdown().await;
            adder.await.unwrap();
            assert_eq!(scheduler.running(), 0);

            // Every sender is gone, so the stream must end.
            let drained = tokio::time::timeout(Duration::from_secs(5), async {
                while stream.next().await.is_some() {}
            })
            .await;
            assert!(drained.is_ok(), "a loop outlived shutdown");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_consumer_is_gone() {
        let prober = FakeProber::new(Duration::from_millis(10));
        let (tx, stream) = sink::channel(100, Duration::from_secs(1));
        drop(stream);
        let registry = registry_with(&[("a.example.com", 100)]);

        let scheduler = Scheduler::new(prober.clone(), tx);
        scheduler.start(&registry);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(prober.spans_for(1).len(), 1);
        scheduler.shutdown().await;
    }
}

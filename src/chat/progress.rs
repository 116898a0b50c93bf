//! Progress notifier
//!
//! Reveals stage labels for one pending exchange on a timer. Each reveal is
//! tagged with the exchange it belongs to; the receiver decides whether it
//! still applies. `cancel` stops every reveal that has not fired yet.

use crate::integration::ClientConfig;
use crate::messages::ExchangeId;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const REPORTED_STAGE_SPACING: Duration = Duration::from_millis(1000);

/// Ordered stage labels and when each becomes visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stages: Vec<String>,
    pub first_delay: Duration,
    pub spacing: Duration,
}

impl StagePlan {
    pub fn new(stages: Vec<String>, first_delay: Duration, spacing: Duration) -> Self {
        Self {
            stages,
            first_delay,
            spacing,
        }
    }

    /// Stages reported by the service, used verbatim from time zero at
    /// their own spacing or `REPORTED_STAGE_SPACING`
    pub fn reported(stages: Vec<String>, spacing: Option<Duration>) -> Self {
        Self::new(stages, Duration::ZERO, spacing.unwrap_or(REPORTED_STAGE_SPACING))
    }

    /// Built-in generic stages
    pub fn fallback(config: &ClientConfig) -> Self {
        Self::new(
            config.fallback_stages.clone(),
            config.fallback_first_delay,
            config.fallback_stage_spacing,
        )
    }

    /// Delay from start until stage `index` is revealed
    pub fn offset(&self, index: usize) -> Duration {
        self.first_delay + self.spacing * index as u32
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReveal {
    pub exchange_id: ExchangeId,
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct ProgressNotifier {
    task: Option<JoinHandle<()>>,
    exchange_id: Option<ExchangeId>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the plan for `exchange_id`, replacing any earlier run.
    ///
    /// `deliver` is called once per stage in order; returning `false` stops
    /// the run (the receiver is gone).
    pub fn start<F>(&mut self, exchange_id: ExchangeId, plan: StagePlan, deliver: F)
    where
        F: Fn(StageReveal) -> bool + Send + 'static,
    {
        self.cancel();

        debug!("Scheduling {} stages for {}", plan.len(), exchange_id);
        let started = Instant::now();
        let task = tokio::spawn(async move {
            let offsets: Vec<Duration> = (0..plan.len()).map(|i| plan.offset(i)).collect();
            for (index, (label, offset)) in plan.stages.into_iter().zip(offsets).enumerate() {
                tokio::time::sleep_until(started + offset).await;
                let reveal = StageReveal {
                    exchange_id,
                    index,
                    label,
                };
                if !deliver(reveal) {
                    break;
                }
            }
        });

        self.task = Some(task);
        self.exchange_id = Some(exchange_id);
    }

    /// Stop all reveals that have not fired yet
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Some(id) = self.exchange_id.take() {
                debug!("Cancelled stage reveals for {}", id);
            }
        }
        self.exchange_id = None;
    }

    /// Whether reveals may still fire
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Exchange the current run belongs to
    pub fn exchange_id(&self) -> Option<ExchangeId> {
        self.exchange_id
    }
}

impl Drop for ProgressNotifier {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use uuid::Uuid;

    fn drain(rx: &mut UnboundedReceiver<StageReveal>) -> Vec<String> {
        let mut labels = Vec::new();
        while let Ok(reveal) = rx.try_recv() {
            labels.push(reveal.label);
        }
        labels
    }

    fn plan(labels: &[&str]) -> StagePlan {
        StagePlan::reported(
            labels.iter().map(|s| s.to_string()).collect(),
            Some(Duration::from_millis(100)),
        )
    }

    #[test]
    fn test_fallback_offsets() {
        let plan = StagePlan::fallback(&ClientConfig::default());
        let offsets: Vec<u128> = (0..plan.len()).map(|i| plan.offset(i).as_millis()).collect();
        assert_eq!(offsets, vec![500, 2000, 3500, 5000]);
    }

    #[test]
    fn test_reported_plan_defaults_spacing() {
        let plan = StagePlan::reported(vec!["a".into(), "b".into()], None);
        assert_eq!(plan.offset(0), Duration::ZERO);
        assert_eq!(plan.offset(1), REPORTED_STAGE_SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveals_in_scheduled_order() {
        let (tx, mut rx) = unbounded_channel();
        let mut notifier = ProgressNotifier::new();
        let id = Uuid::new_v4();

        notifier.start(id, plan(&["one", "two", "three"]), move |r| tx.send(r).is_ok());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(drain(&mut rx), vec!["one", "two"]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), vec!["three"]);
        assert!(!notifier.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_unfired_reveals() {
        let (tx, mut rx) = unbounded_channel();
        let mut notifier = ProgressNotifier::new();

        notifier.start(Uuid::new_v4(), plan(&["one", "two", "three"]), move |r| {
            tx.send(r).is_ok()
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.cancel();
        assert!(notifier.exchange_id().is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drain(&mut rx), vec!["one"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_run() {
        let (tx, mut rx) = unbounded_channel();
        let mut notifier = ProgressNotifier::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let tx_first = tx.clone();
        notifier.start(first, plan(&["a", "b", "c"]), move |r| tx_first.send(r).is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
        notifier.start(second, plan(&["x", "y"]), move |r| tx.send(r).is_ok());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut ids = Vec::new();
        while let Ok(reveal) = rx.try_recv() {
            ids.push((reveal.exchange_id, reveal.label));
        }
        assert_eq!(
            ids,
            vec![
                (first, "a".to_string()),
                (second, "x".to_string()),
                (second, "y".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, mut rx) = unbounded_channel();
        {
            let mut notifier = ProgressNotifier::new();
            notifier.start(Uuid::new_v4(), plan(&["one", "two"]), move |r| {
                tx.send(r).is_ok()
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain(&mut rx), vec!["one"]);
    }
}

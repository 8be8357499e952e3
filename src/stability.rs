//! Wait for the document to settle before collecting.

use crate::core::config::StabilityConfig;
use crate::core::page::{ActivitySample, PageSource};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityState {
    WaitingForNodeCount,
    WaitingForQuiet,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    /// States entered, in order.
    pub states: Vec<StabilityState>,
    pub timed_out: bool,
    pub waited_ms: u64,
    pub quiet_ms: u64,
    pub node_count: usize,
    pub ready_state: String,
}

pub struct StabilityMonitor {
    config: StabilityConfig,
}

impl StabilityMonitor {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    /// Polls `source` until the node count threshold is met and no mutation
    /// has been seen for the quiet period, or until `max_wait_ms` elapses.
    /// Readings are bounded by the same deadline as the sleeps. Hitting the max
    /// wait is reported, not returned as an error.
    pub async fn wait<S: PageSource + ?Sized>(&self, source: &S) -> Result<StabilityReport> {
        let quiet_period = Duration::from_millis(self.config.quiet_period_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.max_wait_ms);

        let mut reading = match tokio::time::timeout_at(deadline, source.sample_activity()).await {
            Ok(reading) => reading?,
            Err(_) => {
                let report = StabilityReport {
                    states: vec![StabilityState::WaitingForNodeCount, StabilityState::Done],
                    timed_out: true,
                    waited_ms: (Instant::now() - started).as_millis() as u64,
                    quiet_ms: 0,
                    node_count: 0,
                    ready_state: ActivitySample::default().ready_state,
                };
                warn!(waited_ms = report.waited_ms, "activity reading outlived max wait");
                return Ok(report);
            }
        };
        let mut last_mutations = reading.mutation_count;
        let mut quiet_since = Instant::now();
        let mut state = if reading.node_count < self.config.min_node_count {
            StabilityState::WaitingForNodeCount
        } else {
            StabilityState::WaitingForQuiet
        };
        let mut states = vec![state];
        let mut timed_out = false;

        loop {
            let now = Instant::now();
            if state == StabilityState::WaitingForQuiet && now - quiet_since >= quiet_period {
                break;
            }
            if now >= deadline {
                timed_out = true;
                break;
            }

            tokio::time::sleep_until((now + poll).min(deadline)).await;
            match tokio::time::timeout_at(deadline, source.sample_activity()).await {
                Ok(next) => reading = next?,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
            let now = Instant::now();

            if reading.mutation_count != last_mutations {
                last_mutations = reading.mutation_count;
                quiet_since = now;
            }
            if state == StabilityState::WaitingForNodeCount
                && reading.node_count >= self.config.min_node_count
            {
                state = StabilityState::WaitingForQuiet;
                states.push(state);
                quiet_since = now;
            }
        }

        states.push(StabilityState::Done);

        let finished = Instant::now();
        let report = StabilityReport {
            states,
            timed_out,
            waited_ms: (finished - started).as_millis() as u64,
            quiet_ms: (finished - quiet_since).as_millis() as u64,
            node_count: reading.node_count,
            ready_state: reading.ready_state,
        };
        if timed_out {
            warn!(
                waited_ms = report.waited_ms,
                node_count = report.node_count,
                "stability wait hit max wait, continuing"
            );
        } else {
            debug!(waited_ms = report.waited_ms, node_count = report.node_count, "document stable");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PageActivity, StaticPage, TestHelper};
    use crate::dom::page::NodeSpec;

    fn source() -> (StaticPage, PageActivity) {
        let page = StaticPage::new(TestHelper::page(NodeSpec::element("body")));
        let activity = page.activity();
        (page, activity)
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_node_count_then_quiet() {
        let (page, activity) = source();
        activity.set_node_count(10).await;

        let writer = activity.clone();
        tokio::spawn(async move {
            for _ in 0..49 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                writer.add_nodes(10).await;
            }
        });

        let started = Instant::now();
        let report = StabilityMonitor::new(StabilityConfig::default())
            .wait(&page)
            .await
            .unwrap();

        assert!(!report.timed_out);
        assert_eq!(
            report.states,
            vec![
                StabilityState::WaitingForNodeCount,
                StabilityState::WaitingForQuiet,
                StabilityState::Done
            ]
        );
        assert_eq!(report.node_count, 500);
        assert!(report.quiet_ms >= 200);
        assert!(started.elapsed() < Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mutations_respect_max_wait() {
        let (page, activity) = source();
        activity.set_node_count(2_000).await;

        let writer = activity.clone();
        let stream = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(30)).await;
                writer.mutate().await;
            }
        });

        let config = StabilityConfig {
            max_wait_ms: 1_500,
            ..Default::default()
        };
        let started = Instant::now();
        let report = StabilityMonitor::new(config).wait(&page).await.unwrap();
        stream.abort();

        assert!(report.timed_out);
        assert!(started.elapsed() <= Duration::from_millis(1_500));
        assert!(report.waited_ms <= 1_500);
        assert_eq!(report.states.last(), Some(&StabilityState::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_document_finishes_after_quiet_period() {
        let (page, activity) = source();
        activity.set_node_count(800).await;

        let started = Instant::now();
        let report = StabilityMonitor::new(StabilityConfig::default())
            .wait(&page)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(
            report.states,
            vec![StabilityState::WaitingForQuiet, StabilityState::Done]
        );
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_readings_stay_within_max_wait() {
        let page = StaticPage::new(TestHelper::page(NodeSpec::element("body")))
            .with_activity_delay(Duration::from_millis(400));
        page.activity().set_node_count(10).await;

        let config = StabilityConfig {
            max_wait_ms: 1_000,
            ..Default::default()
        };
        let started = Instant::now();
        let report = StabilityMonitor::new(config).wait(&page).await.unwrap();

        assert!(report.timed_out);
        assert!(started.elapsed() <= Duration::from_millis(1_000));
        assert!(report.waited_ms <= 1_000);
        assert_eq!(report.node_count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_reading_outliving_max_wait() {
        let page = StaticPage::new(TestHelper::page(NodeSpec::element("body")))
            .with_activity_delay(Duration::from_secs(20));

        let config = StabilityConfig {
            max_wait_ms: 1_000,
            ..Default::default()
        };
        let started = Instant::now();
        let report = StabilityMonitor::new(config).wait(&page).await.unwrap();

        assert!(report.timed_out);
        assert!(started.elapsed() <= Duration::from_millis(1_000));
        assert_eq!(report.node_count, 0);
        assert_eq!(report.states.last(), Some(&StabilityState::Done));
    }
}

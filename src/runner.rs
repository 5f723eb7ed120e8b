use std::path::Path;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::config::{RunnerConfig, Settings};
use crate::grid::{
    ControllerSummary, ExecutionGateway, LadderController, LadderError, LadderResult, PaperGateway,
};
use crate::market::{ReplayFeed, Tick, TickFeed};
use crate::strategy::PolicyRegistry;

/// Runner for the ladder engine
pub struct LadderRunner {
    config: Settings,
    registry: PolicyRegistry,
}

impl LadderRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>, registry: PolicyRegistry) -> LadderResult<Self> {
        let path = config_path.as_ref();
        let path = path.to_str().ok_or_else(|| {
            LadderError::Settings(format!("config path {} is not valid UTF-8", path.display()))
        })?;
        let config = Settings::new(path)?;
        Ok(Self { config, registry })
    }

    pub fn from_settings(config: Settings, registry: PolicyRegistry) -> Self {
        Self { config, registry }
    }

    /// Run until the feed ends or Ctrl-C
    pub async fn run(self) -> LadderResult<ControllerSummary> {
        // 1. Setup Logging
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.config.log.level);
        }
        env_logger::try_init().ok();

        let run_id = uuid::Uuid::new_v4();
        info!("Starting LadderRunner (run {})...", run_id);

        // 2. Build policy
        let policy_settings = &self.config.policy;
        let policy = self
            .registry
            .create(&policy_settings.preset, &policy_settings.params)?;
        info!("Policy '{}' ready: {:?}", policy.name, policy);

        // 3. Paper execution
        let instrument = self.config.instrument.clone();
        let gw = &self.config.gateway;
        let gateway = PaperGateway::new(
            instrument.symbol.clone(),
            gw.units_per_lot,
            Duration::from_millis(gw.timeout_ms),
        )
        .with_poll_interval(Duration::from_millis(gw.poll_ms));

        let mut controller = LadderController::new(policy, instrument, gateway)?;

        // 4. Tick feed
        let feed_config = &self.config.feed;
        let mut feed = ReplayFeed::new(&feed_config.path).with_buffer(feed_config.buffer);
        let rx = subscribe_with_retry(
            &mut feed,
            &controller.instrument().symbol,
            feed_config.subscribe_retries,
            feed_config.retry_base_delay_ms,
        )
        .await?;

        // 5. Event loop
        let summary = drive(&mut feed, &mut controller, rx, &self.config.runner).await?;
        let gateway = controller.gateway();
        info!(
            "Run {} finished: realized P&L {:.2}, unrealized {:.2}, {} orders still live",
            run_id,
            gateway.realized_pnl(),
            gateway.unrealized_pnl(),
            gateway.live_orders()
        );
        Ok(summary)
    }
}

/// Subscribe to `feed`, retrying with exponential backoff while it is not ready
pub async fn subscribe_with_retry<F>(
    feed: &mut F,
    instrument: &str,
    max_retries: u32,
    base_delay_ms: u64,
) -> LadderResult<mpsc::Receiver<Tick>>
where
    F: TickFeed + ?Sized,
{
    let mut attempts = 0;
    let mut last_error = LadderError::Feed(format!("no subscribe attempt for {}", instrument));

    while attempts < max_retries.max(1) {
        match feed.subscribe(instrument).await {
            Ok(rx) => return Ok(rx),
            Err(e) => {
                attempts += 1;
                last_error = e;

                if attempts < max_retries {
                    let delay = base_delay_ms * 2u64.pow(attempts - 1);
                    warn!(
                        "Subscribe to {} failed (attempt {}/{}), retrying in {}ms: {}",
                        instrument, attempts, max_retries, delay, last_error
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    error!("Giving up on {} after {} attempts", instrument, attempts);
    Err(last_error)
}

/// Feed ticks from `rx` to the controller until the channel closes or Ctrl-C.
///
/// The controller runs on the task's own thread, so each gateway call blocks
/// it for as long as that call waits. Returns the summary taken after the
/// optional final close.
pub async fn drive<F, G>(
    feed: &mut F,
    controller: &mut LadderController<G>,
    mut rx: mpsc::Receiver<Tick>,
    config: &RunnerConfig,
) -> LadderResult<ControllerSummary>
where
    F: TickFeed + ?Sized,
    G: ExecutionGateway,
{
    let summaries = config.summary_interval_secs > 0;
    let mut summary_timer = interval(Duration::from_secs(config.summary_interval_secs.max(1)));
    // the first tick of an interval completes immediately
    summary_timer.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            tick = rx.recv() => match tick {
                Some(tick) => controller.on_tick(&tick),
                None => {
                    info!("Tick feed ended after {} ticks", controller.ticks());
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                break;
            }
            _ = summary_timer.tick(), if summaries => log_summary(&controller.summary()),
        }
    }

    feed.unsubscribe().await?;
    if config.close_on_exit {
        let closed = controller.close_all();
        info!("Closed {} orders on exit", closed);
    }

    let summary = controller.summary();
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &ControllerSummary) {
    match serde_json::to_string(summary) {
        Ok(json) => info!("Summary: {}", json),
        Err(e) => warn!("Failed to serialize summary: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::executor::mock::MockGateway;
    use crate::grid::{InstrumentSpec, OrderTag, PolicyConfig};
    use crate::market::feed::mock::MockTickFeed;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn ticks(prices: &[f64]) -> Vec<Tick> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Tick::new("EURUSD", t0 + ChronoDuration::seconds(i as i64), p, p))
            .collect()
    }

    fn controller() -> LadderController<MockGateway> {
        LadderController::new(
            PolicyConfig::new("trend", 50.0, 0.01),
            InstrumentSpec::new("EURUSD", 0.001, 3),
            MockGateway::new(),
        )
        .unwrap()
    }

    fn quiet() -> RunnerConfig {
        RunnerConfig {
            summary_interval_secs: 0,
            close_on_exit: true,
        }
    }

    #[tokio::test]
    async fn test_subscribe_retries_until_ready() {
        let mut feed = MockTickFeed::new(ticks(&[1.1])).not_ready_for(2);
        let rx = subscribe_with_retry(&mut feed, "EURUSD", 3, 1).await;
        assert!(rx.is_ok());
        assert_eq!(feed.attempts, 3);
    }

    #[tokio::test]
    async fn test_subscribe_gives_up() {
        let mut feed = MockTickFeed::new(ticks(&[1.1])).not_ready_for(5);
        let err = subscribe_with_retry(&mut feed, "EURUSD", 2, 1).await.unwrap_err();
        assert!(matches!(err, LadderError::Feed(_)));
        assert_eq!(feed.attempts, 2);
    }

    #[tokio::test]
    async fn test_drive_until_feed_ends_and_close() {
        let mut feed = MockTickFeed::new(ticks(&[1.1000, 1.1025, 1.1060, 1.1010]));
        let mut ctl = controller();
        let rx = feed.subscribe("EURUSD").await.unwrap();

        let summary = drive(&mut feed, &mut ctl, rx, &quiet()).await.unwrap();
        assert!(feed.unsubscribed);
        assert_eq!(summary.ticks, 4);
        assert_eq!(ctl.gateway().submitted.len(), 2);
        assert_eq!(ctl.gateway().closed.len(), 2);
        assert!(ctl.gateway().live().is_empty());
        assert!(summary.ladders.iter().all(|l| l.trend_orders == 0));
    }

    #[tokio::test]
    async fn test_drive_keeps_orders_without_close_on_exit() {
        let mut feed = MockTickFeed::new(ticks(&[1.1000, 1.1060]));
        let mut ctl = controller();
        let rx = feed.subscribe("EURUSD").await.unwrap();
        let config = RunnerConfig {
            summary_interval_secs: 1,
            close_on_exit: false,
        };

        drive(&mut feed, &mut ctl, rx, &config).await.unwrap();
        let buy = ctl.ladder(crate::grid::OrderSide::Buy).unwrap();
        assert_eq!(buy.orders(OrderTag::Trend).len(), 1);
        assert!(ctl.gateway().closed.is_empty());
    }
}

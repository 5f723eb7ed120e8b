//! Tick feed abstraction
//!
//! A feed hands the runner an mpsc receiver of [`Tick`]s for one instrument.

use std::path::PathBuf;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::grid::errors::{LadderError, LadderResult};

use super::types::Tick;

/// Source of serialized ticks
#[async_trait]
pub trait TickFeed: Send {
    /// Start delivering ticks for `instrument`
    async fn subscribe(&mut self, instrument: &str) -> LadderResult<mpsc::Receiver<Tick>>;

    /// Stop delivery
    async fn unsubscribe(&mut self) -> LadderResult<()>;
}

/// Replays ticks from a JSON-lines file, one [`Tick`] object per line.
pub struct ReplayFeed {
    path: PathBuf,
    buffer: usize,
    task: Option<JoinHandle<()>>,
}

impl ReplayFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: 1024,
            task: None,
        }
    }

    /// Builder: set the channel capacity
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl TickFeed for ReplayFeed {
    async fn subscribe(&mut self, instrument: &str) -> LadderResult<mpsc::Receiver<Tick>> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            LadderError::Feed(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let instrument = instrument.to_string();
        let path = self.path.display().to_string();

        info!("Replaying {} ticks from {}", instrument, path);
        self.task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0u64;
            let mut sent = 0u64;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Read error in {} after line {}: {}", path, line_no, e);
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let tick: Tick = match serde_json::from_str(&line) {
                    Ok(tick) => tick,
                    Err(e) => {
                        warn!("Skipping line {} of {}: {}", line_no, path, e);
                        continue;
                    }
                };
                if tick.instrument != instrument {
                    continue;
                }
                if tx.send(tick).await.is_err() {
                    debug!("Tick receiver dropped, stopping replay");
                    break;
                }
                sent += 1;
            }
            info!("Replay of {} finished: {} ticks", path, sent);
        }));

        Ok(rx)
    }

    async fn unsubscribe(&mut self) -> LadderResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

/// Scripted feed for tests
pub mod mock {
    use super::*;

    /// Mock feed that refuses the first `not_ready` subscriptions, then
    /// delivers its ticks and closes the channel.
    #[derive(Debug, Default)]
    pub struct MockTickFeed {
        pub ticks: Vec<Tick>,
        pub not_ready: u32,
        pub attempts: u32,
        pub unsubscribed: bool,
    }

    impl MockTickFeed {
        pub fn new(ticks: Vec<Tick>) -> Self {
            Self {
                ticks,
                ..Default::default()
            }
        }

        /// Builder: fail the first `n` subscriptions
        pub fn not_ready_for(mut self, n: u32) -> Self {
            self.not_ready = n;
            self
        }
    }

    #[async_trait]
    impl TickFeed for MockTickFeed {
        async fn subscribe(&mut self, instrument: &str) -> LadderResult<mpsc::Receiver<Tick>> {
            self.attempts += 1;
            if self.attempts <= self.not_ready {
                return Err(LadderError::Feed(format!("no history for {} yet", instrument)));
            }

            let (tx, rx) = mpsc::channel(self.ticks.len().max(1));
            for tick in self.ticks.iter().filter(|t| t.instrument == instrument) {
                tx.send(tick.clone())
                    .await
                    .map_err(|e| LadderError::Feed(e.to_string()))?;
            }
            Ok(rx)
        }

        async fn unsubscribe(&mut self) -> LadderResult<()> {
            self.unsubscribed = true;
            Ok(())
        }
    }
}

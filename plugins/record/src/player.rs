use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use flow_api::{OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, StreamView};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::format::{Manifest, RecordReader};

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    pub filename: PathBuf,
    /// Messages per second. Absent or `0` replays as fast as I/O allows.
    #[serde(default)]
    pub frequency: Option<f64>,
}

/// Outcome of one [`Player::publish_next`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStatus {
    /// A message was sent on the named stream.
    Published(String),
    /// The recording is used up. Every later step returns this too.
    Exhausted,
}

/// Source that replays a recording.
///
/// Outputs are the manifest's streams, declared with their recorded names and
/// element types. Messages are routed by their recorded stream name.
pub struct Player {
    name: String,
    config: PlayerConfig,
    period: Option<Duration>,
    manifest: Manifest,
    reader: Mutex<Option<RecordReader<File>>>,
}

impl Player {
    pub fn new(name: impl Into<String>, config: PlayerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            period: None,
            manifest: Manifest::default(),
            reader: Mutex::new(None),
        }
    }

    /// Manifest of the opened recording. Empty before setup.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn period(frequency: Option<f64>) -> Result<Option<Duration>, OperatorError> {
        match frequency {
            None => Ok(None),
            Some(f) if !f.is_finite() || f < 0.0 => Err(OperatorError::config(format!(
                "frequency must be a finite, non-negative number, got {f}"
            ))),
            Some(f) if f == 0.0 => Ok(None),
            // Periods below a nanosecond round to zero: unbounded.
            Some(f) => Duration::try_from_secs_f64(1.0 / f)
                .map(|d| (!d.is_zero()).then_some(d))
                .map_err(|e| OperatorError::config(format!("frequency {f}: {e}"))),
        }
    }

    /// Read the next recorded message and send it on its stream.
    ///
    /// The first read past the last message releases the file and returns
    /// [`ReplayStatus::Exhausted`]; so does every call after that.
    pub async fn publish_next(
        &self,
        ctx: &dyn OutputContext,
    ) -> Result<ReplayStatus, OperatorError> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Ok(ReplayStatus::Exhausted);
        };

        let next = reader
            .next_message()
            .map_err(|e| e.with_context(self.config.filename.display()))?;
        let Some(msg) = next else {
            tracing::info!(
                operator = %self.name,
                file = %self.config.filename.display(),
                messages = reader.read(),
                "end of recording"
            );
            *guard = None;
            return Ok(ReplayStatus::Exhausted);
        };

        let entry = self.manifest.get(&msg.stream).ok_or_else(|| {
            OperatorError::format_err(format!(
                "recorded message on stream '{}' which is not in the manifest",
                msg.stream
            ))
        })?;
        if !entry.data_type.accepts(&msg.payload) {
            return Err(OperatorError::format_err(format!(
                "recorded payload {} does not match stream '{}' of type {}",
                msg.payload, entry.name, entry.data_type
            )));
        }

        let stream = msg.stream.clone();
        ctx.send(&stream, msg).await?;
        Ok(ReplayStatus::Published(stream))
    }
}

impl Operator for Player {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, _inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        self.period = Self::period(self.config.frequency)?;

        let mut reader = RecordReader::open(&self.config.filename)?;
        self.manifest = reader
            .read_manifest()
            .map_err(|e| e.with_context(self.config.filename.display()))?;
        *self.reader.get_mut() = Some(reader);

        let outputs = self.manifest.to_streams();
        tracing::info!(
            operator = %self.name,
            file = %self.config.filename.display(),
            streams = ?outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            period = ?self.period,
            "recording opened"
        );
        Ok(OperatorSetup::source(outputs))
    }

    fn run<'a>(&'a self, ctx: &'a dyn OutputContext) -> OpFuture<'a> {
        Box::pin(async move {
            match self.period {
                None => {
                    while self.publish_next(ctx).await? != ReplayStatus::Exhausted {}
                }
                Some(period) => {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if self.publish_next(ctx).await? == ReplayStatus::Exhausted {
                            break;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn stop(&self) -> OpFuture<'_> {
        Box::pin(async move {
            self.reader.lock().await.take();
            Ok(())
        })
    }
}

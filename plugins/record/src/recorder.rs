use std::fs::File;
use std::path::PathBuf;

use flow_api::{
    Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, StreamView,
};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::format::{Manifest, RecordWriter};

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    pub filename: PathBuf,
    /// Names of the input streams to record. Empty records every input.
    #[serde(default)]
    pub filter: Vec<String>,
}

/// Persists its inputs to a recording file. Declares no outputs.
///
/// The manifest lists exactly the recorded (filtered) streams and is written
/// at setup, before any message.
pub struct Recorder {
    name: String,
    config: RecorderConfig,
    writer: Mutex<Option<RecordWriter<File>>>,
}

impl Recorder {
    pub fn new(name: impl Into<String>, config: RecorderConfig) -> Self {
        Self {
            name: name.into(),
            config,
            writer: Mutex::new(None),
        }
    }

    fn select_inputs(&self, inputs: StreamView) -> StreamView {
        let filter = &self.config.filter;
        if filter.is_empty() {
            return inputs;
        }
        for wanted in filter {
            if !inputs.contains(wanted) {
                tracing::warn!(operator = %self.name, stream = %wanted, "filter names a stream that is not an input");
            }
        }
        inputs.filter(|s| filter.contains(&s.name))
    }
}

impl Operator for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        let inputs = self.select_inputs(inputs);
        let manifest = Manifest::from_streams(&inputs)?;

        let mut writer = RecordWriter::create(&self.config.filename)?;
        writer
            .write_manifest(&manifest)
            .map_err(|e| e.with_context(self.config.filename.display()))?;
        *self.writer.get_mut() = Some(writer);

        tracing::info!(
            operator = %self.name,
            file = %self.config.filename.display(),
            streams = ?inputs.names(),
            "recording started"
        );
        Ok(OperatorSetup::sink(inputs))
    }

    fn handle<'a>(&'a self, _ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .ok_or_else(|| OperatorError::new(format!("recorder '{}' is not recording", self.name)))?;
            writer
                .write_message(&msg)
                .map_err(|e| e.with_context(self.config.filename.display()))
        })
    }

    fn stop(&self) -> OpFuture<'_> {
        Box::pin(async move {
            if let Some(mut writer) = self.writer.lock().await.take() {
                writer.flush()?;
                tracing::info!(
                    operator = %self.name,
                    messages = writer.written(),
                    "recording finished"
                );
            }
            Ok(())
        })
    }
}

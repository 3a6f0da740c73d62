//! Log sink: writes every input message to the console and/or a file through
//! its own `tracing` dispatcher.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use flow_api::{
    Message, OpFuture, Operator, OperatorError, OperatorSetup, OutputContext, StreamDecl,
    StreamPredicate, StreamView,
};
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;

pub mod config;
pub mod format;

pub use config::{Encoding, FileMode, LogSinkConfig};
pub use format::LineFormat;

/// Sink operator. Declares no outputs.
pub struct LogSink {
    name: String,
    config: LogSinkConfig,
    input_filter: Option<StreamPredicate>,
    dispatch: Option<Dispatch>,
}

impl LogSink {
    pub fn new(name: impl Into<String>, config: LogSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            input_filter: None,
            dispatch: None,
        }
    }

    pub fn with_input_filter(
        mut self,
        filter: impl Fn(&StreamDecl) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.input_filter = Some(Arc::new(filter));
        self
    }

    fn build_dispatch(&self) -> Result<Dispatch, OperatorError> {
        let format = LineFormat::parse(
            self.config.format.as_deref().unwrap_or(format::DEFAULT_TEMPLATE),
            self.config
                .date_format
                .as_deref()
                .unwrap_or(format::DEFAULT_DATE_FORMAT),
            &self.name,
        )?;

        let console = self.config.console_output.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(io::stdout)
                .with_ansi(false)
                .event_format(format.clone())
        });

        let file = match &self.config.filename {
            Some(path) => {
                let file = open_log_file(path, self.config.file_mode)
                    .map_err(|e| OperatorError::from(e).with_context(path.display()))?;
                let writer = EncodedWriter::new(file, self.config.encoding);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(writer))
                        .with_ansi(false)
                        .event_format(format.clone()),
                )
            }
            None => None,
        };

        if console.is_none() && file.is_none() {
            tracing::warn!(operator = %self.name, "log sink has neither console nor file output");
        }

        let subscriber = tracing_subscriber::registry().with(console).with(file);
        Ok(Dispatch::new(subscriber))
    }
}

impl Operator for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, inputs: StreamView) -> Result<OperatorSetup, OperatorError> {
        self.dispatch = Some(self.build_dispatch()?);
        let inputs = inputs.filter_with(self.input_filter.as_ref());
        tracing::debug!(operator = %self.name, inputs = ?inputs.names(), "log sink ready");
        Ok(OperatorSetup::sink(inputs))
    }

    fn handle<'a>(&'a self, _ctx: &'a dyn OutputContext, msg: Message) -> OpFuture<'a> {
        Box::pin(async move {
            let dispatch = self
                .dispatch
                .as_ref()
                .ok_or_else(|| OperatorError::new(format!("log sink '{}' is not set up", self.name)))?;
            tracing::dispatcher::with_default(dispatch, || tracing::info!("{msg}"));
            Ok(())
        })
    }
}

fn open_log_file(path: &Path, mode: FileMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        FileMode::Append => options.append(true),
        FileMode::Truncate => options.write(true).truncate(true),
    };
    options.open(path)
}

/// Applies the configured [`Encoding`] to everything written to the file.
struct EncodedWriter<W> {
    inner: W,
    encoding: Encoding,
}

impl<W: Write> EncodedWriter<W> {
    fn new(inner: W, encoding: Encoding) -> Self {
        Self { inner, encoding }
    }
}

impl<W: Write> Write for EncodedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.encoding {
            Encoding::Utf8 => self.inner.write(buf),
            Encoding::Ascii => {
                self.inner.write_all(escape_non_ascii(buf).as_bytes())?;
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn escape_non_ascii(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len());
    for c in String::from_utf8_lossy(buf).chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.extend(c.escape_unicode());
        }
    }
    out
}

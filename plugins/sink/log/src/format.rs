use std::fmt::{self, Write as _};

use chrono::{DateTime, Local, TimeZone};
use flow_api::OperatorError;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const DEFAULT_TEMPLATE: &str = "{message}";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Time,
    Level,
    Name,
    Message,
}

/// Parsed line template of a log sink.
#[derive(Debug, Clone)]
pub struct LineFormat {
    segments: Vec<Segment>,
    date_format: String,
    name: String,
}

impl LineFormat {
    /// Parse `template`. `{{` and `}}` are literal braces; any placeholder
    /// other than `time`, `level`, `name` or `message` is rejected, as is a
    /// date format that fails to render the current local time.
    pub fn parse(template: &str, date_format: &str, name: &str) -> Result<Self, OperatorError> {
        let mut trial = String::new();
        if write!(trial, "{}", Local::now().format(date_format)).is_err() {
            return Err(OperatorError::config(format!(
                "invalid date format '{date_format}'"
            )));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => field.push(ch),
                            None => {
                                return Err(OperatorError::config(format!(
                                    "unclosed placeholder in log format '{template}'"
                                )));
                            }
                        }
                    }
                    let segment = match field.as_str() {
                        "time" => Segment::Time,
                        "level" => Segment::Level,
                        "name" => Segment::Name,
                        "message" => Segment::Message,
                        other => {
                            return Err(OperatorError::config(format!(
                                "unknown placeholder '{{{other}}}' in log format"
                            )));
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => {
                    return Err(OperatorError::config(format!(
                        "unmatched '}}' in log format '{template}'"
                    )));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            segments,
            date_format: date_format.to_string(),
            name: name.to_string(),
        })
    }

    pub(crate) fn render<Tz>(&self, level: &Level, message: &str, time: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut line = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Time => {
                    // Checked against a zoned time in `parse`.
                    let _ = write!(line, "{}", time.format(&self.date_format));
                }
                Segment::Level => line.push_str(level.as_str()),
                Segment::Name => line.push_str(&self.name),
                Segment::Message => line.push_str(message),
            }
        }
        line
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;
        let now = Local::now();
        writeln!(writer, "{}", self.render(event.metadata().level(), &message, &now))
    }
}

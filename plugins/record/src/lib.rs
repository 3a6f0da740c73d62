//! Record/replay of named, typed streams.
//!
//! A recording is one binary file: a [`Manifest`] naming every recorded
//! stream with its element type, followed by the messages in arrival order.
//! [`Recorder`] writes it, [`Player`] turns it back into streams.

pub mod format;
mod player;
mod recorder;

pub use format::{Manifest, ManifestEntry, RecordReader, RecordWriter};
pub use player::{Player, PlayerConfig, ReplayStatus};
pub use recorder::{Recorder, RecorderConfig};

use std::collections::BTreeMap;
use std::io::{self, Write};

use flow_record::RecordReader;

use crate::config::InspectArgs;
use crate::error::CliError;

pub fn run(args: InspectArgs) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    inspect(&args, &mut out)
}

fn inspect(args: &InspectArgs, out: &mut impl Write) -> Result<(), CliError> {
    let mut reader = RecordReader::open(&args.file)?;
    let manifest = reader.read_manifest()?;

    if args.json {
        serde_json::to_writer(&mut *out, &serde_json::json!({ "manifest": manifest.entries() }))?;
        writeln!(out)?;
    } else {
        writeln!(out, "{} ({} streams)", args.file.display(), manifest.len())?;
        for entry in manifest.entries() {
            writeln!(out, "  {}: {}", entry.name, entry.data_type)?;
        }
    }

    let mut counts: BTreeMap<String, u64> = manifest
        .entries()
        .iter()
        .map(|e| (e.name.clone(), 0))
        .collect();
    let mut shown = 0usize;

    while let Some(msg) = reader.next_message()? {
        *counts.entry(msg.stream.clone()).or_default() += 1;
        if args.limit.is_some_and(|limit| shown >= limit) {
            continue;
        }
        shown += 1;
        if args.json {
            serde_json::to_writer(&mut *out, &msg)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{msg}")?;
        }
    }

    if args.json {
        serde_json::to_writer(&mut *out, &serde_json::json!({ "totals": counts }))?;
        writeln!(out)?;
    } else {
        writeln!(out, "totals:")?;
        for (name, n) in &counts {
            writeln!(out, "  {name}: {n}")?;
        }
    }
    Ok(())
}

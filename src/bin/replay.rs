use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use txnlog::{LogSequentialReader, RecordBody};

#[derive(Parser)]
#[command(name = "replay", version, about = "Replay a transaction log segment")]
struct Args {
    /// Segment file to replay (log-<id>)
    segment: PathBuf,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut reader = LogSequentialReader::open_path(&args.segment)
        .with_context(|| format!("open {}", args.segment.display()))?;
    let mut out = io::BufWriter::new(io::stdout());

    let mut read = 0u64;
    let mut puts = 0u64;
    let mut takes = 0u64;
    let mut rollbacks = 0u64;
    let mut commits = 0u64;

    while let Some(entry) = reader.next()? {
        read += 1;
        let record = &entry.record;
        let pointer = match &record.body {
            RecordBody::Put(_) => {
                puts += 1;
                String::new()
            }
            RecordBody::Take(ptr) => {
                takes += 1;
                format!(", ptr=({}, {})", ptr.file_id, ptr.offset)
            }
            RecordBody::Rollback => {
                rollbacks += 1;
                String::new()
            }
            RecordBody::Commit => {
                commits += 1;
                String::new()
            }
        };
        writeln!(
            out,
            "{}, {}, {}, {}, {}{}",
            record.transaction_id,
            record.write_order_id,
            reader.file_id(),
            entry.offset,
            record.body.kind_name(),
            pointer
        )?;
    }

    writeln!(
        out,
        "read: {read}, put: {puts}, take: {takes}, rollback: {rollbacks}, commit: {commits}"
    )?;
    out.flush()?;
    Ok(())
}

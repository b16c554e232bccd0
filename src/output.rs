use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CrawlSummary, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Narrates the crawl line by line on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(summary: &CrawlSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "Pages: {}  Rows: {}  Pairs: {}",
            summary.pages, summary.rows, summary.pairs
        )?;
        writeln!(
            stdout,
            "Already present: {}  Corrupted: {}  Failed: {}",
            summary.already_present,
            summary.corrupted,
            summary.total_failed()
        )?;
        if summary.manifest_path.is_some() {
            writeln!(
                stdout,
                "Manifest rows: {}  Incomplete pairs: {}",
                summary.manifest_rows, summary.incomplete_pairs
            )?;
        }
        writeln!(stdout, "Total files downloaded: {}", summary.total_downloaded())
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stdout = io::stdout().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stdout, "{} [{:.1}s]", event.message, elapsed.as_secs_f64()),
            None => writeln!(stdout, "{}", event.message),
        };
    }
}

/// Silent during the run; prints the summary as JSON at the end.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &CrawlSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

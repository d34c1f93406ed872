use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use loadrec_core::summary::REPORT_DIRECTORY_NAME;
use loadrec_core::{
    ChannelConfig, CoreResult, LoadrecConfig, SummaryListener, SummaryReport, Values,
    ValuesFileReader,
};
use loadrec_storage::{ValuesFileWriter, WriteReport};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "loadrec")]
#[command(about = "Inspect and replay load generator values files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build per-path response time summaries from a values file
    Summarize {
        /// Values file to read
        file: PathBuf,

        /// Write summaryReport.json and globalSummaryReport.json here
        /// instead of printing the report
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Stream a values file through the recorder into another file
    Replay {
        /// Values file to read
        input: PathBuf,

        /// Values file to append to
        output: PathBuf,

        /// Ring buffer capacity (power of two)
        #[arg(long, env = "LOADREC_RECORDER__CHANNEL__CAPACITY")]
        capacity: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match LoadrecConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Ignoring invalid configuration: {e}");
            LoadrecConfig::default()
        }
    };
    logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Summarize { file, output_dir } => {
            let report = summarize(&file)?;
            match output_dir {
                Some(dir) => {
                    let dir = dir.join(REPORT_DIRECTORY_NAME);
                    let (summary, global) = report.write_json(&dir)?;
                    println!("{}", summary.display());
                    println!("{}", global.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Replay {
            input,
            output,
            capacity,
        } => {
            let mut channel = config.recorder.channel.clone();
            if let Some(capacity) = capacity {
                channel.capacity = capacity;
            }
            let report = replay(&input, &output, channel)?;
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}

fn summarize(file: &Path) -> CoreResult<SummaryReport> {
    let mut listener = SummaryListener::new()?;
    let mut count = 0u64;
    for record in ValuesFileReader::open(file)? {
        listener.record(&record?)?;
        count += 1;
    }
    tracing::info!(file = %file.display(), records = count, "Summarized values file");
    Ok(listener.report())
}

fn replay(input: &Path, output: &Path, channel: ChannelConfig) -> CoreResult<WriteReport> {
    let mut writer = ValuesFileWriter::with_channel(output, channel)?;
    for record in ValuesFileReader::open(input)? {
        let values: Values = record?.into();
        writer.on_response_time_value(&values)?;
    }
    let backpressure_waits = writer.backpressure_waits();
    let report = writer.stop()?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        written = report.written,
        backpressure_waits,
        "Replayed values file"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    const INPUT: &str = "1|GET|/a|1000|200|10\n\
                         2|GET|/a|3000|200|10\n\
                         \n\
                         3|POST|/b|2000|201|0\n";

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_replay_copies_lines() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, INPUT).unwrap();

        let channel = ChannelConfig {
            capacity: 2,
            ..Default::default()
        };
        let report = replay(&input, &output, channel).unwrap();

        assert_eq!(report, WriteReport { written: 3, failures: 0 });
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "1|GET|/a|1000|200|10\n2|GET|/a|3000|200|10\n3|POST|/b|2000|201|0\n"
        );
    }

    #[test]
    fn test_replay_stops_at_malformed_line() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "1|GET|/a|1000|200|10\nnot a record\n").unwrap();

        let err = replay(&input, &dir.path().join("out.txt"), ChannelConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_summarize_groups_by_path() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, INPUT).unwrap();

        let report = summarize(&input).unwrap();
        assert_eq!(report.per_path.len(), 2);
        assert_eq!(report.per_path["/a"].total_count, 2);
        assert_eq!(report.global.as_ref().map(|g| g.total_count), Some(3));
    }
}

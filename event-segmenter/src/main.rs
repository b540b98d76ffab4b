use anyhow::{Context, Result, bail};
use clap::Parser;
use event_segmenter::{
    ChannelReport, RunState, SegmentError, SegmentResult,
    decoder::{BinaryDecoderConfig, DataFormat},
    input::InputChain,
    parameters::{Mode, SegmenterSettings},
    progress::{ConsoleProgress, ProgressSink, TracingProgress},
    segment_chain,
    segmentation::SaveToFileFilter,
};
use nanoseg_common::{
    init_tracer,
    metrics::{component_info_metric, describe_metrics},
    tracer::{LogTarget, TracerOptions},
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};

// cargo run --bin event-segmenter -- --save-file out/events.csv binary --layout layout.json --arrays 0,1 data_*.bin

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Events are written here as CSV, with edges alongside; the channel
    /// label is appended to the file name when several channels are segmented
    #[clap(long)]
    save_file: Option<PathBuf>,

    /// Order files by acquisition timestamp rather than command line order
    #[clap(long)]
    sort_by_timestamp: bool,

    /// Show a progress line on stderr rather than logging progress
    #[clap(long)]
    progress: bool,

    /// Send log output to stderr
    #[clap(long)]
    log_stderr: bool,

    #[command(flatten)]
    settings: SegmenterSettings,

    #[command(subcommand)]
    mode: Mode,
}

fn build_chain(
    format: DataFormat,
    files: &[PathBuf],
    settings: Option<&Path>,
    sort_by_timestamp: bool,
) -> SegmentResult<InputChain> {
    let mut chain = InputChain::new(format)?;
    for file in files {
        chain.append(file, settings)?;
    }
    if sort_by_timestamp {
        chain.sort_by_timestamp();
    }
    Ok(chain)
}

/// One labelled chain per channel to segment.
fn build_chains(args: &Cli, run: &RunState) -> SegmentResult<Vec<(String, InputChain)>> {
    match &args.mode {
        Mode::Chimera { settings, files } => {
            let chain = build_chain(
                DataFormat::Chimera,
                files,
                settings.as_deref(),
                args.sort_by_timestamp,
            );
            Ok(vec![("chimera".to_owned(), run.check(chain)?)])
        }
        Mode::Binary {
            layout,
            arrays,
            files,
        } => {
            let config = run.check(BinaryDecoderConfig::load(layout))?;
            let arrays = arrays
                .as_ref()
                .map(|list| list.0.clone())
                .unwrap_or_else(|| vec![config.array_index()]);
            arrays
                .into_iter()
                .map(|array| {
                    let config = config.with_array_index(array)?;
                    let chain = build_chain(
                        DataFormat::Binary(config),
                        files,
                        None,
                        args.sort_by_timestamp,
                    )?;
                    Ok((format!("array{array}"), chain))
                })
                .map(|chain| run.check(chain))
                .collect()
        }
    }
}

fn output_path(base: &Path, label: &str, suffix: &str, single: bool) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events".to_owned());
    let extension = base
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_owned());
    let name = match (single, suffix.is_empty()) {
        (true, true) => format!("{stem}.{extension}"),
        (true, false) => format!("{stem}_{suffix}.{extension}"),
        (false, true) => format!("{stem}_{label}.{extension}"),
        (false, false) => format!("{stem}_{label}_{suffix}.{extension}"),
    };
    base.with_file_name(name)
}

fn save_report(base: &Path, report: &ChannelReport, single: bool) -> SegmentResult<()> {
    let events = output_path(base, &report.label, "", single);
    report
        .segmentation
        .events
        .iter()
        .save_to_file(&events)
        .map_err(|source| SegmentError::Output {
            path: events.clone(),
            source,
        })?;
    let edges = output_path(base, &report.label, "edges", single);
    report
        .segmentation
        .edges
        .iter()
        .save_to_file(&edges)
        .map_err(|source| SegmentError::Output {
            path: edges.clone(),
            source,
        })?;
    info!("Saved {} events to {}", report.segmentation.events.len(), events.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let _tracer = init_tracer!(TracerOptions {
        target: if args.log_stderr {
            LogTarget::Stderr
        } else {
            LogTarget::Stdout
        },
        default_directive: Some("info".to_owned()),
    })
    .context("Tracer should be initialised")?;

    describe_metrics();
    component_info_metric("event-segmenter");

    let run = RunState::default();
    let chains = build_chains(&args, &run)?;
    let progress: Box<dyn ProgressSink> = if args.progress {
        Box::new(ConsoleProgress)
    } else {
        Box::new(TracingProgress::default())
    };

    let results: Vec<_> = chains
        .par_iter()
        .map(|(label, chain)| segment_chain(chain, &args.settings, &run, progress.as_ref(), label))
        .collect();

    let single = results.len() == 1;
    let mut failed = 0;
    for result in results {
        match result {
            Ok(report) => {
                info!(
                    channel = %report.label,
                    samples = report.samples,
                    events = report.segmentation.events.len(),
                    accepted = report.accepted(),
                    capture_rate = report.capture_rate(),
                    mean_dwell = report.segmentation.dwell.mean(),
                    "Channel complete"
                );
                for (class, count) in report.class_counts() {
                    info!(channel = %report.label, %class, count);
                }
                if let Some(base) = &args.save_file {
                    run.check(save_report(base, &report, single))?;
                }
            }
            Err(e) => {
                error!("Channel failed: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        let code = run.last_error().map(|code| code.value()).unwrap_or_default();
        bail!("{failed} channel(s) failed, last error code {code}");
    }
    Ok(())
}

use anyhow::{Result, bail};
use clap::Parser;
use env_logger::Env;
use hookchart::{
    Args, ChartMetadata, Command, ConvertArgs, ConvertConfig, ImportOptions, convert_events,
    import_midi_file, inspect_midi_file, parse_chart, parse_policy, preview_lanes_ascii,
    read_chart_file, serialize_chart, summarize_qa, write_chart_file,
};
use log::{debug, info, warn};
use std::path::Path;

const PREVIEW_WIDTH: usize = 96;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match args.command {
        Command::Convert(convert) => run_convert(convert),
        Command::Check { chart } => run_check(&chart),
        Command::Inspect { midi } => run_inspect(&midi),
    }
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading conversion settings from '{}'...", path.display());
            ConvertConfig::load(path)?
        }
        None => ConvertConfig::default(),
    };
    if args.no_qa {
        config.include_qa = false;
    }

    let options = ImportOptions {
        track_index: args.track,
        transpose: args.transpose,
        policy: parse_policy(&args.policy),
        merge: args.merge_midi,
        resolution: config.resolution,
        lead_track_patterns: config.lead_track_patterns.clone(),
    };

    info!("Importing MIDI file: '{}'...", args.midi.display());
    let imported = import_midi_file(&args.midi, &options)?;

    debug!(
        "Imported melody '{}' with {} events..!",
        imported.track_name.as_deref().unwrap_or("<unknown>"),
        imported.events.len()
    );

    if imported.events.is_empty() {
        warn!("No melody notes found, the chart will have empty tracks..!");
    }

    let metadata = ChartMetadata {
        name: args
            .name
            .or_else(|| imported.title.clone())
            .unwrap_or_else(|| "Unknown".into()),
        artist: args.artist.unwrap_or_else(|| "Unknown".into()),
        charter: args.charter.unwrap_or_else(|| config.charter.clone()),
        ..Default::default()
    };

    let mut conversion = convert_events(&imported.events, &imported.sync_track, metadata, &config)?;
    if !imported.time_signatures.is_empty() {
        conversion.chart.time_signatures = imported.time_signatures;
    }

    let duration_s = imported.events.last().map_or(0.0, |e| e.end_ms() / 1000.0);
    info!(
        "Charted {} note(s) from track '{}' at {:.3} BPM, {:.1}s long..!",
        imported.events.len(),
        imported.track_name.as_deref().unwrap_or("<unnamed>"),
        conversion.chart.sync_track.first().map_or(0.0, |p| p.bpm()),
        duration_s
    );

    if args.preview {
        info!(
            "Lane preview:\n{}",
            preview_lanes_ascii(&imported.events, &conversion.lanes, PREVIEW_WIDTH)
        );
    }

    if config.include_qa {
        for (kind, count) in summarize_qa(&conversion.chart.qa_markers) {
            info!("QA {}: {}", kind.marker_text(), count);
        }
    } else if !conversion.findings.is_empty() {
        info!(
            "{} QA finding(s) left out of the chart..!",
            conversion.findings.len()
        );
    }

    let output = args
        .output
        .unwrap_or_else(|| args.midi.with_extension("chart"));
    write_chart_file(&output, &conversion.chart)?;
    info!("Conversion finished, exiting..!");

    Ok(())
}

fn run_inspect(path: &Path) -> Result<()> {
    info!("Inspecting MIDI file: '{}'...", path.display());
    let overview = inspect_midi_file(path, &ImportOptions::default())?;

    info!(
        "{} track(s), {} ticks per quarter, {:.3} BPM at start, {} tempo change(s)..!",
        overview.tracks.len(),
        overview.ticks_per_quarter,
        overview.initial_bpm,
        overview.tempo_changes
    );
    for track in &overview.tracks {
        let lead = if overview.lead_track == Some(track.index) { " (lead)" } else { "" };
        match track.average_pitch {
            Some(average) => info!(
                "[{}] '{}': {} note(s), average pitch {:.1}{}",
                track.index,
                track.name.as_deref().unwrap_or("<unnamed>"),
                track.notes,
                average,
                lead
            ),
            None => info!(
                "[{}] '{}': no notes",
                track.index,
                track.name.as_deref().unwrap_or("<unnamed>")
            ),
        }
    }

    Ok(())
}

fn run_check(path: &Path) -> Result<()> {
    info!("Checking chart file: '{}'...", path.display());
    let chart = read_chart_file(path)?;

    info!(
        "Chart '{}' by '{}': {} tempo(s), {} QA marker(s)..!",
        chart.metadata.name,
        chart.metadata.artist,
        chart.sync_track.len(),
        chart.qa_markers.len()
    );
    for track in &chart.tracks {
        info!("[{}] {} note(s)", track.name, track.notes.len());
    }

    let text = serialize_chart(&chart)?;
    let reparsed = parse_chart(&text)?;
    if reparsed != chart {
        bail!("Chart did not survive a write/read round-trip..!");
    }

    info!("Round-trip OK..!");
    Ok(())
}

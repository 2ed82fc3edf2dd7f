use crate::model::chart::{DEFAULT_BPM, DEFAULT_RESOLUTION, Difficulty};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "hookchart",
    about = "Turn a MIDI melody into a five-lane rhythm game chart!"
)]
pub struct Args {
    /// Prints extra information to the terminal.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a MIDI file into a .chart file.
    Convert(ConvertArgs),

    /// Parse a .chart file and verify that it survives a write/read round-trip.
    Check {
        /// Path to the target .chart file.
        chart: PathBuf,
    },

    /// List the tracks and tempo of a MIDI file without converting it.
    Inspect {
        /// Path to the source MIDI file.
        midi: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct ConvertArgs {
    /// Path to the source MIDI file.
    pub midi: PathBuf,

    /// Where to write the .chart file. Defaults to the MIDI path with a .chart extension.
    pub output: Option<PathBuf>,

    /// Song name. Defaults to the MIDI file stem.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub artist: Option<String>,

    #[arg(long)]
    pub charter: Option<String>,

    /// Index of the MIDI track holding the melody. Auto-detected when omitted.
    #[arg(long)]
    pub track: Option<usize>,

    /// Transpose in semitones (positive or negative).
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub transpose: i32,

    /// Polyphony reduction policy: highest|lowest|loudest.
    #[arg(short, long, default_value = "highest")]
    pub policy: String,

    /// Whether to merge consecutive midi events for the same pitch when reducing
    /// the track to monophony.
    #[arg(short, long, default_value_t = false)]
    pub merge_midi: bool,

    /// YAML file overriding the default conversion settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print an ASCII preview of the lane assignment.
    #[arg(long, default_value_t = false)]
    pub preview: bool,

    /// Leave QA markers out of the [Events] section.
    #[arg(long, default_value_t = false)]
    pub no_qa: bool,
}

/// Knobs for the pitch-to-lane stages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    /// A gap at least this long between two notes starts a new phrase.
    pub silence_threshold_ms: f64,
    pub max_lane_jump: u8,
    pub smoothing_passes: u32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 500.0,
            max_lane_jump: 2,
            smoothing_passes: 1,
        }
    }
}

/// How far pitch and lane must disagree before a direction marker is raised.
/// Zero means any strict disagreement is reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct QaConfig {
    pub pitch_slack: u32,
    pub lane_slack: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConvertConfig {
    pub mapping: MappingConfig,
    pub qa: QaConfig,
    pub resolution: u32,
    /// Tempo used when the source carries no tempo information.
    pub default_bpm: f64,
    /// Notes shorter than this many beats get no sustain.
    pub min_sustain_beats: f64,
    pub difficulties: Vec<Difficulty>,
    pub charter: String,
    pub include_qa: bool,
    pub lead_track_patterns: Vec<String>,
    /// Write a 4/4 time signature at tick 0.
    pub default_time_signature: bool,
    /// Write a `section intro` event at tick 0.
    pub intro_section: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            mapping: MappingConfig::default(),
            qa: QaConfig::default(),
            resolution: DEFAULT_RESOLUTION,
            default_bpm: DEFAULT_BPM,
            min_sustain_beats: 0.5,
            difficulties: vec![Difficulty::Expert],
            charter: String::from("Auto-Generated"),
            include_qa: true,
            lead_track_patterns: ["lead", "melody", "vocal", "synth"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_time_signature: true,
            intro_section: true,
        }
    }
}

impl ConvertConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.as_ref().display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty document is a valid "all defaults" config.
        let config: ConvertConfig = if text.trim().is_empty() {
            ConvertConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            bail!("resolution must be greater than 0..!");
        }
        if !(self.default_bpm.is_finite() && self.default_bpm > 0.0) {
            bail!("default_bpm must be positive, got {}..!", self.default_bpm);
        }
        if !(self.mapping.silence_threshold_ms >= 0.0) {
            bail!(
                "silence_threshold_ms must not be negative, got {}..!",
                self.mapping.silence_threshold_ms
            );
        }
        if self.mapping.max_lane_jump == 0 {
            bail!("max_lane_jump must be at least 1..!");
        }
        if !(self.min_sustain_beats >= 0.0) {
            bail!("min_sustain_beats must not be negative..!");
        }
        if self.difficulties.is_empty() {
            bail!("at least one difficulty is required..!");
        }

        Ok(())
    }
}

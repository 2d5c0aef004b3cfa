//! Pipeline options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::{BoxMergerConfig, ParagraphConfig, MAX_SWEEPS};
use crate::model::Source;
use crate::package::PackageOptions;
use crate::reconcile::{ChainGuardConfig, PositionMergeConfig, ScrubConfig};

/// Options for running the pipeline over documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Box merger override; `None` uses the preset for the detected origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_merger: Option<BoxMergerConfig>,

    /// Geometry guard thresholds for suggested merges
    pub chain_guard: ChainGuardConfig,

    /// Paragraph grouping tolerances
    pub paragraph: ParagraphConfig,

    /// Position merging thresholds
    pub position: PositionMergeConfig,

    /// Scrub index and glyph collapsing settings
    pub scrub: ScrubConfig,

    /// Packaged views and JSON layout
    pub package: PackageOptions,

    /// Residual sweeps allowed after redaction (capped at 5)
    pub max_purge_sweeps: u32,

    /// Time allowed for one suggester call, in milliseconds (0 = unbounded)
    pub suggester_timeout_ms: u64,

    /// Stream marked authoritative over its feeder streams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authoritative_source: Option<Source>,

    /// Feeders of the authoritative stream; `None` uses [`Source::feeders`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authoritative_feeders: Option<Vec<Source>>,

    /// Year applied to dates printed without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_year: Option<i32>,

    /// Process batches on the rayon pool
    pub parallel: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            box_merger: None,
            chain_guard: ChainGuardConfig::default(),
            paragraph: ParagraphConfig::default(),
            position: PositionMergeConfig::default(),
            scrub: ScrubConfig::default(),
            package: PackageOptions::default(),
            max_purge_sweeps: MAX_SWEEPS,
            suggester_timeout_ms: 30_000,
            authoritative_source: None,
            authoritative_feeders: None,
            reference_year: None,
            parallel: true,
        }
    }
}

impl PipelineOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON string; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Override the box merger configuration.
    pub fn with_box_merger(mut self, config: BoxMergerConfig) -> Self {
        self.box_merger = Some(config);
        self
    }

    /// Set the geometry guard thresholds.
    pub fn with_chain_guard(mut self, config: ChainGuardConfig) -> Self {
        self.chain_guard = config;
        self
    }

    /// Set the scrub configuration.
    pub fn with_scrub(mut self, config: ScrubConfig) -> Self {
        self.scrub = config;
        self
    }

    /// Set the packaging options.
    pub fn with_package(mut self, options: PackageOptions) -> Self {
        self.package = options;
        self
    }

    /// Set the suggester timeout in milliseconds.
    pub fn with_suggester_timeout_ms(mut self, ms: u64) -> Self {
        self.suggester_timeout_ms = ms;
        self
    }

    /// Mark a stream authoritative over its feeders.
    pub fn with_authoritative_source(mut self, source: Source) -> Self {
        self.authoritative_source = Some(source);
        self
    }

    /// Override which streams feed the authoritative one.
    pub fn with_authoritative_feeders(mut self, feeders: Vec<Source>) -> Self {
        self.authoritative_feeders = Some(feeders);
        self
    }

    /// Streams excluded when `source` is authoritative and produced output.
    pub fn feeders_of(&self, source: Source) -> Vec<Source> {
        let feeders = match &self.authoritative_feeders {
            Some(feeders) => feeders.clone(),
            None => source.feeders().to_vec(),
        };
        feeders.into_iter().filter(|s| *s != source).collect()
    }

    /// Set the reference year for partial dates.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Enable or disable parallel batches.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel batches.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check that thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("chain_guard.min_ref_height", self.chain_guard.min_ref_height),
            ("paragraph.line_y_delta", self.paragraph.line_y_delta),
            ("scrub.cell_size", self.scrub.cell_size),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }

        let threshold = self.position.overlap_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!(
                "position.overlap_threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        if let Some(box_merger) = &self.box_merger {
            if box_merger.merge_threshold < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "box_merger.merge_threshold must not be negative, got {}",
                    box_merger.merge_threshold
                )));
            }
        }

        Ok(())
    }
}

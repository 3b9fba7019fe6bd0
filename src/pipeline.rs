use serde::Serialize;
use tracing::{error, info, warn};

use crate::channels::SourceEndpoint;
use crate::classifier::Classifier;
use crate::error::PipelineError;
use crate::fetcher::Fetcher;
use crate::metrics::{self, CHANNELS_WRITTEN};
use crate::parser::PlaylistParser;
use crate::selector::select_best;
use crate::settings::Settings;
use crate::validator::StreamValidator;
use crate::writer::{PlaylistWriter, WriteReport};

/// Counts from one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub endpoints: usize,
    pub documents: usize,
    pub entries_extracted: usize,
    pub channels_parsed: usize,
    pub candidates_parsed: usize,
    pub candidates_probed: usize,
    pub sources_validated: usize,
    pub channels_selected: usize,
    pub output: WriteReport,
}

/// One fetch, parse, validate, select, classify and write pass. Every stage
/// finishes before the next starts; an empty stage result aborts the run
/// before anything is written.
pub struct Pipeline {
    endpoints: Vec<SourceEndpoint>,
    fetcher: Fetcher,
    parser: PlaylistParser,
    validator: StreamValidator,
    max_candidates_per_channel: usize,
    best_count: usize,
    classifier: Classifier,
    writer: PlaylistWriter,
    metrics_textfile: Option<std::path::PathBuf>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        let Settings {
            sources,
            fetch,
            validate,
            select,
            filter,
            categories,
            output,
            metrics: metrics_config,
        } = settings;

        Ok(Self {
            endpoints: sources.iter().map(|s| SourceEndpoint::parse(s)).collect(),
            fetcher: Fetcher::new(fetch)?,
            parser: PlaylistParser::new(filter),
            max_candidates_per_channel: validate.max_candidates_per_channel,
            validator: StreamValidator::new(validate)?,
            best_count: select.best_count,
            classifier: Classifier::new(categories),
            writer: PlaylistWriter::new(output),
            metrics_textfile: metrics_config.textfile,
        })
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let result = self.run_stages().await;
        match &result {
            Ok(summary) => info!(
                "Update finished: {} channels, {} sources, {:.2} KiB written to {}",
                summary.output.derived_channel_count,
                summary.output.sources,
                summary.output.bytes as f64 / 1024.0,
                summary.output.path.display()
            ),
            Err(e) => error!(
                "Update failed, {} left untouched: {}",
                self.writer.path().display(),
                e
            ),
        }

        if let Some(path) = &self.metrics_textfile {
            if let Err(e) = metrics::write_textfile(path).await {
                warn!("Failed to write metrics to {}: {}", path.display(), e);
            }
        }
        result
    }

    async fn run_stages(&self) -> Result<RunSummary, PipelineError> {
        info!("1. Fetching {} playlist sources", self.endpoints.len());
        let documents = self.fetcher.fetch_all(&self.endpoints).await;
        if documents.is_empty() {
            return Err(PipelineError::NoSources {
                endpoints: self.endpoints.len(),
            });
        }
        let fetched = documents.len();
        info!("Fetched {}/{} sources", fetched, self.endpoints.len());

        info!("2. Parsing and filtering channels");
        let (candidates, stats) = self.parser.parse(&documents);
        drop(documents);
        if candidates.is_empty() {
            return Err(PipelineError::NoChannels);
        }

        let to_probe = candidates.candidates(self.max_candidates_per_channel);
        let probed = to_probe.len();
        info!(
            "3. Probing {} streams (at most {} per channel)",
            probed, self.max_candidates_per_channel
        );
        let validated = self.validator.validate_all(to_probe).await;
        if validated.is_empty() {
            return Err(PipelineError::NoValidStreams { probed });
        }
        info!("{} of {} streams are playable", validated.len(), probed);

        info!("4. Keeping the best {} sources per channel", self.best_count);
        let selected = select_best(&validated, self.best_count);
        let channels_selected = selected.len();

        info!("5. Writing playlist");
        let entries = self.classifier.classify_all(selected);
        let output = self
            .writer
            .write(&entries, &self.classifier.category_order())
            .await?;
        CHANNELS_WRITTEN.set(output.channels as i64);

        Ok(RunSummary {
            endpoints: self.endpoints.len(),
            documents: fetched,
            entries_extracted: stats.extracted,
            channels_parsed: candidates.channel_count(),
            candidates_parsed: candidates.candidate_count(),
            candidates_probed: probed,
            sources_validated: validated.len(),
            channels_selected,
            output,
        })
    }
}

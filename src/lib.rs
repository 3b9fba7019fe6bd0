pub mod channels;
pub mod classifier;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod selector;
pub mod settings;
pub mod validator;
pub mod writer;

pub use channels::{ChannelEntry, SourceEndpoint, ValidatedSource};
pub use error::PipelineError;
pub use pipeline::{Pipeline, RunSummary};
pub use settings::Settings;

/// Runs a single update pass with the given settings.
pub async fn update_playlist(settings: Settings) -> Result<RunSummary, PipelineError> {
    let pipeline = Pipeline::new(settings).map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;
    pipeline.run().await
}

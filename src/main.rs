use hemmer_provider_launchpad::provider::PROVIDER_NAME;
use hemmer_provider_launchpad::{init_logging, serve, LaunchpadProvider};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let provider = LaunchpadProvider::from_env();
    info!(
        provider = PROVIDER_NAME,
        version = provider.version(),
        testing_mode = provider.is_testing_mode(),
        "Starting provider"
    );

    serve(provider).await
}

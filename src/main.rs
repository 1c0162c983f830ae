use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quotacast::App;
use quotacast_core::config::{Config, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    // Run the command
    let app = App::new(settings);
    app.run(&cli.command).await
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("quotacast=debug,quotacast_core=debug")
    } else {
        EnvFilter::new("quotacast=info,quotacast_core=info")
    };

    // Reports go to stdout; keep logs on stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

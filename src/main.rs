use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

#[tokio::main]
async fn main() {
    let (config, debug) = match cli::run() {
        cli::RunOutcome::Serve { config, debug } => (config, debug),
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    };

    setup_logging(debug);

    if let Err(err) = groupmeter::serve(config).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}

fn setup_logging(debug: bool) {
    let default_directive = if debug {
        "groupmeter=debug"
    } else {
        "groupmeter=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

use clap::Parser;
use migrator::usecases::combine_subscriptions::MigrationReport;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "combine-subscriptions")]
#[command(
    about = "Combine several Stripe subscriptions of one customer into a single subscription",
    long_about = None
)]
struct Cli {
    /// Subscription IDs to combine (2 to 20)
    #[arg(value_name = "SUBSCRIPTION_ID", required = true)]
    ids: Vec<String>,

    /// Stripe API key
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    key: String,

    /// Combine the subscriptions; without this flag nothing is changed
    #[arg(long, default_value_t = false)]
    run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(error) = crates::observability::init_observability("combine-subscriptions") {
        eprintln!("failed to initialize logging: {error:#}");
        std::process::exit(1);
    }

    match migrator::run(&cli.ids, cli.key, cli.run).await {
        Ok(report) => summarize(&report),
        Err(error) => {
            error!("combine-subscriptions exited with error: {:#}", error);
            // Printed unconditionally; RUST_LOG may filter the log line out.
            eprintln!("{}", failure_message(&error));
            std::process::exit(1);
        }
    }
}

fn summarize(report: &MigrationReport) {
    info!(
        mode = mode(report),
        primary = report.primary.as_deref().unwrap_or("-"),
        ignored = report.ignored.len(),
        updates = report.update_count(),
        cancellations = report.cancel_count(),
        applied_calls = report.applied_count(),
        "combine-subscriptions finished"
    );
    println!("{}", summary_line(report));
}

fn mode(report: &MigrationReport) -> &'static str {
    if report.apply { "applied" } else { "dry-run" }
}

fn summary_line(report: &MigrationReport) -> String {
    format!(
        "{}: primary={} ignored={} updates={} cancellations={} applied_calls={}",
        mode(report),
        report.primary.as_deref().unwrap_or("-"),
        report.ignored.len(),
        report.update_count(),
        report.cancel_count(),
        report.applied_count()
    )
}

fn failure_message(error: &anyhow::Error) -> String {
    format!("error: {error:#}")
}

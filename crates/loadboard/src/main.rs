use clap::Parser;

#[tokio::main]
async fn main() {
    let args = loadboard::arguments::Arguments::parse();
    observe::tracing::initialize(&args.log_filter, args.log_stderr_threshold);
    observe::panic_hook::set_panic_hook();
    observe::metrics::setup_registry(Some("loadboard".to_string()), None);
    tracing::info!("running loadboard with validated arguments:\n{}", args);
    loadboard::run(args).await;
}

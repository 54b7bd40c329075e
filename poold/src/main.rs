use pool_core::{error, info, log::init_logger, panic::configure_panic};
use poold_lib::{args::parse_args, daemon::Daemon};

#[tokio::main]
async fn main() {
    let args = parse_args();

    if let Err(err) = init_logger(args.log_dir(), &args.log_level) {
        eprintln!("{err}");
        std::process::exit(1);
    }
    configure_panic();
    info!("{} v{} starting", env!("CARGO_PKG_DESCRIPTION"), env!("CARGO_PKG_VERSION"));

    let daemon = match Daemon::bind(&args).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!("{}", err);
            ::log::logger().flush();
            std::process::exit(1);
        }
    };
    daemon.start().await;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(err) => error!("Unable to listen for the shutdown signal: {}", err),
    }
}

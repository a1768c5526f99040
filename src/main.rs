use clap::Parser;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` applies only when no `-v` is given.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,bioclients=info")),
        1 => EnvFilter::new("warn,bioclients=debug"),
        _ => EnvFilter::new("warn,bioclients=trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = bioclients::cli::Cli::parse();
    init_tracing(cli.verbose);

    match bioclients::cli::run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            if let Some(bio_err) = err.downcast_ref::<bioclients::error::BioClientsError>() {
                eprintln!("Error: {bio_err}");
            } else {
                eprintln!("Error: {err:#}");
            }
            std::process::ExitCode::from(1)
        }
    }
}

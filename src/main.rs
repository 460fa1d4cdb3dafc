use clap::Parser;
use particle_ingest::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    // Route tracing output to stderr so particle JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Create async runtime and run the main command logic with signal handling
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        // Create cancellation token for coordinating graceful shutdown
        let cancellation_token = CancellationToken::new();

        // Set up graceful shutdown handling
        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");

            // Cancel all operations when Ctrl+C is received
            cancellation_token.cancel();
        };

        // Run the main command with cancellation support
        tokio::select! {
            result = commands::run(args, cancellation_token.clone()) => {
                result
            }
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, shutting down gracefully...");
                Err(particle_ingest::Error::configuration(
                    "Ingestion interrupted by user".to_string(),
                ))
            }
        }
    });

    match result {
        Ok(_stats) => {
            // Success - stats have already been reported by the command
            process::exit(0);
        }
        Err(error) => {
            // Error occurred - print to stderr and exit with error code
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Particle Ingest - Oceanographic Telemetry Converter");
    println!("===================================================");
    println!();
    println!("Convert raw instrument telemetry (glider segments, SIO blocks, CSPP");
    println!("uplinks, live packet captures) into structured particle records.");
    println!();
    println!("USAGE:");
    println!("    particle-ingest <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    process     Parse a telemetry file and emit particles as JSON lines");
    println!("    validate    Dry-run a telemetry file and report parse statistics");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    particle-ingest process -i segment.mrg -f glider");
    println!("    particle-ingest process -i node10.sio -f sio --follow");
    println!("    particle-ingest validate -i capture.bin -f packet");
    println!();
    println!("For detailed help on a command:");
    println!("    particle-ingest help <COMMAND>");
}

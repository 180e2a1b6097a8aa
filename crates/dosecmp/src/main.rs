use clap::{Parser, Subcommand};
use dosecmp::{GammaArgs, InspectArgs, JacobianArgs, init_logging};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dosecmp")]
#[command(about = "Gamma dose comparison and Jacobian deformation analysis")]
struct Args {
    /// Log level (debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Worker threads for the analysis (default: one per core)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two dose volumes with the gamma index
    Gamma(GammaArgs),
    /// Compute the Jacobian determinant of a displacement field
    Jacobian(JacobianArgs),
    /// List the volumes in a scene document
    Inspect(InspectArgs),
}

#[cfg(feature = "parallel")]
fn configure_threads(threads: Option<usize>) -> color_eyre::Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
        tracing::debug!(threads, "Configured analysis thread pool");
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn configure_threads(threads: Option<usize>) -> color_eyre::Result<()> {
    if threads.is_some() {
        tracing::warn!("Built without the parallel feature; --threads is ignored");
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(args.log_file.as_deref(), &args.log_level)?;
    configure_threads(args.threads)?;

    match &args.command {
        Command::Gamma(gamma) => println!("{}", dosecmp::run_gamma(gamma)?),
        Command::Jacobian(jacobian) => println!("{}", dosecmp::run_jacobian(jacobian)?),
        Command::Inspect(inspect) => {
            for volume in dosecmp::run_inspect(inspect)? {
                println!("{volume}");
            }
        }
    }

    tracing::info!("dosecmp finished");
    Ok(())
}

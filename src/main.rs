use clap::Parser;
use tracing_subscriber::EnvFilter;

mod accession;
mod cli;
mod clustering;
mod core;
mod lifecycle;
mod parsing;
mod pipeline;
mod recovery;
mod store;
mod utils;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("variant_accession=debug,info")
    } else {
        EnvFilter::new("variant_accession=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Accession(args) => {
            let code = cli::accession::run(args, cli.format, cli.verbose)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        cli::Commands::Recover(args) => {
            cli::recover::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Deprecate(args) => {
            cli::deprecate::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Remap(args) => {
            cli::remap::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::MergeDuplicates(args) => {
            cli::merge::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Show(args) => {
            cli::show::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}

//! spibind: generate scripting bindings for native Api/Spi libraries.

mod commands;
mod manifest;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use commands::generate::GenerateArgs;
use manifest::SpibindManifest;

#[derive(Parser)]
#[command(name = "spibind", version, about = "Bindings for native Api/Spi callback libraries")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the binding module
    Generate {
        /// Declaration file (.bind.toml); defaults to the manifest's
        decl: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Module name (defaults to the library name)
        #[arg(short, long)]
        module_name: Option<String>,
        /// Regex of symbols to leave out (repeatable)
        #[arg(short, long = "ignore-name")]
        ignore_name: Vec<String>,
        /// Regex of interface methods that are not overridable (repeatable)
        #[arg(long = "no-callback-name")]
        no_callback_name: Vec<String>,
        /// Skip methods with unsupported types instead of failing
        #[arg(long)]
        ignore_unsupported: bool,
        /// Prefix removed from exposed class and struct names
        #[arg(long)]
        strip_prefix: Option<String>,
        /// Leave declared constants out of the module
        #[arg(long)]
        no_constants: bool,
        /// Leave out every symbol whose name starts with an underscore
        #[arg(long)]
        ignore_underline_prefixed: bool,
        /// Line budget per generated file (minimum 200)
        #[arg(long)]
        max_lines_per_file: Option<usize>,
        /// Keep existing files in the output directory
        #[arg(long)]
        no_clear_output: bool,
    },
    /// Describe the classes and records a declaration file exposes
    Inspect {
        decl: Option<PathBuf>,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Validate declarations and generation without writing files
    Check { decl: Option<PathBuf> },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact().with_filter(filter))
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let (manifest, project_dir) = match SpibindManifest::find_and_load(&cwd)? {
        Some((manifest, dir)) => (manifest, dir),
        None => (SpibindManifest::default(), cwd.clone()),
    };
    let config = manifest.generator();

    match cli.command {
        Commands::Generate {
            decl,
            output,
            module_name,
            ignore_name,
            no_callback_name,
            ignore_unsupported,
            strip_prefix,
            no_constants,
            ignore_underline_prefixed,
            max_lines_per_file,
            no_clear_output,
        } => {
            let decl = commands::resolve_declarations(decl.as_deref(), &config, &project_dir)?;
            let args = GenerateArgs {
                output,
                module_name,
                ignore_names: ignore_name,
                no_callback_names: no_callback_name,
                ignore_unsupported,
                strip_prefix,
                no_constants,
                ignore_underline_prefixed,
                max_lines_per_file,
                no_clear_output,
            };
            commands::generate::run(&decl, &config, &project_dir, &args).map(|_| ())
        }

        Commands::Inspect { decl, format } => {
            let decl = commands::resolve_declarations(decl.as_deref(), &config, &project_dir)?;
            commands::inspect::run(&decl, &config.options, &format)
        }

        Commands::Check { decl } => {
            let decl = commands::resolve_declarations(decl.as_deref(), &config, &project_dir)?;
            commands::check::run(&decl, &config.options)
        }
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn parse_generate_flags() {
        let cli = Cli::try_parse_from([
            "spibind",
            "-vv",
            "generate",
            "ctp.bind.toml",
            "-o",
            "out",
            "-i",
            ".*::GetHandle",
            "-i",
            "CThostFtdcQry.*",
            "--ignore-unsupported",
            "--no-constants",
            "--ignore-underline-prefixed",
            "--max-lines-per-file",
            "300",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Generate {
                decl,
                output,
                ignore_name,
                ignore_unsupported,
                no_constants,
                ignore_underline_prefixed,
                max_lines_per_file,
                no_clear_output,
                ..
            } => {
                assert_eq!(decl, Some(PathBuf::from("ctp.bind.toml")));
                assert_eq!(output, Some(PathBuf::from("out")));
                assert_eq!(ignore_name.len(), 2);
                assert!(ignore_unsupported);
                assert!(no_constants);
                assert!(ignore_underline_prefixed);
                assert_eq!(max_lines_per_file, Some(300));
                assert!(!no_clear_output);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn inspect_defaults_to_text() {
        let cli = Cli::try_parse_from(["spibind", "inspect", "x.bind.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect { ref format, .. } if format == "text"));
    }
}

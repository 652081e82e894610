//! buildplan CLI
//!
//! Entry point for the `buildplan` command-line tool.

use std::path::PathBuf;
use std::process;

use buildplan::{ConfigError, EffectivePlan, OsFileSystem, PlanRequest, ProcessEnv, ResolverSettings};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "buildplan")]
#[command(about = "Resolve layered build descriptors into a build plan", version)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve descriptors and print the effective plan
    Resolve {
        #[command(flatten)]
        input: InputArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Leave secret values unredacted
        #[arg(long)]
        show_secrets: bool,

        /// Write the plan to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Resolve descriptors and print a short summary
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Descriptor files or directories, lowest precedence first
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Local override descriptor (default: $BUILDPLAN_OVERRIDE)
    #[arg(long = "override")]
    override_path: Option<PathBuf>,

    /// Additional required key (dotted path); may be repeated
    #[arg(long = "require")]
    require: Vec<String>,

    /// Do not start from the built-in defaults
    #[arg(long)]
    no_defaults: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Toml,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve {
            input,
            format,
            show_secrets,
            output,
        } => {
            let request = input.into_request().show_secrets(show_secrets);
            run_resolve(&request, format, output);
        }
        Commands::Check { input } => {
            run_check(&input.into_request());
        }
    }
}

impl InputArgs {
    fn into_request(self) -> PlanRequest {
        let settings = self
            .require
            .into_iter()
            .fold(ResolverSettings::default(), |settings, key| {
                settings.with_required_key(key)
            });

        let mut request = PlanRequest::new(self.paths).with_settings(settings);
        if let Some(path) = self.override_path {
            request = request.with_override(path);
        }
        if self.no_defaults {
            request = request.without_defaults();
        }
        request
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("buildplan=debug,buildplan_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_plan(request: &PlanRequest) -> EffectivePlan {
    match EffectivePlan::build(request, &OsFileSystem, &ProcessEnv) {
        Ok(plan) => plan,
        Err(e) => fail(&e),
    }
}

fn run_resolve(request: &PlanRequest, format: OutputFormat, output: Option<PathBuf>) {
    let plan = build_plan(request);

    let rendered = match format {
        OutputFormat::Json => plan.to_json().map_err(|e| e.to_string()),
        OutputFormat::Toml => plan.to_toml().map_err(|e| e.to_string()),
    };
    let rendered = match rendered {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("Error writing {}: {}", path.display(), e);
                process::exit(1);
            }
            eprintln!("Wrote plan to {}", path.display());
        }
        None => println!("{}", rendered),
    }
}

fn run_check(request: &PlanRequest) {
    let plan = build_plan(request);
    print!("{}", plan.to_human());
    println!("\nPlan OK.");
}

fn fail(error: &ConfigError) -> ! {
    eprintln!("error[{}]: {}", error.kind(), error);
    process::exit(1);
}

use clap::{Parser, Subcommand, ValueEnum};
use sitegrab_lib::CleaningPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitegrab")]
#[command(
    version,
    about = "Sitegrab - Capture screenshots and a cleaned HTML skeleton of a web page",
    long_about = "Sitegrab\n\nModes:\n- capture: render a URL in a headless browser, save desktop/mobile full-page screenshots and the cleaned markup.\n- clean: reduce an HTML file (or stdin) to its structural skeleton.\n- clone: capture a URL and ask a generator backend to rebuild it as a single HTML file.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML); defaults to ./sitegrab.toml when present. CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture screenshots and markup of a web page
    Capture {
        #[arg(long, help = "Page to capture (http or https)")]
        url: String,

        #[arg(
            long,
            value_name = "DIR",
            help = "Directory for screenshots and markup; created if missing (temp dir if omitted)"
        )]
        out: Option<PathBuf>,

        #[arg(long, value_name = "N", help = "Capture attempts before giving up")]
        attempts: Option<u32>,

        #[arg(long, value_enum, help = "Cleaning policy for the saved markup")]
        policy: Option<PolicyArg>,

        #[arg(long, short, help = "Write the JSON report to this file (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    /// Clean an HTML document down to its structural skeleton
    Clean {
        #[arg(long, value_name = "FILE", help = "HTML file to clean (stdin if omitted)")]
        input: Option<PathBuf>,

        #[arg(long, value_enum, help = "Cleaning policy")]
        policy: Option<PolicyArg>,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    /// Capture a web page and rebuild it with a generator backend
    Clone {
        #[arg(long, help = "Page to clone (http or https)")]
        url: String,

        #[arg(
            long,
            short,
            help = "Write the generated HTML to this file (JSON status is printed to stdout)"
        )]
        output: Option<PathBuf>,

        #[arg(long, value_name = "N", help = "Capture attempts before giving up")]
        attempts: Option<u32>,

        #[arg(long, value_enum, help = "Cleaning policy for the generator context")]
        policy: Option<PolicyArg>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Structure,
    Fidelity,
}

impl From<PolicyArg> for CleaningPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Structure => CleaningPolicy::Structure,
            PolicyArg::Fidelity => CleaningPolicy::Fidelity,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "nutriload",
    version,
    about = "Nutrition and exercise reference-data ingestion tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Probe(ProbeArgs),
    Package(PackageArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = ".cache/nutriload")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    pub db_path: Option<String>,

    #[arg(long)]
    pub foundation_path: Option<PathBuf>,

    #[arg(long)]
    pub survey_path: Option<PathBuf>,

    #[arg(long)]
    pub legacy_path: Option<PathBuf>,

    #[arg(long)]
    pub branded_path: Option<PathBuf>,

    #[arg(long)]
    pub exercises_path: Option<PathBuf>,

    #[arg(long = "source", value_enum)]
    pub sources: Vec<SourceKind>,

    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub package: bool,

    #[arg(long, default_value = "prisma/nutrition.db")]
    pub runtime_db_path: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum SourceKind {
    Foundation,
    Survey,
    Legacy,
    Branded,
    Exercises,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Survey => "survey",
            Self::Legacy => "legacy",
            Self::Branded => "branded",
            Self::Exercises => "exercises",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    #[arg(long, default_value = ".cache/nutriload")]
    pub cache_root: PathBuf,

    #[arg(long, default_value_t = 1024 * 1024)]
    pub prefix_bytes: usize,

    #[arg(long, default_value_t = 4)]
    pub max_depth: usize,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    #[arg(long, default_value = ".cache/nutriload")]
    pub cache_root: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    pub db_path: Option<String>,

    #[arg(long)]
    pub dist_dir: Option<PathBuf>,

    #[arg(long, default_value = "prisma/nutrition.db")]
    pub runtime_db_path: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/nutriload")]
    pub cache_root: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    pub db_path: Option<String>,
}

//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Deepview Gateway - answer questions about a packed codebase corpus
#[derive(Parser, Debug)]
#[command(name = "deepview-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Corpus file to load at startup and serve as the default
    #[arg(value_name = "CODEBASE_FILE")]
    pub codebase_file: Option<PathBuf>,

    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DEEPVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DEEPVIEW_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "DEEPVIEW_HOST")]
    pub host: Option<String>,

    /// Gemini model to use
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DEEPVIEW_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DEEPVIEW_LOG_FORMAT")]
    pub log_format: Option<String>,
}

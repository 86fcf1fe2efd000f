use clap::Parser;
use std::path::PathBuf;

/// Student marks sidecar. Speaks newline-delimited JSON on stdin/stdout.
#[derive(Debug, Clone, Parser)]
#[command(name = "marksd", version, about)]
pub struct Config {
    /// Workspace directory to open at startup. Clients may also pick one
    /// later with `workspace.select`.
    #[arg(long, env = "MARKSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// tracing filter directive for stderr logging.
    #[arg(long, env = "MARKSD_LOG", default_value = "marksd=info")]
    pub log_filter: String,
}

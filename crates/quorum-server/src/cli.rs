use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "quorum-server", version, about = "Group scheduling service")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "quorum.toml")]
    pub config: String,
}

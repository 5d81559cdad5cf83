//! Subcommands, in the style of `control::cmd` — currently just `serve`,
//! since this gateway has no migrations or seed data to manage.

pub mod serve;

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Path to an optional config file (TOML/YAML/JSON, inferred from its
    /// extension) layered on top of the built-in defaults.
    #[arg(long = "config")]
    pub config_path: Option<std::path::PathBuf>,
}

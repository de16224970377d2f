use std::path::PathBuf;

use clap::Parser;

use omnigate_common::{ConfigOverrides, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "omnigate", version, about)]
pub(crate) struct Cli {
    /// JSON config file. A missing file means all defaults.
    #[arg(long, env = "OMNIGATE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub(crate) config: PathBuf,
    #[arg(long)]
    pub(crate) host: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Outbound proxy for every upstream call.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
    /// Enables the per-request log directory.
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
}

impl Cli {
    pub(crate) fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            proxy: self.proxy.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

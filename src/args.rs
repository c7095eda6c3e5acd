use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The http:// or https:// URL of the file to download.
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Where to save the download. An existing directory keeps the name from the URL,
    /// any other path is used as the output file.
    #[arg(value_name = "FILE|DIR")]
    pub output: Option<PathBuf>,

    /// Parameters passed to the downloaded program, joined with single spaces.
    #[arg(value_name = "PARAM", trailing_var_arg = true, allow_hyphen_values = true)]
    pub params: Vec<String>,

    /// User agent to use for the request. Overrides the settings file.
    #[arg(short = 'U', long)]
    pub user_agent: Option<String>,

    #[arg(long, value_name = "(http(s)|socks)://")]
    pub proxy: Option<String>,

    /// Directory holding config.toml. Defaults to the platform config dir.
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

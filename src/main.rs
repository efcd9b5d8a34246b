use clap::Parser;
use remrec::cli::{Cli, Command};
use remrec::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Some(Command::Devices) = cli.command {
        for name in remrec::audio::capture::list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)?.with_env_overrides();
    if let Some(dir) = cli.dir {
        config.storage.dir = dir;
    }
    if let Some(device) = cli.device {
        config.audio.device = Some(device);
    }

    info!("{}", remrec::version_string());
    remrec::app::run(config)
}

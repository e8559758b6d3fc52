//! `finchat config`: Print the default configuration.

use finchat_config::AppConfig;

pub fn run() {
    print!("{}", render());
}

fn render() -> String {
    let path = AppConfig::config_dir().join("config.toml");
    format!("# {}\n\n{}", path.display(), AppConfig::default_toml())
}

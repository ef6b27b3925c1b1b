mod error;
mod logging;
mod mail_composer;
mod mail_sender;
mod settings;
mod storage;
mod upload_intake;
mod web;


use anyhow::Result;
use clap::{Arg, Command};
use log::info;
use std::path::Path;

fn cli() -> Command {
    Command::new("qrmail")
        .about("Compose and send emails with reusable attachments and templates")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .default_value(settings::DEFAULT_SETTINGS_PATH)
                .help("YAML settings file"),
        )
        .subcommand(Command::new("serve").about("Run the web server (default)"))
        .subcommand(
            Command::new("set-password").about("Encrypt and store the SMTP account password"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(settings::DEFAULT_SETTINGS_PATH);

    let config = settings::load_settings(Path::new(config_path))?;
    logging::init(&config.logging)?;

    match matches.subcommand() {
        Some(("set-password", _)) => {
            mail_sender::encryption::prompt_and_store(&config.credentials)?;
            info!("Password stored in {}", config.credentials.password_file.display());
            Ok(())
        }
        _ => web::entrypoint(&config).await,
    }
}

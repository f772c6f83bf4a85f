use std::process::ExitCode;

use clap::{ArgMatches, Command, arg, command, crate_name};
use client::UploadParams;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = build_cli().get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => {
            cli::version::run();
            ExitCode::SUCCESS
        }
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => {
            cli::bugreport::run();
            ExitCode::SUCCESS
        }
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await,
        Some((cli::UPLOAD_SUBCOMMAND, upload_matches)) => {
            let params = UploadParams {
                uri: value(upload_matches, "uri"),
                file: value(upload_matches, "file"),
                owner: value(upload_matches, "owner"),
            };
            cli::client::upload_photo(params).await
        }
        Some((cli::LIST_SUBCOMMAND, list_matches)) => {
            cli::client::list_photos(&value(list_matches, "uri")).await
        }
        Some((cli::SHOW_SUBCOMMAND, show_matches)) => {
            cli::client::show_photo(&value(show_matches, "uri"), &value(show_matches, "name"))
                .await
        }
        _ => ExitCode::FAILURE,
    }
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::UPLOAD_SUBCOMMAND)
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Intellipix URI"))
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Path to the photo to upload"),
                )
                .arg(
                    arg!(-o --owner <OWNER>)
                        .required(true)
                        .help("Identity the photo is uploaded as"),
                ),
        )
        .subcommand(
            Command::new(cli::LIST_SUBCOMMAND)
                .about(cli::LIST_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Intellipix URI")),
        )
        .subcommand(
            Command::new(cli::SHOW_SUBCOMMAND)
                .about(cli::SHOW_DESCRIPTION)
                .arg(arg!(-u --uri <URI>).required(true).help("Intellipix URI"))
                .arg(
                    arg!(-n --name <NAME>)
                        .required(true)
                        .help("File name of the photo"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

/// Value of a required argument; clap has already rejected its absence.
fn value(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

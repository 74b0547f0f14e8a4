pub mod cluster;
pub mod logging;
pub mod oauth;
pub mod session;
pub mod tls;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_HOST: &str = "host";
pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("gangway")
        .about("OIDC login gateway issuing cluster credentials")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_HOST)
                .long(ARG_HOST)
                .help("Address to listen on")
                .default_value("0.0.0.0")
                .env("GANGWAY_HOST"),
        )
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("GANGWAY_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = oauth::with_args(command);
    let command = tls::with_args(command);
    let command = session::with_args(command);
    let command = cluster::with_args(command);
    logging::with_args(command)
}

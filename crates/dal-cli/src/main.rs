//! `dal`: inspect and archive DAL documents from the command line

mod commands;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use dal_scope::{DalConfig, Workspaces, CONFIG_ENV};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn workspace_arg() -> Arg {
    Arg::new("workspace")
        .long("workspace")
        .short('w')
        .default_value("global")
        .help("Workspace to operate on")
}

fn cli() -> Command {
    Command::new("dal")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Schema-driven document store")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .env(CONFIG_ENV)
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("read")
                .about("Print a stored document")
                .arg(Arg::new("path").required(true).help("workspace/scope/ref[/version]")),
        )
        .subcommand(
            Command::new("relations")
                .about("List documents related to a document")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("depth")
                        .long("depth")
                        .default_value("1")
                        .value_parser(value_parser!(u32))
                        .help("Relation levels to follow"),
                )
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .action(ArgAction::Append)
                        .help("Only include and follow these scopes"),
                ),
        )
        .subcommand(
            Command::new("rebuild-indexes")
                .about("Recompute relation caches")
                .arg(workspace_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List stored documents")
                .arg(workspace_arg())
                .arg(Arg::new("scope").long("scope").help("Restrict to one scope")),
        )
        .subcommand(
            Command::new("versions")
                .about("List stored versions of a document")
                .arg(workspace_arg())
                .arg(Arg::new("scope").required(true))
                .arg(Arg::new("ref").required(true)),
        )
        .subcommand(
            Command::new("backup")
                .about("Archive documents and their relations")
                .arg(Arg::new("out").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("paths").required(true).num_args(1..))
                .arg(
                    Arg::new("shallow")
                        .long("shallow")
                        .action(ArgAction::SetTrue)
                        .help("Follow direct relations only"),
                ),
        )
        .subcommand(
            Command::new("restore")
                .about("Write archived documents back")
                .arg(Arg::new("archive").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(Command::new("workspaces").about("List workspaces"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DalConfig::load_toml(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => DalConfig::default(),
    };
    let mut workspaces = Workspaces::from_config(config).context("opening workspaces")?;

    let output = commands::run(&mut workspaces, &matches).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

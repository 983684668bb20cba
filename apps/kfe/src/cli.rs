//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{Context, bail};
use kfe_explorer::SettingsChange;
use kfe_transfer::Operation;

pub const USAGE: &str = "\
usage: kfe [--config <file>] <command>

commands:
  scan <device> [--json]                       list categories and items
  free <device>                                show free space
  move <dest-device> <category|-> <path>...    move items ('-' = uncategorized)
  copy <dest-device> <category|-> <path>...    copy items
  delete <path>...                             delete items
  enforce <device>                             apply the category naming scheme
  settings [prefix=on|off] [catsort=on|off] [uncategorized=on|off]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan { device: String, json: bool },
    Free { device: String },
    Transfer {
        op: Operation,
        device: String,
        category: String,
        paths: Vec<String>,
    },
    Delete { paths: Vec<String> },
    Enforce { device: String },
    Settings { change: SettingsChange },
    Help,
}

impl Command {
    /// Whether the command reads free space.
    pub fn needs_probe(&self) -> bool {
        matches!(self, Command::Free { .. } | Command::Transfer { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub command: Command,
}

/// Parses arguments, without the program name.
pub fn parse<I>(args: I) -> anyhow::Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut config = None;
    if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        config = Some(PathBuf::from(args.next().context("--config needs a path")?));
    }

    let Some(name) = args.next() else {
        return Ok(Cli {
            config,
            command: Command::Help,
        });
    };
    let rest: Vec<String> = args.collect();

    let command = match name.as_str() {
        "scan" => {
            let json = rest.iter().any(|a| a == "--json");
            let device = rest.iter().find(|a| *a != "--json").context("scan needs a device")?;
            Command::Scan {
                device: device_arg(device),
                json,
            }
        }
        "free" => Command::Free {
            device: device_arg(single(&rest, "free")?),
        },
        "enforce" => Command::Enforce {
            device: device_arg(single(&rest, "enforce")?),
        },
        "move" | "copy" => {
            let op = if name == "move" { Operation::Move } else { Operation::Copy };
            let [device, category, paths @ ..] = rest.as_slice() else {
                bail!("{name} needs a device, a category and at least one path");
            };
            if paths.is_empty() {
                bail!("{name} needs at least one path");
            }
            Command::Transfer {
                op,
                device: device_arg(device),
                category: if category == "-" { String::new() } else { category.clone() },
                paths: paths.to_vec(),
            }
        }
        "delete" => {
            if rest.is_empty() {
                bail!("delete needs at least one path");
            }
            Command::Delete { paths: rest }
        }
        "settings" => {
            let mut change = SettingsChange::default();
            for arg in &rest {
                let (key, value) = arg.split_once('=').context("settings take key=on|off")?;
                let on = match value {
                    "on" | "1" | "true" => true,
                    "off" | "0" | "false" => false,
                    other => bail!("invalid value for {key}: {other}"),
                };
                match key {
                    "prefix" => change.prefix = Some(on),
                    "catsort" => change.catsort = Some(on),
                    "uncategorized" => change.show_uncategorized = Some(on),
                    other => bail!("unknown setting: {other}"),
                }
            }
            Command::Settings { change }
        }
        "help" | "-h" | "--help" => Command::Help,
        other => bail!("unknown command: {other}"),
    };
    Ok(Cli { config, command })
}

fn single<'a>(rest: &'a [String], command: &str) -> anyhow::Result<&'a str> {
    match rest {
        [one] => Ok(one.as_str()),
        _ => bail!("{command} needs exactly one device"),
    }
}

/// Accepts `ms0`, `ms0:` and `ms0:/`.
fn device_arg(arg: &str) -> String {
    let name = arg.trim_end_matches('/').trim_end_matches(':');
    format!("{}:/", name.to_ascii_lowercase())
}

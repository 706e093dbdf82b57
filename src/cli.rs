use std::path::PathBuf;

use chrono::NaiveDate;

use crate::upload::VideoDraft;
use crate::validate::SignUpForm;

pub const HELP: &str = "iRecipes - Browse, like and share recipe videos from the terminal.

Usage:
  irecipes-tui [options]                      Open the feed
  irecipes-tui login <user-id>                Sign in and remember the account
  irecipes-tui logout                         Forget the signed-in account
  irecipes-tui whoami                         Show the signed-in account
  irecipes-tui signup --user-name <handle> --name <name> --email <email>
                      --password <password> --birth-date <YYYY-MM-DD>
                      --accept-terms [--taste <id>]...
  irecipes-tui upload <file> --title <title> --description <text>
                      --tag <tag> [--tag <tag>]... [--duration <seconds>]
  irecipes-tui edit-profile [--name <name>] [--user-name <handle>]
  irecipes-tui avatar <image>                 Upload a profile picture

Options:
  --video <id>         Open a single video instead of the feed
  --user <id>          Open a user's profile
  --offline            Use built-in sample data instead of the API
  --config <path>      Read configuration from <path>
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Browse,
    Video(String),
    Profile(String),
    Login(String),
    Logout,
    WhoAmI,
    SignUp(SignUpForm),
    Upload(VideoDraft),
    EditProfile {
        name: Option<String>,
        handle: Option<String>,
    },
    Avatar(PathBuf),
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: Command,
    pub offline: bool,
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("unknown argument: {0}")]
    Unknown(String),
    #[error("{0} needs a value")]
    MissingValue(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {flag}: {value}")]
    Invalid { flag: String, value: String },
}

struct Args {
    items: std::vec::IntoIter<String>,
}

impl Args {
    fn value(&mut self, flag: &str) -> Result<String, UsageError> {
        self.items
            .next()
            .filter(|value| !value.starts_with("--"))
            .ok_or_else(|| UsageError::MissingValue(flag.to_string()))
    }
}

pub fn parse<I>(args: I) -> Result<Invocation, UsageError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = Args {
        items: args.into_iter().collect::<Vec<_>>().into_iter(),
    };
    let mut invocation = Invocation {
        command: Command::Browse,
        offline: false,
        config_file: None,
    };
    let mut form = SignUpForm::default();
    let mut draft = VideoDraft::default();
    let mut name = None;
    let mut handle = None;
    let mut positional: Vec<String> = Vec::new();
    let mut subcommand: Option<String> = None;

    while let Some(arg) = args.items.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                invocation.command = Command::Version;
                return Ok(invocation);
            }
            "--help" | "-h" => {
                invocation.command = Command::Help;
                return Ok(invocation);
            }
            "--offline" => invocation.offline = true,
            "--config" => invocation.config_file = Some(PathBuf::from(args.value(&arg)?)),
            "--video" => invocation.command = Command::Video(args.value(&arg)?),
            "--user" => invocation.command = Command::Profile(args.value(&arg)?),
            "--user-name" => {
                let value = args.value(&arg)?;
                form.handle = value.clone();
                handle = Some(value);
            }
            "--name" => {
                let value = args.value(&arg)?;
                form.name = value.clone();
                name = Some(value);
            }
            "--email" => form.email = args.value(&arg)?,
            "--password" => {
                form.password = args.value(&arg)?;
                form.password_confirmation = form.password.clone();
            }
            "--birth-date" => {
                let value = args.value(&arg)?;
                let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                    UsageError::Invalid {
                        flag: arg.clone(),
                        value: value.clone(),
                    }
                })?;
                form.birth_date = Some(date);
            }
            "--accept-terms" => form.accepted_terms = true,
            "--taste" => form.tastes.push(args.value(&arg)?),
            "--title" => draft.title = args.value(&arg)?,
            "--description" => draft.description = args.value(&arg)?,
            "--tag" => draft.tags.push(args.value(&arg)?),
            "--duration" => {
                let value = args.value(&arg)?;
                let secs = value.parse::<f64>().ok().filter(|secs| *secs > 0.0).ok_or(
                    UsageError::Invalid {
                        flag: arg.clone(),
                        value,
                    },
                )?;
                draft.duration = Some(secs);
            }
            flag if flag.starts_with('-') => return Err(UsageError::Unknown(arg)),
            _ if subcommand.is_none() => subcommand = Some(arg),
            _ => positional.push(arg),
        }
    }

    let Some(subcommand) = subcommand else {
        return Ok(invocation);
    };
    let mut positional = positional.into_iter();
    invocation.command = match subcommand.as_str() {
        "login" => Command::Login(positional.next().ok_or(UsageError::Missing("user id"))?),
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "signup" => Command::SignUp(form),
        "upload" => {
            draft.path = PathBuf::from(positional.next().ok_or(UsageError::Missing("video file"))?);
            Command::Upload(draft)
        }
        "edit-profile" => Command::EditProfile { name, handle },
        "avatar" => Command::Avatar(PathBuf::from(
            positional.next().ok_or(UsageError::Missing("image file"))?,
        )),
        _ => return Err(UsageError::Unknown(subcommand)),
    };
    if let Some(extra) = positional.next() {
        return Err(UsageError::Unknown(extra));
    }
    Ok(invocation)
}

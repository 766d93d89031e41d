//! These structs provide the CLI interface for the mangos CLI.

use crate::extract::Provider;
use crate::model::ExpenseEntry;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// mangos: capture expenses from free text into a Google Sheet ledger.
///
/// Describe what you spent in your own words ("pan 2500 y bencina 30 mil") and mangos asks a
/// language model to turn it into entries, shows them to you, and writes them into the next free
/// rows of your ledger once you confirm.
///
/// You will need an OAuth client ID from a Google Cloud project and an API key for Gemini or
/// OpenRouter. See the README at https://github.com/mangos-app/mangos for how to set these up.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration file.
    ///
    /// This is the first command you should run. If you already have a ledger spreadsheet pass its
    /// URL as --sheet-url, otherwise leave it out and run 'mangos clone' after 'mangos auth'.
    Init(InitArgs),
    /// Sign in to Google, check the sign-in state, or sign out.
    Auth(AuthArgs),
    /// Extract expenses from free text and, with --confirm, write them to the ledger.
    Capture(CaptureArgs),
    /// Write expenses given as NAME=AMOUNT straight to the ledger.
    Add(AddArgs),
    /// List the tabs of the ledger spreadsheet that can hold expenses.
    Tabs,
    /// Show the balance, the total spent and the recorded expenses.
    Summary,
    /// Create a new ledger by copying the template spreadsheet.
    Clone(CloneArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where mangos configuration and secrets are held. Defaults to ~/mangos
    #[arg(long, env = "MANGOS_HOME", default_value_t = default_mangos_home())]
    mangos_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, mangos_home: PathBuf) -> Self {
        Self {
            log_level,
            mangos_home: mangos_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn mangos_home(&self) -> &DisplayPath {
        &self.mangos_home
    }
}

/// (Not shown): Args for the `mangos init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your ledger Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long, default_value = "")]
    sheet_url: String,

    /// The tab expenses are written to.
    #[arg(long)]
    sheet_name: Option<String>,

    /// The OAuth client ID of your Google Cloud project.
    #[arg(long, env = "MANGOS_CLIENT_ID")]
    client_id: String,

    /// The language model service that reads your expenses: gemini or openrouter.
    #[arg(long, default_value_t = Provider::Gemini)]
    provider: Provider,

    /// The API key for the provider. It is stored in config.json, readable only by you.
    #[arg(long, env = "MANGOS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use this model instead of the provider's default.
    #[arg(long)]
    model: Option<String>,
}

impl InitArgs {
    pub fn new(
        sheet_url: impl Into<String>,
        sheet_name: Option<String>,
        client_id: impl Into<String>,
        provider: Provider,
        api_key: Option<String>,
    ) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            sheet_name,
            client_id: client_id.into(),
            provider,
            api_key,
            model: None,
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet_name.as_deref()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// (Not shown): Args for the `mangos auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// The address your browser landed on after signing in.
    #[arg(long, value_name = "URL", conflicts_with_all = ["status", "sign_out"])]
    complete: Option<String>,

    /// Report whether you are signed in.
    #[arg(long, conflicts_with = "sign_out")]
    status: bool,

    /// Revoke the token and forget the session.
    #[arg(long)]
    sign_out: bool,
}

impl AuthArgs {
    pub fn new(complete: Option<String>, status: bool, sign_out: bool) -> Self {
        Self {
            complete,
            status,
            sign_out,
        }
    }

    pub fn complete(&self) -> Option<&str> {
        self.complete.as_deref()
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn sign_out(&self) -> bool {
        self.sign_out
    }
}

/// (Not shown): Args for the `mangos capture` command.
#[derive(Debug, Parser, Clone)]
pub struct CaptureArgs {
    /// What you spent, in your own words.
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,

    /// Write the extracted expenses without asking again.
    #[arg(long)]
    confirm: bool,
}

impl CaptureArgs {
    pub fn new(text: impl Into<String>, confirm: bool) -> Self {
        Self {
            text: vec![text.into()],
            confirm,
        }
    }

    pub fn text(&self) -> String {
        self.text.join(" ")
    }

    pub fn confirm(&self) -> bool {
        self.confirm
    }
}

/// (Not shown): Args for the `mangos add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// An expense as NAME=AMOUNT, e.g. --entry 'Pan=$2.500'. Can be repeated.
    #[arg(long = "entry", value_name = "NAME=AMOUNT", value_parser = parse_entry, required = true)]
    entries: Vec<ExpenseEntry>,
}

impl AddArgs {
    pub fn new(entries: Vec<ExpenseEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ExpenseEntry] {
        &self.entries
    }
}

/// (Not shown): Args for the `mangos clone` command.
#[derive(Debug, Parser, Clone)]
pub struct CloneArgs {
    /// The spreadsheet to copy instead of the default template.
    #[arg(long)]
    template: Option<String>,
}

impl CloneArgs {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

/// Parses `NAME=AMOUNT`. The amount is kept as written.
fn parse_entry(s: &str) -> Result<ExpenseEntry, String> {
    let (name, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("'{s}' is not NAME=AMOUNT"))?;
    let (name, amount) = (name.trim(), amount.trim());
    if name.is_empty() || amount.is_empty() {
        return Err(format!("'{s}' needs both a name and an amount"));
    }
    Ok(ExpenseEntry::new(name, amount))
}

fn default_mangos_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("mangos"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --mangos-home or MANGOS_HOME instead of relying on the default \
                mangos home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("mangos")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            parse_entry("Pan = $2.500").unwrap(),
            ExpenseEntry::new("Pan", "$2.500")
        );
        assert_eq!(
            parse_entry("Agua=a=b").unwrap(),
            ExpenseEntry::new("Agua", "a=b")
        );
        assert!(parse_entry("Pan").is_err());
        assert!(parse_entry("=500").is_err());
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "mangos",
            "--mangos-home",
            "/tmp/m",
            "add",
            "--entry",
            "Pan=$2.500",
            "--entry",
            "Luz=$20.000",
        ])
        .unwrap();
        assert_eq!(args.common().mangos_home().path(), Path::new("/tmp/m"));
        match args.command() {
            Command::Add(add) => assert_eq!(add.entries().len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        let args =
            Args::try_parse_from(["mangos", "capture", "pan", "2500", "--confirm"]).unwrap();
        match args.command() {
            Command::Capture(capture) => {
                assert_eq!(capture.text(), "pan 2500");
                assert!(capture.confirm());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Args::try_parse_from(["mangos", "auth", "--status", "--sign-out"]).is_err());

        let args = Args::try_parse_from([
            "mangos",
            "init",
            "--client-id",
            "1234.apps.googleusercontent.com",
            "--provider",
            "openrouter",
            "--api-key",
            "sk-or-1",
        ])
        .unwrap();
        match args.command() {
            Command::Init(init) => {
                assert_eq!(init.provider(), Provider::OpenRouter);
                assert_eq!(init.api_key(), Some("sk-or-1"));
                assert_eq!(init.sheet_url(), "");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

pub mod commands;
pub mod context;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use medportal_core::config::{ConfigOverrides, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};
use crate::context::CommandContext;

#[derive(Debug, Parser)]
#[command(
    name = "medportal",
    about = "Medical-supplies business portal CLI",
    long_about = "Sign in to the distributor portal, keep the session alive, \
                  and compose or review quotations.",
    after_help = "Examples:\n  medportal login --login rep-17\n  \
                  medportal session watch --auto-renew\n  \
                  medportal quote submit --draft draft.json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Default, Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Path to medportal.toml (required to exist when given)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override backend.base_url")]
    pub base_url: Option<String>,
    #[arg(long, global = true, help = "Override storage.path")]
    pub storage: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                base_url: self.base_url.clone(),
                storage_path: self.storage.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Sign in with backend.login / backend.password and start a session")]
    Login {
        #[arg(long, help = "Login name; defaults to backend.login")]
        login: Option<String>,
    },
    #[command(about = "End the current session and clear stored credentials")]
    Logout,
    #[command(subcommand, about = "Inspect, renew or watch the current session")]
    Session(SessionCommand),
    #[command(subcommand, about = "Record or inspect the cookie consent decision")]
    Consent(ConsentCommand),
    #[command(subcommand, about = "List, inspect and submit quotations")]
    Quote(QuoteCommand),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, storage access, session and backend reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    #[command(about = "Report whether the stored session is valid and when it expires")]
    Status,
    #[command(about = "Renew the token while the expiry warning is showing")]
    Renew,
    #[command(about = "Poll the session, printing warnings and countdown updates")]
    Watch {
        #[arg(long, help = "Renew automatically when the expiry warning appears")]
        auto_renew: bool,
        #[arg(long, help = "Stop watching after this many seconds")]
        max_secs: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConsentCommand {
    #[command(about = "Accept cookies under the configured policy version")]
    Accept,
    #[command(about = "Decline non-essential cookies under the configured policy version")]
    Decline,
    #[command(about = "Report whether the consent banner must be shown")]
    Status,
}

#[derive(Debug, Subcommand)]
pub enum QuoteCommand {
    #[command(about = "List saved quotations")]
    List,
    #[command(about = "Show one saved quotation")]
    Show {
        #[arg(help = "Backend document entry")]
        doc_entry: i64,
    },
    #[command(about = "Walk a draft file through the wizard and print the backend payload")]
    Preview {
        #[arg(long, help = "JSON draft with `header` and `lines`")]
        draft: PathBuf,
    },
    #[command(about = "Walk a draft file through the wizard and submit it")]
    Submit {
        #[arg(long, help = "JSON draft with `header` and `lines`")]
        draft: PathBuf,
        #[arg(long, help = "Update this saved quotation instead of creating one")]
        doc_entry: Option<i64>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Session(SessionCommand::Status) => "session.status",
            Self::Session(SessionCommand::Renew) => "session.renew",
            Self::Session(SessionCommand::Watch { .. }) => "session.watch",
            Self::Consent(_) => "consent",
            Self::Quote(QuoteCommand::List) => "quote.list",
            Self::Quote(QuoteCommand::Show { .. }) => "quote.show",
            Self::Quote(QuoteCommand::Preview { .. }) => "quote.preview",
            Self::Quote(QuoteCommand::Submit { .. }) => "quote.submit",
            Self::Config => "config",
            Self::Doctor { .. } => "doctor",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(&cli.global, cli.command);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub fn execute(global: &GlobalArgs, command: Command) -> CommandResult {
    let name = command.name();
    match command {
        Command::Config => {
            return CommandResult { exit_code: 0, output: commands::config::run(global) };
        }
        Command::Doctor { json } => {
            return CommandResult { exit_code: 0, output: commands::doctor::run(global, json) };
        }
        _ => {}
    }

    let context = match CommandContext::load(global) {
        Ok(context) => context,
        Err(error) => {
            return CommandResult::failure(name, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    context.init_logging();

    let span = tracing::info_span!(
        "command",
        command = name,
        correlation_id = context.correlation_id.as_str()
    );
    let _entered = span.enter();

    match command {
        Command::Login { login } => commands::login::run(&context, login),
        Command::Logout => commands::session::logout(&context),
        Command::Session(SessionCommand::Status) => commands::session::status(&context),
        Command::Session(SessionCommand::Renew) => commands::session::renew(&context),
        Command::Session(SessionCommand::Watch { auto_renew, max_secs }) => {
            commands::session::watch(&context, auto_renew, max_secs)
        }
        Command::Consent(ConsentCommand::Accept) => commands::consent::decide(&context, true),
        Command::Consent(ConsentCommand::Decline) => commands::consent::decide(&context, false),
        Command::Consent(ConsentCommand::Status) => commands::consent::status(&context),
        Command::Quote(QuoteCommand::List) => commands::quote::list(&context),
        Command::Quote(QuoteCommand::Show { doc_entry }) => {
            commands::quote::show(&context, doc_entry)
        }
        Command::Quote(QuoteCommand::Preview { draft }) => {
            commands::quote::preview(&context, &draft)
        }
        Command::Quote(QuoteCommand::Submit { draft, doc_entry }) => {
            commands::quote::submit(&context, &draft, doc_entry)
        }
        Command::Config | Command::Doctor { .. } => {
            CommandResult::failure(name, "internal", "command handled before context load", 1)
        }
    }
}

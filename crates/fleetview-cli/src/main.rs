// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use fleetview_api::{Client, TokenStore};
use fleetview_app::{
    AppCommand, AppState, ChangePasswordInput, LoginInput, RegistrationInput, Role, SessionUser,
};
use fleetview_db::Store;
use runtime::DbRuntime;
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{info, warn};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `fleetview --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let log_path = logging::init(&config)?;
    info!(
        config = %options.config_path.display(),
        log = %log_path.display(),
        "starting fleetview"
    );

    let today = today();
    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or FLEETVIEW_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;
    if options.demo {
        store.seed_demo_data(today)?;
    }

    let token_path = config.token_path()?;
    let tokens = TokenStore::open(&token_path)?;
    let needs_client = config.api_enabled() || options.session.is_some();
    let mut client = if needs_client {
        Some(
            Client::new(config.api_base_url(), config.api_timeout()?, tokens.clone())
                .with_context(|| {
                    format!(
                        "invalid [api] config in {}; fix base_url/timeout values",
                        options.config_path.display()
                    )
                })?,
        )
    } else {
        None
    };

    if options.check_only {
        info!(db = %db_path.display(), "startup check passed");
        return Ok(());
    }

    if let Some(command) = &options.session {
        let client = client
            .as_mut()
            .ok_or_else(|| anyhow!("backend client unavailable"))?;
        let message = run_session_command(command, client, &store, now())?;
        println!("{message}");
        return Ok(());
    }

    let mut state = initial_state(tokens.user().cloned(), config.role());
    let client = if config.api_enabled() {
        client
    } else {
        None
    };
    let mut runtime = DbRuntime::new(&store)
        .with_client(client)
        .with_page_size(config.page_size());
    fleetview_tui::run_app(&mut state, &mut runtime)
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

/// A stored session decides the role; otherwise `[ui].role`, then admin.
fn initial_state(session: Option<SessionUser>, configured: Option<Role>) -> AppState {
    match session {
        Some(user) => {
            let mut state = AppState::for_role(user.role);
            let _events = state.dispatch(AppCommand::SignIn(user));
            state
        }
        None => AppState::for_role(configured.unwrap_or(Role::Admin)),
    }
}

fn run_session_command(
    command: &SessionCommand,
    client: &mut Client,
    store: &Store,
    now: PrimitiveDateTime,
) -> Result<String> {
    match command {
        SessionCommand::Login(email) => {
            let password = read_password(
                env::var("FLEETVIEW_PASSWORD").ok(),
                io::stdin().lock(),
            )?;
            let user = client.login(&LoginInput {
                email: email.clone(),
                password,
            })?;
            store.record_login(&user, now.date())?;
            Ok(format!(
                "signed in as {} ({})",
                user.email,
                user.role.label()
            ))
        }
        SessionCommand::Logout => {
            client.logout()?;
            Ok("signed out".to_owned())
        }
        SessionCommand::Register(registration) => {
            let mut input = io::stdin().lock();
            let (password, password_confirm) = read_new_password(
                env::var("FLEETVIEW_PASSWORD").ok(),
                "FLEETVIEW_PASSWORD",
                "password",
                &mut input,
            )?;
            let user = client.register(&registration.input(password, password_confirm))?;
            Ok(format!(
                "registered {} ({}) -- run `fleetview --login {}` to sign in",
                user.email,
                user.role.label(),
                user.email
            ))
        }
        SessionCommand::ChangePassword => {
            if client.session_user().is_none() {
                bail!("not signed in -- run `fleetview --login <email>` first");
            }
            let mut input = io::stdin().lock();
            let old_password = read_password(env::var("FLEETVIEW_PASSWORD").ok(), &mut input)?;
            let (new_password, new_password_confirm) = read_new_password(
                env::var("FLEETVIEW_NEW_PASSWORD").ok(),
                "FLEETVIEW_NEW_PASSWORD",
                "new password",
                &mut input,
            )?;
            client.change_password(&ChangePasswordInput {
                old_password,
                new_password,
                new_password_confirm,
            })?;
            Ok("password changed".to_owned())
        }
        SessionCommand::WhoAmI => {
            if client.session_user().is_none() {
                return Ok(whoami_line(None));
            }
            match client.me() {
                Ok(user) => Ok(whoami_line(Some(&user))),
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "user lookup failed; showing stored session");
                    Ok(whoami_line(client.session_user()))
                }
            }
        }
        SessionCommand::Sync => {
            let report = runtime::sync_from(store, client, now)?;
            Ok(report.to_string())
        }
    }
}

fn whoami_line(user: Option<&SessionUser>) -> String {
    match user {
        Some(user) => format!("{} <{}> ({})", user.name, user.email, user.role.label()),
        None => "not signed in -- run `fleetview --login <email>`".to_owned(),
    }
}

/// Takes `FLEETVIEW_PASSWORD` when set, otherwise the next line of input.
fn read_password(from_env: Option<String>, mut input: impl BufRead) -> Result<String> {
    if let Some(password) = from_env.filter(|value| !value.is_empty()) {
        return Ok(password);
    }
    read_secret_line(
        &mut input,
        "password",
        "set FLEETVIEW_PASSWORD or pipe it on stdin",
    )
}

/// A new password and its confirmation. An environment value stands for
/// both; otherwise they are the next two lines of input.
fn read_new_password(
    from_env: Option<String>,
    var: &str,
    what: &str,
    mut input: impl BufRead,
) -> Result<(String, String)> {
    if let Some(password) = from_env.filter(|value| !value.is_empty()) {
        return Ok((password.clone(), password));
    }
    let password = read_secret_line(
        &mut input,
        what,
        &format!("set {var} or pipe it on stdin"),
    )?;
    let confirm = read_secret_line(
        &mut input,
        &format!("{what} confirmation"),
        &format!("pipe it on the line after the {what}"),
    )?;
    Ok((password, confirm))
}

fn read_secret_line(input: &mut impl BufRead, what: &str, hint: &str) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .with_context(|| format!("read {what} from stdin"))?;
    let secret = line.trim_end_matches(['\r', '\n']).to_owned();
    if secret.is_empty() {
        bail!("{what} is required -- {hint} and retry");
    }
    Ok(secret)
}

/// Account details for `--register`; passwords are read when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    email: String,
    name: String,
    role: Role,
    performance: u8,
    terms_accepted: bool,
}

impl Registration {
    fn new(email: String) -> Self {
        Self {
            email,
            name: String::new(),
            role: Role::Personal,
            performance: 0,
            terms_accepted: false,
        }
    }

    fn input(&self, password: String, password_confirm: String) -> RegistrationInput {
        RegistrationInput {
            name: self.name.clone(),
            email: self.email.clone(),
            password,
            password_confirm,
            role: self.role,
            performance: self.performance,
            terms_accepted: self.terms_accepted,
        }
    }
}

/// `--name`, `--role`, `--performance` and `--accept-terms` as given on the
/// command line, applied to `--register` after parsing.
#[derive(Debug, Default)]
struct RegistrationFlags {
    name: Option<String>,
    role: Option<Role>,
    performance: Option<u8>,
    terms_accepted: bool,
}

impl RegistrationFlags {
    fn first_given(&self) -> Option<&'static str> {
        if self.name.is_some() {
            Some("--name")
        } else if self.role.is_some() {
            Some("--role")
        } else if self.performance.is_some() {
            Some("--performance")
        } else if self.terms_accepted {
            Some("--accept-terms")
        } else {
            None
        }
    }

    fn apply(self, registration: &mut Registration) {
        if let Some(name) = self.name {
            registration.name = name;
        }
        if let Some(role) = self.role {
            registration.role = role;
        }
        if let Some(performance) = self.performance {
            registration.performance = performance;
        }
        registration.terms_accepted = self.terms_accepted;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Login(String),
    Register(Registration),
    ChangePassword,
    Logout,
    WhoAmI,
    Sync,
}

impl SessionCommand {
    fn flag(&self) -> &'static str {
        match self {
            Self::Login(_) => "--login",
            Self::Register(_) => "--register",
            Self::ChangePassword => "--change-password",
            Self::Logout => "--logout",
            Self::WhoAmI => "--whoami",
            Self::Sync => "--sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    session: Option<SessionCommand>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        session: None,
    };

    let mut registration = RegistrationFlags::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let session = match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
                None
            }
            "--print-config-path" => {
                options.print_config_path = true;
                None
            }
            "--print-path" => {
                options.print_db_path = true;
                None
            }
            "--print-example-config" => {
                options.print_example = true;
                None
            }
            "--demo" => {
                options.demo = true;
                None
            }
            "--check" => {
                options.check_only = true;
                None
            }
            "--login" => {
                let email = iter
                    .next()
                    .ok_or_else(|| anyhow!("--login requires an email address"))?;
                let email = email.as_ref().trim();
                if email.is_empty() {
                    bail!("--login requires an email address");
                }
                Some(SessionCommand::Login(email.to_owned()))
            }
            "--register" => {
                let email = iter
                    .next()
                    .ok_or_else(|| anyhow!("--register requires an email address"))?;
                let email = email.as_ref().trim();
                if email.is_empty() {
                    bail!("--register requires an email address");
                }
                Some(SessionCommand::Register(Registration::new(email.to_owned())))
            }
            "--name" => {
                let name = iter
                    .next()
                    .ok_or_else(|| anyhow!("--name requires a display name"))?;
                registration.name = Some(name.as_ref().trim().to_owned());
                None
            }
            "--role" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!("--role requires one of personal, service or admin")
                })?;
                let role = Role::parse(value.as_ref()).ok_or_else(|| {
                    anyhow!(
                        "unknown role {:?} -- use personal, service or admin",
                        value.as_ref()
                    )
                })?;
                registration.role = Some(role);
                None
            }
            "--performance" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--performance requires a number"))?;
                let performance = value.as_ref().trim().parse::<u8>().with_context(|| {
                    format!("--performance must be a whole number, got {:?}", value.as_ref())
                })?;
                registration.performance = Some(performance);
                None
            }
            "--accept-terms" => {
                registration.terms_accepted = true;
                None
            }
            "--change-password" => Some(SessionCommand::ChangePassword),
            "--logout" => Some(SessionCommand::Logout),
            "--whoami" => Some(SessionCommand::WhoAmI),
            "--sync" => Some(SessionCommand::Sync),
            "--help" | "-h" => {
                options.show_help = true;
                None
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        };

        if let Some(command) = session {
            if let Some(previous) = &options.session {
                bail!(
                    "{} cannot be combined with {}; run them one at a time",
                    command.flag(),
                    previous.flag()
                );
            }
            options.session = Some(command);
        }
    }

    match &mut options.session {
        Some(SessionCommand::Register(details)) => registration.apply(details),
        _ => {
            if let Some(flag) = registration.first_given() {
                bail!("{flag} only applies to --register");
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("fleetview");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch with sample fleet data (in-memory)");
    println!("  --check                  Validate config + DB + startup dependencies");
    println!("  --login <email>          Sign in to the backend (password from FLEETVIEW_PASSWORD or stdin)");
    println!("  --register <email>       Create a backend account (password from FLEETVIEW_PASSWORD or two stdin lines)");
    println!("    --name <name>          Display name for --register");
    println!("    --role <role>          personal (default), service or admin");
    println!("    --performance <0-10>   Starting performance score for --register");
    println!("    --accept-terms         Accept the terms of service for --register");
    println!("  --change-password        Change the signed-in password (FLEETVIEW_PASSWORD, FLEETVIEW_NEW_PASSWORD or stdin)");
    println!("  --logout                 Sign out and forget stored tokens");
    println!("  --whoami                 Print the signed-in user, refreshed from the backend");
    println!("  --sync                   Pull trips, issues, vehicles, battery readings and service jobs into the database");
    println!("  --help                   Show this help");
}

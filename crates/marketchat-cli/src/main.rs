//! marketchat - terminal driver for the marketplace session coordinator.
//!
//! Logs in against the identity service and shows how the navigation guard
//! treats each route for the resulting session.

use std::io;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketchat_core::auth::AuthManager;
use marketchat_core::guard::{GuardDecision, NavigationGuard, RouteTable};
use marketchat_core::{ActionOutcome, Config, SessionEvent, UserProfile};

// ============================================================================
// Constants
// ============================================================================

const EMAIL_ENV: &str = "MARKETCHAT_EMAIL";
const PASSWORD_ENV: &str = "MARKETCHAT_PASSWORD";

/// Prefix for the daily rolling log file
const LOG_FILE_PREFIX: &str = "marketchat.log";

const USAGE: &str = "\
Usage:
  marketchat login [EMAIL] [PATH...]   log in, then check PATHs (default: every route)
  marketchat routes                    list routes and their requirements
  marketchat check PATH...             check PATHs from a fresh session";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive main.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g., RUST_LOG=marketchat_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.log_dir.as_ref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let _log_guard = init_tracing(&config);
    info!(api = config.base_url(), "marketchat starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = match args.split_first() {
        Some((command, rest)) => (command.as_str(), rest),
        None => {
            eprintln!("{}", USAGE);
            return Ok(());
        }
    };

    match command {
        "login" => login(&mut config, rest).await,
        "routes" => {
            print_routes(&RouteTable::default());
            Ok(())
        }
        "check" if !rest.is_empty() => check(&config, rest).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => Err(anyhow!("Unknown command '{}'\n\n{}", args.join(" "), USAGE)),
    }
}

async fn login(config: &mut Config, args: &[String]) -> Result<()> {
    // A leading argument that isn't a path is the email
    let (email_arg, paths) = match args.split_first() {
        Some((first, rest)) if !first.starts_with('/') => (Some(first.clone()), rest),
        _ => (None, args),
    };
    let email = email_arg
        .or_else(|| std::env::var(EMAIL_ENV).ok())
        .or_else(|| config.last_email.clone())
        .ok_or_else(|| anyhow!("No email given; pass one or set {}", EMAIL_ENV))?;
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", email))?,
    };

    let manager = AuthManager::new(config)?;
    watch_events(&manager);

    let user = match manager.login(&email, &password).await {
        Ok(user) => user,
        Err(e) => return Err(failure("Login failed", e.into())),
    };
    print_user(&user);
    if let Some(age) = manager.session().credential_age() {
        println!("  credential issued {}s ago", age.num_seconds());
    }

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    let guard = manager.guard(RouteTable::default());
    let paths = if paths.is_empty() { all_paths(&guard) } else { paths.to_vec() };
    print_decisions(&guard, &paths).await;
    Ok(())
}

/// Run every check concurrently against one uninitialized session, so the
/// initial refresh is shared by all of them.
async fn check(config: &Config, paths: &[String]) -> Result<()> {
    let manager = AuthManager::new(config)?;
    watch_events(&manager);

    let guard = manager.guard(RouteTable::default());
    print_decisions(&guard, paths).await;

    match manager.user() {
        Some(user) => print_user(&user),
        None => println!("Browsing as guest"),
    }
    Ok(())
}

/// Turn a failed action into an error carrying its user-facing message.
fn failure(action: &str, outcome: ActionOutcome) -> anyhow::Error {
    anyhow!("{}: {}", action, outcome.error.unwrap_or_default())
}

fn watch_events(manager: &AuthManager) {
    let mut events = manager.events();
    tokio::spawn(async move {
        while let Ok(SessionEvent::Terminated(reason)) = events.recv().await {
            warn!(?reason, "Session terminated, login required");
        }
    });
}

fn all_paths(guard: &NavigationGuard) -> Vec<String> {
    guard.routes().routes().iter().map(|r| r.path.clone()).collect()
}

async fn print_decisions(guard: &NavigationGuard, paths: &[String]) {
    let decisions = join_all(paths.iter().map(|path| guard.navigate(path))).await;
    for (path, decision) in paths.iter().zip(decisions) {
        let settled = match &decision {
            GuardDecision::Allow => None,
            GuardDecision::Redirect(_) => Some(guard.settle(path).await),
        };
        match (decision, settled) {
            (GuardDecision::Allow, _) => println!("{:<16} allow", path),
            (GuardDecision::Redirect(to), Some(Ok(end))) if end != to => {
                println!("{:<16} -> {} (settles on {})", path, to, end)
            }
            (GuardDecision::Redirect(to), Some(Err(e))) => println!("{:<16} -> {} ({})", path, to, e),
            (GuardDecision::Redirect(to), _) => println!("{:<16} -> {}", path, to),
        }
    }
}

fn print_routes(table: &RouteTable) {
    for route in table.routes() {
        match &route.redirect {
            Some(target) => println!("{:<16} {:<14} alias of {}", route.path, route.name, target),
            None => println!("{:<16} {:<14} {}", route.path, route.name, route.requirement.describe()),
        }
    }
}

fn print_user(user: &UserProfile) {
    println!(
        "Signed in as {} <{}> ({}, email {})",
        user.display_name(),
        user.email,
        user.role.as_str(),
        if user.email_verified { "verified" } else { "unverified" }
    );
    if user.needs_onboarding() {
        println!("  profile incomplete: no skills listed");
    }
}

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    cache::MutationOutput,
    flows::USER_NOT_FOUND_MESSAGE,
    validation::{EMAIL, FIRST_NAME, LAST_NAME, PHONE},
    CreateFlow, FlowContext, FormController, HttpTransport, ListFlow, QueryCache, QueryKey, Route,
    SubmitOutcome, UpdateFlow, UpdateState, UserApi, ValidUser,
};
use shared::domain::UserId;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod screen;

use screen::{render_field_errors, render_list, render_user, ConsoleScreen};

#[derive(Parser, Debug)]
#[command(name = "console", about = "Manage user information records")]
struct Args {
    /// Flat TOML file with `api_base_url`, `cache_stale_seconds`,
    /// `cache_gc_seconds` and `log_filter`.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    stale_seconds: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Show every user.
    List,
    /// Show one user.
    Show { id: String },
    Create(CreateArgs),
    /// Change a user; fields left out keep their current values.
    Update {
        id: String,
        #[command(flatten)]
        fields: UpdateArgs,
    },
    Delete { id: String },
}

#[derive(clap::Args, Debug, PartialEq, Eq)]
struct CreateArgs {
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long, default_value = "")]
    phone: String,
}

impl CreateArgs {
    fn values(&self) -> Vec<(&'static str, &str)> {
        vec![
            (FIRST_NAME, self.first_name.as_str()),
            (LAST_NAME, self.last_name.as_str()),
            (EMAIL, self.email.as_str()),
            (PHONE, self.phone.as_str()),
        ]
    }
}

#[derive(clap::Args, Debug, PartialEq, Eq)]
struct UpdateArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

impl UpdateArgs {
    fn provided(&self) -> Vec<(&'static str, &str)> {
        [
            (FIRST_NAME, &self.first_name),
            (LAST_NAME, &self.last_name),
            (EMAIL, &self.email),
            (PHONE, &self.phone),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|value| (field, value)))
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let mut settings = config::load_settings(&args.config)?;
    if let Some(url) = &args.api_base_url {
        settings.api_base_url = config::normalize_api_base_url(url);
    }
    if let Some(seconds) = args.stale_seconds {
        settings.cache_stale_seconds = seconds;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let transport = HttpTransport::new(&settings.api_base_url)
        .with_context(|| format!("invalid api base url '{}'", settings.api_base_url))?;
    let cache = QueryCache::create(UserApi::new(Arc::new(transport)), settings.cache_config());
    let mut events = cache.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(?event, "cache event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "cache events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let screen = Arc::new(ConsoleScreen::new());
    let ctx = FlowContext::new(cache, screen.clone(), screen.clone());
    info!(api_base_url = %settings.api_base_url, "console ready");

    let code = run(args.command, &ctx).await?;
    if screen.take_route() == Some(Route::UserList) {
        print_list(&ListFlow::mount(ctx)).await;
    }
    Ok(code)
}

async fn run(command: Command, ctx: &FlowContext) -> Result<ExitCode> {
    match command {
        Command::List => {
            print_list(&ListFlow::mount(ctx.clone())).await;
        }
        Command::Show { id } => {
            let data = match ctx.cache.fetch(&QueryKey::User(UserId::new(id))).await {
                Ok(data) => data,
                Err(err) if err.is_not_found() => bail!(USER_NOT_FOUND_MESSAGE),
                Err(err) => return Err(err.into()),
            };
            match data.as_user() {
                Some(user) => println!("{}", render_user(user)),
                None => bail!("server returned something other than a user"),
            }
        }
        Command::Create(fields) => {
            let create = CreateFlow::mount(ctx.clone());
            fill(create.form(), fields.values())?;
            return Ok(exit_code(report(create.submit().await)));
        }
        Command::Update { id, fields } => {
            let update = UpdateFlow::mount(ctx.clone(), UserId::new(id));
            let loaded = update.load().await;
            if loaded != UpdateState::Ready {
                eprintln!("{loaded}");
                return Ok(ExitCode::FAILURE);
            }
            fill(update.form(), fields.provided())?;
            return Ok(exit_code(report(update.submit().await)));
        }
        Command::Delete { id } => {
            let list = ListFlow::mount(ctx.clone());
            let id = UserId::new(id);
            if list.delete(id.clone()).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            println!("Deleted user {id}");
            print_list(&list).await;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn fill(form: &FormController<ValidUser>, values: Vec<(&'static str, &str)>) -> Result<()> {
    for (field, value) in values {
        form.set_value(field, value)?;
    }
    Ok(())
}

/// Prints validation errors and tells whether the submission went through.
/// Rejections were already shown by the notifier.
fn report(outcome: SubmitOutcome<MutationOutput>) -> bool {
    match outcome {
        SubmitOutcome::Submitted(_) => true,
        SubmitOutcome::Invalid(errors) => {
            eprintln!("Please fix the following:\n{}", render_field_errors(&errors));
            false
        }
        SubmitOutcome::Rejected(_) | SubmitOutcome::Blocked => false,
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn print_list(list: &ListFlow) {
    let state = list.settled().await;
    println!("{}", render_list(&state, &list.rows()));
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

//! `alldone`: terminal client for the Alldone task list.
//!
//! Reads one command per line from stdin (`help` lists them). Task changes
//! show up at once and are synced with the server in the background;
//! failures are reported as they arrive.
//!
//! ```bash
//! # Against a local alldone-server
//! cargo run --bin alldone
//!
//! # Against another server
//! ALLDONE_API_URL=https://tasks.example.com cargo run --bin alldone
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use alldone::api::rest::RestClient;
use alldone::app::{self, Command, HELP};
use alldone::config::{CliArgs, ClientConfig};
use alldone::session::{Session, SessionProvider};
use alldone::tasks::{TaskError, TaskManager};
use alldone_proto::auth::UserCredentials;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

/// Everything a command needs; cloned into spawned operations.
#[derive(Clone)]
struct Client {
    api: RestClient,
    tasks: TaskManager<RestClient>,
    sessions: Arc<SessionProvider>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    // stdout belongs to the command loop, so logs go to a file.
    let _log_guard = init_logging(&config.log_level, &config.log_path());
    tracing::info!(api_url = %config.api_url, "alldone starting");

    let api = RestClient::new(config.api_url.clone(), config.request_timeout)
        .map_err(io::Error::other)?;
    let (tasks, mut notices) = TaskManager::new(api.clone());
    let sessions = Arc::new(SessionProvider::new());
    let follower = {
        let tasks = tasks.clone();
        let updates = sessions.subscribe();
        tokio::spawn(async move { tasks.follow_session(updates).await })
    };
    let client = Client {
        api,
        tasks,
        sessions,
    };

    println!("alldone connected to {}, type `help` for commands", config.api_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match app::parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => client.run(command),
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            Some(notice) = notices.recv() => println!("{}", app::render_notice(&notice)),
        }
    }

    drop(client);
    follower.abort();
    tracing::info!("alldone exiting");
    Ok(())
}

impl Client {
    fn run(&self, command: Command) {
        match command {
            Command::SignUp(credentials) => self.spawn_sign_in(credentials, true),
            Command::LogIn(credentials) => self.spawn_sign_in(credentials, false),
            Command::LogOut => {
                self.sessions.sign_out();
                println!("signed out");
            }
            Command::List => {
                if self.tasks.is_loading() {
                    println!("loading...");
                } else {
                    println!("{}", app::render_list(&self.tasks.tasks()));
                }
            }
            Command::Add(text) => {
                let tasks = self.tasks.clone();
                tokio::spawn(async move { report(tasks.add_task(&text).await.map(drop)) });
            }
            Command::Edit { index, text } => {
                let Some(id) = self.task_at(index) else { return };
                let tasks = self.tasks.clone();
                tokio::spawn(async move { report(tasks.update_task(&id, &text, None).await) });
            }
            Command::SetCompleted { index, completed } => {
                let Some(id) = self.task_at(index) else { return };
                let tasks = self.tasks.clone();
                tokio::spawn(async move { report(tasks.toggle_complete(&id, completed).await) });
            }
            Command::Remove(index) => {
                let Some(id) = self.task_at(index) else { return };
                let tasks = self.tasks.clone();
                tokio::spawn(async move { report(tasks.delete_task(&id).await) });
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    fn task_at(&self, index: usize) -> Option<alldone_proto::task::TaskId> {
        let id = app::task_at(&self.tasks.tasks(), index);
        if id.is_none() {
            println!("no task {index}, `list` shows the numbers");
        }
        id
    }

    fn spawn_sign_in(&self, credentials: UserCredentials, register: bool) {
        let client = self.clone();
        tokio::spawn(async move {
            client.sessions.begin_loading();
            let result = if register {
                client.api.sign_up(&credentials).await
            } else {
                client.api.sign_in(&credentials).await
            };
            match result {
                Ok(auth) => {
                    println!("signed in as {}", auth.user.email);
                    client.sessions.establish(Session::from(&auth));
                }
                Err(e) => {
                    client.sessions.abort_loading();
                    println!("error: {e}");
                }
            }
        });
    }
}

/// Prints refusals the task manager does not turn into notices.
fn report(result: Result<(), TaskError>) {
    match result {
        Err(
            e @ (TaskError::TextEmpty | TaskError::NotFoundLocally(_) | TaskError::TaskBusy(_)),
        ) => println!("{e}"),
        Err(e) => tracing::debug!(error = %e, "task operation failed"),
        Ok(()) => {}
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

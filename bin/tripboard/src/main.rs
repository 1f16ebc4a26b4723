//! # Tripboard Binary
//!
//! The entry point that assembles the application based on compile-time features
//! and renders board operations on the terminal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tb_config::{LogSettings, Settings};
use tb_core::models::{Post, Thread, ThreadId};
use tb_core::service::{BoardService, NewThreadForm, PostForm};
use tb_core::traits::{ThreadStore, TripcodeGenerator};
use tb_core::AppError;
use tracing_subscriber::EnvFilter;

// Feature-gated imports: the store plugin is chosen at compile time
#[cfg(feature = "db-sqlite")]
use tb_db_sqlite::{SqliteThreadStore, StoreOptions};

#[cfg(all(feature = "db-memory", not(feature = "db-sqlite")))]
use tb_db_memory::MemoryThreadStore;

#[cfg(not(any(feature = "db-sqlite", feature = "db-memory")))]
compile_error!("enable at least one store feature: db-sqlite or db-memory");

use tb_trip_classic::ClassicTripcode;

#[derive(Parser)]
#[command(name = "tripboard", version, about = "Anonymous text board with tripcodes")]
struct Cli {
    /// Settings file (defaults to ./tripboard.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tripcode for a secret, e.g. `#istrip`
    Trip { secret: String },
    /// Start a thread with its opening post
    NewThread {
        #[arg(long)]
        title: String,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Reply to a thread
    Reply {
        thread_id: i64,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Show the board index
    List,
    /// Show every post in a thread
    Show { thread_id: i64 },
}

#[derive(Args)]
struct PostArgs {
    /// Display name; `name#secret` adds a tripcode
    #[arg(long)]
    name: String,
    /// Contact field; `sage` replies without bumping
    #[arg(long, default_value = "")]
    contact: String,
    #[arg(long)]
    body: String,
}

impl From<PostArgs> for PostForm {
    fn from(args: PostArgs) -> Self {
        PostForm {
            name: args.name,
            contact: args.contact,
            text: args.body,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&settings.log);

    match run(cli.command, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Validation → 2, missing thread → 3, retryable conflict → 4, anything else → 1.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<AppError>() {
        Some(AppError::ValidationError { .. }) => ExitCode::from(2),
        Some(AppError::ThreadNotFound(_)) => ExitCode::from(3),
        Some(AppError::StorageConflict(_)) => ExitCode::from(4),
        _ => ExitCode::from(1),
    }
}

#[cfg(feature = "db-sqlite")]
async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn ThreadStore>> {
    let options = StoreOptions {
        max_connections: settings.database.max_connections,
        busy_timeout: settings.database.busy_timeout(),
    };
    let store = SqliteThreadStore::connect(&settings.database.url, options).await?;
    tracing::debug!(
        max_connections = settings.database.max_connections,
        "using the sqlite store"
    );
    Ok(Arc::new(store))
}

#[cfg(all(feature = "db-memory", not(feature = "db-sqlite")))]
async fn open_store(_settings: &Settings) -> anyhow::Result<Arc<dyn ThreadStore>> {
    tracing::warn!("using the in-memory store; nothing outlives this process");
    Ok(Arc::new(MemoryThreadStore::new()))
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let trips: Arc<dyn TripcodeGenerator> = Arc::new(ClassicTripcode::new());

    if let Command::Trip { secret } = &command {
        println!("{}", trips.derive(secret));
        return Ok(());
    }

    let board = BoardService::new(open_store(settings).await?, trips);

    match command {
        Command::Trip { .. } => {}
        Command::NewThread { title, post } => {
            let (thread_id, post_id) = board
                .start_thread(NewThreadForm {
                    title,
                    post: post.into(),
                })
                .await?;
            println!("thread {thread_id} created (post {post_id})");
        }
        Command::Reply { thread_id, post } => {
            let post_id = board.reply(ThreadId(thread_id), post.into()).await?;
            println!("post {post_id} added to thread {thread_id}");
        }
        Command::List => {
            let previews = board.index().await?;
            if previews.is_empty() {
                println!("(no threads yet)");
            }
            for preview in previews {
                print_thread_header(&preview.thread);
                for post in &preview.posts {
                    print_post(post);
                }
                println!();
            }
        }
        Command::Show { thread_id } => {
            let view = board.thread(ThreadId(thread_id)).await?;
            print_thread_header(&view.thread);
            for post in &view.posts {
                print_post(post);
            }
        }
    }
    Ok(())
}

fn print_thread_header(thread: &Thread) {
    println!(
        "[{}] {}  (last activity {})",
        thread.id,
        thread.title,
        thread.last_activity.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_post(post: &Post) {
    let contact = if post.contact.is_empty() {
        String::new()
    } else {
        format!(" <{}>", post.contact)
    };
    println!(
        "  No.{} {}{} {}",
        post.id,
        post.name,
        contact,
        post.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    for line in post.text.lines() {
        println!("    {line}");
    }
}

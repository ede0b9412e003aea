use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use learnpath::{
    config::Config,
    curriculum::{document::document_schema, lifecycle::PathStatus},
    db::init_database,
    ledger::{ContentType, NewCompletion},
    tracker::ProgressTracker,
    utils::init_log,
};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "./learnpath.toml")]
    config: PathBuf,

    /// Database url, overrides the config file
    #[arg(short, long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Create a learning path from an authored curriculum document (json file)
    CreatePath {
        #[arg(short, long)]
        learner: i64,
        #[arg(long)]
        document: PathBuf,
    },
    /// Record a quiz or coding challenge completion
    Submit {
        #[arg(short, long)]
        learner: i64,
        #[arg(long)]
        content: String,
        #[arg(short = 't', long = "type", value_enum)]
        content_type: ContentKind,
        #[arg(long, default_value_t = 0)]
        score: i64,
        #[arg(long, default_value_t = 0)]
        total: i64,
        #[arg(long, default_value_t = 0)]
        percentage: i64,
        /// seconds
        #[arg(long, default_value_t = 0)]
        time_spent: i64,
    },
    /// Show the learner's current learning path
    Show {
        #[arg(short, long)]
        learner: i64,
    },
    /// Mark the learner's learning path as started
    Start {
        #[arg(short, long)]
        learner: i64,
    },
    /// Re-derive progress from the completion ledger
    Recalculate {
        #[arg(short, long)]
        learner: i64,
    },
    /// Recent completions and a per-type summary
    History {
        #[arg(short, long)]
        learner: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print the json schema of the curriculum document
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum ContentKind {
    Quiz,
    CodingChallenge,
}

impl From<ContentKind> for ContentType {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Quiz => ContentType::Quiz,
            ContentKind::CodingChallenge => ContentType::CodingChallenge,
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(database) = args.database {
        config.database = database;
    }
    let _guard = init_log(config.log_dir.clone())?;

    if let Command::Schema = args.command {
        return print_json(&document_schema());
    }

    let database = init_database(&config.database).await?;
    let tracker = ProgressTracker::new(database, config.recalculation);

    match args.command {
        Command::Init | Command::Schema => {
            info!("database initialized at {}", config.database);
        }
        Command::CreatePath { learner, document } => {
            let content = tokio::fs::read_to_string(&document).await?;
            let raw: serde_json::Value = serde_json::from_str(&content)?;
            let path = tracker.create_curriculum_path(learner, &raw).await?;
            print_json(&path)?;
        }
        Command::Submit {
            learner,
            content,
            content_type,
            score,
            total,
            percentage,
            time_spent,
        } => {
            let record_id = tracker
                .submit_completion(NewCompletion {
                    learner_id: learner,
                    content_id: content,
                    content_type: content_type.into(),
                    score,
                    total_questions: total,
                    percentage,
                    time_spent,
                    completed_at: None,
                })
                .await?;
            println!("recorded completion {record_id}");
        }
        Command::Show { learner } => {
            print_json(&tracker.get_curriculum_path(learner).await?)?;
        }
        Command::Start { learner } => {
            let path = tracker
                .request_status_transition(learner, PathStatus::InProgress)
                .await?;
            print_json(&path)?;
        }
        Command::Recalculate { learner } => {
            print_json(&tracker.recalculate(learner).await?)?;
        }
        Command::History { learner, limit } => {
            let ledger = tracker.ledger();
            print_json(&serde_json::json!({
                "summary": ledger.completion_summary(learner).await?,
                "recent": ledger.recent_completions(learner, limit).await?,
            }))?;
        }
    }
    Ok(())
}

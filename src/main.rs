//! Council CLI
//!
//! Sends one question to the council and prints each stage as it lands.

use council_client::api::HttpBackend;
use council_client::config::ClientConfig;
use council_client::ranking::short_model_name;
use council_client::session::{SessionController, SessionOutcome};
use council_client::state::{AssistantMessage, ChatSnapshot, ChatState, Conversation, Stage};
use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: council [--conversation <id>] <question...>";

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    conversation: Option<String>,
    question: String,
}

impl Cli {
    fn parse(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut args = args.into_iter();
        let mut conversation = None;
        let mut words = Vec::new();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--conversation" => conversation = Some(args.next()?),
                "-h" | "--help" => return None,
                _ => words.push(arg),
            }
        }
        let question = words.join(" ");
        if question.trim().is_empty() {
            return None;
        }
        Some(Self {
            conversation,
            question,
        })
    }
}

/// Tracks which stages were already shown
#[derive(Default)]
struct Progress {
    announced: [bool; 3],
    printed: [bool; 3],
}

impl Progress {
    fn report(&mut self, snapshot: &ChatSnapshot) {
        let Some(message) = snapshot.current.as_ref().and_then(Conversation::open_assistant) else {
            return;
        };
        for (i, stage) in Stage::ALL.into_iter().enumerate() {
            if message.loading.get(stage) && !self.announced[i] {
                self.announced[i] = true;
                eprintln!("{}...", stage_label(stage));
            }
            if message.is_filled(stage) && !self.printed[i] {
                self.printed[i] = true;
                print_stage(stage, message);
            }
        }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::One => "Stage 1: collecting individual responses",
        Stage::Two => "Stage 2: peer rankings",
        Stage::Three => "Stage 3: final synthesis",
    }
}

fn print_stage(stage: Stage, message: &AssistantMessage) {
    match stage {
        Stage::One => {
            for response in message.stage1.iter().flatten() {
                println!("## {}\n{}\n", short_model_name(&response.model), response.response);
            }
        }
        Stage::Two => {
            let label_to_model = message
                .metadata
                .as_ref()
                .map(|m| m.label_to_model.clone())
                .unwrap_or_default();
            for ranking in message.stage2.iter().flatten() {
                let order: Vec<&str> = ranking
                    .parsed_ranking
                    .iter()
                    .flatten()
                    .map(|label| {
                        label_to_model
                            .get(label)
                            .map_or(label.as_str(), |model| short_model_name(model))
                    })
                    .collect();
                println!("{} ranks: {}", short_model_name(&ranking.model), order.join(" > "));
            }
            let aggregate = message
                .metadata
                .as_ref()
                .map(|m| m.aggregate_rankings.as_slice())
                .unwrap_or_default();
            if !aggregate.is_empty() {
                println!("\nAggregate ranking:");
                for (place, rank) in aggregate.iter().enumerate() {
                    println!(
                        "{:>2}. {} (avg {:.2}, {} votes)",
                        place + 1,
                        short_model_name(&rank.model),
                        rank.average_rank,
                        rank.rankings_count
                    );
                }
            }
            println!();
        }
        Stage::Three => {
            if let Some(result) = &message.stage3 {
                println!("## Final answer ({})\n{}", short_model_name(&result.model), result.response);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout is reserved for the answer
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "council_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let Some(cli) = Cli::parse(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    // Configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(
        api_base = %config.api_base,
        models = ?config.council.council_models,
        chairman = %config.council.chairman_model,
        "Council client configured"
    );

    let backend = HttpBackend::from_config(&config)?;
    let controller = SessionController::new(backend, ChatState::new(), config.council.clone());

    if let Some(id) = &cli.conversation {
        controller.select_conversation(id).await?;
    }

    let mut updates = WatchStream::new(controller.subscribe());
    let mut progress = Progress::default();
    let handle = controller.send(&cli.question, vec![]).await?;
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            Some(snapshot) = updates.next() => progress.report(&snapshot),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling turn");
                controller.cancel();
            }
        }
    };
    progress.report(&controller.state().snapshot());

    match outcome {
        SessionOutcome::Completed => Ok(()),
        SessionOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(())
        }
        SessionOutcome::Failed(message) => Err(message.into()),
    }
}

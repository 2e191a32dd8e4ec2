use std::time::Duration;

use anyhow::bail;
use clap::Parser;

mod app;
mod cli;
mod config;
mod notes;
mod provider;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use inquire::error::InquireResult;
use notes::NoteDraft;
use semantic::{LiveOutcome, LiveQueryController};
use tokio::io::AsyncBufReadExt;

pub fn parse_tags(tags: String) -> Vec<String> {
    tags.split(',')
        .flat_map(|value| value.split_whitespace())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let paths = app::get_paths()?;
    let app = app::App::open(&paths)?;

    match args.command {
        cli::Command::Serve {} => {
            web::start_daemon(app);
            Ok(())
        }

        cli::Command::Add {
            title,
            content,
            tags,
        } => {
            let draft = NoteDraft {
                title,
                content,
                tags: tags.map(parse_tags).unwrap_or_default(),
            };

            let note = runtime()?.block_on(app.create_note(draft))?;
            app.save_vectors()?;

            println!("{}", serde_json::to_string_pretty(&note).unwrap());
            Ok(())
        }

        cli::Command::Update {
            id,
            title,
            content,
            tags,
        } => {
            let current = app.get_note(id)?;
            let draft = NoteDraft {
                title: title.unwrap_or(current.title),
                content: content.unwrap_or(current.content),
                tags: tags.map(parse_tags).unwrap_or(current.tags),
            };

            let note = runtime()?.block_on(app.update_note(id, draft))?;
            app.save_vectors()?;

            println!("{}", serde_json::to_string_pretty(&note).unwrap());
            Ok(())
        }

        cli::Command::Show { id } => {
            let note = app.get_note(id)?;
            println!("{}", serde_json::to_string_pretty(&note).unwrap());
            Ok(())
        }

        cli::Command::List {} => {
            let notes = app.list_notes()?;
            println!("{}", serde_json::to_string_pretty(&notes).unwrap());
            Ok(())
        }

        cli::Command::Delete { id, yes } => {
            let note = app.get_note(id)?;

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Are you sure you want to delete note {} (\"{}\")?",
                    note.id, note.title
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            app.delete_note(id)?;
            app.save_vectors()?;

            println!("note {} deleted", id);
            Ok(())
        }

        cli::Command::Search { query, limit } => {
            let results = runtime()?.block_on(app.search(&query, limit))?;
            let hits = app.with_notes(results)?;

            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
            Ok(())
        }

        cli::Command::Related { id, limit } => {
            let results = app.related_to(id, limit)?;
            let hits = app.with_notes(results)?;

            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
            Ok(())
        }

        cli::Command::Check {
            title,
            content,
            exclude,
        } => {
            let results = runtime()?.block_on(app.check_duplicates(&title, &content, exclude))?;
            let hits = app.with_notes(results)?;

            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
            Ok(())
        }

        cli::Command::Suggest {} => {
            let rt = runtime()?;
            rt.block_on(async {
                let debounce = Duration::from_millis(app.config().retrieval.debounce_ms);
                let (controller, mut rx) = LiveQueryController::new(app.retrieval(), debounce);

                let reader = tokio::spawn(async move {
                    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                    let mut lines = stdin.lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        controller.text_changed(line);
                    }
                    // Keep the controller alive long enough for the last
                    // debounce window to fire, then let it shut down
                    tokio::time::sleep(debounce * 2).await;
                    drop(controller);
                });

                while let Some(update) = rx.recv().await {
                    match update.outcome {
                        LiveOutcome::Results(results) => {
                            let hits = app.with_notes(results)?;
                            println!("{}", serde_json::to_string_pretty(&hits).unwrap());
                        }
                        LiveOutcome::Failed(msg) => {
                            eprintln!("suggestion {} failed: {}", update.seq, msg);
                        }
                    }
                }

                reader.await?;
                Ok::<(), anyhow::Error>(())
            })?;
            Ok(())
        }

        cli::Command::Reindex { all } => {
            let summary = runtime()?.block_on(app.reconcile(all))?;
            println!("{}", serde_json::to_string_pretty(&summary).unwrap());
            Ok(())
        }
    }
}

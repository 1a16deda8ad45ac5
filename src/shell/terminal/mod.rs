
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;
use console::style;
use dialoguer::console::Term;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::{Session, ShellState};
use crate::generation::{Answer, Backend};
use crate::pipeline::{Pipeline, RebuildStats};

/// Menu entries offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Rebuild,
    Ask(Backend),
    Retry,
    Quit,
}

impl Action {
    #[inline]
    pub fn label(self) -> String {
        match self {
            Self::Rebuild => "Rebuild vector index".to_string(),
            Self::Ask(backend) => format!("Answer with {}", backend),
            Self::Retry => "Retry".to_string(),
            Self::Quit => "Quit".to_string(),
        }
    }
}

/// Actions valid in `state`
#[inline]
pub fn menu_for(state: &ShellState) -> Vec<Action> {
    match state {
        ShellState::Idle | ShellState::IndexReady => vec![
            Action::Rebuild,
            Action::Ask(Backend::Llama),
            Action::Ask(Backend::Mistral),
            Action::Quit,
        ],
        ShellState::Error(_) => vec![Action::Retry, Action::Quit],
        ShellState::Ingesting | ShellState::Querying => vec![Action::Quit],
    }
}

/// Run the interactive shell until the user quits or input ends
#[inline]
pub async fn run_shell(pipeline: Pipeline) -> Result<()> {
    let term = prompt_term();
    eprintln!("{}", style("📄 Chat with PDF").bold().cyan());
    eprintln!(
        "Documents: {}",
        style(pipeline.config().storage.documents_dir.display()).cyan()
    );
    eprintln!();

    let mut session = Session::start(pipeline).await;
    let mut last_question = String::new();

    loop {
        print_status(session.state());

        let actions = menu_for(session.state());
        let labels: Vec<String> = actions.iter().map(|a| a.label()).collect();
        let selection = match Select::new()
            .with_prompt("What next?")
            .default(0)
            .items(&labels)
            .interact_on_opt(&term)
        {
            Ok(Some(index)) => actions[index],
            Ok(None) => Action::Quit,
            Err(e) => {
                debug!("Input closed: {}", e);
                Action::Quit
            }
        };

        match selection {
            Action::Rebuild => {
                let spinner = spinner("Preprocessing...");
                let result = session.rebuild().await;
                spinner.finish_and_clear();
                match result {
                    Ok(stats) => print_rebuilt(&stats),
                    Err(e) => print_failure(&e),
                }
            }
            Action::Ask(backend) => {
                let question: String = match Input::new()
                    .with_prompt("Ask a question from the PDF files")
                    .with_initial_text(last_question.clone())
                    .validate_with(|input: &String| -> Result<(), &str> {
                        if input.trim().is_empty() {
                            Err("Question must not be empty")
                        } else {
                            Ok(())
                        }
                    })
                    .interact_text_on(&term)
                {
                    Ok(question) => question,
                    Err(e) => {
                        debug!("Input closed: {}", e);
                        break;
                    }
                };
                last_question.clone_from(&question);

                let spinner = spinner("Processing...");
                let result = session.ask(&question, backend).await;
                spinner.finish_and_clear();
                match result {
                    Ok(answer) => print_answer(&answer),
                    Err(e) => print_failure(&e),
                }
            }
            Action::Retry => {
                if let Err(e) = session.retry().await {
                    print_failure(&e);
                }
            }
            Action::Quit => break,
        }
    }

    eprintln!("{}", style("Goodbye.").dim());
    Ok(())
}

/// Terminal the menus and question prompt are drawn on, as `dialoguer` expects it
fn prompt_term() -> Term {
    Term::stderr()
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_status(state: &ShellState) {
    let line = match state {
        ShellState::Error(_) => style(format!("[{}]", state)).red(),
        ShellState::IndexReady => style(format!("[{}]", state)).green(),
        _ => style(format!("[{}]", state)).yellow(),
    };
    eprintln!("{}", line);
}

fn print_rebuilt(stats: &RebuildStats) {
    eprintln!("{}", style("✓ Done").green().bold());
    eprintln!(
        "  Indexed {} chunks from {} documents",
        style(stats.chunks).cyan(),
        style(stats.documents).cyan()
    );
    eprintln!();
}

fn print_failure(error: &dyn std::fmt::Display) {
    eprintln!("{}", style(format!("✗ {}", error)).red());
    eprintln!();
}

/// Answer text and its sources, as shown after a successful question
#[inline]
pub fn format_answer(answer: &Answer) -> String {
    let mut out = String::new();
    if answer.is_blank() {
        let _ = writeln!(out, "{} returned an empty answer.", answer.backend.label());
    } else {
        let _ = writeln!(out, "{}", answer.text.trim());
    }

    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &answer.sources {
            let _ = writeln!(
                out,
                "  {} (chunk {}, similarity {:.3})",
                source.chunk.source.display(),
                source.chunk.chunk_index,
                source.similarity
            );
        }
    }
    out
}

fn print_answer(answer: &Answer) {
    eprintln!(
        "{} {}",
        style("✓ Done").green().bold(),
        style(format!("({}, {})", answer.backend, answer.model)).dim()
    );
    if answer.is_blank() {
        eprint!("{}", style(format_answer(answer)).yellow());
    } else {
        print!("{}", format_answer(answer));
    }
    eprintln!();
}

use anyhow::Result;
use citeflow::api::ApiClient;
use citeflow::config::{Config, RetrievalSettings};
use citeflow::state::{ConversationManager, ConversationStreamUpdate};
use citeflow::types::Citation;
use citeflow::util::parse_bool_str;
use crossterm::style::Stylize;
use std::io::Write as _;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let client = ApiClient::new(&config);
    let mut manager = ConversationManager::new(client, config.retrieval);

    if let Err(error) = manager.refresh_status().await {
        eprintln!("{}", format!("warning: {error:#}").dark_yellow());
    }
    if let Err(error) = manager.refresh_threads().await {
        eprintln!("{}", format!("warning: {error:#}").dark_yellow());
    }

    println!("{}", "CiteFlow - document-grounded Q&A".bold());
    print_status_line(&manager);
    println!("{}", "Type a question, or /help for commands.".dark_grey());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".cyan());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !run_command(&mut manager, command).await {
                break;
            }
            continue;
        }

        ask(&mut manager, &input).await?;
    }

    Ok(())
}

/// Stream one answer: decoded updates are printed by a separate task while
/// the manager drives the read loop; Ctrl-C cancels the in-flight stream.
async fn ask(manager: &mut ConversationManager, question: &str) -> Result<()> {
    if !manager.kb_ready() {
        println!(
            "{}",
            "No sources loaded. Add documents with /load or /upload first.".dark_yellow()
        );
        return Ok(());
    }

    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_stream_updates(update_rx));

    let cancel = CancellationToken::new();
    let ctrl_c_guard = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = manager.send_message(question, Some(&update_tx), &cancel).await;
    ctrl_c_guard.abort();
    drop(update_tx);
    let _ = printer.await;

    outcome?;
    Ok(())
}

async fn print_stream_updates(mut update_rx: mpsc::UnboundedReceiver<ConversationStreamUpdate>) {
    let mut sources: Vec<Citation> = Vec::new();
    let mut in_kb: Option<bool> = None;

    while let Some(update) = update_rx.recv().await {
        match update {
            ConversationStreamUpdate::Metadata {
                sources: header_sources,
                in_kb: header_in_kb,
            } => {
                sources = header_sources;
                in_kb = header_in_kb;
            }
            ConversationStreamUpdate::Delta(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            ConversationStreamUpdate::Finished => {
                println!();
                print_citations(&sources, in_kb);
            }
            ConversationStreamUpdate::Failed(message) => {
                println!("{}", message.red());
            }
            ConversationStreamUpdate::Cancelled => {
                println!("{}", "\n[stream cancelled]".dark_grey());
            }
        }
    }
}

fn print_citations(sources: &[Citation], in_kb: Option<bool>) {
    if in_kb == Some(false) {
        println!(
            "{}",
            "This information was not found in the loaded documents.".dark_yellow()
        );
        return;
    }
    if sources.is_empty() {
        return;
    }
    println!("{}", "Sources:".dark_grey());
    for citation in sources {
        let location = match (&citation.url, &citation.file, citation.page) {
            (Some(url), _, Some(page)) => format!("{url} (p.{page})"),
            (Some(url), _, None) => url.clone(),
            (None, Some(file), Some(page)) => format!("{file} (p.{page})"),
            (None, Some(file), None) => file.clone(),
            (None, None, Some(page)) => format!("p.{page}"),
            (None, None, None) => String::new(),
        };
        if location.is_empty() {
            println!("  - {}", citation.title);
        } else {
            println!("  - {} ({})", citation.title, location.dark_grey());
        }
    }
}

async fn run_command(manager: &mut ConversationManager, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    let result: Result<()> = match name {
        "quit" | "exit" => return false,
        "help" => {
            print_help();
            Ok(())
        }
        "status" => manager.refresh_status().await.map(|()| {
            print_status_line(manager);
        }),
        "sources" => {
            for source in manager.sources() {
                let marker = if source.enabled { "[x]" } else { "[ ]" };
                println!("{marker} {} ({})", source.info.title, source.info.kind);
            }
            Ok(())
        }
        "toggle" => {
            let title = rest.join(" ");
            let enabled = manager
                .sources()
                .iter()
                .find(|source| source.info.title == title)
                .map(|source| source.enabled);
            match enabled {
                Some(enabled) => {
                    manager.set_source_enabled(&title, !enabled);
                    Ok(())
                }
                None => {
                    println!("{}", format!("unknown source '{title}'").dark_yellow());
                    Ok(())
                }
            }
        }
        "threads" => manager.refresh_threads().await.map(|()| {
            for thread in manager.threads() {
                println!("{}  {} ({} messages)", thread.id, thread.title, thread.message_count);
            }
        }),
        "open" => match rest.first() {
            Some(id) => manager.open_thread(id).await.map(|()| {
                for turn in manager.turns() {
                    let label = match turn.role {
                        citeflow::state::Role::User => "you".cyan(),
                        citeflow::state::Role::Assistant => "assistant".green(),
                    };
                    println!("{label}: {}", turn.content);
                }
            }),
            None => {
                println!("usage: /open <thread-id>");
                Ok(())
            }
        },
        "new" => {
            manager.start_new_thread();
            Ok(())
        }
        "delete" => match rest.first() {
            Some(id) => manager.delete_thread(id).await,
            None => {
                println!("usage: /delete <thread-id>");
                Ok(())
            }
        },
        "rename" => match rest.split_first() {
            Some((id, title_parts)) if !title_parts.is_empty() => {
                manager.rename_thread(id, &title_parts.join(" ")).await
            }
            _ => {
                println!("usage: /rename <thread-id> <title>");
                Ok(())
            }
        },
        "load" => {
            if rest.is_empty() {
                println!("usage: /load <url> [url...]");
                Ok(())
            } else {
                manager.ingest_urls(&rest.join("\n")).await.map(|report| {
                    println!(
                        "Loaded {} chunks from {} source(s)",
                        report.loaded,
                        report.sources.len()
                    );
                    for error in report.errors {
                        println!("{}", error.dark_yellow());
                    }
                })
            }
        }
        "upload" => {
            if rest.is_empty() {
                println!("usage: /upload <path> [path...]");
                Ok(())
            } else {
                let paths: Vec<PathBuf> = rest.iter().map(PathBuf::from).collect();
                manager.ingest_files(&paths).await.map(|report| {
                    println!(
                        "Loaded {} chunks from {} source(s)",
                        report.loaded,
                        report.sources.len()
                    );
                })
            }
        }
        "clear" => manager.clear_knowledge_base().await,
        "set" => {
            apply_setting(manager, &rest);
            Ok(())
        }
        other => {
            println!("{}", format!("unknown command '/{other}'").dark_yellow());
            Ok(())
        }
    };

    if let Err(error) = result {
        eprintln!("{}", format!("error: {error:#}").red());
    }
    true
}

fn apply_setting(manager: &mut ConversationManager, args: &[&str]) {
    let mut retrieval = manager.retrieval();
    match args {
        ["topk", value] => match value.parse::<u32>() {
            Ok(top_k) if (1..=10).contains(&top_k) => retrieval.top_k = top_k,
            _ => {
                println!("usage: /set topk <1-10>");
                return;
            }
        },
        ["temp", value] => match value.parse::<f32>() {
            Ok(temperature) if (0.0..=1.0).contains(&temperature) => {
                retrieval.temperature = temperature;
            }
            _ => {
                println!("usage: /set temp <0.0-1.0>");
                return;
            }
        },
        ["hybrid", value] => match parse_bool_str(value) {
            Some(hybrid_search) => retrieval.hybrid_search = hybrid_search,
            None => {
                println!("usage: /set hybrid <on|off>");
                return;
            }
        },
        _ => {
            print_settings(&retrieval);
            return;
        }
    }
    manager.set_retrieval(retrieval);
    print_settings(&retrieval);
}

fn print_settings(retrieval: &RetrievalSettings) {
    println!(
        "top_k={} hybrid_search={} temperature={}",
        retrieval.top_k, retrieval.hybrid_search, retrieval.temperature
    );
}

fn print_status_line(manager: &ConversationManager) {
    if manager.kb_ready() {
        println!(
            "{}",
            format!("Ready: {} source(s) indexed", manager.sources().len()).green()
        );
    } else {
        println!(
            "{}",
            "No sources loaded. Add documents to begin".dark_yellow()
        );
    }
}

fn print_help() {
    println!("  /status               knowledge-base readiness and source count");
    println!("  /sources              list indexed sources and their toggles");
    println!("  /toggle <title>       enable/disable a source for retrieval");
    println!("  /threads              list saved threads");
    println!("  /open <id>            load a saved thread");
    println!("  /new                  start a fresh thread");
    println!("  /delete <id>          delete a saved thread");
    println!("  /rename <id> <title>  rename a saved thread");
    println!("  /load <url>...        index one or more URLs");
    println!("  /upload <path>...     index one or more files");
    println!("  /clear                wipe the knowledge base");
    println!("  /set [topk|temp|hybrid <value>]  show or change retrieval settings");
    println!("  /quit                 exit");
}

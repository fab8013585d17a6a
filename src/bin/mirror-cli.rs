#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for mirroring a Gmail account and querying the local copy

use clap::{Parser, Subcommand};
use gmail_mirror::{
    EnvCredentials, ImapConfig, ImapConnector, Mirror, MirrorConfig, RemoteHit, SearchHit,
    StoredMessage, SyncTarget, parse_target,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mirror-cli")]
#[command(about = "Resumable local mirror of a Gmail mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new messages and refresh flags and labels
    Sync {
        /// Mailbox to sync as `remote=local`; repeatable. Defaults to
        /// `MIRROR_MAILBOXES`.
        #[arg(long = "mailbox", value_parser = parse_mapping)]
        mailboxes: Vec<SyncTarget>,
    },

    /// List mailboxes on the server
    Folders,

    /// Full-text search over the local mirror
    Search {
        /// Search terms (FTS5 syntax)
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Search on the server with Gmail search syntax
    RemoteSearch {
        /// Gmail query (e.g. "from:alice has:attachment")
        query: String,

        /// Mailbox to search in
        #[arg(long, default_value = "[Gmail]/All Mail")]
        mailbox: String,
    },

    /// Show a mirrored message by its Gmail message id
    Show {
        /// `X-GM-MSGID` of the message
        global_id: u64,

        /// Print the stored raw message instead
        #[arg(long)]
        raw: bool,
    },
}

fn parse_mapping(s: &str) -> Result<SyncTarget, String> {
    parse_target(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = MirrorConfig::from_env()?;
    let mirror = Mirror::open(&config, ImapConfig::from_env()?, EnvCredentials)?
        .with_progress(|p| {
            info!(
                mailbox = %p.mailbox,
                uid = p.uid,
                global_id = p.global_id,
                "{}/{}",
                p.index,
                p.total
            );
        });

    match &args.command {
        Command::Sync { mailboxes } => cmd_sync(&mirror, &args, mailboxes).await?,
        Command::Folders => cmd_folders(&mirror, &args).await?,
        Command::Search { query, limit } => cmd_search(&mirror, &args, query, *limit)?,
        Command::RemoteSearch { query, mailbox } => {
            cmd_remote_search(&mirror, &args, mailbox, query).await?;
        }
        Command::Show { global_id, raw } => cmd_show(&mirror, &args, *global_id, *raw)?,
    }

    Ok(())
}

async fn cmd_sync(
    mirror: &Mirror<ImapConnector>,
    args: &Args,
    mailboxes: &[SyncTarget],
) -> anyhow::Result<()> {
    let stop = mirror.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping after the current message");
            stop.stop();
        }
    });

    let results = if mailboxes.is_empty() {
        mirror.sync().await
    } else {
        mirror.sync_targets(mailboxes).await
    };

    let mut failed = 0;
    let mut auth_failed = false;
    let mut rows = Vec::with_capacity(results.len());
    for result in &results {
        match result {
            Ok(report) => rows.push(serde_json::to_value(report)?),
            Err(e) => {
                failed += 1;
                auth_failed |= e.is_authentication();
                rows.push(serde_json::json!({
                    "mailbox": e.mailbox,
                    "uid": e.uid,
                    "error": e.error.to_string(),
                }));
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_sync_table(&results);
    }

    if auth_failed {
        anyhow::bail!("Login rejected; check IMAP_USERNAME and IMAP_PASSWORD");
    }
    if failed > 0 {
        anyhow::bail!("{failed} mailbox(es) failed to sync");
    }
    Ok(())
}

async fn cmd_folders(mirror: &Mirror<ImapConnector>, args: &Args) -> anyhow::Result<()> {
    let folders = mirror.list_folders().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
    } else {
        for folder in &folders {
            if folder.is_selectable() {
                println!("{}", folder.name);
            } else {
                println!("{} (not selectable)", folder.name);
            }
        }
    }

    Ok(())
}

fn cmd_search(
    mirror: &Mirror<ImapConnector>,
    args: &Args,
    query: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let hits = mirror.search(query, limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hit_table(&hits);
    }

    Ok(())
}

async fn cmd_remote_search(
    mirror: &Mirror<ImapConnector>,
    args: &Args,
    mailbox: &str,
    query: &str,
) -> anyhow::Result<()> {
    let hits = mirror.remote_search(mailbox, query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_remote_table(&hits);
    }

    Ok(())
}

fn cmd_show(
    mirror: &Mirror<ImapConnector>,
    args: &Args,
    global_id: u64,
    raw: bool,
) -> anyhow::Result<()> {
    if raw {
        let bytes = mirror.raw_message(global_id)?;
        print!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    let Some(message) = mirror.message(global_id)? else {
        anyhow::bail!("Message {global_id} is not mirrored");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        print_message_detail(&message);
    }

    Ok(())
}

fn print_sync_table(results: &[Result<gmail_mirror::SyncReport, gmail_mirror::SyncError>]) {
    println!(
        "{:<28} {:<12} {:>8} {:>8} {:>10}",
        "Mailbox", "Local", "Fetched", "Refresh", "Checkpoint"
    );
    println!("{}", "-".repeat(70));

    for result in results {
        match result {
            Ok(r) => {
                let stopped = if r.stopped { " (stopped)" } else { "" };
                println!(
                    "{:<28} {:<12} {:>8} {:>8} {:>10}{stopped}",
                    truncate(&r.mailbox, 26),
                    truncate(&r.local, 10),
                    r.fetched,
                    r.refreshed,
                    r.checkpoint_after,
                );
            }
            Err(e) => println!("{:<28} FAILED: {e}", truncate(&e.mailbox, 26)),
        }
    }
}

fn print_hit_table(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No messages found.");
        return;
    }

    println!("{:<20} {:<17} {:<30} Subject", "Id", "Date", "From");
    println!("{}", "-".repeat(100));

    for hit in hits {
        println!(
            "{:<20} {:<17} {:<30} {}",
            hit.global_id,
            hit.internal_date
                .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string()),
            truncate(&hit.sender, 28),
            truncate(&hit.subject, 40),
        );
        if !hit.snippet.is_empty() {
            println!("{:<20} {}", "", truncate(&hit.snippet, 78));
        }
    }

    println!("\n{} message(s)", hits.len());
}

fn print_remote_table(hits: &[RemoteHit]) {
    if hits.is_empty() {
        println!("No messages found.");
        return;
    }

    println!("{:<8} {:<20} {:<8} Labels", "UID", "Id", "Local");
    println!("{}", "-".repeat(80));

    for hit in hits {
        println!(
            "{:<8} {:<20} {:<8} {}",
            hit.uid,
            hit.global_id,
            if hit.mirrored { "yes" } else { "no" },
            truncate(&hit.labels.join(", "), 40),
        );
    }

    println!("\n{} message(s)", hits.len());
}

fn print_message_detail(message: &StoredMessage) {
    let join = |addrs: &[gmail_mirror::StoredAddress]| {
        addrs
            .iter()
            .map(|a| a.raw.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("Id:      {}", message.global_id);
    println!("Thread:  {}", message.thread_id);
    if let Some(date) = message.internal_date {
        println!("Date:    {}", date.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(from) = &message.from {
        println!("From:    {}", from.raw);
    }
    println!("To:      {}", join(&message.to));
    if !message.cc.is_empty() {
        println!("CC:      {}", join(&message.cc));
    }
    println!("Subject: {}", message.subject);
    println!("Flags:   {}", message.flags.join(" "));
    println!("Labels:  {}", message.labels.join(", "));
    for placement in &message.placements {
        println!("In:      {} (UID {})", placement.mailbox, placement.uid);
    }

    println!("\n--- Body ---\n");
    println!("{}", message.body);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

//! CLI entry point for `emlshelf`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use emlshelf::config::Config;
use emlshelf::index::Indexer;
use emlshelf::scan::PathResolver;
use emlshelf::store::content::ContentReader;
use emlshelf::store::search::SearchFilter;
use emlshelf::store::Database;
use emlshelf::thread::{ConversationNode, Conversations, ThreadLimits};

#[derive(Parser)]
#[command(
    name = "emlshelf",
    version,
    about = "Catalog, search and thread a directory of .eml files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing the message files
    #[arg(long, global = true, env = "EMLSHELF_EMAILS_DIR", value_name = "DIR")]
    emails_dir: Option<PathBuf>,

    /// SQLite catalog file
    #[arg(long, global = true, env = "EMLSHELF_DATABASE", value_name = "FILE")]
    database: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new message files under the emails directory
    Index {
        /// Parse worker threads (default: 2 × CPUs)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Records per database transaction
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List catalogued emails, newest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        json: bool,
    },
    /// List conversations, newest first
    Threads {
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the conversation containing an email
    Thread {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show one email, re-read from its file
    Show {
        id: i64,
        /// Print the HTML body instead of the text body
        #[arg(long)]
        html: bool,
        /// Print the raw header block
        #[arg(long)]
        headers: bool,
        #[arg(long)]
        json: bool,
    },
    /// Search the catalog (e.g. `invoice from:acme has:attachment date:2024`)
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        json: bool,
    },
    /// List known senders matching a prefix
    Senders {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show catalog statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Save an attachment to disk
    Attachment {
        /// Attachment id (see `show`)
        id: i64,
        /// Output file or directory
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Remove emails from the catalog (files are kept)
    Delete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    /// Refresh statistics and optionally compact the database
    Maintain {
        #[arg(long)]
        vacuum: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = emlshelf::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    if let Some(dir) = cli.emails_dir {
        config.paths.emails_dir = dir;
    }
    if let Some(db) = cli.database {
        config.paths.database = db;
    }

    match cli.command {
        Commands::Index {
            workers,
            batch_size,
            json,
        } => {
            if workers.is_some() {
                config.indexing.workers = workers;
            }
            if let Some(size) = batch_size {
                config.indexing.batch_size = size;
            }
            cmd_index(&config, json)
        }
        Commands::List {
            limit,
            offset,
            json,
        } => cmd_list(&config, limit.unwrap_or(config.display.page_size), offset, json),
        Commands::Threads {
            limit,
            offset,
            json,
        } => cmd_threads(&config, limit.unwrap_or(config.display.page_size), offset, json),
        Commands::Thread { id, json } => cmd_thread(&config, id, json),
        Commands::Show {
            id,
            html,
            headers,
            json,
        } => cmd_show(&config, id, html, headers, json),
        Commands::Search {
            query,
            limit,
            offset,
            json,
        } => cmd_search(
            &config,
            &query.join(" "),
            limit.unwrap_or(config.display.page_size),
            offset,
            json,
        ),
        Commands::Senders { prefix, limit } => cmd_senders(&config, &prefix, limit),
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Attachment { id, output } => cmd_attachment(&config, id, &output),
        Commands::Delete { ids } => cmd_delete(&config, &ids),
        Commands::Maintain { vacuum } => cmd_maintain(&config, vacuum),
        Commands::Config { save } => cmd_config(&config, save),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = emlshelf::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "emlshelf.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn open_db(config: &Config) -> anyhow::Result<Database> {
    Ok(Database::open(&config.paths.database)?)
}

fn conversations(config: &Config) -> anyhow::Result<Conversations> {
    Ok(Conversations::with_limits(
        open_db(config)?,
        ThreadLimits::from(&config.threading),
    ))
}

fn fmt_date(date: Option<DateTime<Utc>>, config: &Config) -> String {
    date.map(|d| d.format(&config.display.date_format).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Truncate to `width` characters, appending `…` when shortened.
fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Index the emails directory with a live progress bar.
fn cmd_index(config: &Config, json: bool) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let indexer = Indexer::new(db, &config.paths.emails_dir, config.indexing.clone());

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Indexing [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let result = indexer.index_with_progress(|current, total, path| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
        pb.set_message(path.to_string());
    })?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    if json {
        return print_json(&result);
    }

    println!();
    println!("  {:<16} {}", "Directory", config.paths.emails_dir.display());
    println!("  {:<16} {}", "Files found", result.total_found);
    println!("  {:<16} {}", "Newly indexed", result.new_indexed);
    println!("  {:<16} {}", "Already indexed", result.skipped);
    println!("  {:<16} {}", "Failed", result.failed);
    println!("  {:<16} {:.2?}", "Elapsed", elapsed);
    if !result.failed_files.is_empty() {
        println!();
        println!("  Failed files:");
        for path in &result.failed_files {
            println!("    {path}");
        }
    }
    println!();
    Ok(())
}

fn cmd_list(config: &Config, limit: usize, offset: usize, json: bool) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let emails = db.list_emails(limit, offset)?;

    if json {
        return print_json(&emails);
    }
    for r in &emails {
        println!(
            "{:>6}  {:<16}  {:<28}  {}{}",
            r.id,
            fmt_date(r.date, config),
            clip(&r.sender_display(), 28),
            if r.has_attachments { "+ " } else { "" },
            clip(&r.subject, 60)
        );
    }
    println!();
    println!(
        "  Showing {} of {} email(s)",
        emails.len(),
        db.count_emails()?
    );
    Ok(())
}

/// List conversation roots with their reply counts.
fn cmd_threads(config: &Config, limit: usize, offset: usize, json: bool) -> anyhow::Result<()> {
    let engine = conversations(config)?;
    let roots = engine.roots_with_reply_counts(limit, offset)?;

    if json {
        return print_json(&roots);
    }
    if roots.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<16}  {:>7}  {:<28}  Subject",
        "ID", "Date", "Replies", "From"
    );
    for node in &roots {
        let r = &node.record;
        println!(
            "{:>6}  {:<16}  {:>7}  {:<28}  {}",
            r.id,
            fmt_date(r.date, config),
            node.reply_count,
            clip(&r.sender_display(), 28),
            clip(&r.subject, 60)
        );
    }
    println!();
    println!(
        "  Showing {} of {} conversation(s)",
        roots.len(),
        engine.database().count_roots()?
    );
    Ok(())
}

/// Print the conversation tree containing an email.
fn cmd_thread(config: &Config, id: i64, json: bool) -> anyhow::Result<()> {
    let engine = conversations(config)?;
    let tree = engine.conversation_tree(id)?;

    if json {
        return print_json(&tree);
    }
    print_node(&tree, id, config);
    Ok(())
}

fn print_node(node: &ConversationNode, highlight: i64, config: &Config) {
    let indent = "  ".repeat(node.depth);
    let marker = if node.record.id == highlight { "*" } else { " " };
    let branch = if node.is_root { "" } else { "└ " };
    println!(
        "{marker}{indent}{branch}[{}] {}  {}  {}",
        node.record.id,
        fmt_date(node.record.date, config),
        clip(&node.record.sender_display(), 28),
        clip(&node.record.subject, 60)
    );
    for child in &node.children {
        print_node(child, highlight, config);
    }
}

/// Show a single email's content, re-parsed from disk.
fn cmd_show(config: &Config, id: i64, html: bool, headers: bool, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let db = open_db(config)?;
    let resolver = PathResolver::new(&config.paths.emails_dir)?;
    let content = ContentReader::new(db, resolver).load(id)?;
    let r = &content.record;

    if json {
        return print_json(&serde_json::json!({
            "email": r,
            "cc": content.cc,
            "bcc": content.bcc,
            "text": content.text,
            "html": content.html,
            "attachments": content.attachments,
        }));
    }

    if headers {
        println!("{}", content.raw_headers);
        return Ok(());
    }

    println!("{:<9} {}", "From:", r.sender_display());
    println!("{:<9} {}", "To:", r.recipients);
    if !content.cc.is_empty() {
        println!("{:<9} {}", "Cc:", content.cc.join(", "));
    }
    println!("{:<9} {}", "Date:", fmt_date(r.date, config));
    println!("{:<9} {}", "Subject:", r.subject);
    println!("{:<9} {}", "File:", r.file_path);
    println!();

    let body = if html {
        content.html.as_deref().or(content.text.as_deref())
    } else {
        content.text.as_deref().or(content.html.as_deref())
    };
    println!("{}", body.unwrap_or("(no body)"));

    if !content.attachments.is_empty() {
        println!();
        println!("Attachments:");
        for a in &content.attachments {
            println!(
                "  [{}] {} ({}, {})",
                a.id,
                a.filename,
                a.content_type,
                format_size(a.size, BINARY)
            );
        }
    }
    Ok(())
}

/// Full-text search with filters.
fn cmd_search(
    config: &Config,
    query: &str,
    limit: usize,
    offset: usize,
    json: bool,
) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let filter = SearchFilter::parse(query).with_page(limit, offset);
    let hits = db.search(&filter)?;

    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for hit in &hits {
        let r = &hit.email;
        println!(
            "{:>6}  {:<16}  {:<28}  {}",
            r.id,
            fmt_date(r.date, config),
            clip(&r.sender_display(), 28),
            clip(&r.subject, 60)
        );
        let snippet = hit.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
        if !snippet.is_empty() {
            println!("        {}", clip(&snippet, 110));
        }
    }
    println!();
    println!("  {} result(s)", hits.len());
    Ok(())
}

fn cmd_senders(config: &Config, prefix: &str, limit: usize) -> anyhow::Result<()> {
    let db = open_db(config)?;
    for sender in db.unique_senders(prefix, limit)? {
        if sender.name.is_empty() {
            println!("{:>6}  {}", sender.message_count, sender.address);
        } else {
            println!("{:>6}  {} <{}>", sender.message_count, sender.name, sender.address);
        }
    }
    Ok(())
}

/// Print catalog statistics.
fn cmd_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let db = open_db(config)?;
    let stats = db.stats()?;

    if json {
        return print_json(&stats);
    }

    println!();
    println!("  {:<20} {}", "Catalog", config.paths.database.display());
    println!("  {:<20} {}", "Emails", stats.total_emails);
    println!(
        "  {:<20} {} ({:.1}%)",
        "With attachments",
        stats.with_attachments,
        if stats.total_emails == 0 {
            0.0
        } else {
            stats.with_attachments as f64 / stats.total_emails as f64 * 100.0
        }
    );
    println!("  {:<20} {}", "Attachments", stats.total_attachments);
    println!(
        "  {:<20} {}",
        "Total size",
        format_size(stats.total_bytes, BINARY)
    );
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "  {:<20} {} - {}",
            "Date range",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }
    println!("  {:<20} {}", "Last indexed", fmt_date(stats.last_indexed, config));

    let top = db.unique_senders("", 10)?;
    if !top.is_empty() {
        println!();
        println!("  Top senders:");
        for sender in &top {
            println!("    {:>6}  {}", sender.message_count, sender.address);
        }
    }
    println!();
    Ok(())
}

/// Decode an attachment from its message file and write it out.
fn cmd_attachment(config: &Config, id: i64, output: &Path) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let db = open_db(config)?;
    let resolver = PathResolver::new(&config.paths.emails_dir)?;
    let (meta, data) = ContentReader::new(db, resolver).attachment_data(id)?;

    let target = if output.is_dir() {
        output.join(sanitize_filename(&meta.filename))
    } else {
        output.to_path_buf()
    };
    std::fs::write(&target, &data)?;
    println!(
        "  Saved {} ({}) to {}",
        meta.filename,
        format_size(data.len() as u64, BINARY),
        target.display()
    );
    Ok(())
}

/// Keep only the final path component and replace separators.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base.replace(['\0', ':'], "_")
    }
}

fn cmd_delete(config: &Config, ids: &[i64]) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let deleted = db.delete_emails(ids)?;
    println!("  Removed {deleted} of {} email(s) from the catalog", ids.len());
    Ok(())
}

fn cmd_maintain(config: &Config, vacuum: bool) -> anyhow::Result<()> {
    let db = open_db(config)?;
    db.optimize()?;
    if vacuum {
        db.vacuum()?;
    }
    println!("  Catalog optimized");
    Ok(())
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    if save {
        emlshelf::config::save_config(config)?;
    }
    if let Some(path) = emlshelf::config::config_file_path() {
        println!("# {}", path.display());
    }
    println!(
        "# log file: {}",
        emlshelf::config::log_file_path(config).display()
    );
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "emlshelf", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

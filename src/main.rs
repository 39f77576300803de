mod cli;

use std::io::{BufRead, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use cli::{BookmarkCommand, CacheCommand, Cli, Commands, ThemeCommand};
use mangalimited::prelude::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("mangalimited={level}")));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let app = MangaLimited::connect(config, true).await?;
    let refresh = cli.refresh;

    match cli.command {
        Commands::List { tab, limit, offset } => {
            let list = settle(app.listing(tab, limit, offset, refresh).await)?;
            println!("== {tab} ==");
            print_cards(&app, &list).await?;
        }
        Commands::Search { query, limit, offset } => {
            let list = settle(app.search(&query, limit, offset, refresh).await)?;
            if list.is_empty() {
                println!("No results found for \"{query}\"");
            } else {
                println!("Search results for \"{query}\"");
                print_cards(&app, &list).await?;
            }
        }
        Commands::Details { id } => {
            let manga = settle(app.details(&id, refresh).await)?;
            let saved = app.is_bookmarked(&manga.id).await?;
            print_details(&manga, saved);
        }
        Commands::Chapters { id, by_volume } => {
            let chapters = settle(app.chapters(&id, refresh).await)?;
            if chapters.is_empty() {
                println!("No chapters available");
            } else if by_volume {
                for group in group_by_volume(&chapters) {
                    let heading = if group.label == mangalimited::views::NO_VOLUME {
                        group.label.clone()
                    } else {
                        format!("Volume {}", group.label)
                    };
                    println!("{heading}");
                    for c in &group.chapters { print_chapter_row(c, "  "); }
                }
            } else {
                for c in &chapters { print_chapter_row(c, ""); }
            }
        }
        Commands::Read { chapter_id, manga, page, saver, interactive } => {
            let quality = if saver { PageQuality::DataSaver } else { PageQuality::Data };
            let mut session = settle(app.open_reader(&chapter_id, manga.as_deref(), quality, refresh).await)?;
            if session.is_empty() {
                println!("This chapter has no pages");
                return Ok(());
            }
            if let Some(p) = page {
                if session.goto(p).is_none() {
                    return Err(anyhow!("page {p} is out of range (1-{})", session.len()));
                }
            }
            print_page(&session);
            if interactive { reader_loop(&mut session)?; }
            app.save_progress(&session, manga.as_deref()).await?;
        }
        Commands::Download { chapter_id, out, cbz, force } => {
            if cbz {
                if settle(app.download_chapter_cbz(&chapter_id, &out, force).await)? {
                    println!("Wrote {}", out.display());
                } else {
                    println!("Skipped {} (exists or no pages; use --force)", out.display());
                }
            } else {
                let n = settle(app.download_chapter_images(&chapter_id, &out, force).await)?;
                println!("Downloaded {n} page(s) to {}", out.display());
            }
        }
        Commands::Bookmarks { action } => bookmarks(&app, action).await?,
        Commands::Theme { action } => {
            let theme = match action.unwrap_or(ThemeCommand::Show) {
                ThemeCommand::Show => app.initial_theme().await?,
                ThemeCommand::Set { theme } => {
                    app.set_theme(theme).await?;
                    theme
                }
                ThemeCommand::Toggle => app.toggle_theme().await?,
            };
            println!("{theme}");
        }
        Commands::Cache { action } => match action {
            CacheCommand::Clear { prefix, expired } => {
                let removed = if expired {
                    app.purge_expired_cache().await?
                } else {
                    app.clear_cache(prefix.as_deref()).await?
                };
                println!("Removed {removed} cache entr{}", if removed == 1 { "y" } else { "ies" });
            }
            CacheCommand::Vacuum => {
                app.vacuum_db().await?;
                println!("Database compacted");
            }
            CacheCommand::Stats => {
                let s = app.stats().await?;
                println!("bookmarks:      {}", s.bookmarks);
                println!("cache entries:  {} ({} expired)", s.cache_entries, s.expired_cache_entries);
            }
        },
    }
    Ok(())
}

async fn bookmarks(app: &MangaLimited, action: BookmarkCommand) -> Result<()> {
    match action {
        BookmarkCommand::List { sort } => {
            let list = app.list_bookmarks(sort).await?;
            if list.is_empty() {
                println!("No bookmarks yet");
            }
            for b in list {
                println!("{}  {}  (added {})", b.id, b.title, b.added_at);
            }
        }
        BookmarkCommand::Toggle { id } => {
            let saved = settle(app.toggle_bookmark(&id).await)?;
            println!("{}", if saved { "Bookmarked" } else { "Removed from bookmarks" });
        }
        BookmarkCommand::Check { id } => {
            match app.bookmark(&id).await? {
                Some(b) => println!("Bookmarked: {} (added {})", b.title, b.added_at),
                None => println!("Not bookmarked"),
            }
        }
        BookmarkCommand::Clear => {
            let n = app.clear_bookmarks().await?;
            println!("Removed {n} bookmark(s)");
        }
        BookmarkCommand::Export { file } => {
            let json = app.export_bookmarks().await?;
            match file {
                Some(path) => std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        BookmarkCommand::Import { file } => {
            let json = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let added = app.import_bookmarks(&json).await?;
            println!("Imported {added} bookmark(s)");
        }
    }
    Ok(())
}

/// Turn a remote read into what the reader sees: data, or a friendly message.
fn settle<T>(res: Result<T>) -> Result<T> {
    match Fetch::settle(res) {
        Fetch::Loaded(v) => Ok(v),
        failed => Err(anyhow!(failed.error_message().unwrap_or_default())),
    }
}

async fn print_cards(app: &MangaLimited, list: &[MangaSummary]) -> Result<()> {
    if list.is_empty() {
        println!("No manga found");
    }
    for m in list {
        let mark = if app.is_bookmarked(&m.id).await? { "*" } else { " " };
        println!("{mark} {}  [{}]", m.title, m.status);
        println!("    {}", m.id);
        println!("    {}", m.short_description());
        if let Some(cover) = &m.cover_url {
            println!("    cover: {cover}");
        }
    }
    Ok(())
}

fn print_details(m: &MangaSummary, bookmarked: bool) {
    println!("{}{}", m.title, if bookmarked { "  (bookmarked)" } else { "" });
    if !m.alt_titles.is_empty() {
        println!("Also known as: {}", m.alt_titles.join(", "));
    }
    println!("Status: {}    Demographic: {}", m.status, m.demographic);
    if let Some(year) = m.year {
        println!("Year: {year}");
    }
    if !m.tags.is_empty() {
        println!("Tags: {}", m.tags.join(", "));
    }
    match &m.cover_url {
        Some(cover) => println!("Cover: {cover}"),
        None => println!("Cover: none"),
    }
    println!();
    println!("{}", m.description);
}

fn print_chapter_row(c: &ChapterSummary, indent: &str) {
    let new = if c.is_new() { " NEW" } else { "" };
    println!("{indent}Ch. {}  {}  ({} pages, {}){new}  {}", c.number, c.title, c.pages, c.publish_date(), c.id);
}

fn print_page(session: &ReaderSession) {
    println!("[{}] {}", session.position(), session.current().unwrap_or_default());
}

/// Outcome of one reader command.
#[derive(Debug, PartialEq)]
enum Step {
    Moved,
    Notice(String),
    Quit,
}

fn end_of_chapter(session: &ReaderSession) -> String {
    match &session.next_chapter {
        Some(next) => format!("End of chapter. Next chapter: {next}"),
        None => "End of chapter".to_string(),
    }
}

fn reader_step(session: &mut ReaderSession, cmd: &str) -> Step {
    match cmd {
        "q" | "quit" => Step::Quit,
        "" | "n" | "next" => {
            if session.next().is_some() { Step::Moved } else { Step::Notice(end_of_chapter(session)) }
        }
        "p" | "prev" => {
            if session.prev().is_some() { Step::Moved } else { Step::Notice("Already at the first page".to_string()) }
        }
        "home" | "first" => {
            session.first();
            Step::Moved
        }
        "end" | "last" => {
            session.last();
            Step::Moved
        }
        other => match other.parse::<usize>() {
            Ok(page) if session.goto(page).is_some() => Step::Moved,
            Ok(page) => Step::Notice(format!("Page {page} is out of range (1-{})", session.len())),
            Err(_) => Step::Notice(format!("unknown command '{other}'")),
        },
    }
}

fn reader_loop(session: &mut ReaderSession) -> Result<()> {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    loop {
        write!(out, "n/p/home/end/<page>/q > ")?;
        out.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 { break; }
        match reader_step(session, line.trim()) {
            Step::Quit => break,
            Step::Moved => print_page(session),
            Step::Notice(msg) => println!("{msg}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(pages: usize) -> ReaderSession {
        ReaderSession::new("c", (1..=pages).map(|i| format!("p{i}")).collect())
    }

    #[test]
    fn out_of_range_page_is_reported_as_such() {
        let mut s = session(5);
        s.goto(3);
        assert_eq!(reader_step(&mut s, "9"), Step::Notice("Page 9 is out of range (1-5)".to_string()));
        assert_eq!(reader_step(&mut s, "0"), Step::Notice("Page 0 is out of range (1-5)".to_string()));
        assert_eq!(s.index(), 2);
        assert_eq!(reader_step(&mut s, "5"), Step::Moved);
    }

    #[test]
    fn single_page_chapter_edges() {
        let mut s = session(1);
        assert_eq!(reader_step(&mut s, "p"), Step::Notice("Already at the first page".to_string()));
        assert_eq!(reader_step(&mut s, "n"), Step::Notice("End of chapter".to_string()));
        s.next_chapter = Some("c2".to_string());
        assert_eq!(reader_step(&mut s, ""), Step::Notice("End of chapter. Next chapter: c2".to_string()));
        assert_eq!(reader_step(&mut s, "q"), Step::Quit);
        assert_eq!(reader_step(&mut s, "zz"), Step::Notice("unknown command 'zz'".to_string()));
    }
}

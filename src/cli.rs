use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use mangalimited::prelude::{BookmarkOrder, ListingTab, Theme};

/// Browse and read MangaDex from the terminal
#[derive(Debug, Parser)]
#[command(name = "mangalimited", author, version)]
#[command(about = "Browse, bookmark and read manga, manhwa and manhua from MangaDex", long_about = None)]
pub struct Cli {
    /// Config file (defaults to config.toml in the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bypass cached responses and fetch fresh data
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub refresh: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show a home tab (latest, popular, new, completed, ongoing)
    List {
        #[arg(short, long, default_value = "latest")]
        tab: ListingTab,
        #[arg(short, long, default_value_t = mangalimited::client::DEFAULT_LISTING_LIMIT)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// Search titles
    Search {
        query: String,
        #[arg(short, long, default_value_t = mangalimited::client::DEFAULT_SEARCH_LIMIT)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// Full details of one manga
    Details { id: String },
    /// Chapter list of a manga
    Chapters {
        id: String,
        /// Group chapters under their volume
        #[arg(long, action = ArgAction::SetTrue)]
        by_volume: bool,
    },
    /// Read a chapter page by page
    Read {
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: String,
        /// Manga the chapter belongs to, for previous/next chapter hints
        #[arg(short, long, value_name = "MANGA_ID")]
        manga: Option<String>,
        /// Open at this page (1-based) instead of the saved position
        #[arg(short, long)]
        page: Option<usize>,
        /// Use the compressed data-saver images
        #[arg(long, action = ArgAction::SetTrue)]
        saver: bool,
        /// Step through pages with n/p/home/end/<number>/q
        #[arg(short, long, action = ArgAction::SetTrue)]
        interactive: bool,
    },
    /// Save a chapter's pages to a directory, or a .cbz file with --cbz
    Download {
        #[arg(value_name = "CHAPTER_ID")]
        chapter_id: String,
        #[arg(value_name = "OUT")]
        out: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        cbz: bool,
        /// Overwrite existing files
        #[arg(short, long, action = ArgAction::SetTrue)]
        force: bool,
    },
    /// Manage bookmarks
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkCommand,
    },
    /// Show or change the colour theme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommand>,
    },
    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum BookmarkCommand {
    /// List saved manga
    List {
        #[arg(short, long, default_value = "newest")]
        sort: BookmarkOrder,
    },
    /// Add a manga, or remove it if already saved
    Toggle { id: String },
    /// Tell whether a manga is saved
    Check { id: String },
    /// Remove every bookmark
    Clear,
    /// Write bookmarks as JSON to a file or stdout
    Export { file: Option<PathBuf> },
    /// Merge bookmarks from a JSON export
    Import { file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum ThemeCommand {
    Show,
    Set { theme: Theme },
    Toggle,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Drop cached responses, optionally only keys starting with PREFIX
    Clear {
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<String>,
        /// Only drop expired entries
        #[arg(long, action = ArgAction::SetTrue)]
        expired: bool,
    },
    /// Compact the database file
    Vacuum,
    /// Counts of bookmarks and cache entries
    Stats,
}

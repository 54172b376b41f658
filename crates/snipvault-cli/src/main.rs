//! SnipVault CLI - manage snippets from the terminal
//!
//! Shares the vault directory with every other SnipVault front end. After
//! `snipvault unlock` (or `init`) a session stays valid for the configured
//! lifetime, so later commands run without the password. Reading or writing
//! sensitive content always needs the password, since a session carries no
//! key material.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use snipvault_core::{
    FilterCriteria, ItemType, LoadedItem, NewCategory, NewItem, SortKey, SortOrder, Vault,
    VaultPaths, VaultState,
};

/// SnipVault - a local vault for text snippets with encrypted secrets
#[derive(Parser, Debug)]
#[command(name = "snipvault")]
#[command(version)]
#[command(about = "SnipVault - local snippet vault with encrypted sensitive content")]
struct Args {
    /// Vault directory (defaults to the platform data directory)
    #[arg(long, env = "SNIPVAULT_DIR")]
    data_dir: Option<PathBuf>,

    /// Master password, prompted for when needed and not given
    #[arg(long, env = "SNIPVAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the master password of a new vault
    Init,
    /// Unlock with the master password and start a session
    Unlock,
    /// End the current session
    Lock,
    /// Show vault and session state
    Status,
    /// Change the master password and re-encrypt sensitive items
    Passwd,
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage items
    #[command(subcommand)]
    Item(ItemCommand),
    /// List categories matching a filter
    Filter(FilterArgs),
    /// Show recent clipboard history
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Add {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        pinned: bool,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum ItemCommand {
    Add {
        /// Category id
        category: i64,
        label: String,
        content: String,
        /// Encrypt the content at rest
        #[arg(long)]
        sensitive: bool,
        /// text, code, url or path
        #[arg(long = "type", default_value = "text")]
        kind: ItemType,
        #[arg(long)]
        description: Option<String>,
        /// Comma separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// List the items of a category
    List { category: i64 },
    /// Print an item's content and record the use
    Use { id: i64 },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Substring of a category name, item label, tag or content
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    min_items: Option<u64>,
    #[arg(long)]
    max_items: Option<u64>,
    #[arg(long)]
    min_usage: Option<u64>,
    #[arg(long)]
    max_usage: Option<u64>,
    /// RFC 3339 timestamp, inclusive
    #[arg(long)]
    used_after: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp, exclusive
    #[arg(long)]
    used_before: Option<DateTime<Utc>>,
    #[arg(long)]
    active: Option<bool>,
    #[arg(long)]
    pinned: Option<bool>,
    #[arg(long, value_enum, default_value_t = SortArg::Position)]
    sort: SortArg,
    #[arg(long)]
    desc: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Name,
    Usage,
    Recency,
    Position,
}

impl From<SortArg> for SortKey {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Name => SortKey::Name,
            SortArg::Usage => SortKey::Usage,
            SortArg::Recency => SortKey::Recency,
            SortArg::Position => SortKey::Position,
        }
    }
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        let order = if self.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };

        let mut criteria = FilterCriteria::new()
            .item_count_range(self.min_items, self.max_items)
            .used_between(self.used_after, self.used_before)
            .sort_by(self.sort.into(), order);
        if let Some(text) = &self.text {
            criteria = criteria.text(text);
        }
        if let Some(min) = self.min_usage {
            criteria = criteria.min_usage(min);
        }
        if let Some(max) = self.max_usage {
            criteria = criteria.max_usage(max);
        }
        if let Some(active) = self.active {
            criteria = criteria.active(active);
        }
        if let Some(pinned) = self.pinned {
            criteria = criteria.pinned(pinned);
        }
        criteria
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn password(args: &Args, prompt: &str) -> CliResult<String> {
    match &args.password {
        Some(password) => Ok(password.clone()),
        None => Ok(rpassword::prompt_password(prompt)?),
    }
}

/// Bring the vault into the unlocked state
///
/// Tries the persisted session first unless key material is needed.
async fn unlock(vault: &mut Vault, args: &Args, need_key: bool) -> CliResult<()> {
    if vault.state() == VaultState::NotInitialized {
        return Err("Vault not initialized. Run `snipvault init` first.".into());
    }

    if !need_key && vault.unlock_with_session().is_ok() {
        info!("Vault unlocked via session");
        return Ok(());
    }

    let password = password(args, "Master password: ")?;
    vault
        .unlock(&password)
        .await
        .map_err(|e| format!("Failed to unlock vault: {}", e))?;
    info!("Vault unlocked via password");
    Ok(())
}

fn print_item(item: &LoadedItem) {
    match item {
        LoadedItem::Ready(item) => {
            let tags = if item.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", item.tags.join(", "))
            };
            println!(
                "{:>5}  {:<24} {:<5} used {:>3}x{}",
                item.id, item.label, item.item_type, item.use_count, tags
            );
        }
        LoadedItem::Locked(placeholder) => {
            println!("{:>5}  {:<24} (sensitive, locked)", placeholder.id, placeholder.label);
        }
        LoadedItem::Corrupted(placeholder) => {
            println!("{:>5}  {:<24} (corrupted)", placeholder.id, placeholder.label);
        }
    }
}

async fn run(args: Args) -> CliResult<()> {
    let dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => VaultPaths::default_dir()?,
    };
    let mut vault = Vault::open(&dir).map_err(|e| format!("Failed to open vault: {}", e))?;

    match &args.command {
        Command::Init => {
            let password = password(&args, "New master password: ")?;
            if args.password.is_none() {
                let confirm = rpassword::prompt_password("Confirm master password: ")?;
                if confirm != password {
                    return Err("Passwords do not match".into());
                }
            }
            vault.initialize(&password).await?;
            println!("Vault initialized at {}", dir.display());
        }
        Command::Unlock => {
            unlock(&mut vault, &args, true).await?;
            let session = vault.context()?.session();
            println!("Unlocked until {}", session.expires_at.to_rfc3339());
        }
        Command::Lock => {
            vault.lock()?;
            println!("Locked");
        }
        Command::Status => {
            println!("Vault: {}", dir.display());
            println!("State: {:?}", vault.state());
            if vault.state() != VaultState::NotInitialized {
                match vault.sessions().validate()?.into_result() {
                    Ok(session) => println!(
                        "Session {} valid until {}",
                        session.short_id(),
                        session.expires_at.to_rfc3339()
                    ),
                    Err(e) => println!("{}", e),
                }
            }
        }
        Command::Passwd => {
            let old = password(&args, "Current master password: ")?;
            let new = rpassword::prompt_password("New master password: ")?;
            let confirm = rpassword::prompt_password("Confirm new master password: ")?;
            if confirm != new {
                return Err("Passwords do not match".into());
            }
            vault.change_password(&old, &new).await?;
            println!("Master password changed");
        }
        Command::Category(CategoryCommand::Add { name, icon, pinned }) => {
            unlock(&mut vault, &args, false).await?;
            let mut category = NewCategory::new(name);
            if let Some(icon) = icon {
                category = category.with_icon(icon);
            }
            if *pinned {
                category = category.pinned();
            }
            let id = vault.store().add_category(category)?;
            println!("Added category {}", id);
        }
        Command::Category(CategoryCommand::List) => {
            unlock(&mut vault, &args, false).await?;
            for category in vault.store().list_categories()? {
                let pin = if category.is_pinned { "*" } else { " " };
                println!("{:>5} {} {}", category.id, pin, category.name);
            }
        }
        Command::Item(ItemCommand::Add {
            category,
            label,
            content,
            sensitive,
            kind,
            description,
            tags,
        }) => {
            unlock(&mut vault, &args, *sensitive).await?;
            let mut item = NewItem::new(*category, label, content)
                .with_type(*kind)
                .with_tags(tags.iter().cloned());
            if *sensitive {
                item = item.sensitive();
            }
            if let Some(description) = description {
                item = item.with_description(description);
            }
            let id = vault.store().add_item(vault.context()?, item)?;
            println!("Added item {}", id);
        }
        Command::Item(ItemCommand::List { category }) => {
            unlock(&mut vault, &args, false).await?;
            let items = vault
                .store()
                .get_items_by_category(vault.context()?, *category)?;
            for item in &items {
                print_item(item);
            }
        }
        Command::Item(ItemCommand::Use { id }) => {
            unlock(&mut vault, &args, false).await?;
            let mut item = vault.store().get_item(vault.context()?, *id)?;
            if matches!(item, Some(LoadedItem::Locked(_))) {
                unlock(&mut vault, &args, true).await?;
                item = vault.store().get_item(vault.context()?, *id)?;
            }

            match item {
                Some(LoadedItem::Ready(item)) => {
                    vault.store().record_item_use(item.id)?;
                    println!("{}", item.content);
                }
                Some(LoadedItem::Corrupted(_)) => {
                    return Err(format!("Item {} is corrupted", id).into())
                }
                Some(LoadedItem::Locked(_)) => return Err("Vault is locked".into()),
                None => return Err(format!("Item {} not found", id).into()),
            }
        }
        Command::Filter(filter) => {
            unlock(&mut vault, &args, false).await?;
            let result = vault.filter().apply(&filter.criteria())?;
            for summary in result.iter() {
                let last_used = summary
                    .last_used_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>5}  {:<24} {:>4} items {:>5} uses  last used {}",
                    summary.category.id,
                    summary.category.name,
                    summary.item_count,
                    summary.usage_count,
                    last_used
                );
            }
        }
        Command::History { limit } => {
            unlock(&mut vault, &args, false).await?;
            for entry in vault.store().clipboard_history(*limit)? {
                let content = match (&entry.content, entry.item_id) {
                    (Some(content), _) => content.clone(),
                    (None, Some(item_id)) => format!("<sensitive item {}>", item_id),
                    (None, None) => String::new(),
                };
                println!("{}  {}", entry.copied_at.to_rfc3339(), content);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}

mod catalog;
mod client;
mod config;
mod kind;
mod models;
mod protocol;
mod server;
mod storage;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use catalog::{Presentation, SortKey};
use client::{ApiClient, SearchSort, api::sort_urls, downloader::Downloader, ui::ProgressBoard};
use color_eyre::eyre::{bail, eyre};
use config::{ClientConfig, Command};
use kind::FileKind;
use models::{FileRecord, format_size};
use storage::{BlobStore, InlineStore, Vault};

fn open_vault(config: &ClientConfig) -> color_eyre::Result<Vault> {
    let data_dir = config.data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Directory '{}' does not exist, creating...", data_dir.display());
    }

    let small = InlineStore::open(config.small_store_path(), config.small_store_capacity);
    let large = BlobStore::new(
        config.database_url(),
        &config.db_namespace,
        &config.db_database,
    );
    Ok(Vault::new(small, large))
}

fn print_records(records: &[FileRecord]) {
    if records.is_empty() {
        println!("No saved files");
        return;
    }
    for record in records {
        println!(
            "{} {:<40} [{}] {:>10}",
            record.kind().icon(),
            record.file_name,
            record.storage.badge(),
            format_size(record.size)
        );
    }
}

fn presentation_label(presentation: Presentation) -> &'static str {
    match presentation {
        Presentation::Image => "image",
        Presentation::Audio => "audio player",
        Presentation::Video => "video player",
        Presentation::Raw => "raw download",
    }
}

fn confirm_on_stdin(record: &FileRecord) -> bool {
    print!("Delete {} ({})? [y/N] ", record.file_name, record.storage.badge());
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(_) => false,
    }
}

async fn search(api: &ApiClient, keyword: &str, sort: SearchSort) -> color_eyre::Result<()> {
    let mut urls = api.search(keyword).await?;
    sort_urls(&mut urls, sort);
    println!("{} URLs for '{}'", urls.len(), keyword.trim());
    for url in urls {
        println!("{} {}", FileKind::from_url(&url).icon(), url);
    }
    Ok(())
}

async fn download(
    api: ApiClient,
    vault: &Vault,
    mut urls: Vec<String>,
    keyword: Option<String>,
) -> color_eyre::Result<()> {
    if let Some(keyword) = keyword {
        urls.extend(api.search(&keyword).await?);
    }
    if urls.is_empty() {
        bail!("Nothing to download: pass URLs or --keyword");
    }

    let downloader = Downloader::new(api);
    let board = ProgressBoard::new();
    let mut renderers = Vec::with_capacity(urls.len());
    let jobs = urls
        .into_iter()
        .map(|url| {
            let (tx, handle) = board.track(&url);
            renderers.push(handle);
            (url, tx)
        })
        .collect();

    let results = client::fetch_all(&downloader, vault, jobs).await;
    for handle in renderers {
        handle.await?;
    }

    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    for (url, result) in &results {
        if let Err(e) = result {
            eprintln!("{url}: {e}");
        }
    }

    println!();
    print_records(&vault.catalog().list(SortKey::default()).await);

    if failed > 0 {
        return Err(eyre!("{} of {} downloads failed", failed, results.len()));
    }
    Ok(())
}

async fn view(vault: &Vault, url: &str, out: Option<PathBuf>) -> color_eyre::Result<()> {
    let catalog = vault.catalog();
    let record = catalog.find(url).await?;
    let rendered = catalog.view(&record).await?;

    let path = out.unwrap_or_else(|| rendered.output_path(&std::env::temp_dir()));
    tokio::fs::write(&path, &rendered.bytes).await?;
    println!(
        "{} {} ({}, {}) written to {} for the {}",
        record.kind().icon(),
        record.file_name,
        record.content_type,
        format_size(record.size),
        path.display(),
        presentation_label(rendered.presentation)
    );
    Ok(())
}

async fn delete(vault: &Vault, url: &str, yes: bool) -> color_eyre::Result<()> {
    let catalog = vault.catalog();
    let record = catalog.find(url).await?;
    let deleted = catalog
        .delete(&record, |record| yes || confirm_on_stdin(record))
        .await?;
    if deleted {
        println!("Deleted {}", record.file_name);
    } else {
        println!("Kept {}", record.file_name);
    }
    Ok(())
}

async fn run_client(config: ClientConfig, command: Command) -> color_eyre::Result<()> {
    let api = ApiClient::new(config.server_url.clone())?;
    match command {
        Command::Keywords => {
            for keyword in api.all_keywords().await? {
                println!("{keyword}");
            }
        }
        Command::Search { keyword, sort } => search(&api, &keyword, sort).await?,
        Command::Download { urls, keyword } => {
            download(api, &open_vault(&config)?, urls, keyword).await?
        }
        Command::List { sort } => {
            print_records(&open_vault(&config)?.catalog().list(sort).await);
        }
        Command::View { url, out } => view(&open_vault(&config)?, &url, out).await?,
        Command::Delete { url, yes } => delete(&open_vault(&config)?, &url, yes).await?,
        Command::Serve(_) => bail!("serve does not run as a client command"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    color_eyre::install()?;

    let config = config::config();
    match config.command {
        Command::Serve(server_config) => server::serve(server_config).await,
        command => run_client(config.client, command).await,
    }
}

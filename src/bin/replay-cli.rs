use std::net::SocketAddr;

use clap::{Parser, Subcommand};

use replay_proxy::cache::{CacheEntry, CacheStore, FileStore};
use replay_proxy::http::FormFields;
use replay_proxy::observability::logging;
use replay_proxy::ProxyClient;

#[derive(Parser)]
#[command(name = "replay-cli")]
#[command(about = "Client and cache management for the recording proxy", long_about = None)]
struct Cli {
    /// Proxy address
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    proxy: SocketAddr,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL through the proxy
    Fetch {
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Form field as name=value (repeatable)
        #[arg(short, long = "data")]
        data: Vec<String>,
        /// Print response headers
        #[arg(short = 'i', long)]
        include: bool,
    },
    /// Stop the proxy
    Shutdown,
    /// Inspect a cache directory
    Cache {
        #[arg(long, default_value = "./cache")]
        cache_dir: String,
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Number of recorded responses
    Count,
    /// List recorded requests
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        per_page: usize,
    },
    /// Print one recorded response
    Show { key: String },
    /// Remove one recorded response
    Delete { key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    match cli.command {
        Commands::Fetch { url, method, data, include } => {
            let mut form = FormFields::new();
            for pair in &data {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected name=value, got `{}`", pair))?;
                form.insert(name, value);
            }

            let response = ProxyClient::new(cli.proxy).fetch(&url, &method, &form).await?;
            if include {
                println!("HTTP {}", response.status);
                for (name, value) in &response.headers {
                    println!("{}: {}", name, value);
                }
                println!();
            }
            print!("{}", response.text());
        }
        Commands::Shutdown => {
            ProxyClient::new(cli.proxy).shutdown().await?;
            println!("shutdown sent to {}", cli.proxy);
        }
        Commands::Cache { cache_dir, command } => {
            let store = FileStore::open(&cache_dir)?;
            match command {
                CacheCommands::Count => println!("{}", store.count()?),
                CacheCommands::List { page, per_page } => {
                    for entry in store.page_of_entries(page, per_page)? {
                        println!("{}  {:<6} {}", entry.key, entry.method, entry.url);
                    }
                }
                CacheCommands::Show { key } => {
                    let entry = CacheEntry::decode(&store.get(&key)?)?;
                    println!("{} {}", entry.method, entry.url);
                    println!();
                    print!("{}", String::from_utf8_lossy(&entry.response));
                }
                CacheCommands::Delete { key } => {
                    store.delete(&key)?;
                    println!("deleted {}", key);
                }
            }
        }
    }

    Ok(())
}

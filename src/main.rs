use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use imgpull::{AppDefaults, PullEvent, Registry, RegistryConfig};

/// Pull an image's config and layer blobs from an OCI/Docker registry
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Image reference, e.g. busybox, ns/app:1.0, registry.example:5000/ns/app
    image: String,

    /// Directory to write blobs into (defaults to a fresh temp directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Username for the registry token endpoint
    #[arg(long)]
    username: Option<String>,

    /// Password for the registry token endpoint
    #[arg(long)]
    password: Option<String>,

    /// Proxy URL; environment proxies apply when unset
    #[arg(long)]
    proxy: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Talk plain HTTP to the registry
    #[arg(long)]
    http: bool,

    /// Maximum concurrent layer downloads
    #[arg(long, default_value_t = 3)]
    concurrency: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("imgpull=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let defaults = AppDefaults::load().context("loading configuration defaults")?;

    let save_dir = cli
        .output
        .or(defaults.save_dir)
        .unwrap_or_else(|| std::env::temp_dir().join(format!("imgpull-{}", Uuid::new_v4())));
    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("creating save directory {}", save_dir.display()))?;
    println!("save dir {}", save_dir.display());

    let config = RegistryConfig {
        image: cli.image,
        save_dir,
        username: cli.username.or(defaults.username),
        password: cli.password.or(defaults.password),
        proxy: cli.proxy.or(defaults.proxy),
        insecure: cli.insecure,
        use_http: cli.http,
        max_concurrent_layers: cli.concurrency,
    };

    let registry = Registry::new(config)?.with_progress(render_progress());
    let config_path = registry.pull().await.context("pulling image")?;
    info!("image config written to {}", config_path.display());

    Ok(())
}

/// Render pull events as one progress bar per blob.
fn render_progress() -> imgpull::ProgressFn {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template(
        "{msg}\t{percent:>3}% {bar:40.cyan/blue} {binary_bytes_per_sec}",
    )
    .expect("valid progress template");
    let bars: Mutex<HashMap<String, ProgressBar>> = Mutex::new(HashMap::new());

    Box::new(move |event| match event {
        PullEvent::ManifestResolved { reference, layers } => {
            let _ = multi.println(format!("pulling {} ({} layers)", reference, layers));
        }
        PullEvent::BlobStarted { digest, total } => {
            let bar = multi.add(ProgressBar::new(total).with_style(style.clone()));
            bar.set_message(digest.clone());
            bars.lock().expect("progress map lock").insert(digest, bar);
        }
        PullEvent::BlobProgress {
            digest,
            transferred,
        } => {
            if let Some(bar) = bars.lock().expect("progress map lock").get(&digest) {
                bar.set_position(transferred);
            }
        }
        PullEvent::BlobFinished { digest } => {
            if let Some(bar) = bars.lock().expect("progress map lock").remove(&digest) {
                bar.finish();
            }
        }
        PullEvent::Complete { config_path } => {
            let _ = multi.println(format!("image config written to {}", config_path.display()));
        }
    })
}

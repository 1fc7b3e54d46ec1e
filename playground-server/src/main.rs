use anyhow::Context;
use clap::Parser;
use playground_exec::{
    CodeExecutionService, DockerCli, Language, LanguageRegistry, ResourceLimits, SandboxConfig,
};
use playground_server::{create_app, run_server};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PLAYGROUND_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Maximum number of concurrent sandboxes
    #[arg(short, long, env = "PLAYGROUND_MAX_CONCURRENT", default_value_t = 10)]
    max_concurrent: usize,

    /// Memory limit per sandbox in bytes
    #[arg(long, env = "PLAYGROUND_MEMORY_LIMIT", default_value_t = 536870912)] // 512MB
    memory_limit: u64,

    /// CPUs per sandbox
    #[arg(long, env = "PLAYGROUND_CPUS", default_value_t = 1.0)]
    cpus: f64,

    /// Maximum number of processes per sandbox
    #[arg(long, env = "PLAYGROUND_PIDS_LIMIT", default_value_t = 64)]
    pids_limit: u32,

    /// Wall-clock limit per execution in seconds
    #[arg(long, env = "PLAYGROUND_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Bytes captured per output stream
    #[arg(long, env = "PLAYGROUND_OUTPUT_LIMIT", default_value_t = 1048576)] // 1MB
    output_limit: usize,

    /// Languages to serve, comma separated (default: all)
    #[arg(long, env = "PLAYGROUND_LANGUAGES", value_delimiter = ',')]
    languages: Vec<Language>,

    /// Image override as `language=image`, repeatable
    #[arg(
        long = "image",
        env = "PLAYGROUND_IMAGES",
        value_delimiter = ',',
        value_parser = parse_image_override
    )]
    images: Vec<(Language, String)>,

    /// Docker client binary
    #[arg(long, env = "PLAYGROUND_DOCKER", default_value = "docker")]
    docker: PathBuf,

    /// Directory for sandbox workspaces; must be visible to the Docker daemon
    #[arg(long, env = "PLAYGROUND_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,
}

fn parse_image_override(s: &str) -> Result<(Language, String), String> {
    let (language, image) = s
        .split_once('=')
        .ok_or_else(|| format!("expected language=image, got {:?}", s))?;
    let language = language.parse::<Language>().map_err(|e| e.to_string())?;
    let image = image.trim();
    if image.is_empty() {
        return Err(format!("empty image for {}", language));
    }
    Ok((language, image.to_string()))
}

impl Args {
    fn sandbox_config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default()
            .with_limits(ResourceLimits {
                memory: self.memory_limit,
                cpus: self.cpus,
                pids: self.pids_limit,
            })
            .with_timeout(Duration::from_secs(self.timeout))
            .with_max_concurrent(self.max_concurrent)
            .with_output_limit(self.output_limit)
            .with_docker_bin(&self.docker);
        if let Some(root) = &self.workspace_root {
            config = config.with_workspace_root(root);
        }
        config
    }

    fn registry(&self) -> LanguageRegistry {
        let mut registry = LanguageRegistry::builtin();
        if !self.languages.is_empty() {
            registry = registry.restrict(&self.languages);
        }
        for (language, image) in &self.images {
            registry = registry.with_image(*language, image.clone());
        }
        registry
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    let args = Args::parse();

    let docker = DockerCli::new(&args.docker).context("container engine not found")?;
    let version = docker
        .version()
        .await
        .context("container engine is not reachable")?;
    info!(%version, "container engine ready");

    let registry = args.registry();
    info!(
        languages = ?registry.languages().map(|l| l.as_str()).collect::<Vec<_>>(),
        "serving languages"
    );

    let service = CodeExecutionService::new(args.sandbox_config(), registry)?;
    let app = create_app(service);
    run_server(app, SocketAddr::new(args.host, args.port)).await?;

    Ok(())
}

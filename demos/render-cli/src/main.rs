//! Renders a JSON configuration document against an in-memory secret store.
//!
//! ```text
//! param-render --identity serviceAccount:app@proj.iam --secrets secrets.json --grant app.json
//! ```
//!
//! The secrets file maps `project/secret` to its versions, oldest first:
//! `{"proj/weather-key": ["k1", "k2", "abc123"]}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use param_render::config::RenderConfig;
use param_render::kernel::{
    PayloadRenderer, ReferenceParser, RenderOptions, TaskScheduler, retry_render,
};
use param_render::policy::{GrantTableGate, ResourcePattern, Role};
use param_render::primitives::{ConfigDocument, Identity};
use param_render::resolver::{InMemorySecretStore, SecretResolver};
use param_render::telemetry::{TelemetryConfig, init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "param-render", version, about)]
struct Cli {
    /// JSON document containing `__REF__(secret://...)` references.
    document: PathBuf,

    /// Identity the render runs as.
    #[arg(long, env = "PARAM_RENDER_IDENTITY")]
    identity: Identity,

    /// JSON file seeding the in-memory secret store.
    #[arg(long)]
    secrets: PathBuf,

    /// Optional renderer configuration file.
    #[arg(long, env = "PARAM_RENDER_CONFIG")]
    config: Option<PathBuf>,

    /// Grant the identity accessor on every referenced secret before rendering.
    #[arg(long)]
    grant: bool,

    /// Print only the paths that were substituted instead of the document.
    #[arg(long)]
    redact: bool,
}

type SecretsFile = BTreeMap<String, Vec<String>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RenderConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&TelemetryConfig::default().with_default_directive(config.log_filter.as_str()))?;

    let raw = tokio::fs::read(&cli.document)
        .await
        .with_context(|| format!("reading {}", cli.document.display()))?;
    let document = ConfigDocument::from_slice(&raw)?;
    let parser = config.parser()?;

    let store = Arc::new(seed_store(&cli.secrets).await?);
    let gate = Arc::new(GrantTableGate::new());
    if cli.grant {
        grant_referenced(&gate, &parser, &document, &cli.identity)?;
    }

    let resolver = Arc::new(SecretResolver::with_config(store, config.resolver_config()));
    let mut renderer = PayloadRenderer::new(gate, resolver)
        .with_parser(parser.clone())
        .with_scheduler(TaskScheduler::new(config.scheduler_config()));
    if let Some(timeout) = config.call_timeout() {
        renderer = renderer.with_call_timeout(timeout);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling render");
            on_signal.cancel();
        }
    });

    let options = RenderOptions::new().with_cancellation(cancel.clone());
    let rendered = retry_render(&config.retry_policy(), &cancel, |attempt| {
        debug!(attempt, "rendering document");
        renderer.render_with(&document, &cli.identity, &options)
    })
    .await?;

    if cli.redact {
        for token in parser.parse(&document)? {
            println!("{}", token.path());
        }
    } else {
        println!("{}", serde_json::to_string_pretty(rendered.as_value())?);
    }
    Ok(())
}

async fn seed_store(path: &Path) -> Result<InMemorySecretStore> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let secrets: SecretsFile = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing secrets file {}", path.display()))?;

    let store = InMemorySecretStore::new();
    for (name, versions) in secrets {
        let Some((project, secret)) = name.split_once('/') else {
            bail!("secret `{name}` must be written as `project/secret`");
        };
        store.create_secret(project, secret);
        for payload in versions {
            store.add_version(project, secret, payload);
        }
        debug!(project, secret, "secret seeded");
    }
    Ok(store)
}

fn grant_referenced(
    gate: &GrantTableGate,
    parser: &ReferenceParser,
    document: &ConfigDocument,
    identity: &Identity,
) -> Result<()> {
    for token in parser.parse(document)? {
        let outcome = gate.grant(
            identity.clone(),
            ResourcePattern::secret(token.uri()),
            Role::SecretAccessor,
        );
        info!(resource = %token.uri().secret_resource(), ?outcome, "access granted");
    }
    Ok(())
}

//! Command-line surface and the top-level run.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use metering_e2e_core::{default_registry, Harness, HarnessConfig};
use metering_e2e_kube::{KubeFramework, KubeOptions};

#[derive(Debug, Parser)]
#[command(name = "metering-e2e", about = "Verify a metering deployment end to end")]
pub struct Cli {
    /// Namespace the metering operator runs in.
    #[arg(long, default_value = "metering-ci")]
    pub namespace: String,

    /// kube config path, e.g. $HOME/.kube/config. Inferred when omitted.
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Talk to the reporting API over https.
    #[arg(long)]
    pub https_api: bool,

    /// TOML file with harness settings; the environment still wins.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn kube_options(&self, config: &HarnessConfig) -> KubeOptions {
        KubeOptions {
            namespace: self.namespace.clone(),
            kubeconfig: self.kubeconfig.clone(),
            https_api: self.https_api,
            collect_window: config.collect_window,
        }
    }
}

/// Load and validate configuration, then prepare the output directory.
pub fn setup(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let config = HarnessConfig::load(cli.config.as_deref()).context("invalid harness configuration")?;
    config
        .prepare_output_dir()
        .context("cannot prepare the report output directory")?;
    Ok(config)
}

/// Run the standard registry against the cluster. Returns whether every case
/// passed; fatal stage failures come back as errors.
pub async fn run(cli: &Cli, config: &HarnessConfig) -> anyhow::Result<bool> {
    let registry = default_registry(config)?;
    let framework = KubeFramework::connect(&cli.kube_options(config))
        .await
        .context("failed to set up the cluster client")?;

    let summary = Harness::new(&framework, config, &registry).run().await?;
    println!("{summary}");
    info!(passed = summary.passed(), "run complete");
    Ok(summary.passed())
}

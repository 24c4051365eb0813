//! CLI command handling
//!
//! Builds the registry, platform client and device channel each command
//! needs from configuration, and formats output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::commands::Commands;
use crate::common::config::{ChannelKind, Config, DeviceConfig, RunPolicy};
use crate::common::{Error, Result};
use crate::device::{ApiChannel, CommandChannel, DeviceQueryChannel};
use crate::navigator::{
    check_upload_file, parse_inventory, ExecuteRequest, NavigatorClient, NetworkElement,
};
use crate::scripts::{Discovery, PlatformAccess, ScriptRegistry};
use crate::testing::{load_plan, report, CancelSignal, ExecutionEngine, TestPlan};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run {
            plan,
            scripts,
            continue_on_failure,
            json,
            verbose,
        } => {
            let policy = if continue_on_failure {
                RunPolicy::ContinueAndCollect
            } else {
                config.run.policy
            };
            let scripts = scripts.unwrap_or_else(|| config.scripts.directory.clone());
            run_plan(&config, &plan, &scripts, policy, json, verbose).await
        }

        Commands::Validate { plan, scripts } => {
            let plan_path = plan;
            let plan = load_plan(&plan_path)?;

            if let Some(dir) = scripts {
                let registry = ScriptRegistry::discover(&dir)?.into_registry()?;
                check_scripts_exist(&plan, &registry)?;
            }

            println!(
                "{} {} ({} steps)",
                "✓".green(),
                plan_path.display(),
                plan.len()
            );
            Ok(())
        }

        Commands::Scripts { dir, json } => {
            let dir = dir.unwrap_or_else(|| config.scripts.directory.clone());
            let discovery = ScriptRegistry::discover(&dir)?;
            if json {
                print_discovery_json(&discovery)
            } else {
                print_discovery(&dir, &discovery);
                Ok(())
            }
        }

        Commands::Token { show } => {
            let client = NavigatorClient::from_config(&config.navigator, &config.timeouts)?;
            let tokens = client.tokens();
            let token = tokens.get_valid_credential().await?;
            let credential = tokens.credential().await;

            println!("Token issued by {}", client.base_url());
            if let Some(remaining) = credential
                .expires_at
                .and_then(|at| at.duration_since(SystemTime::now()).ok())
            {
                println!("Expires in {} seconds", remaining.as_secs());
            }
            if show {
                println!("{}", token);
            }
            Ok(())
        }

        Commands::Upload {
            inventory,
            delay_secs,
        } => upload_inventory(&config, &inventory, Duration::from_secs(delay_secs)).await,

        Commands::Execute {
            script_name,
            cmd_file,
            ne_name,
            ne_type,
            type_group,
        } => {
            let client = NavigatorClient::from_config(&config.navigator, &config.timeouts)?;
            let ne = network_element(&config.device, ne_name, ne_type, type_group)?;
            let request = ExecuteRequest::run(&script_name, &cmd_file, &ne);

            let body = client.execute_script(&request).await?;
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => print!("{}", body),
            }
            Ok(())
        }
    }
}

async fn run_plan(
    config: &Config,
    plan_path: &Path,
    scripts_dir: &Path,
    policy: RunPolicy,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let plan = load_plan(plan_path)?;
    let client = platform_client(config)?;
    let platform = client.as_ref().map(|c| PlatformAccess {
        base_url: c.base_url().to_string(),
        tokens: c.tokens(),
    });

    // A broken script anywhere in the directory stops the run before step 1
    let registry = ScriptRegistry::discover_with(scripts_dir, platform)?.into_registry()?;
    let channel = device_channel(config, client)?;

    let cancel = CancelSignal::new();
    let engine = ExecutionEngine::new(registry, channel)
        .with_policy(policy)
        .with_script_timeout(config.timeouts.script())
        .with_query_timeout(config.timeouts.query())
        .with_cancel_signal(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if watch_interrupts(cancel, tokio::signal::ctrl_c).await {
            std::process::exit(130);
        }
    });

    if !json {
        report::print_header(&plan);
    }
    let run_report = engine
        .run_with(&plan, |result| {
            if !json {
                report::print_step(result, verbose);
            }
        })
        .await;
    interrupt.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&run_report)?);
    } else {
        report::print_summary(&run_report);
    }

    if run_report.passed() {
        Ok(())
    } else if run_report.cancelled {
        Err(Error::TestFailed("run cancelled".to_string()))
    } else {
        Err(Error::TestFailed(format!(
            "{} of {} steps failed",
            run_report.failed_count(),
            run_report.total_steps
        )))
    }
}

/// Cancel the run on the first interrupt
///
/// Returns true when a second interrupt arrives, meaning the user no longer
/// wants to wait for the current step to finish.
async fn watch_interrupts<F, Fut>(cancel: CancelSignal, mut interrupted: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupted, stopping after the current step (Ctrl-C again to quit)");
    cancel.cancel();

    if interrupted().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupted again, exiting");
    true
}

/// Fail with `ScriptNotFound` for the first step naming an unknown script
fn check_scripts_exist(plan: &TestPlan, registry: &ScriptRegistry) -> Result<()> {
    for step in plan.steps() {
        registry.resolve(&step.script)?;
    }
    Ok(())
}

/// Platform client when a host is configured
fn platform_client(config: &Config) -> Result<Option<NavigatorClient>> {
    if config.navigator.host.is_none() {
        return Ok(None);
    }
    NavigatorClient::from_config(&config.navigator, &config.timeouts).map(Some)
}

fn device_channel(
    config: &Config,
    client: Option<NavigatorClient>,
) -> Result<Arc<dyn DeviceQueryChannel>> {
    match config.device.channel {
        ChannelKind::Command => {
            let mut channel = CommandChannel::new();
            if let Some(dir) = &config.device.working_dir {
                channel = channel.with_working_dir(dir);
            }
            Ok(Arc::new(channel))
        }
        ChannelKind::Api => {
            let client = match client {
                Some(client) => client,
                None => NavigatorClient::from_config(&config.navigator, &config.timeouts)?,
            };
            let ne = network_element(&config.device, None, None, None)?;
            tracing::info!(ne = %ne.ne_name, "Verifying through the platform API");
            Ok(Arc::new(ApiChannel::new(client, ne)))
        }
    }
}

/// Network element from command-line overrides, falling back to `[device]`
fn network_element(
    device: &DeviceConfig,
    ne_name: Option<String>,
    ne_type: Option<String>,
    type_group: Option<String>,
) -> Result<NetworkElement> {
    fn pick(value: Option<String>, fallback: &Option<String>, key: &str) -> Result<String> {
        value.or_else(|| fallback.clone()).ok_or_else(|| {
            Error::Config(format!(
                "No network element {key} configured. Set [device] {key} or pass --{}",
                key.replace('_', "-")
            ))
        })
    }

    Ok(NetworkElement {
        ne_name: pick(ne_name, &device.ne_name, "ne_name")?,
        ne_type: pick(ne_type, &device.ne_type, "ne_type")?,
        type_group: pick(type_group, &device.type_group, "type_group")?,
    })
}

async fn upload_inventory(config: &Config, inventory_path: &Path, delay: Duration) -> Result<()> {
    let content = std::fs::read_to_string(inventory_path)
        .map_err(|e| Error::file_read(inventory_path, e))?;
    let base_dir = inventory_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let inventory = parse_inventory(&content, &base_dir);

    for issue in &inventory.issues {
        eprintln!(
            "{} {}:{}: {}",
            "Skipping".yellow(),
            inventory_path.display(),
            issue.line,
            issue.reason
        );
    }
    if inventory.uploads.is_empty() {
        println!("Nothing to upload");
        return Ok(());
    }

    let client = NavigatorClient::from_config(&config.navigator, &config.timeouts)?;

    let pb = ProgressBar::new(inventory.uploads.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| Error::Internal(format!("Invalid progress template: {}", e)))?
            .progress_chars("=> "),
    );

    let mut failures = Vec::new();
    for (i, upload) in inventory.uploads.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        pb.set_message(upload.script_name.clone());

        let result = match check_upload_file(upload) {
            Ok(()) => client.upload_script(upload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            pb.println(format!("  {} {}: {}", "✗".red(), upload.script_name, e));
            failures.push(e);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let total = inventory.uploads.len();
    println!("Uploaded {} of {} scripts", total - failures.len(), total);

    match failures.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

fn print_discovery(dir: &Path, discovery: &Discovery) {
    if discovery.registry.is_empty() {
        println!("No scripts found in {}", dir.display());
    } else {
        println!("Scripts in {}:", dir.display());
        for script in discovery.registry.iter() {
            match script.description() {
                Some(desc) => println!("  {} {}  {}", "✓".green(), script.name(), desc.dimmed()),
                None => println!("  {} {}", "✓".green(), script.name()),
            }
        }
    }

    for failure in &discovery.failures {
        println!("  {} {}", "✗".red(), failure);
    }
}

fn print_discovery_json(discovery: &Discovery) -> Result<()> {
    let scripts: Vec<_> = discovery
        .registry
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name(),
                "description": s.description(),
                "source": s.source().map(|p| p.display().to_string()),
            })
        })
        .collect();
    let failures: Vec<String> = discovery.failures.iter().map(|e| e.to_string()).collect();

    let output = serde_json::json!({ "scripts": scripts, "failures": failures });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_element_prefers_overrides() {
        let device = DeviceConfig {
            ne_name: Some("PE-6x".to_string()),
            ne_type: Some("3928".to_string()),
            type_group: Some("PN6x".to_string()),
            ..DeviceConfig::default()
        };

        let ne = network_element(&device, Some("PE-7x".to_string()), None, None).unwrap();
        assert_eq!(ne.ne_name, "PE-7x");
        assert_eq!(ne.ne_type, "3928");
        assert_eq!(ne.type_group, "PN6x");
    }

    #[test]
    fn test_network_element_names_missing_key() {
        let err = network_element(&DeviceConfig::default(), Some("PE".to_string()), None, None)
            .unwrap_err();
        assert!(err.to_string().contains("--ne-type"), "{err}");
    }

    #[test]
    fn test_no_platform_client_without_host() {
        assert!(platform_client(&Config::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_interrupt_quits() {
        let notify = Arc::new(tokio::sync::Notify::new());
        let cancel = CancelSignal::new();
        let source = notify.clone();
        let watcher = tokio::spawn(watch_interrupts(cancel.clone(), move || {
            let source = source.clone();
            async move {
                source.notified().await;
                Ok(())
            }
        }));

        notify.notify_one();
        while !cancel.is_cancelled() {
            tokio::task::yield_now().await;
        }
        assert!(!watcher.is_finished());

        notify.notify_one();
        let quit = tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(quit);
    }

    #[tokio::test]
    async fn test_no_signal_handler_never_quits() {
        let cancel = CancelSignal::new();
        let quit = watch_interrupts(cancel.clone(), || async {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no handler"))
        })
        .await;
        assert!(!quit);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_api_channel_requires_host() {
        let mut config = Config::default();
        config.device.channel = ChannelKind::Api;
        assert!(matches!(device_channel(&config, None), Err(Error::Config(_))));
    }
}

//! Offline rendering: build a runtime without timers, load the model once and process a group.

use kiln_core::{config::AppConfig, manager::GroupRequest, runtime::KilnRuntime};
use tokio::io::AsyncWriteExt;

use super::utils::{load_config, print_info, CliError, CliResult};

pub struct RenderOptions {
    pub config_file: String,
    /// Request-style file name, e.g. `site.css`.
    pub file: String,
    pub minimize: bool,
    /// Write to this path instead of stdout.
    pub output: Option<String>,
}

async fn offline_runtime(mut config: AppConfig) -> CliResult<KilnRuntime> {
    config.metrics.enabled = false;
    Ok(KilnRuntime::builder().with_config(config).disable_scheduler().preload_model().await?)
}

pub async fn render_group(options: RenderOptions) -> CliResult<()> {
    let config = load_config(&options.config_file)?;
    let mut request = GroupRequest::from_path(&options.file, None)?;
    request.minimize = options.minimize;

    let runtime = offline_runtime(config).await?;
    let manager = runtime.request_manager();

    let result = match &options.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await?;
            let rendered = manager.process_to(&request, &mut file).await;
            if let Ok(content) = &rendered {
                print_info(&format!("Wrote {} bytes to {path}", content.content.len()));
            }
            rendered
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let rendered = manager.process_to(&request, &mut stdout).await;
            if rendered.as_ref().is_ok_and(|content| !content.content.ends_with(b"\n")) {
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            rendered
        }
    };

    runtime.shutdown().await;
    result.map(|_| ()).map_err(CliError::from)
}

pub async fn list_groups(config_file: &str) -> CliResult<()> {
    let config = load_config(config_file)?;
    let runtime = offline_runtime(config).await?;

    let model = runtime
        .model_provider()
        .snapshot()
        .ok_or_else(|| CliError::Render("model not loaded".to_string()))?;

    println!("Groups ({}):", model.len());
    for name in model.group_names() {
        if let Some(group) = model.group(name) {
            println!("  {name}");
            for resource in group.resources() {
                println!("    {resource}");
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

use clap::Subcommand;
use std::path::Path;

use super::utils::{load_config, print_error, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file and the model it points to
    Validate {
        #[arg(short, long, default_value = "config/config.toml", env = "KILN_CONFIG")]
        file: String,
    },

    /// Show the effective configuration, environment overrides included
    Show {
        #[arg(short, long, default_value = "config/config.toml", env = "KILN_CONFIG")]
        file: String,
    },

    /// Generate a sample configuration file
    Generate {
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file).await,
        ConfigCommands::Show { file } => show_config(&file),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

async fn validate_config(file: &str) -> CliResult<()> {
    print_info(&format!("Loading configuration from {file}..."));
    let config = load_config(file)?;

    print_info("Validating configuration...");
    if let Err(e) = config.validate() {
        print_error(&e);
        return Err(CliError::Config(e));
    }

    print_info(&format!("Loading model from {}...", config.resources.model_path));
    let loader = kiln_core::model::FileModelLoader::new(&config.resources.model_path);
    let model = kiln_core::model::ModelLoader::load(&loader)
        .await
        .map_err(|e| CliError::Config(format!("model: {e}")))?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  Mount prefix: /{}", config.mount_prefix());
    println!("  Groups: {}", model.len());
    println!(
        "  Metrics: {}",
        if config.metrics.enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}

fn show_config(file: &str) -> CliResult<()> {
    let config = load_config(file)?;

    println!("Configuration from {file}:");

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Mount Prefix: {}", config.mount_prefix());

    println!("\n[Pipeline]");
    println!("  Model Update Period: {}s", config.pipeline.model_update_period_seconds);
    println!("  Content Update Period: {}s", config.pipeline.content_update_period_seconds);
    println!("  On Processor Error: {}", config.pipeline.on_processor_error);
    println!("  Evict On Error: {}", config.pipeline.evict_on_error);

    println!("\n[Resources]");
    println!("  Model Path: {}", config.resources.model_path);
    println!("  Root Dir: {}", config.resources.root_dir);
    for (name, value) in &config.resources.variables {
        println!("  ${{{name}}} = {value}");
    }

    println!("\n[Metrics]");
    println!("  Enabled: {}", config.metrics.enabled);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

const SAMPLE_CONFIG: &str = r##"# Kiln asset server configuration

[server]
bind_address = "127.0.0.1"
bind_port = 3030
mount_prefix = "assets"

[pipeline]
# Seconds a loaded model / processed group is reused. 0 recomputes on every request.
model_update_period_seconds = 300
content_update_period_seconds = 300
# "fail-fast" or "skip-and-continue"
on_processor_error = "fail-fast"
evict_on_error = false

[resources]
model_path = "config/groups.toml"
root_dir = "public"

[resources.variables]
brand = "#336699"

[metrics]
enabled = true

[logging]
level = "info"
format = "pretty"
"##;

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to point resources.model_path at your group definitions");

    Ok(())
}

use clap::{Parser, Subcommand};

mod commands;
use commands::{handle_config_command, list_groups, render_group, ConfigCommands, RenderOptions};

#[derive(Parser)]
#[command(name = "kiln-cli")]
#[command(about = "Kiln CLI - render resource groups and manage configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a group and print it, e.g. `render site.css`
    Render {
        /// Group file name; the extension selects styles (`.css`) or scripts (`.js`)
        file: String,

        /// Skip minimizer steps
        #[arg(long)]
        no_minimize: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        #[arg(short, long, default_value = "config/config.toml", env = "KILN_CONFIG")]
        config: String,
    },

    /// List the groups in the configured model
    Groups {
        #[arg(short, long, default_value = "config/config.toml", env = "KILN_CONFIG")]
        config: String,
    },

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { file, no_minimize, output, config } => {
            render_group(RenderOptions {
                config_file: config,
                file,
                minimize: !no_minimize,
                output,
            })
            .await?;
        }

        Commands::Groups { config } => {
            list_groups(&config).await?;
        }

        Commands::Config(config_command) => {
            handle_config_command(config_command).await?;
        }
    }

    Ok(())
}

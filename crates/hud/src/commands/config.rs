//! Config command - profiles and roots.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration as YAML
    Show,

    /// Print the configuration file path
    Path,

    /// Switch the active profile, creating it if needed
    Use {
        /// Profile name
        profile: String,
    },

    /// List or add roots of the active profile
    Roots {
        #[command(subcommand)]
        action: Option<RootsAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RootsAction {
    /// Add a directory file operations may touch
    Add {
        /// Directory to add
        path: String,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file().display());
            Ok(())
        }
        ConfigCommand::Use { profile } => cmd_use(ctx, &profile),
        ConfigCommand::Roots { action: None } => cmd_roots(ctx),
        ConfigCommand::Roots {
            action: Some(RootsAction::Add { path }),
        } => cmd_add_root(ctx, &path),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    if ctx.verbose {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(format!("# {}", ctx.paths.config_file().display())));
    }
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn cmd_use(ctx: &Context, name: &str) -> Result<()> {
    let mut config = ctx.load_config()?;
    let created = !config.profiles.contains_key(name);
    config.set_active_profile(name);
    ctx.save_config(&config)?;

    tracing::info!(profile = name, created, "switched profile");
    if created {
        println!("Created and switched to profile: {name}");
    } else {
        println!("Switched to profile: {name}");
    }
    Ok(())
}

fn cmd_roots(ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;
    let roots = &config.active_profile().roots;
    if roots.is_empty() {
        println!("(no roots)");
    }
    for root in roots {
        println!("- {root}");
    }
    Ok(())
}

fn cmd_add_root(ctx: &Context, path: &str) -> Result<()> {
    let mut config = ctx.load_config()?;
    let added = config.ensure_root(path)?;
    ctx.save_config(&config)?;
    println!("added root: {}", added.display());
    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod context;
mod prompt;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Local service orchestrator for development machines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a service from the catalog
    Install {
        /// Service name (e.g., "postgres", "tracing")
        service: String,

        /// Catalog version (defaults to the service's latest)
        #[arg(short, long)]
        version: Option<String>,

        /// Instance name (defaults to <service>-<version>)
        #[arg(short, long)]
        name: Option<String>,

        /// Environment overrides (KEY=VALUE)
        #[arg(short, long)]
        env: Vec<String>,

        /// Memory limit in MB
        #[arg(short, long)]
        memory: Option<u64>,

        /// CPU limit
        #[arg(short, long)]
        cpus: Option<f64>,

        /// Replace an existing instance of the same name
        #[arg(long)]
        replace: bool,

        /// Install alongside an existing instance under a fresh name
        #[arg(long = "new")]
        new_instance: bool,

        /// Do not install missing dependencies
        #[arg(long)]
        no_deps: bool,

        /// Reuse data left by a previous instance
        #[arg(long, conflicts_with = "delete_data")]
        reuse_data: bool,

        /// Delete data left by a previous instance
        #[arg(long)]
        delete_data: bool,

        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Start an installed instance
    Start {
        /// Instance name
        name: String,
    },

    /// Stop a running instance
    Stop {
        /// Instance name
        name: String,
    },

    /// Restart an instance
    Restart {
        /// Instance name
        name: String,
    },

    /// Remove an instance and its data
    Rm {
        /// Instance name
        name: String,

        /// Keep the instance's volumes for a later reinstall
        #[arg(long)]
        keep_volumes: bool,
    },

    /// List instances with their current status
    Ps,

    /// Show one instance in detail
    Status {
        /// Instance name
        name: String,
    },

    /// List catalog services
    Catalog {
        /// Only services of this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show the dependency plan for a service without installing anything
    Plan {
        /// Service name
        service: String,

        /// Catalog version
        #[arg(short, long)]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = context::Context::load()?;

    match cli.command {
        Commands::Install {
            service,
            version,
            name,
            env,
            memory,
            cpus,
            replace,
            new_instance,
            no_deps,
            reuse_data,
            delete_data,
            yes,
        } => {
            let args = commands::install::InstallArgs {
                service,
                version,
                name,
                env,
                memory,
                cpus,
                replace,
                new_instance,
                no_deps,
                reuse_data,
                delete_data,
                yes,
            };
            commands::install::install(&ctx, args).await?;
        }

        Commands::Start { name } => commands::lifecycle::start(&ctx, &name).await?,

        Commands::Stop { name } => commands::lifecycle::stop(&ctx, &name).await?,

        Commands::Restart { name } => commands::lifecycle::restart(&ctx, &name).await?,

        Commands::Rm { name, keep_volumes } => {
            commands::lifecycle::rm(&ctx, &name, keep_volumes).await?;
        }

        Commands::Ps => commands::ps::ps(&ctx).await?,

        Commands::Status { name } => commands::ps::status(&ctx, &name).await?,

        Commands::Catalog { category } => commands::catalog::list(&ctx, category.as_deref())?,

        Commands::Plan { service, version } => {
            commands::catalog::plan(&ctx, &service, version.as_deref()).await?;
        }
    }

    Ok(())
}

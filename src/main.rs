//! stackctl - main entry point

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use stackctl::cli::{Cli, Commands};
use stackctl::{
    ActionTable, AptPackageManager, Collaborators, Component, ComponentKind, DbInstaller,
    DbRuntime, DbUninstaller, HostExecutor, JsonPackageSource, LocalFs, StackConfig,
    process_guard,
};

/// Log to stderr with level, file and line; `RUST_LOG` overrides the default
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {e}");
    }

    if let Err(e) = run(Cli::parse_args()) {
        error!("{e:#}");
        eprintln!("✗ {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!(?cli, "arguments parsed");

    let config = StackConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let actions = match &cli.actions {
        Some(path) => ActionTable::load_from_file(path)?,
        None => ActionTable::builtin()?,
    };

    if let Commands::Validate = cli.command {
        config.validate()?;
        let types: Vec<&str> = actions.service_types().collect();
        println!("✓ Configuration valid; action table covers: {}", types.join(", "));
        return Ok(());
    }

    let service_type = stackctl::config::db_type(&config)?;
    let executor = HostExecutor::new();
    let packager = AptPackageManager::new(HostExecutor::new(), service_type);
    let packages = JsonPackageSource::new(&cli.packages);
    let deps = Collaborators {
        config: &config,
        actions: &actions,
        executor: &executor,
        packager: &packager,
        packages: &packages,
        fs: &LocalFs,
    };
    let component = Component::from_config(ComponentKind::Db, &config)?;

    match cli.command {
        Commands::Install => {
            let mut installer = DbInstaller::new(component, deps);
            installer.download()?;
            installer.configure()?;
            let trace_dir = installer.install()?;
            println!("✓ Installed; trace at {}", trace_dir.display());
        }
        Commands::Uninstall => {
            let uninstaller = DbUninstaller::new(component, deps);
            uninstaller.unconfigure()?;
            uninstaller.uninstall()?;
            println!("✓ Uninstalled");
        }
        Commands::Start => {
            DbRuntime::new(component, deps).start()?;
            println!("✓ Started");
        }
        Commands::Stop => {
            DbRuntime::new(component, deps).stop()?;
            println!("✓ Stopped");
        }
        Commands::Status => {
            let status = DbRuntime::new(component, deps).status()?;
            println!("trace: {}", status.trace_dir.display());
            println!("installed: {}", status.is_installed());
            for pkg in &status.packages {
                println!("  package {} {} removable={}", pkg.name, pkg.version, pkg.removable);
            }
            for dir in &status.dirs {
                println!("  dir {}", dir.display());
            }
        }
        Commands::CreateDb { name } => {
            stackctl::create_db(&config, &actions, &executor, &name)?;
            println!("✓ Created database {name}");
        }
        Commands::DropDb { name } => {
            stackctl::drop_db(&config, &actions, &executor, &name)?;
            println!("✓ Dropped database {name}");
        }
        // handled before collaborators are built
        Commands::Validate => {}
    }

    info!("done");
    Ok(())
}

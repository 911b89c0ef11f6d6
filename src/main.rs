// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use nestpm::fetcher::{HttpTransport, TarballFetcher};
use nestpm::installer::Installer;
use nestpm::manifest::{self, DependencyKind, Manifest};
use nestpm::registry::{
    DEFAULT_REGISTRY, DependencySpec, HttpRegistry, RegistryClient, StaticRegistry,
};
use nestpm::resolver::{DEFAULT_MAX_DEPTH, NODE_MODULES, PackageFailure, Resolution, Resolver};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the registry when `--registry` is absent
const REGISTRY_ENV: &str = "NESTPM_REGISTRY";

/// Specifiers forced regardless of what manifests request
const DEFAULT_OVERRIDES: &[(&str, &str)] = &[("noop3", "13.7.2")];

#[derive(Parser)]
#[command(name = "nestpm")]
#[command(author, version, about = "Minimal package manager with nested node_modules layout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by commands that resolve dependencies
#[derive(Args)]
struct ResolveArgs {
    /// Project directory containing package.json
    #[arg(short = 'C', long, default_value = ".")]
    project: PathBuf,

    /// Registry URL (default: $NESTPM_REGISTRY or https://registry.npmjs.org)
    #[arg(long)]
    registry: Option<String>,

    /// Resolve against a local JSON index of version documents instead of a registry
    #[arg(long, conflicts_with = "registry")]
    index: Option<PathBuf>,

    /// Force a specifier for a package, as NAME=SPEC (repeatable)
    #[arg(long = "override", value_name = "NAME=SPEC")]
    overrides: Vec<String>,

    /// Deepest nesting level a package may be placed at
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve package.json dependencies and install them into node_modules
    Install {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Keep the existing node_modules instead of installing from scratch
        #[arg(long)]
        keep: bool,
    },
    /// Print the installation plan without downloading anything
    Plan {
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// Add a dependency to package.json
    Add {
        /// Package as NAME or NAME@SPEC (e.g. is-thirteen@2.0.0)
        package: String,

        /// Add to devDependencies
        #[arg(short = 'D', long)]
        dev: bool,

        /// Project directory containing package.json
        #[arg(short = 'C', long, default_value = ".")]
        project: PathBuf,
    },
    /// Remove one or more dependencies from package.json
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,

        /// Project directory containing package.json
        #[arg(short = 'C', long, default_value = ".")]
        project: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Open the registry named by the command line
fn open_registry(args: &ResolveArgs) -> Result<Box<dyn RegistryClient>> {
    if let Some(index) = &args.index {
        info!("Using local index {}", index.display());
        let json = fs::read_to_string(index)
            .with_context(|| format!("Failed to read index {}", index.display()))?;
        return Ok(Box::new(StaticRegistry::from_json(&json)?));
    }

    let url = args
        .registry
        .clone()
        .or_else(|| std::env::var(REGISTRY_ENV).ok())
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
    info!("Using registry {}", url);
    Ok(Box::new(HttpRegistry::new(&url)?))
}

/// Parse `NAME=SPEC` override arguments
fn parse_overrides(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .filter(|(name, spec)| !name.is_empty() && !spec.is_empty())
                .map(|(name, spec)| (name.to_string(), spec.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Invalid override '{}', expected NAME=SPEC", arg))
        })
        .collect()
}

/// Read the project's dependencies without touching the filesystem
///
/// A project with no package.json has nothing to install.
fn read_dependencies(project: &Path) -> Result<DependencySpec> {
    let path = project.join(manifest::MANIFEST_FILE);
    if !path.exists() {
        return Ok(DependencySpec::new());
    }
    Ok(Manifest::load(&path)?.dependencies()?)
}

/// Resolve `dependencies` with the overrides and depth limit from `args`
fn resolve_project(
    args: &ResolveArgs,
    registry: &dyn RegistryClient,
    dependencies: &DependencySpec,
) -> Result<Resolution> {
    let defaults = DEFAULT_OVERRIDES
        .iter()
        .map(|(name, spec)| (name.to_string(), spec.to_string()));
    let resolver = Resolver::new(registry)
        .with_overrides(defaults)
        .with_overrides(parse_overrides(&args.overrides)?)
        .with_max_depth(args.max_depth);

    Ok(resolver.resolve(dependencies))
}

fn print_failures(stage: &str, failures: &[PackageFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("Failed to {} {} package(s):", stage, failures.len());
    for failure in failures {
        eprintln!("  {}", failure);
    }
}

fn cmd_install(args: ResolveArgs, keep: bool) -> Result<()> {
    info!("Installing dependencies for {}", args.project.display());

    let dependencies = Manifest::load_or_create(&args.project)?.dependencies()?;
    let registry = open_registry(&args)?;
    let resolution = resolve_project(&args, registry.as_ref(), &dependencies)?;
    print_failures("resolve", &resolution.failures);

    let install_root = args.project.join(NODE_MODULES);
    let fetcher = TarballFetcher::new(&install_root, HttpTransport::new()?);
    let installer = Installer::new(&install_root, registry.as_ref(), &fetcher);
    installer.prepare(!keep)?;

    let report = installer.install(&resolution.plan);
    print_failures("install", &report.failures);

    println!(
        "Installed {} package(s) into {}",
        report.installed.len(),
        install_root.display()
    );
    if !report.skipped.is_empty() {
        println!("  Skipped (already present): {}", report.skipped.len());
    }

    let failed = resolution.failures.len() + report.failures.len();
    if failed > 0 {
        return Err(anyhow::anyhow!("{} package(s) failed", failed));
    }
    Ok(())
}

fn cmd_plan(args: ResolveArgs) -> Result<()> {
    let dependencies = read_dependencies(&args.project)?;
    let registry = open_registry(&args)?;
    let resolution = resolve_project(&args, registry.as_ref(), &dependencies)?;

    if resolution.plan.is_empty() {
        println!("Nothing to install.");
    } else {
        println!("Installation plan:");
        for entry in &resolution.plan {
            let location = Path::new(NODE_MODULES).join(entry.scope.relative_path());
            println!("  {}@{} -> {}", entry.name, entry.version, location.join(&entry.name).display());
        }
        println!("\nTotal: {} package(s)", resolution.plan.len());
    }
    print_failures("resolve", &resolution.failures);

    if !resolution.is_complete() {
        return Err(anyhow::anyhow!(
            "{} package(s) could not be resolved",
            resolution.failures.len()
        ));
    }
    Ok(())
}

fn cmd_add(package: &str, dev: bool, project: &Path) -> Result<()> {
    let (name, specifier) = manifest::parse_package_arg(package)?;
    let kind = if dev {
        DependencyKind::Dev
    } else {
        DependencyKind::Runtime
    };

    let mut manifest = Manifest::load_or_create(project)?;
    manifest.add_dependency(&name, &specifier, kind)?;
    manifest.save()?;

    let section = match kind {
        DependencyKind::Runtime => "dependencies",
        DependencyKind::Dev => "devDependencies",
    };
    println!("Added {}@{} to {}", name, specifier, section);
    Ok(())
}

fn cmd_remove(packages: &[String], project: &Path) -> Result<()> {
    let path = project.join(manifest::MANIFEST_FILE);
    if !path.exists() {
        return Err(anyhow::anyhow!("{} not found", path.display()));
    }

    let mut manifest = Manifest::load(&path)?;
    let mut updated = false;
    let mut missing = Vec::new();

    for name in packages {
        match manifest.remove_dependency(name) {
            Some(DependencyKind::Runtime) => {
                println!("{} has been removed from dependencies.", name);
                updated = true;
            }
            Some(DependencyKind::Dev) => {
                println!("{} has been removed from devDependencies.", name);
                updated = true;
            }
            None => {
                eprintln!("{} not found in dependencies or devDependencies.", name);
                missing.push(name.as_str());
            }
        }
    }

    if updated {
        manifest.save()?;
        println!("{} has been updated.", path.display());
    } else {
        println!("No packages were removed.");
    }

    if !missing.is_empty() {
        return Err(anyhow::anyhow!("Not a dependency: {}", missing.join(", ")));
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install { resolve, keep }) => cmd_install(resolve, keep),
        Some(Commands::Plan { resolve }) => cmd_plan(resolve),
        Some(Commands::Add {
            package,
            dev,
            project,
        }) => cmd_add(&package, dev, &project),
        Some(Commands::Remove { packages, project }) => cmd_remove(&packages, &project),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "nestpm", &mut io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("nestpm v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'nestpm --help' for usage information");
            Ok(())
        }
    }
}

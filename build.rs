// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn project_arg() -> Arg {
    Arg::new("project")
        .short('C')
        .long("project")
        .value_name("DIR")
        .default_value(".")
        .help("Project directory containing package.json")
}

fn resolve_args(cmd: Command) -> Command {
    cmd.arg(project_arg())
        .arg(
            Arg::new("registry")
                .long("registry")
                .value_name("URL")
                .help("Registry URL (default: $NESTPM_REGISTRY or https://registry.npmjs.org)"),
        )
        .arg(
            Arg::new("index")
                .long("index")
                .value_name("FILE")
                .help("Resolve against a local JSON index of version documents"),
        )
        .arg(
            Arg::new("override")
                .long("override")
                .value_name("NAME=SPEC")
                .action(clap::ArgAction::Append)
                .help("Force a specifier for a package"),
        )
        .arg(
            Arg::new("max_depth")
                .long("max-depth")
                .default_value("64")
                .help("Deepest nesting level a package may be placed at"),
        )
}

fn build_cli() -> Command {
    Command::new("nestpm")
        .version(env!("CARGO_PKG_VERSION"))
        .author("nestpm Contributors")
        .about("Minimal package manager with nested node_modules layout")
        .subcommand_required(false)
        .subcommand(
            resolve_args(
                Command::new("install")
                    .about("Resolve package.json dependencies and install them into node_modules"),
            )
            .arg(
                Arg::new("keep")
                    .long("keep")
                    .action(clap::ArgAction::SetTrue)
                    .help("Keep the existing node_modules instead of installing from scratch"),
            ),
        )
        .subcommand(resolve_args(
            Command::new("plan").about("Print the installation plan without downloading anything"),
        ))
        .subcommand(
            Command::new("add")
                .about("Add a dependency to package.json")
                .arg(
                    Arg::new("package")
                        .required(true)
                        .help("Package as NAME or NAME@SPEC"),
                )
                .arg(
                    Arg::new("dev")
                        .short('D')
                        .long("dev")
                        .action(clap::ArgAction::SetTrue)
                        .help("Add to devDependencies"),
                )
                .arg(project_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove one or more dependencies from package.json")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                )
                .arg(project_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("nestpm.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}

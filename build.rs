// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: output path
fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("PATH")
        .required(true)
        .help("Output path")
}

/// Option overrides shared by bind and unbind commands
fn override_args() -> Vec<Arg> {
    vec![
        Arg::new("intermediate_folder")
            .long("intermediate-folder")
            .value_name("DIR")
            .help("Scratch folder for extracted files and containers"),
        Arg::new("threads")
            .long("threads")
            .value_name("N")
            .help("Worker threads for container packing"),
        Arg::new("compression")
            .long("compression")
            .value_name("LEVEL")
            .help("Compression level: none, low, medium, high"),
        Arg::new("suppress_validation")
            .long("suppress-validation")
            .action(ArgAction::SetTrue)
            .help("Skip _Validation generation and column checks"),
        Arg::new("warnings_as_errors")
            .long("warnings-as-errors")
            .action(ArgAction::SetTrue)
            .help("Treat warnings as errors"),
    ]
}

fn build_cli() -> Command {
    Command::new("wixbind")
        .version(env!("CARGO_PKG_VERSION"))
        .author("wixbind Contributors")
        .about("Bind and unbind Windows Installer databases and bootstrapper bundles")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("Options file (default: wixbind.toml)"),
        )
        .subcommand(
            Command::new("bind-bundle")
                .about("Bind a linked bundle intermediate into a bundle executable")
                .arg(Arg::new("intermediate").required(true).help("Intermediate JSON file"))
                .arg(output_arg())
                .arg(Arg::new("base_folder").short('b').long("base-folder").help("Payload source folder"))
                .arg(Arg::new("stub").long("stub").help("Engine stub the bundle starts with"))
                .arg(Arg::new("pdb").long("pdb").help("Write debug symbols to this path"))
                .args(override_args()),
        )
        .subcommand(
            Command::new("bind-msi")
                .about("Bind a table model into an installer database")
                .arg(Arg::new("data").required(true).help("Table model JSON file"))
                .arg(output_arg())
                .args(override_args()),
        )
        .subcommand(
            Command::new("unbind")
                .about("Unbind an installer database into a table model")
                .arg(Arg::new("database").required(true).help("Database to read"))
                .arg(output_arg())
                .arg(Arg::new("export_folder").short('e').long("export-folder").default_value("unbound"))
                .arg(Arg::new("extract_folder").long("extract-folder").help("Extract cabinets here"))
                .arg(Arg::new("output_type").long("output-type").default_value("product"))
                .arg(Arg::new("admin_image").long("admin-image").action(ArgAction::SetTrue))
                .arg(
                    Arg::new("suppress_demodularization")
                        .long("suppress-demodularization")
                        .action(ArgAction::SetTrue),
                )
                .args(override_args()),
        )
        .subcommand(
            Command::new("unbind-transform")
                .about("Unbind a transform into a table model with row operations")
                .arg(Arg::new("transform").required(true).help("Transform to read"))
                .arg(output_arg())
                .arg(Arg::new("export_folder").short('e').long("export-folder").default_value("unbound"))
                .args(override_args()),
        )
        .subcommand(
            Command::new("diff")
                .about("Generate a transform from the differences between two databases")
                .arg(Arg::new("reference").required(true).help("Reference database"))
                .arg(Arg::new("updated").required(true).help("Updated database"))
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("export-idt")
                .about("Export tables of a database as IDT archive files")
                .arg(Arg::new("database").required(true).help("Database to read"))
                .arg(Arg::new("output").short('o').long("output").default_value("."))
                .arg(Arg::new("table").short('t').long("table").action(ArgAction::Append)),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("wixbind.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}

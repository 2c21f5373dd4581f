use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use stackscript::dsl::{self, compiler::Module};
use stackscript::settings::{self, CompilerSettings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stackscript-cli", about = "stackscript compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding stackscript.json (defaults to the current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to stack-machine assembly
    Compile {
        file: PathBuf,
        /// Leave out @line,column,"origin" debug suffixes
        #[arg(long)]
        no_debug: bool,
        /// Print the compiled module (instructions and scopes) as JSON
        #[arg(long)]
        json: bool,
        /// Write the assembly here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Origin name used in diagnostics and debug info (defaults to the file name)
        #[arg(long)]
        origin: Option<String>,
    },
    /// Parse and compile without writing output
    Check { file: PathBuf },
    /// Show or change compiler settings
    Settings {
        /// Set whether debug info is emitted by default
        #[arg(long)]
        debug_info: Option<bool>,
    },
}

fn main() {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(|| PathBuf::from("."));
    let settings = settings::load_settings(&config_dir).unwrap_or_default();

    match cli.command {
        Commands::Compile {
            file,
            no_debug,
            json,
            output,
            origin,
        } => {
            let settings = CompilerSettings {
                debug_info: settings.debug_info && !no_debug,
                ..settings
            };
            run_compile(&file, origin.as_deref(), &settings, json, output.as_deref());
        }
        Commands::Check { file } => run_check(&file),
        Commands::Settings { debug_info } => run_settings(&config_dir, settings, debug_info),
    }
}

fn read_source(file: &Path) -> String {
    match fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("[stackscript] Cannot read {}: {e}", file.display());
            process::exit(1);
        }
    }
}

fn origin_of(file: &Path) -> String {
    file.file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn compile_or_exit(source: &str, origin: &str) -> Module {
    match dsl::compile_module(source, origin) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn run_compile(
    file: &Path,
    origin: Option<&str>,
    settings: &CompilerSettings,
    json: bool,
    output: Option<&Path>,
) {
    let source = read_source(file);
    let origin = origin.map_or_else(|| origin_of(file), str::to_string);
    let module = compile_or_exit(&source, &origin);

    let text = if json {
        serde_json::to_string_pretty(&module).unwrap_or_default()
    } else {
        module.to_text(settings.debug_info)
    };

    match output {
        Some(path) => {
            if let Err(e) = settings::atomic_write(path, format!("{text}\n").as_bytes()) {
                eprintln!("[stackscript] Cannot write {}: {e}", path.display());
                process::exit(1);
            }
            eprintln!(
                "[stackscript] Wrote {} instructions to {}",
                module.instructions.len(),
                path.display()
            );
        }
        None => println!("{text}"),
    }
}

fn run_check(file: &Path) {
    let source = read_source(file);
    let origin = origin_of(file);
    let module = compile_or_exit(&source, &origin);
    println!(
        "{origin}: ok ({} instructions, {} scopes)",
        module.instructions.len(),
        module.scopes.len()
    );
}

fn run_settings(config_dir: &Path, mut settings: CompilerSettings, debug_info: Option<bool>) {
    if let Some(debug_info) = debug_info {
        settings.debug_info = debug_info;
        if let Err(e) = settings::save_settings(config_dir, &settings) {
            eprintln!("[stackscript] Failed to save settings: {e}");
            process::exit(1);
        }
        eprintln!(
            "[stackscript] Saved {}",
            settings::settings_path(config_dir).display()
        );
    }
    println!("{}", serde_json::to_string_pretty(&settings).unwrap_or_default());
}

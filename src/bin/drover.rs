// src/bin/drover.rs
//
// The standalone `drover` binary: a Program with a small bundled namespace
// of shell-oriented tasks. Embedders wanting their own tasks build a
// Program around their own Collection instead.

use colored::Colorize;
use drover::cli::program::{Program, ProgramError};
use drover::core::collection::Collection;
use drover::core::task::{ArgDecl, Task};

fn namespace() -> Collection {
    let mut ns = Collection::new();
    let add = ns.add_task(
        Task::new("sh", |ctx, args| {
            let command = args
                .get_str("command")
                .map(str::to_string)
                .unwrap_or_default();
            ctx.run(&command)?;
            Ok(None)
        })
        .with_doc(
            "Run a shell command through the configured runner.\n\
             \n\
             Honors the full run.* configuration tree (echo, hide, warn,\n\
             shell, env, pty), so it doubles as a quick way to exercise\n\
             config files and environment overrides.",
        )
        .with_args(vec![
            ArgDecl::new("command").with_help("Command line to execute.")
        ]),
    );
    // The bundled namespace is static; a name conflict here is a build bug.
    if let Err(error) = add {
        eprintln!("{} {}", "Error:".red().bold(), error);
        std::process::exit(1);
    }
    ns
}

fn init_logging(args: &[String]) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp(None);
    if args.iter().any(|a| a == "-d" || a == "--debug") {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    init_logging(&args);

    let program = Program::new("Drover", "drover", env!("CARGO_PKG_VERSION"))
        .with_namespace(namespace());

    match program.run(&args) {
        Ok(()) => {}
        Err(ProgramError::Exit(request)) => {
            if let Some(message) = request.message {
                eprintln!("{}", message.red());
            }
            std::process::exit(request.code);
        }
        Err(ProgramError::Other(error)) => {
            eprintln!("{} {:#}", "Error:".red().bold(), error);
            std::process::exit(1);
        }
    }
}

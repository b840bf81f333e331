//! chatspeak main entry point
//!
//! Stands in for the game host: every line read from stdin is one event of
//! the update loop.
//!
//! - `/command args` runs a command (`/canceltts`, `/toggletts`, ...)
//! - `> Speaker: text` is a dialogue box poll
//! - `Speaker: text` is a Say-channel chat line
//! - anything else is a system message

use anyhow::{Context, Result};
use chatspeak::pipeline::{ChatLine, DialogueBox, SpeechPipeline};
use chatspeak::state::{chat_type, Config};
use chatspeak::speech::BackendKind;
use log::{debug, error, info};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;

/// One parsed line of console input
enum Event<'a> {
    Command(&'a str, &'a str),
    Dialogue(DialogueBox),
    Chat(ChatLine),
}

fn split_speaker(line: &str) -> (&str, &str) {
    match line.split_once(": ") {
        Some((speaker, text)) if !speaker.trim().is_empty() => (speaker.trim(), text),
        _ => ("", line),
    }
}

fn parse_event(line: &str) -> Event<'_> {
    if let Some(rest) = line.strip_prefix('/') {
        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
        return Event::Command(name, args.trim());
    }

    if let Some(rest) = line.strip_prefix('>') {
        let (speaker, text) = split_speaker(rest.trim_start());
        return Event::Dialogue(DialogueBox::new(speaker, text));
    }

    match split_speaker(line) {
        ("", text) => Event::Chat(ChatLine::new(chat_type::SYSTEM, None, text)),
        (speaker, text) => Event::Chat(ChatLine::new(chat_type::SAY, Some(speaker), text)),
    }
}

fn run_command(pipeline: &mut SpeechPipeline, name: &str, args: &str) {
    match name {
        "canceltts" => pipeline.cancel_tts(),
        "toggletts" => println!("{}", pipeline.toggle_tts()),
        "enabletts" => println!("{}", pipeline.enable_tts()),
        "disabletts" => println!("{}", pipeline.disable_tts()),
        "tttsay" => {
            pipeline.say_direct(args);
        }
        "backend" => match args.parse::<BackendKind>() {
            Ok(kind) => match pipeline.switch_backend(kind) {
                Ok(()) => println!("Backend: {}", kind),
                Err(e) => println!("{}", e),
            },
            Err(e) => println!("{}", e),
        },
        "port" => match args.parse::<u16>() {
            Ok(port) => {
                if let Err(e) = pipeline.set_server_port(port) {
                    println!("{}", e);
                }
            }
            Err(_) => println!("Usage: /port <number>"),
        },
        other => println!("Unknown command: /{}", other),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");

    // Initialize logger
    if debug_mode {
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("chatspeak.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open chatspeak.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "chatspeak version {} starting (debug mode, logging to chatspeak.log)",
            chatspeak::VERSION
        );
    } else {
        // Warnings and errors only, unless RUST_LOG says otherwise
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Warn)
            .parse_default_env()
            .init();
    }

    if let Err(e) = run(&args) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    debug!("Initializing chatspeak");

    let config_path = args
        .iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    info!("Config loaded from {:?}", config.path());

    let mut pipeline = SpeechPipeline::new(config);
    match pipeline.manager().active_kind() {
        Some(kind) => info!("Speech backend: {}", kind),
        None => eprintln!("Warning: no speech backend could be started; use /backend to pick one"),
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim_end();

        if !line.is_empty() {
            match parse_event(line) {
                Event::Command(name, args) => run_command(&mut pipeline, name, args),
                Event::Dialogue(dialogue) => {
                    let outcome = pipeline.poll_dialogue(&dialogue);
                    debug!("Dialogue: {:?}", outcome);
                }
                Event::Chat(chat) => {
                    let outcome = pipeline.handle_chat(&chat);
                    debug!("Chat: {:?}", outcome);
                }
            }
        }

        if let Some(notice) = pipeline.bind_failure_notice(true) {
            println!("{}", notice);
        }
    }

    info!("chatspeak exiting");
    Ok(())
}

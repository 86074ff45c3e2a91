//! unibroker command-line tool
//!
//! Runs a broker, or acts as a one-shot publisher or a printing subscriber.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde_json::Value;
use unibroker_core::{ClientError, Delay, HasEndpoint};
use unibroker_unix::{bind, connect, logging, Settings, SettingsOverride, StdDelay};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "unibroker")]
#[command(about = "Local publish/subscribe broker over UNIX domain sockets")]
struct Args {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding broker sockets
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Prefix of broker socket names
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Minimum log level (error, warn, info, debug, trace, off)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Process name used in log lines and as client name
    #[arg(long, global = true, default_value = "unibroker")]
    name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a broker until interrupted
    Serve {
        /// Broker name
        broker: String,
    },
    /// Publish one envelope and exit
    Publish {
        /// Broker name
        broker: String,
        /// Message type
        message_type: String,
        /// Entity as JSON
        entity: String,
    },
    /// Print received envelopes as JSON lines until interrupted
    Subscribe {
        /// Broker name
        broker: String,
        /// Message types to subscribe to
        #[arg(required = true)]
        types: Vec<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("<{}> [ERROR] {}", args.name, report(&e));
            return ExitCode::FAILURE;
        }
    };
    settings.apply(SettingsOverride {
        base_directory: args.base_dir,
        namespace: args.namespace,
        log_level: args.log_level,
    });

    let level = match settings.level_filter() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("<{}> [ERROR] {}", args.name, e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&args.name, level) {
        eprintln!("<{}> [WARN] logger already installed: {}", args.name, e);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed)) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let result = match args.command {
        Command::Serve { broker } => serve(&settings, &broker, &stop),
        Command::Publish {
            broker,
            message_type,
            entity,
        } => publish(&settings, &args.name, &broker, &message_type, &entity),
        Command::Subscribe { broker, types } => {
            subscribe(&settings, &args.name, &broker, &types, &stop)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", report(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

fn serve(settings: &Settings, broker_name: &str, stop: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let mut broker = bind(settings, broker_name)?;
    broker.run(&StdDelay, stop)?;
    info!("Broker '{}' stopped", broker_name);
    Ok(())
}

fn publish(
    settings: &Settings,
    client_name: &str,
    broker_name: &str,
    message_type: &str,
    entity: &str,
) -> Result<(), Box<dyn Error>> {
    let entity: Value = serde_json::from_str(entity)?;
    let mut client = connect(settings, client_name, broker_name)?;
    client.send(message_type, entity)?;
    client.flush_blocking(&StdDelay, PUBLISH_TIMEOUT)?;
    info!("Published '{}' to '{}'", message_type, broker_name);
    Ok(())
}

fn subscribe(
    settings: &Settings,
    client_name: &str,
    broker_name: &str,
    types: &[String],
    stop: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let mut client = connect(settings, client_name, broker_name)?;
    for message_type in types {
        client.subscribe(message_type)?;
    }
    info!("Subscribed to {:?} on '{}'", types, broker_name);

    let idle_sleep_ms = settings.broker.idle_sleep_ms;
    while !stop.load(Ordering::Relaxed) {
        let envelopes = client.receive();
        for envelope in &envelopes {
            println!("{}", serde_json::to_string(envelope)?);
        }
        let written = client.flush();

        if let Some(reason) = client.close_reason() {
            return Err(ClientError::Closed(reason.clone()).into());
        }
        if envelopes.is_empty() && written == 0 {
            StdDelay.sleep_ms(idle_sleep_ms);
        }
    }
    Ok(())
}

/// Error and its sources on one line
fn report(error: &dyn Error) -> String {
    let mut line = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        line.push_str(": ");
        line.push_str(&cause.to_string());
        source = cause.source();
    }
    line
}

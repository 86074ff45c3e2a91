use std::io::Write;

use env_logger::{Builder, Env};
use log::{LevelFilter, Record, SetLoggerError};

/// Install the process logger
///
/// Lines read `<name> [LEVEL] message`. `level` is the configured minimum;
/// `RUST_LOG` still takes precedence when set.
pub fn init(name: &str, level: LevelFilter) -> Result<(), SetLoggerError> {
    let name = name.to_string();
    Builder::new()
        .filter_level(level)
        .parse_env(Env::default())
        .format(move |buf, record| writeln!(buf, "{}", render(&name, record)))
        .try_init()
}

fn render(name: &str, record: &Record<'_>) -> String {
    format!("<{}> [{}] {}", name, record.level(), record.args())
}

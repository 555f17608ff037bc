use std::io::Write;

use log::LevelFilter;

/// Installs the process logger: `RUST_LOG` wins, otherwise info and above,
/// one `2024-01-10 12:00:00.123 INFO     message` line per record.
pub fn init() {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<8} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

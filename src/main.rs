/// Entry point for the procwatch performance monitoring tool.
///
/// This binary starts one monitoring session over the proc filesystem,
/// recording resource samples to a delimited text stream until the session
/// ends or the process is interrupted.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., an unreadable
/// configuration file, an unresolvable target process, or a record stream
/// that cannot be created).
///
/// # Examples
///
/// ```bash
/// PROCWATCH_CONFIG=monitor.json RUST_LOG=info cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    procwatch::run().await
}

use anyhow::{Context, Result};
use mercury::config::MercuryConfig;
use mercury::machine::daemon::MachineDaemon;
use mercury::machine::MACHINED_PORT;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file: Option<String> = None;
    let mut port: Option<u16> = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: machined [--conf FILE] [--port N]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = Some(args[i].clone());
                } else {
                    return Err(anyhow::anyhow!("--conf requires a FILE argument"));
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    i += 1;
                    port = Some(
                        args[i]
                            .parse()
                            .with_context(|| format!("Invalid --port value: {}", args[i]))?,
                    );
                } else {
                    return Err(anyhow::anyhow!("--port requires a number"));
                }
            }
            _ => {}
        }
        i += 1;
    }

    let (ip, conf_port) = match &conf_file {
        Some(path) => {
            let config = MercuryConfig::from_file(path)
                .with_context(|| format!("Cannot load config: {}", path))?;
            (config.machined_ip, config.machined_port)
        }
        None => ("127.0.0.1".to_string(), MACHINED_PORT),
    };
    let bind_addr = format!("{}:{}", ip, port.unwrap_or(conf_port));

    let daemon = MachineDaemon::bind(&bind_addr).await?;
    tracing::info!("[machined] [started] addr={}", bind_addr);

    tokio::select! {
        result = daemon.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("[machined] [shutdown] signal=ctrl_c");
            Ok(())
        }
    }
}

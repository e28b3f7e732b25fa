//! XJP Hydro Agent - EPANET 水力模拟服务
//!
//! Usage:
//! - Normal mode: `xjp-hydro-agent`
//! - With custom port: `xjp-hydro-agent --port 9000`
//! - Bind to localhost: `xjp-hydro-agent --host 127.0.0.1`

use xjp_hydro_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid port: {}", args[i + 1]);
                }
                i += 2;
            }
            "--host" if i + 1 < args.len() => {
                config.host_override = Some(args[i + 1].clone());
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("XJP Hydro Agent - EPANET 水力模拟服务");
    println!();
    println!("USAGE:");
    println!("    xjp-hydro-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port (env: PORT, default 8000)");
    println!("    --host <HOST>    Override the bind address (env: HOST, default 0.0.0.0)");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    UPLOAD_DIR        Directory for staged uploads (default: system temp dir)");
    println!("    STATIC_DIR        Served under /static if it exists (default: static)");
    println!("    WELL_KNOWN_DIR    Served under /well-known if it exists (default: .well-known)");
    println!("    MAX_UPLOAD_BYTES  Request body limit (default: 20 MiB)");
    println!("    RUST_LOG          Log filter (default: info,tower_http=info)");
}

fn main() {
    let config = parse_args();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(xjp_hydro_agent::init_and_run_with_config(config)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

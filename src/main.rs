use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use rfbridge::{BridgeConfig, HostMethods, HostValue, ScriptContext, SnapshotDirectory};

/// Load an HTML file into a fresh script context and print the resulting body.
#[derive(Parser, Debug)]
#[command(name = "rfbridge", version, about)]
struct Args {
    /// HTML file to parse into the document body
    file: PathBuf,

    /// JSON configuration file (see `BridgeConfig`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script to evaluate after parsing (repeatable)
    #[arg(long = "eval")]
    eval: Vec<String>,

    /// Skip inline scripts and `--eval`
    #[arg(long)]
    no_js: bool,

    /// Directory of snapshot goldens for `__rfox_match_image_snapshot__`
    #[arg(long)]
    snapshots: Option<PathBuf>,
}

fn host_methods(args: &Args) -> HostMethods {
    let mut host = HostMethods::new()
        .with_environment(|| {
            serde_json::json!({
                "platform": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "version": env!("CARGO_PKG_VERSION"),
            })
            .to_string()
        })
        .with_simulate_input_text(|text| println!("[input] {}", text))
        // Echo channel: replies with the call's own arguments from another thread.
        .with_invoke_method(|call, handle| {
            std::thread::spawn(move || {
                let _ = handle.complete(HostValue::Json(serde_json::json!({
                    "method": call.method,
                    "arguments": call.arguments,
                })));
            });
        });
    if let Some(dir) = &args.snapshots {
        host.match_image_snapshot = Some(SnapshotDirectory::new(dir.clone()).into_capability());
    }
    host
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    if args.no_js {
        config.enable_javascript = false;
    }
    let timeout = Duration::from_millis(config.pending_timeout_ms);

    let html = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let mut ctx = ScriptContext::new(config, host_methods(&args))?;
    ctx.on_exception(|e| eprintln!("Uncaught exception (context {}): {}", e.context_id, e.message));

    if !ctx.parse_html(&html) {
        anyhow::bail!("document has no body; nothing was parsed");
    }

    if !args.no_js {
        for code in &args.eval {
            let result = ctx.evaluate_script(code)?;
            if result.is_error {
                eprintln!("{}", result.value);
            } else {
                println!("{}", result.value);
            }
        }
    }

    ctx.wait_for_pending(timeout)?;
    println!("{}", ctx.body_markup().unwrap_or_default());
    Ok(())
}

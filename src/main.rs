use anyhow::{Context as _, Result};
use std::io::{self, BufRead, Read, Write};
use tracing::info;

use cierre_caja_lib::args::{self, Command};
use cierre_caja_lib::commands::{dispatch_str, VERSION};
use cierre_caja_lib::config::{env_properties, ConfigLoader};
use cierre_caja_lib::{logging, Backend};

fn main() -> Result<()> {
    let args = args::parse();
    let env = env_properties();

    let bootstrap = ConfigLoader::new()
        .layer("env", env.clone())
        .build()
        .context("invalid configuration")?;
    logging::init(&bootstrap.log_dir);
    info!("Starting cierre-caja v{VERSION}");

    let backend = Backend::open(env).context("failed to open the sheet store")?;

    match args.command {
        Command::Init => {
            let created = backend.provision().context("failed to provision sheets")?;
            for name in &created {
                println!("created sheet {name}");
            }
            println!(
                "store ready at {} ({} new sheets)",
                backend.db.db_path.display(),
                created.len()
            );
        }
        Command::Call { request } => {
            let raw = match request {
                Some(raw) => raw,
                None => {
                    let mut buf = String::new();
                    io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read request from stdin")?;
                    buf
                }
            };
            let response = dispatch_str(&backend.context(), &raw);
            println!("{response}");
        }
        Command::Serve => {
            let ctx = backend.context();
            let stdin = io::stdin();
            let mut stdout = io::stdout().lock();
            for line in stdin.lock().lines() {
                let line = line.context("failed to read stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                let response = dispatch_str(&ctx, &line);
                writeln!(stdout, "{response}")?;
                stdout.flush()?;
            }
            info!("stdin closed, shutting down");
        }
    }
    Ok(())
}

//! Build script.
//!
//! Use `cargo xtask` to execute.

use anyhow::Context;
use clap::Parser;
use devx_cmd::cmd;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Build EDUB firmware images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Disable the hardware watchdog.
    #[arg(long)]
    disable_watchdog: bool,

    /// Firmware log level.
    #[arg(short, long, default_value = "info")]
    log: String,
}

fn project_root() -> anyhow::Result<PathBuf> {
    let root = Path::new(&env!("CARGO_MANIFEST_DIR")).ancestors().nth(1).context("no project root")?;
    Ok(root.to_path_buf())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let root = project_root()?;
    let firmware_dir = root.join("edub-firmware");
    let variant = if args.disable_watchdog { "_nowdg" } else { "" };
    let image = format!("edub{variant}.bin");

    fs::create_dir_all(root.join("image"))?;

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

    let mut build = cmd!(&cargo, "build", "--release");
    build.current_dir(&firmware_dir).env("DEFMT_LOG", &args.log);
    if args.disable_watchdog {
        build.env("DISABLE_WATCHDOG", "1");
    }
    build.run()?;

    let mut objcopy = cmd!(&cargo, "objcopy", "--release", "--", "-O", "binary", format!("../image/{image}"));
    objcopy.current_dir(&firmware_dir).env("DEFMT_LOG", &args.log);
    if args.disable_watchdog {
        objcopy.env("DISABLE_WATCHDOG", "1");
    }
    objcopy.run()?;

    println!();
    println!(
        "Built EDUB firmware image/{image}{}",
        if args.disable_watchdog { " with disabled watchdog" } else { "" }
    );

    Ok(())
}

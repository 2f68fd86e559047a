use anyhow::Result;
use clap::{Parser, Subcommand};
use curvecast_common::{GeometryKind, MarchFamily, RayOptions};
use curvecast_render::{Projection, ViewerPose, prepare_frame};
use curvecast_shader::{FeatureFlags, synthesize};
use curvecast_world::{Population, reference_world};
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for curvecast")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, deny, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Generate every tracer program variant and print its digest
    Shaders {
        /// Also write each variant's WGSL into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests()?;
            run_deny()?;
            run_doc()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => run_tests()?,
        Commands::Deny => run_deny()?,
        Commands::Doc => run_doc()?,
        Commands::Build => run_build()?,
        Commands::Shaders { out } => run_shaders(out)?,
    }

    Ok(())
}

fn run_fmt() -> Result<()> {
    println!("==> Running cargo fmt --check");
    let status = Command::new("cargo")
        .args(["fmt", "--all", "--", "--check"])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo fmt check failed");
    }
    Ok(())
}

fn run_clippy() -> Result<()> {
    println!("==> Running cargo clippy");
    let status = Command::new("cargo")
        .args([
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo clippy failed");
    }
    Ok(())
}

fn run_tests() -> Result<()> {
    println!("==> Running cargo test");
    let status = Command::new("cargo")
        .args(["test", "--workspace"])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo test failed");
    }
    Ok(())
}

fn run_deny() -> Result<()> {
    println!("==> Running cargo deny check (licenses bans sources)");
    let status = Command::new("cargo")
        .args(["deny", "check", "licenses", "bans", "sources"])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo deny check failed");
    }
    Ok(())
}

fn run_doc() -> Result<()> {
    println!("==> Running cargo doc");
    let status = Command::new("cargo")
        .args(["doc", "--workspace", "--no-deps"])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo doc failed");
    }
    Ok(())
}

fn run_build() -> Result<()> {
    println!("==> Running cargo build");
    let status = Command::new("cargo")
        .args(["build", "--workspace"])
        .status()?;
    if !status.success() {
        anyhow::bail!("cargo build failed");
    }
    Ok(())
}

/// Feature presets exercised per geometry.
fn flag_presets() -> [(&'static str, FeatureFlags); 5] {
    let plain = FeatureFlags::default();
    [
        ("plain", plain),
        ("reflect", FeatureFlags { reflect: true, ..plain }),
        ("fog", FeatureFlags { volumetric: true, hard_limit: true, ..plain }),
        ("levels", FeatureFlags { level_lines: true, ..plain }),
        ("stereo", FeatureFlags { stereo: true, ultra_mirrors: true, reflect: true, ..plain }),
    ]
}

fn run_shaders(out: Option<PathBuf>) -> Result<()> {
    println!("==> Generating tracer programs");
    if let Some(dir) = &out {
        std::fs::create_dir_all(dir)?;
    }
    let options = RayOptions::default();
    let mut count = 0;
    for kind in GeometryKind::ALL {
        if kind.family() == MarchFamily::Unsupported {
            continue;
        }
        let mut world = match reference_world(kind, Population::default()) {
            Ok(world) => world,
            Err(err) => {
                println!("{:>10}  skipped: {err}", kind.name());
                continue;
            }
        };
        let mut pose = ViewerPose::at(world.root());
        let base = prepare_frame(world.as_mut(), &options, &mut pose, &Projection::default())?.spec;
        for (name, flags) in flag_presets() {
            let mut spec = base;
            spec.flags = FeatureFlags { multi_shape: base.flags.multi_shape, ..flags }.normalized(kind);
            let source = synthesize(spec)?;
            println!("{:>10}  {name:<8} {}", kind.name(), source.digest());
            if let Some(dir) = &out {
                std::fs::write(dir.join(format!("{kind}-{name}.wgsl")), source.wgsl())?;
            }
            count += 1;
        }
    }
    println!("{count} programs generated");
    Ok(())
}

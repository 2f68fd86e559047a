use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use curvecast_common::{GeometryKind, RayOptions, RaycasterUsage};
use curvecast_render::{
    ClassifierInput, CpuTracer, Eye, FrameDispatcher, FrameOutcome, PreparedFrame, Projection,
    ViewerPose, prepare_frame,
};
use curvecast_render_wgpu::WgpuRaycaster;
use curvecast_shader::synthesize;
use curvecast_world::{CellGraph, Population, reference_world};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "curvecast-cli", about = "Ray-march tessellated non-Euclidean worlds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which reference world to build and how to look at it.
#[derive(Args)]
struct Scene {
    /// Geometry: h3, s3, e3, nil, solv, h2xe, s2xe, e2xe, stretched
    #[arg(short, long, default_value = "h3")]
    geometry: GeometryKind,
    /// RNG seed for the wall population
    #[arg(short, long, default_value = "42")]
    seed: u64,
    /// Chance in thousandths that a cell is solid
    #[arg(long, default_value = "250")]
    solid: u32,
    /// Ray options as a JSON file
    #[arg(short, long)]
    options: Option<PathBuf>,
    /// Render the left eye of a stereo pair
    #[arg(long)]
    stereo: bool,
    #[arg(long, default_value = "80")]
    width: u32,
    #[arg(long, default_value = "40")]
    height: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Print the generated tracer program for a scene
    Shader {
        #[command(flatten)]
        scene: Scene,
        /// Print only the fingerprint and source digest
        #[arg(long)]
        digest: bool,
    },
    /// Encode a scene and print the table statistics as JSON
    Encode {
        #[command(flatten)]
        scene: Scene,
    },
    /// Trace a scene on the CPU and print it as text
    Trace {
        #[command(flatten)]
        scene: Scene,
    },
    /// Render a scene to a binary PPM file
    Render {
        #[command(flatten)]
        scene: Scene,
        #[arg(short = 'O', long, default_value = "frame.ppm")]
        output: PathBuf,
        /// Draw with the GPU driver instead of the CPU tracer
        #[arg(long)]
        gpu: bool,
    },
}

impl Scene {
    fn options(&self) -> anyhow::Result<RayOptions> {
        match &self.options {
            Some(path) => RayOptions::from_path(path)
                .with_context(|| format!("loading ray options from {}", path.display())),
            None => Ok(RayOptions::default()),
        }
    }

    fn world(&self) -> anyhow::Result<Box<dyn CellGraph>> {
        let population = Population {
            solid_per_mille: self.solid,
            ..Population::with_seed(self.seed)
        };
        Ok(reference_world(self.geometry, population)?)
    }

    fn projection(&self) -> Projection {
        let mut projection = Projection::sized(self.width, self.height);
        if self.stereo {
            projection.eye = Eye::Left;
        }
        projection
    }

    fn prepare(&self) -> anyhow::Result<(Box<dyn CellGraph>, PreparedFrame)> {
        let options = self.options()?;
        let mut world = self.world()?;
        let mut pose = ViewerPose::at(world.root());
        let prepared = prepare_frame(world.as_mut(), &options, &mut pose, &self.projection())?;
        Ok((world, prepared))
    }
}

fn cpu_image(scene: &Scene) -> anyhow::Result<curvecast_render::TracedImage> {
    let (world, prepared) = scene.prepare()?;
    let tracer = CpuTracer::new(&prepared, world.shapes())
        .with_context(|| format!("no CPU tracer for {}", scene.geometry))?;
    Ok(tracer.render(&scene.projection()))
}

fn gpu_ppm(scene: &Scene) -> anyhow::Result<Vec<u8>> {
    let options = RayOptions {
        usage: RaycasterUsage::Always,
        ..scene.options()?
    };
    let driver = WgpuRaycaster::headless(scene.width, scene.height)?;
    let mut dispatcher = FrameDispatcher::new(driver, options)?;
    let mut world = scene.world()?;
    let mut pose = ViewerPose::at(world.root());
    let input = ClassifierInput::new(scene.geometry);
    match dispatcher.dispatch(world.as_mut(), &input, &mut pose, &scene.projection())? {
        FrameOutcome::Declined => anyhow::bail!("raycaster declined the frame"),
        FrameOutcome::Drawn(report) => info!(
            fingerprint = %report.fingerprint,
            cells = report.stats.cells,
            "gpu frame drawn"
        ),
    }
    let rgba = dispatcher.driver().read_pixels()?;
    let mut out = format!("P6\n{} {}\n255\n", scene.width, scene.height).into_bytes();
    out.extend(rgba.chunks(4).flat_map(|p| p[..3].iter().copied()));
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("curvecast-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", curvecast_common::crate_info());
            println!("world: {}", curvecast_world::crate_info());
            println!("shader: {}", curvecast_shader::crate_info());
            println!("encode: {}", curvecast_encode::crate_info());
            println!("render: {}", curvecast_render::crate_info());
            println!("render-wgpu: {}", curvecast_render_wgpu::crate_info());
            let kinds: Vec<_> = GeometryKind::ALL.iter().map(|k| k.name()).collect();
            println!("geometries: {}", kinds.join(", "));
        }
        Commands::Shader { scene, digest } => {
            let (_, prepared) = scene.prepare()?;
            let source = synthesize(prepared.spec)?;
            if digest {
                println!("{} {}", source.fingerprint, source.digest());
            } else {
                print!("{}", source.wgsl());
            }
        }
        Commands::Encode { scene } => {
            let (_, prepared) = scene.prepare()?;
            let frame = &prepared.encoded;
            let report = serde_json::json!({
                "geometry": scene.geometry.name(),
                "corrections": prepared.corrections,
                "cells": frame.stats.cells,
                "transforms": frame.stats.transforms,
                "transform_corrections": frame.stats.corrections,
                "out_of_range_sides": frame.stats.out_of_range_sides,
                "layout": {
                    "degree": frame.layout.degree,
                    "per_row": frame.layout.per_row,
                    "rows": frame.layout.rows,
                },
                "walls": frame.total_walls,
                "mirror_offset": frame.mirror_offset,
                "ultra": [frame.ultra_offset, frame.ultra_count],
                "volumetric": frame.volumetric.is_some(),
                "elapsed_us": frame.stats.elapsed.as_micros() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Trace { scene } => {
            let image = cpu_image(&scene)?;
            print!("{}", image.to_ascii());
        }
        Commands::Render { scene, output, gpu } => {
            let ppm = if gpu {
                match gpu_ppm(&scene) {
                    Ok(ppm) => ppm,
                    Err(err) => {
                        warn!(%err, "gpu render failed, falling back to the CPU tracer");
                        cpu_image(&scene)?.to_ppm()
                    }
                }
            } else {
                cpu_image(&scene)?.to_ppm()
            };
            std::fs::write(&output, ppm)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}x{} frame to {}", scene.width, scene.height, output.display());
        }
    }

    Ok(())
}

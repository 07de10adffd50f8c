#![deny(future_incompatible)]
#![deny(nonstandard_style)]
#![deny(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::many_single_char_names,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::similar_names,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::wildcard_imports
)]

use std::{
    collections::VecDeque,
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, ensure, Context, Result};
use bytemuck::{Pod, Zeroable};
use clap::Parser;
use nalgebra as na;
use rand::prelude::*;
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[macro_use]
extern crate log;

mod aabb;
mod accum;
mod camera;
mod capture;
mod color;
mod commands;
mod config;
mod frame;
mod grid;
mod math;
mod output;
mod pipeline;
mod ray;
mod sensor;
mod timing;
mod traversal;
mod voxel;

use aabb::*;
use accum::*;
use camera::*;
use capture::*;
use color::*;
use config::*;
use frame::*;
use grid::*;
use math::*;
use output::*;
use pipeline::*;
use ray::*;
use sensor::*;
use timing::*;
use traversal::*;
use voxel::*;

//
// Main
//

#[derive(clap::Parser)]
#[command(author, version, about)]
struct Args {
    /// Ron configuration file. Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> Result<()> {
    // Init logging.
    env_logger::init();

    // Load config.
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            config::read_from_file::<_, Config>(path)?
        }
        None => Config::default(),
    };
    config.validate()?;

    // Execute command.
    commands::run(args.command, config)
}

fn save_image(pixels: &PixelBuffer, path: &Path) -> Result<()> {
    let (width, height) = pixels.size();
    let image = imagelib::RgbImage::from_raw(width, height, pixels.as_bytes().to_vec())
        .ok_or_else(|| anyhow!("Pixel buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("Saving {}", path.display()))?;
    info!("Saved {}", path.display());
    Ok(())
}

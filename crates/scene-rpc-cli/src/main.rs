// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene RPC developer CLI.
//!
//! Builds, inspects and replays request files without a live receiver.
//!
//! # Usage
//! ```text
//! scene-rpc encode-mesh --out grid.msgpack --path /grid --grid 4
//! scene-rpc inspect grid.msgpack
//! scene-rpc dispatch grid.msgpack
//! scene-rpc config [--save]
//! ```
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`), so stdout only
//! carries command output. `--config <FILE>` replaces the user config dir as
//! the source of receiver preferences.

// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use scene_rpc_app_core::config::ConfigService;
use scene_rpc_app_core::prefs::{ReceiverPrefs, ReceiverPrefsPort, RECEIVER_PREFS_KEY};
use scene_rpc_codec::{decode_request, encode_request, Dispatcher, MockScene};
use scene_rpc_config_fs::FsConfigStore;
use scene_rpc_memory::{Device, DeviceBuffer, MemoryManager};
use scene_rpc_port::{
    Array, ArrayMap, ElementType, MeshData, SceneMessage, SceneMeta, SetMeshData,
};

#[derive(Parser, Debug)]
#[command(name = "scene-rpc", author, version, about, long_about = None)]
struct Cli {
    /// Read receiver preferences from this JSON file instead of the user config dir.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a set_mesh_data request holding a triangulated grid.
    EncodeMesh {
        /// Output file.
        #[arg(short, long)]
        out: PathBuf,
        /// Scene path of the mesh.
        #[arg(long, default_value = "/grid")]
        path: String,
        /// Time step.
        #[arg(long, default_value_t = 0)]
        time: i32,
        /// Layer name.
        #[arg(long, default_value = "")]
        layer: String,
        /// Vertices per grid side.
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(2..))]
        grid: u8,
        /// Device the staging buffers are allocated on, e.g. CPU:0.
        #[arg(long, default_value = "CPU:0")]
        device: Device,
    },
    /// Decode a request file, list its contents and validate it.
    Inspect {
        /// Request file.
        file: PathBuf,
    },
    /// Replay request files against an in-memory scene, printing one JSON
    /// reply status per file.
    Dispatch {
        /// Request files, applied in order to the same scene.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the effective receiver preferences.
    Config {
        /// Also persist them to the config file.
        #[arg(long)]
        save: bool,
    },
}

/// One line of `dispatch` output.
#[derive(Serialize)]
struct ReplyLine {
    file: String,
    reply: &'static str,
    code: i32,
    #[serde(rename = "str")]
    message: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let prefs = load_prefs(cli.config.as_deref())?;
    match cli.command {
        Command::EncodeMesh {
            out,
            path,
            time,
            layer,
            grid,
            device,
        } => encode_mesh(&out, SceneMeta { path, time, layer }, grid, device),
        Command::Inspect { file } => inspect(&file, &prefs),
        Command::Dispatch { files } => dispatch(&files, &prefs),
        Command::Config { save } => {
            if save {
                save_prefs(cli.config.as_deref(), &prefs)?;
            }
            println!("{}", serde_json::to_string_pretty(&prefs)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_prefs(explicit: Option<&Path>) -> Result<ReceiverPrefs> {
    if let Some(path) = explicit {
        let bytes = read(path)?;
        let prefs: ReceiverPrefs = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing config {}", path.display()))?;
        prefs
            .check()
            .with_context(|| format!("checking config {}", path.display()))?;
        return Ok(prefs);
    }
    match FsConfigStore::new() {
        Ok(store) => {
            debug!(dir = %store.base().display(), "loading receiver prefs");
            ConfigService::new(store)
                .load_prefs()
                .context("loading receiver prefs")
        }
        Err(err) => {
            warn!(%err, "no config dir, using default receiver prefs");
            Ok(ReceiverPrefs::default())
        }
    }
}

fn save_prefs(explicit: Option<&Path>, prefs: &ReceiverPrefs) -> Result<()> {
    if let Some(path) = explicit {
        prefs.check()?;
        let data = serde_json::to_vec_pretty(prefs)?;
        return fs::write(path, data).with_context(|| format!("writing {}", path.display()));
    }
    let store = FsConfigStore::new().context("resolving config dir")?;
    let target = store.path_for(RECEIVER_PREFS_KEY);
    ConfigService::new(store)
        .save_prefs(prefs)
        .with_context(|| format!("writing {}", target.display()))?;
    info!(path = %target.display(), "saved receiver prefs");
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Unit grid in the z = 0 plane, two triangles per cell.
fn grid_mesh(side: u8) -> (Vec<f32>, Vec<i32>) {
    let step = 1.0 / f32::from(side - 1);
    let mut coords = Vec::new();
    for row in 0..side {
        for col in 0..side {
            coords.extend([f32::from(col) * step, f32::from(row) * step, 0.0]);
        }
    }
    let side = i32::from(side);
    let mut indices = Vec::new();
    for row in 0..side - 1 {
        for col in 0..side - 1 {
            let a = row * side + col;
            let c = a + side;
            indices.extend([a, a + 1, c + 1, a, c + 1, c]);
        }
    }
    (coords, indices)
}

/// Allocate a buffer on `device` and fill it from host memory.
fn stage(memory: &MemoryManager, device: Device, host: &[u8]) -> Result<DeviceBuffer> {
    let mut buffer = memory
        .allocate(host.len(), device)
        .with_context(|| format!("allocating {} bytes on {device}", host.len()))?;
    memory.copy_from_host(Some(buffer.as_mut_slice()), device, Some(host), host.len())?;
    Ok(buffer)
}

fn encode_mesh(out: &Path, meta: SceneMeta, side: u8, device: Device) -> Result<()> {
    let (coords, indices) = grid_mesh(side);
    let cells = i64::from(side) - 1;
    let host_vertices = Array::from_slice(&coords, vec![i64::from(side).pow(2), 3])?;
    let host_faces = Array::from_slice(&indices, vec![cells * cells * 2, 3])?;

    let memory = MemoryManager::new();
    let vertex_buffer = stage(&memory, device, &host_vertices.data)?;
    let face_buffer = stage(&memory, device, &host_faces.data)?;
    let bytes = {
        let vertices = Array::from_bytes(
            vertex_buffer.as_slice(),
            ElementType::F32,
            host_vertices.shape.clone(),
        )?;
        let faces = Array::from_bytes(
            face_buffer.as_slice(),
            ElementType::I32,
            host_faces.shape.clone(),
        )?;
        let data = MeshData {
            faces,
            ..MeshData::with_vertices(vertices)
        };
        encode_request(&SceneMessage::SetMeshData(SetMeshData { meta, data }))?
    };
    memory.free(vertex_buffer)?;
    memory.free(face_buffer)?;

    fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
    let stats = memory.stats();
    info!(
        out = %out.display(),
        bytes = bytes.len(),
        staged = stats.copied_bytes,
        "wrote set_mesh_data request"
    );
    Ok(())
}

fn print_meta(meta: &SceneMeta) {
    println!("path: {}", meta.path);
    println!("time: {}", meta.time);
    println!("layer: {:?}", meta.layer);
}

fn print_array(name: &str, array: &Array<'_>) {
    println!(
        "  {name}: {} {:?} ({} bytes)",
        array.dtype,
        array.shape,
        array.data.len()
    );
}

fn print_arrays(group: &str, arrays: &ArrayMap<'_>) {
    for (name, array) in arrays {
        print_array(&format!("{group}[{name}]"), array);
    }
}

fn inspect(file: &Path, prefs: &ReceiverPrefs) -> Result<()> {
    let bytes = read(file)?;
    let msg = decode_request(&bytes).with_context(|| format!("decoding {}", file.display()))?;
    println!("msg_id: {}", msg.kind().msg_id());
    match &msg {
        SceneMessage::SetMeshData(set) => {
            print_meta(&set.meta);
            println!("arrays:");
            for (name, array) in set.data.arrays() {
                if array.is_supplied() {
                    print_array(&name, array);
                }
            }
        }
        SceneMessage::GetMeshData(get) => print_meta(&get.meta),
        SceneMessage::SetCameraData(set) => {
            print_meta(&set.meta);
            let camera = &set.data;
            println!("model: {} {:?}", camera.intrinsic_model, camera.intrinsic_parameters);
            println!("size: {}x{}", camera.width, camera.height);
            println!("arrays:");
            print_arrays("images", &camera.images);
        }
        SceneMessage::SetTime(set) => println!("time: {}", set.time),
        SceneMessage::SetActiveCamera(set) => println!("path: {}", set.path),
        SceneMessage::SetProperties(set) => println!("path: {}", set.path),
    }
    match msg.check(&prefs.policy) {
        Ok(()) => {
            println!("valid");
            Ok(())
        }
        Err(report) => bail!("invalid {}: {report}", msg.kind().msg_id()),
    }
}

fn dispatch(files: &[PathBuf], prefs: &ReceiverPrefs) -> Result<()> {
    let mut dispatcher = Dispatcher::new(MockScene::new())
        .with_policy(prefs.policy)
        .with_max_message_bytes(prefs.max_message_bytes);
    for file in files {
        let bytes = read(file)?;
        let reply = dispatcher.process(&bytes);
        let status = reply.status();
        let line = ReplyLine {
            file: file.display().to_string(),
            reply: reply.kind().msg_id(),
            code: status.code,
            message: status.message,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    let scene = dispatcher.handler();
    info!(
        applied = scene.applied,
        meshes = scene.mesh_count(),
        cameras = scene.camera_count(),
        "replay finished"
    );
    Ok(())
}

//! Spinning textured-cube viewer.
//!
//! Stands in for the external scene/ingestion collaborators: builds a
//! procedural mesh and texture (or decodes a PNG given as the first
//! argument), updates the camera each tick, and drives the frame loop.

use std::process::ExitCode;
use std::time::Instant;

use nalgebra::{Matrix4, Perspective3, Point3, Vector3};

use forward_renderer::assets::{ImageData, MeshData, SamplerDesc, Vertex};
use forward_renderer::config::ShaderConfig;
use forward_renderer::{
    DeviceContext, FrameRenderer, RendererConfig, ResourceUploader, SceneUniforms, Window,
    WindowEvent,
};

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RendererConfig::load_or_default("renderer.toml");
    let shaders = ShaderConfig::default();

    let mut window = Window::new(&config.app_name, config.window_width, config.window_height)?;
    let context = DeviceContext::new(&mut window, &config)?;
    let mut renderer = FrameRenderer::new(&context, &window, &config, &shaders)?;

    let uploader = ResourceUploader::new(&context, config.max_anisotropy);
    let texture = match std::env::args().nth(1) {
        Some(path) => load_png(&path)?,
        None => checkerboard(256, 256),
    };
    let mut cube = uploader.upload_mesh(
        renderer.descriptor_set_layout(),
        renderer.uniform_buffer(),
        &cube_mesh(),
        &texture,
        &SamplerDesc::default(),
    )?;

    let start = Instant::now();
    log::info!("entering frame loop");

    'frame: loop {
        for event in window.poll_events() {
            match event {
                WindowEvent::CloseRequested => break 'frame,
                WindowEvent::Resized(w, h) => {
                    log::debug!("resized to {w}x{h}");
                    renderer.note_resized();
                }
                WindowEvent::Key(key, action) => {
                    // Input handling lives outside the renderer; just log.
                    log::debug!("key {key:?} {action:?}");
                }
            }
        }
        if window.should_close() {
            break;
        }

        let elapsed = start.elapsed().as_secs_f32();
        cube.model = Matrix4::from_axis_angle(&Vector3::y_axis(), elapsed * 0.8);

        let extent = renderer.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let uniforms = SceneUniforms::new(
            &Matrix4::identity(),
            &Matrix4::look_at_rh(
                &Point3::new(0.0, 1.5, 3.0),
                &Point3::origin(),
                &Vector3::y_axis(),
            ),
            &vulkan_projection(aspect),
        );

        renderer.draw_frame(&context, &window, &uniforms, std::slice::from_ref(&cube))?;
    }

    // Let in-flight work retire before resources start dropping.
    context.wait_idle()?;
    log::info!("clean shutdown");
    Ok(())
}

/// Perspective projection adjusted for Vulkan's flipped Y clip space.
fn vulkan_projection(aspect: f32) -> Matrix4<f32> {
    let mut proj = Perspective3::new(aspect, std::f32::consts::FRAC_PI_4, 0.1, 100.0)
        .to_homogeneous();
    proj[(1, 1)] *= -1.0;
    proj
}

/// Unit cube with per-face normals and UVs.
fn cube_mesh() -> MeshData {
    // (normal, four corners), corners wound counter-clockwise from outside.
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [0.0, 0.0, 1.0],
            [
                [-0.5, -0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
            ],
        ),
        (
            [0.0, 0.0, -1.0],
            [
                [0.5, -0.5, -0.5],
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, -0.5],
            ],
        ),
        (
            [1.0, 0.0, 0.0],
            [
                [0.5, -0.5, 0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        (
            [-1.0, 0.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        (
            [0.0, 1.0, 0.0],
            [
                [-0.5, 0.5, 0.5],
                [0.5, 0.5, 0.5],
                [0.5, 0.5, -0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        (
            [0.0, -1.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
                [-0.5, -0.5, 0.5],
            ],
        ),
    ];
    let corner_uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    let mut mesh = MeshData::default();
    for (normal, corners) in faces {
        let base = mesh.vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(corner_uvs) {
            mesh.vertices.push(Vertex {
                position: *corner,
                normal,
                uv0: uv,
                uv1: uv,
            });
        }
        mesh.indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Procedural checkerboard texture.
fn checkerboard(width: u32, height: u32) -> ImageData {
    let mut bytes = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let dark = ((x / 32) + (y / 32)) % 2 == 0;
            let value = if dark { 60 } else { 220 };
            bytes.extend([value, value, if dark { 90 } else { 220 }]);
        }
    }
    ImageData {
        width,
        height,
        channel_count: 3,
        bytes,
    }
}

/// Decode a PNG into the ingestion payload the renderer accepts.
fn load_png(path: &str) -> Result<ImageData, Box<dyn std::error::Error>> {
    let decoded = image::open(path)?.to_rgba8();
    Ok(ImageData {
        width: decoded.width(),
        height: decoded.height(),
        channel_count: 4,
        bytes: decoded.into_raw(),
    })
}

//! Staged upload round trip on a real device
//!
//! Needs a Vulkan 1.3 GPU and a display; run with `cargo test -- --ignored`.

use wheel_engine::config::{RendererConfig, WindowConfig};
use wheel_engine::render::backends::vulkan::resources::buffer::{BufferKind, GpuBuffer, IndexData, IndexWidth};
use wheel_engine::render::backends::vulkan::resources::mesh::{quad, Mesh};
use wheel_engine::render::backends::vulkan::VulkanContext;
use wheel_engine::render::GlfwWindow;

fn context() -> (VulkanContext, GlfwWindow) {
    let mut window = GlfwWindow::new(&WindowConfig::default()).expect("window");
    // Integrated GPUs are fine for a copy test
    let mut config = RendererConfig::default().with_validation(true);
    config.device.require_discrete = false;
    config.device.require_geometry_shader = false;
    let context = VulkanContext::new(&mut window, &config).expect("vulkan context");
    (context, window)
}

/// Bytes uploaded through staging come back unchanged
#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_staged_upload_round_trip() {
    let (context, _window) = context();

    let payload: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
    let buffer = GpuBuffer::upload(&context, BufferKind::Vertex { count: 128 }, &payload).unwrap();

    assert_eq!(buffer.size(), payload.len() as u64);
    assert_eq!(buffer.read_back(&context).unwrap(), payload);
}

/// Index buffers keep their width and element order
#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_index_upload_round_trip() {
    let (context, _window) = context();

    let short = IndexData::U16(vec![0, 1, 2, 2, 3, 0]);
    let buffer = GpuBuffer::index(&context, &short).unwrap();
    assert_eq!(buffer.kind(), BufferKind::Index { width: IndexWidth::U16, count: 6 });
    assert_eq!(buffer.size(), 12);
    assert_eq!(buffer.read_back(&context).unwrap(), short.as_bytes());

    let wide = IndexData::U32(vec![0, 70_000, 3]);
    let buffer = GpuBuffer::index(&context, &wide).unwrap();
    assert_eq!(buffer.size(), 12);
    assert_eq!(buffer.read_back(&context).unwrap(), wide.as_bytes());
}

/// Vertex buffers come back byte for byte
#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_vertex_upload_round_trip() {
    let (context, _window) = context();

    let (vertices, _) = quad();
    let buffer = GpuBuffer::vertex(&context, &vertices).unwrap();
    assert_eq!(buffer.kind(), BufferKind::Vertex { count: 4 });
    assert_eq!(buffer.read_back(&context).unwrap(), bytemuck::cast_slice::<_, u8>(vertices.as_slice()));
}

/// Byte counts that disagree with the kind are rejected before allocating
#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_upload_size_mismatch() {
    let (context, _window) = context();

    let result = GpuBuffer::upload(&context, BufferKind::Vertex { count: 2 }, &[0u8; 32]);
    assert!(result.is_err());
}

/// A packed mesh keeps indices at their recorded offset
#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_mesh_upload_round_trip() {
    let (context, _window) = context();

    let (vertices, indices) = quad();
    let mesh = Mesh::new(&context, &vertices, &indices).unwrap();
    let bytes = mesh.buffer().read_back(&context).unwrap();

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    assert_eq!(&bytes[..vertex_bytes.len()], vertex_bytes);

    let BufferKind::Combined { index_offset, .. } = mesh.buffer().kind() else {
        panic!("mesh buffer should be combined");
    };
    let index_bytes = match &indices {
        IndexData::U16(values) => bytemuck::cast_slice::<u16, u8>(values).to_vec(),
        IndexData::U32(values) => bytemuck::cast_slice::<u32, u8>(values).to_vec(),
    };
    let start = index_offset as usize;
    assert_eq!(&bytes[start..start + index_bytes.len()], index_bytes.as_slice());
}

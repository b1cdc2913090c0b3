//! Drawable meshes: vertices and indices packed into one device-local buffer

use ash::vk;

use super::buffer::{BufferKind, GpuBuffer, IndexData, IndexWidth};
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::rendering::commands::ActiveRendering;
use crate::render::backends::vulkan::rendering::vertex_layout::Vertex;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Index offsets are kept 4-byte aligned so either index width binds legally
const INDEX_ALIGNMENT: usize = 4;

/// Host-side image of a mesh buffer: `[vertices][padding][indices]`
#[derive(Debug, Clone, PartialEq)]
pub struct PackedMesh {
    /// Bytes to upload
    pub bytes: Vec<u8>,
    /// Layout of those bytes
    pub kind: BufferKind,
}

impl PackedMesh {
    /// Pack vertices followed by indices
    pub fn pack(vertices: &[Vertex], indices: &IndexData) -> VulkanResult<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(VulkanError::invalid("mesh needs at least one vertex and one index"));
        }
        let max_index = match indices {
            IndexData::U16(list) => list.iter().map(|&i| i as usize).max(),
            IndexData::U32(list) => list.iter().map(|&i| i as usize).max(),
        };
        if max_index.map_or(false, |i| i >= vertices.len()) {
            return Err(VulkanError::invalid(format!(
                "index {:?} out of range for {} vertices",
                max_index,
                vertices.len()
            )));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_offset = (vertex_bytes.len() + INDEX_ALIGNMENT - 1) / INDEX_ALIGNMENT * INDEX_ALIGNMENT;

        let mut bytes = Vec::with_capacity(index_offset + indices.as_bytes().len());
        bytes.extend_from_slice(vertex_bytes);
        bytes.resize(index_offset, 0);
        bytes.extend_from_slice(indices.as_bytes());

        Ok(Self {
            bytes,
            kind: BufferKind::Combined {
                index_offset: index_offset as vk::DeviceSize,
                width: indices.width(),
                count: indices.len() as u32,
            },
        })
    }
}

/// One drawable unit backed by a single combined buffer
pub struct Mesh {
    buffer: GpuBuffer,
    vertex_count: u32,
}

impl Mesh {
    /// Upload `vertices` and `indices` into device-local memory
    pub fn new(context: &VulkanContext, vertices: &[Vertex], indices: &IndexData) -> VulkanResult<Self> {
        let packed = PackedMesh::pack(vertices, indices)?;
        let buffer = GpuBuffer::upload(context, packed.kind, &packed.bytes)?;
        log::debug!(
            "Uploaded mesh: {} vertices, {} {:?} indices",
            vertices.len(),
            indices.len(),
            indices.width()
        );

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Bind vertex and index ranges of the combined buffer
    pub fn bind(&self, rendering: &mut ActiveRendering<'_>) {
        self.buffer.bind(rendering);
    }

    /// Issue the indexed draw
    pub fn draw(&self, rendering: &mut ActiveRendering<'_>) {
        rendering.draw_indexed(self.index_count());
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        match self.buffer.kind() {
            BufferKind::Combined { count, .. } => count,
            _ => 0,
        }
    }

    /// Width of the index elements
    pub fn index_width(&self) -> IndexWidth {
        match self.buffer.kind() {
            BufferKind::Combined { width, .. } => width,
            _ => IndexWidth::U32,
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }
}

/// The default quad: four colored corners, two triangles
pub fn quad() -> (Vec<Vertex>, IndexData) {
    let vertices = vec![
        Vertex::new(-0.5, -0.5, 0.0, [1.0, 0.0, 0.0, 1.0]),
        Vertex::new(0.5, -0.5, 0.0, [0.0, 1.0, 0.0, 1.0]),
        Vertex::new(0.5, 0.5, 0.0, [0.0, 0.0, 1.0, 1.0]),
        Vertex::new(-0.5, 0.5, 0.0, [1.0, 1.0, 1.0, 1.0]),
    ];
    (vertices, IndexData::U16(vec![0, 1, 2, 2, 3, 0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let (vertices, indices) = quad();
        let packed = PackedMesh::pack(&vertices, &indices).unwrap();

        let BufferKind::Combined { index_offset, width, count } = packed.kind else {
            panic!("expected a combined buffer");
        };
        assert_eq!(index_offset, 4 * 32);
        assert_eq!(width, IndexWidth::U16);
        assert_eq!(count, 6);
        assert_eq!(packed.bytes.len(), 4 * 32 + 6 * 2);

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(&packed.bytes[..vertex_bytes.len()], vertex_bytes);
        assert_eq!(&packed.bytes[index_offset as usize..], indices.as_bytes());
    }

    /// Test 32-bit indices land at an offset they can be bound from
    #[test]
    fn test_pack_u32_indices_aligned() {
        let vertices = vec![Vertex::default(); 3];
        let indices = IndexData::U32(vec![0, 1, 2]);
        let packed = PackedMesh::pack(&vertices, &indices).unwrap();

        match packed.kind {
            BufferKind::Combined { index_offset, width, .. } => {
                assert_eq!(index_offset % width.size(), 0);
                assert_eq!(width.index_type(), vk::IndexType::UINT32);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_pack_rejects_bad_input() {
        let (vertices, _) = quad();
        assert!(PackedMesh::pack(&vertices, &IndexData::U16(Vec::new())).is_err());
        assert!(PackedMesh::pack(&[], &IndexData::U16(vec![0])).is_err());
        assert!(PackedMesh::pack(&vertices, &IndexData::U16(vec![0, 1, 4])).is_err());
    }
}

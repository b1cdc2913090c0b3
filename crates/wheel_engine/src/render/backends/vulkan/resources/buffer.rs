//! GPU buffers and the staged upload path
//!
//! A single [`GpuBuffer`] type covers every buffer the engine creates; a
//! [`BufferKind`] tag decides usage flags and how the buffer is bound.
//! Device-local data goes through a host-visible staging buffer and a
//! one-shot copy on the transfer queue.

use ash::{vk, Device};
use std::ffi::c_void;

use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::initialization::device::QueueRole;
use crate::render::backends::vulkan::rendering::commands::ActiveRendering;
use crate::render::backends::vulkan::rendering::vertex_layout::Vertex;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Width of one index element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexWidth {
    /// Vulkan index type for binding
    pub fn index_type(self) -> vk::IndexType {
        match self {
            Self::U16 => vk::IndexType::UINT16,
            Self::U32 => vk::IndexType::UINT32,
        }
    }

    /// Bytes per index
    pub fn size(self) -> vk::DeviceSize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Index data with its width chosen at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl IndexData {
    /// Element width
    pub fn width(&self) -> IndexWidth {
        match self {
            Self::U16(_) => IndexWidth::U16,
            Self::U32(_) => IndexWidth::U32,
        }
    }

    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    /// True when there are no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw little-endian bytes as the GPU reads them
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(indices) => bytemuck::cast_slice(indices),
            Self::U32(indices) => bytemuck::cast_slice(indices),
        }
    }
}

/// What a buffer holds, which fixes its usage flags and binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Host-visible transfer source or read-back target
    Staging,
    /// Per-frame uniform data
    Uniform,
    /// Vertices only
    Vertex {
        /// Vertex count
        count: u32,
    },
    /// Indices only
    Index {
        /// Element width
        width: IndexWidth,
        /// Index count
        count: u32,
    },
    /// Vertices followed by indices in one allocation
    Combined {
        /// Byte offset of the first index
        index_offset: vk::DeviceSize,
        /// Element width
        width: IndexWidth,
        /// Index count
        count: u32,
    },
}

impl BufferKind {
    /// Usage flags for a buffer of this kind
    ///
    /// Device-local kinds are both transfer destination (upload) and
    /// transfer source (debug read-back).
    pub fn usage(&self) -> vk::BufferUsageFlags {
        let transfer = vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC;
        match self {
            Self::Staging => transfer,
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Vertex { .. } => vk::BufferUsageFlags::VERTEX_BUFFER | transfer,
            Self::Index { .. } => vk::BufferUsageFlags::INDEX_BUFFER | transfer,
            Self::Combined { .. } => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER | transfer
            }
        }
    }

    /// Bytes the described contents occupy, `None` for untyped kinds
    pub fn data_size(&self) -> Option<vk::DeviceSize> {
        match *self {
            Self::Staging | Self::Uniform => None,
            Self::Vertex { count } => Some(count as vk::DeviceSize * std::mem::size_of::<Vertex>() as vk::DeviceSize),
            Self::Index { width, count } => Some(count as vk::DeviceSize * width.size()),
            Self::Combined {
                index_offset,
                width,
                count,
            } => Some(index_offset + count as vk::DeviceSize * width.size()),
        }
    }
}

/// Sharing mode for buffers written on the transfer queue and read on the graphics queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSharing {
    /// Exclusive or concurrent
    pub mode: vk::SharingMode,
    /// Families listed for concurrent sharing, empty when exclusive
    pub queue_families: Vec<u32>,
}

impl BufferSharing {
    /// Exclusive when both roles share a family, concurrent over both otherwise
    pub fn between(graphics: u32, transfer: u32) -> Self {
        if graphics == transfer {
            Self {
                mode: vk::SharingMode::EXCLUSIVE,
                queue_families: Vec::new(),
            }
        } else {
            Self {
                mode: vk::SharingMode::CONCURRENT,
                queue_families: vec![graphics, transfer],
            }
        }
    }
}

/// GPU buffer wrapper with automatic memory management
pub struct GpuBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    kind: BufferKind,
}

impl GpuBuffer {
    /// Create a buffer and bind memory with `properties`
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        kind: BufferKind,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid(format!("cannot create an empty {kind:?} buffer")));
        }

        let families = context.queue_families();
        let sharing = BufferSharing::between(families.graphics, families.transfer);
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(kind.usage())
            .sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_families);

        let device = context.device().clone();
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let memory = match context.allocator().allocate_for_buffer(buffer, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        log::debug!("Created {:?} buffer of {} bytes ({:?})", kind, size, properties);
        Ok(Self {
            device,
            buffer,
            memory,
            size,
            kind,
        })
    }

    /// Create a host-visible, coherent buffer
    pub fn host_visible(context: &VulkanContext, size: vk::DeviceSize, kind: BufferKind) -> VulkanResult<Self> {
        Self::new(
            context,
            size,
            kind,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Create a device-local buffer holding `bytes`, uploaded through staging
    pub fn upload(context: &VulkanContext, kind: BufferKind, bytes: &[u8]) -> VulkanResult<Self> {
        if let Some(expected) = kind.data_size() {
            if expected != bytes.len() as vk::DeviceSize {
                return Err(VulkanError::invalid(format!(
                    "{:?} describes {} bytes but {} were given",
                    kind,
                    expected,
                    bytes.len()
                )));
            }
        }
        let buffer = Self::new(
            context,
            bytes.len() as vk::DeviceSize,
            kind,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        Self::stage_into(context, &buffer, 0, bytes)?;
        Ok(buffer)
    }

    /// Device-local vertex buffer
    pub fn vertex(context: &VulkanContext, vertices: &[Vertex]) -> VulkanResult<Self> {
        let kind = BufferKind::Vertex {
            count: vertices.len() as u32,
        };
        Self::upload(context, kind, bytemuck::cast_slice(vertices))
    }

    /// Device-local index buffer
    pub fn index(context: &VulkanContext, indices: &IndexData) -> VulkanResult<Self> {
        let kind = BufferKind::Index {
            width: indices.width(),
            count: indices.len() as u32,
        };
        Self::upload(context, kind, indices.as_bytes())
    }

    /// Copy `bytes` into `dst` at `dst_offset` via a temporary staging buffer
    ///
    /// The staging buffer is destroyed before this returns.
    pub fn stage_into(
        context: &VulkanContext,
        dst: &GpuBuffer,
        dst_offset: vk::DeviceSize,
        bytes: &[u8],
    ) -> VulkanResult<()> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = Self::host_visible(context, size, BufferKind::Staging)?;
        staging.write(0, bytes)?;
        Self::copy(context, &staging, dst, size, dst_offset)
    }

    /// Copy `size` bytes from the start of `src` into `dst` at `dst_offset`
    ///
    /// Runs on the transfer queue and waits for it to go idle, so the data is
    /// in place when this returns.
    pub fn copy(
        context: &VulkanContext,
        src: &GpuBuffer,
        dst: &GpuBuffer,
        size: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        if size > src.size || dst_offset.checked_add(size).map_or(true, |end| end > dst.size) {
            return Err(VulkanError::invalid(format!(
                "copy of {} bytes at offset {} does not fit ({} -> {})",
                size, dst_offset, src.size, dst.size
            )));
        }

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset,
            size,
        };
        let (src_buffer, dst_buffer) = (src.buffer, dst.buffer);
        context
            .transfer_pool()
            .submit_one_shot(context.queue(QueueRole::Transfer), |device, command_buffer| unsafe {
                device.cmd_copy_buffer(command_buffer, src_buffer, dst_buffer, &[region]);
            })
    }

    /// Copy the whole buffer back to host memory
    ///
    /// Debug helper; allocates a staging buffer and blocks on the transfer queue.
    pub fn read_back(&self, context: &VulkanContext) -> VulkanResult<Vec<u8>> {
        let staging = Self::host_visible(context, self.size, BufferKind::Staging)?;
        Self::copy(context, self, &staging, self.size, 0)?;
        staging.read(0, self.size as usize)
    }

    /// Map the whole buffer; only valid for host-visible memory
    pub fn map(&self) -> VulkanResult<*mut c_void> {
        Ok(unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())?
        })
    }

    /// Unmap a previous [`GpuBuffer::map`]
    pub fn unmap(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Write `bytes` at `offset` through a temporary mapping
    pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        self.check_range(offset, bytes.len())?;
        let ptr = self.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>().add(offset as usize), bytes.len());
        }
        self.unmap();
        Ok(())
    }

    fn read(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        self.check_range(offset, len)?;
        let ptr = self.map()?;
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>().add(offset as usize), len).to_vec() };
        self.unmap();
        Ok(bytes)
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<()> {
        match offset.checked_add(len as vk::DeviceSize) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(VulkanError::invalid(format!(
                "range {}+{} outside buffer of {} bytes",
                offset, len, self.size
            ))),
        }
    }

    /// Bind for drawing according to the buffer's kind
    pub fn bind(&self, rendering: &mut ActiveRendering<'_>) {
        match self.kind {
            BufferKind::Vertex { .. } => rendering.bind_vertex_buffer(self.buffer, 0),
            BufferKind::Index { width, .. } => rendering.bind_index_buffer(self.buffer, 0, width.index_type()),
            BufferKind::Combined { index_offset, width, .. } => {
                rendering.bind_vertex_buffer(self.buffer, 0);
                rendering.bind_index_buffer(self.buffer, index_offset, width.index_type());
            }
            BufferKind::Staging | BufferKind::Uniform => {}
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// What the buffer holds
    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharing_mode() {
        let same = BufferSharing::between(0, 0);
        assert_eq!(same.mode, vk::SharingMode::EXCLUSIVE);
        assert!(same.queue_families.is_empty());

        let split = BufferSharing::between(0, 2);
        assert_eq!(split.mode, vk::SharingMode::CONCURRENT);
        assert_eq!(split.queue_families, vec![0, 2]);
    }

    #[test]
    fn test_kind_usage() {
        let vertex = BufferKind::Vertex { count: 3 }.usage();
        assert!(vertex.contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert!(!vertex.contains(vk::BufferUsageFlags::INDEX_BUFFER));

        let combined = BufferKind::Combined {
            index_offset: 96,
            width: IndexWidth::U16,
            count: 6,
        }
        .usage();
        assert!(combined.contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER));

        assert_eq!(BufferKind::Uniform.usage(), vk::BufferUsageFlags::UNIFORM_BUFFER);
    }

    #[test]
    fn test_index_kind() {
        let short = IndexData::U16(vec![0, 1, 2, 2, 3, 0]);
        let kind = BufferKind::Index {
            width: short.width(),
            count: short.len() as u32,
        };
        assert_eq!(kind.data_size(), Some(short.as_bytes().len() as vk::DeviceSize));
        assert_eq!(kind.data_size(), Some(12));

        let usage = kind.usage();
        assert!(usage.contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(!usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));

        let wide = BufferKind::Index {
            width: IndexWidth::U32,
            count: 6,
        };
        assert_eq!(wide.data_size(), Some(24));

        assert_eq!(IndexWidth::U16.index_type(), vk::IndexType::UINT16);
        assert_eq!(IndexWidth::U32.index_type(), vk::IndexType::UINT32);
        assert_eq!(IndexWidth::U16.size(), 2);
        assert_eq!(IndexWidth::U32.size(), 4);
    }

    #[test]
    fn test_data_size() {
        assert_eq!(BufferKind::Vertex { count: 128 }.data_size(), Some(4096));
        assert_eq!(BufferKind::Staging.data_size(), None);
        assert_eq!(BufferKind::Uniform.data_size(), None);

        let combined = BufferKind::Combined {
            index_offset: 128,
            width: IndexWidth::U16,
            count: 6,
        };
        assert_eq!(combined.data_size(), Some(140));
    }

    /// Test index bytes come out in element order with the right width
    #[test]
    fn test_index_data_bytes() {
        let short = IndexData::U16(vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(short.width(), IndexWidth::U16);
        assert_eq!(short.len(), 6);
        assert_eq!(short.as_bytes().len(), 12);
        assert_eq!(&short.as_bytes()[..4], bytemuck::cast_slice::<u16, u8>(&[0, 1]));

        let wide = IndexData::U32(vec![70_000]);
        assert_eq!(wide.width().index_type(), vk::IndexType::UINT32);
        assert_eq!(wide.as_bytes(), &70_000u32.to_ne_bytes());
        assert!(IndexData::U32(Vec::new()).is_empty());
    }
}

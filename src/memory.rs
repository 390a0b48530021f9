//! Linear sub-allocation over GPU memory regions.
//!
//! A region is one `wgpu::Buffer`; sub-buffers are carved out of it as
//! aligned `(offset, size)` ranges by a bump allocator. Device-side copies
//! between sub-buffers are recorded into a command encoder; producer and
//! consumer ordering inside one encoder is guaranteed by wgpu's tracked
//! barriers, which stand in for explicit write-read barriers.

use std::sync::mpsc;
use std::sync::Arc;

use wgpu::*;

/// Sub-buffer offsets satisfy every wgpu binding alignment requirement
/// (uniform and storage both default to 256).
const REGION_ALIGN: u64 = 256;

/// Round `size` up to the region allocation granularity.
pub fn align_up(size: u64) -> u64 {
    size.div_ceil(REGION_ALIGN) * REGION_ALIGN
}

/// What a region is for; determines its buffer usages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionKind {
    /// High-bandwidth storage for the compute pipeline: storage and uniform
    /// bindings plus both copy directions.
    DeviceLocal,
    /// Host-to-device staging, filled through the queue's write path.
    Upload,
    /// Device-to-host staging, mapped for reading on demand.
    Readback,
}

impl RegionKind {
    fn usages(self) -> BufferUsages {
        match self {
            RegionKind::DeviceLocal => {
                BufferUsages::STORAGE
                    | BufferUsages::UNIFORM
                    | BufferUsages::COPY_SRC
                    | BufferUsages::COPY_DST
            }
            RegionKind::Upload => BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            RegionKind::Readback => BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        }
    }
}

/// A single GPU allocation that sub-buffers are carved out of.
pub struct MemoryRegion {
    buffer: Arc<Buffer>,
    kind: RegionKind,
    size: u64,
    used: u64,
}

impl MemoryRegion {
    pub fn new(device: &Device, label: &str, size: u64, kind: RegionKind) -> Self {
        assert!(size > 0, "cannot create an empty memory region");

        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: kind.usages(),
            mapped_at_creation: false,
        });

        log::debug!("created {:?} region '{}' of {} bytes", kind, label, size);
        Self {
            buffer: Arc::new(buffer),
            kind,
            size,
            used: 0,
        }
    }

    /// Carve the next `size` bytes out of this region.
    ///
    /// Panics when the region is exhausted; regions are sized up front for
    /// everything that will live in them.
    pub fn carve(&mut self, size: u64) -> SubBuffer {
        assert!(size > 0, "cannot carve an empty sub-buffer");

        let offset = align_up(self.used);
        assert!(
            offset + size <= self.size,
            "memory region exhausted: {} + {} > {}",
            offset,
            size,
            self.size
        );
        self.used = offset + size;

        SubBuffer {
            buffer: self.buffer.clone(),
            kind: self.kind,
            offset,
            size,
        }
    }
}

/// An `(offset, size)` range of a [`MemoryRegion`], usable as a bind-group
/// resource and as a copy source or destination.
#[derive(Clone)]
pub struct SubBuffer {
    buffer: Arc<Buffer>,
    kind: RegionKind,
    offset: u64,
    size: u64,
}

impl SubBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bind-group resource describing exactly this range.
    pub fn binding(&self) -> BindingResource<'_> {
        BindingResource::Buffer(BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: BufferSize::new(self.size),
        })
    }

    /// Write host data into this range. The write lands at the head of the
    /// next queue submission.
    ///
    /// Panics when called on a readback sub-buffer or with mismatched size.
    pub fn copy_into(&self, queue: &Queue, data: &[u8]) {
        assert!(
            self.kind != RegionKind::Readback,
            "readback sub-buffers are not host-writable"
        );
        assert_eq!(
            data.len() as u64,
            self.size,
            "host write size does not match sub-buffer size"
        );
        queue.write_buffer(&self.buffer, self.offset, data);
    }

    /// Read this range back to the host, blocking until the device has
    /// drained all submitted work.
    ///
    /// Panics when called on anything but a readback sub-buffer or with
    /// mismatched size.
    pub fn read_back(&self, device: &Device, out: &mut [u8]) {
        assert!(
            self.kind == RegionKind::Readback,
            "only readback sub-buffers can be read by the host"
        );
        assert_eq!(
            out.len() as u64,
            self.size,
            "host read size does not match sub-buffer size"
        );

        let slice = self.buffer.slice(self.offset..self.offset + self.size);

        let (sender, receiver) = mpsc::channel();
        slice.map_async(MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(Maintain::Wait).panic_on_timeout();

        receiver
            .recv()
            .expect("map_async callback dropped")
            .expect("failed to map readback buffer");

        out.copy_from_slice(&slice.get_mapped_range());
        self.buffer.unmap();
    }
}

/// Record a device-side copy from `src` to `dst`.
///
/// Panics when the sizes differ. The two ranges must live in different
/// regions; wgpu rejects copies within a single buffer.
pub fn enqueue_copy(encoder: &mut CommandEncoder, src: &SubBuffer, dst: &SubBuffer) {
    assert_eq!(
        src.size, dst.size,
        "copy between sub-buffers of different sizes"
    );
    encoder.copy_buffer_to_buffer(&src.buffer, src.offset, &dst.buffer, dst.offset, src.size);
}

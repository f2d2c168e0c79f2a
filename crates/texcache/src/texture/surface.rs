use std::fmt;
use std::sync::Arc;

/// An image in main memory that can be drawn onto with a 2D drawing library.
///
/// Pixels are stored as native endian 32-bit words holding premultiplied alpha, red, green
/// and blue, with rows aligned to 4 bytes. Clones share the pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    stride: usize,
    data: Arc<[u8]>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// The stride of an ARGB32 surface `width` pixels wide.
    pub fn stride_for_width(width: u32) -> usize {
        (width as usize * 4 + 3) & !3
    }

    pub(crate) fn from_data(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: Self::stride_for_width(width),
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The premultiplied ARGB word of the pixel at `x`/`y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * 4;
        let bytes = self.data.get(offset..offset + 4)?;
        Some(u32::from_ne_bytes(bytes.try_into().ok()?))
    }

    /// The number of live handles to the pixel data.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// Whether both handles share the same pixel data.
    pub fn same_resource(&self, other: &Surface) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

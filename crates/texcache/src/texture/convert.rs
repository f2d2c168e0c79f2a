use crate::caching::CacheEntry;
use crate::pixbuf::PixelBuffer;

use super::{PixelFormat, Renderer, Surface, Texture};

/// Uploads a decoded pixel buffer into a new texture.
///
/// With `add_padding`, a non-square buffer is centered within a transparent square texture
/// whose side is the larger of its dimensions.
pub fn texture_from_pixbuf(
    renderer: &dyn Renderer,
    pixbuf: &PixelBuffer,
    add_padding: bool,
) -> CacheEntry<Texture> {
    let width = pixbuf.width();
    let height = pixbuf.height();
    let format = PixelFormat::for_alpha(pixbuf.has_alpha());

    if !add_padding || width == height {
        return renderer.texture_from_data(width, height, format, pixbuf.rowstride(), pixbuf.data());
    }

    let size = width.max(height);
    let texture = renderer.texture_with_size(size, size, PixelFormat::Rgba8888)?;
    renderer.clear(&texture)?;
    renderer.set_region(
        &texture,
        (size - width) / 2,
        (size - height) / 2,
        width,
        height,
        format,
        pixbuf.rowstride(),
        pixbuf.data(),
    )?;
    Ok(texture)
}

/// Converts a decoded pixel buffer into a premultiplied ARGB32 [`Surface`].
pub fn surface_from_pixbuf(pixbuf: &PixelBuffer) -> Surface {
    let width = pixbuf.width();
    let height = pixbuf.height();
    let stride = Surface::stride_for_width(width);
    let channels = pixbuf.n_channels();

    let mut data = vec![0; stride * height as usize];
    for y in 0..height as usize {
        let src = &pixbuf.data()[y * pixbuf.rowstride()..];
        let dst = &mut data[y * stride..(y + 1) * stride];
        for (d, s) in dst
            .chunks_exact_mut(4)
            .zip(src.chunks_exact(channels))
            .take(width as usize)
        {
            let a = if channels == 4 { s[3] as u32 } else { 0xff };
            let premultiply = |c: u8| (c as u32 * a + 127) / 255;
            let [r, g, b] = [s[0], s[1], s[2]].map(premultiply);
            let word = (a << 24) | (r << 16) | (g << 8) | b;
            d.copy_from_slice(&word.to_ne_bytes());
        }
    }

    Surface::from_data(width, height, data)
}

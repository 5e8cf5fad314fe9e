// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! `Raster` is the one image value type every decoder in this workspace
//! produces. It is opaque RGBA8: no component ever hands out a palette
//! index or a single-channel buffer, single-channel layers are broadcast
//! to RGBA at the point they're decoded.

use image::RgbaImage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize * 4,
            "raster buffer length must be width*height*4"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// An all-black, fully opaque raster of the given dimensions. Used as
    /// the recovery fallback when a tile or layer cannot be decoded.
    pub fn black(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self::new(width, height, data)
    }

    /// Broadcast a single-channel byte buffer (one byte per pixel) to RGBA,
    /// used for the SMF type and metal layers.
    pub fn from_grayscale(width: u32, height: u32, channel: &[u8]) -> Self {
        assert_eq!(channel.len(), width as usize * height as usize);
        let mut data = Vec::with_capacity(channel.len() * 4);
        for &v in channel {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Copy a `size`x`size` tile into this raster at `(dst_x, dst_y)`.
    pub fn blit(&mut self, src: &Raster, dst_x: u32, dst_y: u32) {
        for y in 0..src.height {
            for x in 0..src.width {
                self.set_pixel(dst_x + x, dst_y + y, src.pixel(x, y));
            }
        }
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data)
            .expect("raster buffer length invariant guarantees this succeeds")
    }

    pub fn from_rgba_image(img: RgbaImage) -> Self {
        let width = img.width();
        let height = img.height();
        Self::new(width, height, img.into_raw())
    }
}

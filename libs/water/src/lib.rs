// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! Water overlay: tints mosaic texture pixels below sea level using the
//! SMF height grid. A no-op (byte-identical output) whenever the map has
//! no water (`min_depth >= 0`).

use raster::Raster;

#[derive(Clone, Copy, Debug)]
pub struct WaterOptions {
    pub color: [u8; 3],
    pub modifier: [f32; 3],
}

impl Default for WaterOptions {
    fn default() -> Self {
        Self {
            color: [33, 35, 77],
            modifier: [1.0, 1.2, 1.0],
        }
    }
}

/// Apply the water overlay in place. `height_values` is the normalized
/// `(grid_w * grid_h)` height grid from the SMF height layer (grid_w =
/// mapWidth+1, grid_h = mapHeight+1). `mipmap_size` is the per-tile
/// resolution the mosaic was built at.
pub fn apply(
    texture: &mut Raster,
    height_values: &[f32],
    grid_w: u32,
    grid_h: u32,
    mipmap_size: u32,
    min_depth: f32,
    max_depth: f32,
    opts: &WaterOptions,
) {
    if min_depth >= 0.0 {
        return;
    }
    let water_level_percent = min_depth.abs() / (max_depth - min_depth);
    if water_level_percent <= 0.0 {
        return;
    }
    let ratio = mipmap_size as f32 / 4.0;

    let (tex_w, tex_h) = (texture.width(), texture.height());
    for y in 0..tex_h {
        let hy = (((y + 1) as f32 / ratio).floor() as u32).min(grid_h.saturating_sub(1));
        for x in 0..tex_w {
            let hx = (((x + 1) as f32 / ratio).floor() as u32).min(grid_w.saturating_sub(1));
            let h = height_values[(hy * grid_w + hx) as usize];
            if h >= water_level_percent {
                continue;
            }
            let px = texture.pixel(x, y);
            let mut out = px;
            for c in 0..3 {
                let blended = (opts.color[c] as f32 + px[c] as f32 * (h / water_level_percent)) / 2.0;
                out[c] = (blended * opts.modifier[c]).clamp(0.0, 255.0) as u8;
            }
            texture.set_pixel(x, y, out);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_op_when_no_water() {
        let mut tex = Raster::new(4, 4, vec![200u8; 4 * 4 * 4]);
        let before = tex.data().to_vec();
        let heights = vec![0.5f32; 25];
        apply(&mut tex, &heights, 5, 5, 4, 0.0, 100.0, &WaterOptions::default());
        assert_eq!(tex.data(), before.as_slice());
    }

    #[test]
    fn tints_pixels_below_sea_level() {
        let mut tex = Raster::new(4, 4, vec![200u8; 4 * 4 * 4]);
        // height grid all at 0.0 (well below any positive waterLevelPercent)
        let heights = vec![0.0f32; 25];
        apply(&mut tex, &heights, 5, 5, 4, -10.0, 100.0, &WaterOptions::default());
        let px = tex.pixel(0, 0);
        assert_ne!(px, [200, 200, 200, 255]);
    }
}

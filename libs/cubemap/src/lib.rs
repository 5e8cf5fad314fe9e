// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! Reprojects a six-face cubemap (in the fixed +X,-X,+Y,-Y,+Z,-Z order)
//! into a 2:1 equirectangular panorama by nearest-neighbour sampling.

use raster::Raster;
use rayon::prelude::*;
use springmap_error::{Error, Result};
use std::f32::consts::PI;

/// Faces whose stored orientation needs a vertical flip before sampling.
/// Empirical: the alternative of flipping {2,3} instead gives wrong
/// alignment for the tested maps, but this may not hold for every skybox
/// source.
const FLIP_FACES: [usize; 4] = [0, 1, 4, 5];

fn flip_vertical(face: &Raster) -> Raster {
    let (w, h) = (face.width(), face.height());
    let mut out = Raster::black(w, h);
    for y in 0..h {
        for x in 0..w {
            out.set_pixel(x, h - 1 - y, face.pixel(x, y));
        }
    }
    out
}

fn sample_face(face: &Raster, u: f32, v: f32) -> [u8; 4] {
    let s = face.width() as f32;
    let x = (u * s).floor().clamp(0.0, s - 1.0) as u32;
    let y = (v * s).floor().clamp(0.0, s - 1.0) as u32;
    face.pixel(x, y)
}

/// Dominant-axis face selection and per-face UV, following the standard
/// cubemap sampling convention.
fn direction_to_face_uv(dir: (f32, f32, f32)) -> (usize, f32, f32) {
    let (x, y, z) = dir;
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());
    let (face, uc, vc) = if ax >= ay && ax >= az {
        if x > 0.0 {
            (0, -z / ax, y / ax)
        } else {
            (1, z / ax, y / ax)
        }
    } else if ay >= ax && ay >= az {
        if y > 0.0 {
            (2, x / ay, z / ay)
        } else {
            (3, x / ay, -z / ay)
        }
    } else if z > 0.0 {
        (4, x / az, y / az)
    } else {
        (5, -x / az, y / az)
    };
    (face, 0.5 * (uc + 1.0), 0.5 * (vc + 1.0))
}

/// Build an equirectangular panorama of width `width` (height is
/// `width / 2`) from six square faces of equal side length.
pub fn to_equirectangular(faces: &[Raster; 6], width: u32) -> Result<Raster> {
    let side = faces[0].width();
    for f in faces {
        if f.width() != side || f.height() != side {
            return Err(Error::UnsupportedDds(
                "cubemap faces must all be square and equally sized".to_string(),
            ));
        }
    }
    let height = width / 2;

    let prepped: Vec<Raster> = (0..6)
        .map(|i| {
            if FLIP_FACES.contains(&i) {
                flip_vertical(&faces[i])
            } else {
                faces[i].clone()
            }
        })
        .collect();

    let rows: Vec<Vec<u8>> = (0..height)
        .into_par_iter()
        .map(|y| {
            let phi = (y as f32 / height as f32) * PI;
            let mut row = vec![0u8; width as usize * 4];
            for x in 0..width {
                let theta = (x as f32 / width as f32) * 2.0 * PI;
                // Phased so the horizontal center of the panorama (x=W/2,
                // theta=pi) looks down -Z, matching this family's existing
                // skybox convention: dir.z = sin(phi)*cos(theta) is -1 there.
                let dir = (
                    phi.sin() * theta.sin(),
                    phi.cos(),
                    phi.sin() * theta.cos(),
                );
                let (face_idx, u, v) = direction_to_face_uv(dir);
                let px = sample_face(&prepped[face_idx], u, v);
                let off = x as usize * 4;
                row[off..off + 4].copy_from_slice(&px);
            }
            row
        })
        .collect();

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for row in rows {
        data.extend_from_slice(&row);
    }
    Ok(Raster::new(width, height, data))
}

// src/quality/morphology.rs
use crate::raster::Raster;

/// Erosion with a square structuring element of side `2 * radius + 1`.
/// Pixels outside the raster are treated as set, so the border is not
/// eroded away on small plots.
pub fn erode(mask: &Raster<bool>, radius: usize) -> Raster<bool> {
    window_op(mask, radius, true, |acc, v| acc && v)
}

/// Dilation with the same structuring element; outside pixels are clear.
pub fn dilate(mask: &Raster<bool>, radius: usize) -> Raster<bool> {
    window_op(mask, radius, false, |acc, v| acc || v)
}

/// Opening (erode then dilate) removes isolated set specks smaller than
/// the structuring element.
pub fn opening(mask: &Raster<bool>, radius: usize) -> Raster<bool> {
    if radius == 0 {
        return mask.clone();
    }
    dilate(&erode(mask, radius), radius)
}

/// Closing (dilate then erode) fills pinholes inside larger set regions.
pub fn closing(mask: &Raster<bool>, radius: usize) -> Raster<bool> {
    if radius == 0 {
        return mask.clone();
    }
    erode(&dilate(mask, radius), radius)
}

fn window_op(
    mask: &Raster<bool>,
    radius: usize,
    init: bool,
    fold: impl Fn(bool, bool) -> bool,
) -> Raster<bool> {
    let (width, height) = mask.shape();
    let r = radius as isize;
    let mut out = Raster::filled(width, height, init);
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut acc = init;
            'window: for dy in -r..=r {
                for dx in -r..=r {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                        continue;
                    }
                    acc = fold(acc, mask.get(nx as usize, ny as usize));
                    if acc != init {
                        // The fold is monotone, nothing can flip it back.
                        break 'window;
                    }
                }
            }
            out.set(x as usize, y as usize, acc);
        }
    }
    out
}

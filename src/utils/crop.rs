//! Page-image cropping helpers.
//!
//! Coordinates handed to these functions are page units; `zoom` converts
//! them to rendered pixels.

use crate::domain::{PagePosition, PositionTag};
use crate::processors::Rect;
use image::{Rgb, RgbImage, imageops};

/// Background used between stacked crops.
pub const STACK_BACKGROUND: Rgb<u8> = Rgb([245, 245, 245]);

/// Vertical gap between stacked crops, in pixels.
pub const STACK_GAP: u32 = 6;

/// Height of the dimmed context bands added above and below tagged crops.
const CONTEXT_BAND: f32 = 120.0;

/// Crops a pixel rectangle, clamped to the image. Returns `None` when the
/// clamped region is empty.
pub fn crop_pixels(image: &RgbImage, rect: &Rect) -> Option<RgbImage> {
    let x0 = rect.x0.max(0.0).floor() as u32;
    let y0 = rect.top.max(0.0).floor() as u32;
    let x1 = (rect.x1.max(0.0).ceil() as u32).min(image.width());
    let y1 = (rect.bottom.max(0.0).ceil() as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Crops a page-unit rectangle from a page rendered at `zoom`.
pub fn crop_region(image: &RgbImage, rect: &Rect, zoom: f32) -> Option<RgbImage> {
    crop_pixels(image, &rect.scale_up(zoom))
}

/// Stacks images top to bottom on [`STACK_BACKGROUND`], separated by
/// [`STACK_GAP`] pixels.
pub fn stack_vertically(images: &[RgbImage]) -> Option<RgbImage> {
    let width = images.iter().map(RgbImage::width).max()?;
    let height: u32 = images.iter().map(|i| i.height() + STACK_GAP).sum();
    if width == 0 || height == 0 {
        return None;
    }
    let mut canvas = RgbImage::from_pixel(width, height, STACK_BACKGROUND);
    let mut y = 0i64;
    for img in images {
        imageops::replace(&mut canvas, img, 0, y);
        y += i64::from(img.height() + STACK_GAP);
    }
    Some(canvas)
}

/// Halves every channel, marking a crop as context rather than content.
fn dim(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c /= 2;
        }
    }
}

/// Cuts the regions referenced by `tags` out of the rendered pages.
///
/// Every tag becomes one crop per page it spans, all widened to the widest
/// tag. A dimmed context band is added above the first and below the last
/// tag. Returns the stacked image and the absolute page positions of the
/// content crops.
pub fn crop_tagged(
    page_images: &[RgbImage],
    tags: &[PositionTag],
    zoom: f32,
    page_from: usize,
) -> Option<(RgbImage, Vec<PagePosition>)> {
    let (first, last) = (tags.first()?, tags.last()?);
    let page_height = |page: usize| -> f32 {
        page.checked_sub(1)
            .and_then(|i| page_images.get(i))
            .map_or(0.0, |img| img.height() as f32 / zoom)
    };

    let first_page = *first.pages.first()?;
    let last_page = *last.pages.last()?;
    let mut segments: Vec<PositionTag> = Vec::with_capacity(tags.len() + 2);
    segments.push(PositionTag::new(
        vec![first_page],
        first.x0,
        first.x1,
        (first.top - CONTEXT_BAND).max(0.0),
        (first.top - STACK_GAP as f32).max(0.0),
    ));
    segments.extend(tags.iter().cloned());
    let last_height = page_height(last_page);
    segments.push(PositionTag::new(
        vec![last_page],
        last.x0,
        last.x1,
        (last.bottom + STACK_GAP as f32).min(last_height),
        (last.bottom + CONTEXT_BAND).min(last_height),
    ));

    let max_width = tags.iter().map(|t| t.x1 - t.x0).fold(0.0f32, f32::max);
    let mut crops: Vec<(RgbImage, bool)> = Vec::new();
    let mut positions = Vec::new();
    let n = segments.len();
    for (i, seg) in segments.iter().enumerate() {
        let is_context = i == 0 || i + 1 == n;
        let right = seg.x0 + max_width;
        let spanned = seg.pages.len();
        for (k, &page) in seg.pages.iter().enumerate() {
            let height = page_height(page);
            let top = if k == 0 { seg.top } else { 0.0 };
            let bottom = if k + 1 == spanned { seg.bottom } else { height };
            let bottom = bottom.min(height);
            let rect = Rect::new(seg.x0, right, top, bottom);
            let Some(image) = page
                .checked_sub(1)
                .and_then(|idx| page_images.get(idx))
                .and_then(|img| crop_region(img, &rect, zoom))
            else {
                continue;
            };
            if !is_context {
                positions.push(PagePosition {
                    page: page + page_from,
                    x0: seg.x0,
                    x1: right,
                    top,
                    bottom,
                });
            }
            crops.push((image, is_context));
        }
    }

    let images: Vec<RgbImage> = crops
        .into_iter()
        .map(|(mut img, is_context)| {
            if is_context {
                dim(&mut img);
            }
            img
        })
        .collect();
    stack_vertically(&images).map(|img| (img, positions))
}
